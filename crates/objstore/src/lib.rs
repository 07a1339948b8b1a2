//! Object storage connector for the uptime pipeline.

pub mod config;
pub mod fs;
pub mod memory;
pub mod source;

pub use config::*;
pub use fs::*;
pub use memory::*;
pub use source::*;
