//! Core types, session windowing, and merge semantics for the uptime pipeline.

pub mod error;
pub mod event;
pub mod outputs;
pub mod session;
pub mod watermark;

pub use error::{Error, Result};
pub use event::*;
pub use outputs::*;
pub use session::*;
pub use watermark::*;
