//! The object source seam.
//!
//! The pipeline consumes object storage as an opaque, read-only sequence of
//! delimited-text objects. Implementations behind this trait: the
//! filesystem drop zone in production, an in-memory source in tests.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pipeline_core::Result;

/// Metadata for one stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Key relative to the source's root/prefix
    pub key: String,
    /// Object size in bytes
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

/// Read-only access to a bucket/prefix.
#[async_trait]
pub trait ObjectSource: Send + Sync {
    /// List objects under the configured prefix, ordered by key.
    ///
    /// Failures are transient: the caller retries with backoff.
    async fn list(&self) -> Result<Vec<ObjectMeta>>;

    /// Fetch an object's bytes.
    async fn get(&self, key: &str) -> Result<Bytes>;
}
