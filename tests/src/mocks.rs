//! Mock implementations for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use objstore::{MemoryObjectSource, ObjectMeta, ObjectSource};
use pipeline_core::{Error, Result};

/// Object source that fails a configurable number of operations before
/// delegating to an in-memory source.
///
/// Implements the same `ObjectSource` trait as the production sources, so
/// the ingest worker's retry/degradation paths run unmodified.
pub struct FlakyObjectSource {
    inner: Arc<MemoryObjectSource>,
    /// `get` calls left to fail with a transient error
    get_failures: AtomicU32,
    /// `list` calls left to fail with a transient error
    list_failures: AtomicU32,
}

impl FlakyObjectSource {
    pub fn new(inner: Arc<MemoryObjectSource>) -> Self {
        Self {
            inner,
            get_failures: AtomicU32::new(0),
            list_failures: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` object fetches.
    pub fn fail_next_gets(&self, n: u32) {
        self.get_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` listings.
    pub fn fail_next_lists(&self, n: u32) {
        self.list_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectSource for FlakyObjectSource {
    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        if Self::take_failure(&self.list_failures) {
            return Err(Error::transient("injected list failure"));
        }
        self.inner.list().await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        if Self::take_failure(&self.get_failures) {
            return Err(Error::transient(format!("injected get failure for {}", key)));
        }
        self.inner.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failures_drain_then_delegate() {
        let inner = Arc::new(MemoryObjectSource::new());
        inner.put("a.csv", &b"x"[..]);

        let flaky = FlakyObjectSource::new(inner);
        flaky.fail_next_gets(2);

        assert!(flaky.get("a.csv").await.unwrap_err().is_transient());
        assert!(flaky.get("a.csv").await.is_err());
        assert_eq!(flaky.get("a.csv").await.unwrap(), Bytes::from_static(b"x"));
    }
}
