//! In-memory object source for tests and demos.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

use pipeline_core::{Error, Result};

use crate::source::{ObjectMeta, ObjectSource};

/// Object source backed by an in-process map.
#[derive(Default)]
pub struct MemoryObjectSource {
    objects: RwLock<BTreeMap<String, ObjectEntry>>,
}

struct ObjectEntry {
    bytes: Bytes,
    meta: ObjectMeta,
}

impl MemoryObjectSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object.
    pub fn put(&self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        let key = key.into();
        let bytes = bytes.into();
        let meta = ObjectMeta {
            key: key.clone(),
            size: bytes.len() as u64,
            last_modified: Utc::now(),
        };
        self.objects.write().insert(key, ObjectEntry { bytes, meta });
    }

    pub fn remove(&self, key: &str) {
        self.objects.write().remove(key);
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectSource for MemoryObjectSource {
    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        Ok(self
            .objects
            .read()
            .values()
            .map(|e| e.meta.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.objects
            .read()
            .get(key)
            .map(|e| e.bytes.clone())
            .ok_or_else(|| Error::transient(format!("no such object: {}", key)))
    }
}
