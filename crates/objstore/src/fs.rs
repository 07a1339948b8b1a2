//! Filesystem-backed object source (the telemetry drop zone).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use pipeline_core::{Error, Result};

use crate::config::ObjectStoreConfig;
use crate::source::{ObjectMeta, ObjectSource};

/// Object source over a local directory tree. Object keys are
/// `/`-separated paths relative to the root.
pub struct FsObjectSource {
    config: ObjectStoreConfig,
}

impl FsObjectSource {
    pub fn new(config: ObjectStoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    fn resolve(&self, key: &str) -> Result<PathBuf> {
        // Keys never escape the root.
        if key.split('/').any(|part| part == "..") || key.starts_with('/') {
            return Err(Error::transient(format!("invalid object key: {}", key)));
        }
        Ok(self.config.root.join(key))
    }
}

#[async_trait]
impl ObjectSource for FsObjectSource {
    async fn list(&self) -> Result<Vec<ObjectMeta>> {
        let root = self.config.root.clone();
        if !root.exists() {
            warn!(root = %root.display(), "Object source root does not exist yet");
            return Ok(Vec::new());
        }

        let mut objects = Vec::new();
        let mut pending = vec![root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| Error::transient(format!("list {}: {}", dir.display(), e)))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Error::transient(format!("list {}: {}", dir.display(), e)))?
            {
                let path = entry.path();
                let meta = entry
                    .metadata()
                    .await
                    .map_err(|e| Error::transient(format!("stat {}: {}", path.display(), e)))?;

                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let key = relative_key(&root, &path)?;
                if !key.starts_with(&self.config.prefix) {
                    continue;
                }

                let last_modified = meta
                    .modified()
                    .map(DateTime::<Utc>::from)
                    .unwrap_or_else(|_| Utc::now());

                objects.push(ObjectMeta {
                    key,
                    size: meta.len(),
                    last_modified,
                });
            }
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(count = objects.len(), prefix = %self.config.prefix, "Listed objects");
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::transient(format!("get {}: {}", key, e)))?;
        Ok(Bytes::from(bytes))
    }
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| Error::internal(format!("path {} outside root", path.display())))?;

    let key = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    Ok(key)
}
