// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Object Store Adapters
//!
//! Two implementations of the S3-style object store port: an in-memory map
//! for tests and single-process deployments, and a filesystem adapter that
//! maps keys onto paths under a scoped root directory. Both honor the
//! port's idempotent-delete semantics.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::fs;

use docpipe_domain::services::ObjectStore;
use docpipe_domain::PipelineError;

/// In-memory object store keyed by full object key.
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects. Test helper.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        self.objects.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        Ok(self
            .objects
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// Filesystem object store rooted at a working directory.
///
/// Keys map to relative paths; `..` segments are rejected so a key can never
/// escape the root.
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PipelineError> {
        if key.split('/').any(|seg| seg == "..") || key.starts_with('/') {
            return Err(PipelineError::ObjectStoreError(format!(
                "Key escapes store root: {}",
                key
            )));
        }
        Ok(self.root.join(key))
    }

    async fn collect_keys(&self, dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<(), PipelineError> {
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(PipelineError::ObjectStoreError(e.to_string())),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| PipelineError::ObjectStoreError(e.to_string()))?
            {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    let key = rel.to_string_lossy().replace('\\', "/");
                    if key.starts_with(prefix) {
                        out.push(key);
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::ObjectStoreError(e.to_string()))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::ObjectStoreError(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PipelineError::ObjectStoreError(e.to_string())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::ObjectStoreError(e.to_string())),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let mut keys = Vec::new();
        let root = self.root.clone();
        self.collect_keys(&root, prefix, &mut keys).await?;
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryObjectStore::new();
        store.put("documents/a/upload/source.pdf", b"ABC".to_vec()).await.unwrap();

        assert_eq!(
            store.get("documents/a/upload/source.pdf").await.unwrap(),
            Some(b"ABC".to_vec())
        );
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_in_memory_prefix_delete() {
        let store = InMemoryObjectStore::new();
        store.put("documents/a/chunks/0.json", b"{}".to_vec()).await.unwrap();
        store.put("documents/a/chunks/1.json", b"{}".to_vec()).await.unwrap();
        store.put("documents/a/text/pages.json", b"{}".to_vec()).await.unwrap();

        store.delete_prefix("documents/a/chunks").await.unwrap();
        assert_eq!(store.list("documents/a").await.unwrap().len(), 1);

        // Deleting an empty prefix region succeeds
        store.delete_prefix("documents/a/chunks").await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());

        store.put("documents/a/upload/source.pdf", b"ABC".to_vec()).await.unwrap();
        assert_eq!(
            store.get("documents/a/upload/source.pdf").await.unwrap(),
            Some(b"ABC".to_vec())
        );

        let keys = store.list("documents/a").await.unwrap();
        assert_eq!(keys, vec!["documents/a/upload/source.pdf".to_string()]);

        store.delete("documents/a/upload/source.pdf").await.unwrap();
        store.delete("documents/a/upload/source.pdf").await.unwrap();
        assert_eq!(store.get("documents/a/upload/source.pdf").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_filesystem_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemObjectStore::new(dir.path());
        assert!(store.get("../outside").await.is_err());
        assert!(store.put("/absolute", vec![]).await.is_err());
    }
}
