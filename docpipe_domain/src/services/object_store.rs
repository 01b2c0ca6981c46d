// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Object Store Port
//!
//! S3-style object storage consumed by stage implementations. Keys follow the
//! per-document layout `documents/<uuid>/<stage>/<artifact>`, which makes a
//! stage's cleanup a single prefix delete and therefore intrinsically
//! idempotent.

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::value_objects::{DocumentId, StageName};

/// Builds the object-store prefix owned by one document.
pub fn document_prefix(document_id: DocumentId) -> String {
    format!("documents/{}", document_id)
}

/// Builds the object-store prefix owned by one stage of one document.
pub fn stage_prefix(document_id: DocumentId, stage: StageName) -> String {
    format!("documents/{}/{}", document_id, stage)
}

/// S3-compatible object store interface.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores an object, overwriting any existing object at the key
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), PipelineError>;

    /// Retrieves an object, `None` when the key does not exist
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PipelineError>;

    /// Deletes an object; deleting a missing key succeeds
    async fn delete(&self, key: &str) -> Result<(), PipelineError>;

    /// Lists keys under a prefix
    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError>;

    /// Deletes every object under a prefix; an empty prefix region succeeds
    async fn delete_prefix(&self, prefix: &str) -> Result<(), PipelineError> {
        for key in self.list(prefix).await? {
            self.delete(&key).await?;
        }
        Ok(())
    }
}
