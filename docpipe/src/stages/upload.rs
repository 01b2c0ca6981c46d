// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Upload Stage
//!
//! Initialization stage: verifies the source object exists and publishes
//! per-layer digests (text, tables, vector, raster) that the extraction
//! stages declare as their inputs. Each extraction stage depends only on its
//! own layer digest, so a change confined to one layer re-executes only that
//! branch.

use async_trait::async_trait;

use docpipe_domain::entities::ProcessingContext;
use docpipe_domain::services::canonical_json::hash_bytes;
use docpipe_domain::services::object_store::stage_prefix;
use docpipe_domain::services::{ObjectStore, Stage};
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use std::sync::Arc;

pub struct UploadStage {
    store: Arc<dyn ObjectStore>,
}

impl UploadStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> StageName {
        StageName::Upload
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        // Content-independent on purpose: re-ingesting new bytes at the same
        // key republishes layer digests without re-running upload itself.
        let source_key = ctx
            .input_data()
            .get("source_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::MissingField("source_key".to_string()))?;
        Ok(serde_json::json!({
            "document_id": ctx.document_id().to_string(),
            "stage": self.name().as_str(),
            "source_key": source_key,
        }))
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let source_key = ctx
            .input_data()
            .get("source_key")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::MissingField("source_key".to_string()))?;

        let bytes = self
            .store
            .get(source_key)
            .await?
            .ok_or_else(|| PipelineError::ValidationError(format!("Source object missing: {}", source_key)))?;

        Ok(serde_json::json!({
            "source_key": source_key,
            "size": bytes.len(),
            "layers": {
                "text": layer_digest("text", &bytes),
                "tables": layer_digest("tables", &bytes),
                "vector": layer_digest("vector", &bytes),
                "raster": layer_digest("raster", &bytes),
            },
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store
            .delete_prefix(&stage_prefix(document_id, self.name()))
            .await
    }
}

/// Digest of one logical document layer: the layer name salts the hash so
/// the four digests differ even over identical bytes.
fn layer_digest(layer: &str, bytes: &[u8]) -> String {
    let mut salted = Vec::with_capacity(layer.len() + 1 + bytes.len());
    salted.extend_from_slice(layer.as_bytes());
    salted.push(b':');
    salted.extend_from_slice(bytes);
    hash_bytes(&salted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::InMemoryObjectStore;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn ctx(doc: DocumentId, source_key: &str) -> ProcessingContext {
        ProcessingContext::new(
            doc,
            Uuid::new_v4(),
            StageName::Upload,
            serde_json::json!({"source_key": source_key, "source_sha256": "ab".repeat(32)}),
            HashMap::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_layer_digests_differ_per_layer() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put("documents/d/source.pdf", b"ABC".to_vec()).await.unwrap();
        let stage = UploadStage::new(store);

        let output = stage.execute(&ctx(DocumentId::new(), "documents/d/source.pdf")).await.unwrap();
        let layers = &output["layers"];
        assert_ne!(layers["text"], layers["tables"]);
        assert_ne!(layers["vector"], layers["raster"]);
        assert_eq!(output["size"], 3);
    }

    #[tokio::test]
    async fn test_missing_source_is_permanent() {
        let stage = UploadStage::new(Arc::new(InMemoryObjectStore::new()));
        let err = stage.execute(&ctx(DocumentId::new(), "missing")).await.unwrap_err();
        assert_eq!(err.classify(), docpipe_domain::ErrorClass::Permanent);
    }

    #[tokio::test]
    async fn test_declared_input_ignores_content() {
        let store = Arc::new(InMemoryObjectStore::new());
        let stage = UploadStage::new(store);
        let doc = DocumentId::new();

        let a = stage.declared_input(&ctx(doc, "documents/d/source.pdf")).unwrap();
        let b = stage.declared_input(&ctx(doc, "documents/d/source.pdf")).unwrap();
        assert_eq!(a, b);
        assert!(a.get("source_sha256").is_none());
    }
}
