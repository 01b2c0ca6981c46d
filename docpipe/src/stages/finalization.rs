// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Finalization Stages
//!
//! Storage consolidation and search indexing. Storage writes the artifact
//! manifest that makes the document's persisted outputs addressable as a
//! unit; search indexing publishes the terms and vector references the
//! search surface consumes.

use std::sync::Arc;

use async_trait::async_trait;

use docpipe_domain::entities::ProcessingContext;
use docpipe_domain::services::object_store::stage_prefix;
use docpipe_domain::services::{ObjectStore, Stage};
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use super::{artifact_key, upstream_input};

/// Consolidates extraction artifacts into a storage manifest.
pub struct StorageStage {
    store: Arc<dyn ObjectStore>,
}

impl StorageStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for StorageStage {
    fn name(&self) -> StageName {
        StageName::Storage
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(
            ctx,
            self.name(),
            &[
                StageName::TableExtraction,
                StageName::SvgProcessing,
                StageName::ImageProcessing,
            ],
        )
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let tables = ctx.require_upstream(StageName::TableExtraction)?;
        let drawings = ctx.require_upstream(StageName::SvgProcessing)?;
        let images = ctx.require_upstream(StageName::ImageProcessing)?;

        let manifest = serde_json::json!({
            "document_id": ctx.document_id().to_string(),
            "tables": tables.get("row_count").cloned().unwrap_or(serde_json::json!(0)),
            "drawings": drawings.get("drawings").cloned().unwrap_or(serde_json::json!(0)),
            "images": images.get("images").cloned().unwrap_or(serde_json::json!([])),
        });

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "manifest.json"),
                serde_json::to_vec(&manifest)?,
            )
            .await?;

        let stored = 1
            + images
                .get("count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);

        Ok(serde_json::json!({
            "stored_artifacts": stored,
            "manifest_key": artifact_key(ctx.document_id(), self.name(), "manifest.json"),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Publishes the search index manifest for the document.
pub struct SearchIndexingStage {
    store: Arc<dyn ObjectStore>,
}

impl SearchIndexingStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for SearchIndexingStage {
    fn name(&self) -> StageName {
        StageName::SearchIndexing
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(
            ctx,
            self.name(),
            &[
                StageName::PartsExtraction,
                StageName::SeriesDetection,
                StageName::Embedding,
                StageName::Storage,
            ],
        )
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let parts = ctx.require_upstream(StageName::PartsExtraction)?;
        let series = ctx.require_upstream(StageName::SeriesDetection)?;
        let embedding = ctx.require_upstream(StageName::Embedding)?;
        let storage = ctx.require_upstream(StageName::Storage)?;

        let mut terms: Vec<String> = Vec::new();
        if let Some(list) = parts.get("parts").and_then(|v| v.as_array()) {
            terms.extend(list.iter().filter_map(|p| p.as_str()).map(String::from));
        }
        if let Some(list) = series.get("series").and_then(|v| v.as_array()) {
            terms.extend(list.iter().filter_map(|s| s.as_str()).map(String::from));
        }
        terms.sort();
        terms.dedup();

        let index = serde_json::json!({
            "document_id": ctx.document_id().to_string(),
            "terms": terms,
            "vector_count": embedding.get("vectors").cloned().unwrap_or(serde_json::json!(0)),
            "manifest_key": storage.get("manifest_key").cloned().unwrap_or(serde_json::Value::Null),
        });

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "index.json"),
                serde_json::to_vec(&index)?,
            )
            .await?;

        Ok(serde_json::json!({
            "indexed": true,
            "term_count": terms.len(),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::InMemoryObjectStore;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_search_indexing_merges_terms() {
        let store = Arc::new(InMemoryObjectStore::new());
        let stage = SearchIndexingStage::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let doc = DocumentId::new();

        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::PartsExtraction,
            serde_json::json!({"parts": ["AB-100", "CD-200"], "count": 2}),
        );
        outputs.insert(
            StageName::SeriesDetection,
            serde_json::json!({"series": ["Phaser"], "detected": true}),
        );
        outputs.insert(
            StageName::Embedding,
            serde_json::json!({"vectors": 3, "dim": 4}),
        );
        outputs.insert(
            StageName::Storage,
            serde_json::json!({"stored_artifacts": 2, "manifest_key": "m"}),
        );

        let ctx = ProcessingContext::new(
            doc,
            Uuid::new_v4(),
            StageName::SearchIndexing,
            serde_json::json!({"source_key": "k", "source_sha256": "ab".repeat(32)}),
            outputs,
        )
        .unwrap();

        let output = stage.execute(&ctx).await.unwrap();
        assert_eq!(output["term_count"], 3);

        let index = store
            .get(&artifact_key(doc, StageName::SearchIndexing, "index.json"))
            .await
            .unwrap()
            .unwrap();
        let index: serde_json::Value = serde_json::from_slice(&index).unwrap();
        assert_eq!(index["terms"], serde_json::json!(["AB-100", "CD-200", "Phaser"]));
    }

    #[tokio::test]
    async fn test_storage_requires_all_extraction_outputs() {
        let stage = StorageStage::new(Arc::new(InMemoryObjectStore::new()));
        let ctx = ProcessingContext::new(
            DocumentId::new(),
            Uuid::new_v4(),
            StageName::Storage,
            serde_json::json!({"source_key": "k", "source_sha256": "ab".repeat(32)}),
            HashMap::new(),
        )
        .unwrap();

        let err = stage.execute(&ctx).await.unwrap_err();
        assert_eq!(err.error_code(), "prerequisite_not_met");
    }
}
