// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Enrichment Stages
//!
//! Visual and text embedding via the external AI service. These are the
//! stages that cross an HTTP boundary, so their failures carry status codes
//! for the classifier and their call durations feed the performance
//! collector's external-service aggregates.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use docpipe_domain::entities::ProcessingContext;
use docpipe_domain::services::object_store::stage_prefix;
use docpipe_domain::services::{AiService, ObjectStore, Stage};
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use crate::application::performance::PerformanceCollector;

use super::{artifact_key, upstream_input};

/// Embeds extracted images with the vision model.
pub struct VisualEmbeddingStage {
    store: Arc<dyn ObjectStore>,
    ai: Arc<dyn AiService>,
    performance: Arc<PerformanceCollector>,
}

impl VisualEmbeddingStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ai: Arc<dyn AiService>,
        performance: Arc<PerformanceCollector>,
    ) -> Self {
        Self { store, ai, performance }
    }
}

#[async_trait]
impl Stage for VisualEmbeddingStage {
    fn name(&self) -> StageName {
        StageName::VisualEmbedding
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(ctx, self.name(), &[StageName::ImageProcessing])
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let images = ctx
            .require_upstream(StageName::ImageProcessing)?
            .get("images")
            .and_then(|v| v.as_array())
            .ok_or_else(|| PipelineError::SchemaMismatch("Image processing output missing images".into()))?;

        let mut vectors = Vec::with_capacity(images.len());
        for key in images.iter().filter_map(|k| k.as_str()) {
            let bytes = self.store.get(key).await?.ok_or_else(|| {
                PipelineError::ObjectStoreError(format!("Image artifact missing: {}", key))
            })?;

            let started = Instant::now();
            let vector = self.ai.embed_image(&bytes).await?;
            self.performance
                .record_external_call(ctx.request_id(), started.elapsed().as_millis() as u64);
            vectors.push(vector);
        }

        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "vectors.json"),
                serde_json::to_vec(&vectors)?,
            )
            .await?;

        Ok(serde_json::json!({
            "count": vectors.len(),
            "dim": dim,
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Embeds the document's textual surface (title + keywords) together with
/// the visual vector rollup.
pub struct EmbeddingStage {
    store: Arc<dyn ObjectStore>,
    ai: Arc<dyn AiService>,
    performance: Arc<PerformanceCollector>,
}

impl EmbeddingStage {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ai: Arc<dyn AiService>,
        performance: Arc<PerformanceCollector>,
    ) -> Self {
        Self { store, ai, performance }
    }
}

#[async_trait]
impl Stage for EmbeddingStage {
    fn name(&self) -> StageName {
        StageName::Embedding
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(
            ctx,
            self.name(),
            &[StageName::MetadataExtraction, StageName::VisualEmbedding],
        )
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let metadata = ctx.require_upstream(StageName::MetadataExtraction)?;
        let visual = ctx.require_upstream(StageName::VisualEmbedding)?;

        let mut texts: Vec<String> = Vec::new();
        if let Some(title) = metadata.get("title").and_then(|v| v.as_str()) {
            if !title.is_empty() {
                texts.push(title.to_string());
            }
        }
        if let Some(keywords) = metadata.get("keywords").and_then(|v| v.as_array()) {
            texts.extend(keywords.iter().filter_map(|k| k.as_str()).map(String::from));
        }
        if texts.is_empty() {
            texts.push(String::new());
        }

        let started = Instant::now();
        let vectors = self.ai.embed_texts(&texts).await?;
        self.performance
            .record_external_call(ctx.request_id(), started.elapsed().as_millis() as u64);

        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);
        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "embeddings.json"),
                serde_json::to_vec(&vectors)?,
            )
            .await?;

        Ok(serde_json::json!({
            "vectors": vectors.len(),
            "dim": dim,
            "visual_vectors": visual.get("count").cloned().unwrap_or(serde_json::json!(0)),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::adapters::{InMemoryObjectStore, StubAiService};
    use crate::infrastructure::repositories::{schema, SqliteBaselineRepository};
    use docpipe_domain::entities::Environment;
    use std::collections::HashMap;
    use uuid::Uuid;

    async fn collector() -> Arc<PerformanceCollector> {
        let baselines = Arc::new(SqliteBaselineRepository::new(
            schema::in_memory_database().await.unwrap(),
        ));
        Arc::new(PerformanceCollector::new(Environment::Staging, baselines))
    }

    #[tokio::test]
    async fn test_visual_embedding_embeds_each_image() {
        let store = Arc::new(InMemoryObjectStore::new());
        store.put("documents/d/image_processing/image_0.bin", vec![1]).await.unwrap();
        store.put("documents/d/image_processing/image_1.bin", vec![2]).await.unwrap();

        let ai = Arc::new(StubAiService::new());
        let stage = VisualEmbeddingStage::new(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            Arc::clone(&ai) as Arc<dyn AiService>,
            collector().await,
        );

        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::ImageProcessing,
            serde_json::json!({
                "images": ["documents/d/image_processing/image_0.bin", "documents/d/image_processing/image_1.bin"],
                "count": 2,
            }),
        );
        let ctx = ProcessingContext::new(
            DocumentId::new(),
            Uuid::new_v4(),
            StageName::VisualEmbedding,
            serde_json::json!({"source_key": "k", "source_sha256": "ab".repeat(32)}),
            outputs,
        )
        .unwrap();

        let output = stage.execute(&ctx).await.unwrap();
        assert_eq!(output["count"], 2);
        assert_eq!(output["dim"], 4);
        assert_eq!(ai.call_count(), 2);
    }

    #[tokio::test]
    async fn test_embedding_surfaces_http_failures() {
        let store = Arc::new(InMemoryObjectStore::new());
        let ai = Arc::new(StubAiService::new());
        ai.fail_next_texts(1, 503);
        let stage = EmbeddingStage::new(
            store,
            ai,
            collector().await,
        );

        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::MetadataExtraction,
            serde_json::json!({"title": "Manual", "language": "en", "keywords": [], "chunk_count": 1}),
        );
        outputs.insert(
            StageName::VisualEmbedding,
            serde_json::json!({"count": 1, "dim": 4}),
        );
        let ctx = ProcessingContext::new(
            DocumentId::new(),
            Uuid::new_v4(),
            StageName::Embedding,
            serde_json::json!({"source_key": "k", "source_sha256": "ab".repeat(32)}),
            outputs,
        )
        .unwrap();

        let err = stage.execute(&ctx).await.unwrap_err();
        assert_eq!(err.error_code(), "transient_external");
    }
}
