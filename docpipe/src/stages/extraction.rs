// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extraction Stages
//!
//! Text, table, vector-graphic, raster-image and link extraction. The four
//! source-reading stages each declare the matching layer digest from the
//! upload output, so their idempotency hashes track exactly the slice of
//! the document they consume. Link extraction runs over the extracted text.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use docpipe_domain::entities::ProcessingContext;
use docpipe_domain::services::object_store::stage_prefix;
use docpipe_domain::services::{ObjectStore, Stage};
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use super::{artifact_key, upstream_input};

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://[^\s<>'\x22]+").expect("url pattern is valid"));

fn source_key(ctx: &ProcessingContext) -> Result<&str, PipelineError> {
    ctx.input_data()
        .get("source_key")
        .and_then(|v| v.as_str())
        .ok_or_else(|| PipelineError::MissingField("source_key".to_string()))
}

fn layer_input(
    ctx: &ProcessingContext,
    stage: StageName,
    layer: &str,
) -> Result<serde_json::Value, PipelineError> {
    let upload = ctx.require_upstream(StageName::Upload)?;
    let digest = upload
        .get("layers")
        .and_then(|l| l.get(layer))
        .and_then(|v| v.as_str())
        .ok_or_else(|| PipelineError::SchemaMismatch(format!("Upload output missing layer {}", layer)))?;
    Ok(serde_json::json!({
        "document_id": ctx.document_id().to_string(),
        "stage": stage.as_str(),
        "source_key": source_key(ctx)?,
        "layer": digest,
    }))
}

async fn read_source(store: &dyn ObjectStore, ctx: &ProcessingContext) -> Result<Vec<u8>, PipelineError> {
    let key = source_key(ctx)?;
    store
        .get(key)
        .await?
        .ok_or_else(|| PipelineError::ValidationError(format!("Source object missing: {}", key)))
}

/// Extracts the text layer of the source document.
pub struct TextExtractionStage {
    store: Arc<dyn ObjectStore>,
}

impl TextExtractionStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for TextExtractionStage {
    fn name(&self) -> StageName {
        StageName::TextExtraction
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        layer_input(ctx, self.name(), "text")
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let bytes = read_source(self.store.as_ref(), ctx).await?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "text.txt"),
                text.clone().into_bytes(),
            )
            .await?;

        Ok(serde_json::json!({
            "text": text,
            "length": text.chars().count(),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Extracts tables: lines containing cell separators become rows.
pub struct TableExtractionStage {
    store: Arc<dyn ObjectStore>,
}

impl TableExtractionStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for TableExtractionStage {
    fn name(&self) -> StageName {
        StageName::TableExtraction
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        layer_input(ctx, self.name(), "tables")
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let bytes = read_source(self.store.as_ref(), ctx).await?;
        let text = String::from_utf8_lossy(&bytes);

        let rows: Vec<Vec<String>> = text
            .lines()
            .filter(|line| line.contains('|'))
            .map(|line| line.split('|').map(|cell| cell.trim().to_string()).collect())
            .collect();

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "tables.json"),
                serde_json::to_vec(&rows)?,
            )
            .await?;

        Ok(serde_json::json!({
            "row_count": rows.len(),
            "tables": if rows.is_empty() { 0 } else { 1 },
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Processes vector graphics: counts embedded drawing markers.
pub struct SvgProcessingStage {
    store: Arc<dyn ObjectStore>,
}

impl SvgProcessingStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for SvgProcessingStage {
    fn name(&self) -> StageName {
        StageName::SvgProcessing
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        layer_input(ctx, self.name(), "vector")
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let bytes = read_source(self.store.as_ref(), ctx).await?;
        let text = String::from_utf8_lossy(&bytes);
        let drawings = text.matches("<svg").count();

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "drawings.json"),
                serde_json::to_vec(&serde_json::json!({"drawings": drawings}))?,
            )
            .await?;

        Ok(serde_json::json!({"drawings": drawings}))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Processes raster images: slices the raster layer into addressable
/// image artifacts.
pub struct ImageProcessingStage {
    store: Arc<dyn ObjectStore>,
}

impl ImageProcessingStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

/// Upper bound on bytes per extracted image artifact.
const IMAGE_SLICE_BYTES: usize = 4096;

#[async_trait]
impl Stage for ImageProcessingStage {
    fn name(&self) -> StageName {
        StageName::ImageProcessing
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        layer_input(ctx, self.name(), "raster")
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let bytes = read_source(self.store.as_ref(), ctx).await?;

        let mut keys = Vec::new();
        for (index, slice) in bytes.chunks(IMAGE_SLICE_BYTES).enumerate() {
            let key = artifact_key(ctx.document_id(), self.name(), &format!("image_{}.bin", index));
            self.store.put(&key, slice.to_vec()).await?;
            keys.push(key);
        }

        Ok(serde_json::json!({
            "images": keys,
            "count": keys.len(),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Extracts hyperlinks from the extracted text.
pub struct LinkExtractionStage {
    store: Arc<dyn ObjectStore>,
}

impl LinkExtractionStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for LinkExtractionStage {
    fn name(&self) -> StageName {
        StageName::LinkExtraction
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(ctx, self.name(), &[StageName::TextExtraction])
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let text = ctx
            .require_upstream(StageName::TextExtraction)?
            .get("text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::SchemaMismatch("Text extraction output missing text".into()))?;

        let links: Vec<String> = URL_PATTERN
            .find_iter(text)
            .map(|m| m.as_str().to_string())
            .collect();

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "links.json"),
                serde_json::to_vec(&links)?,
            )
            .await?;

        Ok(serde_json::json!({
            "links": links,
            "count": links.len(),
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

    fn ctx_with_upload(doc: DocumentId, stage: StageName, source: &str) -> ProcessingContext {
        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::Upload,
            serde_json::json!({
                "source_key": "documents/d/source.pdf",
                "size": source.len(),
                "layers": {"text": "t", "tables": "ta", "vector": "v", "raster": "r"},
            }),
        );
        ProcessingContext::new(
            doc,
            Uuid::new_v4(),
            stage,
            serde_json::json!({"source_key": "documents/d/source.pdf", "source_sha256": "ab".repeat(32)}),
            outputs,
        )
        .unwrap()
    }

    async fn store_with_source(source: &str) -> Arc<InMemoryObjectStore> {
        let store = Arc::new(InMemoryObjectStore::new());
        store
            .put("documents/d/source.pdf", source.as_bytes().to_vec())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_text_extraction() {
        let store = store_with_source("Operator manual\nhttps://example.com/parts").await;
        let stage = TextExtractionStage::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let doc = DocumentId::new();

        let output = stage
            .execute(&ctx_with_upload(doc, StageName::TextExtraction, "x"))
            .await
            .unwrap();
        assert!(output["text"].as_str().unwrap().contains("Operator manual"));

        // Artifact persisted under the stage prefix
        let artifact = store
            .get(&artifact_key(doc, StageName::TextExtraction, "text.txt"))
            .await
            .unwrap();
        assert!(artifact.is_some());
    }

    #[tokio::test]
    async fn test_table_extraction_rows() {
        let store = store_with_source("part | qty\nAB-100 | 2\nno table here").await;
        let stage = TableExtractionStage::new(store);

        let output = stage
            .execute(&ctx_with_upload(DocumentId::new(), StageName::TableExtraction, "x"))
            .await
            .unwrap();
        assert_eq!(output["row_count"], 2);
    }

    #[tokio::test]
    async fn test_link_extraction() {
        let store = Arc::new(InMemoryObjectStore::new());
        let stage = LinkExtractionStage::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let doc = DocumentId::new();

        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::TextExtraction,
            serde_json::json!({"text": "see https://example.com/a and https://example.com/b.", "length": 44}),
        );
        let ctx = ProcessingContext::new(
            doc,
            Uuid::new_v4(),
            StageName::LinkExtraction,
            serde_json::json!({"source_key": "k", "source_sha256": "ab".repeat(32)}),
            outputs,
        )
        .unwrap();

        let output = stage.execute(&ctx).await.unwrap();
        assert_eq!(output["count"], 2);
    }

    #[tokio::test]
    async fn test_image_processing_slices() {
        let big = "x".repeat(IMAGE_SLICE_BYTES + 1);
        let store = store_with_source(&big).await;
        let stage = ImageProcessingStage::new(Arc::clone(&store) as Arc<dyn ObjectStore>);
        let doc = DocumentId::new();

        let output = stage
            .execute(&ctx_with_upload(doc, StageName::ImageProcessing, &big))
            .await
            .unwrap();
        assert_eq!(output["count"], 2);

        // Cleanup is a prefix delete and therefore idempotent
        stage.cleanup(doc).await.unwrap();
        stage.cleanup(doc).await.unwrap();
        assert!(store
            .list(&stage_prefix(doc, StageName::ImageProcessing))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_declared_input_tracks_layer_only() {
        let stage = TextExtractionStage::new(Arc::new(InMemoryObjectStore::new()));
        let doc = DocumentId::new();
        let input = stage
            .declared_input(&ctx_with_upload(doc, StageName::TextExtraction, "x"))
            .unwrap();
        assert_eq!(input["layer"], "t");
        assert!(input.get("upstream").is_none());
    }
}
