// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing Stages
//!
//! Chunk preparation, classification, metadata extraction, parts extraction
//! and series detection. These operate on extracted text and on each other's
//! outputs; the domain-specific extractors behind parts and series detection
//! are stand-ins for the real ones, which live outside the core.

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

/// Characters per chunk.
const CHUNK_SIZE: usize = 512;

/// Classification evidence excerpt length.
const EXCERPT_CHARS: usize = 160;

static PART_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2,}-?\d{2,}\b").expect("part pattern is valid"));

static SERIES_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Z][a-zA-Z]+)\s+[Ss]eries\b").expect("series pattern is valid"));

/// Splits extracted text into fixed-size chunks for embedding and search.
pub struct ChunkPrepStage {
    store: Arc<dyn ObjectStore>,
}

impl ChunkPrepStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for ChunkPrepStage {
    fn name(&self) -> StageName {
        StageName::ChunkPrep
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

        let chars: Vec<char> = text.chars().collect();
        let chunks: Vec<serde_json::Value> = chars
            .chunks(CHUNK_SIZE)
            .enumerate()
            .map(|(index, window)| {
                serde_json::json!({
                    "index": index,
                    "text": window.iter().collect::<String>(),
                })
            })
            .collect();

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "chunks.json"),
                serde_json::to_vec(&chunks)?,
            )
            .await?;

        Ok(serde_json::json!({
            "chunks": chunks,
            "count": chunks.len(),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

fn chunk_texts(ctx: &ProcessingContext) -> Result<Vec<String>, PipelineError> {
    let chunks = ctx
        .require_upstream(StageName::ChunkPrep)?
        .get("chunks")
        .and_then(|v| v.as_array())
        .ok_or_else(|| PipelineError::SchemaMismatch("Chunk prep output missing chunks".into()))?;
    Ok(chunks
        .iter()
        .filter_map(|c| c.get("text").and_then(|t| t.as_str()))
        .map(|s| s.to_string())
        .collect())
}

/// Classifies the document and keeps an evidence excerpt for the
/// downstream extractors.
pub struct ClassificationStage {
    store: Arc<dyn ObjectStore>,
}

impl ClassificationStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for ClassificationStage {
    fn name(&self) -> StageName {
        StageName::Classification
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(ctx, self.name(), &[StageName::ChunkPrep])
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let texts = chunk_texts(ctx)?;
        if texts.iter().all(|t| t.trim().is_empty()) {
            return Err(PipelineError::validation(
                "No textual content to classify",
            ));
        }
        let joined = texts.join(" ");
        let lowered = joined.to_lowercase();

        let (doc_type, confidence) = if lowered.contains("manual") || lowered.contains("instructions") {
            ("technical_manual", 0.9)
        } else if lowered.contains("datasheet") || lowered.contains("specification") {
            ("datasheet", 0.8)
        } else {
            ("generic", 0.5)
        };

        let excerpt: String = joined.chars().take(EXCERPT_CHARS).collect();

        Ok(serde_json::json!({
            "doc_type": doc_type,
            "confidence": confidence,
            "excerpt": excerpt,
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Extracts document metadata: title, language, keywords.
pub struct MetadataExtractionStage {
    store: Arc<dyn ObjectStore>,
}

impl MetadataExtractionStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for MetadataExtractionStage {
    fn name(&self) -> StageName {
        StageName::MetadataExtraction
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(ctx, self.name(), &[StageName::ChunkPrep])
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let texts = chunk_texts(ctx)?;
        let first = texts.first().map(String::as_str).unwrap_or("");

        let title: String = first.lines().next().unwrap_or("").chars().take(80).collect();
        let language = if first.is_ascii() { "en" } else { "unknown" };

        // Keyword candidates: the longest distinct words, few enough to ride
        // along in the output.
        let mut words: Vec<&str> = first
            .split_whitespace()
            .filter(|w| w.len() > 4)
            .collect();
        words.sort_unstable();
        words.dedup();
        words.sort_by_key(|w| std::cmp::Reverse(w.len()));
        let keywords: Vec<String> = words.into_iter().take(8).map(|w| w.to_lowercase()).collect();

        Ok(serde_json::json!({
            "title": title,
            "language": language,
            "keywords": keywords,
            "chunk_count": texts.len(),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Extracts part numbers from the classification evidence.
pub struct PartsExtractionStage {
    store: Arc<dyn ObjectStore>,
}

impl PartsExtractionStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for PartsExtractionStage {
    fn name(&self) -> StageName {
        StageName::PartsExtraction
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(ctx, self.name(), &[StageName::Classification])
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let classification = ctx.require_upstream(StageName::Classification)?;
        let excerpt = classification
            .get("excerpt")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let mut parts: Vec<String> = PART_PATTERN
            .find_iter(excerpt)
            .map(|m| m.as_str().to_string())
            .collect();
        parts.sort();
        parts.dedup();

        self.store
            .put(
                &artifact_key(ctx.document_id(), self.name(), "parts.json"),
                serde_json::to_vec(&parts)?,
            )
            .await?;

        Ok(serde_json::json!({
            "parts": parts,
            "count": parts.len(),
        }))
    }

    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError> {
        self.store.delete_prefix(&stage_prefix(document_id, self.name())).await
    }
}

/// Detects product series references in the classification evidence.
pub struct SeriesDetectionStage {
    store: Arc<dyn ObjectStore>,
}

impl SeriesDetectionStage {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for SeriesDetectionStage {
    fn name(&self) -> StageName {
        StageName::SeriesDetection
    }

    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        upstream_input(ctx, self.name(), &[StageName::Classification])
    }

    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError> {
        let classification = ctx.require_upstream(StageName::Classification)?;
        let excerpt = classification
            .get("excerpt")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let confidence = classification
            .get("confidence")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        let mut series: Vec<String> = SERIES_PATTERN
            .captures_iter(excerpt)
            .map(|c| c[1].to_string())
            .collect();
        series.sort();
        series.dedup();

        Ok(serde_json::json!({
            "series": series,
            "detected": !series.is_empty(),
            "classifier_confidence": confidence,
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

    fn ctx(stage: StageName, outputs: HashMap<StageName, serde_json::Value>) -> ProcessingContext {
        ProcessingContext::new(
            DocumentId::new(),
            Uuid::new_v4(),
            stage,
            serde_json::json!({"source_key": "k", "source_sha256": "ab".repeat(32)}),
            outputs,
        )
        .unwrap()
    }

    fn text_outputs(text: &str) -> HashMap<StageName, serde_json::Value> {
        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::TextExtraction,
            serde_json::json!({"text": text, "length": text.len()}),
        );
        outputs
    }

    #[tokio::test]
    async fn test_chunk_prep_splits_long_text() {
        let store = Arc::new(InMemoryObjectStore::new());
        let stage = ChunkPrepStage::new(store);
        let long = "x".repeat(CHUNK_SIZE * 2 + 10);

        let output = stage
            .execute(&ctx(StageName::ChunkPrep, text_outputs(&long)))
            .await
            .unwrap();
        assert_eq!(output["count"], 3);
        assert_eq!(output["chunks"][0]["index"], 0);
    }

    fn chunk_outputs(text: &str) -> HashMap<StageName, serde_json::Value> {
        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::ChunkPrep,
            serde_json::json!({"chunks": [{"index": 0, "text": text}], "count": 1}),
        );
        outputs
    }

    #[tokio::test]
    async fn test_classification_detects_manual() {
        let stage = ClassificationStage::new(Arc::new(InMemoryObjectStore::new()));
        let output = stage
            .execute(&ctx(
                StageName::Classification,
                chunk_outputs("Xerox Phaser operator manual, AB-1000 Series"),
            ))
            .await
            .unwrap();
        assert_eq!(output["doc_type"], "technical_manual");
        assert!(output["excerpt"].as_str().unwrap().contains("Phaser"));
    }

    #[tokio::test]
    async fn test_parts_extraction_from_excerpt() {
        let stage = PartsExtractionStage::new(Arc::new(InMemoryObjectStore::new()));
        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::Classification,
            serde_json::json!({
                "doc_type": "technical_manual",
                "confidence": 0.9,
                "excerpt": "Replace AB-100 with AB-200; AB-100 is discontinued.",
            }),
        );

        let output = stage
            .execute(&ctx(StageName::PartsExtraction, outputs))
            .await
            .unwrap();
        assert_eq!(output["parts"], serde_json::json!(["AB-100", "AB-200"]));
        assert_eq!(output["count"], 2);
    }

    #[tokio::test]
    async fn test_series_detection() {
        let stage = SeriesDetectionStage::new(Arc::new(InMemoryObjectStore::new()));
        let mut outputs = HashMap::new();
        outputs.insert(
            StageName::Classification,
            serde_json::json!({
                "doc_type": "technical_manual",
                "confidence": 0.9,
                "excerpt": "The Phaser series replaces the older Magicolor Series lineup.",
            }),
        );

        let output = stage
            .execute(&ctx(StageName::SeriesDetection, outputs))
            .await
            .unwrap();
        assert_eq!(output["detected"], true);
        assert_eq!(output["series"], serde_json::json!(["Magicolor", "Phaser"]));
    }

    #[tokio::test]
    async fn test_metadata_title_is_first_line() {
        let stage = MetadataExtractionStage::new(Arc::new(InMemoryObjectStore::new()));
        let output = stage
            .execute(&ctx(
                StageName::MetadataExtraction,
                chunk_outputs("Operator Manual\nSecond line"),
            ))
            .await
            .unwrap();
        assert_eq!(output["title"], "Operator Manual");
        assert_eq!(output["language"], "en");
        assert_eq!(output["chunk_count"], 1);
    }
}
