// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Implementations
//!
//! The fifteen built-in stages, grouped the way the pipeline groups them:
//! initialization (`upload`), extraction, processing, enrichment and
//! finalization. Every stage is a black-box transformer behind the uniform
//! `Stage` contract: a declared input assembled from the document and the
//! outputs of direct prerequisites, a deterministic canonical serialization
//! of that input, an `execute` whose only side effects go through the
//! enumerated collaborators, and an idempotent prefix-delete cleanup.
//!
//! The extraction algorithms themselves are deliberately simple stand-ins;
//! the real extractors live outside the core and honor the same contracts.

pub mod enrichment;
pub mod extraction;
pub mod finalization;
pub mod processing;
pub mod upload;

use std::sync::Arc;

use docpipe_domain::entities::ProcessingContext;
use docpipe_domain::services::object_store::stage_prefix;
use docpipe_domain::services::{AiService, ObjectStore, Stage};
use docpipe_domain::value_objects::{DocumentId, StageName};
use docpipe_domain::PipelineError;

use crate::application::performance::PerformanceCollector;

pub use enrichment::{EmbeddingStage, VisualEmbeddingStage};
pub use extraction::{
    ImageProcessingStage, LinkExtractionStage, SvgProcessingStage, TableExtractionStage,
    TextExtractionStage,
};
pub use finalization::{SearchIndexingStage, StorageStage};
pub use processing::{
    ChunkPrepStage, ClassificationStage, MetadataExtractionStage, PartsExtractionStage,
    SeriesDetectionStage,
};
pub use upload::UploadStage;

/// All fifteen built-in stages wired to their collaborators, in registry
/// declaration order.
pub fn builtin_stages(
    store: Arc<dyn ObjectStore>,
    ai: Arc<dyn AiService>,
    performance: Arc<PerformanceCollector>,
) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(UploadStage::new(Arc::clone(&store))),
        Arc::new(TextExtractionStage::new(Arc::clone(&store))),
        Arc::new(TableExtractionStage::new(Arc::clone(&store))),
        Arc::new(SvgProcessingStage::new(Arc::clone(&store))),
        Arc::new(ImageProcessingStage::new(Arc::clone(&store))),
        Arc::new(LinkExtractionStage::new(Arc::clone(&store))),
        Arc::new(ChunkPrepStage::new(Arc::clone(&store))),
        Arc::new(ClassificationStage::new(Arc::clone(&store))),
        Arc::new(MetadataExtractionStage::new(Arc::clone(&store))),
        Arc::new(PartsExtractionStage::new(Arc::clone(&store))),
        Arc::new(SeriesDetectionStage::new(Arc::clone(&store))),
        Arc::new(VisualEmbeddingStage::new(
            Arc::clone(&store),
            Arc::clone(&ai),
            Arc::clone(&performance),
        )),
        Arc::new(EmbeddingStage::new(Arc::clone(&store), ai, performance)),
        Arc::new(StorageStage::new(Arc::clone(&store))),
        Arc::new(SearchIndexingStage::new(store)),
    ]
}

/// Declared-input skeleton shared by stages whose input is the outputs of
/// their direct prerequisites: `{"document_id", "stage", "upstream": {...}}`.
pub(crate) fn upstream_input(
    ctx: &ProcessingContext,
    stage: StageName,
    prereqs: &[StageName],
) -> Result<serde_json::Value, PipelineError> {
    let mut upstream = serde_json::Map::new();
    for prereq in prereqs {
        upstream.insert(
            prereq.as_str().to_string(),
            ctx.require_upstream(*prereq)?.clone(),
        );
    }
    Ok(serde_json::json!({
        "document_id": ctx.document_id().to_string(),
        "stage": stage.as_str(),
        "upstream": upstream,
    }))
}

/// Object-store key of a stage-owned artifact.
pub(crate) fn artifact_key(document_id: DocumentId, stage: StageName, artifact: &str) -> String {
    format!("{}/{}", stage_prefix(document_id, stage), artifact)
}
