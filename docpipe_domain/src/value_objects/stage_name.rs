// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Names
//!
//! The closed set of fifteen pipeline stages and their grouping. The set is
//! fixed: the registry, the dependency graph and the orchestrator all dispatch
//! on this enum, so an unknown stage name can only ever appear at the string
//! boundary (CLI input, database rows) where parsing rejects it with
//! `unknown_stage`.
//!
//! Declaration order of [`StageName::ALL`] is the registry order used as the
//! tie-break among stages of equal depth in the dependency graph.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Functional grouping of stages, used for reporting and log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageGroup {
    Initialization,
    Extraction,
    Processing,
    Enrichment,
    Finalization,
}

/// One of the fifteen named units of work comprising the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Upload,
    TextExtraction,
    TableExtraction,
    SvgProcessing,
    ImageProcessing,
    LinkExtraction,
    ChunkPrep,
    Classification,
    MetadataExtraction,
    PartsExtraction,
    SeriesDetection,
    VisualEmbedding,
    Embedding,
    Storage,
    SearchIndexing,
}

impl StageName {
    /// All stages in registry declaration order.
    pub const ALL: [StageName; 15] = [
        StageName::Upload,
        StageName::TextExtraction,
        StageName::TableExtraction,
        StageName::SvgProcessing,
        StageName::ImageProcessing,
        StageName::LinkExtraction,
        StageName::ChunkPrep,
        StageName::Classification,
        StageName::MetadataExtraction,
        StageName::PartsExtraction,
        StageName::SeriesDetection,
        StageName::VisualEmbedding,
        StageName::Embedding,
        StageName::Storage,
        StageName::SearchIndexing,
    ];

    /// Canonical snake_case name as it appears in correlation ids, database
    /// rows and object-store prefixes.
    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Upload => "upload",
            StageName::TextExtraction => "text_extraction",
            StageName::TableExtraction => "table_extraction",
            StageName::SvgProcessing => "svg_processing",
            StageName::ImageProcessing => "image_processing",
            StageName::LinkExtraction => "link_extraction",
            StageName::ChunkPrep => "chunk_prep",
            StageName::Classification => "classification",
            StageName::MetadataExtraction => "metadata_extraction",
            StageName::PartsExtraction => "parts_extraction",
            StageName::SeriesDetection => "series_detection",
            StageName::VisualEmbedding => "visual_embedding",
            StageName::Embedding => "embedding",
            StageName::Storage => "storage",
            StageName::SearchIndexing => "search_indexing",
        }
    }

    /// Gets the functional group this stage belongs to
    pub fn group(&self) -> StageGroup {
        match self {
            StageName::Upload => StageGroup::Initialization,
            StageName::TextExtraction
            | StageName::TableExtraction
            | StageName::SvgProcessing
            | StageName::ImageProcessing
            | StageName::LinkExtraction => StageGroup::Extraction,
            StageName::ChunkPrep
            | StageName::Classification
            | StageName::MetadataExtraction
            | StageName::PartsExtraction
            | StageName::SeriesDetection => StageGroup::Processing,
            StageName::VisualEmbedding | StageName::Embedding => StageGroup::Enrichment,
            StageName::Storage | StageName::SearchIndexing => StageGroup::Finalization,
        }
    }

    /// Position in registry declaration order, the DAG tie-break key.
    pub fn registry_index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(usize::MAX)
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StageName {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownStage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_stage_name_display() {
        assert_eq!(format!("{}", StageName::Upload), "upload");
        assert_eq!(format!("{}", StageName::TextExtraction), "text_extraction");
        assert_eq!(format!("{}", StageName::SearchIndexing), "search_indexing");
    }

    #[test]
    fn test_stage_name_round_trip() {
        for stage in StageName::ALL {
            assert_eq!(StageName::from_str(stage.as_str()).unwrap(), stage);
        }
    }

    #[test]
    fn test_stage_name_from_str_invalid() {
        assert!(StageName::from_str("invalid").is_err());
        assert!(StageName::from_str("").is_err());
        // Names are case-sensitive, matching database and correlation id forms
        assert!(StageName::from_str("UPLOAD").is_err());
    }

    #[test]
    fn test_unknown_stage_error_code() {
        let err = StageName::from_str("ocr").unwrap_err();
        assert_eq!(err.error_code(), "unknown_stage");
    }

    #[test]
    fn test_stage_groups() {
        assert_eq!(StageName::Upload.group(), StageGroup::Initialization);
        assert_eq!(StageName::LinkExtraction.group(), StageGroup::Extraction);
        assert_eq!(StageName::SeriesDetection.group(), StageGroup::Processing);
        assert_eq!(StageName::Embedding.group(), StageGroup::Enrichment);
        assert_eq!(StageName::SearchIndexing.group(), StageGroup::Finalization);
    }

    #[test]
    fn test_registry_order_is_stable() {
        assert_eq!(StageName::Upload.registry_index(), 0);
        assert_eq!(StageName::SearchIndexing.registry_index(), 14);
        assert_eq!(StageName::ALL.len(), 15);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&StageName::ChunkPrep).unwrap();
        assert_eq!(json, "\"chunk_prep\"");
        let parsed: StageName = serde_json::from_str("\"visual_embedding\"").unwrap();
        assert_eq!(parsed, StageName::VisualEmbedding);
    }
}
