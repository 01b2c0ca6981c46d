// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Completion Markers
//!
//! Persistent evidence that a specific stage finished for a specific document
//! with a specific input hash. Markers are unique on (document, stage): they
//! are read before a stage runs, written when it succeeds, and overwritten
//! when changed input forces re-execution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::value_objects::{DocumentId, StageName};

/// Marker row for one (document, stage) completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    document_id: DocumentId,
    stage_name: StageName,
    completed_at: DateTime<Utc>,
    /// SHA-256 hex digest of the stage's canonical input
    data_hash: String,
    metadata: serde_json::Value,
}

impl CompletionMarker {
    /// Creates a marker, validating the hash shape (64 lowercase hex chars)
    pub fn new(
        document_id: DocumentId,
        stage_name: StageName,
        data_hash: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<Self, PipelineError> {
        let data_hash = data_hash.into();
        if data_hash.len() != 64 || !data_hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::validation(format!(
                "Completion marker data hash must be 64 hex chars, got '{}'",
                data_hash
            )));
        }
        Ok(Self {
            document_id,
            stage_name,
            completed_at: Utc::now(),
            data_hash: data_hash.to_lowercase(),
            metadata,
        })
    }

    /// Restores a marker from persistence
    pub fn from_parts(
        document_id: DocumentId,
        stage_name: StageName,
        completed_at: DateTime<Utc>,
        data_hash: String,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            document_id,
            stage_name,
            completed_at,
            data_hash,
            metadata,
        }
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn stage_name(&self) -> StageName {
        self.stage_name
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    pub fn data_hash(&self) -> &str {
        &self.data_hash
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    /// Whether the stored hash matches the given current input hash
    pub fn matches(&self, current_hash: &str) -> bool {
        self.data_hash == current_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_validation() {
        let ok = CompletionMarker::new(
            DocumentId::new(),
            StageName::Upload,
            "ab".repeat(32),
            serde_json::json!({}),
        );
        assert!(ok.is_ok());

        let short = CompletionMarker::new(
            DocumentId::new(),
            StageName::Upload,
            "abc",
            serde_json::json!({}),
        );
        assert!(short.is_err());
    }

    #[test]
    fn test_hash_matching() {
        let hash = "0f".repeat(32);
        let marker = CompletionMarker::new(
            DocumentId::new(),
            StageName::ChunkPrep,
            hash.clone(),
            serde_json::json!({"chunks": 3}),
        )
        .unwrap();
        assert!(marker.matches(&hash));
        assert!(!marker.matches(&"ee".repeat(32)));
    }
}
