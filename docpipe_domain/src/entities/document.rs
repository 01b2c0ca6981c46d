// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Document Entity
//!
//! A document is the unit of work the pipeline operates on: an immutable
//! pointer to source bytes in the object store plus mutable metadata and the
//! per-stage status map. The core treats the document largely as a key; the
//! ingestion boundary owns its creation.
//!
//! ## Stage Status Invariant
//!
//! Every stage in the registry has a defined status for every document that
//! has entered the pipeline, defaulting to `not_started`. The map is
//! persisted as a single JSON column on the document row, and the
//! `completed` state is kept in lock-step with completion markers by the
//! idempotency checker's transactional writes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::value_objects::{DocumentId, StageName};

/// Per-stage processing state for one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::NotStarted => "not_started",
            StageState::Pending => "pending",
            StageState::InProgress => "in_progress",
            StageState::Completed => "completed",
            StageState::Failed => "failed",
            StageState::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mapping from stage name to its state, with `not_started` as the default
/// for any stage not yet touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageStatusMap(BTreeMap<StageName, StageState>);

impl StageStatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of one stage, defaulting to `not_started`
    pub fn get(&self, stage: StageName) -> StageState {
        self.0.get(&stage).copied().unwrap_or(StageState::NotStarted)
    }

    /// Sets the state of one stage
    pub fn set(&mut self, stage: StageName, state: StageState) {
        self.0.insert(stage, state);
    }

    /// Complete view over the full registry, including defaulted entries
    pub fn all(&self) -> BTreeMap<StageName, StageState> {
        StageName::ALL
            .iter()
            .map(|stage| (*stage, self.get(*stage)))
            .collect()
    }

    /// Stages currently in the given state
    pub fn stages_in(&self, state: StageState) -> Vec<StageName> {
        StageName::ALL
            .iter()
            .copied()
            .filter(|stage| self.get(*stage) == state)
            .collect()
    }
}

/// Core document entity.
///
/// Identity is the `DocumentId`; the source pointer is immutable after
/// creation while metadata and stage status evolve as the pipeline runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    id: DocumentId,
    /// Object-store key of the source bytes (`documents/<uuid>/source.pdf`)
    source_key: String,
    /// SHA-256 hex digest of the source bytes, fixed at ingestion
    source_sha256: String,
    metadata: serde_json::Value,
    stage_status: StageStatusMap,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Document {
    /// Creates a new document entity pointing at uploaded source bytes
    pub fn new(
        id: DocumentId,
        source_key: impl Into<String>,
        source_sha256: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let source_key = source_key.into();
        let source_sha256 = source_sha256.into();
        if source_key.is_empty() {
            return Err(PipelineError::validation("Document source key cannot be empty"));
        }
        if source_sha256.len() != 64 || !source_sha256.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(PipelineError::validation(format!(
                "Document source hash must be 64 hex chars, got '{}'",
                source_sha256
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id,
            source_key,
            source_sha256: source_sha256.to_lowercase(),
            metadata: serde_json::Value::Object(serde_json::Map::new()),
            stage_status: StageStatusMap::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Restores a document from persistence without re-validating timestamps
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: DocumentId,
        source_key: String,
        source_sha256: String,
        metadata: serde_json::Value,
        stage_status: StageStatusMap,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_key,
            source_sha256,
            metadata,
            stage_status,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    pub fn source_sha256(&self) -> &str {
        &self.source_sha256
    }

    pub fn metadata(&self) -> &serde_json::Value {
        &self.metadata
    }

    pub fn stage_status(&self) -> &StageStatusMap {
        &self.stage_status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Updates one stage's state and bumps the entity timestamp
    pub fn set_stage_state(&mut self, stage: StageName, state: StageState) {
        self.stage_status.set(stage, state);
        self.updated_at = Utc::now();
    }

    /// Replaces document metadata
    pub fn set_metadata(&mut self, metadata: serde_json::Value) {
        self.metadata = metadata;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hash() -> String {
        "a".repeat(64)
    }

    #[test]
    fn test_new_document_defaults() {
        let doc = Document::new(DocumentId::new(), "documents/x/source.pdf", test_hash()).unwrap();
        for stage in StageName::ALL {
            assert_eq!(doc.stage_status().get(stage), StageState::NotStarted);
        }
    }

    #[test]
    fn test_source_validation() {
        assert!(Document::new(DocumentId::new(), "", test_hash()).is_err());
        assert!(Document::new(DocumentId::new(), "k", "deadbeef").is_err());
        assert!(Document::new(DocumentId::new(), "k", "z".repeat(64)).is_err());
    }

    #[test]
    fn test_stage_state_updates() {
        let mut doc = Document::new(DocumentId::new(), "k", test_hash()).unwrap();
        doc.set_stage_state(StageName::Upload, StageState::Completed);
        doc.set_stage_state(StageName::TextExtraction, StageState::InProgress);
        assert_eq!(doc.stage_status().get(StageName::Upload), StageState::Completed);
        assert_eq!(
            doc.stage_status().stages_in(StageState::InProgress),
            vec![StageName::TextExtraction]
        );
    }

    #[test]
    fn test_status_map_serde_round_trip() {
        let mut map = StageStatusMap::new();
        map.set(StageName::Upload, StageState::Completed);
        map.set(StageName::Embedding, StageState::Failed);
        let json = serde_json::to_string(&map).unwrap();
        let back: StageStatusMap = serde_json::from_str(&json).unwrap();
        assert_eq!(map, back);
        assert_eq!(back.get(StageName::Storage), StageState::NotStarted);
    }
}
