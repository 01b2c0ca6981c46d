// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Document Identifier
//!
//! Type-safe UUID wrapper for documents. The newtype prevents a document id
//! from being confused with a request id or any other UUID-shaped value at
//! compile time, and fixes the canonical lowercase-hyphenated form used in
//! database rows, object-store prefixes and advisory-lock key derivation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

/// Unique identifier for a document entering the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    /// Creates a new random document id (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parses a document id from its canonical string form
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| PipelineError::ValidationError(format!("Invalid document id '{}': {}", s, e)))
    }

    /// Gets the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Canonical form is lowercase hyphenated, matching uuid's Display
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let id = DocumentId::new();
        let parsed = DocumentId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_invalid_rejected() {
        assert!(DocumentId::parse("not-a-uuid").is_err());
        assert!(DocumentId::parse("").is_err());
    }

    #[test]
    fn test_display_is_lowercase() {
        let id = DocumentId::new();
        assert_eq!(id.to_string(), id.to_string().to_lowercase());
    }
}
