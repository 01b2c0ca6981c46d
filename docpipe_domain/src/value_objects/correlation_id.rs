// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Correlation Identifiers
//!
//! Hierarchical identifiers threading through every log line, error record
//! and timing record produced by the core. The canonical grammar is:
//!
//! ```text
//! cid        := "req_" uuid [ "." "stage_" stage_name [ "." "retry_" nonneg_int ] ]
//! uuid       := RFC 4122 lowercase v4
//! stage_name := one of the fifteen stage names
//! ```
//!
//! The three levels form a strict hierarchy: `req_X` < `req_X.stage_Y` <
//! `req_X.stage_Y.retry_N`. A correlation id is assigned exactly once per
//! level and passed by value; log records must include it verbatim.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::value_objects::stage_name::StageName;

fn grammar() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^req_([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})(?:\.stage_([a-z_]+)(?:\.retry_([0-9]+))?)?$",
        )
        .expect("correlation id grammar is valid")
    })
}

/// Decomposed view of a correlation id, for log filtering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCorrelationId {
    pub request_id: Uuid,
    pub stage: Option<StageName>,
    pub retry_attempt: Option<u32>,
}

/// Immutable hierarchical correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Creates a request-level correlation id: `req_<uuid-v4>`
    pub fn new_request() -> Self {
        Self::for_request(Uuid::new_v4())
    }

    /// Creates a request-level correlation id for a known request UUID
    pub fn for_request(request_id: Uuid) -> Self {
        Self(format!("req_{}", request_id))
    }

    /// Extends a request-level id to stage level: `<parent>.stage_<name>`.
    ///
    /// Extending anything other than a request-level id violates the
    /// assigned-once-per-level rule and is rejected.
    pub fn extend(&self, stage: StageName) -> Result<Self, PipelineError> {
        let parsed = self.parse()?;
        if parsed.stage.is_some() {
            return Err(PipelineError::InternalError(format!(
                "Correlation id '{}' already carries a stage level",
                self.0
            )));
        }
        Ok(Self(format!("{}.stage_{}", self.0, stage)))
    }

    /// Extends a stage-level id to retry level: `<parent>.retry_<n>`.
    pub fn extend_retry(&self, retry_attempt: u32) -> Result<Self, PipelineError> {
        let parsed = self.parse()?;
        if parsed.stage.is_none() {
            return Err(PipelineError::InternalError(format!(
                "Correlation id '{}' has no stage level to retry",
                self.0
            )));
        }
        if parsed.retry_attempt.is_some() {
            return Err(PipelineError::InternalError(format!(
                "Correlation id '{}' already carries a retry level",
                self.0
            )));
        }
        Ok(Self(format!("{}.retry_{}", self.0, retry_attempt)))
    }

    /// Parses the canonical form into its parts.
    pub fn parse(&self) -> Result<ParsedCorrelationId, PipelineError> {
        Self::parse_str(&self.0)
    }

    /// Parses an arbitrary string against the grammar.
    pub fn parse_str(s: &str) -> Result<ParsedCorrelationId, PipelineError> {
        let captures = grammar()
            .captures(s)
            .ok_or_else(|| PipelineError::ValidationError(format!("Invalid correlation id: {}", s)))?;

        let request_id = Uuid::parse_str(&captures[1])
            .map_err(|e| PipelineError::ValidationError(format!("Invalid request uuid in '{}': {}", s, e)))?;

        let stage = match captures.get(2) {
            Some(m) => Some(m.as_str().parse::<StageName>()?),
            None => None,
        };

        let retry_attempt = match captures.get(3) {
            Some(m) => Some(m.as_str().parse::<u32>().map_err(|e| {
                PipelineError::ValidationError(format!("Invalid retry attempt in '{}': {}", s, e))
            })?),
            None => None,
        };

        Ok(ParsedCorrelationId {
            request_id,
            stage,
            retry_attempt,
        })
    }

    /// Constructs a correlation id from a stored string, validating it.
    pub fn from_string(s: String) -> Result<Self, PipelineError> {
        Self::parse_str(&s)?;
        Ok(Self(s))
    }

    /// Gets the request-level prefix (`req_<uuid>`) of this id.
    pub fn request_prefix(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// String form, logged verbatim.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
