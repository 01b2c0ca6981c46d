// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Processing Context
//!
//! Ephemeral, in-memory context handed to a stage invocation: identity of the
//! document and request, the current retry attempt, the most specific
//! correlation id in scope, the stage's opaque input, and a read-only view of
//! prior stage outputs within the same request.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::PipelineError;
use crate::value_objects::{CorrelationId, DocumentId, StageName};

/// Per-invocation execution context. Cheap to clone; stage outputs are shared
/// JSON values.
#[derive(Debug, Clone)]
pub struct ProcessingContext {
    document_id: DocumentId,
    request_id: Uuid,
    stage_name: StageName,
    retry_attempt: u32,
    correlation_id: CorrelationId,
    /// Opaque stage input; each stage defines its own shape
    input_data: serde_json::Value,
    /// Outputs of prerequisite stages, by stage name
    stage_outputs: HashMap<StageName, serde_json::Value>,
}

impl ProcessingContext {
    /// Creates a context for a first (non-retry) invocation of a stage.
    ///
    /// The correlation id is extended to stage level here, once.
    pub fn new(
        document_id: DocumentId,
        request_id: Uuid,
        stage_name: StageName,
        input_data: serde_json::Value,
        stage_outputs: HashMap<StageName, serde_json::Value>,
    ) -> Result<Self, PipelineError> {
        let correlation_id = CorrelationId::for_request(request_id).extend(stage_name)?;
        Ok(Self {
            document_id,
            request_id,
            stage_name,
            retry_attempt: 0,
            correlation_id,
            input_data,
            stage_outputs,
        })
    }

    /// Derives the context for retry attempt `n` of the same invocation.
    ///
    /// Retry attempts are strictly increasing; the correlation id gains its
    /// retry level exactly once per attempt.
    pub fn for_retry(&self, retry_attempt: u32) -> Result<Self, PipelineError> {
        if retry_attempt <= self.retry_attempt && self.retry_attempt > 0 {
            return Err(PipelineError::internal_error(format!(
                "Retry attempt must increase: {} -> {}",
                self.retry_attempt, retry_attempt
            )));
        }
        let base = CorrelationId::for_request(self.request_id).extend(self.stage_name)?;
        Ok(Self {
            retry_attempt,
            correlation_id: base.extend_retry(retry_attempt)?,
            ..self.clone()
        })
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn stage_name(&self) -> StageName {
        self.stage_name
    }

    pub fn retry_attempt(&self) -> u32 {
        self.retry_attempt
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn input_data(&self) -> &serde_json::Value {
        &self.input_data
    }

    /// Output of a prerequisite stage within this request, if present
    pub fn upstream(&self, stage: StageName) -> Option<&serde_json::Value> {
        self.stage_outputs.get(&stage)
    }

    /// Output of a prerequisite stage, as an error if missing
    pub fn require_upstream(&self, stage: StageName) -> Result<&serde_json::Value, PipelineError> {
        self.upstream(stage).ok_or_else(|| {
            PipelineError::PrerequisiteNotMet(format!(
                "Stage {} requires output of {} which is not available",
                self.stage_name, stage
            ))
        })
    }

    pub fn stage_outputs(&self) -> &HashMap<StageName, serde_json::Value> {
        &self.stage_outputs
    }
}
