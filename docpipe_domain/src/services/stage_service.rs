// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Contract
//!
//! The uniform contract every one of the fifteen stages implements. The open
//! set of stage behaviors hides behind this trait; the closed set of stage
//! names is the [`StageName`] enum, bound to implementations by the registry.
//!
//! A stage is pure with respect to its declared input and the enumerated
//! external collaborators: identical declared input implies an identical
//! canonical serialization, which is what the idempotency checker hashes.
//! Cleanup removes the stage's persisted outputs and is itself idempotent,
//! so a crash between cleanup and re-execution re-enters correctly.

use async_trait::async_trait;

use crate::entities::ProcessingContext;
use crate::error::PipelineError;
use crate::services::canonical_json;
use crate::value_objects::{DocumentId, StageName};

/// Uniform input/output contract for a pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The closed name this implementation is registered under
    fn name(&self) -> StageName;

    /// Assembles the stage's declared input from the context: a subset of
    /// the document's fields plus outputs of prerequisite stages.
    fn declared_input(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError>;

    /// Deterministic serialization of the declared input, hashed by the
    /// idempotency checker. The default canonical-JSON form is shared by all
    /// built-in stages.
    fn canonical_input(&self, ctx: &ProcessingContext) -> Result<Vec<u8>, PipelineError> {
        let input = self.declared_input(ctx)?;
        Ok(canonical_json::to_canonical_json(&input).into_bytes())
    }

    /// Executes the stage. Side effects only via the enumerated external
    /// collaborators; the returned JSON value is the stage's output, made
    /// visible to dependent stages.
    async fn execute(&self, ctx: &ProcessingContext) -> Result<serde_json::Value, PipelineError>;

    /// Removes the stage's persisted outputs for the document. Must be
    /// idempotent: deleting an already-clean namespace succeeds.
    async fn cleanup(&self, document_id: DocumentId) -> Result<(), PipelineError>;
}
