// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # AI Service Port
//!
//! Synchronous request/response interface to the external embedding and
//! vision models. Implementations must surface HTTP status codes in their
//! errors (`PipelineError::ExternalService`) so the error classifier can
//! apply the status-based transient/permanent rules.

use async_trait::async_trait;

use crate::error::PipelineError;

/// External AI model access for the enrichment stages.
#[async_trait]
pub trait AiService: Send + Sync {
    /// Embeds a batch of texts; one vector per input, order preserved
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError>;

    /// Embeds one image (vision model)
    async fn embed_image(&self, image_bytes: &[u8]) -> Result<Vec<f32>, PipelineError>;
}
