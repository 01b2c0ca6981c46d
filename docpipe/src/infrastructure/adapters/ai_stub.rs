// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Deterministic AI Service Stub
//!
//! Stand-in for the external embedding/vision service. Returns a fixed
//! 4-dimensional unit vector for every input, which keeps end-to-end runs
//! and their data hashes fully deterministic. Supports scripted failures so
//! retry paths can be exercised: the next N calls fail with a configured
//! HTTP status before the stub recovers.

use async_trait::async_trait;
use parking_lot::Mutex;

use docpipe_domain::services::AiService;
use docpipe_domain::PipelineError;

/// Fixed 4-dimensional unit vector returned for every embedding request.
pub const UNIT_VECTOR: [f32; 4] = [0.5, 0.5, 0.5, 0.5];

#[derive(Default)]
struct FaultSlot {
    /// (remaining failures, status to fail with)
    script: Option<(u32, u16)>,
    calls: u64,
}

impl FaultSlot {
    fn check(&mut self) -> Result<(), PipelineError> {
        self.calls += 1;
        if let Some((remaining, status)) = self.script.as_mut() {
            if *remaining > 0 {
                *remaining -= 1;
                let status = *status;
                if *remaining == 0 {
                    self.script = None;
                }
                return Err(PipelineError::external(
                    status,
                    format!("AI service returned HTTP {}", status),
                ));
            }
        }
        Ok(())
    }
}

/// Deterministic AI service stub with scripted fault injection. Text and
/// image faults are scripted independently so a test can target one stage.
#[derive(Default)]
pub struct StubAiService {
    texts: Mutex<FaultSlot>,
    images: Mutex<FaultSlot>,
}

impl StubAiService {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` text-embedding calls fail with the given HTTP
    /// status, after which calls succeed again.
    pub fn fail_next_texts(&self, count: u32, status: u16) {
        self.texts.lock().script = Some((count, status));
    }

    /// The next `count` image-embedding calls fail with the given HTTP
    /// status.
    pub fn fail_next_images(&self, count: u32, status: u16) {
        self.images.lock().script = Some((count, status));
    }

    /// Total calls made across both models, successful or not. Test helper.
    pub fn call_count(&self) -> u64 {
        self.texts.lock().calls + self.images.lock().calls
    }

    /// Text-embedding calls made. Test helper.
    pub fn text_call_count(&self) -> u64 {
        self.texts.lock().calls
    }
}

#[async_trait]
impl AiService for StubAiService {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        self.texts.lock().check()?;
        Ok(texts.iter().map(|_| UNIT_VECTOR.to_vec()).collect())
    }

    async fn embed_image(&self, _image_bytes: &[u8]) -> Result<Vec<f32>, PipelineError> {
        self.images.lock().check()?;
        Ok(UNIT_VECTOR.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_vector() {
        let stub = StubAiService::new();
        let vectors = stub.embed_texts(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(vectors, vec![UNIT_VECTOR.to_vec(), UNIT_VECTOR.to_vec()]);

        // Unit length
        let norm: f32 = UNIT_VECTOR.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_scripted_failure_then_recovery() {
        let stub = StubAiService::new();
        stub.fail_next_texts(1, 503);

        let err = stub.embed_texts(&["a".into()]).await.unwrap_err();
        assert_eq!(err.error_code(), "transient_external");

        // Recovered
        assert!(stub.embed_texts(&["a".into()]).await.is_ok());
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn test_faults_are_per_model() {
        let stub = StubAiService::new();
        stub.fail_next_texts(1, 503);

        // Image calls are unaffected by the text fault script
        assert!(stub.embed_image(b"png").await.is_ok());
        assert!(stub.embed_texts(&["a".into()]).await.is_err());
    }

    #[tokio::test]
    async fn test_permanent_status() {
        let stub = StubAiService::new();
        stub.fail_next_images(1, 401);
        let err = stub.embed_image(b"png").await.unwrap_err();
        assert_eq!(err.error_code(), "permanent_external");
    }
}
