// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Metrics Service Implementation
//!
//! Prometheus-based metrics collection for pipeline observability: stage
//! outcomes and durations, retry activity, alert dispatches, advisory-lock
//! contention and in-flight requests. Thread-safe with low overhead. This
//! is the ambient operational surface; regression baselines are the
//! performance collector's separate concern.

use std::sync::Arc;

use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

use docpipe_domain::PipelineError;

/// Prometheus metrics service for pipeline observability.
#[derive(Clone)]
pub struct MetricsService {
    registry: Arc<Registry>,

    // Stage execution metrics
    stage_outcomes_total: IntCounterVec,
    stage_duration_seconds: Histogram,

    // Resilience metrics
    retries_scheduled_total: IntCounter,
    retries_resolved_total: IntCounter,
    lock_contention_total: IntCounter,

    // Alerting metrics
    alerts_queued_total: IntCounter,
    alert_dispatches_total: IntCounter,

    // System metrics
    active_requests: IntGauge,
    request_success_rate: Gauge,
}

impl MetricsService {
    /// Create a new MetricsService with its own Prometheus registry
    pub fn new() -> Result<Self, PipelineError> {
        let registry = Registry::new();

        let stage_outcomes_total = IntCounterVec::new(
            Opts::new("stage_outcomes_total", "Stage dispatch outcomes by label").namespace("docpipe"),
            &["stage", "outcome"],
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create stage_outcomes_total: {}", e)))?;

        let stage_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("stage_duration_seconds", "Time spent executing stages")
                .namespace("docpipe")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create stage_duration_seconds: {}", e)))?;

        let retries_scheduled_total = IntCounter::with_opts(
            Opts::new("retries_scheduled_total", "Async retries scheduled").namespace("docpipe"),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create retries_scheduled_total: {}", e)))?;

        let retries_resolved_total = IntCounter::with_opts(
            Opts::new("retries_resolved_total", "Retry chains resolved successfully").namespace("docpipe"),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create retries_resolved_total: {}", e)))?;

        let lock_contention_total = IntCounter::with_opts(
            Opts::new("lock_contention_total", "Advisory lock contention events").namespace("docpipe"),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create lock_contention_total: {}", e)))?;

        let alerts_queued_total = IntCounter::with_opts(
            Opts::new("alerts_queued_total", "Alert queue items produced").namespace("docpipe"),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create alerts_queued_total: {}", e)))?;

        let alert_dispatches_total = IntCounter::with_opts(
            Opts::new("alert_dispatches_total", "Aggregated alert dispatches sent").namespace("docpipe"),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create alert_dispatches_total: {}", e)))?;

        let active_requests = IntGauge::with_opts(
            Opts::new("active_requests", "Pipeline requests currently in flight").namespace("docpipe"),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create active_requests: {}", e)))?;

        let request_success_rate = Gauge::with_opts(
            Opts::new("request_success_rate", "Success rate of the most recent request").namespace("docpipe"),
        )
        .map_err(|e| PipelineError::metrics_error(format!("Failed to create request_success_rate: {}", e)))?;

        registry
            .register(Box::new(stage_outcomes_total.clone()))
            .and_then(|_| registry.register(Box::new(stage_duration_seconds.clone())))
            .and_then(|_| registry.register(Box::new(retries_scheduled_total.clone())))
            .and_then(|_| registry.register(Box::new(retries_resolved_total.clone())))
            .and_then(|_| registry.register(Box::new(lock_contention_total.clone())))
            .and_then(|_| registry.register(Box::new(alerts_queued_total.clone())))
            .and_then(|_| registry.register(Box::new(alert_dispatches_total.clone())))
            .and_then(|_| registry.register(Box::new(active_requests.clone())))
            .and_then(|_| registry.register(Box::new(request_success_rate.clone())))
            .map_err(|e| PipelineError::metrics_error(format!("Failed to register metrics: {}", e)))?;

        Ok(Self {
            registry: Arc::new(registry),
            stage_outcomes_total,
            stage_duration_seconds,
            retries_scheduled_total,
            retries_resolved_total,
            lock_contention_total,
            alerts_queued_total,
            alert_dispatches_total,
            active_requests,
            request_success_rate,
        })
    }

    pub fn record_stage_outcome(&self, stage: &str, outcome: &str) {
        self.stage_outcomes_total.with_label_values(&[stage, outcome]).inc();
    }

    pub fn record_stage_duration(&self, duration: std::time::Duration) {
        self.stage_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn increment_retries_scheduled(&self) {
        self.retries_scheduled_total.inc();
    }

    pub fn increment_retries_resolved(&self) {
        self.retries_resolved_total.inc();
    }

    pub fn increment_lock_contention(&self) {
        self.lock_contention_total.inc();
    }

    pub fn increment_alerts_queued(&self) {
        self.alerts_queued_total.inc();
    }

    pub fn increment_alert_dispatches(&self) {
        self.alert_dispatches_total.inc();
    }

    pub fn increment_active_requests(&self) {
        self.active_requests.inc();
    }

    pub fn decrement_active_requests(&self) {
        self.active_requests.dec();
    }

    pub fn set_request_success_rate(&self, rate: f64) {
        self.request_success_rate.set(rate);
    }

    /// Renders all metrics in Prometheus text exposition format
    pub fn gather(&self) -> Result<String, PipelineError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| PipelineError::metrics_error(format!("Failed to encode metrics: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| PipelineError::metrics_error(e.to_string()))
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_service_creation() {
        let service = MetricsService::new().unwrap();
        assert!(service.gather().unwrap().contains("docpipe"));
    }

    #[test]
    fn test_stage_outcome_counting() {
        let service = MetricsService::new().unwrap();
        service.record_stage_outcome("embedding", "completed");
        service.record_stage_outcome("embedding", "completed");
        service.record_stage_outcome("upload", "skipped_unchanged");

        let text = service.gather().unwrap();
        assert!(text.contains("stage_outcomes_total"));
    }

    #[test]
    fn test_active_request_tracking() {
        let service = MetricsService::new().unwrap();
        service.increment_active_requests();
        service.increment_active_requests();
        service.decrement_active_requests();
        service.set_request_success_rate(1.0);
        // No panics; values flow into the registry
        assert!(service.gather().is_ok());
    }
}
