// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DocPipe Domain
//!
//! Core business logic for the resilient document-processing pipeline. This
//! crate is completely independent of external concerns: no database, no
//! runtime, no logging framework. It implements Domain-Driven Design
//! patterns and is consumed by the `docpipe` application crate.
//!
//! ## Entities
//!
//! Objects with identity whose state evolves over time:
//!
//! - `Document`: the unit of work, with its per-stage status map
//! - `CompletionMarker`: durable evidence a stage finished with a given
//!   input hash
//! - `PipelineErrorRecord`: failure bookkeeping that outlives a request
//! - `AlertQueueItem` / `AlertConfiguration`: the alert producer/consumer pair
//! - `PerformanceBaseline`: stored performance snapshot per code revision
//! - `ProcessingContext`: ephemeral per-invocation execution context
//!
//! ## Value Objects
//!
//! Immutable, self-validating values without identity:
//!
//! - `DocumentId`: type-safe document UUID
//! - `CorrelationId`: hierarchical `req_*.stage_*.retry_*` identifier
//! - `StageName`: the closed set of fifteen stages
//! - `RetryPolicy`: retry configuration with the backoff computation
//! - `ExecutionMode`, `StageOutcome`, `RunReport`: orchestration vocabulary
//!
//! ## Domain Services
//!
//! Stateless logic that fits neither an entity nor a value object:
//!
//! - `canonical_json`: deterministic serialization + SHA-256 data hashes
//! - `dependency_graph`: the static 15-stage DAG and its orderings
//! - `lock_key`: bit-exact advisory-lock key derivation
//! - `Stage`: the uniform stage contract behind the registry
//!
//! ## Ports
//!
//! Async traits implemented by the infrastructure layer: repositories for
//! each persisted entity, the advisory lock manager, the object store, the
//! AI service, the clock and the retry scheduler.
//!
//! ## Error Handling
//!
//! All fallible operations return `Result<_, PipelineError>`. The error enum
//! carries the stable error codes surfaced to callers and the
//! transient/permanent classification that drives the retry machinery.

pub mod entities;
pub mod error;
pub mod repositories;
pub mod services;
pub mod value_objects;

// Re-export commonly used types for convenient access
pub use entities::{
    AlertConfiguration, AlertDispatch, AlertQueueItem, AlertStatus, CompletionMarker, Document,
    Environment, ErrorRecordStatus, PerformanceBaseline, PipelineErrorRecord, ProcessingContext,
    RequestMetrics, Severity, StageState, StageStatusMap,
};
pub use error::{ErrorClass, PipelineError};
pub use repositories::{
    AdvisoryLockManager, AlertRepository, BaselineRepository, CompletionMarkerRepository,
    DocumentRepository, ErrorRecordRepository, LockHandle, PolicyRepository,
};
pub use services::{
    AiService, AlertChannel, Clock, ObjectStore, RetryExecutor, RetryScheduler, Stage, SystemClock,
};
pub use value_objects::{
    CorrelationId, DocumentId, ExecutionMode, ParsedCorrelationId, RetryPolicy, RunReport,
    StageGroup, StageName, StageOutcome,
};
