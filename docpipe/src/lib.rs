// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # DocPipe
//!
//! Resilient document-processing pipeline: a fifteen-stage orchestrator
//! that ingests technical documents, transforms them into a searchable
//! knowledge base (chunks, embeddings, extracted entities), and persists
//! results to a relational store plus an S3-compatible object store.
//!
//! The hard engineering lives in four tightly coupled subsystems:
//!
//! - **Stage orchestration**: a dependency-aware scheduler over the fixed
//!   fifteen-stage DAG with five execution modes (full, smart, single,
//!   multiple, batch) and partial-failure isolation
//! - **Resilience**: transient/permanent error classification, hybrid
//!   sync-then-async retry with exponential backoff, per-(document, stage)
//!   advisory locks, hierarchical correlation ids and queued, time-window
//!   aggregated alerting
//! - **Idempotency**: check-before-write with SHA-256 canonical-input
//!   hashes, automatic cleanup of stale stage outputs on changed input, and
//!   durable completion markers
//! - **Performance measurement**: per-stage and per-request timings rolled
//!   into baselines for regression comparison across revisions
//!
//! ## Layering
//!
//! - `application`: orchestrator, stage runner, retry/alert machinery,
//!   idempotency, config cache, performance collector, stage registry
//! - `infrastructure`: SQLite repositories and lock manager, object-store
//!   and AI adapters, tokio runtime pieces, Prometheus metrics, settings
//! - `stages`: the fifteen built-in stage implementations
//! - `presentation`: the clap CLI over the orchestrator operations
//! - `composition`: the composition root wiring it all together
//!
//! Domain types live in the `docpipe-domain` crate; entry-point scaffolding
//! (logging, signals, shutdown) in `docpipe-bootstrap`.

pub mod application;
pub mod composition;
pub mod infrastructure;
pub mod presentation;
pub mod stages;

pub use composition::PipelineCore;
