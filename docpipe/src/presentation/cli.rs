// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Line Interface
//!
//! Thin surface over the orchestrator operations: `run`, `status`,
//! `resume`, `cancel-retry`, the `sweep` recovery pass and baseline
//! maintenance. Transport-level APIs live outside the core; this binary is
//! the operational entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use docpipe_domain::value_objects::{DocumentId, ExecutionMode, StageName};
use docpipe_domain::PipelineError;

use crate::application::RunOptions;
use crate::composition::PipelineCore;

#[derive(Parser)]
#[command(name = "docpipe", version, about = "Resilient document-processing pipeline")]
pub struct Cli {
    /// Path to the configuration file (defaults to ./docpipe.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Ingest a source document and print its id
    Ingest {
        /// Path to the source file
        path: PathBuf,
    },
    /// Run the pipeline for a document
    Run {
        /// Document id
        document_id: String,
        /// Execution mode: full, smart, single, multiple
        #[arg(long, default_value = "smart")]
        mode: String,
        /// Stage list for single/multiple modes (comma separated)
        #[arg(long, value_delimiter = ',')]
        stages: Vec<String>,
        /// Keep dispatching after a stage failure (multiple mode)
        #[arg(long)]
        no_stop_on_error: bool,
    },
    /// Run the same execution over several documents
    Batch {
        /// Document ids
        document_ids: Vec<String>,
        /// Per-document execution mode
        #[arg(long, default_value = "smart")]
        mode: String,
    },
    /// Show the per-stage status of a document
    Status {
        /// Document id
        document_id: String,
    },
    /// Re-run outstanding work for a document (smart mode)
    Resume {
        /// Document id
        document_id: String,
    },
    /// Cancel a pending async retry
    CancelRetry {
        /// Pipeline error id
        error_id: String,
    },
    /// Reconcile stale in_progress stage statuses back to pending
    Sweep,
    /// Store or inspect performance baselines
    Baseline {
        #[command(subcommand)]
        command: BaselineCommand,
    },
}

#[derive(Subcommand)]
pub enum BaselineCommand {
    /// Run the full pipeline for a document and store the timings
    Store {
        /// Document id
        document_id: String,
        /// Test name the baseline belongs to
        #[arg(long)]
        test: String,
        /// Document label stored with the baseline
        #[arg(long)]
        document_name: String,
        /// Code revision id
        #[arg(long)]
        revision: String,
        /// Overwrite an existing baseline for the same key
        #[arg(long)]
        force: bool,
    },
    /// List stored baselines for a test
    Show {
        #[arg(long)]
        test: String,
    },
}

fn parse_document_id(s: &str) -> Result<DocumentId, PipelineError> {
    DocumentId::parse(s)
}

fn parse_stages(stages: &[String]) -> Result<Option<Vec<StageName>>, PipelineError> {
    if stages.is_empty() {
        return Ok(None);
    }
    stages
        .iter()
        .map(|s| s.parse::<StageName>())
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Executes one CLI command against a built core. Returns whether the run
/// surfaced stage failures (for exit-code mapping).
pub async fn execute(core: &PipelineCore, command: Command) -> Result<bool, PipelineError> {
    match command {
        Command::Ingest { path } => {
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| PipelineError::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
            let id = core.ingest(bytes).await?;
            println!("{}", id);
            Ok(false)
        }
        Command::Run {
            document_id,
            mode,
            stages,
            no_stop_on_error,
        } => {
            let document_id = parse_document_id(&document_id)?;
            let mode: ExecutionMode = mode.parse()?;
            let stages = parse_stages(&stages)?;
            let options = RunOptions {
                stop_on_error: !no_stop_on_error,
            };

            let report = core.orchestrator.run(document_id, mode, stages, options).await?;
            print_report(&report);
            Ok(report.has_failures())
        }
        Command::Batch { document_ids, mode } => {
            let ids = document_ids
                .iter()
                .map(|s| parse_document_id(s))
                .collect::<Result<Vec<_>, _>>()?;
            let mode: ExecutionMode = mode.parse()?;

            let reports = core
                .orchestrator
                .run_batch(&ids, mode, None, RunOptions::default())
                .await?;
            let mut any_failures = false;
            for report in &reports {
                print_report(report);
                any_failures |= report.has_failures();
            }
            Ok(any_failures)
        }
        Command::Status { document_id } => {
            let document_id = parse_document_id(&document_id)?;
            let status = core.orchestrator.status(document_id).await?;
            for (stage, state) in status {
                println!("{:<22} {}", stage.as_str(), state);
            }
            Ok(false)
        }
        Command::Resume { document_id } => {
            let document_id = parse_document_id(&document_id)?;
            let report = core.orchestrator.resume(document_id).await?;
            print_report(&report);
            Ok(report.has_failures())
        }
        Command::CancelRetry { error_id } => {
            let error_id = Uuid::parse_str(&error_id)
                .map_err(|e| PipelineError::validation(format!("Invalid error id: {}", e)))?;
            core.orchestrator.cancel_retry(error_id).await?;
            println!("cancelled {}", error_id);
            Ok(false)
        }
        Command::Sweep => {
            let reconciled = core.orchestrator.sweep_stale().await?;
            for (document_id, stage) in &reconciled {
                println!("{} {} -> pending", document_id, stage);
            }
            println!("swept {} stage(s)", reconciled.len());
            Ok(false)
        }
        Command::Baseline { command } => match command {
            BaselineCommand::Store {
                document_id,
                test,
                document_name,
                revision,
                force,
            } => {
                let document_id = parse_document_id(&document_id)?;
                let report = core
                    .orchestrator
                    .run(document_id, ExecutionMode::Full, None, RunOptions::default())
                    .await?;
                let metrics = core.orchestrator.finalize_request(report.request_id);
                core.performance
                    .store_baseline(&test, &document_name, &revision, metrics, force)
                    .await?;
                println!("baseline stored for ({}, {}, {})", test, document_name, revision);
                Ok(report.has_failures())
            }
            BaselineCommand::Show { test } => {
                // Listing goes through the collector's repository; the CLI
                // keeps read access simple via serde output.
                let rows = core.baselines_for_test(&test).await?;
                println!("{}", serde_json::to_string_pretty(&rows)?);
                Ok(false)
            }
        },
    }
}

fn print_report(report: &docpipe_domain::value_objects::RunReport) {
    println!(
        "request {} document {} mode {}",
        report.request_id, report.document_id, report.mode
    );
    for (stage, outcome) in &report.outcomes {
        match outcome {
            docpipe_domain::value_objects::StageOutcome::Failed {
                error_code,
                message,
                correlation_id,
            } => {
                println!("  {:<22} failed [{}] {} ({})", stage.as_str(), error_code, message, correlation_id);
            }
            other => println!("  {:<22} {}", stage.as_str(), other.label()),
        }
    }
    println!("success_rate {:.2}", report.success_rate());
}
