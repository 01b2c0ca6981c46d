// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Binary entry point: bootstrap (logging, signals, settings), build the
//! composition root, execute the CLI command, map outcomes to exit codes.

use std::sync::Arc;

use clap::Parser;

use docpipe::presentation::cli::{self, Cli};
use docpipe::PipelineCore;
use docpipe_bootstrap::{init_tracing, install_signal_handlers, ExitCode, ShutdownCoordinator};
use docpipe_domain::PipelineError;

fn main() -> std::process::ExitCode {
    init_tracing("docpipe=info");
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            return ExitCode::Software.into();
        }
    };

    runtime.block_on(run(cli)).into()
}

async fn run(cli: Cli) -> ExitCode {
    let coordinator = Arc::new(ShutdownCoordinator::default());
    install_signal_handlers(Arc::clone(&coordinator));

    let settings = match docpipe::infrastructure::config::AppSettings::load_from(
        cli.config.as_deref().and_then(|p| p.to_str()),
    ) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::Config;
        }
    };

    let core = match PipelineCore::build(settings, coordinator.token()).await {
        Ok(core) => core,
        Err(e) => {
            eprintln!("startup error: {}", e);
            return ExitCode::Software;
        }
    };

    if let Err(e) = core.start_background().await {
        eprintln!("startup error: {}", e);
        return ExitCode::Software;
    }

    match cli::execute(&core, cli.command).await {
        Ok(false) => ExitCode::Success,
        Ok(true) => ExitCode::StageFailures,
        Err(e) => {
            eprintln!("error: {}", e);
            match e {
                PipelineError::ValidationError(_)
                | PipelineError::UnknownStage(_)
                | PipelineError::NotFound(_) => ExitCode::Usage,
                PipelineError::InvalidConfiguration(_) => ExitCode::Config,
                _ => ExitCode::Software,
            }
        }
    }
}
