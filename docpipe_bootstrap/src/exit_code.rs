// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Unix Exit Codes
//!
//! Maps application outcomes onto conventional sysexits-style process exit
//! codes so shell scripts and orchestrators can dispatch on them.

/// Process exit codes for the docpipe binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Successful completion
    Success,
    /// Completed with stage failures surfaced in the result map
    StageFailures,
    /// Bad command line usage
    Usage,
    /// Configuration could not be loaded or was invalid
    Config,
    /// Unexpected internal failure
    Software,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::StageFailures => 1,
            ExitCode::Usage => 64,
            ExitCode::Config => 78,
            ExitCode::Software => 70,
        }
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code.code() as u8)
    }
}
