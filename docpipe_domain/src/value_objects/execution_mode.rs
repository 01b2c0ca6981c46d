// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Execution modes accepted by the pipeline orchestrator.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Controls which stages the orchestrator dispatches for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run every stage whose prerequisites are satisfied, in topological
    /// order, honoring completion markers.
    Full,
    /// Like full, but unchanged completed stages are short-circuited before
    /// lock acquisition; changed inputs cascade re-execution to dependents.
    Smart,
    /// Run exactly one named stage if its prerequisites are satisfied.
    Single,
    /// Run a named set of stages in topological order, with `stop_on_error`.
    Multiple,
    /// Run the same execution over a list of documents with bounded
    /// parallelism.
    Batch,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Full => "full",
            ExecutionMode::Smart => "smart",
            ExecutionMode::Single => "single",
            ExecutionMode::Multiple => "multiple",
            ExecutionMode::Batch => "batch",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ExecutionMode::Full),
            "smart" => Ok(ExecutionMode::Smart),
            "single" => Ok(ExecutionMode::Single),
            "multiple" => Ok(ExecutionMode::Multiple),
            "batch" => Ok(ExecutionMode::Batch),
            other => Err(PipelineError::ValidationError(format!(
                "Unknown execution mode: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_round_trip() {
        for mode in [
            ExecutionMode::Full,
            ExecutionMode::Smart,
            ExecutionMode::Single,
            ExecutionMode::Multiple,
            ExecutionMode::Batch,
        ] {
            assert_eq!(ExecutionMode::from_str(mode.as_str()).unwrap(), mode);
        }
    }

    #[test]
    fn test_invalid_mode() {
        assert!(ExecutionMode::from_str("turbo").is_err());
    }
}
