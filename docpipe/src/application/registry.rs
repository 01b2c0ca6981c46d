// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Registry
//!
//! Binds the closed set of stage names to their implementations. The names
//! are a closed enum, so registry misses can only come from a partially
//! wired registry (tests); looking up an unregistered stage is the
//! permanent failure `unknown_stage`.
//!
//! Declaration order of `StageName::ALL` is the registry order that breaks
//! ties among stages of equal depth in the dependency graph.

use std::collections::HashMap;
use std::sync::Arc;

use docpipe_domain::services::{AiService, ObjectStore, Stage};
use docpipe_domain::value_objects::StageName;
use docpipe_domain::PipelineError;

use crate::application::performance::PerformanceCollector;
use crate::stages;

/// Closed mapping from stage name to implementation.
pub struct StageRegistry {
    stages: HashMap<StageName, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Empty registry; used by tests that wire a subset
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
        }
    }

    /// Full built-in registry: all fifteen stages wired to their
    /// collaborators.
    pub fn builtin(
        store: Arc<dyn ObjectStore>,
        ai: Arc<dyn AiService>,
        performance: Arc<PerformanceCollector>,
    ) -> Self {
        let mut registry = Self::new();
        for stage in stages::builtin_stages(store, ai, performance) {
            registry.register(stage);
        }
        registry
    }

    /// Registers (or replaces) one stage implementation
    pub fn register(&mut self, stage: Arc<dyn Stage>) {
        self.stages.insert(stage.name(), stage);
    }

    /// Looks up a stage implementation
    pub fn get(&self, name: StageName) -> Result<Arc<dyn Stage>, PipelineError> {
        self.stages
            .get(&name)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownStage(name.as_str().to_string()))
    }

    /// Registered stage names in registry declaration order
    pub fn names(&self) -> Vec<StageName> {
        StageName::ALL
            .iter()
            .copied()
            .filter(|name| self.stages.contains_key(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}
