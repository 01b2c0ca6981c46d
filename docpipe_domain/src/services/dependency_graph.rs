// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stage Dependency Graph
//!
//! The static DAG over the fifteen stages. The orchestrator consults it to
//! refuse dispatch of a stage whose prerequisites are not satisfied and to
//! compute topological order for full, smart and multiple modes.
//!
//! Edges are fixed at compile time; the graph has no configuration surface.
//! Ties between stages of equal depth break by registry declaration order
//! (`StageName::ALL`).

use std::collections::BTreeSet;

use crate::error::PipelineError;
use crate::value_objects::StageName;

/// Prerequisite stages that must be `completed` (or skipped-unchanged)
/// before the given stage may run.
pub fn prerequisites(stage: StageName) -> &'static [StageName] {
    use StageName::*;
    match stage {
        Upload => &[],
        TextExtraction => &[Upload],
        TableExtraction => &[Upload],
        SvgProcessing => &[Upload],
        ImageProcessing => &[Upload],
        LinkExtraction => &[TextExtraction],
        ChunkPrep => &[TextExtraction],
        VisualEmbedding => &[ImageProcessing],
        Classification => &[ChunkPrep],
        MetadataExtraction => &[ChunkPrep],
        PartsExtraction => &[Classification],
        SeriesDetection => &[Classification],
        Embedding => &[MetadataExtraction, VisualEmbedding],
        Storage => &[TableExtraction, SvgProcessing, ImageProcessing],
        SearchIndexing => &[PartsExtraction, SeriesDetection, Embedding, Storage],
    }
}

/// Stages that list the given stage as a direct prerequisite.
pub fn dependents(stage: StageName) -> Vec<StageName> {
    StageName::ALL
        .iter()
        .copied()
        .filter(|candidate| prerequisites(*candidate).contains(&stage))
        .collect()
}

/// Every stage reachable downstream of the given stage.
pub fn transitive_dependents(stage: StageName) -> BTreeSet<StageName> {
    let mut result = BTreeSet::new();
    let mut frontier = vec![stage];
    while let Some(current) = frontier.pop() {
        for dep in dependents(current) {
            if result.insert(dep) {
                frontier.push(dep);
            }
        }
    }
    result
}

/// Topologically orders the given stage set using Kahn's algorithm, breaking
/// ties by registry declaration order.
///
/// Edges from prerequisites outside the set are ignored here; whether those
/// outside prerequisites are satisfied is a dispatch-time decision made
/// against persisted stage status.
pub fn topological_order(stages: &[StageName]) -> Result<Vec<StageName>, PipelineError> {
    let selected: BTreeSet<StageName> = stages.iter().copied().collect();
    if selected.len() != stages.len() {
        return Err(PipelineError::validation("Duplicate stages in execution set"));
    }

    let mut ordered = Vec::with_capacity(selected.len());
    let mut remaining = selected.clone();

    while !remaining.is_empty() {
        // Registry order scan keeps the tie-break deterministic
        let next = StageName::ALL.iter().copied().find(|stage| {
            remaining.contains(stage)
                && prerequisites(*stage)
                    .iter()
                    .all(|pre| !remaining.contains(pre))
        });

        match next {
            Some(stage) => {
                remaining.remove(&stage);
                ordered.push(stage);
            }
            None => {
                // Unreachable with the static edge set; kept as a guard for
                // the graph tests.
                return Err(PipelineError::internal_error(
                    "Stage dependency graph contains a cycle",
                ));
            }
        }
    }

    Ok(ordered)
}

/// Groups a topologically ordered stage list into parallel waves: each wave
/// contains stages whose prerequisites are all in earlier waves.
pub fn parallel_waves(ordered: &[StageName]) -> Vec<Vec<StageName>> {
    let mut waves: Vec<Vec<StageName>> = Vec::new();

    for &stage in ordered {
        let in_set_prereqs: Vec<StageName> = prerequisites(stage)
            .iter()
            .copied()
            .filter(|pre| ordered.contains(pre))
            .collect();

        // First wave whose predecessors already cover all in-set prerequisites
        let mut wave_index = 0;
        for (i, wave) in waves.iter().enumerate() {
            if in_set_prereqs.iter().any(|pre| wave.contains(pre)) {
                wave_index = i + 1;
            }
        }

        if wave_index == waves.len() {
            waves.push(vec![stage]);
        } else {
            waves[wave_index].push(stage);
        }
    }

    waves
}
