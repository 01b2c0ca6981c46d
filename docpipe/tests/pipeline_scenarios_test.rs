// /////////////////////////////////////////////////////////////////////////////
// DocPipe
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipeline Scenario Tests
//!
//! End-to-end runs over the full fifteen-stage pipeline: the happy path,
//! smart replay with and without input changes, prerequisite-failure
//! isolation, execution-mode semantics and batch runs.

mod support;

use docpipe::application::stage_runner::output_key;
use docpipe::application::RunOptions;
use docpipe_domain::repositories::{AlertRepository, CompletionMarkerRepository};
use docpipe_domain::services::canonical_json::hash_bytes;
use docpipe_domain::services::ObjectStore;
use docpipe_domain::services::object_store::document_prefix;
use docpipe_domain::value_objects::{ExecutionMode, StageName, StageOutcome};
use docpipe_domain::StageState;

use support::Harness;

fn assert_outcome(report: &docpipe_domain::value_objects::RunReport, stage: StageName, label: &str) {
    let outcome = report
        .outcomes
        .get(&stage)
        .unwrap_or_else(|| panic!("missing outcome for {}", stage));
    assert_eq!(outcome.label(), label, "stage {}", stage);
}

#[tokio::test]
async fn test_full_run_completes_all_fifteen_stages() {
    let h = Harness::new().await;
    let doc = h.ingest(b"ABC").await;

    let report = h
        .core
        .orchestrator
        .run(doc, ExecutionMode::Full, None, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 15);
    for stage in StageName::ALL {
        assert_outcome(&report, stage, "completed");
    }
    assert!((report.success_rate() - 1.0).abs() < f64::EPSILON);

    // Marker ⇔ completed, in both directions
    let markers = h.markers().find_all(doc).await.unwrap();
    assert_eq!(markers.len(), 15);
    let status = h.core.orchestrator.status(doc).await.unwrap();
    for stage in StageName::ALL {
        assert_eq!(status[&stage], StageState::Completed);
    }

    // One timing record per executed stage, under the request prefix
    let timings = h.core.performance.records_for_request(report.request_id);
    assert_eq!(timings.len(), 15);
    for timing in &timings {
        let parsed = timing.correlation_id.parse().unwrap();
        assert_eq!(parsed.request_id, report.request_id);
        assert!(parsed.stage.is_some());
    }
}

#[tokio::test]
async fn test_smart_replay_with_unchanged_input_executes_nothing() {
    let h = Harness::new().await;
    let doc = h.ingest(b"ABC").await;

    h.core
        .orchestrator
        .run(doc, ExecutionMode::Full, None, RunOptions::default())
        .await
        .unwrap();
    let calls_after_first = h.ai.call_count();

    let replay = h.core.orchestrator.resume(doc).await.unwrap();

    assert_eq!(replay.outcomes.len(), 15);
    for stage in StageName::ALL {
        assert_outcome(&replay, stage, "skipped_unchanged");
    }
    assert!((replay.success_rate() - 1.0).abs() < f64::EPSILON);

    // Zero stage executions: no AI traffic, no stage timings
    assert_eq!(h.ai.call_count(), calls_after_first);
    assert!(h.core.performance.records_for_request(replay.request_id).is_empty());
}

#[tokio::test]
async fn test_smart_replay_with_changed_input_cascades_to_dependents() {
    let h = Harness::new().await;
    let doc = h.ingest(b"ABC").await;
    h.core
        .orchestrator
        .run(doc, ExecutionMode::Full, None, RunOptions::default())
        .await
        .unwrap();

    let old_hashes: std::collections::BTreeMap<_, _> = h
        .markers()
        .find_all(doc)
        .await
        .unwrap()
        .into_iter()
        .map(|m| (m.stage_name(), m.data_hash().to_string()))
        .collect();

    // Mutate text_extraction's declared input: new source bytes plus the
    // matching text-layer digest in upload's published output. The other
    // extraction stages declare different layers and stay unchanged.
    let source_key = format!("{}/source.pdf", document_prefix(doc));
    h.store.put(&source_key, b"ABCD".to_vec()).await.unwrap();

    let upload_key = output_key(doc, StageName::Upload);
    let mut upload: serde_json::Value =
        serde_json::from_slice(&h.store.get(&upload_key).await.unwrap().unwrap()).unwrap();
    upload["layers"]["text"] = serde_json::Value::String(hash_bytes(b"text:ABCD"));
    upload["size"] = serde_json::json!(4);
    h.store
        .put(&upload_key, serde_json::to_vec(&upload).unwrap())
        .await
        .unwrap();

    let replay = h.core.orchestrator.resume(doc).await.unwrap();

    let re_executed = [
        StageName::TextExtraction,
        StageName::LinkExtraction,
        StageName::ChunkPrep,
        StageName::Classification,
        StageName::MetadataExtraction,
        StageName::PartsExtraction,
        StageName::SeriesDetection,
        StageName::Embedding,
        StageName::SearchIndexing,
    ];
    let unchanged = [
        StageName::Upload,
        StageName::TableExtraction,
        StageName::SvgProcessing,
        StageName::ImageProcessing,
        StageName::VisualEmbedding,
        StageName::Storage,
    ];

    for stage in re_executed {
        assert_outcome(&replay, stage, "completed");
    }
    for stage in unchanged {
        assert_outcome(&replay, stage, "skipped_unchanged");
    }

    // Re-executed markers were overwritten with new hashes
    let new_hashes: std::collections::BTreeMap<_, _> = h
        .markers()
        .find_all(doc)
        .await
        .unwrap()
        .into_iter()
        .map(|m| (m.stage_name(), m.data_hash().to_string()))
        .collect();
    for stage in re_executed {
        assert_ne!(new_hashes[&stage], old_hashes[&stage], "stage {}", stage);
    }
    for stage in unchanged {
        assert_eq!(new_hashes[&stage], old_hashes[&stage], "stage {}", stage);
    }

    // The new text flowed through extraction
    let text_output: serde_json::Value = serde_json::from_slice(
        &h.store
            .get(&output_key(doc, StageName::TextExtraction))
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(text_output["text"], "ABCD");
}

#[tokio::test]
async fn test_permanent_failure_isolates_to_dependent_branch() {
    let h = Harness::new().await;
    // An empty document has no textual content; classification rejects it
    // with a permanent validation error.
    let doc = h.ingest(b"").await;

    let report = h
        .core
        .orchestrator
        .run(doc, ExecutionMode::Full, None, RunOptions::default())
        .await
        .unwrap();

    match report.outcomes.get(&StageName::Classification).unwrap() {
        StageOutcome::Failed { error_code, .. } => assert_eq!(error_code, "validation_error"),
        other => panic!("expected classification failure, got {:?}", other),
    }
    assert_outcome(&report, StageName::PartsExtraction, "skipped_prerequisite_failed");
    assert_outcome(&report, StageName::SeriesDetection, "skipped_prerequisite_failed");
    assert_outcome(&report, StageName::SearchIndexing, "skipped_prerequisite_failed");

    // Independent branches complete normally; embedding hangs off metadata
    // and visual embedding, not classification
    assert_outcome(&report, StageName::TableExtraction, "completed");
    assert_outcome(&report, StageName::Storage, "completed");
    assert_outcome(&report, StageName::Embedding, "completed");

    // Exactly one high-severity stage-failure alert was queued
    let pending = h
        .alerts_repo()
        .pending_in_window("stage_failure", chrono::Utc::now() - chrono::Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].severity, docpipe_domain::Severity::High);

    // Status reflects the failure
    let status = h.core.orchestrator.status(doc).await.unwrap();
    assert_eq!(status[&StageName::Classification], StageState::Failed);
    assert_eq!(status[&StageName::PartsExtraction], StageState::NotStarted);
}

#[tokio::test]
async fn test_single_mode_requires_satisfied_prerequisites() {
    let h = Harness::new().await;
    let doc = h.ingest(b"manual").await;

    let report = h
        .core
        .orchestrator
        .run(
            doc,
            ExecutionMode::Single,
            Some(vec![StageName::Embedding]),
            RunOptions::default(),
        )
        .await
        .unwrap();

    match report.outcomes.get(&StageName::Embedding).unwrap() {
        StageOutcome::Failed { error_code, .. } => assert_eq!(error_code, "prerequisite_not_met"),
        other => panic!("expected prerequisite failure, got {:?}", other),
    }

    // With prerequisites completed, single mode runs the stage
    h.core
        .orchestrator
        .run(doc, ExecutionMode::Full, None, RunOptions::default())
        .await
        .unwrap();
    let report = h
        .core
        .orchestrator
        .run(
            doc,
            ExecutionMode::Single,
            Some(vec![StageName::Embedding]),
            RunOptions::default(),
        )
        .await
        .unwrap();
    assert_outcome(&report, StageName::Embedding, "skipped_unchanged");
}

#[tokio::test]
async fn test_multiple_mode_stop_on_error_halts_dispatch() {
    let h = Harness::new().await;
    let doc = h.ingest(b"").await;
    let stages = vec![
        StageName::Upload,
        StageName::TextExtraction,
        StageName::ChunkPrep,
        StageName::Classification,
        StageName::PartsExtraction,
    ];

    let report = h
        .core
        .orchestrator
        .run(
            doc,
            ExecutionMode::Multiple,
            Some(stages.clone()),
            RunOptions { stop_on_error: true },
        )
        .await
        .unwrap();
    assert!(report.outcomes[&StageName::Classification].halts_on_error());
    assert!(
        !report.outcomes.contains_key(&StageName::PartsExtraction),
        "halted before dispatching dependents"
    );

    // With stop_on_error off, the failure is isolated to the branch
    let report = h
        .core
        .orchestrator
        .run(
            doc,
            ExecutionMode::Multiple,
            Some(stages),
            RunOptions { stop_on_error: false },
        )
        .await
        .unwrap();
    assert_outcome(&report, StageName::PartsExtraction, "skipped_prerequisite_failed");
}

#[tokio::test]
async fn test_mode_argument_validation() {
    let h = Harness::new().await;
    let doc = h.ingest(b"manual").await;

    assert!(h
        .core
        .orchestrator
        .run(
            doc,
            ExecutionMode::Full,
            Some(vec![StageName::Upload]),
            RunOptions::default()
        )
        .await
        .is_err());
    assert!(h
        .core
        .orchestrator
        .run(doc, ExecutionMode::Single, None, RunOptions::default())
        .await
        .is_err());
    assert!(h
        .core
        .orchestrator
        .run(doc, ExecutionMode::Batch, None, RunOptions::default())
        .await
        .is_err());
}

#[tokio::test]
async fn test_batch_runs_every_document() {
    let h = Harness::new().await;
    let docs = vec![
        h.ingest(b"manual one").await,
        h.ingest(b"manual two").await,
        h.ingest(b"manual three").await,
    ];

    let reports = h
        .core
        .orchestrator
        .run_batch(&docs, ExecutionMode::Full, None, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert_eq!(report.outcomes.len(), 15);
        assert!((report.success_rate() - 1.0).abs() < f64::EPSILON);
    }
}

#[tokio::test]
async fn test_request_metrics_finalize() {
    let h = Harness::new().await;
    let doc = h.ingest(b"Operator manual content").await;

    let report = h
        .core
        .orchestrator
        .run(doc, ExecutionMode::Full, None, RunOptions::default())
        .await
        .unwrap();

    let metrics = h.core.orchestrator.finalize_request(report.request_id);
    assert_eq!(metrics.stage_times_ms.len(), 15);
    // The enrichment stages crossed the AI boundary at least twice
    assert!(metrics.external_call_count >= 2);
    // Finalize drains: a second call yields nothing
    let again = h.core.orchestrator.finalize_request(report.request_id);
    assert!(again.stage_times_ms.is_empty());
}
