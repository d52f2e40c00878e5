//! End-to-end runs of the adaptive hash-partitioning executor

use crate::common::*;
use datadiff::cancel::CancellationToken;
use datadiff::config::PartitionSettings;
use datadiff::engine::SqlEngine;
use datadiff::executor::HashPartitionExecutor;
use datadiff::progress::{progress_channel, ProgressStage};

fn settings(row_threshold: u64) -> PartitionSettings {
    PartitionSettings {
        row_threshold,
        ..PartitionSettings::default()
    }
}

#[test]
fn test_small_inputs_use_single_root_bucket() {
    let engine = shifted_tables(500, 0);
    let sink = CollectingSink::default();

    let metrics = HashPartitionExecutor::new(&engine, builder(&["v", "name"]), "diff_small")
        .with_settings(settings(100_000))
        .with_progress(&sink)
        .run()
        .unwrap();

    assert_eq!(metrics.plan.effective_depth, 0);
    assert_eq!(metrics.plan.final_modulus, 1);
    assert_eq!(metrics.total_buckets_enqueued, 1);
    assert_eq!(metrics.processed_buckets, 1);
    assert_eq!(metrics.max_depth, 0);
    assert_eq!(metrics.max_bucket_rows_a, 500);
    assert_eq!(metrics.max_bucket_rows_b, 500);
    assert_eq!(metrics.processed_rows, 500);
    assert_eq!(metrics.diff_rows, 500);
    assert_eq!(table_count(&engine, "SELECT COUNT(*) FROM diff_small"), 500);

    let stages: Vec<ProgressStage> = sink.events().iter().map(|e| e.stage).collect();
    assert_eq!(
        stages,
        vec![
            ProgressStage::Counting,
            ProgressStage::Queued,
            ProgressStage::Inserting,
            ProgressStage::BucketComplete,
            ProgressStage::Finalizing,
            ProgressStage::Done,
        ]
    );
    let inserting = &sink.with_stage(ProgressStage::Inserting)[0];
    assert_eq!(inserting.total_buckets, 1);
    assert_eq!(inserting.pending_buckets, 0);
}

#[test]
fn test_forced_split_respects_threshold_and_ceiling() {
    let engine = shifted_tables(20_000, 1_000);
    let recording = RecordingEngine::new(&engine);
    let sink = CollectingSink::default();

    let metrics = HashPartitionExecutor::new(&recording, builder(&["v"]), "diff_split")
        .with_settings(settings(2_000))
        .with_progress(&sink)
        .run()
        .unwrap();

    // 20,000 rows over a 2,000 threshold with factor 4: ceil(log4(10)) = 2
    assert_eq!(metrics.plan.effective_depth, 2);
    assert_eq!(metrics.plan.final_modulus, 16);
    assert!(metrics.max_depth >= 1 && metrics.max_depth <= 2);
    assert!(metrics.total_buckets_enqueued > 1);

    for event in sink.with_stage(ProgressStage::Inserting) {
        let segment = event.segment.unwrap();
        let max_count = event.count_a.unwrap().max(event.count_b.unwrap());
        assert!(segment.depth <= 2);
        assert!(segment.modulus <= 16);
        assert!(
            max_count <= 2_000 || segment.depth == 2,
            "segment {} materialized with {} rows",
            segment,
            max_count
        );
    }

    // 1,000 removed + 1,000 added + 19,000 shared
    assert_eq!(metrics.diff_rows, 21_000);
    assert_eq!(table_count(&engine, "SELECT COUNT(*) FROM diff_split"), 21_000);
    assert_eq!(
        table_count(
            &engine,
            "SELECT COUNT(*) FROM diff_split WHERE _row_status = 'modified'"
        ),
        190
    );
    assert_eq!(
        table_count(
            &engine,
            "SELECT COUNT(*) FROM diff_split WHERE _row_status = 'added'"
        ),
        1_000
    );

    // Every key lands in exactly one bucket
    assert_eq!(
        table_count(
            &engine,
            "SELECT COUNT(*) FROM (SELECT _key_id FROM diff_split GROUP BY 1 HAVING COUNT(*) > 1)"
        ),
        0
    );
    assert_eq!(
        recording.statements_starting_with("INSERT").len() as u64,
        sink.with_stage(ProgressStage::Inserting).len() as u64
    );
}

#[test]
fn test_cancellation_after_first_bucket_stops_engine_calls() {
    let engine = shifted_tables(20_000, 1_000);
    let recording = RecordingEngine::new(&engine);
    let token = CancellationToken::new();
    let sink = CancelOnFirstComplete::new(token.clone(), recording.calls.clone());

    let err = HashPartitionExecutor::new(&recording, builder(&["v"]), "diff_cancelled")
        .with_settings(settings(2_000))
        .with_cancellation(token.clone())
        .with_progress(&sink)
        .run()
        .unwrap_err();

    assert!(err.is_aborted());
    assert!(token.is_cancelled());

    let calls_at_cancel = sink.calls_at_cancel.lock().unwrap().unwrap();
    assert_eq!(recording.call_count(), calls_at_cancel);
    assert!(recording.statements_starting_with("CHECKPOINT").is_empty());

    // Rows of the completed bucket stay in place
    let events = sink.events.lock().unwrap().clone();
    let last = events
        .iter()
        .rev()
        .find(|e| e.stage == ProgressStage::BucketComplete)
        .unwrap();
    let kept = table_count(&engine, "SELECT COUNT(*) FROM diff_cancelled");
    assert!(kept > 0);
    assert!(kept < 21_000);
    assert_eq!(Some(kept), last.diff_rows);
}

#[test]
fn test_empty_segments_complete_without_insert() {
    // Every row shares one key, so all but one child of each split is empty
    let engine = engine_with(
        "SELECT 7 AS id, range AS v FROM range(5)",
        "SELECT 7 AS id, range AS v FROM range(2)",
    );
    let recording = RecordingEngine::new(&engine);
    let sink = CollectingSink::default();

    let metrics = HashPartitionExecutor::new(&recording, builder(&["v"]), "diff_skewed")
        .with_settings(settings(1))
        .with_progress(&sink)
        .run()
        .unwrap();

    assert_eq!(metrics.plan.effective_depth, 2);
    assert_eq!(metrics.plan.final_modulus, 16);
    assert_eq!(metrics.max_depth, 2);
    assert_eq!(metrics.total_buckets_enqueued, 1 + 4 + 4);

    let completed = sink.with_stage(ProgressStage::BucketComplete);
    let inserting = sink.with_stage(ProgressStage::Inserting);
    assert_eq!(inserting.len(), 1);
    assert_eq!(completed.len(), 7);
    assert_eq!(recording.statements_starting_with("INSERT").len(), 1);

    let empty: Vec<_> = completed
        .iter()
        .filter(|e| e.count_a == Some(0) && e.count_b == Some(0))
        .collect();
    assert_eq!(empty.len(), 6);

    // Processed rows only grow on the one materialized bucket
    assert_eq!(metrics.processed_rows, 5);
    assert_eq!(metrics.max_bucket_rows_a, 5);
    assert_eq!(metrics.max_bucket_rows_b, 2);

    // Duplicate keys join pairwise: 5 x 2 rows
    assert_eq!(metrics.diff_rows, 10);
    assert_eq!(table_count(&engine, "SELECT COUNT(*) FROM diff_skewed"), 10);
}

#[test]
fn test_progress_counters_are_consistent() {
    let engine = shifted_tables(20_000, 0);
    let (sink, events) = progress_channel(4_096);

    let metrics = HashPartitionExecutor::new(&engine, builder(&["v"]), "diff_progress")
        .with_settings(settings(2_000))
        .with_progress(&sink)
        .run()
        .unwrap();
    drop(sink);

    let events: Vec<_> = events.into_iter().collect();
    assert_eq!(events.last().unwrap().stage, ProgressStage::Done);

    let mut completed = 0;
    let mut diff_rows = 0;
    for event in &events {
        assert!(event.completed_buckets >= completed);
        let reported = event.diff_rows.unwrap_or(0);
        assert!(reported >= diff_rows);
        completed = event.completed_buckets;
        diff_rows = reported;
        assert!(event.total_buckets >= event.completed_buckets + event.pending_buckets);
        assert!(event.total_buckets <= event.completed_buckets + event.pending_buckets + 1);
    }
    assert_eq!(completed, metrics.processed_buckets);
    assert_eq!(diff_rows, metrics.diff_rows);
}

#[test]
fn test_rerun_replaces_output_table() {
    let engine = shifted_tables(1_000, 10);
    let run = || {
        HashPartitionExecutor::new(&engine, builder(&["v"]), "diff_rerun")
            .with_settings(settings(100))
            .run()
            .unwrap()
    };

    let first = run();
    let second = run();
    assert_eq!(first.diff_rows, second.diff_rows);
    assert_eq!(
        table_count(&engine, "SELECT COUNT(*) FROM diff_rerun"),
        second.diff_rows
    );
    engine.execute("DROP TABLE diff_rerun").unwrap();
}
