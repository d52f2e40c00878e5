//! Strategies run end to end and agree with each other

use crate::common::*;
use datadiff::comparison::{CompareColumn, ComparisonConfig, DataSource, JoinColumn};
use datadiff::config::{PartitionSettings, StrategySettings};
use datadiff::output::DiffSummary;
use datadiff::sql::DiffQueryBuilder;
use datadiff::strategy::{AlgorithmRegistry, DiffOutcome, DiffRun, Strategy, StrategyChoice};
use datadiff::DuckDbEngine;

fn run_into(engine: &DuckDbEngine, table: &str, strategy: Strategy) -> DiffOutcome {
    let mut run = DiffRun::new(engine, builder(&["v", "name"]), table);
    run.partition = PartitionSettings {
        row_threshold: 500,
        ..PartitionSettings::default()
    };
    run.settings = StrategySettings {
        sample_size: 100,
        ..StrategySettings::default()
    };
    run.execute(strategy).unwrap()
}

#[test]
fn test_hash_partition_matches_full_join() {
    let engine = shifted_tables(5_000, 250);

    let joined = run_into(&engine, "diff_join", Strategy::FullJoin);
    let hashed = run_into(&engine, "diff_hash", Strategy::HashPartition);

    assert!(joined.partition.is_none());
    let metrics = hashed.partition.as_ref().unwrap();
    assert!(metrics.total_buckets_enqueued > 1);
    assert_eq!(joined.diff_rows, hashed.diff_rows);
    assert_eq!(joined.diff_rows, 5_250);

    for (left, right) in [("diff_join", "diff_hash"), ("diff_hash", "diff_join")] {
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT * FROM {} EXCEPT ALL SELECT * FROM {})",
            left, right
        );
        assert_eq!(table_count(&engine, &sql), 0, "{} has rows {} lacks", left, right);
    }
}

#[test]
fn test_sample_only_covers_sampled_keys() {
    let engine = shifted_tables(2_000, 500);
    let outcome = run_into(&engine, "diff_sample", Strategy::Sample);

    assert_eq!(outcome.strategy, Strategy::Sample);
    assert!(outcome.diff_rows > 0);
    assert!(outcome.diff_rows <= 100);

    let summary = DiffSummary::load(
        &engine,
        "diff_sample",
        &[CompareColumn::new("v"), CompareColumn::new("name")],
    )
    .unwrap();
    // Rows only present in B can never be found from a sample of A
    assert_eq!(summary.added, 0);
    assert_eq!(summary.total_rows, outcome.diff_rows);

    assert_eq!(
        table_count(
            &engine,
            "SELECT COUNT(*) FROM duckdb_tables() WHERE starts_with(table_name, '__datadiff_sample_')"
        ),
        0
    );
}

#[test]
fn test_registry_drives_execution() {
    let engine = shifted_tables(1_000, 0);
    let run = DiffRun::new(&engine, builder(&["v"]), "diff_auto");
    let ctx = run.context().unwrap();
    assert_eq!(ctx.rows_a, 1_000);
    assert_eq!(ctx.rows_b, 1_000);
    assert_eq!(ctx.compare_columns, 1);
    assert_eq!(ctx.join_columns, 1);

    let registry = AlgorithmRegistry::default();
    let strategy = registry.select(StrategyChoice::Auto, &ctx).unwrap();
    assert_eq!(strategy, Strategy::FullJoin);

    let outcome = run.execute(strategy).unwrap();
    assert_eq!(outcome.output_table, "diff_auto");
    assert_eq!(outcome.diff_rows, 1_000);

    let tight = AlgorithmRegistry::new(StrategySettings {
        join_row_limit: 1_000,
        ..StrategySettings::default()
    });
    assert_eq!(
        tight
            .select(StrategyChoice::Explicit(Strategy::FullJoin), &ctx)
            .unwrap(),
        Strategy::HashPartition
    );
    let estimates = tight.estimates(&ctx);
    assert_eq!(estimates.len(), 3);
    assert!(!estimates[0].capable);
    assert!(estimates[1].capable);
}

#[test]
fn test_only_differences_drops_same_rows() {
    let engine = shifted_tables(3_000, 0);
    let config = ComparisonConfig {
        show_only_differences: true,
        ..ComparisonConfig::new(
            DataSource::table("a"),
            DataSource::table("b"),
            vec![JoinColumn::new("id")],
        )
    };
    let builder = DiffQueryBuilder::new(&config, vec![CompareColumn::new("v")]).unwrap();

    let mut run = DiffRun::new(&engine, builder, "diff_only");
    run.partition.row_threshold = 400;
    let outcome = run.execute(Strategy::HashPartition).unwrap();

    // ids 0, 100, ..., 2900 differ
    assert_eq!(outcome.diff_rows, 30);
    assert_eq!(
        table_count(
            &engine,
            "SELECT COUNT(*) FROM diff_only WHERE _row_status = 'same'"
        ),
        0
    );
}
