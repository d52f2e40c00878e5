//! Commands run against files on disk

use crate::common::*;
use clap::Parser;
use datadiff::cli::Cli;
use datadiff::commands::execute_command;
use datadiff::config::DiffSettings;
use datadiff::duckdb_config::EngineSettings;
use datadiff::{DuckDbEngine, SqlEngine};
use std::path::Path;

fn run(args: &[&str]) -> datadiff::Result<()> {
    let cli = Cli::try_parse_from(std::iter::once("datadiff").chain(args.iter().copied()))
        .expect("arguments should parse");
    execute_command(cli.command)
}

fn open_database(path: &Path) -> DuckDbEngine {
    DuckDbEngine::open(&EngineSettings {
        database: Some(path.to_path_buf()),
        ..EngineSettings::in_memory()
    })
    .unwrap()
}

fn customer_files(fixture: &TestFixture) -> (String, String) {
    let a = fixture
        .create_csv(
            "customers_a.csv",
            &[
                vec!["id", "name", "city"],
                vec!["1", "Alice", "Oslo"],
                vec!["2", "Bob", "Bergen"],
                vec!["3", "Carol", "Tromso"],
            ],
        )
        .unwrap();
    let b = fixture
        .create_csv(
            "customers_b.csv",
            &[
                vec!["customer_id", "name", "city"],
                vec!["1", "Alice", "Oslo"],
                vec!["2", "Bob", "Stavanger"],
                vec!["4", "Dave", "Bodo"],
            ],
        )
        .unwrap();
    (
        a.to_string_lossy().to_string(),
        b.to_string_lossy().to_string(),
    )
}

#[test]
fn test_compare_csv_files_with_mapped_key() {
    let fixture = TestFixture::new().unwrap();
    let (a, b) = customer_files(&fixture);
    let database = fixture.path("diff.duckdb");
    let database_arg = database.to_string_lossy().to_string();

    run(&[
        "compare",
        &a,
        &b,
        "--key",
        "id:customer_id",
        "--database",
        &database_arg,
        "--output-table",
        "customer_diff",
        "--strategy",
        "hash",
        "--row-threshold",
        "1",
        "--no-progress",
        "--json",
    ])
    .unwrap();

    let engine = open_database(&database);
    assert_eq!(table_count(&engine, "SELECT COUNT(*) FROM customer_diff"), 4);
    for (status, expected) in [("same", 1), ("modified", 1), ("added", 1), ("removed", 1)] {
        let sql = format!(
            "SELECT COUNT(*) FROM customer_diff WHERE _row_status = '{}'",
            status
        );
        assert_eq!(table_count(&engine, &sql), expected, "status {}", status);
    }
    assert_eq!(
        table_count(
            &engine,
            "SELECT COUNT(*) FROM customer_diff WHERE city_status = 'modified' AND name_status = 'same'"
        ),
        1
    );
}

#[test]
fn test_compare_with_excluded_column_and_filter() {
    let fixture = TestFixture::new().unwrap();
    let (a, b) = customer_files(&fixture);
    let database = fixture.path("filtered.duckdb");
    let database_arg = database.to_string_lossy().to_string();

    run(&[
        "compare",
        &a,
        &b,
        "--key",
        "id:customer_id",
        "--exclude",
        "city",
        "-a",
        "id < 3",
        "-b",
        "customer_id < 3",
        "--only-differences",
        "--database",
        &database_arg,
        "--output-table",
        "no_city",
        "--no-progress",
        "--json",
    ])
    .unwrap();

    let engine = open_database(&database);
    // Only Bob's city differs, and city is not compared
    assert_eq!(table_count(&engine, "SELECT COUNT(*) FROM no_city"), 0);
    let columns = engine
        .query("SELECT column_name FROM duckdb_columns() WHERE table_name = 'no_city'")
        .unwrap();
    let names: Vec<&str> = columns
        .rows
        .iter()
        .filter_map(|row| row[0].as_str())
        .collect();
    assert!(names.contains(&"name_status"));
    assert!(!names.iter().any(|n| n.starts_with("city")));
}

#[test]
fn test_sql_file_sources_and_config_file() {
    let fixture = TestFixture::new().unwrap();
    let query_a = fixture
        .create_raw(
            "a.sql",
            "SELECT range AS id, range * 2 AS amount FROM range(300);",
        )
        .unwrap();
    let query_b = fixture
        .create_raw(
            "b.sql",
            "SELECT range AS id, CASE WHEN range = 42 THEN 0 ELSE range * 2 END AS amount FROM range(300)",
        )
        .unwrap();
    let database = fixture.path("queries.duckdb");

    let mut settings = DiffSettings::default();
    settings.partition.row_threshold = 50;
    settings.engine.database = Some(database.clone());
    let config = fixture.path("settings.json");
    settings.save(&config).unwrap();

    run(&[
        "compare",
        &query_a.to_string_lossy(),
        &query_b.to_string_lossy(),
        "--key",
        "id",
        "--config",
        &config.to_string_lossy(),
        "--strategy",
        "hash",
        "--only-differences",
        "--output-table",
        "amount_diff",
        "--no-progress",
        "--json",
    ])
    .unwrap();

    let engine = open_database(&database);
    assert_eq!(table_count(&engine, "SELECT COUNT(*) FROM amount_diff"), 1);
    assert_eq!(
        table_count(&engine, "SELECT _key_id FROM amount_diff"),
        42
    );
}

#[test]
fn test_plan_does_not_create_output() {
    let fixture = TestFixture::new().unwrap();
    let (a, b) = customer_files(&fixture);
    let database = fixture.path("plan.duckdb");
    let database_arg = database.to_string_lossy().to_string();

    run(&[
        "plan",
        &a,
        &b,
        "--key",
        "id:customer_id",
        "--database",
        &database_arg,
        "--json",
    ])
    .unwrap();

    let engine = open_database(&database);
    assert_eq!(
        table_count(
            &engine,
            "SELECT COUNT(*) FROM duckdb_tables() WHERE starts_with(table_name, 'diff_')"
        ),
        0
    );
}

#[test]
fn test_missing_input_file_fails() {
    let fixture = TestFixture::new().unwrap();
    let missing = fixture.path("missing.csv");
    let result = run(&[
        "compare",
        &missing.to_string_lossy(),
        &missing.to_string_lossy(),
        "--key",
        "id",
        "--no-progress",
    ]);
    assert!(matches!(
        result,
        Err(datadiff::DatadiffError::InvalidInput { .. })
    ));
}
