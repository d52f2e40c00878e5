//! Unit tests for CLI parsing

use clap::Parser;
use datadiff::cli::{Cli, ColumnMapping, Commands};
use datadiff::strategy::{Strategy, StrategyChoice};

fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
    Cli::try_parse_from(std::iter::once("datadiff").chain(args.iter().copied()))
}

#[test]
fn test_compare_defaults() {
    let cli = parse(&["compare", "orders_a", "orders_b", "--key", "id"]).unwrap();
    assert!(!cli.verbose);

    match cli.command {
        Commands::Compare {
            sources,
            only_differences,
            output_table,
            no_progress,
        } => {
            assert_eq!(sources.source_a, "orders_a");
            assert_eq!(sources.source_b, "orders_b");
            assert_eq!(sources.keys, vec![ColumnMapping::parse("id").unwrap()]);
            assert!(sources.columns.is_empty());
            assert_eq!(sources.strategy, StrategyChoice::Auto);
            assert!(sources.row_threshold.is_none());
            assert!(!only_differences);
            assert!(output_table.is_none());
            assert!(!no_progress);
        }
        _ => panic!("expected compare command"),
    }
}

#[test]
fn test_compare_all_flags() {
    let cli = parse(&[
        "--verbose",
        "compare",
        "a.parquet",
        "b.parquet",
        "--key",
        "id",
        "--key",
        "region:area",
        "--columns",
        "price,qty:quantity",
        "--exclude",
        "updated_at",
        "--filter",
        "deleted = false",
        "-a",
        "year = 2023",
        "-b",
        "yr = 2023",
        "--only-differences",
        "--strategy",
        "sample",
        "--output-table",
        "my_diff",
        "--row-threshold",
        "5000",
        "--split-factor",
        "8",
        "--max-depth",
        "3",
        "--sample-size",
        "250",
        "--json",
    ])
    .unwrap();
    assert!(cli.verbose);

    match cli.command {
        Commands::Compare {
            sources,
            only_differences,
            output_table,
            ..
        } => {
            assert_eq!(sources.keys.len(), 2);
            assert_eq!(sources.keys[1].a, "region");
            assert_eq!(sources.keys[1].b.as_deref(), Some("area"));
            assert_eq!(sources.columns.len(), 2);
            assert_eq!(sources.columns[1].b.as_deref(), Some("quantity"));
            assert_eq!(sources.exclude, vec!["updated_at".to_string()]);
            assert_eq!(sources.filter.as_deref(), Some("deleted = false"));
            assert_eq!(sources.filter_a.as_deref(), Some("year = 2023"));
            assert_eq!(sources.filter_b.as_deref(), Some("yr = 2023"));
            assert_eq!(sources.strategy, StrategyChoice::Explicit(Strategy::Sample));
            assert_eq!(sources.row_threshold, Some(5000));
            assert_eq!(sources.split_factor, Some(8));
            assert_eq!(sources.max_depth, Some(3));
            assert_eq!(sources.sample_size, Some(250));
            assert!(sources.json);
            assert!(only_differences);
            assert_eq!(output_table.as_deref(), Some("my_diff"));
        }
        _ => panic!("expected compare command"),
    }
}

#[test]
fn test_plan_command() {
    let cli = parse(&["plan", "a.csv", "b.csv", "-k", "id", "--strategy", "hash"]).unwrap();
    match cli.command {
        Commands::Plan { sources } => {
            assert_eq!(
                sources.strategy,
                StrategyChoice::Explicit(Strategy::HashPartition)
            );
        }
        _ => panic!("expected plan command"),
    }
}

#[test]
fn test_invalid_values_rejected() {
    let base = ["compare", "a", "b", "--key", "id"];
    let with = |extra: &[&str]| {
        let mut args: Vec<&str> = base.to_vec();
        args.extend_from_slice(extra);
        parse(&args)
    };

    assert!(with(&["--strategy", "fastest"]).is_err());
    assert!(with(&["--row-threshold", "0"]).is_err());
    assert!(with(&["--split-factor", "1"]).is_err());
    assert!(with(&["--max-depth", "11"]).is_err());
    assert!(with(&["--sample-size", "-5"]).is_err());
    assert!(parse(&["compare", "a", "b", "--key", "id:"]).is_err());
    assert!(parse(&["compare", "a", "b"]).is_err());
}
