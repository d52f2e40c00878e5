//! Command-line interface for datadiff

use crate::strategy::StrategyChoice;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "datadiff")]
#[command(about = "Row-level diff of two tables, files or queries on DuckDB")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare two sources into an output table
    Compare {
        #[command(flatten)]
        sources: SourceArgs,

        /// Keep only added, removed and modified rows
        #[arg(long)]
        only_differences: bool,

        /// Output table name (defaults to a unique diff_<uuid> name)
        #[arg(long)]
        output_table: Option<String>,

        /// Do not draw progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Show strategy costs and the partition plan without comparing
    Plan {
        #[command(flatten)]
        sources: SourceArgs,
    },
}

/// Inputs shared by every command
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Source A: table name, data file (.csv, .parquet, .json, ...), .sql file or SELECT
    pub source_a: String,

    /// Source B: table name, data file, .sql file or SELECT
    pub source_b: String,

    /// Join key column, "name" or "a_name:b_name" (repeatable)
    #[arg(short, long = "key", required = true, value_delimiter = ',', value_parser = ColumnMapping::parse)]
    pub keys: Vec<ColumnMapping>,

    /// Columns to compare, "name" or "a_name:b_name" (defaults to all common columns)
    #[arg(long, value_delimiter = ',', value_parser = ColumnMapping::parse)]
    pub columns: Vec<ColumnMapping>,

    /// Columns to leave out of the comparison
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// SQL filter applied to both sources
    #[arg(long)]
    pub filter: Option<String>,

    /// SQL filter applied to source A only
    #[arg(short = 'a', long)]
    pub filter_a: Option<String>,

    /// SQL filter applied to source B only
    #[arg(short = 'b', long)]
    pub filter_b: Option<String>,

    /// Strategy: "auto", "hash", "join", or "sample"
    #[arg(long, default_value = "auto", value_parser = StrategyChoice::parse)]
    pub strategy: StrategyChoice,

    /// DuckDB database file (in-memory when omitted)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// Maximum rows per bucket before it is split (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub row_threshold: Option<u64>,

    /// Children per split (must be >= 2)
    #[arg(long, value_parser = validate_split_factor)]
    pub split_factor: Option<u64>,

    /// Maximum partitioning depth (at most 10)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=10))]
    pub max_depth: Option<u32>,

    /// Rows drawn from source A by the sample strategy (must be > 0)
    #[arg(long, value_parser = validate_positive)]
    pub sample_size: Option<u64>,

    /// JSON settings file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Column named `a` on side A and `b` (or `a`) on side B
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub a: String,
    pub b: Option<String>,
}

impl ColumnMapping {
    pub fn parse(s: &str) -> Result<Self, String> {
        let (a, b) = match s.split_once(':') {
            Some((a, b)) => (a.trim(), Some(b.trim())),
            None => (s.trim(), None),
        };
        if a.is_empty() || b.is_some_and(str::is_empty) {
            return Err(format!(
                "Invalid column: '{}'. Use 'name' or 'a_name:b_name'",
                s
            ));
        }
        Ok(Self {
            a: a.to_string(),
            b: b.filter(|b| *b != a).map(str::to_string),
        })
    }
}

/// Validate that a count is greater than 0
fn validate_positive(s: &str) -> Result<u64, String> {
    let value: u64 = s
        .parse()
        .map_err(|_| format!("Invalid value: '{}'. Must be a positive integer.", s))?;

    if value == 0 {
        return Err("Value must be greater than 0".to_string());
    }

    Ok(value)
}

fn validate_split_factor(s: &str) -> Result<u64, String> {
    let value = validate_positive(s)?;
    if value < 2 {
        return Err("Split factor must be at least 2".to_string());
    }
    Ok(value)
}
