//! # datadiff
//!
//! Row-level comparison of two tables, files or queries on DuckDB. Large
//! inputs are split adaptively by join-key hash and diffed one bucket at a
//! time into a persistent output table.

pub mod cancel;
pub mod cli;
pub mod commands;
pub mod comparison;
pub mod config;
pub mod duckdb_config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod executor;
pub mod loader;
pub mod output;
pub mod progress;
pub mod queue;
pub mod segment;
pub mod sql;
pub mod strategy;

pub use cancel::CancellationToken;
pub use comparison::{CompareColumn, ComparisonConfig, DataSource, JoinColumn};
pub use engine::{DuckDbEngine, SqlEngine};
pub use error::{DatadiffError, Result};
pub use executor::{HashPartitionExecutor, PartitionMetrics};
pub use sql::DiffQueryBuilder;
pub use strategy::{AlgorithmRegistry, Strategy, StrategyChoice};
