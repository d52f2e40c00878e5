//! Comparison strategies and the registry choosing between them

use crate::cancel::CancellationToken;
use crate::comparison::DataSource;
use crate::config::{PartitionSettings, StrategySettings};
use crate::engine::{count_rows, SqlEngine};
use crate::error::{DatadiffError, Result};
use crate::executor::{HashPartitionExecutor, PartitionMetrics};
use crate::progress::{NoProgress, ProgressSink};
use crate::sql::{quote_ident, source_relation, DiffQueryBuilder, Side};
use serde::Serialize;
use std::time::Instant;

/// Constant cost of sampling; high enough that it is never picked automatically
pub const SAMPLE_COST: f64 = 1e15;

/// Extra cost per partitioning level, relative to the rows compared
const DEPTH_COST_FACTOR: f64 = 0.25;

/// The ways a comparison can be run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Adaptive hash partitioning, one bucket at a time
    HashPartition,
    /// One full outer join over both sources
    FullJoin,
    /// Full outer join over a random sample of side A's keys
    Sample,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::HashPartition => "hash-partition",
            Strategy::FullJoin => "full-join",
            Strategy::Sample => "sample",
        }
    }

    pub fn can_handle(&self, ctx: &StrategyContext, settings: &StrategySettings) -> bool {
        if ctx.join_columns == 0 {
            return false;
        }
        match self {
            Strategy::HashPartition => true,
            Strategy::FullJoin => ctx.total_rows() <= settings.join_row_limit,
            Strategy::Sample => settings.sample_size > 0,
        }
    }

    /// Lower is better
    pub fn estimate_cost(&self, ctx: &StrategyContext, settings: &StrategySettings) -> f64 {
        let rows = ctx.total_rows() as f64;
        match self {
            Strategy::FullJoin => rows,
            Strategy::HashPartition => {
                rows * (1.0 + DEPTH_COST_FACTOR * f64::from(ctx.estimated_depth))
                    + settings.hash_partition_overhead
            }
            Strategy::Sample => SAMPLE_COST,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyChoice {
    #[default]
    Auto,
    Explicit(Strategy),
}

impl StrategyChoice {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "hash" | "hash-partition" => Ok(Self::Explicit(Strategy::HashPartition)),
            "join" | "full-join" => Ok(Self::Explicit(Strategy::FullJoin)),
            "sample" => Ok(Self::Explicit(Strategy::Sample)),
            _ => Err(format!(
                "Invalid strategy: {}. Use 'auto', 'hash', 'join', or 'sample'",
                s
            )),
        }
    }
}

/// Dataset size estimates a strategy is chosen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StrategyContext {
    pub rows_a: u64,
    pub rows_b: u64,
    pub compare_columns: usize,
    pub join_columns: usize,
    /// Partitioning depth the hash strategy would need
    pub estimated_depth: u32,
}

impl StrategyContext {
    pub fn new(
        rows_a: u64,
        rows_b: u64,
        compare_columns: usize,
        join_columns: usize,
        partition: &PartitionSettings,
    ) -> Self {
        Self {
            rows_a,
            rows_b,
            compare_columns,
            join_columns,
            estimated_depth: partition.normalized().effective_depth(rows_a.max(rows_b)),
        }
    }

    pub fn total_rows(&self) -> u64 {
        self.rows_a.saturating_add(self.rows_b)
    }
}

/// Capability and cost of one strategy for a context
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyEstimate {
    pub strategy: Strategy,
    pub capable: bool,
    pub cost: f64,
}

/// Result of running a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffOutcome {
    pub strategy: Strategy,
    pub output_table: String,
    pub diff_rows: u64,
    /// Present for hash-partitioned runs
    pub partition: Option<PartitionMetrics>,
    pub elapsed_ms: u64,
}

/// Ordered set of strategies, built explicitly by its users
#[derive(Debug, Clone)]
pub struct AlgorithmRegistry {
    strategies: Vec<Strategy>,
    settings: StrategySettings,
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new(StrategySettings::default())
    }
}

impl AlgorithmRegistry {
    /// Registry holding every strategy, in tie-breaking order
    pub fn new(settings: StrategySettings) -> Self {
        Self {
            strategies: vec![Strategy::FullJoin, Strategy::HashPartition, Strategy::Sample],
            settings,
        }
    }

    /// Registry holding only `strategies`, in the given order
    pub fn with_strategies(strategies: Vec<Strategy>, settings: StrategySettings) -> Self {
        Self {
            strategies,
            settings,
        }
    }

    pub fn settings(&self) -> &StrategySettings {
        &self.settings
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub fn get(&self, name: &str) -> Option<Strategy> {
        self.strategies
            .iter()
            .copied()
            .find(|s| s.name() == name)
    }

    /// Pick a strategy for `ctx`.
    ///
    /// An explicit choice that cannot handle the context, or is not
    /// registered, falls back to automatic selection.
    pub fn select(&self, choice: StrategyChoice, ctx: &StrategyContext) -> Result<Strategy> {
        if let StrategyChoice::Explicit(requested) = choice {
            if self.strategies.contains(&requested) && requested.can_handle(ctx, &self.settings) {
                return Ok(requested);
            }
            log::warn!(
                "Strategy {} cannot handle {} + {} rows, selecting automatically",
                requested,
                ctx.rows_a,
                ctx.rows_b
            );
        }
        self.select_auto(ctx)
    }

    fn select_auto(&self, ctx: &StrategyContext) -> Result<Strategy> {
        let mut best: Option<(Strategy, f64)> = None;
        for strategy in &self.strategies {
            if !strategy.can_handle(ctx, &self.settings) {
                continue;
            }
            let cost = strategy.estimate_cost(ctx, &self.settings);
            // Strict comparison keeps the earlier strategy on ties
            if best.map_or(true, |(_, best_cost)| cost < best_cost) {
                best = Some((*strategy, cost));
            }
        }
        best.map(|(strategy, cost)| {
            log::debug!("Selected strategy {} (cost {:.0})", strategy, cost);
            strategy
        })
        .ok_or_else(|| DatadiffError::invalid_input("No registered strategy can handle this comparison"))
    }

    /// Capability and cost of every registered strategy
    pub fn estimates(&self, ctx: &StrategyContext) -> Vec<StrategyEstimate> {
        self.strategies
            .iter()
            .map(|strategy| StrategyEstimate {
                strategy: *strategy,
                capable: strategy.can_handle(ctx, &self.settings),
                cost: strategy.estimate_cost(ctx, &self.settings),
            })
            .collect()
    }
}

/// Everything a strategy needs to run
pub struct DiffRun<'a, E: SqlEngine + ?Sized> {
    pub engine: &'a E,
    pub builder: DiffQueryBuilder,
    pub output_table: String,
    pub partition: PartitionSettings,
    pub settings: StrategySettings,
    pub cancel: CancellationToken,
    pub progress: &'a dyn ProgressSink,
}

impl<'a, E: SqlEngine + ?Sized> DiffRun<'a, E> {
    pub fn new(engine: &'a E, builder: DiffQueryBuilder, output_table: impl Into<String>) -> Self {
        Self {
            engine,
            builder,
            output_table: output_table.into(),
            partition: PartitionSettings::default(),
            settings: StrategySettings::default(),
            cancel: CancellationToken::new(),
            progress: &NoProgress,
        }
    }

    /// Count both filtered sources concurrently
    pub fn count_sources(&self) -> Result<(u64, u64)> {
        let (a, b) = rayon::join(
            || count_rows(self.engine, &self.builder.count_query(Side::A)),
            || count_rows(self.engine, &self.builder.count_query(Side::B)),
        );
        Ok((a?, b?))
    }

    /// Size estimates for strategy selection
    pub fn context(&self) -> Result<StrategyContext> {
        let (rows_a, rows_b) = self.count_sources()?;
        Ok(StrategyContext::new(
            rows_a,
            rows_b,
            self.builder.compare_columns().len(),
            self.builder.join_columns().len(),
            &self.partition,
        ))
    }

    /// Run `strategy` to completion
    pub fn execute(&self, strategy: Strategy) -> Result<DiffOutcome> {
        let started = Instant::now();
        log::info!("Running {} comparison into {}", strategy, self.output_table);

        let (diff_rows, partition) = match strategy {
            Strategy::HashPartition => {
                let metrics = HashPartitionExecutor::new(
                    self.engine,
                    self.builder.clone(),
                    self.output_table.clone(),
                )
                .with_settings(self.partition.clone())
                .with_cancellation(self.cancel.clone())
                .with_progress(self.progress)
                .run()?;
                (metrics.diff_rows, Some(metrics))
            }
            Strategy::FullJoin => (self.full_join(&self.builder)?, None),
            Strategy::Sample => (self.sample()?, None),
        };

        Ok(DiffOutcome {
            strategy,
            output_table: self.output_table.clone(),
            diff_rows,
            partition,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn full_join(&self, builder: &DiffQueryBuilder) -> Result<u64> {
        self.cancel.check()?;
        self.engine.execute(&builder.materialize(&self.output_table)?)?;
        self.cancel.check()?;
        self.engine.checkpoint(&self.output_table)?;
        count_rows(
            self.engine,
            &format!("SELECT COUNT(*) FROM {}", quote_ident(&self.output_table)),
        )
    }

    fn sample(&self) -> Result<u64> {
        let sample_table = format!("__datadiff_sample_{}", uuid::Uuid::new_v4().simple());
        let sample_sql = format!(
            "CREATE TABLE {} AS SELECT * FROM ({}) AS filtered USING SAMPLE {} ROWS",
            quote_ident(&sample_table),
            self.builder.filtered_source(Side::A, None)?,
            self.settings.sample_size
        );
        self.cancel.check()?;
        self.engine.execute(&sample_sql)?;
        log::debug!(
            "Sampled up to {} rows of {} into {}",
            self.settings.sample_size,
            self.builder.source(Side::A).label(),
            sample_table
        );

        let result = self.diff_sample(&sample_table);

        if let Err(e) = self
            .engine
            .execute(&format!("DROP TABLE IF EXISTS {}", quote_ident(&sample_table)))
        {
            log::warn!("Failed to drop sample table {}: {}", sample_table, e);
        }
        result
    }

    fn diff_sample(&self, sample_table: &str) -> Result<u64> {
        let join_condition = self
            .builder
            .join_columns()
            .iter()
            .map(|j| {
                format!(
                    "src.{} = sampled.{}",
                    quote_ident(j.b_name()),
                    quote_ident(j.a_name())
                )
            })
            .collect::<Vec<_>>()
            .join(" AND ");
        let restricted_b = format!(
            "SELECT src.* FROM {} AS src SEMI JOIN {} AS sampled ON {}",
            source_relation(self.builder.source(Side::B)),
            quote_ident(sample_table),
            join_condition
        );

        let builder = self
            .builder
            .clone()
            .with_source(Side::A, DataSource::table(quote_ident(sample_table)))
            .with_source(Side::B, DataSource::query(restricted_b));
        self.full_join(&builder)
    }
}
