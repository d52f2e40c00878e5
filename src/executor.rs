//! Adaptive hash-partitioning diff executor
//!
//! A run counts both sources, decides how deep the hash partitioning may go,
//! precomputes per-bucket counts at the finest modulus, and then works through
//! a priority queue of hash segments: every popped segment is either empty,
//! small enough (or deep enough) to diff directly into the output table, or
//! split into children that go back on the queue. Buckets are diffed one at a
//! time so that the engine never has to join more than one bucket's rows.

use crate::cancel::CancellationToken;
use crate::config::PartitionSettings;
use crate::engine::{count_rows, SqlEngine};
use crate::error::{DatadiffError, Result};
use crate::estimator::estimate_both;
use crate::progress::{NoProgress, ProgressEvent, ProgressSink, ProgressStage};
use crate::queue::PriorityQueue;
use crate::segment::{local_split_factor, BucketCounts, HashSegment, QueueEntry};
use crate::sql::{DiffQueryBuilder, Side};
use serde::Serialize;
use std::time::Instant;

/// Global partitioning parameters derived from the source sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionPlan {
    pub total_rows_a: u64,
    pub total_rows_b: u64,
    pub row_threshold: u64,
    pub split_factor: u64,
    pub effective_depth: u32,
    pub final_modulus: u64,
}

impl PartitionPlan {
    pub fn from_counts(settings: &PartitionSettings, total_rows_a: u64, total_rows_b: u64) -> Self {
        let settings = settings.normalized();
        let effective_depth = settings.effective_depth(total_rows_a.max(total_rows_b));
        Self {
            total_rows_a,
            total_rows_b,
            row_threshold: settings.row_threshold,
            split_factor: settings.split_factor,
            effective_depth,
            final_modulus: settings.final_modulus(effective_depth),
        }
    }

    /// True when a segment may not be split any further
    pub fn at_ceiling(&self, segment: &HashSegment) -> bool {
        segment.depth >= self.effective_depth || segment.modulus >= self.final_modulus
    }
}

/// Final report of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionMetrics {
    pub processed_buckets: u64,
    pub total_buckets_enqueued: u64,
    pub max_depth: u32,
    pub max_bucket_rows_a: u64,
    pub max_bucket_rows_b: u64,
    pub processed_rows: u64,
    pub diff_rows: u64,
    pub plan: PartitionPlan,
    pub elapsed_ms: u64,
}

/// Counters of a run in progress; monotonic within a run
#[derive(Debug, Default)]
struct RunState {
    completed: u64,
    enqueued: u64,
    processed_rows: u64,
    diff_rows: u64,
    max_depth: u32,
    max_rows_a: u64,
    max_rows_b: u64,
}

/// Per-bucket counts of both sides at the finest modulus
struct FineCounts {
    a: BucketCounts,
    b: BucketCounts,
}

/// Diffs two sources into one output table, one hash bucket at a time
pub struct HashPartitionExecutor<'a, E: SqlEngine + ?Sized> {
    engine: &'a E,
    builder: DiffQueryBuilder,
    output_table: String,
    settings: PartitionSettings,
    cancel: CancellationToken,
    progress: &'a dyn ProgressSink,
}

impl<'a, E: SqlEngine + ?Sized> HashPartitionExecutor<'a, E> {
    pub fn new(engine: &'a E, builder: DiffQueryBuilder, output_table: impl Into<String>) -> Self {
        Self {
            engine,
            builder,
            output_table: output_table.into(),
            settings: PartitionSettings::default(),
            cancel: CancellationToken::new(),
            progress: &NoProgress,
        }
    }

    pub fn with_settings(mut self, settings: PartitionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    pub fn output_table(&self) -> &str {
        &self.output_table
    }

    fn query_builder(&self) -> DiffQueryBuilder {
        let settings = self.settings.normalized();
        self.builder
            .clone()
            .with_limits(settings.max_modulus, settings.max_hash_range)
    }

    fn check_sources(&self) -> Result<()> {
        if self.builder.source(Side::A).is_blank() || self.builder.source(Side::B).is_blank() {
            return Err(DatadiffError::invalid_input("Both sources are required"));
        }
        if self.output_table.trim().is_empty() {
            return Err(DatadiffError::invalid_input("Output table name must not be empty"));
        }
        Ok(())
    }

    /// Count both sources and derive the partitioning parameters, without diffing
    pub fn plan(&self) -> Result<PartitionPlan> {
        self.check_sources()?;
        let builder = self.query_builder();
        let (total_a, total_b) = rayon::join(
            || count_rows(self.engine, &builder.count_query(Side::A)),
            || count_rows(self.engine, &builder.count_query(Side::B)),
        );
        Ok(PartitionPlan::from_counts(&self.settings, total_a?, total_b?))
    }

    /// Run the comparison.
    ///
    /// On failure or cancellation, buckets already inserted stay in the output
    /// table; a cancelled run fails with [`DatadiffError::Aborted`].
    pub fn run(&self) -> Result<PartitionMetrics> {
        let started = Instant::now();
        let builder = self.query_builder();

        let plan = self.plan()?;
        log::info!(
            "Partitioned diff into {}: {} vs {} rows, threshold {}, depth {}, final modulus {}",
            self.output_table,
            plan.total_rows_a,
            plan.total_rows_b,
            plan.row_threshold,
            plan.effective_depth,
            plan.final_modulus
        );
        self.engine
            .execute(&builder.create_output_table(&self.output_table)?)?;

        let mut state = RunState::default();
        self.emit(&state, 0, false, ProgressStage::Counting, None, None);
        let (fine_a, fine_b) = estimate_both(self.engine, &builder, plan.final_modulus)?;
        let fine = FineCounts { a: fine_a, b: fine_b };

        let mut queue = PriorityQueue::new(QueueEntry::is_higher_priority);
        let root = HashSegment::root();
        if plan.total_rows_a > 0 || plan.total_rows_b > 0 {
            queue.push(QueueEntry::sized(root, plan.total_rows_a, plan.total_rows_b));
            state.enqueued += 1;
            self.emit(
                &state,
                queue.len() as u64,
                false,
                ProgressStage::Queued,
                Some(root),
                Some((plan.total_rows_a, plan.total_rows_b)),
            );
        } else {
            log::info!("Both sources are empty, nothing to compare");
        }

        loop {
            self.cancel.check()?;
            let Some(entry) = queue.pop() else {
                break;
            };
            let segment = entry.segment();
            let pending = queue.len() as u64;
            state.max_depth = state.max_depth.max(segment.depth);

            let (count_a, count_b) = match entry.counts() {
                Some(counts) => counts,
                None => {
                    self.emit(&state, pending, true, ProgressStage::Counting, Some(segment), None);
                    self.segment_counts(&builder, &fine, &segment)?
                }
            };
            let max_count = count_a.max(count_b);

            if max_count == 0 {
                state.completed += 1;
                self.emit(
                    &state,
                    pending,
                    false,
                    ProgressStage::BucketComplete,
                    Some(segment),
                    Some((0, 0)),
                );
                continue;
            }

            if max_count <= plan.row_threshold || plan.at_ceiling(&segment) {
                self.emit(
                    &state,
                    pending,
                    true,
                    ProgressStage::Inserting,
                    Some(segment),
                    Some((count_a, count_b)),
                );
                let inserted = self.materialize(&builder, &segment)?;
                log::debug!(
                    "Segment {}: {} / {} rows, {} diff rows inserted",
                    segment,
                    count_a,
                    count_b,
                    inserted
                );

                state.completed += 1;
                state.processed_rows += max_count;
                state.diff_rows += inserted;
                state.max_rows_a = state.max_rows_a.max(count_a);
                state.max_rows_b = state.max_rows_b.max(count_b);
                self.emit(
                    &state,
                    pending,
                    false,
                    ProgressStage::BucketComplete,
                    Some(segment),
                    Some((count_a, count_b)),
                );
                continue;
            }

            let split_factor = local_split_factor(max_count, plan.row_threshold, plan.split_factor);
            log::debug!(
                "Splitting segment {} ({} / {} rows) into {} children",
                segment,
                count_a,
                count_b,
                split_factor
            );
            for child in segment.children(split_factor) {
                queue.push(QueueEntry::pending(child, max_count));
                state.enqueued += 1;
            }
            self.emit(
                &state,
                queue.len() as u64,
                false,
                ProgressStage::Splitting,
                Some(segment),
                Some((count_a, count_b)),
            );
        }

        self.emit(&state, 0, false, ProgressStage::Finalizing, None, None);
        self.engine.checkpoint(&self.output_table)?;

        let metrics = PartitionMetrics {
            processed_buckets: state.completed,
            total_buckets_enqueued: state.enqueued,
            max_depth: state.max_depth,
            max_bucket_rows_a: state.max_rows_a,
            max_bucket_rows_b: state.max_rows_b,
            processed_rows: state.processed_rows,
            diff_rows: state.diff_rows,
            plan,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.emit(&state, 0, false, ProgressStage::Done, None, None);
        log::info!(
            "Partitioned diff finished: {} buckets ({} enqueued), max depth {}, {} diff rows in {} ms",
            metrics.processed_buckets,
            metrics.total_buckets_enqueued,
            metrics.max_depth,
            metrics.diff_rows,
            metrics.elapsed_ms
        );
        Ok(metrics)
    }

    /// Exact counts of a freshly split segment
    fn segment_counts(
        &self,
        builder: &DiffQueryBuilder,
        fine: &FineCounts,
        segment: &HashSegment,
    ) -> Result<(u64, u64)> {
        if let (Some(a), Some(b)) = (fine.a.segment_count(segment), fine.b.segment_count(segment)) {
            return Ok((a, b));
        }

        // The local split factor produced a modulus that does not divide the
        // fine modulus, so the fine buckets cannot be summed for this segment
        log::debug!(
            "Counting segment {} directly (fine modulus {})",
            segment,
            fine.a.modulus
        );
        let sql_a = builder.segment_count_query(Side::A, segment)?;
        let sql_b = builder.segment_count_query(Side::B, segment)?;
        let (a, b) = rayon::join(
            || count_rows(self.engine, &sql_a),
            || count_rows(self.engine, &sql_b),
        );
        Ok((a?, b?))
    }

    /// Diff one segment into the output table, returning the rows inserted
    fn materialize(&self, builder: &DiffQueryBuilder, segment: &HashSegment) -> Result<u64> {
        let expected = self
            .engine
            .query_cancellable(&builder.segment_diff_count(segment)?, &self.cancel)?
            .scalar_u64()?;
        let inserted = self
            .engine
            .execute(&builder.insert_segment(&self.output_table, segment)?)? as u64;
        if inserted != expected {
            log::warn!(
                "Segment {}: expected {} diff rows, engine reported {} inserted",
                segment,
                expected,
                inserted
            );
        }
        Ok(expected)
    }

    fn emit(
        &self,
        state: &RunState,
        pending: u64,
        active: bool,
        stage: ProgressStage,
        segment: Option<HashSegment>,
        counts: Option<(u64, u64)>,
    ) {
        self.progress.emit(ProgressEvent {
            stage,
            segment,
            completed_buckets: state.completed,
            pending_buckets: pending,
            total_buckets: state.completed + pending + u64::from(active),
            processed_rows: state.processed_rows,
            count_a: counts.map(|(a, _)| a),
            count_b: counts.map(|(_, b)| b),
            diff_rows: Some(state.diff_rows),
        });
    }
}
