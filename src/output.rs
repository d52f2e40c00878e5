//! Output formatting utilities

use crate::comparison::{CompareColumn, SchemaComparison};
use crate::engine::SqlEngine;
use crate::error::Result;
use crate::executor::PartitionPlan;
use crate::sql::{
    quote_ident, quote_literal, ROW_STATUS_COLUMN, STATUS_ADDED, STATUS_MODIFIED, STATUS_REMOVED,
    STATUS_SAME,
};
use crate::strategy::{DiffOutcome, StrategyContext, StrategyEstimate};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;

/// Row counts read back from a finished output table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub output_table: String,
    pub generated_at: DateTime<Utc>,
    pub total_rows: u64,
    pub added: u64,
    pub removed: u64,
    pub modified: u64,
    pub same: u64,
    /// Modified-row count per compared column, in output order
    pub column_modifications: IndexMap<String, u64>,
}

impl DiffSummary {
    /// Summarize `table`, a table written by one of the comparison strategies
    pub fn load<E: SqlEngine + ?Sized>(
        engine: &E,
        table: &str,
        compare_columns: &[CompareColumn],
    ) -> Result<Self> {
        let status_sql = format!(
            "SELECT {status} AS status, COUNT(*) AS row_count FROM {table} GROUP BY 1",
            status = quote_ident(ROW_STATUS_COLUMN),
            table = quote_ident(table)
        );
        let statuses = engine.query(&status_sql)?;

        let mut summary = DiffSummary {
            output_table: table.to_string(),
            generated_at: Utc::now(),
            total_rows: 0,
            added: 0,
            removed: 0,
            modified: 0,
            same: 0,
            column_modifications: IndexMap::new(),
        };

        for row in 0..statuses.row_count() {
            let count = statuses
                .value(row, "row_count")
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            let status = statuses
                .value(row, "status")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            match status {
                STATUS_ADDED => summary.added += count,
                STATUS_REMOVED => summary.removed += count,
                STATUS_MODIFIED => summary.modified += count,
                STATUS_SAME => summary.same += count,
                other => log::warn!("Unexpected row status '{}' in {}", other, table),
            }
            summary.total_rows += count;
        }

        if !compare_columns.is_empty() {
            let aggregates = compare_columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    format!(
                        "COUNT(*) FILTER (WHERE {} = {}) AS c{}",
                        quote_ident(&format!("{}_status", column.a_name())),
                        quote_literal(STATUS_MODIFIED),
                        i
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let columns = engine.query(&format!(
                "SELECT {} FROM {}",
                aggregates,
                quote_ident(table)
            ))?;
            for (i, column) in compare_columns.iter().enumerate() {
                let count = columns
                    .value(0, &format!("c{}", i))
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                summary
                    .column_modifications
                    .insert(column.a_name().to_string(), count);
            }
        }

        Ok(summary)
    }

    pub fn has_differences(&self) -> bool {
        self.added + self.removed + self.modified > 0
    }
}

/// Pretty printer for datadiff output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print the result of a comparison
    pub fn print_diff_summary(summary: &DiffSummary, outcome: &DiffOutcome) {
        println!(
            "🔍 Diff Results: {} ({}, {})",
            summary.output_table,
            outcome.strategy,
            format_duration_ms(outcome.elapsed_ms)
        );

        if summary.has_differences() {
            println!("├─ ❌ Rows added: {}", summary.added);
            println!("├─ ❌ Rows removed: {}", summary.removed);
            println!("├─ ❌ Rows modified: {}", summary.modified);
            let changed: Vec<(&String, &u64)> = summary
                .column_modifications
                .iter()
                .filter(|(_, count)| **count > 0)
                .collect();
            for (i, (column, count)) in changed.iter().enumerate() {
                let prefix = if i == changed.len() - 1 { "│  └─" } else { "│  ├─" };
                println!("{} {}: {}", prefix, column, count);
            }
        } else {
            println!("├─ ✅ Rows: no differences");
        }
        if summary.same > 0 {
            println!("├─ Rows unchanged: {}", summary.same);
        }

        if let Some(metrics) = &outcome.partition {
            println!(
                "├─ Buckets: {} processed, {} enqueued, max depth {}",
                metrics.processed_buckets, metrics.total_buckets_enqueued, metrics.max_depth
            );
            println!(
                "│  └─ Largest bucket: {} / {} rows",
                metrics.max_bucket_rows_a, metrics.max_bucket_rows_b
            );
        }
        println!("└─ Output rows: {}", summary.total_rows);
    }

    /// Print the strategy estimates and partition plan of a comparison
    pub fn print_plan(ctx: &StrategyContext, estimates: &[StrategyEstimate], plan: &PartitionPlan) {
        println!("📋 Comparison Plan");
        println!("├─ Rows: {} vs {}", ctx.rows_a, ctx.rows_b);
        println!(
            "├─ Columns: {} key, {} compared",
            ctx.join_columns, ctx.compare_columns
        );
        println!("├─ Strategies:");
        for (i, estimate) in estimates.iter().enumerate() {
            let prefix = if i == estimates.len() - 1 { "│  └─" } else { "│  ├─" };
            if estimate.capable {
                println!("{} ✅ {}: cost {:.0}", prefix, estimate.strategy, estimate.cost);
            } else {
                println!("{} ❌ {}: not applicable", prefix, estimate.strategy);
            }
        }
        println!("└─ Hash partitioning:");
        println!("   ├─ Row threshold: {}", plan.row_threshold);
        println!("   ├─ Split factor: {}", plan.split_factor);
        println!("   ├─ Effective depth: {}", plan.effective_depth);
        println!("   └─ Final modulus: {}", plan.final_modulus);
    }

    /// Print column differences between the two sources
    pub fn print_schema_comparison(schema: &SchemaComparison) {
        let mismatched: Vec<_> = schema
            .common_columns
            .iter()
            .filter(|c| !c.types_match)
            .collect();
        if schema.only_in_a.is_empty() && schema.only_in_b.is_empty() && mismatched.is_empty() {
            println!("✅ Schemas match ({} columns)", schema.common_columns.len());
            return;
        }

        println!("📊 Schema differences");
        if !schema.only_in_a.is_empty() {
            println!("├─ Only in A: {}", schema.only_in_a.join(", "));
        }
        if !schema.only_in_b.is_empty() {
            println!("├─ Only in B: {}", schema.only_in_b.join(", "));
        }
        for column in &mismatched {
            println!("├─ {}: {} → {}", column.name, column.type_a, column.type_b);
        }
        println!("└─ Common columns: {}", schema.common_columns.len());
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format any serializable data as JSON
    pub fn format<T: serde::Serialize + ?Sized>(data: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(data)?)
    }

    pub fn format_diff_summary(summary: &DiffSummary, outcome: &DiffOutcome) -> Result<String> {
        let json = serde_json::json!({
            "summary": summary,
            "outcome": outcome,
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }

    pub fn format_plan(
        ctx: &StrategyContext,
        estimates: &[StrategyEstimate],
        plan: &PartitionPlan,
    ) -> Result<String> {
        let json = serde_json::json!({
            "context": ctx,
            "strategies": estimates,
            "partition": plan,
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }
}

/// Format a duration in human-readable form
fn format_duration_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{} ms", ms)
    } else if ms < 60_000 {
        format!("{:.1} s", ms as f64 / 1_000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}
