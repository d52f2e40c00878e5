//! Run parameters for comparisons and their JSON configuration file

use crate::duckdb_config::EngineSettings;
use crate::error::{DatadiffError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default maximum rows a single bucket may hold before it must split
pub const DEFAULT_ROW_THRESHOLD: u64 = 100_000;

/// Bounds applied when the row threshold is adapted to the dataset size
pub const MIN_ADAPTIVE_ROW_THRESHOLD: u64 = 100_000;
pub const MAX_ADAPTIVE_ROW_THRESHOLD: u64 = 4_000_000;

/// Default children per split
pub const DEFAULT_SPLIT_FACTOR: u64 = 4;

/// Default recursion depth cap
pub const DEFAULT_MAX_DEPTH: u32 = 6;

/// Depth no run may exceed, whatever the configuration says
pub const DEPTH_CEILING: u32 = 10;

/// Largest modulus the fragment builder accepts
pub const DEFAULT_MAX_MODULUS: u64 = 1 << 20;

/// Largest span a hash-range fragment may cover
pub const DEFAULT_MAX_HASH_RANGE: u64 = 1 << 40;

/// Cell budget used to adapt the row threshold to the output width
pub const DEFAULT_CELL_BUDGET: u64 = 40_000_000;

/// Knobs of the adaptive hash-partitioning executor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PartitionSettings {
    pub row_threshold: u64,
    pub split_factor: u64,
    pub max_depth: u32,
    pub max_modulus: u64,
    pub max_hash_range: u64,
}

impl Default for PartitionSettings {
    fn default() -> Self {
        Self {
            row_threshold: DEFAULT_ROW_THRESHOLD,
            split_factor: DEFAULT_SPLIT_FACTOR,
            max_depth: DEFAULT_MAX_DEPTH,
            max_modulus: DEFAULT_MAX_MODULUS,
            max_hash_range: DEFAULT_MAX_HASH_RANGE,
        }
    }
}

impl PartitionSettings {
    /// Copy with every field pulled into its legal range
    pub fn normalized(&self) -> Self {
        Self {
            row_threshold: self.row_threshold.max(1),
            split_factor: self.split_factor.max(2),
            max_depth: self.max_depth.min(DEPTH_CEILING),
            max_modulus: self.max_modulus.max(1),
            max_hash_range: self.max_hash_range.max(1),
        }
    }

    /// Depth needed so that `max_rows` spread evenly lands under the threshold,
    /// capped by `max_depth` and the global ceiling
    pub fn effective_depth(&self, max_rows: u64) -> u32 {
        let settings = self.normalized();
        if max_rows <= settings.row_threshold {
            return 0;
        }
        let ratio = max_rows as f64 / settings.row_threshold as f64;
        let required = (ratio.ln() / (settings.split_factor as f64).ln()).ceil();
        let required = if required.is_finite() && required > 0.0 {
            required as u32
        } else {
            0
        };

        let mut depth = required.min(settings.max_depth).min(DEPTH_CEILING);
        // The finest modulus must stay within what the fragment builder accepts
        while depth > 0 && final_modulus(settings.split_factor, depth) > settings.max_modulus {
            depth -= 1;
        }
        depth
    }

    /// Modulus used for the finest-grained bucket counts
    pub fn final_modulus(&self, effective_depth: u32) -> u64 {
        final_modulus(self.normalized().split_factor, effective_depth)
    }
}

fn final_modulus(split_factor: u64, depth: u32) -> u64 {
    split_factor.saturating_pow(depth)
}

/// Row threshold adapted to how wide the diff output gets.
///
/// Each output row carries an `_a`/`_b`/`_status` triple per compared column,
/// so wider tables get smaller buckets.
pub fn adaptive_row_threshold(estimated_rows: u64, column_count: usize) -> u64 {
    adaptive_row_threshold_with_budget(estimated_rows, column_count, DEFAULT_CELL_BUDGET)
}

pub fn adaptive_row_threshold_with_budget(
    estimated_rows: u64,
    column_count: usize,
    cell_budget: u64,
) -> u64 {
    let width = 2 * column_count as u64 + 1;
    let by_width = cell_budget / width.max(1);
    // Small inputs never need more than one bucket anyway
    let wanted = by_width.min(estimated_rows.max(MIN_ADAPTIVE_ROW_THRESHOLD));
    wanted.clamp(MIN_ADAPTIVE_ROW_THRESHOLD, MAX_ADAPTIVE_ROW_THRESHOLD)
}

/// Knobs of the algorithm-selection registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StrategySettings {
    /// Total rows (both sides) above which a single full join is refused
    pub join_row_limit: u64,
    /// Rows drawn from source A by the sampling strategy
    pub sample_size: u64,
    /// Fixed cost added to hash partitioning for its extra count queries
    pub hash_partition_overhead: f64,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            join_row_limit: 2_000_000,
            sample_size: 10_000,
            hash_partition_overhead: 50_000.0,
        }
    }
}

/// Everything loadable from a datadiff JSON configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DiffSettings {
    pub partition: PartitionSettings,
    pub strategy: StrategySettings,
    pub engine: EngineSettings,
}

impl DiffSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            DatadiffError::config(format!("Failed to read config '{}': {}", path.display(), e))
        })?;
        let settings: DiffSettings = serde_json::from_str(&content)?;
        settings.engine.validate()?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Output table name unique to this process and call
pub fn default_output_table() -> String {
    format!("diff_{}", uuid::Uuid::new_v4().simple())
}
