//! SQL generation for hash-bucketed comparisons
//!
//! Everything here is pure string building: identical inputs always produce
//! byte-identical SQL.

use crate::comparison::{CompareColumn, ComparisonConfig, DataSource, Filters, JoinColumn};
use crate::config::{DEFAULT_MAX_HASH_RANGE, DEFAULT_MAX_MODULUS};
use crate::error::{DatadiffError, Result};
use crate::segment::HashSegment;

/// Row/column status labels written to the output table
pub const STATUS_ADDED: &str = "added";
pub const STATUS_REMOVED: &str = "removed";
pub const STATUS_MODIFIED: &str = "modified";
pub const STATUS_SAME: &str = "same";

/// Name of the overall row-status column
pub const ROW_STATUS_COLUMN: &str = "_row_status";

/// Prefix of the coalesced join-key columns
pub const KEY_COLUMN_PREFIX: &str = "_key_";

/// Marker column telling whether a joined row exists on a side
const PRESENT_MARKER: &str = "__datadiff_present";

/// Quote an identifier for DuckDB
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for DuckDB
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Relation text for a source usable after `FROM`
pub fn source_relation(source: &DataSource) -> String {
    match source {
        DataSource::Table(name) => {
            if name.contains('"') {
                // Caller already quoted it
                name.trim().to_string()
            } else {
                name.split('.')
                    .map(|part| quote_ident(part.trim()))
                    .collect::<Vec<_>>()
                    .join(".")
            }
        }
        DataSource::Query(sql) => format!("({})", sql.trim().trim_end_matches(';')),
    }
}

/// Hash of the join-key struct.
///
/// Struct fields are named positionally so both sides hash identically even
/// when their key columns are named differently.
pub fn key_hash_expr(key_columns: &[&str]) -> String {
    let fields = key_columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("k{} := {}", i, quote_ident(column)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("hash(struct_pack({}))", fields)
}

/// Non-negative bucket number of a row under `modulus`
pub fn bucket_expr(key_columns: &[&str], modulus: u64) -> String {
    format!(
        "(({} % {m}) + {m}) % {m}",
        key_hash_expr(key_columns),
        m = modulus
    )
}

fn validate_bucket(modulus: u64, bucket: u64, max_modulus: u64) -> Result<()> {
    if modulus == 0 || modulus > max_modulus {
        return Err(DatadiffError::invalid_bucket(format!(
            "Invalid bucket modulus {}: must be a positive integer no greater than {}",
            modulus, max_modulus
        )));
    }
    if bucket >= modulus {
        return Err(DatadiffError::invalid_bucket(format!(
            "Invalid bucket number {} for modulus {}: must be in [0, {})",
            bucket, modulus, modulus
        )));
    }
    Ok(())
}

/// `WHERE` fragment keeping rows whose key hash falls in `bucket` of `modulus`
pub fn hash_bucket_condition(
    key_columns: &[&str],
    modulus: u64,
    bucket: u64,
    max_modulus: u64,
) -> Result<String> {
    validate_bucket(modulus, bucket, max_modulus)?;
    Ok(format!("{} = {}", bucket_expr(key_columns, modulus), bucket))
}

/// `WHERE` fragment keeping rows whose unsigned key hash lies in `[start, end]`
pub fn hash_range_condition(
    key_columns: &[&str],
    start: u64,
    end: u64,
    max_range: u64,
) -> Result<String> {
    if end <= start {
        return Err(DatadiffError::invalid_hash_range(format!(
            "Invalid hash range [{}, {}]: end must be greater than start",
            start, end
        )));
    }
    if end - start > max_range {
        return Err(DatadiffError::invalid_hash_range(format!(
            "Invalid hash range [{}, {}]: spans {} hashes, limit is {}",
            start,
            end,
            end - start,
            max_range
        )));
    }
    Ok(format!(
        "{} BETWEEN {} AND {}",
        key_hash_expr(key_columns),
        start,
        end
    ))
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Which source a fragment is for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

/// Options for [`DiffQueryBuilder::comparison_select`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectOptions {
    pub segment: Option<HashSegment>,
    pub limit: Option<u64>,
}

/// Builds every statement a comparison run issues
#[derive(Debug, Clone)]
pub struct DiffQueryBuilder {
    source_a: DataSource,
    source_b: DataSource,
    join_columns: Vec<JoinColumn>,
    compare_columns: Vec<CompareColumn>,
    filters: Filters,
    only_differences: bool,
    max_modulus: u64,
    max_hash_range: u64,
}

impl DiffQueryBuilder {
    /// Builder for `config` comparing `compare_columns` (already resolved)
    pub fn new(config: &ComparisonConfig, compare_columns: Vec<CompareColumn>) -> Result<Self> {
        config.validate()?;
        let (source_a, source_b) = config.sources()?;
        Ok(Self {
            source_a: source_a.clone(),
            source_b: source_b.clone(),
            join_columns: config.join_columns.clone(),
            compare_columns,
            filters: config.filters.clone(),
            only_differences: config.show_only_differences,
            max_modulus: DEFAULT_MAX_MODULUS,
            max_hash_range: DEFAULT_MAX_HASH_RANGE,
        })
    }

    pub fn with_limits(mut self, max_modulus: u64, max_hash_range: u64) -> Self {
        self.max_modulus = max_modulus;
        self.max_hash_range = max_hash_range;
        self
    }

    /// Replace one side's source, keeping everything else
    pub fn with_source(mut self, side: Side, source: DataSource) -> Self {
        match side {
            Side::A => self.source_a = source,
            Side::B => self.source_b = source,
        }
        self
    }

    pub fn compare_columns(&self) -> &[CompareColumn] {
        &self.compare_columns
    }

    pub fn join_columns(&self) -> &[JoinColumn] {
        &self.join_columns
    }

    pub fn max_modulus(&self) -> u64 {
        self.max_modulus
    }

    pub fn source(&self, side: Side) -> &DataSource {
        match side {
            Side::A => &self.source_a,
            Side::B => &self.source_b,
        }
    }

    pub fn key_columns(&self, side: Side) -> Vec<&str> {
        self.join_columns
            .iter()
            .map(|j| match side {
                Side::A => j.a_name(),
                Side::B => j.b_name(),
            })
            .collect()
    }

    fn user_filters(&self, side: Side) -> Vec<String> {
        let filters = match side {
            Side::A => self.filters.for_a(),
            Side::B => self.filters.for_b(),
        };
        filters.into_iter().map(|f| format!("({})", f)).collect()
    }

    /// Bucket condition for one side
    pub fn bucket_condition(&self, side: Side, segment: &HashSegment) -> Result<String> {
        hash_bucket_condition(
            &self.key_columns(side),
            segment.modulus,
            segment.bucket,
            self.max_modulus,
        )
    }

    /// Hash-range condition for one side
    pub fn range_condition(&self, side: Side, start: u64, end: u64) -> Result<String> {
        hash_range_condition(&self.key_columns(side), start, end, self.max_hash_range)
    }

    /// One source restricted by the user filters and, optionally, a bucket
    pub fn filtered_source(&self, side: Side, segment: Option<&HashSegment>) -> Result<String> {
        let mut conditions = self.user_filters(side);
        if let Some(segment) = segment {
            conditions.push(self.bucket_condition(side, segment)?);
        }
        Ok(format!(
            "SELECT src.* FROM {} AS src{}",
            source_relation(self.source(side)),
            where_clause(&conditions)
        ))
    }

    /// Total filtered row count of one source
    pub fn count_query(&self, side: Side) -> String {
        format!(
            "SELECT COUNT(*) AS row_count FROM {} AS src{}",
            source_relation(self.source(side)),
            where_clause(&self.user_filters(side))
        )
    }

    /// Filtered row count of one source restricted to a segment
    pub fn segment_count_query(&self, side: Side, segment: &HashSegment) -> Result<String> {
        let mut conditions = self.user_filters(side);
        conditions.push(self.bucket_condition(side, segment)?);
        Ok(format!(
            "SELECT COUNT(*) AS row_count FROM {} AS src{}",
            source_relation(self.source(side)),
            where_clause(&conditions)
        ))
    }

    /// Row count per bucket of `modulus`; empty buckets are absent from the result
    pub fn bucket_counts_query(&self, side: Side, modulus: u64) -> Result<String> {
        validate_bucket(modulus, 0, self.max_modulus)?;
        Ok(format!(
            "SELECT {} AS bucket, COUNT(*) AS row_count FROM {} AS src{} GROUP BY 1",
            bucket_expr(&self.key_columns(side), modulus),
            source_relation(self.source(side)),
            where_clause(&self.user_filters(side))
        ))
    }

    fn side_cte(&self, side: Side, segment: Option<&HashSegment>) -> Result<String> {
        let mut conditions = self.user_filters(side);
        if let Some(segment) = segment {
            conditions.push(self.bucket_condition(side, segment)?);
        }
        Ok(format!(
            "SELECT src.*, TRUE AS {} FROM {} AS src{}",
            quote_ident(PRESENT_MARKER),
            source_relation(self.source(side)),
            where_clause(&conditions)
        ))
    }

    fn presence_branches(&self) -> String {
        let marker = quote_ident(PRESENT_MARKER);
        format!(
            "WHEN a.{m} IS NULL THEN {added} WHEN b.{m} IS NULL THEN {removed}",
            m = marker,
            added = quote_literal(STATUS_ADDED),
            removed = quote_literal(STATUS_REMOVED)
        )
    }

    fn differs(column: &CompareColumn) -> String {
        format!(
            "a.{} IS DISTINCT FROM b.{}",
            quote_ident(column.a_name()),
            quote_ident(column.b_name())
        )
    }

    /// Full comparison `SELECT`, optionally restricted to one segment
    pub fn comparison_select(&self, options: &SelectOptions) -> Result<String> {
        let segment = options.segment.as_ref();
        let presence = self.presence_branches();

        let mut projections = Vec::new();
        for join in &self.join_columns {
            projections.push(format!(
                "COALESCE(a.{}, b.{}) AS {}",
                quote_ident(join.a_name()),
                quote_ident(join.b_name()),
                quote_ident(&format!("{}{}", KEY_COLUMN_PREFIX, join.a_name()))
            ));
        }
        for column in &self.compare_columns {
            projections.push(format!(
                "a.{} AS {}",
                quote_ident(column.a_name()),
                quote_ident(&format!("{}_a", column.a_name()))
            ));
            projections.push(format!(
                "b.{} AS {}",
                quote_ident(column.b_name()),
                quote_ident(&format!("{}_b", column.a_name()))
            ));
            projections.push(format!(
                "CASE {} WHEN {} THEN {} ELSE {} END AS {}",
                presence,
                Self::differs(column),
                quote_literal(STATUS_MODIFIED),
                quote_literal(STATUS_SAME),
                quote_ident(&format!("{}_status", column.a_name()))
            ));
        }

        let modified_branch = if self.compare_columns.is_empty() {
            String::new()
        } else {
            let any_differs = self
                .compare_columns
                .iter()
                .map(|c| format!("({})", Self::differs(c)))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!(" WHEN {} THEN {}", any_differs, quote_literal(STATUS_MODIFIED))
        };
        projections.push(format!(
            "CASE {}{} ELSE {} END AS {}",
            presence,
            modified_branch,
            quote_literal(STATUS_SAME),
            quote_ident(ROW_STATUS_COLUMN)
        ));

        let join_condition = self
            .join_columns
            .iter()
            .map(|j| format!("a.{} = b.{}", quote_ident(j.a_name()), quote_ident(j.b_name())))
            .collect::<Vec<_>>()
            .join(" AND ");

        let mut sql = format!(
            "WITH __datadiff_a AS ({}), __datadiff_b AS ({}), __datadiff_rows AS (SELECT {} FROM __datadiff_a AS a FULL OUTER JOIN __datadiff_b AS b ON {}) SELECT * FROM __datadiff_rows",
            self.side_cte(Side::A, segment)?,
            self.side_cte(Side::B, segment)?,
            projections.join(", "),
            join_condition
        );
        if self.only_differences {
            sql.push_str(&format!(
                " WHERE {} <> {}",
                quote_ident(ROW_STATUS_COLUMN),
                quote_literal(STATUS_SAME)
            ));
        }
        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        Ok(sql)
    }

    /// Create (or replace) an empty output table with the exact diff schema
    pub fn create_output_table(&self, table: &str) -> Result<String> {
        let select = self.comparison_select(&SelectOptions {
            segment: None,
            limit: Some(0),
        })?;
        Ok(format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM ({}) AS diff_rows",
            quote_ident(table),
            select
        ))
    }

    /// Materialize the whole comparison into `table` in one statement
    pub fn materialize(&self, table: &str) -> Result<String> {
        let select = self.comparison_select(&SelectOptions::default())?;
        Ok(format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM ({}) AS diff_rows",
            quote_ident(table),
            select
        ))
    }

    /// Number of output rows one segment produces
    pub fn segment_diff_count(&self, segment: &HashSegment) -> Result<String> {
        let select = self.comparison_select(&SelectOptions {
            segment: Some(*segment),
            limit: None,
        })?;
        Ok(format!("SELECT COUNT(*) AS row_count FROM ({}) AS diff_rows", select))
    }

    /// Append one segment's output rows to `table`
    pub fn insert_segment(&self, table: &str, segment: &HashSegment) -> Result<String> {
        let select = self.comparison_select(&SelectOptions {
            segment: Some(*segment),
            limit: None,
        })?;
        Ok(format!(
            "INSERT INTO {} SELECT * FROM ({}) AS diff_rows",
            quote_ident(table),
            select
        ))
    }
}
