//! Comparison configuration: what to compare, on which keys, under which filters

use crate::error::{DatadiffError, Result};
use serde::{Deserialize, Serialize};

/// One side of a comparison
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DataSource {
    /// Table or view reference, optionally qualified (`schema.table`)
    Table(String),
    /// Arbitrary sub-query
    Query(String),
}

impl DataSource {
    pub fn table(name: impl Into<String>) -> Self {
        Self::Table(name.into())
    }

    pub fn query(sql: impl Into<String>) -> Self {
        Self::Query(sql.into())
    }

    pub fn is_blank(&self) -> bool {
        match self {
            DataSource::Table(name) => name.trim().is_empty(),
            DataSource::Query(sql) => sql.trim().is_empty(),
        }
    }

    /// Short human-readable label for logs and reports
    pub fn label(&self) -> String {
        match self {
            DataSource::Table(name) => name.clone(),
            DataSource::Query(sql) => {
                let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
                if flat.chars().count() > 48 {
                    format!("({}...)", flat.chars().take(45).collect::<String>())
                } else {
                    format!("({})", flat)
                }
            }
        }
    }
}

/// Join column, possibly named differently on side B
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinColumn {
    pub name: String,
    #[serde(default)]
    pub b_name: Option<String>,
}

impl JoinColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            b_name: None,
        }
    }

    pub fn mapped(name: impl Into<String>, b_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            b_name: Some(b_name.into()),
        }
    }

    pub fn a_name(&self) -> &str {
        &self.name
    }

    pub fn b_name(&self) -> &str {
        self.b_name.as_deref().unwrap_or(&self.name)
    }
}

/// Value column to compare, possibly renamed on side B or excluded
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompareColumn {
    pub name: String,
    #[serde(default)]
    pub b_name: Option<String>,
    #[serde(default)]
    pub excluded: bool,
}

impl CompareColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            b_name: None,
            excluded: false,
        }
    }

    pub fn mapped(name: impl Into<String>, b_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            b_name: Some(b_name.into()),
            excluded: false,
        }
    }

    pub fn excluded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            b_name: None,
            excluded: true,
        }
    }

    pub fn a_name(&self) -> &str {
        &self.name
    }

    pub fn b_name(&self) -> &str {
        self.b_name.as_deref().unwrap_or(&self.name)
    }
}

/// Row filters as raw SQL boolean expressions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Filters {
    /// Applied to both sides
    pub common: Option<String>,
    pub a: Option<String>,
    pub b: Option<String>,
}

impl Filters {
    /// Filter expressions that apply to side A
    pub fn for_a(&self) -> Vec<&str> {
        Self::collect(&self.common, &self.a)
    }

    /// Filter expressions that apply to side B
    pub fn for_b(&self) -> Vec<&str> {
        Self::collect(&self.common, &self.b)
    }

    fn collect<'a>(common: &'a Option<String>, side: &'a Option<String>) -> Vec<&'a str> {
        [common, side]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .collect()
    }
}

/// Full description of a comparison run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComparisonConfig {
    pub source_a: Option<DataSource>,
    pub source_b: Option<DataSource>,
    pub join_columns: Vec<JoinColumn>,
    /// Explicit value columns; empty means "every common non-key column"
    pub compare_columns: Vec<CompareColumn>,
    pub filters: Filters,
    pub show_only_differences: bool,
}

impl ComparisonConfig {
    pub fn new(source_a: DataSource, source_b: DataSource, join_columns: Vec<JoinColumn>) -> Self {
        Self {
            source_a: Some(source_a),
            source_b: Some(source_b),
            join_columns,
            ..Self::default()
        }
    }

    /// Both sources, failing fast when either is missing or blank
    pub fn sources(&self) -> Result<(&DataSource, &DataSource)> {
        match (&self.source_a, &self.source_b) {
            (Some(a), Some(b)) if !a.is_blank() && !b.is_blank() => Ok((a, b)),
            _ => Err(DatadiffError::invalid_input("Both sources are required")),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sources()?;
        if self.join_columns.is_empty() {
            return Err(DatadiffError::invalid_input("At least one join column is required"));
        }
        if let Some(blank) = self.join_columns.iter().find(|j| j.name.trim().is_empty()) {
            return Err(DatadiffError::invalid_input(format!(
                "Join column names must not be empty: {:?}",
                blank
            )));
        }
        Ok(())
    }

    /// Value columns that take part in the comparison.
    ///
    /// Join columns never do. With no explicit list, the common columns of
    /// `schema` are used; excluded entries are always dropped.
    pub fn resolve_compare_columns(&self, schema: Option<&SchemaComparison>) -> Vec<CompareColumn> {
        let is_join_column = |column: &CompareColumn| {
            self.join_columns
                .iter()
                .any(|j| j.a_name() == column.a_name() || j.b_name() == column.b_name())
        };
        let is_excluded = |name: &str| {
            self.compare_columns
                .iter()
                .any(|c| c.excluded && c.a_name() == name)
        };

        let explicit: Vec<CompareColumn> = self
            .compare_columns
            .iter()
            .filter(|c| !c.excluded)
            .cloned()
            .collect();

        let candidates = if explicit.is_empty() {
            schema
                .map(|s| {
                    s.common_columns
                        .iter()
                        .map(|c| CompareColumn::new(c.name.clone()))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            explicit
        };

        candidates
            .into_iter()
            .filter(|c| !is_join_column(c) && !is_excluded(c.a_name()))
            .collect()
    }
}

/// Column present on both sides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommonColumn {
    pub name: String,
    pub type_a: String,
    pub type_b: String,
    pub types_match: bool,
}

/// Result of comparing the two sources' schemas
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaComparison {
    pub common_columns: Vec<CommonColumn>,
    pub only_in_a: Vec<String>,
    pub only_in_b: Vec<String>,
    pub row_count_a: Option<u64>,
    pub row_count_b: Option<u64>,
}
