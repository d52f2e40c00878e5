//! Turning command-line inputs into comparison sources, and schema introspection

use crate::comparison::{CommonColumn, DataSource, SchemaComparison};
use crate::engine::SqlEngine;
use crate::error::{DatadiffError, Result};
use crate::sql::{quote_ident, quote_literal, source_relation};
use std::fs;
use std::path::Path;

/// File extensions DuckDB can read directly
pub const FILE_EXTENSIONS: &[&str] = &["csv", "tsv", "parquet", "json", "jsonl", "ndjson"];

/// Column name and engine type of a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescription {
    pub name: String,
    pub data_type: String,
}

/// Turn one command-line input into a source.
///
/// Data files are exposed as a view named `view_name`, `.sql` files become
/// query sources, inline `SELECT`/`WITH` text is used as a query, and
/// anything else is taken as a table reference.
pub fn resolve_source<E: SqlEngine + ?Sized>(
    engine: &E,
    input: &str,
    view_name: &str,
) -> Result<DataSource> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DatadiffError::invalid_input("Source must not be empty"));
    }

    let path = Path::new(input);
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if extension == "sql" {
        let sql = fs::read_to_string(path).map_err(|e| {
            DatadiffError::invalid_input(format!("Failed to read query file '{}': {}", input, e))
        })?;
        let sql = sql.trim().trim_end_matches(';').trim();
        if sql.is_empty() {
            return Err(DatadiffError::invalid_input(format!(
                "Query file is empty: {}",
                input
            )));
        }
        log::debug!("Using query from {}", input);
        return Ok(DataSource::query(sql));
    }

    if FILE_EXTENSIONS.contains(&extension.as_str()) {
        load_file_view(engine, path, view_name)?;
        return Ok(DataSource::table(view_name));
    }

    let lowered = input.to_lowercase();
    if lowered.starts_with("select ") || lowered.starts_with("with ") {
        return Ok(DataSource::query(input));
    }
    Ok(DataSource::table(input))
}

/// Expose a data file as a view
pub fn load_file_view<E: SqlEngine + ?Sized>(
    engine: &E,
    file_path: &Path,
    view_name: &str,
) -> Result<()> {
    if !file_path.exists() {
        return Err(DatadiffError::invalid_input(format!(
            "File not found: {}",
            file_path.display()
        )));
    }
    if !file_path.is_file() {
        return Err(DatadiffError::invalid_input(format!(
            "Path is not a file: {}",
            file_path.display()
        )));
    }

    let sql = format!(
        "CREATE OR REPLACE VIEW {} AS SELECT * FROM {}",
        quote_ident(view_name),
        quote_literal(&file_path.to_string_lossy())
    );
    engine.execute(&sql).map_err(|e| convert_load_error(e, file_path))?;
    log::info!("Loaded {} as view {}", file_path.display(), view_name);
    Ok(())
}

/// Map engine errors raised while reading a file to readable input errors
fn convert_load_error(error: DatadiffError, file_path: &Path) -> DatadiffError {
    let DatadiffError::DuckDb(inner) = &error else {
        return error;
    };
    let message = inner.to_string();

    if message.contains("CSV Error")
        || message.contains("Could not convert")
        || message.contains("Unterminated quoted field")
    {
        DatadiffError::invalid_input(format!(
            "Malformed CSV file '{}': {}",
            file_path.display(),
            message
        ))
    } else if message.contains("JSON") {
        DatadiffError::invalid_input(format!(
            "Malformed JSON file '{}': {}",
            file_path.display(),
            message
        ))
    } else if message.contains("No files found") || message.contains("does not exist") {
        DatadiffError::invalid_input(format!("File not found: {}", file_path.display()))
    } else if message.contains("Permission denied") {
        DatadiffError::invalid_input(format!(
            "Permission denied accessing file: {}",
            file_path.display()
        ))
    } else {
        error
    }
}

/// Columns of a source, in order
pub fn describe_source<E: SqlEngine + ?Sized>(
    engine: &E,
    source: &DataSource,
) -> Result<Vec<ColumnDescription>> {
    let sql = format!("DESCRIBE SELECT * FROM {} AS src", source_relation(source));
    let result = engine.query(&sql)?;

    let name_index = result.column_index("column_name").ok_or_else(|| {
        DatadiffError::data_processing("DESCRIBE result has no 'column_name' column")
    })?;
    let type_index = result.column_index("column_type").ok_or_else(|| {
        DatadiffError::data_processing("DESCRIBE result has no 'column_type' column")
    })?;

    result
        .rows
        .iter()
        .map(|row| {
            let name = row.get(name_index).and_then(|v| v.as_str()).ok_or_else(|| {
                DatadiffError::data_processing("DESCRIBE returned a column without a name")
            })?;
            let data_type = row
                .get(type_index)
                .and_then(|v| v.as_str())
                .unwrap_or("UNKNOWN");
            Ok(ColumnDescription {
                name: name.to_string(),
                data_type: data_type.to_string(),
            })
        })
        .collect()
}

/// Compare the schemas of both sources, describing them concurrently
pub fn compare_schemas<E: SqlEngine + ?Sized>(
    engine: &E,
    source_a: &DataSource,
    source_b: &DataSource,
) -> Result<SchemaComparison> {
    let (columns_a, columns_b) = rayon::join(
        || describe_source(engine, source_a),
        || describe_source(engine, source_b),
    );
    Ok(schema_comparison(&columns_a?, &columns_b?))
}

/// Common columns in side A's order, then the columns unique to each side
pub fn schema_comparison(
    columns_a: &[ColumnDescription],
    columns_b: &[ColumnDescription],
) -> SchemaComparison {
    let mut comparison = SchemaComparison::default();

    for column in columns_a {
        match columns_b.iter().find(|b| b.name == column.name) {
            Some(other) => comparison.common_columns.push(CommonColumn {
                name: column.name.clone(),
                type_a: column.data_type.clone(),
                type_b: other.data_type.clone(),
                types_match: column.data_type.eq_ignore_ascii_case(&other.data_type),
            }),
            None => comparison.only_in_a.push(column.name.clone()),
        }
    }
    comparison.only_in_b = columns_b
        .iter()
        .filter(|b| !columns_a.iter().any(|a| a.name == b.name))
        .map(|b| b.name.clone())
        .collect();

    comparison
}
