//! DuckDB connection settings and bootstrap

use crate::error::{DatadiffError, Result};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settings applied to every DuckDB connection opened by datadiff
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Database file; `None` keeps everything in memory
    pub database: Option<PathBuf>,
    /// Value for DuckDB's `memory_limit`, e.g. "2GB"
    pub memory_limit: Option<String>,
    /// Worker threads DuckDB may use; `None` lets DuckDB decide
    pub threads: Option<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            database: None,
            memory_limit: Some("2GB".to_string()),
            threads: None,
        }
    }
}

impl EngineSettings {
    /// In-memory database with DuckDB's own defaults
    pub fn in_memory() -> Self {
        Self {
            database: None,
            memory_limit: None,
            threads: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.database.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = &self.memory_limit {
            let trimmed = limit.trim();
            let valid = !trimmed.is_empty()
                && trimmed
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == ' ');
            if !valid {
                return Err(DatadiffError::config(format!(
                    "Invalid memory_limit '{}': expected a size such as '2GB'",
                    limit
                )));
            }
        }
        if self.threads == Some(0) {
            return Err(DatadiffError::config("threads must be greater than 0"));
        }
        Ok(())
    }

    /// Open a connection and apply the settings to it
    pub fn open(&self) -> Result<Connection> {
        self.validate()?;

        let connection = match &self.database {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        self.apply(&connection)?;

        match &self.database {
            Some(path) => log::info!("Opened DuckDB database at: {}", path.display()),
            None => log::debug!("Opened in-memory DuckDB database"),
        }

        Ok(connection)
    }

    fn apply(&self, connection: &Connection) -> Result<()> {
        if let Some(limit) = &self.memory_limit {
            connection.execute_batch(&format!("SET memory_limit='{}'", limit.trim()))?;
        }
        if let Some(threads) = self.threads {
            connection.execute_batch(&format!("SET threads={}", threads))?;
        }
        connection.execute_batch("SET enable_progress_bar=false")?;
        // Diff output is keyed, so insertion order carries no meaning
        connection.execute_batch("SET preserve_insertion_order=false")?;
        Ok(())
    }
}
