//! SQL engine abstraction and the DuckDB binding
//!
//! The diff core only ever issues SQL text and reads small tabular results
//! back (counts, bucket histograms, summaries), so the seam stays
//! narrow: run a statement, run a query, flush a table.

use crate::cancel::CancellationToken;
use crate::duckdb_config::EngineSettings;
use crate::error::{DatadiffError, Result};
use duckdb::types::ValueRef;
use duckdb::{Connection, Statement};
use num_traits::ToPrimitive;
use std::sync::Mutex;

/// A single cell read back from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    HugeInt(i128),
    Double(f64),
    Text(String),
    Other(String),
}

impl Value {
    /// Widen any integer-like cell to `u64`.
    ///
    /// Negative, out-of-range, fractional-overflowing and non-finite values yield `None`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Int(i) => i.to_u64(),
            Value::UInt(u) => Some(*u),
            Value::HugeInt(i) => i.to_u64(),
            Value::Double(f) if f.is_finite() => f.to_u64(),
            Value::Text(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl<'a> From<ValueRef<'a>> for Value {
    fn from(value: ValueRef<'a>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Boolean(b) => Value::Bool(b),
            ValueRef::TinyInt(i) => Value::Int(i64::from(i)),
            ValueRef::SmallInt(i) => Value::Int(i64::from(i)),
            ValueRef::Int(i) => Value::Int(i64::from(i)),
            ValueRef::BigInt(i) => Value::Int(i),
            ValueRef::HugeInt(i) => Value::HugeInt(i),
            ValueRef::UTinyInt(i) => Value::Int(i64::from(i)),
            ValueRef::USmallInt(i) => Value::Int(i64::from(i)),
            ValueRef::UInt(i) => Value::Int(i64::from(i)),
            ValueRef::UBigInt(i) => Value::UInt(i),
            ValueRef::Float(f) => Value::Double(f64::from(f)),
            ValueRef::Double(f) => Value::Double(f),
            ValueRef::Decimal(d) => Value::Text(d.to_string()),
            ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).to_string()),
            ValueRef::Blob(b) => Value::Other(format!("<blob:{} bytes>", b.len())),
            ValueRef::Date32(d) => Value::Other(format!("{:?}", d)),
            ValueRef::Time64(t, _) => Value::Other(format!("{:?}", t)),
            ValueRef::Timestamp(ts, _) => Value::Other(format!("{:?}", ts)),
            _ => Value::Other("<unknown>".to_string()),
        }
    }
}

/// Materialized result of a query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` in the column called `name`
    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// First cell of the first row, coerced to `u64`
    pub fn scalar_u64(&self) -> Result<u64> {
        let cell = self
            .rows
            .first()
            .and_then(|r| r.first())
            .ok_or_else(|| DatadiffError::data_processing("Expected a scalar result, got no rows"))?;
        match cell {
            Value::Null => Ok(0),
            other => other.as_u64().ok_or_else(|| {
                DatadiffError::data_processing(format!("Expected a non-negative count, got {:?}", other))
            }),
        }
    }
}

/// Anything the diff core can issue SQL text against
pub trait SqlEngine: Send + Sync {
    /// Run a statement, returning the number of affected rows
    fn execute(&self, sql: &str) -> Result<usize>;

    /// Run a query and materialize its (small) result
    fn query(&self, sql: &str) -> Result<QueryResult>;

    /// Like [`SqlEngine::query`], but refuses to start once `cancel` has fired
    fn query_cancellable(&self, sql: &str, cancel: &CancellationToken) -> Result<QueryResult> {
        cancel.check()?;
        self.query(sql)
    }

    /// Flush `table` to durable storage where the engine has any
    fn checkpoint(&self, table: &str) -> Result<()>;
}

impl<T: SqlEngine + ?Sized> SqlEngine for &T {
    fn execute(&self, sql: &str) -> Result<usize> {
        (**self).execute(sql)
    }

    fn query(&self, sql: &str) -> Result<QueryResult> {
        (**self).query(sql)
    }

    fn query_cancellable(&self, sql: &str, cancel: &CancellationToken) -> Result<QueryResult> {
        (**self).query_cancellable(sql, cancel)
    }

    fn checkpoint(&self, table: &str) -> Result<()> {
        (**self).checkpoint(table)
    }
}

/// Run a `SELECT COUNT(*) ...` style query and return the count
pub fn count_rows<E: SqlEngine + ?Sized>(engine: &E, sql: &str) -> Result<u64> {
    engine.query(sql)?.scalar_u64()
}

/// DuckDB-backed engine.
///
/// Every call runs on its own cloned connection to the same database, which
/// lets two queries proceed concurrently from different threads.
pub struct DuckDbEngine {
    root: Mutex<Connection>,
    persistent: bool,
}

impl DuckDbEngine {
    pub fn open(settings: &EngineSettings) -> Result<Self> {
        let connection = settings.open()?;
        Ok(Self {
            root: Mutex::new(connection),
            persistent: settings.is_persistent(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&EngineSettings::in_memory())
    }

    fn connection(&self) -> Result<Connection> {
        let root = self
            .root
            .lock()
            .map_err(|_| DatadiffError::data_processing("DuckDB connection lock poisoned"))?;
        Ok(root.try_clone()?)
    }
}

impl SqlEngine for DuckDbEngine {
    fn execute(&self, sql: &str) -> Result<usize> {
        let connection = self.connection()?;
        Ok(connection.execute(sql, [])?)
    }

    fn query(&self, sql: &str) -> Result<QueryResult> {
        let connection = self.connection()?;
        let mut stmt = connection.prepare(sql)?;

        let mut rows_out = Vec::new();
        {
            let mut rows = stmt.query([])?;
            while let Some(row) = rows.next()? {
                let statement: &Statement = row.as_ref();
                let width = statement.column_count();
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(Value::from(row.get_ref(i)?));
                }
                rows_out.push(values);
            }
        }

        Ok(QueryResult {
            columns: stmt.column_names(),
            rows: rows_out,
        })
    }

    fn checkpoint(&self, table: &str) -> Result<()> {
        if !self.persistent {
            log::debug!("In-memory database, skipping checkpoint for {}", table);
            return Ok(());
        }
        let connection = self.connection()?;
        connection.execute_batch("CHECKPOINT")?;
        log::debug!("Checkpointed database after writing {}", table);
        Ok(())
    }
}
