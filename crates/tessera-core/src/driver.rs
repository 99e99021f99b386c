use crate::ty::SqlType;
use crate::{Result, Value};

use std::time::Duration;

/// Produces connections to the backing database.
pub trait DataSource: Send + Sync {
    fn connection(&self) -> Result<Box<dyn Connection>>;
}

/// Creates transactions over a data source.
pub trait TransactionFactory: Send + Sync {
    fn new_transaction(
        &self,
        data_source: &dyn DataSource,
        auto_commit: bool,
    ) -> Result<Box<dyn Transaction>>;
}

/// A unit of work wrapping one connection.
///
/// The engine obtains the connection lazily, drives commit/rollback at the
/// session boundary, and closes the transaction when the session closes.
pub trait Transaction: Send {
    fn connection(&mut self) -> Result<&mut dyn Connection>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;

    /// Remaining transaction budget, when the transaction manager enforces
    /// one. Statement timeouts never exceed it.
    fn timeout(&self) -> Result<Option<Duration>> {
        Ok(None)
    }
}

/// A live database connection.
pub trait Connection: Send {
    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> Result<Box<dyn Statement>>;
}

/// How a statement should be prepared.
#[derive(Debug, Clone, Default)]
pub struct StatementOptions {
    pub callable: bool,
    pub return_generated_keys: bool,
    pub result_set_type: Option<ResultSetType>,
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
}

/// Cursor capability requested for a statement's result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSetType {
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// A prepared (or callable) statement owned by the engine until execution
/// finishes or the cursor holding it is closed.
pub trait Statement: Send {
    /// Binds the 1-based parameter slot.
    fn bind(&mut self, index: usize, value: Value, sql_type: Option<SqlType>) -> Result<()>;

    /// Registers a 1-based OUT parameter slot (callable statements).
    fn register_out(&mut self, index: usize, sql_type: SqlType) -> Result<()>;

    fn execute(&mut self) -> Result<()>;

    /// Queues the currently-bound parameters as one batch entry.
    fn add_batch(&mut self) -> Result<()>;

    /// Executes queued batch entries, returning per-entry update counts.
    fn execute_batch(&mut self) -> Result<Vec<u64>>;

    /// Rows affected by the last execution, when it was an update.
    fn update_count(&self) -> Option<u64>;

    /// The next unconsumed result set of the last execution, in driver
    /// order. Returns `None` once all result sets are consumed.
    fn result_set(&mut self) -> Result<Option<Box<dyn ResultSet>>>;

    /// Keys generated by the last execution, when the statement was prepared
    /// with `return_generated_keys`.
    fn generated_keys(&mut self) -> Result<Option<Box<dyn ResultSet>>>;

    /// Reads a registered OUT parameter after execution.
    fn out_value(&mut self, index: usize) -> Result<Value>;
}

/// One tabular result, consumed row by row.
pub trait ResultSet: Send {
    fn columns(&self) -> &[Column];

    /// Advances to the next row; `false` once exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Reads the 0-based column of the current row as a raw driver value.
    fn get(&self, index: usize) -> Result<Value>;

    /// Positions so the following `next` lands on the given 0-based row.
    /// Only scrollable result sets support this; forward-only sets return
    /// an error.
    fn seek(&mut self, _row: usize) -> Result<()> {
        Err(crate::Error::executor(
            "result set is forward-only and cannot seek",
        ))
    }

    fn result_set_type(&self) -> ResultSetType {
        ResultSetType::ForwardOnly
    }
}

/// Metadata for one projected column.
#[derive(Debug, Clone)]
pub struct Column {
    pub label: String,
    pub sql_type: SqlType,
}

impl Column {
    pub fn new(label: impl Into<String>, sql_type: SqlType) -> Column {
        Column {
            label: label.into(),
            sql_type,
        }
    }
}

/// Finds a column's 0-based index by label, case-insensitively.
pub fn column_index(columns: &[Column], label: &str) -> Option<usize> {
    columns
        .iter()
        .position(|column| column.label.eq_ignore_ascii_case(label))
}
