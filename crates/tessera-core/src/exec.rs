mod keygen;
pub use keygen::{DriverKeyGenerator, NoKeyGenerator, SelectKeyGenerator};

use crate::cache::CacheKey;
use crate::driver::{Connection, Statement};
use crate::mapping::{BoundSql, MappedStatement};
use crate::meta::{MetaValue, MetaValueMut};
use crate::ty::ValueKind;
use crate::{Error, Result, Value};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Which executor variant a session runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutorType {
    #[default]
    Simple,
    /// Reuses prepared statements keyed by SQL text.
    Reuse,
    /// Defers writes into driver batches, flushed on select or explicitly.
    Batch,
}

impl ExecutorType {
    pub fn parse(name: &str) -> Result<ExecutorType> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "SIMPLE" => ExecutorType::Simple,
            "REUSE" => ExecutorType::Reuse,
            "BATCH" => ExecutorType::Batch,
            other => return Err(Error::parse(format!("unknown executor type `{other}`"))),
        })
    }
}

/// Offset/limit applied while consuming a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const DEFAULT: RowBounds = RowBounds {
        offset: 0,
        limit: usize::MAX,
    };

    pub fn new(offset: usize, limit: usize) -> RowBounds {
        RowBounds { offset, limit }
    }

    pub fn is_default(&self) -> bool {
        *self == RowBounds::DEFAULT
    }
}

impl Default for RowBounds {
    fn default() -> RowBounds {
        RowBounds::DEFAULT
    }
}

/// A shared handle to one result object under construction.
///
/// The projector hands these to the executor so deferred loads can patch
/// properties after the owning query completes; clones alias the same row.
#[derive(Clone)]
pub struct RowHandle {
    inner: Arc<Mutex<Value>>,
}

impl RowHandle {
    pub fn new(value: Value) -> RowHandle {
        RowHandle {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    pub fn value(&self) -> Value {
        self.inner.lock().clone()
    }

    pub fn replace(&self, value: Value) {
        *self.inner.lock() = value;
    }

    pub fn get_property(&self, path: &str) -> Result<Value> {
        MetaValue::new(&self.inner.lock()).get(path)
    }

    pub fn set_property(&self, path: &str, value: Value) -> Result<()> {
        MetaValueMut::new(&mut self.inner.lock()).set(path, value)
    }
}

impl core::fmt::Debug for RowHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "RowHandle({})", self.inner.lock())
    }
}

/// Per-row callback state handed to a caller-supplied result handler.
#[derive(Debug, Default)]
pub struct ResultContext {
    current: Option<Value>,
    count: usize,
    stopped: bool,
}

impl ResultContext {
    pub fn next(&mut self, value: Value) {
        self.current = Some(value);
        self.count += 1;
    }

    pub fn result_object(&self) -> Option<&Value> {
        self.current.as_ref()
    }

    pub fn result_count(&self) -> usize {
        self.count
    }

    /// Stops row consumption after the current row.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Receives projected rows instead of collecting them into a list.
pub trait ResultHandler {
    fn handle_result(&mut self, context: &mut ResultContext);
}

/// A lazily-consumed query result. The cursor holds its statement and
/// result set until closed.
pub trait RowCursor {
    fn next_row(&mut self) -> Option<Result<Value>>;
    fn close(&mut self) -> Result<()>;
    fn is_closed(&self) -> bool;
}

/// Outcome of one flushed batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub statement_id: String,
    pub sql: String,
    pub parameters: Vec<Value>,
    pub update_counts: Vec<u64>,
}

/// The session-local execution engine: first-level cache, deferred-load
/// queue, query-stack recursion, dispatch to statement handlers.
///
/// Once closed, every operation fails with an executor-misuse error. A SQL
/// failure aborts the current call only; the session is not rolled back
/// automatically.
pub trait Executor {
    /// Runs a write statement. Key generators and OUT parameters write back
    /// through the parameter.
    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<u64>;

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>>;

    fn query_cursor(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
    ) -> Result<Box<dyn RowCursor>>;

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>>;

    fn commit(&mut self, required: bool) -> Result<()>;

    fn rollback(&mut self, required: bool) -> Result<()>;

    fn create_cache_key(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        row_bounds: &RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey>;

    /// Whether the local cache holds an entry for the key — a completed
    /// result or the in-progress sentinel. Nested queries use this to decide
    /// between deferring and executing.
    fn is_cached(&self, key: &CacheKey) -> bool;

    /// Schedules `property` of `target` to be filled from the cached result
    /// at `key`: immediately when the result is complete, after the current
    /// top-level query when the key still holds the in-progress sentinel.
    fn defer_load(
        &mut self,
        ms: &Arc<MappedStatement>,
        target: RowHandle,
        property: String,
        key: CacheKey,
        kind: ValueKind,
    ) -> Result<()>;

    fn clear_local_cache(&mut self);

    fn close(&mut self, force_rollback: bool) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Binds the evaluated parameter mappings into a prepared statement.
pub trait ParameterHandler {
    fn parameter(&self) -> &Value;
    fn set_parameters(&mut self, stmt: &mut dyn Statement) -> Result<()>;
}

/// Projects driver result sets into objects.
pub trait ResultSetHandler {
    fn handle_result_sets(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<RowHandle>>;

    fn handle_output_parameters(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
    ) -> Result<()>;

    /// The parameter object after projection, carrying any OUT-parameter
    /// write-backs.
    fn parameter(&self) -> &Value;
}

/// Drives one statement through the driver: prepare, bind, execute,
/// project.
pub trait StatementHandler {
    fn prepare(
        &mut self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<Duration>,
    ) -> Result<Box<dyn Statement>>;

    fn parameterize(&mut self, stmt: &mut dyn Statement) -> Result<()>;

    fn batch(&mut self, stmt: &mut dyn Statement) -> Result<()>;

    fn update(&mut self, executor: &mut dyn Executor, stmt: &mut dyn Statement) -> Result<u64>;

    fn query(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<RowHandle>>;

    fn query_cursor(&mut self, stmt: Box<dyn Statement>) -> Result<Box<dyn RowCursor>>;

    fn bound_sql(&self) -> &BoundSql;

    /// The parameter object after execution, carrying key-generator and
    /// OUT-parameter write-backs.
    fn parameter(&self) -> &Value;
}

/// Pre/post hooks for generated keys.
pub trait KeyGenerator: Send + Sync {
    /// Whether the statement must be prepared in generated-keys mode.
    fn wants_generated_keys(&self) -> bool {
        false
    }

    /// Runs before the main statement (select-key `order="BEFORE"`).
    fn process_before(
        &self,
        executor: &mut dyn Executor,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<()>;

    /// Runs after the main statement, with access to it for driver-generated
    /// keys.
    fn process_after(
        &self,
        executor: &mut dyn Executor,
        ms: &Arc<MappedStatement>,
        stmt: Option<&mut dyn Statement>,
        parameter: &mut Value,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_handle_patches_are_shared() {
        let handle = RowHandle::new(Value::object());
        let alias = handle.clone();

        handle.set_property("author.name", Value::String("ann".into())).unwrap();
        assert_eq!(
            alias.get_property("author.name").unwrap(),
            Value::String("ann".into())
        );
    }

    #[test]
    fn default_row_bounds() {
        assert!(RowBounds::default().is_default());
        assert!(!RowBounds::new(10, 20).is_default());
    }

    #[test]
    fn result_context_counts_rows() {
        let mut ctx = ResultContext::default();
        ctx.next(Value::Long(1));
        ctx.next(Value::Long(2));
        assert_eq!(ctx.result_count(), 2);
        assert_eq!(ctx.result_object(), Some(&Value::Long(2)));
        assert!(!ctx.is_stopped());
        ctx.stop();
        assert!(ctx.is_stopped());
    }
}
