use crate::driver::{Connection, Statement};
use crate::exec::{
    BatchResult, Executor, ParameterHandler, ResultHandler, ResultSetHandler, RowBounds,
    RowCursor, RowHandle, StatementHandler,
};
use crate::mapping::{BoundSql, MappedStatement};
use crate::ty::ValueKind;
use crate::{cache::CacheKey, Error, Result, Value};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// The four component kinds an interceptor may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Executor,
    ParameterHandler,
    ResultSetHandler,
    StatementHandler,
}

/// One interceptable join point, declared as data by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub target: TargetKind,
    pub method: &'static str,
}

impl Signature {
    pub fn new(target: TargetKind, method: &'static str) -> Signature {
        Signature { target, method }
    }
}

const EXECUTOR_METHODS: &[&str] = &["update", "query", "flush_statements", "commit", "rollback"];
const PARAMETER_HANDLER_METHODS: &[&str] = &["set_parameters"];
const RESULT_SET_HANDLER_METHODS: &[&str] = &["handle_result_sets"];
const STATEMENT_HANDLER_METHODS: &[&str] =
    &["prepare", "parameterize", "batch", "update", "query"];

fn interceptable(target: TargetKind) -> &'static [&'static str] {
    match target {
        TargetKind::Executor => EXECUTOR_METHODS,
        TargetKind::ParameterHandler => PARAMETER_HANDLER_METHODS,
        TargetKind::ResultSetHandler => RESULT_SET_HANDLER_METHODS,
        TargetKind::StatementHandler => STATEMENT_HANDLER_METHODS,
    }
}

/// A user-supplied interceptor. The engine folds `wrap` over the chain at
/// each of the four construction points; the wrapper routes only the
/// methods named in `signatures` through `intercept` and forwards the rest
/// verbatim.
pub trait Interceptor: Send + Sync {
    fn signatures(&self) -> Vec<Signature>;

    /// Handles one intercepted call. Call `invocation.proceed()` to run the
    /// wrapped target, or return a replacement result without doing so.
    fn intercept(
        &self,
        invocation: Invocation<'_, '_, '_, '_, '_, '_, '_, '_>,
    ) -> Result<InvocationResult>;
}

/// Verifies every signature points at an interceptable method.
pub fn validate(interceptor: &dyn Interceptor) -> Result<()> {
    for signature in interceptor.signatures() {
        if !interceptable(signature.target).contains(&signature.method) {
            return Err(Error::plugin(format!(
                "method `{}` of {:?} is not interceptable",
                signature.method, signature.target
            )));
        }
    }
    Ok(())
}

/// One intercepted call, carrying the wrapped target and the join point's
/// arguments.
pub enum Invocation<'a, 'b, 'c, 'd, 'e, 'f, 'g, 'h> {
    ExecutorUpdate {
        executor: &'a mut dyn Executor,
        ms: &'c Arc<MappedStatement>,
        parameter: &'d mut Value,
    },
    ExecutorQuery {
        executor: &'a mut dyn Executor,
        ms: &'c Arc<MappedStatement>,
        parameter: &'d mut Value,
        row_bounds: &'e mut RowBounds,
        result_handler: Option<&'f mut dyn ResultHandler>,
    },
    ExecutorFlush {
        executor: &'a mut dyn Executor,
    },
    ExecutorCommit {
        executor: &'a mut dyn Executor,
        required: bool,
    },
    ExecutorRollback {
        executor: &'a mut dyn Executor,
        required: bool,
    },
    SetParameters {
        handler: &'b mut dyn ParameterHandler,
        stmt: &'g mut dyn Statement,
    },
    HandleResultSets {
        handler: &'b mut dyn ResultSetHandler,
        executor: &'a mut dyn Executor,
        stmt: &'g mut dyn Statement,
        result_handler: Option<&'f mut dyn ResultHandler>,
    },
    StatementPrepare {
        handler: &'b mut dyn StatementHandler,
        connection: &'h mut dyn Connection,
        transaction_timeout: Option<Duration>,
    },
    StatementParameterize {
        handler: &'b mut dyn StatementHandler,
        stmt: &'g mut dyn Statement,
    },
    StatementBatch {
        handler: &'b mut dyn StatementHandler,
        stmt: &'g mut dyn Statement,
    },
    StatementUpdate {
        handler: &'b mut dyn StatementHandler,
        executor: &'a mut dyn Executor,
        stmt: &'g mut dyn Statement,
    },
    StatementQuery {
        handler: &'b mut dyn StatementHandler,
        executor: &'a mut dyn Executor,
        stmt: &'g mut dyn Statement,
        result_handler: Option<&'f mut dyn ResultHandler>,
    },
}

/// What an intercepted call produced.
pub enum InvocationResult {
    Unit,
    Count(u64),
    Rows(Vec<Value>),
    Handles(Vec<RowHandle>),
    Batches(Vec<BatchResult>),
    Statement(Box<dyn Statement>),
}

impl<'a, 'b, 'c, 'd, 'e, 'f, 'g, 'h> Invocation<'a, 'b, 'c, 'd, 'e, 'f, 'g, 'h> {
    pub fn method(&self) -> &'static str {
        match self {
            Invocation::ExecutorUpdate { .. } | Invocation::StatementUpdate { .. } => "update",
            Invocation::ExecutorQuery { .. } | Invocation::StatementQuery { .. } => "query",
            Invocation::ExecutorFlush { .. } => "flush_statements",
            Invocation::ExecutorCommit { .. } => "commit",
            Invocation::ExecutorRollback { .. } => "rollback",
            Invocation::SetParameters { .. } => "set_parameters",
            Invocation::HandleResultSets { .. } => "handle_result_sets",
            Invocation::StatementPrepare { .. } => "prepare",
            Invocation::StatementParameterize { .. } => "parameterize",
            Invocation::StatementBatch { .. } => "batch",
        }
    }

    /// Invokes the wrapped target with the captured arguments.
    pub fn proceed(self) -> Result<InvocationResult> {
        match self {
            Invocation::ExecutorUpdate {
                executor,
                ms,
                parameter,
            } => Ok(InvocationResult::Count(executor.update(ms, parameter)?)),
            Invocation::ExecutorQuery {
                executor,
                ms,
                parameter,
                row_bounds,
                result_handler,
            } => Ok(InvocationResult::Rows(executor.query(
                ms,
                parameter,
                *row_bounds,
                result_handler,
            )?)),
            Invocation::ExecutorFlush { executor } => {
                Ok(InvocationResult::Batches(executor.flush_statements()?))
            }
            Invocation::ExecutorCommit { executor, required } => {
                executor.commit(required)?;
                Ok(InvocationResult::Unit)
            }
            Invocation::ExecutorRollback { executor, required } => {
                executor.rollback(required)?;
                Ok(InvocationResult::Unit)
            }
            Invocation::SetParameters { handler, stmt } => {
                handler.set_parameters(stmt)?;
                Ok(InvocationResult::Unit)
            }
            Invocation::HandleResultSets {
                handler,
                executor,
                stmt,
                result_handler,
            } => Ok(InvocationResult::Handles(handler.handle_result_sets(
                executor,
                stmt,
                result_handler,
            )?)),
            Invocation::StatementPrepare {
                handler,
                connection,
                transaction_timeout,
            } => Ok(InvocationResult::Statement(
                handler.prepare(connection, transaction_timeout)?,
            )),
            Invocation::StatementParameterize { handler, stmt } => {
                handler.parameterize(stmt)?;
                Ok(InvocationResult::Unit)
            }
            Invocation::StatementBatch { handler, stmt } => {
                handler.batch(stmt)?;
                Ok(InvocationResult::Unit)
            }
            Invocation::StatementUpdate {
                handler,
                executor,
                stmt,
            } => Ok(InvocationResult::Count(handler.update(executor, stmt)?)),
            Invocation::StatementQuery {
                handler,
                executor,
                stmt,
                result_handler,
            } => Ok(InvocationResult::Handles(handler.query(
                executor,
                stmt,
                result_handler,
            )?)),
        }
    }
}

fn methods_for(interceptor: &dyn Interceptor, target: TargetKind) -> HashSet<&'static str> {
    interceptor
        .signatures()
        .into_iter()
        .filter(|signature| signature.target == target)
        .map(|signature| signature.method)
        .collect()
}

/// Folds the chain over an executor at its construction point.
pub fn wrap_executor(
    mut executor: Box<dyn Executor>,
    interceptors: &[Arc<dyn Interceptor>],
) -> Box<dyn Executor> {
    for interceptor in interceptors {
        let methods = methods_for(interceptor.as_ref(), TargetKind::Executor);
        if !methods.is_empty() {
            executor = Box::new(ExecutorPlugin {
                inner: executor,
                interceptor: interceptor.clone(),
                methods,
            });
        }
    }
    executor
}

pub fn wrap_parameter_handler(
    mut handler: Box<dyn ParameterHandler>,
    interceptors: &[Arc<dyn Interceptor>],
) -> Box<dyn ParameterHandler> {
    for interceptor in interceptors {
        let methods = methods_for(interceptor.as_ref(), TargetKind::ParameterHandler);
        if !methods.is_empty() {
            handler = Box::new(ParameterHandlerPlugin {
                inner: handler,
                interceptor: interceptor.clone(),
                methods,
            });
        }
    }
    handler
}

pub fn wrap_result_set_handler(
    mut handler: Box<dyn ResultSetHandler>,
    interceptors: &[Arc<dyn Interceptor>],
) -> Box<dyn ResultSetHandler> {
    for interceptor in interceptors {
        let methods = methods_for(interceptor.as_ref(), TargetKind::ResultSetHandler);
        if !methods.is_empty() {
            handler = Box::new(ResultSetHandlerPlugin {
                inner: handler,
                interceptor: interceptor.clone(),
                methods,
            });
        }
    }
    handler
}

pub fn wrap_statement_handler(
    mut handler: Box<dyn StatementHandler>,
    interceptors: &[Arc<dyn Interceptor>],
) -> Box<dyn StatementHandler> {
    for interceptor in interceptors {
        let methods = methods_for(interceptor.as_ref(), TargetKind::StatementHandler);
        if !methods.is_empty() {
            handler = Box::new(StatementHandlerPlugin {
                inner: handler,
                interceptor: interceptor.clone(),
                methods,
            });
        }
    }
    handler
}

fn wrong_shape(method: &str) -> Error {
    Error::plugin(format!(
        "interceptor returned an incompatible result for `{method}`"
    ))
}

struct ExecutorPlugin {
    inner: Box<dyn Executor>,
    interceptor: Arc<dyn Interceptor>,
    methods: HashSet<&'static str>,
}

impl Executor for ExecutorPlugin {
    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<u64> {
        if self.methods.contains("update") {
            match self.interceptor.intercept(Invocation::ExecutorUpdate {
                executor: self.inner.as_mut(),
                ms,
                parameter,
            })? {
                InvocationResult::Count(count) => Ok(count),
                _ => Err(wrong_shape("update")),
            }
        } else {
            self.inner.update(ms, parameter)
        }
    }

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>> {
        if self.methods.contains("query") {
            let mut row_bounds = row_bounds;
            match self.interceptor.intercept(Invocation::ExecutorQuery {
                executor: self.inner.as_mut(),
                ms,
                parameter,
                row_bounds: &mut row_bounds,
                result_handler,
            })? {
                InvocationResult::Rows(rows) => Ok(rows),
                _ => Err(wrong_shape("query")),
            }
        } else {
            self.inner.query(ms, parameter, row_bounds, result_handler)
        }
    }

    fn query_cursor(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
    ) -> Result<Box<dyn RowCursor>> {
        self.inner.query_cursor(ms, parameter, row_bounds)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        if self.methods.contains("flush_statements") {
            match self
                .interceptor
                .intercept(Invocation::ExecutorFlush {
                    executor: self.inner.as_mut(),
                })? {
                InvocationResult::Batches(batches) => Ok(batches),
                _ => Err(wrong_shape("flush_statements")),
            }
        } else {
            self.inner.flush_statements()
        }
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        if self.methods.contains("commit") {
            self.interceptor.intercept(Invocation::ExecutorCommit {
                executor: self.inner.as_mut(),
                required,
            })?;
            Ok(())
        } else {
            self.inner.commit(required)
        }
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if self.methods.contains("rollback") {
            self.interceptor.intercept(Invocation::ExecutorRollback {
                executor: self.inner.as_mut(),
                required,
            })?;
            Ok(())
        } else {
            self.inner.rollback(required)
        }
    }

    fn create_cache_key(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        row_bounds: &RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.inner.create_cache_key(ms, parameter, row_bounds, bound_sql)
    }

    fn is_cached(&self, key: &CacheKey) -> bool {
        self.inner.is_cached(key)
    }

    fn defer_load(
        &mut self,
        ms: &Arc<MappedStatement>,
        target: RowHandle,
        property: String,
        key: CacheKey,
        kind: ValueKind,
    ) -> Result<()> {
        self.inner.defer_load(ms, target, property, key, kind)
    }

    fn clear_local_cache(&mut self) {
        self.inner.clear_local_cache()
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        self.inner.close(force_rollback)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

struct ParameterHandlerPlugin {
    inner: Box<dyn ParameterHandler>,
    interceptor: Arc<dyn Interceptor>,
    methods: HashSet<&'static str>,
}

impl ParameterHandler for ParameterHandlerPlugin {
    fn parameter(&self) -> &Value {
        self.inner.parameter()
    }

    fn set_parameters(&mut self, stmt: &mut dyn Statement) -> Result<()> {
        if self.methods.contains("set_parameters") {
            self.interceptor.intercept(Invocation::SetParameters {
                handler: self.inner.as_mut(),
                stmt,
            })?;
            Ok(())
        } else {
            self.inner.set_parameters(stmt)
        }
    }
}

struct ResultSetHandlerPlugin {
    inner: Box<dyn ResultSetHandler>,
    interceptor: Arc<dyn Interceptor>,
    methods: HashSet<&'static str>,
}

impl ResultSetHandler for ResultSetHandlerPlugin {
    fn handle_result_sets(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<RowHandle>> {
        if self.methods.contains("handle_result_sets") {
            match self.interceptor.intercept(Invocation::HandleResultSets {
                handler: self.inner.as_mut(),
                executor,
                stmt,
                result_handler,
            })? {
                InvocationResult::Handles(handles) => Ok(handles),
                _ => Err(wrong_shape("handle_result_sets")),
            }
        } else {
            self.inner.handle_result_sets(executor, stmt, result_handler)
        }
    }

    fn handle_output_parameters(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
    ) -> Result<()> {
        self.inner.handle_output_parameters(executor, stmt)
    }

    fn parameter(&self) -> &Value {
        self.inner.parameter()
    }
}

struct StatementHandlerPlugin {
    inner: Box<dyn StatementHandler>,
    interceptor: Arc<dyn Interceptor>,
    methods: HashSet<&'static str>,
}

impl StatementHandler for StatementHandlerPlugin {
    fn prepare(
        &mut self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<Duration>,
    ) -> Result<Box<dyn Statement>> {
        if self.methods.contains("prepare") {
            match self.interceptor.intercept(Invocation::StatementPrepare {
                handler: self.inner.as_mut(),
                connection,
                transaction_timeout,
            })? {
                InvocationResult::Statement(stmt) => Ok(stmt),
                _ => Err(wrong_shape("prepare")),
            }
        } else {
            self.inner.prepare(connection, transaction_timeout)
        }
    }

    fn parameterize(&mut self, stmt: &mut dyn Statement) -> Result<()> {
        if self.methods.contains("parameterize") {
            self.interceptor
                .intercept(Invocation::StatementParameterize {
                    handler: self.inner.as_mut(),
                    stmt,
                })?;
            Ok(())
        } else {
            self.inner.parameterize(stmt)
        }
    }

    fn batch(&mut self, stmt: &mut dyn Statement) -> Result<()> {
        if self.methods.contains("batch") {
            self.interceptor.intercept(Invocation::StatementBatch {
                handler: self.inner.as_mut(),
                stmt,
            })?;
            Ok(())
        } else {
            self.inner.batch(stmt)
        }
    }

    fn update(&mut self, executor: &mut dyn Executor, stmt: &mut dyn Statement) -> Result<u64> {
        if self.methods.contains("update") {
            match self.interceptor.intercept(Invocation::StatementUpdate {
                handler: self.inner.as_mut(),
                executor,
                stmt,
            })? {
                InvocationResult::Count(count) => Ok(count),
                _ => Err(wrong_shape("update")),
            }
        } else {
            self.inner.update(executor, stmt)
        }
    }

    fn query(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<RowHandle>> {
        if self.methods.contains("query") {
            match self.interceptor.intercept(Invocation::StatementQuery {
                handler: self.inner.as_mut(),
                executor,
                stmt,
                result_handler,
            })? {
                InvocationResult::Handles(handles) => Ok(handles),
                _ => Err(wrong_shape("query")),
            }
        } else {
            self.inner.query(executor, stmt, result_handler)
        }
    }

    fn query_cursor(&mut self, stmt: Box<dyn Statement>) -> Result<Box<dyn RowCursor>> {
        self.inner.query_cursor(stmt)
    }

    fn bound_sql(&self) -> &BoundSql {
        self.inner.bound_sql()
    }

    fn parameter(&self) -> &Value {
        self.inner.parameter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BadSignature;

    impl Interceptor for BadSignature {
        fn signatures(&self) -> Vec<Signature> {
            vec![Signature::new(TargetKind::Executor, "close")]
        }

        fn intercept(
            &self,
            invocation: Invocation<'_, '_, '_, '_, '_, '_, '_, '_>,
        ) -> Result<InvocationResult> {
            invocation.proceed()
        }
    }

    struct PassThrough;

    impl Interceptor for PassThrough {
        fn signatures(&self) -> Vec<Signature> {
            vec![
                Signature::new(TargetKind::Executor, "query"),
                Signature::new(TargetKind::Executor, "update"),
            ]
        }

        fn intercept(
            &self,
            invocation: Invocation<'_, '_, '_, '_, '_, '_, '_, '_>,
        ) -> Result<InvocationResult> {
            invocation.proceed()
        }
    }

    #[test]
    fn validate_rejects_non_interceptable_methods() {
        let err = validate(&BadSignature).unwrap_err();
        assert!(err.is_plugin());
    }

    #[test]
    fn validate_accepts_known_join_points() {
        validate(&PassThrough).unwrap();
    }
}
