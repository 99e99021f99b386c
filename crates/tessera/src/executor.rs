mod caching;
pub use caching::CachingExecutor;

use crate::statement::new_statement_handler;

use tessera_core::cache::CacheKey;
use tessera_core::config::LocalCacheScope;
use tessera_core::driver::{Statement, Transaction};
use tessera_core::exec::{
    BatchResult, Executor, ExecutorType, ResultHandler, RowBounds, RowCursor, RowHandle,
};
use tessera_core::mapping::{BoundSql, MappedStatement, ParamMode, SqlCommandType, StatementType};
use tessera_core::ty::ValueKind;
use tessera_core::value::ProxyRef;
use tessera_core::{plugin, Configuration, Error, Result, Value};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Update count reported for statements queued into a pending batch; the
/// real counts arrive when the batch flushes.
pub const BATCH_UPDATE_QUEUED: u64 = u64::MAX;

/// Builds a session's executor: base variant per executor type, wrapped by
/// the caching overlay when second-level caching is enabled, then by the
/// plugin chain. This ordering means interceptors observe the caching
/// surface.
pub fn new_executor(
    config: &Arc<Configuration>,
    transaction: Box<dyn Transaction>,
    executor_type: ExecutorType,
) -> Box<dyn Executor> {
    let base: Box<dyn Executor> = Box::new(DbExecutor::new(
        config.clone(),
        transaction,
        executor_type,
    ));
    let executor: Box<dyn Executor> = if config.settings().cache_enabled {
        Box::new(CachingExecutor::new(config.clone(), base))
    } else {
        base
    };
    plugin::wrap_executor(executor, config.interceptors())
}

enum LocalEntry {
    /// Sentinel placed while the query is executing; a nested query
    /// re-entering the same key defers behind it.
    Placeholder,
    Rows(Vec<RowHandle>),
}

struct DeferredLoad {
    ms: Arc<MappedStatement>,
    target: RowHandle,
    property: String,
    key: CacheKey,
    kind: ValueKind,
}

enum Variant {
    Simple,
    Reuse {
        statements: HashMap<String, Box<dyn Statement>>,
    },
    Batch {
        entries: Vec<BatchEntry>,
    },
}

struct BatchEntry {
    sql: String,
    statement_id: String,
    stmt: Box<dyn Statement>,
    parameters: Vec<Value>,
}

/// The session-local executor: first-level cache, deferred-load queue,
/// query-stack depth, and the statement-variant behavior (simple / reuse /
/// batch).
pub struct DbExecutor {
    config: Arc<Configuration>,
    transaction: Box<dyn Transaction>,
    variant: Variant,
    local_cache: HashMap<CacheKey, LocalEntry>,
    /// Parameter snapshots of callable statements, replayed on local-cache
    /// hits so OUT values survive without re-execution.
    output_params: HashMap<CacheKey, Value>,
    deferred: VecDeque<DeferredLoad>,
    query_stack: u32,
    closed: bool,
}

impl DbExecutor {
    pub fn new(
        config: Arc<Configuration>,
        transaction: Box<dyn Transaction>,
        executor_type: ExecutorType,
    ) -> DbExecutor {
        let variant = match executor_type {
            ExecutorType::Simple => Variant::Simple,
            ExecutorType::Reuse => Variant::Reuse {
                statements: HashMap::new(),
            },
            ExecutorType::Batch => Variant::Batch {
                entries: Vec::new(),
            },
        };
        DbExecutor {
            config,
            transaction,
            variant,
            local_cache: HashMap::new(),
            output_params: HashMap::new(),
            deferred: VecDeque::new(),
            query_stack: 0,
            closed: false,
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::executor("executor is closed"));
        }
        Ok(())
    }

    fn is_batch(&self) -> bool {
        matches!(self.variant, Variant::Batch { .. })
    }

    fn is_reuse(&self) -> bool {
        matches!(self.variant, Variant::Reuse { .. })
    }

    fn take_reused(&mut self, sql: &str) -> Option<Box<dyn Statement>> {
        match &mut self.variant {
            Variant::Reuse { statements } => statements.remove(sql),
            _ => None,
        }
    }

    fn keep_reused(&mut self, sql: String, stmt: Box<dyn Statement>) {
        if let Variant::Reuse { statements } = &mut self.variant {
            statements.insert(sql, stmt);
        }
    }

    fn do_update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<u64> {
        let mut handler =
            new_statement_handler(&self.config, ms, parameter.clone(), RowBounds::DEFAULT)?;

        if self.is_batch() {
            return self.do_update_batch(ms, parameter, handler);
        }

        let sql = handler.bound_sql().sql().to_string();
        let mut stmt = match self.take_reused(&sql) {
            Some(stmt) => stmt,
            None => {
                let timeout = self.transaction.timeout()?;
                let connection = self.transaction.connection()?;
                handler.prepare(connection, timeout)?
            }
        };
        handler.parameterize(stmt.as_mut())?;
        let rows = handler.update(self, stmt.as_mut())?;
        if self.is_reuse() {
            self.keep_reused(sql, stmt);
        }

        *parameter = handler.parameter().clone();
        Ok(rows)
    }

    /// Batched writes queue behind the last statement when SQL and id
    /// match; real update counts arrive at flush.
    fn do_update_batch(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        mut handler: Box<dyn tessera_core::exec::StatementHandler>,
    ) -> Result<u64> {
        let sql = handler.bound_sql().sql().to_string();

        let reusable = match &self.variant {
            Variant::Batch { entries } => entries
                .last()
                .map(|entry| entry.sql == sql && entry.statement_id == ms.id())
                .unwrap_or(false),
            _ => unreachable!("checked by caller"),
        };

        if reusable {
            let mut entry = match &mut self.variant {
                Variant::Batch { entries } => entries.pop().expect("checked non-empty"),
                _ => unreachable!(),
            };
            handler.parameterize(entry.stmt.as_mut())?;
            handler.batch(entry.stmt.as_mut())?;
            entry.parameters.push(parameter.clone());
            if let Variant::Batch { entries } = &mut self.variant {
                entries.push(entry);
            }
        } else {
            let timeout = self.transaction.timeout()?;
            let connection = self.transaction.connection()?;
            let mut stmt = handler.prepare(connection, timeout)?;
            handler.parameterize(stmt.as_mut())?;
            handler.batch(stmt.as_mut())?;
            let entry = BatchEntry {
                sql,
                statement_id: ms.id().to_string(),
                stmt,
                parameters: vec![parameter.clone()],
            };
            if let Variant::Batch { entries } = &mut self.variant {
                entries.push(entry);
            }
        }

        *parameter = handler.parameter().clone();
        Ok(BATCH_UPDATE_QUEUED)
    }

    fn do_query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<RowHandle>> {
        if self.is_batch() {
            self.flush_batches(false)?;
        }

        let mut handler = new_statement_handler(&self.config, ms, parameter.clone(), row_bounds)?;
        let timeout = self.transaction.timeout()?;
        let connection = self.transaction.connection()?;
        let mut stmt = handler.prepare(connection, timeout)?;
        handler.parameterize(stmt.as_mut())?;
        let rows = handler.query(self, stmt.as_mut(), result_handler)?;
        *parameter = handler.parameter().clone();
        Ok(rows)
    }

    fn flush_batches(&mut self, rollback: bool) -> Result<Vec<BatchResult>> {
        let Variant::Batch { entries } = &mut self.variant else {
            return Ok(vec![]);
        };
        let mut entries: Vec<BatchEntry> = entries.drain(..).collect();
        if rollback {
            return Ok(vec![]);
        }

        let mut results = Vec::with_capacity(entries.len());
        for entry in &mut entries {
            let update_counts = entry.stmt.execute_batch()?;

            // Generated keys for batched inserts land in the batched
            // parameter list positionally.
            let ms = self.config.mapped_statement(&entry.statement_id)?;
            if let Some(generator) = ms.key_generator().cloned() {
                let mut batched = Value::List(entry.parameters.clone());
                generator.process_after(self, &ms, Some(entry.stmt.as_mut()), &mut batched)?;
                if let Value::List(updated) = batched {
                    entry.parameters = updated;
                }
            }

            results.push(BatchResult {
                statement_id: entry.statement_id.clone(),
                sql: entry.sql.clone(),
                parameters: entry.parameters.clone(),
                update_counts,
            });
        }
        Ok(results)
    }

    fn drain_deferred(&mut self) -> Result<()> {
        while let Some(load) = self.deferred.pop_front() {
            match self.local_cache.get(&load.key) {
                Some(LocalEntry::Rows(rows)) => {
                    debug!(
                        statement = load.ms.id(),
                        property = load.property.as_str(),
                        "applying deferred load"
                    );
                    let values: Vec<Value> = rows.iter().map(RowHandle::value).collect();
                    let value = if load.kind == ValueKind::List {
                        Value::List(values)
                    } else {
                        values.into_iter().next().unwrap_or(Value::Null)
                    };
                    load.target.set_property(&load.property, value)?;
                }
                // The owning entry vanished (cache cleared mid-query); the
                // property stays unset rather than guessing.
                _ => debug!(
                    statement = load.ms.id(),
                    property = load.property.as_str(),
                    "deferred load target no longer cached"
                ),
            }
        }
        Ok(())
    }
}

impl Executor for DbExecutor {
    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<u64> {
        self.check_open()?;
        debug!(statement = ms.id(), "update");
        self.clear_local_cache();

        if ms.command() == SqlCommandType::Flush {
            let flushed = self.flush_statements()?;
            return Ok(flushed.iter().map(|batch| batch.update_counts.iter().sum::<u64>()).sum());
        }

        if let Some(generator) = ms.key_generator().cloned() {
            generator.process_before(self, ms, parameter)?;
        }
        self.do_update(ms, parameter)
    }

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>> {
        self.check_open()?;
        let bound_sql = ms.bound_sql(&self.config, parameter)?;
        let key = self.create_cache_key(ms, parameter, &row_bounds, &bound_sql)?;

        if self.query_stack == 0 && ms.flush_cache_required() {
            self.clear_local_cache();
        }

        self.query_stack += 1;
        let outcome = (|| -> Result<Vec<RowHandle>> {
            if result_handler.is_none() {
                if let Some(LocalEntry::Rows(rows)) = self.local_cache.get(&key) {
                    debug!(statement = ms.id(), "local cache hit");
                    if ms.statement_type() == StatementType::Callable {
                        if let Some(saved) = self.output_params.get(&key) {
                            *parameter = saved.clone();
                        }
                    }
                    return Ok(rows.clone());
                }
            }

            // Miss: run under a sentinel so nested queries hitting the same
            // key defer instead of recursing forever.
            self.local_cache.insert(key.clone(), LocalEntry::Placeholder);
            let result = self.do_query(ms, parameter, row_bounds, result_handler);
            self.local_cache.remove(&key);

            let rows = result?;
            self.local_cache
                .insert(key.clone(), LocalEntry::Rows(rows.clone()));
            if ms.statement_type() == StatementType::Callable {
                self.output_params.insert(key.clone(), parameter.clone());
            }
            Ok(rows)
        })();
        self.query_stack -= 1;

        let rows = match outcome {
            Ok(rows) => rows,
            Err(err) => {
                if self.query_stack == 0 {
                    self.deferred.clear();
                }
                return Err(err);
            }
        };

        if self.query_stack == 0 {
            self.drain_deferred()?;
            if self.config.settings().local_cache_scope == LocalCacheScope::Statement {
                self.clear_local_cache();
            }
        }

        Ok(rows.iter().map(RowHandle::value).collect())
    }

    fn query_cursor(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
    ) -> Result<Box<dyn RowCursor>> {
        self.check_open()?;
        if matches!(self.variant, Variant::Batch { .. }) {
            self.flush_batches(false)?;
        }

        let mut handler = new_statement_handler(&self.config, ms, parameter.clone(), row_bounds)?;
        let timeout = self.transaction.timeout()?;
        let connection = self.transaction.connection()?;
        let mut stmt = handler.prepare(connection, timeout)?;
        handler.parameterize(stmt.as_mut())?;
        handler.query_cursor(stmt)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.check_open()?;
        match &mut self.variant {
            Variant::Simple => Ok(vec![]),
            Variant::Reuse { statements } => {
                statements.clear();
                Ok(vec![])
            }
            Variant::Batch { .. } => self.flush_batches(false),
        }
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.check_open()?;
        self.clear_local_cache();
        self.flush_statements()?;
        if required {
            self.transaction.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        match &mut self.variant {
            Variant::Reuse { statements } => statements.clear(),
            Variant::Batch { .. } => {
                self.flush_batches(true)?;
            }
            Variant::Simple => {}
        }
        if required {
            self.transaction.rollback()?;
        }
        Ok(())
    }

    fn create_cache_key(
        &mut self,
        ms: &Arc<MappedStatement>,
        _parameter: &Value,
        row_bounds: &RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.check_open()?;
        let mut key = CacheKey::new();
        key.update(Value::String(ms.id().to_string()));
        key.update(Value::Long(row_bounds.offset as i64));
        key.update(Value::Long(row_bounds.limit as i64));
        key.update(Value::String(bound_sql.sql().to_string()));

        for mapping in bound_sql.parameter_mappings() {
            if mapping.mode() == ParamMode::Out {
                continue;
            }
            key.update(bound_sql.value_of(mapping.property())?);
        }

        if let Some(environment) = self.config.environment() {
            key.update(Value::String(environment.id().to_string()));
        }
        Ok(key)
    }

    fn is_cached(&self, key: &CacheKey) -> bool {
        self.local_cache.contains_key(key)
    }

    fn defer_load(
        &mut self,
        ms: &Arc<MappedStatement>,
        target: RowHandle,
        property: String,
        key: CacheKey,
        kind: ValueKind,
    ) -> Result<()> {
        self.check_open()?;
        match self.local_cache.get(&key) {
            Some(LocalEntry::Rows(rows)) => {
                // Already materialized: fill the property immediately.
                let values: Vec<Value> = rows.iter().map(RowHandle::value).collect();
                let value = if kind == ValueKind::List {
                    Value::List(values)
                } else {
                    values.into_iter().next().unwrap_or(Value::Null)
                };
                target.set_property(&property, value)
            }
            _ => {
                // The patch lands after this row may already be embedded in
                // other objects; a shared proxy cell keeps every embedding
                // aliased to the same underlying object.
                if !matches!(target.value(), Value::Proxy(_)) {
                    target.replace(Value::Proxy(ProxyRef::new(
                        target.value(),
                        indexmap::IndexMap::new(),
                    )));
                }
                self.deferred.push_back(DeferredLoad {
                    ms: ms.clone(),
                    target,
                    property,
                    key,
                    kind,
                });
                Ok(())
            }
        }
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
            self.output_params.clear();
        }
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let rollback_result = self.rollback(force_rollback);
        let close_result = self.transaction.close();
        self.closed = true;
        self.local_cache.clear();
        self.deferred.clear();
        rollback_result.and(close_result)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
