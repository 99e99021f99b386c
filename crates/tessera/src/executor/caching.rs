use tessera_core::cache::{CacheKey, TransactionalCache};
use tessera_core::exec::{
    BatchResult, Executor, ResultHandler, RowBounds, RowCursor, RowHandle,
};
use tessera_core::mapping::{BoundSql, MappedStatement, ParamMode, StatementType};
use tessera_core::ty::ValueKind;
use tessera_core::{Error, Result, Value};

use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::Configuration;
use tracing::debug;

/// Second-level cache overlay: reads consult the statement's shared cache
/// region, writes stage in per-session transactional overlays that publish
/// on commit. Wraps the base executor before the plugin chain is applied.
pub struct CachingExecutor {
    config: Arc<Configuration>,
    delegate: Box<dyn Executor>,
    staged: HashMap<String, TransactionalCache>,
}

impl CachingExecutor {
    pub fn new(config: Arc<Configuration>, delegate: Box<dyn Executor>) -> CachingExecutor {
        CachingExecutor {
            config,
            delegate,
            staged: HashMap::new(),
        }
    }

    fn staged_for(&mut self, ms: &MappedStatement) -> Option<&mut TransactionalCache> {
        let cache = ms.cache()?;
        Some(
            self.staged
                .entry(cache.id().to_string())
                .or_insert_with(|| TransactionalCache::new(cache.clone())),
        )
    }

    fn flush_if_required(&mut self, ms: &MappedStatement) {
        if ms.flush_cache_required() || ms.dirty_select() {
            if let Some(staged) = self.staged_for(ms) {
                staged.clear();
            }
        }
    }
}

impl Executor for CachingExecutor {
    fn update(&mut self, ms: &Arc<MappedStatement>, parameter: &mut Value) -> Result<u64> {
        self.flush_if_required(ms);
        self.delegate.update(ms, parameter)
    }

    fn query(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Value>> {
        self.flush_if_required(ms);

        if ms.cache().is_none() || !ms.use_cache() || result_handler.is_some() {
            return self
                .delegate
                .query(ms, parameter, row_bounds, result_handler);
        }

        let bound_sql = ms.bound_sql(&self.config, parameter)?;

        // Callable OUT parameters cannot be replayed from a cache entry.
        if ms.statement_type() == StatementType::Callable
            && bound_sql
                .parameter_mappings()
                .iter()
                .any(|mapping| mapping.mode() != ParamMode::In)
        {
            return Err(Error::executor(format!(
                "caching statements with OUT parameters is not supported: {}",
                ms.id()
            )));
        }
        let key = self
            .delegate
            .create_cache_key(ms, parameter, &row_bounds, &bound_sql)?;

        if let Some(staged) = self.staged_for(ms) {
            if let Some(Value::List(rows)) = staged.get(&key)? {
                debug!(statement = ms.id(), "second-level cache hit");
                return Ok(rows);
            }
        }

        let rows = self
            .delegate
            .query(ms, parameter, row_bounds, result_handler)?;
        if let Some(staged) = self.staged_for(ms) {
            staged.put(key, Value::List(rows.clone()));
        }
        Ok(rows)
    }

    fn query_cursor(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &mut Value,
        row_bounds: RowBounds,
    ) -> Result<Box<dyn RowCursor>> {
        self.flush_if_required(ms);
        self.delegate.query_cursor(ms, parameter, row_bounds)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.delegate.flush_statements()
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        for staged in self.staged.values_mut() {
            staged.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        let result = self.delegate.rollback(required);
        if required {
            for staged in self.staged.values_mut() {
                staged.rollback()?;
            }
        }
        result
    }

    fn create_cache_key(
        &mut self,
        ms: &Arc<MappedStatement>,
        parameter: &Value,
        row_bounds: &RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.delegate
            .create_cache_key(ms, parameter, row_bounds, bound_sql)
    }

    fn is_cached(&self, key: &CacheKey) -> bool {
        self.delegate.is_cached(key)
    }

    fn defer_load(
        &mut self,
        ms: &Arc<MappedStatement>,
        target: RowHandle,
        property: String,
        key: CacheKey,
        kind: ValueKind,
    ) -> Result<()> {
        self.delegate.defer_load(ms, target, property, key, kind)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache()
    }

    fn close(&mut self, force_rollback: bool) -> Result<()> {
        let staged_result = if force_rollback {
            self.staged
                .values_mut()
                .try_for_each(TransactionalCache::rollback)
        } else {
            self.staged
                .values_mut()
                .try_for_each(TransactionalCache::commit)
        };
        let close_result = self.delegate.close(force_rollback);
        staged_result.and(close_result)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }
}

