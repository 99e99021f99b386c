mod factory;
pub use factory::SessionFactory;

mod mapper;
pub use mapper::{Args, Mapper};

use tessera_core::exec::{
    BatchResult, Executor, ResultHandler, RowBounds, RowCursor,
};
use tessera_core::mapping::MappedStatement;
use tessera_core::meta::MetaValue;
use tessera_core::value::ValueObject;
use tessera_core::{Configuration, Error, Result, Value};

use serde::de::DeserializeOwned;
use std::sync::Arc;

/// One unit of work against the database: owns an executor (and through it
/// a transaction), routes statement ids to mapped statements, and converts
/// projected rows at the API boundary.
///
/// Sessions are single-threaded and short-lived: open, use, commit or roll
/// back, close. Dropping a session closes it, rolling back unflushed work.
pub struct Session {
    config: Arc<Configuration>,
    executor: Box<dyn Executor>,
    auto_commit: bool,
    dirty: bool,
}

impl Session {
    pub(crate) fn new(
        config: Arc<Configuration>,
        executor: Box<dyn Executor>,
        auto_commit: bool,
    ) -> Session {
        Session {
            config,
            executor,
            auto_commit,
            dirty: false,
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    fn statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.config.mapped_statement(id)
    }

    /// Runs a select and collects every projected row.
    pub fn select_list(&mut self, id: &str, mut parameter: Value) -> Result<Vec<Value>> {
        let ms = self.statement(id)?;
        self.executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT, None)
    }

    pub fn select_list_bounded(
        &mut self,
        id: &str,
        mut parameter: Value,
        row_bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        let ms = self.statement(id)?;
        self.executor.query(&ms, &mut parameter, row_bounds, None)
    }

    /// Runs a select expected to yield at most one row.
    pub fn select_one(&mut self, id: &str, parameter: Value) -> Result<Option<Value>> {
        let mut rows = self.select_list(id, parameter)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.swap_remove(0))),
            n => Err(Error::executor(format!(
                "expected one result for `{id}`, found {n}"
            ))),
        }
    }

    /// Runs a select and keys each row object by one of its properties.
    pub fn select_map(
        &mut self,
        id: &str,
        parameter: Value,
        map_key: &str,
    ) -> Result<ValueObject> {
        let rows = self.select_list(id, parameter)?;
        let mut out = ValueObject::new();
        for row in rows {
            let key = MetaValue::new(&row).get(map_key)?;
            out.insert(key.to_string(), row);
        }
        Ok(out)
    }

    /// Streams rows through a caller-supplied handler instead of collecting
    /// them.
    pub fn select_with_handler(
        &mut self,
        id: &str,
        mut parameter: Value,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        let ms = self.statement(id)?;
        self.executor
            .query(&ms, &mut parameter, row_bounds, Some(handler))?;
        Ok(())
    }

    /// Opens a lazily-consumed cursor over the select. The cursor holds its
    /// statement until closed.
    pub fn select_cursor(
        &mut self,
        id: &str,
        mut parameter: Value,
        row_bounds: RowBounds,
    ) -> Result<Box<dyn RowCursor>> {
        let ms = self.statement(id)?;
        self.executor.query_cursor(&ms, &mut parameter, row_bounds)
    }

    /// Typed variants deserialize the projected value trees.
    pub fn select_one_as<T: DeserializeOwned>(
        &mut self,
        id: &str,
        parameter: Value,
    ) -> Result<Option<T>> {
        self.select_one(id, parameter)?
            .map(|row| from_value(&row))
            .transpose()
    }

    pub fn select_list_as<T: DeserializeOwned>(
        &mut self,
        id: &str,
        parameter: Value,
    ) -> Result<Vec<T>> {
        self.select_list(id, parameter)?
            .iter()
            .map(from_value)
            .collect()
    }

    /// Runs a write statement. Generated keys and OUT parameters write back
    /// through the parameter.
    pub fn update(&mut self, id: &str, parameter: &mut Value) -> Result<u64> {
        let ms = self.statement(id)?;
        self.dirty = true;
        self.executor.update(&ms, parameter)
    }

    pub fn insert(&mut self, id: &str, parameter: &mut Value) -> Result<u64> {
        self.update(id, parameter)
    }

    pub fn delete(&mut self, id: &str, parameter: &mut Value) -> Result<u64> {
        self.update(id, parameter)
    }

    pub fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.executor.flush_statements()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.commit_force(false)
    }

    pub fn commit_force(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.commit(required)?;
        self.dirty = false;
        Ok(())
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.rollback_force(false)
    }

    pub fn rollback_force(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor.rollback(required)?;
        self.dirty = false;
        Ok(())
    }

    fn commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.auto_commit && self.dirty) || force
    }

    pub fn close(&mut self) -> Result<()> {
        let force_rollback = self.commit_or_rollback_required(false);
        self.executor.close(force_rollback)?;
        self.dirty = false;
        Ok(())
    }

    /// A dispatcher routing method names within one mapper namespace.
    pub fn mapper(&mut self, namespace: impl Into<String>) -> Mapper<'_> {
        Mapper::new(self, namespace.into())
    }

    /// Loads one pending lazy property of a projected object through its
    /// recorded nested query.
    pub fn load_lazy(&mut self, value: &Value, property: &str) -> Result<()> {
        let Value::Proxy(proxy) = value else {
            return Ok(());
        };
        let Some(loader) = proxy.loader(property) else {
            return Ok(());
        };

        let ms = self.statement(&loader.statement_id)?;
        let mut parameter = loader.parameter.clone();
        let rows = self
            .executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT, None)?;
        let loaded = if loader.kind == tessera_core::ty::ValueKind::List {
            Value::List(rows)
        } else {
            match rows.len() {
                0 => Value::Null,
                1 => rows.into_iter().next().expect("one row"),
                n => {
                    return Err(Error::executor(format!(
                        "lazy load of `{property}` expected one row, found {n}"
                    )))
                }
            }
        };
        proxy.complete(property, loaded);
        Ok(())
    }

    /// Loads every pending lazy property of a projected object.
    pub fn load_all_lazy(&mut self, value: &Value) -> Result<()> {
        let Value::Proxy(proxy) = value else {
            return Ok(());
        };
        for property in proxy.pending() {
            self.load_lazy(value, &property)?;
        }
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

pub(crate) fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T> {
    let json = serde_json::to_value(value)
        .map_err(|err| Error::binding(format!("cannot serialize result: {err}")))?;
    serde_json::from_value(json)
        .map_err(|err| Error::binding(format!("cannot convert result: {err}")))
}
