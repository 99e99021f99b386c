use super::{BoundSql, ParameterMap, ResultMap, SqlSource};
use crate::cache::Cache;
use crate::driver::ResultSetType;
use crate::exec::KeyGenerator;
use crate::{Configuration, Error, Result, Value};

use std::sync::Arc;
use std::time::Duration;

/// The SQL verb a statement executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlCommandType {
    Insert,
    Update,
    Delete,
    Select,
    Flush,
}

/// How the statement reaches the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatementType {
    /// Unparameterized text statement.
    Statement,
    #[default]
    Prepared,
    Callable,
}

impl StatementType {
    pub fn parse(name: &str) -> Result<StatementType> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "STATEMENT" => StatementType::Statement,
            "PREPARED" => StatementType::Prepared,
            "CALLABLE" => StatementType::Callable,
            other => return Err(Error::parse(format!("unknown statement type `{other}`"))),
        })
    }
}

/// The compiled, registered unit for one statement, identified as
/// `namespace.id`. Built during parse, immutable afterwards.
#[derive(Clone)]
pub struct MappedStatement {
    id: String,
    resource: String,
    command: SqlCommandType,
    statement_type: StatementType,
    sql_source: Arc<dyn SqlSource>,
    parameter_map: Option<Arc<ParameterMap>>,
    result_maps: Vec<Arc<ResultMap>>,
    result_set_type: Option<ResultSetType>,
    fetch_size: Option<u32>,
    timeout: Option<Duration>,
    use_cache: bool,
    flush_cache_required: bool,
    result_ordered: bool,
    dirty_select: bool,
    cache: Option<Arc<Cache>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
    key_properties: Vec<String>,
    key_columns: Vec<String>,
    result_sets: Vec<String>,
    database_id: Option<String>,
}

impl MappedStatement {
    pub fn builder(
        id: impl Into<String>,
        command: SqlCommandType,
        sql_source: Arc<dyn SqlSource>,
    ) -> MappedStatementBuilder {
        let is_select = command == SqlCommandType::Select;
        MappedStatementBuilder {
            statement: MappedStatement {
                id: id.into(),
                resource: String::new(),
                command,
                statement_type: StatementType::Prepared,
                sql_source,
                parameter_map: None,
                result_maps: vec![],
                result_set_type: None,
                fetch_size: None,
                timeout: None,
                use_cache: is_select,
                flush_cache_required: !is_select,
                result_ordered: false,
                dirty_select: false,
                cache: None,
                key_generator: None,
                key_properties: vec![],
                key_columns: vec![],
                result_sets: vec![],
                database_id: None,
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn command(&self) -> SqlCommandType {
        self.command
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    pub fn sql_source(&self) -> &Arc<dyn SqlSource> {
        &self.sql_source
    }

    pub fn parameter_map(&self) -> Option<&Arc<ParameterMap>> {
        self.parameter_map.as_ref()
    }

    pub fn result_maps(&self) -> &[Arc<ResultMap>] {
        &self.result_maps
    }

    pub fn result_set_type(&self) -> Option<ResultSetType> {
        self.result_set_type
    }

    pub fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn use_cache(&self) -> bool {
        self.use_cache
    }

    pub fn flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    pub fn result_ordered(&self) -> bool {
        self.result_ordered
    }

    /// Whether this select invalidates the second-level cache (`FLUSH`
    /// routed through a select, or an explicitly dirty select).
    pub fn dirty_select(&self) -> bool {
        self.dirty_select
    }

    pub fn cache(&self) -> Option<&Arc<Cache>> {
        self.cache.as_ref()
    }

    pub fn key_generator(&self) -> Option<&Arc<dyn KeyGenerator>> {
        self.key_generator.as_ref()
    }

    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    /// Names declared for additional driver result sets, in driver order.
    pub fn result_sets(&self) -> &[String] {
        &self.result_sets
    }

    pub fn database_id(&self) -> Option<&str> {
        self.database_id.as_deref()
    }

    /// Produces the bound SQL for one invocation. When the source yields no
    /// inline mappings and the statement declares a `<parameterMap>`, the
    /// declared mappings apply instead.
    pub fn bound_sql(&self, config: &Configuration, parameter: &Value) -> Result<BoundSql> {
        let bound = self.sql_source.bound_sql(config, parameter)?;
        if bound.parameter_mappings().is_empty() {
            if let Some(parameter_map) = &self.parameter_map {
                let mut replaced = BoundSql::new(
                    bound.sql().to_string(),
                    parameter_map.mappings().to_vec(),
                    parameter.clone(),
                );
                for (name, value) in bound.additional() {
                    replaced.set_additional(name.clone(), value.clone());
                }
                return Ok(replaced);
            }
        }
        Ok(bound)
    }
}

impl core::fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("command", &self.command)
            .field("statement_type", &self.statement_type)
            .field("use_cache", &self.use_cache)
            .finish()
    }
}

pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.statement.resource = resource.into();
        self
    }

    pub fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement.statement_type = statement_type;
        self
    }

    pub fn parameter_map(mut self, parameter_map: Option<Arc<ParameterMap>>) -> Self {
        self.statement.parameter_map = parameter_map;
        self
    }

    pub fn result_maps(mut self, result_maps: Vec<Arc<ResultMap>>) -> Self {
        self.statement.result_maps = result_maps;
        self
    }

    pub fn result_set_type(mut self, result_set_type: Option<ResultSetType>) -> Self {
        self.statement.result_set_type = result_set_type;
        self
    }

    pub fn fetch_size(mut self, fetch_size: Option<u32>) -> Self {
        self.statement.fetch_size = fetch_size;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement.timeout = timeout;
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.statement.use_cache = use_cache;
        self
    }

    pub fn flush_cache_required(mut self, flush: bool) -> Self {
        self.statement.flush_cache_required = flush;
        self
    }

    pub fn result_ordered(mut self, ordered: bool) -> Self {
        self.statement.result_ordered = ordered;
        self
    }

    pub fn dirty_select(mut self, dirty: bool) -> Self {
        self.statement.dirty_select = dirty;
        self
    }

    pub fn cache(mut self, cache: Option<Arc<Cache>>) -> Self {
        self.statement.cache = cache;
        self
    }

    pub fn key_generator(mut self, generator: Option<Arc<dyn KeyGenerator>>) -> Self {
        self.statement.key_generator = generator;
        self
    }

    pub fn key_properties(mut self, properties: Vec<String>) -> Self {
        self.statement.key_properties = properties;
        self
    }

    pub fn key_columns(mut self, columns: Vec<String>) -> Self {
        self.statement.key_columns = columns;
        self
    }

    pub fn result_sets(mut self, result_sets: Vec<String>) -> Self {
        self.statement.result_sets = result_sets;
        self
    }

    pub fn database_id(mut self, database_id: Option<String>) -> Self {
        self.statement.database_id = database_id;
        self
    }

    pub fn build(self) -> Result<MappedStatement> {
        if self.statement.id.is_empty() {
            return Err(Error::parse("mapped statement id is required"));
        }
        Ok(self.statement)
    }
}
