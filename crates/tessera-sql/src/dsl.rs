use crate::assistant::{BuilderAssistant, StatementSpec};
use crate::source::ProviderSqlSource;
use crate::statement::SELECT_KEY_SUFFIX;

use tessera_core::config::PendingElement;
use tessera_core::driver::ResultSetType;
use tessera_core::exec::{DriverKeyGenerator, KeyGenerator, SelectKeyGenerator};
use tessera_core::mapping::{ResultMapping, SqlCommandType, StatementType, StaticSqlSource};
use tessera_core::{Configuration, Error, Result, Value};

use std::sync::Arc;
use std::time::Duration;

/// Programmatic statement registration for mappers defined in code rather
/// than documents: command + script (or provider closure), options,
/// select-key, and result definitions, with scripts selectable per
/// database id.
pub struct MapperBuilder<'a> {
    config: &'a mut Configuration,
    assistant: BuilderAssistant,
}

/// Per-statement execution options.
#[derive(Clone, Default)]
pub struct StatementOptions {
    pub statement_type: StatementType,
    pub parameter_type: Option<String>,
    pub flush_cache: Option<bool>,
    pub use_cache: Option<bool>,
    pub fetch_size: Option<u32>,
    pub timeout: Option<Duration>,
    pub result_set_type: Option<ResultSetType>,
    pub use_generated_keys: bool,
    pub key_property: Option<String>,
    pub key_column: Option<String>,
    pub result_sets: Option<String>,
}

/// A companion key query run before or after the main statement.
#[derive(Clone)]
pub struct SelectKeySpec {
    pub statement: String,
    pub key_property: String,
    pub key_column: Option<String>,
    pub before: bool,
    pub result_type: String,
}

#[derive(Clone)]
enum Script {
    Text(String),
    Provider(Arc<dyn Fn(&Value) -> Result<String> + Send + Sync>),
}

#[derive(Clone)]
struct MethodData {
    id: String,
    command: SqlCommandType,
    scripts: Vec<(Option<String>, Script)>,
    options: StatementOptions,
    select_key: Option<SelectKeySpec>,
    result_map: Option<String>,
    result_type: Option<String>,
    language: Option<String>,
}

impl<'a> MapperBuilder<'a> {
    pub fn new(config: &'a mut Configuration, namespace: impl Into<String>) -> MapperBuilder<'a> {
        let namespace = namespace.into();
        MapperBuilder {
            config,
            assistant: BuilderAssistant::new(format!("{namespace} (in-code mapper)"), namespace),
        }
    }

    pub fn namespace(&self) -> &str {
        self.assistant.namespace()
    }

    /// Registers a result map for this namespace.
    pub fn result_map(
        &mut self,
        id: &str,
        type_name: &str,
        mappings: Vec<ResultMapping>,
    ) -> Result<()> {
        self.assistant
            .add_result_map(self.config, id, type_name, None, None, mappings, None)?;
        Ok(())
    }

    pub fn select(&mut self, id: impl Into<String>) -> StatementDsl<'_, 'a> {
        self.statement(id, SqlCommandType::Select)
    }

    pub fn insert(&mut self, id: impl Into<String>) -> StatementDsl<'_, 'a> {
        self.statement(id, SqlCommandType::Insert)
    }

    pub fn update(&mut self, id: impl Into<String>) -> StatementDsl<'_, 'a> {
        self.statement(id, SqlCommandType::Update)
    }

    pub fn delete(&mut self, id: impl Into<String>) -> StatementDsl<'_, 'a> {
        self.statement(id, SqlCommandType::Delete)
    }

    /// Registers a flush marker statement: invoking it flushes pending
    /// batch statements and executes no SQL of its own.
    pub fn flush(&mut self, id: impl Into<String>) -> Result<()> {
        let source = Arc::new(StaticSqlSource::new(String::new(), vec![]));
        self.assistant.add_mapped_statement(
            self.config,
            &id.into(),
            SqlCommandType::Flush,
            source,
            StatementSpec::default(),
        )?;
        Ok(())
    }

    fn statement(&mut self, id: impl Into<String>, command: SqlCommandType) -> StatementDsl<'_, 'a> {
        StatementDsl {
            mapper: self,
            data: MethodData {
                id: id.into(),
                command,
                scripts: Vec::new(),
                options: StatementOptions::default(),
                select_key: None,
                result_map: None,
                result_type: None,
                language: None,
            },
        }
    }
}

/// Collects one statement's declaration, then registers it.
pub struct StatementDsl<'m, 'c> {
    mapper: &'m mut MapperBuilder<'c>,
    data: MethodData,
}

impl StatementDsl<'_, '_> {
    /// The default script, applying when no database-id-specific script
    /// matches.
    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.data.scripts.push((None, Script::Text(script.into())));
        self
    }

    /// A script that applies only under the given database id.
    pub fn script_for(mut self, database_id: impl Into<String>, script: impl Into<String>) -> Self {
        self.data
            .scripts
            .push((Some(database_id.into()), Script::Text(script.into())));
        self
    }

    /// A provider closure producing fresh script text per invocation.
    pub fn provider(
        mut self,
        provider: impl Fn(&Value) -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.data
            .scripts
            .push((None, Script::Provider(Arc::new(provider))));
        self
    }

    pub fn options(mut self, options: StatementOptions) -> Self {
        self.data.options = options;
        self
    }

    pub fn select_key(mut self, select_key: SelectKeySpec) -> Self {
        self.data.select_key = Some(select_key);
        self
    }

    pub fn result_map(mut self, id: impl Into<String>) -> Self {
        self.data.result_map = Some(id.into());
        self
    }

    pub fn result_type(mut self, type_name: impl Into<String>) -> Self {
        self.data.result_type = Some(type_name.into());
        self
    }

    pub fn lang(mut self, language: impl Into<String>) -> Self {
        self.data.language = Some(language.into());
        self
    }

    /// Validates and registers the statement. Unresolved result-map
    /// references queue the registration for the build-time fixpoint.
    pub fn register(self) -> Result<()> {
        let StatementDsl { mapper, data } = self;
        validate_scripts(&data)?;
        match register_method(mapper.config, &mapper.assistant, data.clone()) {
            Ok(()) => Ok(()),
            Err(err) if err.is_incomplete_element() => {
                let namespace = mapper.assistant.namespace().to_string();
                let resource = mapper.assistant.resource().to_string();
                mapper.config.add_pending_method(Arc::new(PendingMethod {
                    namespace,
                    resource,
                    data,
                }));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

fn validate_scripts(data: &MethodData) -> Result<()> {
    if data.scripts.is_empty() {
        return Err(Error::parse(format!(
            "statement `{}` declares no script",
            data.id
        )));
    }
    let defaults = data
        .scripts
        .iter()
        .filter(|(database_id, _)| database_id.is_none())
        .count();
    if defaults > 1 {
        return Err(Error::parse(format!(
            "statement `{}` declares more than one default script",
            data.id
        )));
    }
    let mut seen = Vec::new();
    for (database_id, _) in &data.scripts {
        if let Some(database_id) = database_id {
            if seen.contains(&database_id) {
                return Err(Error::parse(format!(
                    "statement `{}` declares database id `{database_id}` twice",
                    data.id
                )));
            }
            seen.push(database_id);
        }
    }
    Ok(())
}

fn select_script(config: &Configuration, data: &MethodData) -> Result<Option<Script>> {
    if let Some(current) = config.database_id() {
        for (database_id, script) in &data.scripts {
            if database_id.as_deref() == Some(current) {
                return Ok(Some(script.clone()));
            }
        }
    }
    Ok(data
        .scripts
        .iter()
        .find(|(database_id, _)| database_id.is_none())
        .map(|(_, script)| script.clone()))
}

fn register_method(
    config: &mut Configuration,
    assistant: &BuilderAssistant,
    data: MethodData,
) -> Result<()> {
    let Some(script) = select_script(config, &data)? else {
        // No script applies under the active database id.
        return Ok(());
    };

    let parameter_kind = data
        .options
        .parameter_type
        .as_deref()
        .map(|name| config.resolve_alias(name))
        .unwrap_or_default();

    let source = match script {
        Script::Text(text) => {
            let language = config.language(data.language.as_deref())?;
            language.create_source_from_script(config, &text, parameter_kind)?
        }
        Script::Provider(provider) => Arc::new(ProviderSqlSource::new(
            provider,
            parameter_kind,
            data.language.clone(),
        )) as _,
    };

    let key_generator: Option<Arc<dyn KeyGenerator>> = match &data.select_key {
        Some(select_key) => {
            let key_id = format!("{}{SELECT_KEY_SUFFIX}", data.id);
            let full_key_id = assistant.apply_namespace(&key_id, false)?;

            // A deferred registration retries in full; the companion may
            // already exist from the first attempt.
            if config.has_key_generator(&full_key_id) {
                Some(config.key_generator(&full_key_id)?)
            } else {
                let language = config.language(data.language.as_deref())?;
                let key_source = language.create_source_from_script(
                    config,
                    &select_key.statement,
                    parameter_kind,
                )?;
                let key_statement = assistant.add_mapped_statement(
                    config,
                    &key_id,
                    SqlCommandType::Select,
                    key_source,
                    StatementSpec {
                        result_type: Some(select_key.result_type.clone()),
                        flush_cache: Some(false),
                        use_cache: Some(false),
                        key_property: Some(select_key.key_property.clone()),
                        key_column: select_key.key_column.clone(),
                        ..StatementSpec::default()
                    },
                )?;
                let generator: Arc<dyn KeyGenerator> =
                    Arc::new(SelectKeyGenerator::new(key_statement, select_key.before));
                config.add_key_generator(full_key_id, generator.clone())?;
                Some(generator)
            }
        }
        None => (data.command == SqlCommandType::Insert
            && (data.options.use_generated_keys || config.settings().use_generated_keys))
            .then(|| Arc::new(DriverKeyGenerator) as Arc<dyn KeyGenerator>),
    };

    let spec = StatementSpec {
        statement_type: data.options.statement_type,
        parameter_map: None,
        result_map: data.result_map.clone(),
        result_type: data.result_type.clone(),
        result_set_type: data.options.result_set_type,
        fetch_size: data.options.fetch_size,
        timeout: data.options.timeout,
        flush_cache: data.options.flush_cache,
        use_cache: data.options.use_cache,
        result_ordered: false,
        dirty_select: false,
        key_generator,
        key_property: data.options.key_property.clone(),
        key_column: data.options.key_column.clone(),
        result_sets: data.options.result_sets.clone(),
        database_id: None,
    };

    assistant.add_mapped_statement(config, &data.id, data.command, source, spec)?;
    Ok(())
}

struct PendingMethod {
    namespace: String,
    resource: String,
    data: MethodData,
}

impl PendingElement for PendingMethod {
    fn resolve(&self, config: &mut Configuration) -> Result<()> {
        let assistant = BuilderAssistant::new(self.resource.clone(), self.namespace.clone());
        register_method(config, &assistant, self.data.clone())
    }

    fn describe(&self) -> String {
        format!("statement `{}` in `{}`", self.data.id, self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_statements_with_scripts() {
        let mut config = crate::configuration();
        let mut mapper = MapperBuilder::new(&mut config, "app.UserMapper");
        mapper
            .select("findById")
            .script("SELECT * FROM users WHERE id = #{id}")
            .result_type("map")
            .register()
            .unwrap();

        let ms = config.mapped_statement("app.UserMapper.findById").unwrap();
        assert_eq!(ms.command(), SqlCommandType::Select);
        assert!(ms.use_cache());
    }

    #[test]
    fn database_id_selects_script_variant() {
        let mut config = crate::configuration();
        config.set_database_id(Some("h2".to_string()));
        let mut mapper = MapperBuilder::new(&mut config, "app.M");
        mapper
            .select("now")
            .script("SELECT sysdate FROM dual")
            .script_for("h2", "SELECT now()")
            .register()
            .unwrap();

        let ms = config.mapped_statement("app.M.now").unwrap();
        let bound = ms.bound_sql(&config, &Value::Null).unwrap();
        assert_eq!(bound.sql(), "SELECT now()");
    }

    #[test]
    fn duplicate_default_scripts_are_rejected() {
        let mut config = crate::configuration();
        let mut mapper = MapperBuilder::new(&mut config, "app.M");
        let err = mapper
            .select("x")
            .script("SELECT 1")
            .script("SELECT 2")
            .register()
            .unwrap_err();
        assert!(err.to_string().contains("more than one default script"));
    }

    #[test]
    fn forward_result_map_reference_defers() {
        let mut config = crate::configuration();
        {
            let mut mapper = MapperBuilder::new(&mut config, "app.M");
            mapper
                .select("all")
                .script("SELECT * FROM t")
                .result_map("lateMap")
                .register()
                .unwrap();
        }
        assert!(!config.has_mapped_statement("app.M.all"));

        {
            let mut mapper = MapperBuilder::new(&mut config, "app.M");
            mapper.result_map("lateMap", "map", vec![]).unwrap();
        }
        config.resolve_pending().unwrap();
        assert!(config.has_mapped_statement("app.M.all"));
    }
}
