mod settings;
pub use settings::{AutoMappingBehavior, LocalCacheScope, Settings};

mod strict;
pub use strict::StrictMap;

use crate::cache::Cache;
use crate::exec::KeyGenerator;
use crate::mapping::{Environment, MappedStatement, ParameterMap, ResultMap, SqlSource};
use crate::meta::{DefaultObjectFactory, ObjectFactory};
use crate::plugin::{self, Interceptor};
use crate::ty::ValueKind;
use crate::type_handler::TypeHandlerRegistry;
use crate::xml::XNode;
use crate::{Error, Result};

use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

/// Compiles script text (or a parsed script element) into a SQL source.
/// The default driver lives in the template-compiler crate; alternates are
/// registered by name and selected per statement with `lang="..."`.
pub trait LanguageDriver: Send + Sync {
    fn create_source_from_script(
        &self,
        config: &Configuration,
        script: &str,
        parameter_kind: ValueKind,
    ) -> Result<Arc<dyn SqlSource>>;

    fn create_source_from_node(
        &self,
        config: &Configuration,
        node: &XNode,
        parameter_kind: ValueKind,
    ) -> Result<Arc<dyn SqlSource>>;
}

/// A queued element whose references did not resolve yet. The registry
/// retries these until a pass makes no progress.
pub trait PendingElement: Send + Sync {
    fn resolve(&self, config: &mut Configuration) -> Result<()>;
    fn describe(&self) -> String;
}

/// The process-wide registry: settings, registries of handlers/aliases/
/// languages, keyed stores for caches, maps and statements, the plugin
/// chain, and the pending-element queues. Built once, immutable after
/// startup.
pub struct Configuration {
    settings: Settings,
    variables: IndexMap<String, String>,
    database_id: Option<String>,
    environment: Option<Environment>,
    type_handlers: TypeHandlerRegistry,
    aliases: IndexMap<String, ValueKind>,
    object_factory: Arc<dyn ObjectFactory>,
    languages: IndexMap<String, Arc<dyn LanguageDriver>>,
    default_language: Option<String>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    caches: StrictMap<Arc<Cache>>,
    cache_refs: IndexMap<String, String>,
    parameter_maps: StrictMap<Arc<ParameterMap>>,
    result_maps: StrictMap<Arc<ResultMap>>,
    mapped_statements: StrictMap<Arc<MappedStatement>>,
    key_generators: StrictMap<Arc<dyn KeyGenerator>>,
    sql_fragments: StrictMap<Arc<XNode>>,
    loaded_resources: HashSet<String>,
    pending_cache_refs: Vec<Arc<dyn PendingElement>>,
    pending_result_maps: Vec<Arc<dyn PendingElement>>,
    pending_statements: Vec<Arc<dyn PendingElement>>,
    pending_methods: Vec<Arc<dyn PendingElement>>,
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configuration").finish_non_exhaustive()
    }
}

impl Configuration {
    pub fn new() -> Configuration {
        let mut config = Configuration {
            settings: Settings::default(),
            variables: IndexMap::new(),
            database_id: None,
            environment: None,
            type_handlers: TypeHandlerRegistry::new(),
            aliases: IndexMap::new(),
            object_factory: Arc::new(DefaultObjectFactory),
            languages: IndexMap::new(),
            default_language: None,
            interceptors: Vec::new(),
            caches: StrictMap::new("cache registry"),
            cache_refs: IndexMap::new(),
            parameter_maps: StrictMap::new("parameter map registry"),
            result_maps: StrictMap::new("result map registry"),
            mapped_statements: StrictMap::new("mapped statement registry"),
            key_generators: StrictMap::new("key generator registry"),
            sql_fragments: StrictMap::new("sql fragment registry"),
            loaded_resources: HashSet::new(),
            pending_cache_refs: Vec::new(),
            pending_result_maps: Vec::new(),
            pending_statements: Vec::new(),
            pending_methods: Vec::new(),
        };
        config.seed_aliases();
        config
    }

    fn seed_aliases(&mut self) {
        let seed: &[(&str, ValueKind)] = &[
            ("any", ValueKind::Any),
            ("bool", ValueKind::Bool),
            ("boolean", ValueKind::Bool),
            ("int", ValueKind::Int),
            ("i32", ValueKind::Int),
            ("integer", ValueKind::Int),
            ("long", ValueKind::Long),
            ("i64", ValueKind::Long),
            ("double", ValueKind::Double),
            ("f64", ValueKind::Double),
            ("float", ValueKind::Double),
            ("decimal", ValueKind::Decimal),
            ("bigdecimal", ValueKind::Decimal),
            ("string", ValueKind::String),
            ("str", ValueKind::String),
            ("bytes", ValueKind::Bytes),
            ("byte[]", ValueKind::Bytes),
            ("uuid", ValueKind::Uuid),
            ("timestamp", ValueKind::Timestamp),
            ("datetime", ValueKind::Timestamp),
            ("date", ValueKind::Timestamp),
            ("list", ValueKind::List),
            ("arraylist", ValueKind::List),
            ("collection", ValueKind::List),
            ("array", ValueKind::List),
            ("map", ValueKind::Object),
            ("hashmap", ValueKind::Object),
            ("object", ValueKind::Object),
            ("cursor", ValueKind::Cursor),
        ];
        for (name, kind) in seed {
            self.aliases.insert((*name).to_string(), *kind);
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn variables(&self) -> &IndexMap<String, String> {
        &self.variables
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn set_variables(&mut self, variables: IndexMap<String, String>) {
        self.variables.extend(variables);
    }

    pub fn database_id(&self) -> Option<&str> {
        self.database_id.as_deref()
    }

    pub fn set_database_id(&mut self, database_id: Option<String>) {
        self.database_id = database_id;
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn set_environment(&mut self, environment: Environment) {
        self.environment = Some(environment);
    }

    pub fn type_handlers(&self) -> &TypeHandlerRegistry {
        &self.type_handlers
    }

    pub fn type_handlers_mut(&mut self) -> &mut TypeHandlerRegistry {
        &mut self.type_handlers
    }

    pub fn object_factory(&self) -> &Arc<dyn ObjectFactory> {
        &self.object_factory
    }

    pub fn set_object_factory(&mut self, factory: Arc<dyn ObjectFactory>) {
        self.object_factory = factory;
    }

    /// Registers a type alias used by `javaType`/`type` attributes.
    pub fn register_alias(&mut self, name: impl Into<String>, kind: ValueKind) {
        self.aliases.insert(name.into().to_lowercase(), kind);
    }

    /// Resolves a declared type name. Unregistered names denote
    /// caller-defined object shapes and resolve to `Object`.
    pub fn resolve_alias(&self, name: &str) -> ValueKind {
        self.aliases
            .get(&name.to_lowercase())
            .copied()
            .unwrap_or(ValueKind::Object)
    }

    pub fn register_language(
        &mut self,
        name: impl Into<String>,
        driver: Arc<dyn LanguageDriver>,
    ) {
        let name = name.into();
        if self.default_language.is_none() {
            self.default_language = Some(name.clone());
        }
        self.languages.insert(name, driver);
    }

    pub fn set_default_language(&mut self, name: impl Into<String>) {
        self.default_language = Some(name.into());
    }

    pub fn language(&self, name: Option<&str>) -> Result<Arc<dyn LanguageDriver>> {
        let name = name
            .map(str::to_string)
            .or_else(|| self.default_language.clone())
            .ok_or_else(|| Error::parse("no language driver registered"))?;
        self.languages
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::parse(format!("unknown language driver `{name}`")))
    }

    /// Validates and appends an interceptor to the plugin chain.
    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) -> Result<()> {
        plugin::validate(interceptor.as_ref())?;
        self.interceptors.push(interceptor);
        Ok(())
    }

    pub fn interceptors(&self) -> &[Arc<dyn Interceptor>] {
        &self.interceptors
    }

    pub fn add_cache(&mut self, cache: Arc<Cache>) -> Result<()> {
        self.caches.put(cache.id().to_string(), cache)
    }

    pub fn has_cache(&self, id: &str) -> bool {
        self.caches.contains(id)
    }

    pub fn cache(&self, id: &str) -> Result<Arc<Cache>> {
        self.caches.get(id)
    }

    /// Points `namespace` at the region owned by `target`.
    pub fn add_cache_ref(&mut self, namespace: impl Into<String>, target: impl Into<String>) {
        self.cache_refs.insert(namespace.into(), target.into());
    }

    pub fn cache_ref_target(&self, namespace: &str) -> Option<&str> {
        self.cache_refs.get(namespace).map(String::as_str)
    }

    pub fn add_parameter_map(&mut self, map: Arc<ParameterMap>) -> Result<()> {
        self.parameter_maps.put(map.id().to_string(), map)
    }

    pub fn has_parameter_map(&self, id: &str) -> bool {
        self.parameter_maps.contains(id)
    }

    pub fn parameter_map(&self, id: &str) -> Result<Arc<ParameterMap>> {
        self.parameter_maps.get(id)
    }

    pub fn add_result_map(&mut self, map: Arc<ResultMap>) -> Result<()> {
        self.result_maps.put(map.id().to_string(), map)
    }

    pub fn has_result_map(&self, id: &str) -> bool {
        self.result_maps.contains(id)
    }

    pub fn result_map(&self, id: &str) -> Result<Arc<ResultMap>> {
        self.result_maps.get(id)
    }

    pub fn result_map_ids(&self) -> impl Iterator<Item = &str> {
        self.result_maps.keys()
    }

    pub fn add_mapped_statement(&mut self, ms: Arc<MappedStatement>) -> Result<()> {
        self.mapped_statements.put(ms.id().to_string(), ms)
    }

    pub fn has_mapped_statement(&self, id: &str) -> bool {
        self.mapped_statements.contains(id)
    }

    pub fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.mapped_statements
            .get(id)
            .map_err(|_| Error::binding(format!("mapped statement not found: {id}")))
    }

    pub fn mapped_statement_ids(&self) -> impl Iterator<Item = &str> {
        self.mapped_statements.keys()
    }

    pub fn add_key_generator(
        &mut self,
        id: impl Into<String>,
        generator: Arc<dyn KeyGenerator>,
    ) -> Result<()> {
        self.key_generators.put(id.into(), generator)
    }

    pub fn has_key_generator(&self, id: &str) -> bool {
        self.key_generators.contains(id)
    }

    pub fn key_generator(&self, id: &str) -> Result<Arc<dyn KeyGenerator>> {
        self.key_generators.get(id)
    }

    pub fn add_sql_fragment(&mut self, id: impl Into<String>, node: Arc<XNode>) -> Result<()> {
        self.sql_fragments.put(id.into(), node)
    }

    pub fn has_sql_fragment(&self, id: &str) -> bool {
        self.sql_fragments.contains(id)
    }

    pub fn sql_fragment(&self, id: &str) -> Result<Arc<XNode>> {
        self.sql_fragments.get(id)
    }

    /// Marks a mapper resource as loaded so it is parsed at most once.
    pub fn add_loaded_resource(&mut self, resource: impl Into<String>) -> bool {
        self.loaded_resources.insert(resource.into())
    }

    pub fn is_resource_loaded(&self, resource: &str) -> bool {
        self.loaded_resources.contains(resource)
    }

    pub fn add_pending_cache_ref(&mut self, pending: Arc<dyn PendingElement>) {
        self.pending_cache_refs.push(pending);
    }

    pub fn add_pending_result_map(&mut self, pending: Arc<dyn PendingElement>) {
        self.pending_result_maps.push(pending);
    }

    pub fn add_pending_statement(&mut self, pending: Arc<dyn PendingElement>) {
        self.pending_statements.push(pending);
    }

    pub fn add_pending_method(&mut self, pending: Arc<dyn PendingElement>) {
        self.pending_methods.push(pending);
    }

    /// Retries the pending queues until a pass makes no progress, leaving
    /// still-incomplete elements queued for a later attempt. Used between
    /// mapper documents, where a following document may supply the missing
    /// references.
    pub fn try_resolve_pending(&mut self) -> Result<()> {
        loop {
            let before = self.pending_len();
            if before == 0 {
                return Ok(());
            }

            self.retry_queue(Self::take_pending_cache_refs, Self::put_pending_cache_refs)?;
            self.retry_queue(Self::take_pending_result_maps, Self::put_pending_result_maps)?;
            self.retry_queue(Self::take_pending_statements, Self::put_pending_statements)?;
            self.retry_queue(Self::take_pending_methods, Self::put_pending_methods)?;

            if self.pending_len() == before {
                return Ok(());
            }
        }
    }

    /// Retries the four pending queues until a pass makes no progress.
    /// Whatever remains after the fixpoint fails as a parse error.
    pub fn resolve_pending(&mut self) -> Result<()> {
        self.try_resolve_pending()?;
        if self.pending_len() == 0 {
            return Ok(());
        }

        let unresolved: Vec<String> = self
            .pending_cache_refs
            .iter()
            .chain(&self.pending_result_maps)
            .chain(&self.pending_statements)
            .chain(&self.pending_methods)
            .map(|pending| pending.describe())
            .collect();
        Err(Error::parse(format!(
            "unresolved forward references: {}",
            unresolved.join(", ")
        )))
    }

    fn pending_len(&self) -> usize {
        self.pending_cache_refs.len()
            + self.pending_result_maps.len()
            + self.pending_statements.len()
            + self.pending_methods.len()
    }

    fn retry_queue(
        &mut self,
        take: fn(&mut Self) -> Vec<Arc<dyn PendingElement>>,
        put: fn(&mut Self, Vec<Arc<dyn PendingElement>>),
    ) -> Result<()> {
        let queue = take(self);
        let mut remaining = Vec::new();
        for pending in queue {
            match pending.resolve(self) {
                Ok(()) => {}
                Err(err) if err.is_incomplete_element() => remaining.push(pending),
                Err(err) => return Err(err),
            }
        }
        put(self, remaining);
        Ok(())
    }

    fn take_pending_cache_refs(&mut self) -> Vec<Arc<dyn PendingElement>> {
        std::mem::take(&mut self.pending_cache_refs)
    }

    fn put_pending_cache_refs(&mut self, queue: Vec<Arc<dyn PendingElement>>) {
        self.pending_cache_refs.extend(queue);
    }

    fn take_pending_result_maps(&mut self) -> Vec<Arc<dyn PendingElement>> {
        std::mem::take(&mut self.pending_result_maps)
    }

    fn put_pending_result_maps(&mut self, queue: Vec<Arc<dyn PendingElement>>) {
        self.pending_result_maps.extend(queue);
    }

    fn take_pending_statements(&mut self) -> Vec<Arc<dyn PendingElement>> {
        std::mem::take(&mut self.pending_statements)
    }

    fn put_pending_statements(&mut self, queue: Vec<Arc<dyn PendingElement>>) {
        self.pending_statements.extend(queue);
    }

    fn take_pending_methods(&mut self) -> Vec<Arc<dyn PendingElement>> {
        std::mem::take(&mut self.pending_methods)
    }

    fn put_pending_methods(&mut self, queue: Vec<Arc<dyn PendingElement>>) {
        self.pending_methods.extend(queue);
    }
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolution() {
        let config = Configuration::new();
        assert_eq!(config.resolve_alias("int"), ValueKind::Int);
        assert_eq!(config.resolve_alias("STRING"), ValueKind::String);
        // unregistered names denote user object shapes
        assert_eq!(config.resolve_alias("User"), ValueKind::Object);
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut config = Configuration::new();
        let cache = Arc::new(Cache::builder("app.UserMapper").build());
        config.add_cache(cache.clone()).unwrap();
        assert!(config.add_cache(cache).is_err());
    }

    struct NeverResolves;

    impl PendingElement for NeverResolves {
        fn resolve(&self, _config: &mut Configuration) -> Result<()> {
            Err(Error::incomplete_element("cache-ref `other` not found"))
        }

        fn describe(&self) -> String {
            "cache-ref `other`".to_string()
        }
    }

    struct ResolvesOnce;

    impl PendingElement for ResolvesOnce {
        fn resolve(&self, config: &mut Configuration) -> Result<()> {
            config.add_cache_ref("app.A", "app.B");
            Ok(())
        }

        fn describe(&self) -> String {
            "cache-ref `app.B`".to_string()
        }
    }

    #[test]
    fn pending_fixpoint_resolves_progressing_elements() {
        let mut config = Configuration::new();
        config.add_pending_cache_ref(Arc::new(ResolvesOnce));
        config.resolve_pending().unwrap();
        assert_eq!(config.cache_ref_target("app.A"), Some("app.B"));
    }

    #[test]
    fn pending_fixpoint_upgrades_stuck_elements() {
        let mut config = Configuration::new();
        config.add_pending_cache_ref(Arc::new(NeverResolves));
        let err = config.resolve_pending().unwrap_err();
        assert!(err.is_parse());
        assert!(err.to_string().contains("cache-ref `other`"));
    }
}
