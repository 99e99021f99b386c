use tessera_core::cache::{Cache, EvictionPolicy};
use tessera_core::driver::ResultSetType;
use tessera_core::exec::KeyGenerator;
use tessera_core::mapping::{
    Discriminator, MappedStatement, ParameterMap, ResultMap, ResultMapping, SqlCommandType,
    SqlSource, StatementType,
};
use tessera_core::{Configuration, Error, Result};

use std::sync::Arc;
use std::time::Duration;

/// Namespace-aware registration helper shared by the document builders and
/// the programmatic DSL: applies the current namespace to ids and
/// references, tracks the namespace's cache region, and assembles
/// result maps and mapped statements through the core builders.
pub struct BuilderAssistant {
    resource: String,
    namespace: String,
    current_cache: Option<Arc<Cache>>,
    unresolved_cache_ref: bool,
}

/// Everything a statement registration needs beyond its id, command and
/// source. Mirrors the attribute surface of the statement elements.
#[derive(Default)]
pub struct StatementSpec {
    pub statement_type: StatementType,
    pub parameter_map: Option<String>,
    pub result_map: Option<String>,
    pub result_type: Option<String>,
    pub result_set_type: Option<ResultSetType>,
    pub fetch_size: Option<u32>,
    pub timeout: Option<Duration>,
    pub flush_cache: Option<bool>,
    pub use_cache: Option<bool>,
    pub result_ordered: bool,
    pub dirty_select: bool,
    pub key_generator: Option<Arc<dyn KeyGenerator>>,
    pub key_property: Option<String>,
    pub key_column: Option<String>,
    pub result_sets: Option<String>,
    pub database_id: Option<String>,
}

impl BuilderAssistant {
    pub fn new(resource: impl Into<String>, namespace: impl Into<String>) -> BuilderAssistant {
        BuilderAssistant {
            resource: resource.into(),
            namespace: namespace.into(),
            current_cache: None,
            unresolved_cache_ref: false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Qualifies an id with the current namespace. References may already
    /// be dotted (cross-namespace); declarations must not be.
    pub fn apply_namespace(&self, id: &str, is_reference: bool) -> Result<String> {
        if is_reference {
            if id.contains('.') {
                return Ok(id.to_string());
            }
        } else if id.contains('.') {
            let prefix = format!("{}.", self.namespace);
            if let Some(rest) = id.strip_prefix(&prefix) {
                if !rest.contains('.') {
                    return Ok(id.to_string());
                }
            }
            return Err(Error::parse(format!(
                "declared id `{id}` must not be qualified with a namespace other than `{}`",
                self.namespace
            )));
        }
        Ok(format!("{}.{id}", self.namespace))
    }

    /// Installs an already-resolved cache region (used when a deferred
    /// element rebuilds its assistant from registry state).
    pub fn adopt_cache(&mut self, cache: Arc<Cache>) {
        self.current_cache = Some(cache);
        self.unresolved_cache_ref = false;
    }

    /// Marks the namespace's cache-ref as still unresolved, deferring its
    /// statements.
    pub fn mark_unresolved_cache_ref(&mut self) {
        self.unresolved_cache_ref = true;
    }

    /// Points this namespace at another namespace's cache region.
    pub fn use_cache_ref(&mut self, config: &mut Configuration, target: &str) -> Result<()> {
        config.add_cache_ref(self.namespace.clone(), target);
        match config.cache(target) {
            Ok(cache) => {
                self.current_cache = Some(cache);
                self.unresolved_cache_ref = false;
                Ok(())
            }
            Err(_) => {
                self.unresolved_cache_ref = true;
                Err(Error::incomplete_element(format!(
                    "cache-ref target namespace `{target}` has no cache yet"
                )))
            }
        }
    }

    /// Builds and registers this namespace's own cache region.
    #[allow(clippy::too_many_arguments)]
    pub fn use_new_cache(
        &mut self,
        config: &mut Configuration,
        eviction: EvictionPolicy,
        flush_interval: Option<Duration>,
        size: Option<usize>,
        read_write: bool,
        blocking: bool,
    ) -> Result<Arc<Cache>> {
        let cache = Arc::new(
            Cache::builder(self.namespace.clone())
                .eviction(eviction)
                .flush_interval(flush_interval)
                .size(size)
                .read_write(read_write)
                .blocking(blocking)
                .build(),
        );
        config.add_cache(cache.clone())?;
        self.current_cache = Some(cache.clone());
        self.unresolved_cache_ref = false;
        Ok(cache)
    }

    pub fn add_parameter_map(
        &self,
        config: &mut Configuration,
        id: &str,
        mappings: Vec<tessera_core::mapping::ParameterMapping>,
    ) -> Result<Arc<ParameterMap>> {
        let id = self.apply_namespace(id, false)?;
        let map = Arc::new(ParameterMap::new(id, mappings));
        config.add_parameter_map(map.clone())?;
        Ok(map)
    }

    /// Builds a result map, folding in an extended parent when declared.
    /// The parent must already be registered; otherwise the caller queues
    /// the incomplete element and retries.
    #[allow(clippy::too_many_arguments)]
    pub fn add_result_map(
        &self,
        config: &mut Configuration,
        id: &str,
        type_name: &str,
        extends: Option<&str>,
        discriminator: Option<Discriminator>,
        mappings: Vec<ResultMapping>,
        auto_mapping: Option<bool>,
    ) -> Result<Arc<ResultMap>> {
        let id = self.apply_namespace(id, false)?;
        let value_kind = config.resolve_alias(type_name);

        let mut all_mappings = mappings;
        if let Some(extends) = extends {
            let extends = self.apply_namespace(extends, true)?;
            if !config.has_result_map(&extends) {
                return Err(Error::incomplete_element(format!(
                    "extended result map `{extends}` not found"
                )));
            }
            let parent = config.result_map(&extends)?;

            // Child mappings shadow the parent's by property; declaring any
            // constructor mapping suppresses the parent's constructor.
            let child_declares_constructor =
                all_mappings.iter().any(ResultMapping::is_constructor);
            let inherited: Vec<ResultMapping> = parent
                .mappings()
                .iter()
                .filter(|parent_mapping| {
                    if child_declares_constructor && parent_mapping.is_constructor() {
                        return false;
                    }
                    !all_mappings.iter().any(|child| {
                        child.property().is_some() && child.property() == parent_mapping.property()
                    })
                })
                .cloned()
                .collect();
            all_mappings.extend(inherited);
        }

        let map = Arc::new(
            ResultMap::builder(id, type_name, value_kind)
                .mappings(all_mappings)
                .discriminator(discriminator)
                .auto_mapping(auto_mapping)
                .build()?,
        );
        config.add_result_map(map.clone())?;
        Ok(map)
    }

    /// Registers a mapped statement, resolving map references through the
    /// current namespace. An unresolved cache-ref defers the statement.
    pub fn add_mapped_statement(
        &self,
        config: &mut Configuration,
        id: &str,
        command: SqlCommandType,
        sql_source: Arc<dyn SqlSource>,
        spec: StatementSpec,
    ) -> Result<Arc<MappedStatement>> {
        if self.unresolved_cache_ref {
            return Err(Error::incomplete_element(format!(
                "statement `{id}` waits for an unresolved cache-ref in `{}`",
                self.namespace
            )));
        }

        let id = self.apply_namespace(id, false)?;

        let parameter_map = spec
            .parameter_map
            .as_deref()
            .map(|reference| {
                let reference = self.apply_namespace(reference, true)?;
                config.parameter_map(&reference).map_err(|_| {
                    Error::incomplete_element(format!("parameter map `{reference}` not found"))
                })
            })
            .transpose()?;

        let result_maps = self.resolve_result_maps(
            config,
            &id,
            spec.result_map.as_deref(),
            spec.result_type.as_deref(),
        )?;

        let settings = config.settings();
        let is_select = command == SqlCommandType::Select;
        let statement = MappedStatement::builder(id.clone(), command, sql_source)
            .resource(self.resource.clone())
            .statement_type(spec.statement_type)
            .parameter_map(parameter_map)
            .result_maps(result_maps)
            .result_set_type(spec.result_set_type)
            .fetch_size(spec.fetch_size.or(settings.default_fetch_size))
            .timeout(spec.timeout.or(settings.default_statement_timeout))
            .flush_cache_required(spec.flush_cache.unwrap_or(!is_select))
            .use_cache(spec.use_cache.unwrap_or(is_select))
            .result_ordered(spec.result_ordered)
            .dirty_select(spec.dirty_select)
            .cache(self.current_cache.clone())
            .key_generator(spec.key_generator)
            .key_properties(split_list(spec.key_property.as_deref()))
            .key_columns(split_list(spec.key_column.as_deref()))
            .result_sets(split_list(spec.result_sets.as_deref()))
            .database_id(spec.database_id)
            .build()?;

        let statement = Arc::new(statement);
        config.add_mapped_statement(statement.clone())?;
        Ok(statement)
    }

    /// Comma-separated result map references resolve to registered maps;
    /// with only a result type, a synthetic inline map is built.
    fn resolve_result_maps(
        &self,
        config: &mut Configuration,
        statement_id: &str,
        result_map: Option<&str>,
        result_type: Option<&str>,
    ) -> Result<Vec<Arc<ResultMap>>> {
        if let Some(references) = result_map {
            let mut maps = Vec::new();
            for reference in references.split(',').map(str::trim).filter(|r| !r.is_empty()) {
                let reference = self.apply_namespace(reference, true)?;
                maps.push(config.result_map(&reference).map_err(|_| {
                    Error::incomplete_element(format!("result map `{reference}` not found"))
                })?);
            }
            return Ok(maps);
        }

        if let Some(type_name) = result_type {
            let inline_id = format!("{statement_id}-Inline");
            let map = Arc::new(
                ResultMap::builder(inline_id, type_name, config.resolve_alias(type_name))
                    .build()?,
            );
            config.add_result_map(map.clone())?;
            return Ok(vec![map]);
        }

        Ok(vec![])
    }

    /// Builds a discriminator, qualifying each case's result-map id.
    pub fn build_discriminator(
        &self,
        mapping: ResultMapping,
        cases: Vec<(String, String)>,
    ) -> Result<Discriminator> {
        let mut builder = Discriminator::builder(mapping);
        for (value, result_map_id) in cases {
            builder = builder.case(value, self.apply_namespace(&result_map_id, true)?);
        }
        Ok(builder.build())
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|list| {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_application() {
        let assistant = BuilderAssistant::new("mapper/User.xml", "app.UserMapper");
        assert_eq!(
            assistant.apply_namespace("findById", false).unwrap(),
            "app.UserMapper.findById"
        );
        assert_eq!(
            assistant.apply_namespace("other.Mapper.x", true).unwrap(),
            "other.Mapper.x"
        );
        assert_eq!(
            assistant.apply_namespace("short", true).unwrap(),
            "app.UserMapper.short"
        );
        assert!(assistant
            .apply_namespace("other.Mapper.x", false)
            .is_err());
    }

    #[test]
    fn extension_unions_with_child_priority() {
        let mut config = Configuration::new();
        let assistant = BuilderAssistant::new("test", "app.M");

        let parent_mappings = vec![
            ResultMapping::builder()
                .property("id")
                .column(Some("id".to_string()))
                .flags(vec![tessera_core::mapping::ResultFlag::Id])
                .build(),
            ResultMapping::builder()
                .property("name")
                .column(Some("parent_name".to_string()))
                .build(),
        ];
        assistant
            .add_result_map(&mut config, "parent", "map", None, None, parent_mappings, None)
            .unwrap();

        let child_mappings = vec![ResultMapping::builder()
            .property("name")
            .column(Some("child_name".to_string()))
            .build()];
        let child = assistant
            .add_result_map(
                &mut config,
                "child",
                "map",
                Some("parent"),
                None,
                child_mappings,
                None,
            )
            .unwrap();

        // child `name` wins, parent `id` is inherited
        assert_eq!(child.mappings().len(), 2);
        let name = child
            .mappings()
            .iter()
            .find(|m| m.property() == Some("name"))
            .unwrap();
        assert_eq!(name.column(), Some("child_name"));
        assert!(child.mapped_columns().contains("ID"));
    }

    #[test]
    fn extending_missing_parent_is_incomplete() {
        let mut config = Configuration::new();
        let assistant = BuilderAssistant::new("test", "app.M");
        let err = assistant
            .add_result_map(&mut config, "child", "map", Some("ghost"), None, vec![], None)
            .unwrap_err();
        assert!(err.is_incomplete_element());
    }
}
