use crate::mapper::MapperDocumentBuilder;

use tessera_core::driver::{DataSource, TransactionFactory};
use tessera_core::meta::ObjectFactory;
use tessera_core::plugin::Interceptor;
use tessera_core::type_handler::TypeHandler;
use tessera_core::xml::XNode;
use tessera_core::{Configuration, Error, Result};

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::warn;

/// Resolves classpath-style resource paths to their contents. Supplied by
/// the embedding application; the builder uses it for `<properties
/// resource="..."/>` and `<mappers><mapper resource="..."/></mappers>`.
pub trait Resources: Send + Sync {
    fn load(&self, path: &str) -> Result<String>;
}

/// Derives a database id from the live data source, selecting which
/// `databaseId`-annotated statements apply.
pub trait DatabaseIdProvider: Send + Sync {
    fn database_id(&self, data_source: &dyn DataSource) -> Result<Option<String>>;
}

const CHILD_ORDER: &[&str] = &[
    "properties",
    "settings",
    "typeAliases",
    "plugins",
    "objectFactory",
    "objectWrapperFactory",
    "reflectorFactory",
    "environments",
    "databaseIdProvider",
    "typeHandlers",
    "mappers",
];

/// Builds a configuration from a `<configuration>` document.
///
/// Named components the document references (interceptors, transaction
/// factories, data sources, type handlers, providers) are registered on the
/// builder ahead of the parse, standing in for class-name instantiation.
pub struct ConfigBuilder {
    resources: Option<Arc<dyn Resources>>,
    interceptors: IndexMap<String, Arc<dyn Interceptor>>,
    object_factories: IndexMap<String, Arc<dyn ObjectFactory>>,
    transaction_factories: IndexMap<String, Arc<dyn TransactionFactory>>,
    data_sources: IndexMap<String, Arc<dyn DataSource>>,
    database_id_providers: IndexMap<String, Arc<dyn DatabaseIdProvider>>,
    type_handlers: IndexMap<String, Arc<dyn TypeHandler>>,
}

impl ConfigBuilder {
    pub fn new() -> ConfigBuilder {
        ConfigBuilder {
            resources: None,
            interceptors: IndexMap::new(),
            object_factories: IndexMap::new(),
            transaction_factories: IndexMap::new(),
            data_sources: IndexMap::new(),
            database_id_providers: IndexMap::new(),
            type_handlers: IndexMap::new(),
        }
    }

    pub fn resources(mut self, resources: Arc<dyn Resources>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn interceptor(mut self, name: impl Into<String>, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.insert(name.into(), interceptor);
        self
    }

    pub fn object_factory(mut self, name: impl Into<String>, factory: Arc<dyn ObjectFactory>) -> Self {
        self.object_factories.insert(name.into(), factory);
        self
    }

    pub fn transaction_factory(
        mut self,
        name: impl Into<String>,
        factory: Arc<dyn TransactionFactory>,
    ) -> Self {
        self.transaction_factories.insert(name.into(), factory);
        self
    }

    pub fn data_source(mut self, name: impl Into<String>, data_source: Arc<dyn DataSource>) -> Self {
        self.data_sources.insert(name.into(), data_source);
        self
    }

    pub fn database_id_provider(
        mut self,
        name: impl Into<String>,
        provider: Arc<dyn DatabaseIdProvider>,
    ) -> Self {
        self.database_id_providers.insert(name.into(), provider);
        self
    }

    pub fn type_handler(mut self, name: impl Into<String>, handler: Arc<dyn TypeHandler>) -> Self {
        self.type_handlers.insert(name.into(), handler);
        self
    }

    pub fn parse(&self, xml: &str) -> Result<Configuration> {
        let root = XNode::parse_document(xml)?;
        if root.name() != "configuration" {
            return Err(Error::parse(format!(
                "expected <configuration> root, found <{}>",
                root.name()
            )));
        }

        let mut config = crate::configuration();
        for (name, handler) in &self.type_handlers {
            config
                .type_handlers_mut()
                .register_named(name.clone(), handler.clone());
        }

        // Children are accepted only in their canonical order.
        let mut cursor = 0usize;
        for child in root.elements() {
            let position = CHILD_ORDER
                .iter()
                .position(|known| *known == child.name())
                .ok_or_else(|| {
                    Error::parse(format!(
                        "unknown element <{}> in <configuration>",
                        child.name()
                    ))
                })?;
            if position < cursor {
                return Err(Error::parse(format!(
                    "element <{}> is out of order in <configuration>",
                    child.name()
                )));
            }
            cursor = position;

            match child.name() {
                "properties" => self.parse_properties(&mut config, child)?,
                "settings" => {
                    for setting in child.elements() {
                        if setting.name() != "setting" {
                            return Err(Error::parse(format!(
                                "unexpected element <{}> inside <settings>",
                                setting.name()
                            )));
                        }
                        let name = setting.attr_required("name")?;
                        let value = setting.attr_required("value")?;
                        config.settings_mut().apply(name, value)?;
                    }
                }
                "typeAliases" => {
                    for alias in child.elements() {
                        match alias.name() {
                            "typeAlias" => {
                                let name = alias.attr_required("alias")?.to_string();
                                let target = alias.attr_required("type")?;
                                let kind = config.resolve_alias(target);
                                config.register_alias(name, kind);
                            }
                            other => {
                                return Err(Error::parse(format!(
                                    "unsupported element <{other}> inside <typeAliases>"
                                )))
                            }
                        }
                    }
                }
                "plugins" => {
                    for plugin in child.elements() {
                        if plugin.name() != "plugin" {
                            return Err(Error::parse(format!(
                                "unexpected element <{}> inside <plugins>",
                                plugin.name()
                            )));
                        }
                        let name = plugin.attr_required("interceptor")?;
                        let interceptor = self.interceptors.get(name).cloned().ok_or_else(|| {
                            Error::parse(format!("no interceptor registered as `{name}`"))
                        })?;
                        config.add_interceptor(interceptor)?;
                    }
                }
                "objectFactory" => {
                    let name = child.attr_required("type")?;
                    let factory = self.object_factories.get(name).cloned().ok_or_else(|| {
                        Error::parse(format!("no object factory registered as `{name}`"))
                    })?;
                    config.set_object_factory(factory);
                }
                "objectWrapperFactory" | "reflectorFactory" => {
                    // Value navigation has no wrapper/reflector indirection.
                    warn!(element = child.name(), "element has no effect and is ignored");
                }
                "environments" => self.parse_environments(&mut config, child)?,
                "databaseIdProvider" => {
                    let name = child.attr_required("type")?;
                    let provider =
                        self.database_id_providers.get(name).cloned().ok_or_else(|| {
                            Error::parse(format!("no database id provider registered as `{name}`"))
                        })?;
                    let environment = config.environment().ok_or_else(|| {
                        Error::parse("databaseIdProvider requires an environment")
                    })?;
                    let database_id =
                        provider.database_id(environment.data_source().as_ref())?;
                    config.set_database_id(database_id);
                }
                "typeHandlers" => {
                    for handler in child.elements() {
                        if handler.name() != "typeHandler" {
                            return Err(Error::parse(format!(
                                "unsupported element <{}> inside <typeHandlers>",
                                handler.name()
                            )));
                        }
                        let name = handler.attr_required("handler")?;
                        let registered = self.type_handlers.get(name).cloned().ok_or_else(|| {
                            Error::parse(format!("no type handler registered as `{name}`"))
                        })?;
                        let kind = config.resolve_alias(handler.attr_required("javaType")?);
                        match handler.attr("jdbcType") {
                            Some(sql_type) => {
                                let sql_type = tessera_core::ty::SqlType::parse(sql_type)?;
                                config
                                    .type_handlers_mut()
                                    .register_pair(kind, sql_type, registered);
                            }
                            None => config.type_handlers_mut().register_kind(kind, registered),
                        }
                    }
                }
                "mappers" => self.parse_mappers(&mut config, child)?,
                _ => unreachable!("validated against CHILD_ORDER"),
            }
        }

        config.resolve_pending()?;
        Ok(config)
    }

    fn parse_properties(&self, config: &mut Configuration, node: &XNode) -> Result<()> {
        // Loaded files first, inline pairs override.
        if let Some(path) = node.attr("resource").or_else(|| node.attr("url")) {
            let resources = self.resources.as_ref().ok_or_else(|| {
                Error::parse("properties resource requires a resources resolver")
            })?;
            let contents = resources.load(path)?;
            for (name, value) in parse_properties_file(&contents) {
                config.set_variable(name, value);
            }
        }
        for property in node.elements() {
            if property.name() != "property" {
                return Err(Error::parse(format!(
                    "unexpected element <{}> inside <properties>",
                    property.name()
                )));
            }
            config.set_variable(
                property.attr_required("name")?.to_string(),
                property.attr_required("value")?.to_string(),
            );
        }
        Ok(())
    }

    fn parse_environments(&self, config: &mut Configuration, node: &XNode) -> Result<()> {
        let default = node.attr_required("default")?;
        for environment in node.elements() {
            if environment.name() != "environment" {
                return Err(Error::parse(format!(
                    "unexpected element <{}> inside <environments>",
                    environment.name()
                )));
            }
            let id = environment.attr_required("id")?;
            if id != default {
                continue;
            }

            let tx_node = environment.element("transactionManager").ok_or_else(|| {
                Error::parse(format!("environment `{id}` declares no transactionManager"))
            })?;
            let tx_name = tx_node.attr_required("type")?;
            let transaction_factory = self
                .transaction_factories
                .get(tx_name)
                .cloned()
                .ok_or_else(|| {
                    Error::parse(format!("no transaction factory registered as `{tx_name}`"))
                })?;

            let ds_node = environment.element("dataSource").ok_or_else(|| {
                Error::parse(format!("environment `{id}` declares no dataSource"))
            })?;
            let ds_name = ds_node.attr_required("type")?;
            let data_source = self.data_sources.get(ds_name).cloned().ok_or_else(|| {
                Error::parse(format!("no data source registered as `{ds_name}`"))
            })?;

            config.set_environment(tessera_core::mapping::Environment::new(
                id,
                transaction_factory,
                data_source,
            ));
            return Ok(());
        }
        Err(Error::parse(format!(
            "default environment `{default}` is not declared"
        )))
    }

    fn parse_mappers(&self, config: &mut Configuration, node: &XNode) -> Result<()> {
        for mapper in node.elements() {
            match mapper.name() {
                "mapper" => {
                    let path = mapper
                        .attr("resource")
                        .or_else(|| mapper.attr("url"))
                        .ok_or_else(|| {
                            Error::parse(
                                "mapper declarations require a resource or url attribute",
                            )
                        })?;
                    let resources = self.resources.as_ref().ok_or_else(|| {
                        Error::parse("mapper resources require a resources resolver")
                    })?;
                    let xml = resources.load(path)?;
                    MapperDocumentBuilder::new(path).parse(config, &xml)?;
                }
                other => {
                    return Err(Error::parse(format!(
                        "unsupported element <{other}> inside <mappers>"
                    )))
                }
            }
        }
        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Minimal `.properties` parsing: `name=value` lines, `#`/`!` comments.
fn parse_properties_file(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            line.split_once('=')
                .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enforces_child_order() {
        let builder = ConfigBuilder::new();
        let err = builder
            .parse(
                r#"<configuration>
                     <settings><setting name="cacheEnabled" value="false"/></settings>
                     <properties><property name="a" value="b"/></properties>
                   </configuration>"#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn applies_settings_and_properties() {
        let builder = ConfigBuilder::new();
        let config = builder
            .parse(
                r#"<configuration>
                     <properties><property name="schema" value="app"/></properties>
                     <settings>
                       <setting name="mapUnderscoreToCamelCase" value="true"/>
                       <setting name="cacheEnabled" value="false"/>
                     </settings>
                   </configuration>"#,
            )
            .unwrap();
        assert!(config.settings().map_underscore_to_camel_case);
        assert!(!config.settings().cache_enabled);
        assert_eq!(config.variables().get("schema").map(String::as_str), Some("app"));
    }

    #[test]
    fn unknown_settings_fail_at_parse_time() {
        let builder = ConfigBuilder::new();
        let err = builder
            .parse(
                r#"<configuration>
                     <settings><setting name="notASetting" value="true"/></settings>
                   </configuration>"#,
            )
            .unwrap_err();
        assert!(err.to_string().contains("notASetting"));
    }

    #[test]
    fn properties_file_parsing() {
        let parsed = parse_properties_file("# comment\nuser=app\n\npass = secret\n");
        assert_eq!(
            parsed,
            vec![
                ("user".to_string(), "app".to_string()),
                ("pass".to_string(), "secret".to_string()),
            ]
        );
    }
}
