use crate::assistant::BuilderAssistant;
use crate::statement::StatementDocumentBuilder;

use tessera_core::cache::EvictionPolicy;
use tessera_core::config::PendingElement;
use tessera_core::mapping::{
    Discriminator, ParameterMapping, ParamMode, ResultFlag, ResultMap, ResultMapping,
};
use tessera_core::ty::{SqlType, ValueKind};
use tessera_core::xml::XNode;
use tessera_core::{Configuration, Error, Result};

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Compiles one mapper document into registry entries: cache region,
/// cache-ref, parameter maps, result maps, SQL fragments, and mapped
/// statements. Forward references queue as pending elements and retry.
pub struct MapperDocumentBuilder {
    resource: String,
}

impl MapperDocumentBuilder {
    pub fn new(resource: impl Into<String>) -> MapperDocumentBuilder {
        MapperDocumentBuilder {
            resource: resource.into(),
        }
    }

    pub fn parse(&self, config: &mut Configuration, xml: &str) -> Result<()> {
        if !config.add_loaded_resource(self.resource.clone()) {
            return Ok(());
        }

        let root = XNode::parse_document(xml)?;
        if root.name() != "mapper" {
            return Err(Error::parse(format!(
                "expected <mapper> root, found <{}>",
                root.name()
            )));
        }
        let namespace = root.attr_required("namespace")?.to_string();
        if namespace.is_empty() {
            return Err(Error::parse("mapper namespace must not be empty"));
        }

        let mut assistant = BuilderAssistant::new(self.resource.clone(), namespace.clone());

        // Element kinds process in a fixed order independent of document
        // order: the cache region must exist before statements bind to it,
        // and fragments before anything includes them.
        for node in root.elements() {
            if !matches!(
                node.name(),
                "cache-ref"
                    | "cache"
                    | "parameterMap"
                    | "resultMap"
                    | "sql"
                    | "select"
                    | "insert"
                    | "update"
                    | "delete"
            ) {
                return Err(Error::parse(format!(
                    "unknown element <{}> in mapper `{namespace}`",
                    node.name()
                )));
            }
        }

        for node in root.elements().filter(|node| node.name() == "cache-ref") {
            let target = node.attr_required("namespace")?.to_string();
            if let Err(err) = assistant.use_cache_ref(config, &target) {
                if err.is_incomplete_element() {
                    config.add_pending_cache_ref(Arc::new(PendingCacheRef {
                        namespace: namespace.clone(),
                        target,
                    }));
                } else {
                    return Err(err);
                }
            }
        }

        for node in root.elements().filter(|node| node.name() == "cache") {
            self.parse_cache(config, &mut assistant, node)?;
        }

        for node in root.elements().filter(|node| node.name() == "parameterMap") {
            self.parse_parameter_map(config, &assistant, node)?;
        }

        for node in root.elements().filter(|node| node.name() == "resultMap") {
            if let Err(err) = parse_result_map_node(config, &assistant, node, None) {
                if err.is_incomplete_element() {
                    config.add_pending_result_map(Arc::new(PendingResultMap {
                        resource: self.resource.clone(),
                        namespace: namespace.clone(),
                        node: node.clone(),
                    }));
                } else {
                    return Err(err);
                }
            }
        }

        for node in root.elements().filter(|node| node.name() == "sql") {
            self.parse_sql_fragment(config, &assistant, node)?;
        }

        for node in root.elements().filter(|node| {
            matches!(node.name(), "select" | "insert" | "update" | "delete")
        }) {
            let builder = StatementDocumentBuilder::new(&assistant);
            if let Err(err) = builder.parse(config, node) {
                if err.is_incomplete_element() {
                    config.add_pending_statement(Arc::new(PendingStatement {
                        resource: self.resource.clone(),
                        namespace: namespace.clone(),
                        node: node.clone(),
                    }));
                } else {
                    return Err(err);
                }
            }
        }

        // A later document may satisfy what is still missing; the final
        // fixpoint runs when the configuration build completes.
        config.try_resolve_pending()
    }

    fn parse_cache(
        &self,
        config: &mut Configuration,
        assistant: &mut BuilderAssistant,
        node: &XNode,
    ) -> Result<()> {
        if let Some(kind) = node.attr("type") {
            if !kind.eq_ignore_ascii_case("PERPETUAL") {
                return Err(Error::parse(format!(
                    "custom cache implementations are not supported: `{kind}`"
                )));
            }
        }
        let eviction = node
            .attr("eviction")
            .map(EvictionPolicy::parse)
            .transpose()?
            .unwrap_or(EvictionPolicy::Lru);
        let flush_interval = node
            .attr("flushInterval")
            .map(|raw| {
                raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                    Error::parse(format!("cache flushInterval expects millis, got `{raw}`"))
                })
            })
            .transpose()?;
        let size = node
            .attr("size")
            .map(|raw| {
                raw.parse::<usize>()
                    .map_err(|_| Error::parse(format!("cache size expects a number, got `{raw}`")))
            })
            .transpose()?;
        let read_write = !matches!(node.attr("readOnly"), Some("true"));
        let blocking = matches!(node.attr("blocking"), Some("true"));

        assistant.use_new_cache(config, eviction, flush_interval, size, read_write, blocking)?;
        Ok(())
    }

    fn parse_parameter_map(
        &self,
        config: &mut Configuration,
        assistant: &BuilderAssistant,
        node: &XNode,
    ) -> Result<()> {
        let id = node.attr_required("id")?;
        let mut mappings = Vec::new();
        for parameter in node.elements() {
            if parameter.name() != "parameter" {
                return Err(Error::parse(format!(
                    "unexpected element <{}> inside <parameterMap>",
                    parameter.name()
                )));
            }
            let mut builder =
                ParameterMapping::builder(parameter.attr_required("property")?.to_string());
            if let Some(kind) = parameter.attr("javaType") {
                builder = builder.value_kind(config.resolve_alias(kind));
            }
            builder = builder
                .sql_type(parameter.attr("jdbcType").map(SqlType::parse).transpose()?)
                .mode(
                    parameter
                        .attr("mode")
                        .map(ParamMode::parse)
                        .transpose()?
                        .unwrap_or_default(),
                )
                .numeric_scale(
                    parameter
                        .attr("numericScale")
                        .map(|raw| {
                            raw.parse::<u32>().map_err(|_| {
                                Error::parse(format!("invalid numericScale `{raw}`"))
                            })
                        })
                        .transpose()?,
                )
                .type_handler(
                    parameter
                        .attr("typeHandler")
                        .map(|name| config.type_handlers().named(name))
                        .transpose()?,
                )
                .result_map_id(parameter.attr("resultMap").map(str::to_string));
            mappings.push(builder.build());
        }
        assistant.add_parameter_map(config, id, mappings)?;
        Ok(())
    }

    fn parse_sql_fragment(
        &self,
        config: &mut Configuration,
        assistant: &BuilderAssistant,
        node: &XNode,
    ) -> Result<()> {
        if let (Some(current), declared) = (config.database_id(), node.attr("databaseId")) {
            match declared {
                Some(declared) if declared != current => return Ok(()),
                None => {
                    let id = assistant.apply_namespace(node.attr_required("id")?, false)?;
                    if config.has_sql_fragment(&id) {
                        return Ok(());
                    }
                }
                _ => {}
            }
        } else if node.attr("databaseId").is_some() {
            return Ok(());
        }

        let id = assistant.apply_namespace(node.attr_required("id")?, false)?;
        config.add_sql_fragment(id, Arc::new(node.clone()))
    }
}

/// Parses a `<resultMap>` element (or an inline association/collection/case
/// body). `inherited` carries the enclosing map's mappings for
/// discriminator cases.
pub(crate) fn parse_result_map_node(
    config: &mut Configuration,
    assistant: &BuilderAssistant,
    node: &XNode,
    inline: Option<InlineContext<'_>>,
) -> Result<Arc<ResultMap>> {
    let id = match (&inline, node.attr("id")) {
        (Some(ctx), _) => ctx.id.clone(),
        (None, Some(id)) => id.to_string(),
        (None, None) => return Err(Error::parse("<resultMap> requires an id")),
    };

    let type_name = node
        .attr("type")
        .or_else(|| node.attr("ofType"))
        .or_else(|| node.attr("resultType"))
        .or_else(|| node.attr("javaType"))
        .map(str::to_string)
        .or_else(|| inline.as_ref().map(|ctx| ctx.type_name.clone()))
        .ok_or_else(|| Error::parse(format!("result map `{id}` declares no type")))?;

    let mut mappings: Vec<ResultMapping> = inline
        .as_ref()
        .map(|ctx| ctx.inherited.to_vec())
        .unwrap_or_default();
    let mut discriminator_node = None;

    for child in node.elements() {
        match child.name() {
            "constructor" => {
                for arg in child.elements() {
                    let mut flags = vec![ResultFlag::Constructor];
                    match arg.name() {
                        "idArg" => flags.push(ResultFlag::Id),
                        "arg" => {}
                        other => {
                            return Err(Error::parse(format!(
                                "unexpected element <{other}> inside <constructor>"
                            )))
                        }
                    }
                    mappings.push(build_result_mapping(config, assistant, arg, &id, flags)?);
                }
            }
            "id" => mappings.push(build_result_mapping(
                config,
                assistant,
                child,
                &id,
                vec![ResultFlag::Id],
            )?),
            "result" | "association" | "collection" => {
                mappings.push(build_result_mapping(config, assistant, child, &id, vec![])?)
            }
            "discriminator" => {
                if discriminator_node.is_some() {
                    return Err(Error::parse(format!(
                        "result map `{id}` declares more than one discriminator"
                    )));
                }
                discriminator_node = Some(child.clone());
            }
            other => {
                return Err(Error::parse(format!(
                    "unexpected element <{other}> inside <resultMap>"
                )))
            }
        }
    }

    // Cases inherit the enclosing mapping list, so the discriminator
    // compiles after every other child.
    let discriminator = discriminator_node
        .map(|child| parse_discriminator(config, assistant, &child, &id, &type_name, &mappings))
        .transpose()?;

    let auto_mapping = match node.attr("autoMapping") {
        Some("true") => Some(true),
        Some("false") => Some(false),
        Some(other) => {
            return Err(Error::parse(format!(
                "autoMapping expects true/false, got `{other}`"
            )))
        }
        None => None,
    };

    assistant.add_result_map(
        config,
        &id,
        &type_name,
        node.attr("extends"),
        discriminator,
        mappings,
        auto_mapping,
    )
}

pub(crate) struct InlineContext<'a> {
    pub id: String,
    pub type_name: String,
    pub inherited: &'a [ResultMapping],
}

fn build_result_mapping(
    config: &mut Configuration,
    assistant: &BuilderAssistant,
    node: &XNode,
    parent_id: &str,
    flags: Vec<ResultFlag>,
) -> Result<ResultMapping> {
    let property = node
        .attr("property")
        .or_else(|| node.attr("name"))
        .map(str::to_string);

    let mut builder = ResultMapping::builder().flags(flags);
    if let Some(property) = &property {
        builder = builder.property(property.clone());
    }

    let (column, composites) = split_composites(node.attr("column"))?;
    builder = builder
        .column(column)
        .composites(composites)
        .sql_type(node.attr("jdbcType").map(SqlType::parse).transpose()?)
        .type_handler(
            node.attr("typeHandler")
                .map(|name| config.type_handlers().named(name))
                .transpose()?,
        )
        .column_prefix(node.attr("columnPrefix").map(str::to_string))
        .result_set(node.attr("resultSet").map(str::to_string))
        .foreign_column(node.attr("foreignColumn").map(str::to_string));

    // For collections, `javaType` names the container (a list unless
    // overridden); `ofType` names the element and only feeds the nested
    // map's type.
    if node.name() == "collection" {
        builder = builder.value_kind(
            node.attr("javaType")
                .map(|kind| config.resolve_alias(kind))
                .unwrap_or(ValueKind::List),
        );
    } else if let Some(kind) = node.attr("javaType").or_else(|| node.attr("ofType")) {
        builder = builder.value_kind(config.resolve_alias(kind));
    }

    if let Some(not_null) = node.attr("notNullColumn") {
        let columns: HashSet<String> = not_null
            .split(',')
            .map(|column| column.trim().to_uppercase())
            .filter(|column| !column.is_empty())
            .collect();
        builder = builder.not_null_columns(columns);
    }

    let lazy = match node.attr("fetchType") {
        Some("lazy") => true,
        Some("eager") => false,
        Some(other) => {
            return Err(Error::parse(format!(
                "fetchType expects lazy/eager, got `{other}`"
            )))
        }
        None => config.settings().lazy_loading_enabled,
    };
    builder = builder.lazy(lazy);

    if let Some(select) = node.attr("select") {
        builder = builder.nested_query_id(Some(assistant.apply_namespace(select, true)?));
    } else if let Some(result_map) = node.attr("resultMap") {
        builder = builder.nested_result_map_id(Some(assistant.apply_namespace(result_map, true)?));
    } else if matches!(node.name(), "association" | "collection")
        && node.elements().next().is_some()
    {
        // Inline nested mapping: compile an anonymous result map.
        let property = property.as_deref().unwrap_or("anonymous");
        let inline_id = format!("{parent_id}_{}[{property}]", node.name());
        let type_name = node
            .attr("javaType")
            .or_else(|| node.attr("ofType"))
            .unwrap_or("object")
            .to_string();
        let nested = parse_result_map_node(
            config,
            assistant,
            node,
            Some(InlineContext {
                id: inline_id,
                type_name,
                inherited: &[],
            }),
        )?;
        builder = builder.nested_result_map_id(Some(nested.id().to_string()));
    }

    Ok(builder.build())
}

fn parse_discriminator(
    config: &mut Configuration,
    assistant: &BuilderAssistant,
    node: &XNode,
    parent_id: &str,
    parent_type: &str,
    enclosing: &[ResultMapping],
) -> Result<Discriminator> {
    let column = node.attr_required("column")?.to_string();
    let mut mapping = ResultMapping::builder().column(Some(column));
    if let Some(kind) = node.attr("javaType") {
        mapping = mapping.value_kind(config.resolve_alias(kind));
    }
    mapping = mapping
        .sql_type(node.attr("jdbcType").map(SqlType::parse).transpose()?)
        .type_handler(
            node.attr("typeHandler")
                .map(|name| config.type_handlers().named(name))
                .transpose()?,
        );

    let mut cases = Vec::new();
    for case in node.elements() {
        if case.name() != "case" {
            return Err(Error::parse(format!(
                "unexpected element <{}> inside <discriminator>",
                case.name()
            )));
        }
        let value = case.attr_required("value")?.to_string();

        let result_map_id = match case.attr("resultMap") {
            Some(reference) => reference.to_string(),
            None => {
                // Synthetic per-case map inheriting the enclosing mappings.
                let synthetic_id = format!("{parent_id}-{value}");
                let type_name = case.attr("type").unwrap_or(parent_type).to_string();
                let synthetic = parse_result_map_node(
                    config,
                    assistant,
                    case,
                    Some(InlineContext {
                        id: synthetic_id,
                        type_name,
                        inherited: enclosing,
                    }),
                )?;
                synthetic.id().to_string()
            }
        };
        cases.push((value, result_map_id));
    }

    assistant.build_discriminator(mapping.build(), cases)
}

/// Parses composite column syntax `{prop1=col1,prop2=col2}` into
/// sub-mappings; a plain column passes through.
fn split_composites(
    column: Option<&str>,
) -> Result<(Option<String>, Vec<ResultMapping>)> {
    let Some(column) = column else {
        return Ok((None, vec![]));
    };
    let trimmed = column.trim();
    let Some(inner) = trimmed.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) else {
        return Ok((Some(trimmed.to_string()), vec![]));
    };

    let mut composites = Vec::new();
    for pair in inner.split(',') {
        let (property, column) = pair.split_once('=').ok_or_else(|| {
            Error::parse(format!("invalid composite column syntax `{trimmed}`"))
        })?;
        composites.push(
            ResultMapping::builder()
                .property(property.trim().to_string())
                .column(Some(column.trim().to_string()))
                .build(),
        );
    }
    Ok((None, composites))
}

struct PendingCacheRef {
    namespace: String,
    target: String,
}

impl PendingElement for PendingCacheRef {
    fn resolve(&self, config: &mut Configuration) -> Result<()> {
        config.cache(&self.target).map_err(|_| {
            Error::incomplete_element(format!(
                "cache-ref target namespace `{}` has no cache yet",
                self.target
            ))
        })?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("cache-ref `{}` -> `{}`", self.namespace, self.target)
    }
}

struct PendingResultMap {
    resource: String,
    namespace: String,
    node: XNode,
}

impl PendingElement for PendingResultMap {
    fn resolve(&self, config: &mut Configuration) -> Result<()> {
        let assistant = restore_assistant(config, &self.resource, &self.namespace);
        parse_result_map_node(config, &assistant, &self.node, None)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!(
            "result map `{}` in `{}`",
            self.node.attr("id").unwrap_or("?"),
            self.namespace
        )
    }
}

struct PendingStatement {
    resource: String,
    namespace: String,
    node: XNode,
}

impl PendingElement for PendingStatement {
    fn resolve(&self, config: &mut Configuration) -> Result<()> {
        let assistant = restore_assistant(config, &self.resource, &self.namespace);
        StatementDocumentBuilder::new(&assistant).parse(config, &self.node)
    }

    fn describe(&self) -> String {
        format!(
            "statement `{}` in `{}`",
            self.node.attr("id").unwrap_or("?"),
            self.namespace
        )
    }
}

/// Rebuilds an assistant for a deferred element from registry state: the
/// namespace's own cache or its cache-ref target, which may itself still be
/// unresolved.
fn restore_assistant(
    config: &Configuration,
    resource: &str,
    namespace: &str,
) -> BuilderAssistant {
    let mut assistant = BuilderAssistant::new(resource, namespace);
    match config.cache_ref_target(namespace) {
        Some(target) => match config.cache(target) {
            Ok(cache) => assistant.adopt_cache(cache),
            Err(_) => assistant.mark_unresolved_cache_ref(),
        },
        None => {
            if let Ok(cache) = config.cache(namespace) {
                assistant.adopt_cache(cache);
            }
        }
    }
    assistant
}
