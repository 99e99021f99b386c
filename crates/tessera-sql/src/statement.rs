use crate::assistant::{BuilderAssistant, StatementSpec};
use crate::include::IncludeExpander;

use tessera_core::driver::ResultSetType;
use tessera_core::exec::{DriverKeyGenerator, KeyGenerator, SelectKeyGenerator};
use tessera_core::mapping::{SqlCommandType, StatementType};
use tessera_core::xml::{XContent, XNode};
use tessera_core::{Configuration, Error, Result};

use std::sync::Arc;
use std::time::Duration;

/// Suffix appended to a statement id to register its `<selectKey>`
/// companion.
pub const SELECT_KEY_SUFFIX: &str = "!selectKey";

/// Compiles one `<select|insert|update|delete>` element into a registered
/// mapped statement: include expansion, select-key extraction, script
/// compilation, key-generator selection, registration.
pub struct StatementDocumentBuilder<'a> {
    assistant: &'a BuilderAssistant,
}

impl<'a> StatementDocumentBuilder<'a> {
    pub fn new(assistant: &'a BuilderAssistant) -> StatementDocumentBuilder<'a> {
        StatementDocumentBuilder { assistant }
    }

    pub fn parse(&self, config: &mut Configuration, node: &XNode) -> Result<()> {
        let id = node.attr_required("id")?.to_string();
        let full_id = self.assistant.apply_namespace(&id, false)?;
        if !database_id_matches(config, node.attr("databaseId"), &full_id) {
            return Ok(());
        }

        let command = match node.name() {
            "select" => SqlCommandType::Select,
            "insert" => SqlCommandType::Insert,
            "update" => SqlCommandType::Update,
            "delete" => SqlCommandType::Delete,
            other => {
                return Err(Error::parse(format!(
                    "unknown statement element <{other}>"
                )))
            }
        };

        // Includes expand before anything else looks at the children.
        let node = IncludeExpander::new(config, self.assistant.namespace()).expand(node)?;

        let parameter_kind = node
            .attr("parameterType")
            .map(|name| config.resolve_alias(name))
            .unwrap_or_default();

        // <selectKey> companions compile and register first, then vanish
        // from the statement body.
        let mut key_generator: Option<Arc<dyn KeyGenerator>> = None;
        let mut node = node;
        for select_key in extract_select_keys(&mut node) {
            if !database_id_matches(
                config,
                select_key.attr("databaseId"),
                &format!("{full_id}{SELECT_KEY_SUFFIX}"),
            ) {
                continue;
            }
            key_generator = Some(self.parse_select_key(config, &id, &select_key, parameter_kind)?);
        }

        let language = config.language(node.attr("lang"))?;
        let sql_source = language.create_source_from_node(config, &node, parameter_kind)?;

        let key_generator = match key_generator {
            Some(generator) => Some(generator),
            None => {
                let use_generated = node
                    .attr("useGeneratedKeys")
                    .map(|raw| raw == "true")
                    .unwrap_or(config.settings().use_generated_keys);
                (command == SqlCommandType::Insert && use_generated)
                    .then(|| Arc::new(DriverKeyGenerator) as Arc<dyn KeyGenerator>)
            }
        };

        let spec = StatementSpec {
            statement_type: node
                .attr("statementType")
                .map(StatementType::parse)
                .transpose()?
                .unwrap_or_default(),
            parameter_map: node.attr("parameterMap").map(str::to_string),
            result_map: node.attr("resultMap").map(str::to_string),
            result_type: node.attr("resultType").map(str::to_string),
            result_set_type: parse_result_set_type(node.attr("resultSetType"))?,
            fetch_size: parse_number(node.attr("fetchSize"), "fetchSize")?,
            timeout: parse_number(node.attr("timeout"), "timeout")?
                .map(|secs| Duration::from_secs(u64::from(secs))),
            flush_cache: parse_bool(node.attr("flushCache"), "flushCache")?,
            use_cache: parse_bool(node.attr("useCache"), "useCache")?,
            result_ordered: parse_bool(node.attr("resultOrdered"), "resultOrdered")?
                .unwrap_or(false),
            dirty_select: parse_bool(node.attr("affectData"), "affectData")?.unwrap_or(false),
            key_generator,
            key_property: node.attr("keyProperty").map(str::to_string),
            key_column: node.attr("keyColumn").map(str::to_string),
            result_sets: node.attr("resultSets").map(str::to_string),
            database_id: node.attr("databaseId").map(str::to_string),
        };

        self.assistant
            .add_mapped_statement(config, &id, command, sql_source, spec)?;
        Ok(())
    }

    /// Registers the companion SELECT and wraps it in a key generator that
    /// runs before or after the main statement per its `order` attribute.
    fn parse_select_key(
        &self,
        config: &mut Configuration,
        parent_id: &str,
        node: &XNode,
        parameter_kind: tessera_core::ty::ValueKind,
    ) -> Result<Arc<dyn KeyGenerator>> {
        let key_id = format!("{parent_id}{SELECT_KEY_SUFFIX}");

        // A deferred statement retries its whole parse; the companion may
        // already be registered from the first attempt.
        let full_key_id = self.assistant.apply_namespace(&key_id, false)?;
        if config.has_key_generator(&full_key_id) {
            return config.key_generator(&full_key_id);
        }
        let execute_before = match node.attr("order").unwrap_or("AFTER") {
            "BEFORE" => true,
            "AFTER" => false,
            other => {
                return Err(Error::parse(format!(
                    "selectKey order must be BEFORE or AFTER, got `{other}`"
                )))
            }
        };

        let language = config.language(node.attr("lang"))?;
        let sql_source = language.create_source_from_node(config, node, parameter_kind)?;

        let spec = StatementSpec {
            statement_type: node
                .attr("statementType")
                .map(StatementType::parse)
                .transpose()?
                .unwrap_or_default(),
            result_type: node.attr("resultType").map(str::to_string),
            flush_cache: Some(false),
            use_cache: Some(false),
            key_property: node.attr("keyProperty").map(str::to_string),
            key_column: node.attr("keyColumn").map(str::to_string),
            ..StatementSpec::default()
        };

        let key_statement =
            self.assistant
                .add_mapped_statement(config, &key_id, SqlCommandType::Select, sql_source, spec)?;

        let generator: Arc<dyn KeyGenerator> =
            Arc::new(SelectKeyGenerator::new(key_statement, execute_before));
        config.add_key_generator(full_key_id, generator.clone())?;
        Ok(generator)
    }
}

/// Removes and returns all `<selectKey>` children.
fn extract_select_keys(node: &mut XNode) -> Vec<XNode> {
    let mut extracted = Vec::new();
    node.children_mut().retain_mut(|child| match child {
        XContent::Element(element) if element.name() == "selectKey" => {
            extracted.push(element.clone());
            false
        }
        _ => true,
    });
    extracted
}

/// A statement applies when its database id matches the configured one.
/// With a configured id, an unannotated statement is the fallback and only
/// registers when no specific one claimed the id first.
fn database_id_matches(config: &Configuration, declared: Option<&str>, full_id: &str) -> bool {
    match (config.database_id(), declared) {
        (Some(current), Some(declared)) => declared == current,
        (Some(_), None) => !config.has_mapped_statement(full_id),
        (None, Some(_)) => false,
        (None, None) => true,
    }
}

fn parse_bool(raw: Option<&str>, attr: &str) -> Result<Option<bool>> {
    raw.map(|raw| match raw {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(Error::parse(format!(
            "attribute `{attr}` expects true/false, got `{other}`"
        ))),
    })
    .transpose()
}

fn parse_number(raw: Option<&str>, attr: &str) -> Result<Option<u32>> {
    raw.map(|raw| {
        raw.parse::<u32>()
            .map_err(|_| Error::parse(format!("attribute `{attr}` expects a number, got `{raw}`")))
    })
    .transpose()
}

fn parse_result_set_type(raw: Option<&str>) -> Result<Option<ResultSetType>> {
    raw.map(|raw| match raw {
        "FORWARD_ONLY" => Ok(ResultSetType::ForwardOnly),
        "SCROLL_INSENSITIVE" => Ok(ResultSetType::ScrollInsensitive),
        "SCROLL_SENSITIVE" => Ok(ResultSetType::ScrollSensitive),
        other => Err(Error::parse(format!("unknown result set type `{other}`"))),
    })
    .transpose()
}
