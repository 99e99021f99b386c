use crate::param_expr::ParamExpression;

use tessera_core::mapping::{
    BoundSql, ParamMode, ParameterMapping, SqlSource, StaticSqlSource,
};
use tessera_core::node::SqlNode;
use tessera_core::render::RenderContext;
use tessera_core::token::TokenParser;
use tessera_core::ty::{SqlType, ValueKind};
use tessera_core::value::ValueObject;
use tessera_core::{Configuration, Error, Result, Value};

use std::sync::Arc;

/// The placeholder rewriter: turns evaluated SQL text with `#{...}` tokens
/// into prepared-statement text with `?` slots and an ordered parameter
/// mapping list.
pub struct SqlSourceBuilder;

impl SqlSourceBuilder {
    pub fn build(
        config: &Configuration,
        sql: &str,
        parameter_kind: ValueKind,
        additional: &ValueObject,
    ) -> Result<StaticSqlSource> {
        let sql = if config.settings().shrink_whitespaces_in_sql {
            shrink_whitespace(sql)
        } else {
            sql.to_string()
        };

        let mut mappings = Vec::new();
        let text = TokenParser::placeholders().parse(&sql, &mut |body| {
            mappings.push(build_mapping(config, body, parameter_kind, additional)?);
            Ok("?".to_string())
        })?;

        Ok(StaticSqlSource::new(text, mappings))
    }
}

fn build_mapping(
    config: &Configuration,
    body: &str,
    parameter_kind: ValueKind,
    additional: &ValueObject,
) -> Result<ParameterMapping> {
    let parsed = ParamExpression::parse(body)?;
    if parsed.expression.is_some() {
        return Err(Error::parse(format!(
            "expression-based parameters are not supported: `{body}`"
        )));
    }
    let property = parsed
        .property
        .clone()
        .ok_or_else(|| Error::parse(format!("parameter `{body}` names no property")))?;

    let sql_type = parsed.attr("jdbcType").map(SqlType::parse).transpose()?;

    let value_kind = match parsed.attr("javaType") {
        Some(name) => config.resolve_alias(name),
        None => infer_kind(config, &property, parameter_kind, additional, sql_type),
    };

    let mode = parsed.attr("mode").map(ParamMode::parse).transpose()?;

    let numeric_scale = parsed
        .attr("numericScale")
        .map(|scale| {
            scale.parse::<u32>().map_err(|_| {
                Error::parse(format!("invalid numericScale in parameter `{body}`"))
            })
        })
        .transpose()?;

    let type_handler = parsed
        .attr("typeHandler")
        .map(|name| config.type_handlers().named(name))
        .transpose()?;

    Ok(ParameterMapping::builder(property)
        .mode(mode.unwrap_or_default())
        .value_kind(value_kind)
        .sql_type(sql_type)
        .sql_type_name(parsed.attr("jdbcTypeName").map(str::to_string))
        .numeric_scale(numeric_scale)
        .type_handler(type_handler)
        .result_map_id(parsed.attr("resultMap").map(str::to_string))
        .build())
}

/// Property kind resolution order: per-evaluation bindings first (foreach
/// variables live there), then a scalar parameter's own kind, cursor OUT
/// parameters map to result-set objects, and map-shaped parameters yield
/// `Any`.
fn infer_kind(
    config: &Configuration,
    property: &str,
    parameter_kind: ValueKind,
    additional: &ValueObject,
    sql_type: Option<SqlType>,
) -> ValueKind {
    let head = property.split(['.', '[']).next().unwrap_or(property);
    if let Some(bound) = additional.get(head) {
        if head == property {
            return ValueKind::of(bound);
        }
        return ValueKind::Any;
    }
    if sql_type == Some(SqlType::Cursor) {
        return ValueKind::Object;
    }
    if config.type_handlers().has(parameter_kind) {
        return parameter_kind;
    }
    ValueKind::Any
}

fn shrink_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut in_ws = false;
    for ch in sql.chars() {
        if ch.is_whitespace() {
            in_ws = true;
        } else {
            if in_ws && !out.is_empty() {
                out.push(' ');
            }
            in_ws = false;
            out.push(ch);
        }
    }
    out
}

/// A template with no dynamic nodes and no interpolation: the placeholder
/// rewriter runs once at build time and every invocation reuses the
/// prebuilt text and mappings.
pub struct RawSqlSource {
    inner: StaticSqlSource,
}

impl RawSqlSource {
    pub fn new(config: &Configuration, root: &SqlNode, parameter_kind: ValueKind) -> Result<RawSqlSource> {
        let mut ctx = RenderContext::new(Value::Null, config.database_id());
        root.apply(&mut ctx)?;
        let inner = SqlSourceBuilder::build(config, &ctx.sql(), parameter_kind, &ValueObject::new())?;
        Ok(RawSqlSource { inner })
    }

    pub fn from_text(
        config: &Configuration,
        sql: &str,
        parameter_kind: ValueKind,
    ) -> Result<RawSqlSource> {
        let inner = SqlSourceBuilder::build(config, sql, parameter_kind, &ValueObject::new())?;
        Ok(RawSqlSource { inner })
    }
}

impl SqlSource for RawSqlSource {
    fn bound_sql(&self, config: &Configuration, parameter: &Value) -> Result<BoundSql> {
        self.inner.bound_sql(config, parameter)
    }
}

/// A template with dynamic nodes: every invocation evaluates the node tree
/// against the parameter and then runs the placeholder rewriter over the
/// produced text.
pub struct DynamicSqlSource {
    root: SqlNode,
    parameter_kind: ValueKind,
}

impl DynamicSqlSource {
    pub fn new(root: SqlNode, parameter_kind: ValueKind) -> DynamicSqlSource {
        DynamicSqlSource {
            root,
            parameter_kind,
        }
    }
}

impl SqlSource for DynamicSqlSource {
    fn bound_sql(&self, config: &Configuration, parameter: &Value) -> Result<BoundSql> {
        let mut ctx = RenderContext::new(parameter.clone(), config.database_id())
            .with_foreach_nullable_default(config.settings().nullable_on_for_each);
        self.root.apply(&mut ctx)?;

        let source =
            SqlSourceBuilder::build(config, &ctx.sql(), self.parameter_kind, ctx.bindings().entries())?;
        let mut bound = source.bound_sql(config, parameter)?;
        for (name, value) in ctx.bindings().entries() {
            bound.set_additional(name.clone(), value.clone());
        }
        Ok(bound)
    }
}

/// Builds sources from provider closures: the provider supplies fresh
/// script text per invocation, which then goes through the script compiler.
pub struct ProviderSqlSource {
    provider: Arc<dyn Fn(&Value) -> Result<String> + Send + Sync>,
    parameter_kind: ValueKind,
    language: Option<String>,
}

impl ProviderSqlSource {
    pub fn new(
        provider: Arc<dyn Fn(&Value) -> Result<String> + Send + Sync>,
        parameter_kind: ValueKind,
        language: Option<String>,
    ) -> ProviderSqlSource {
        ProviderSqlSource {
            provider,
            parameter_kind,
            language,
        }
    }
}

impl SqlSource for ProviderSqlSource {
    fn bound_sql(&self, config: &Configuration, parameter: &Value) -> Result<BoundSql> {
        let script = (self.provider)(parameter)?;
        let driver = config.language(self.language.as_deref())?;
        let source = driver.create_source_from_script(config, &script, self.parameter_kind)?;
        source.bound_sql(config, parameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Configuration {
        Configuration::new()
    }

    fn object(pairs: &[(&str, Value)]) -> Value {
        let mut map = ValueObject::new();
        for (name, value) in pairs {
            map.insert(name.to_string(), value.clone());
        }
        Value::Object(map)
    }

    #[test]
    fn rewrites_placeholders_in_textual_order() {
        let config = config();
        let source = SqlSourceBuilder::build(
            &config,
            "INSERT INTO t (a, b) VALUES (#{a}, #{b, jdbcType=VARCHAR})",
            ValueKind::Object,
            &ValueObject::new(),
        )
        .unwrap();

        let bound = source
            .bound_sql(&config, &object(&[("a", Value::Long(1))]))
            .unwrap();
        assert_eq!(bound.sql(), "INSERT INTO t (a, b) VALUES (?, ?)");
        let mappings = bound.parameter_mappings();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].property(), "a");
        assert_eq!(mappings[1].property(), "b");
        assert_eq!(mappings[1].sql_type(), Some(SqlType::Varchar));
    }

    #[test]
    fn scalar_parameter_kind_flows_into_mappings() {
        let config = config();
        let source = SqlSourceBuilder::build(
            &config,
            "SELECT * FROM t WHERE id = #{id}",
            ValueKind::Long,
            &ValueObject::new(),
        )
        .unwrap();
        let bound = source.bound_sql(&config, &Value::Long(7)).unwrap();
        assert_eq!(bound.parameter_mappings()[0].value_kind(), ValueKind::Long);
    }

    #[test]
    fn iteration_bindings_win_kind_resolution() {
        let config = config();
        let mut additional = ValueObject::new();
        additional.insert("__frch_i_0".to_string(), Value::Int(3));

        let source = SqlSourceBuilder::build(
            &config,
            "#{__frch_i_0}",
            ValueKind::Object,
            &additional,
        )
        .unwrap();
        let bound = source.bound_sql(&config, &Value::object()).unwrap();
        assert_eq!(bound.parameter_mappings()[0].value_kind(), ValueKind::Int);
    }

    #[test]
    fn shrink_whitespace_collapses_runs() {
        assert_eq!(
            shrink_whitespace("SELECT *\n   FROM t\n\t WHERE a = 1"),
            "SELECT * FROM t WHERE a = 1"
        );
    }

    #[test]
    fn dynamic_source_exposes_bindings() {
        use tessera_core::node::{MixedSqlNode, RawSqlNode, WhereSqlNode};

        let config = config();
        let body: SqlNode = MixedSqlNode::new(vec![
            RawSqlNode::new("SELECT * FROM users").into(),
            WhereSqlNode::new(RawSqlNode::new("AND name = #{name}").into()).into(),
        ])
        .into();
        let source = DynamicSqlSource::new(body, ValueKind::Object);

        let bound = source
            .bound_sql(&config, &object(&[("name", Value::String("ann".into()))]))
            .unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users WHERE name = ?");
        assert!(bound.has_additional("_parameter"));
    }
}
