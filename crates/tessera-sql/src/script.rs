use crate::props;
use crate::source::{DynamicSqlSource, RawSqlSource};

use tessera_core::config::LanguageDriver;
use tessera_core::mapping::SqlSource;
use tessera_core::node::{
    BindSqlNode, ChooseSqlNode, ForeachSqlNode, IfSqlNode, MixedSqlNode, RawSqlNode, SetSqlNode,
    SqlNode, TextSqlNode, TrimSqlNode, WhereSqlNode,
};
use tessera_core::token::contains_token;
use tessera_core::ty::ValueKind;
use tessera_core::xml::{XContent, XNode};
use tessera_core::{Configuration, Error, Result};

use std::sync::Arc;

/// Name the default XML-tag script language registers under.
pub const XML_LANGUAGE: &str = "xml";

/// Compiles a statement element's children into a SQL node tree and
/// classifies the result: seeing any dynamic element (or `${}` text) makes
/// the source dynamic, otherwise the placeholder rewriter runs once here at
/// build time.
pub struct ScriptBuilder<'a> {
    config: &'a Configuration,
    parameter_kind: ValueKind,
}

impl<'a> ScriptBuilder<'a> {
    pub fn new(config: &'a Configuration, parameter_kind: ValueKind) -> ScriptBuilder<'a> {
        ScriptBuilder {
            config,
            parameter_kind,
        }
    }

    pub fn build(&self, node: &XNode) -> Result<Arc<dyn SqlSource>> {
        let root: SqlNode = self.parse_children(node)?.into();
        if root.is_dynamic() {
            Ok(Arc::new(DynamicSqlSource::new(root, self.parameter_kind)))
        } else {
            Ok(Arc::new(RawSqlSource::new(
                self.config,
                &root,
                self.parameter_kind,
            )?))
        }
    }

    fn parse_children(&self, node: &XNode) -> Result<MixedSqlNode> {
        let mut children = Vec::new();
        for child in node.children() {
            match child {
                XContent::Text(text) => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    // Configuration variables substitute at build time, so a
                    // parameter with the same name never shadows them.
                    let text =
                        props::interpolate(text.trim(), self.config.variables())?;
                    if contains_token(&text, "${") {
                        children.push(TextSqlNode::new(text).into());
                    } else {
                        children.push(RawSqlNode::new(text).into());
                    }
                }
                XContent::Element(element) => children.push(self.parse_element(element)?),
            }
        }
        Ok(MixedSqlNode::new(children))
    }

    fn parse_element(&self, element: &XNode) -> Result<SqlNode> {
        match element.name() {
            "trim" => {
                let body = self.parse_children(element)?.into();
                Ok(TrimSqlNode::new(
                    body,
                    element.attr("prefix"),
                    element.attr("prefixOverrides"),
                    element.attr("suffix"),
                    element.attr("suffixOverrides"),
                )
                .into())
            }
            "where" => {
                let body = self.parse_children(element)?.into();
                Ok(WhereSqlNode::new(body).into())
            }
            "set" => {
                let body = self.parse_children(element)?.into();
                Ok(SetSqlNode::new(body).into())
            }
            "foreach" => {
                let body = self.parse_children(element)?.into();
                let nullable = element
                    .attr("nullable")
                    .map(|raw| match raw {
                        "true" => Ok(true),
                        "false" => Ok(false),
                        other => Err(Error::parse(format!(
                            "foreach nullable expects true/false, got `{other}`"
                        ))),
                    })
                    .transpose()?;
                Ok(ForeachSqlNode::new(
                    element.attr_required("collection")?,
                    element.attr("item"),
                    element.attr("index"),
                    element.attr("open"),
                    element.attr("close"),
                    element.attr("separator"),
                    nullable,
                    body,
                )?
                .into())
            }
            "if" => {
                let body = self.parse_children(element)?.into();
                Ok(IfSqlNode::new(element.attr_required("test")?, body)?.into())
            }
            "choose" => self.parse_choose(element),
            "bind" => Ok(BindSqlNode::new(
                element.attr_required("name")?,
                element.attr_required("value")?,
            )?
            .into()),
            other => Err(Error::parse(format!(
                "unknown element <{other}> in SQL statement"
            ))),
        }
    }

    fn parse_choose(&self, element: &XNode) -> Result<SqlNode> {
        let mut whens = Vec::new();
        let mut otherwise = None;

        for child in element.elements() {
            match child.name() {
                "when" => {
                    let body = self.parse_children(child)?.into();
                    whens.push(IfSqlNode::new(child.attr_required("test")?, body)?);
                }
                "otherwise" => {
                    if otherwise.is_some() {
                        return Err(Error::parse(
                            "<choose> allows at most one <otherwise> branch",
                        ));
                    }
                    otherwise = Some(self.parse_children(child)?.into());
                }
                other => {
                    return Err(Error::parse(format!(
                        "unknown element <{other}> inside <choose>"
                    )))
                }
            }
        }

        Ok(ChooseSqlNode::new(whens, otherwise).into())
    }
}

/// The default language driver: scripts wrapped in `<script>` re-enter the
/// XML compiler; anything else has configuration variables substituted and
/// becomes a single text node, dynamic iff interpolation remains.
pub struct XmlLanguageDriver;

impl LanguageDriver for XmlLanguageDriver {
    fn create_source_from_script(
        &self,
        config: &Configuration,
        script: &str,
        parameter_kind: ValueKind,
    ) -> Result<Arc<dyn SqlSource>> {
        let trimmed = script.trim();
        if trimmed.starts_with("<script>") {
            let node = XNode::parse_document(trimmed)?;
            return self.create_source_from_node(config, &node, parameter_kind);
        }

        let script = props::interpolate(trimmed, config.variables())?;
        if contains_token(&script, "${") {
            let root: SqlNode = TextSqlNode::new(script).into();
            Ok(Arc::new(DynamicSqlSource::new(root, parameter_kind)))
        } else {
            Ok(Arc::new(RawSqlSource::from_text(
                config,
                &script,
                parameter_kind,
            )?))
        }
    }

    fn create_source_from_node(
        &self,
        config: &Configuration,
        node: &XNode,
        parameter_kind: ValueKind,
    ) -> Result<Arc<dyn SqlSource>> {
        ScriptBuilder::new(config, parameter_kind).build(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::value::ValueObject;
    use tessera_core::Value;

    fn object(pairs: &[(&str, Value)]) -> Value {
        let mut map = ValueObject::new();
        for (name, value) in pairs {
            map.insert(name.to_string(), value.clone());
        }
        Value::Object(map)
    }

    #[test]
    fn static_template_compiles_once() {
        let config = Configuration::new();
        let node =
            XNode::parse_document("<select>SELECT * FROM t WHERE id = #{id}</select>").unwrap();
        let source = ScriptBuilder::new(&config, ValueKind::Object)
            .build(&node)
            .unwrap();

        let bound = source
            .bound_sql(&config, &object(&[("id", Value::Long(7))]))
            .unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM t WHERE id = ?");
        assert_eq!(bound.parameter_mappings().len(), 1);
        assert_eq!(bound.parameter_mappings()[0].property(), "id");
    }

    #[test]
    fn where_with_ifs_drops_unmet_branches() {
        let config = Configuration::new();
        let node = XNode::parse_document(
            r#"<select>SELECT * FROM u
                 <where>
                   <if test="name != null">AND name = #{name}</if>
                   <if test="age &gt; 0">AND age = #{age}</if>
                 </where>
               </select>"#,
        )
        .unwrap();
        let source = ScriptBuilder::new(&config, ValueKind::Object)
            .build(&node)
            .unwrap();

        let bound = source
            .bound_sql(
                &config,
                &object(&[
                    ("name", Value::String("ann".into())),
                    ("age", Value::Int(0)),
                ]),
            )
            .unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM u WHERE name = ?");
        assert_eq!(bound.parameter_mappings().len(), 1);
        assert_eq!(bound.parameter_mappings()[0].property(), "name");
    }

    #[test]
    fn foreach_produces_renamed_slots() {
        let config = Configuration::new();
        let node = XNode::parse_document(
            r#"<delete>DELETE FROM t WHERE id IN
                 <foreach collection="ids" item="i" open="(" close=")" separator=",">#{i}</foreach>
               </delete>"#,
        )
        .unwrap();
        let source = ScriptBuilder::new(&config, ValueKind::Object)
            .build(&node)
            .unwrap();

        let bound = source
            .bound_sql(
                &config,
                &object(&[(
                    "ids",
                    Value::List(vec![1i32.into(), 2i32.into(), 3i32.into()]),
                )]),
            )
            .unwrap();
        assert_eq!(bound.sql(), "DELETE FROM t WHERE id IN ( ? , ? , ? )");
        let properties: Vec<_> = bound
            .parameter_mappings()
            .iter()
            .map(|mapping| mapping.property().to_string())
            .collect();
        assert_eq!(properties, ["__frch_i_0", "__frch_i_1", "__frch_i_2"]);
        assert_eq!(bound.value_of("__frch_i_1").unwrap(), Value::Int(2));
    }

    #[test]
    fn script_wrapper_reenters_xml() {
        let config = Configuration::new();
        let driver = XmlLanguageDriver;
        let source = driver
            .create_source_from_script(
                &config,
                "<script>SELECT * FROM t <if test=\"id != null\">WHERE id = #{id}</if></script>",
                ValueKind::Object,
            )
            .unwrap();

        let bound = source.bound_sql(&config, &Value::object()).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM t");
    }

    #[test]
    fn unknown_dynamic_element_is_an_error() {
        let config = Configuration::new();
        let node = XNode::parse_document("<select><frob/></select>").unwrap();
        let err = ScriptBuilder::new(&config, ValueKind::Object)
            .build(&node)
            .unwrap_err();
        assert!(err.to_string().contains("frob"));
    }
}
