use crate::props;

use tessera_core::xml::{XContent, XNode};
use tessera_core::{Configuration, Error, Result};

use indexmap::IndexMap;

/// Expands `<include refid="..."/>` references before script compilation.
///
/// Each include splices a registered `<sql>` fragment's children in place,
/// with an include-local variables frame built from the surrounding frame
/// plus the include's `<property>` children. Inside included content,
/// `${var}` tokens in attribute values and text are substituted eagerly, so
/// configuration variables win over any same-named statement parameter.
pub struct IncludeExpander<'a> {
    config: &'a Configuration,
    namespace: &'a str,
}

impl<'a> IncludeExpander<'a> {
    pub fn new(config: &'a Configuration, namespace: &'a str) -> IncludeExpander<'a> {
        IncludeExpander { config, namespace }
    }

    pub fn expand(&self, node: &XNode) -> Result<XNode> {
        self.apply(node, self.config.variables(), false)
    }

    fn apply(
        &self,
        node: &XNode,
        variables: &IndexMap<String, String>,
        included: bool,
    ) -> Result<XNode> {
        let mut out = XNode::new(node.name());
        for (name, value) in node.attrs() {
            let value = if included {
                props::interpolate(value, variables)?
            } else {
                value.clone()
            };
            out.set_attr(name.clone(), value);
        }

        for child in node.children() {
            match child {
                XContent::Text(text) => {
                    let text = if included && !variables.is_empty() {
                        props::interpolate(text, variables)?
                    } else {
                        text.clone()
                    };
                    out.push_text(text);
                }
                XContent::Element(element) if element.name() == "include" => {
                    let expanded = self.expand_include(element, variables)?;
                    for spliced in expanded.children() {
                        out.children_mut().push(spliced.clone());
                    }
                }
                XContent::Element(element) => {
                    out.push_element(self.apply(element, variables, included)?);
                }
            }
        }

        Ok(out)
    }

    fn expand_include(
        &self,
        include: &XNode,
        variables: &IndexMap<String, String>,
    ) -> Result<XNode> {
        let refid = props::interpolate(include.attr_required("refid")?, variables)?;
        let refid = if refid.contains('.') {
            refid
        } else {
            format!("{}.{refid}", self.namespace)
        };

        let fragment = self.config.sql_fragment(&refid).map_err(|_| {
            Error::incomplete_element(format!("sql fragment `{refid}` not found"))
        })?;

        // Include-local frame: the surrounding frame plus <property> children,
        // whose values interpolate against the surrounding frame only.
        let mut local = variables.clone();
        for property in include.elements() {
            if property.name() != "property" {
                return Err(Error::parse(format!(
                    "unexpected element <{}> inside <include>",
                    property.name()
                )));
            }
            let name = property.attr_required("name")?.to_string();
            let value = props::interpolate(property.attr_required("value")?, variables)?;
            if local.insert(name.clone(), value).is_some() && variables.get(&name).is_none() {
                return Err(Error::parse(format!(
                    "duplicate <property name=\"{name}\"> inside <include>"
                )));
            }
        }

        self.apply(&fragment, &local, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn config_with_fragment(id: &str, xml: &str) -> Configuration {
        let mut config = Configuration::new();
        let fragment = XNode::parse_document(xml).unwrap();
        config.add_sql_fragment(id, Arc::new(fragment)).unwrap();
        config
    }

    #[test]
    fn splices_fragment_children() {
        let config =
            config_with_fragment("app.Mapper.cols", r#"<sql id="cols">a, b, ${x}</sql>"#);
        let statement = XNode::parse_document(
            r#"<select>SELECT <include refid="cols"><property name="x" value="c"/></include> FROM t</select>"#,
        )
        .unwrap();

        let expanded = IncludeExpander::new(&config, "app.Mapper")
            .expand(&statement)
            .unwrap();
        assert_eq!(expanded.deep_text().split_whitespace().collect::<Vec<_>>().join(" "),
            "SELECT a, b, c FROM t");
    }

    #[test]
    fn nested_includes_resolve() {
        let mut config =
            config_with_fragment("app.Mapper.inner", r#"<sql id="inner">x</sql>"#);
        let outer = XNode::parse_document(
            r#"<sql id="outer">SELECT <include refid="inner"/></sql>"#,
        )
        .unwrap();
        config
            .add_sql_fragment("app.Mapper.outer", Arc::new(outer))
            .unwrap();

        let statement =
            XNode::parse_document(r#"<select><include refid="outer"/> FROM t</select>"#).unwrap();
        let expanded = IncludeExpander::new(&config, "app.Mapper")
            .expand(&statement)
            .unwrap();
        assert_eq!(
            expanded
                .deep_text()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
            "SELECT x FROM t"
        );
    }

    #[test]
    fn configuration_variables_win_at_expansion_time() {
        let mut config =
            config_with_fragment("app.Mapper.cols", r#"<sql id="cols">${col}</sql>"#);
        config.set_variable("col", "from_config");

        let statement =
            XNode::parse_document(r#"<select>SELECT <include refid="cols"/> FROM t</select>"#)
                .unwrap();
        let expanded = IncludeExpander::new(&config, "app.Mapper")
            .expand(&statement)
            .unwrap();
        assert!(expanded.deep_text().contains("from_config"));
    }

    #[test]
    fn missing_refid_queues_as_incomplete() {
        let config = Configuration::new();
        let statement =
            XNode::parse_document(r#"<select><include refid="missing"/></select>"#).unwrap();
        let err = IncludeExpander::new(&config, "app.Mapper")
            .expand(&statement)
            .unwrap_err();
        assert!(err.is_incomplete_element());
    }
}
