use tessera_core::{Error, Result};

use indexmap::IndexMap;

/// A parsed inline parameter body:
/// `property (: jdbcType)? (, name = value)*`, or a parenthesized
/// expression in place of the property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamExpression {
    pub property: Option<String>,
    pub expression: Option<String>,
    pub attrs: IndexMap<String, String>,
}

const KNOWN_ATTRS: &[&str] = &[
    "javaType",
    "jdbcType",
    "mode",
    "numericScale",
    "resultMap",
    "typeHandler",
    "jdbcTypeName",
    "property",
    "expression",
];

impl ParamExpression {
    pub fn parse(body: &str) -> Result<ParamExpression> {
        let mut out = ParamExpression {
            property: None,
            expression: None,
            attrs: IndexMap::new(),
        };

        let bytes = body.as_bytes();
        let mut pos = skip_ws(bytes, 0);

        if pos < bytes.len() && bytes[pos] == b'(' {
            // Balanced-paren expression capture.
            let mut depth = 1;
            let start = pos + 1;
            let mut end = start;
            while end < bytes.len() && depth > 0 {
                match bytes[end] {
                    b'(' => depth += 1,
                    b')' => depth -= 1,
                    _ => {}
                }
                end += 1;
            }
            if depth != 0 {
                return Err(Error::parse(format!(
                    "unbalanced parenthesis in parameter `{body}`"
                )));
            }
            out.expression = Some(body[start..end - 1].trim().to_string());
            pos = end;
        } else {
            let start = pos;
            while pos < bytes.len() && bytes[pos] != b',' && bytes[pos] != b':' {
                pos += 1;
            }
            let property = body[start..pos].trim();
            if property.is_empty() {
                return Err(Error::parse(format!("empty property in parameter `{body}`")));
            }
            out.property = Some(property.to_string());
        }

        pos = skip_ws(bytes, pos);
        if pos < bytes.len() && bytes[pos] == b':' {
            // Legacy `property:JDBCTYPE` form.
            let start = pos + 1;
            let mut end = start;
            while end < bytes.len() && bytes[end] != b',' {
                end += 1;
            }
            let sql_type = body[start..end].trim();
            if sql_type.is_empty() {
                return Err(Error::parse(format!(
                    "empty SQL type after `:` in parameter `{body}`"
                )));
            }
            out.attrs
                .insert("jdbcType".to_string(), sql_type.to_string());
            pos = end;
        }

        while pos < bytes.len() {
            pos = skip_ws(bytes, pos);
            if pos >= bytes.len() {
                break;
            }
            if bytes[pos] != b',' {
                return Err(Error::parse(format!(
                    "expected `,` at offset {pos} in parameter `{body}`"
                )));
            }
            pos += 1;

            let eq = match body[pos..].find('=') {
                Some(found) => pos + found,
                None => {
                    return Err(Error::parse(format!(
                        "expected `name=value` in parameter `{body}`"
                    )))
                }
            };
            let name = body[pos..eq].trim();
            let mut end = eq + 1;
            while end < bytes.len() && bytes[end] != b',' {
                end += 1;
            }
            let value = body[eq + 1..end].trim();

            if !KNOWN_ATTRS.contains(&name) {
                return Err(Error::parse(format!(
                    "unknown attribute `{name}` in parameter `{body}`"
                )));
            }
            out.attrs.insert(name.to_string(), value.to_string());
            pos = end;
        }

        if let Some(property) = out.attrs.shift_remove("property") {
            out.property.get_or_insert(property);
        }
        if out.attrs.contains_key("expression") {
            return Err(Error::parse(format!(
                "expression-based parameters are not supported: `{body}`"
            )));
        }

        Ok(out)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

fn skip_ws(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_property() {
        let parsed = ParamExpression::parse("id").unwrap();
        assert_eq!(parsed.property.as_deref(), Some("id"));
        assert!(parsed.attrs.is_empty());
    }

    #[test]
    fn property_with_attributes() {
        let parsed =
            ParamExpression::parse("name, javaType=string, jdbcType=VARCHAR, mode=IN").unwrap();
        assert_eq!(parsed.property.as_deref(), Some("name"));
        assert_eq!(parsed.attr("javaType"), Some("string"));
        assert_eq!(parsed.attr("jdbcType"), Some("VARCHAR"));
        assert_eq!(parsed.attr("mode"), Some("IN"));
    }

    #[test]
    fn legacy_colon_type() {
        let parsed = ParamExpression::parse("age:NUMERIC, numericScale=2").unwrap();
        assert_eq!(parsed.property.as_deref(), Some("age"));
        assert_eq!(parsed.attr("jdbcType"), Some("NUMERIC"));
        assert_eq!(parsed.attr("numericScale"), Some("2"));
    }

    #[test]
    fn parenthesized_expression_is_rejected_downstream() {
        let parsed = ParamExpression::parse("(a + b), jdbcType=INTEGER").unwrap();
        assert_eq!(parsed.expression.as_deref(), Some("a + b"));
        assert!(parsed.property.is_none());
    }

    #[test]
    fn unknown_attribute_is_an_error() {
        let err = ParamExpression::parse("id, frobnicate=yes").unwrap_err();
        assert!(err.to_string().contains("frobnicate"));
    }

    #[test]
    fn expression_attribute_is_unsupported() {
        assert!(ParamExpression::parse("x, expression=a+b").is_err());
    }
}
