use crate::expr::Expr;
use crate::render::RenderContext;
use crate::token::{contains_token, TokenParser};
use crate::{Result, Value};

/// SQL text carrying `${...}` interpolations, substituted at every
/// evaluation.
///
/// Interpolation splices the evaluated expression into the SQL text itself,
/// which is a code-injection surface the template author must control.
#[derive(Debug, Clone)]
pub struct TextSqlNode {
    text: String,
}

impl TextSqlNode {
    pub fn new(text: impl Into<String>) -> TextSqlNode {
        TextSqlNode { text: text.into() }
    }

    pub fn is_dynamic(&self) -> bool {
        contains_token(&self.text, "${")
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        let rendered = TokenParser::interpolations().parse(&self.text, &mut |body| {
            let value = Expr::parse(body)?.eval(ctx.bindings())?;
            Ok(match value {
                Value::Null => String::new(),
                other => other.to_string(),
            })
        })?;
        ctx.append_sql(&rendered);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolates_bindings() {
        let mut ctx = RenderContext::new(Value::Null, None);
        ctx.bind("col", Value::String("name".into()));

        TextSqlNode::new("ORDER BY ${col}").apply(&mut ctx).unwrap();
        assert_eq!(ctx.sql(), "ORDER BY name");
    }

    #[test]
    fn dynamic_only_with_tokens() {
        assert!(TextSqlNode::new("x ${y}").is_dynamic());
        assert!(!TextSqlNode::new("plain").is_dynamic());
    }
}
