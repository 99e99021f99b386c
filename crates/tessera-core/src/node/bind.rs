use crate::expr::Expr;
use crate::render::RenderContext;
use crate::Result;

/// `<bind name="..." value="...">`: evaluates the value expression against
/// the current bindings and stores the result under the declared name for
/// the rest of the evaluation.
#[derive(Debug, Clone)]
pub struct BindSqlNode {
    name: String,
    value: Expr,
}

impl BindSqlNode {
    pub fn new(name: &str, value: &str) -> Result<BindSqlNode> {
        Ok(BindSqlNode {
            name: name.to_string(),
            value: Expr::parse(value)?,
        })
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        let value = self.value.eval(ctx.bindings())?;
        ctx.bind(self.name.clone(), value);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueObject;
    use crate::Value;

    #[test]
    fn binds_computed_value() {
        let mut map = ValueObject::new();
        map.insert("name".to_string(), Value::String("ann".into()));
        let mut ctx = RenderContext::new(Value::Object(map), None);

        BindSqlNode::new("pattern", "name + '%'")
            .unwrap()
            .apply(&mut ctx)
            .unwrap();

        assert_eq!(
            ctx.bindings().entries().get("pattern"),
            Some(&Value::String("ann%".into()))
        );
    }
}
