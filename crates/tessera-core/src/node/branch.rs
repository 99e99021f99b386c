use super::SqlNode;
use crate::expr::Expr;
use crate::render::RenderContext;
use crate::Result;

/// `<if test="...">`: applies its body when the test evaluates true.
#[derive(Debug, Clone)]
pub struct IfSqlNode {
    test: Expr,
    body: Box<SqlNode>,
}

impl IfSqlNode {
    pub fn new(test: &str, body: SqlNode) -> Result<IfSqlNode> {
        Ok(IfSqlNode {
            test: Expr::parse(test)?,
            body: Box::new(body),
        })
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        if self.test.eval_bool(ctx.bindings())? {
            self.body.apply(ctx)?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// `<choose>`: applies the first `<when>` whose test passes, or the
/// `<otherwise>` branch when none does.
#[derive(Debug, Clone)]
pub struct ChooseSqlNode {
    whens: Vec<IfSqlNode>,
    otherwise: Option<Box<SqlNode>>,
}

impl ChooseSqlNode {
    pub fn new(whens: Vec<IfSqlNode>, otherwise: Option<SqlNode>) -> ChooseSqlNode {
        ChooseSqlNode {
            whens,
            otherwise: otherwise.map(Box::new),
        }
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        for when in &self.whens {
            if when.apply(ctx)? {
                return Ok(true);
            }
        }
        if let Some(otherwise) = &self.otherwise {
            otherwise.apply(ctx)?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RawSqlNode;
    use crate::value::ValueObject;
    use crate::Value;

    fn ctx(name: Option<&str>) -> RenderContext {
        let mut map = ValueObject::new();
        map.insert("name".to_string(), Value::from(name.map(String::from)));
        RenderContext::new(Value::Object(map), None)
    }

    fn raw(text: &str) -> SqlNode {
        RawSqlNode::new(text).into()
    }

    #[test]
    fn if_applies_on_true() {
        let node = IfSqlNode::new("name != null", raw("AND name = #{name}")).unwrap();

        let mut applied = ctx(Some("ann"));
        assert!(node.apply(&mut applied).unwrap());
        assert_eq!(applied.sql(), "AND name = #{name}");

        let mut skipped = ctx(None);
        assert!(!node.apply(&mut skipped).unwrap());
        assert_eq!(skipped.sql(), "");
    }

    #[test]
    fn choose_picks_first_match() {
        let node = ChooseSqlNode::new(
            vec![
                IfSqlNode::new("name == 'bob'", raw("bob-branch")).unwrap(),
                IfSqlNode::new("name == 'ann'", raw("ann-branch")).unwrap(),
            ],
            Some(raw("fallback")),
        );

        let mut picked = ctx(Some("ann"));
        assert!(node.apply(&mut picked).unwrap());
        assert_eq!(picked.sql(), "ann-branch");

        let mut fallback = ctx(None);
        assert!(node.apply(&mut fallback).unwrap());
        assert_eq!(fallback.sql(), "fallback");
    }
}
