use super::SqlNode;
use crate::expr::Expr;
use crate::render::RenderContext;
use crate::token::TokenParser;
use crate::Result;

/// Prefix of the per-iteration variable names a foreach substitutes into its
/// body, e.g. `__frch_item_0`.
pub const FOREACH_ITEM_PREFIX: &str = "__frch_";

/// `<foreach>`: iterates a collection expression, rendering the body once
/// per element.
///
/// Each iteration binds the bare `item`/`index` names and a pair of
/// generated names suffixed with a number unique within the evaluation, then
/// rewrites `#{item...}`/`#{index...}` placeholders in the rendered body to
/// those generated names so every iteration binds its own slot.
#[derive(Debug, Clone)]
pub struct ForeachSqlNode {
    collection: Expr,
    item: Option<String>,
    index: Option<String>,
    open: Option<String>,
    close: Option<String>,
    separator: Option<String>,
    nullable: Option<bool>,
    body: Box<SqlNode>,
}

impl ForeachSqlNode {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        collection: &str,
        item: Option<&str>,
        index: Option<&str>,
        open: Option<&str>,
        close: Option<&str>,
        separator: Option<&str>,
        nullable: Option<bool>,
        body: SqlNode,
    ) -> Result<ForeachSqlNode> {
        Ok(ForeachSqlNode {
            collection: Expr::parse(collection)?,
            item: item.map(str::to_string),
            index: index.map(str::to_string),
            open: open.map(str::to_string),
            close: close.map(str::to_string),
            separator: separator.map(str::to_string),
            nullable,
            body: Box::new(body),
        })
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        let nullable = self.nullable.unwrap_or(ctx.foreach_nullable_default());
        let entries = self.collection.eval_iterable(ctx.bindings(), nullable)?;
        if entries.is_empty() {
            return Ok(true);
        }

        if let Some(open) = &self.open {
            ctx.append_sql(open);
        }

        let mut first = true;
        for entry in entries {
            let unique = ctx.next_unique();

            if let Some(index) = &self.index {
                ctx.bind(index.clone(), entry.index.clone());
                ctx.bind(itemize(index, unique), entry.index.clone());
            }
            if let Some(item) = &self.item {
                ctx.bind(item.clone(), entry.item.clone());
                ctx.bind(itemize(item, unique), entry.item.clone());
            }

            let (_, rendered) = ctx.capture(|ctx| self.body.apply(ctx))?;
            let rendered = self.rewrite_placeholders(&rendered, unique)?;

            if rendered.trim().is_empty() {
                continue;
            }
            if !first {
                if let Some(separator) = &self.separator {
                    ctx.append_sql(separator);
                }
            }
            first = false;
            ctx.append_sql(&rendered);
        }

        if let Some(close) = &self.close {
            ctx.append_sql(close);
        }

        if let Some(item) = &self.item {
            ctx.unbind(item);
        }
        if let Some(index) = &self.index {
            ctx.unbind(index);
        }

        Ok(true)
    }

    /// Rewrites a leading bare `item`/`index` identifier inside each
    /// `#{...}` token to its per-iteration generated name. An identifier
    /// qualifies only when followed by the end of the token or one of
    /// `.`, `,`, `:` or whitespace, so `#{itemCount}` is left alone.
    fn rewrite_placeholders(&self, rendered: &str, unique: u32) -> Result<String> {
        TokenParser::placeholders().parse(rendered, &mut |body| {
            for name in [&self.item, &self.index].into_iter().flatten() {
                if let Some(rest) = strip_leading_name(body, name) {
                    return Ok(format!("#{{{}{rest}}}", itemize(name, unique)));
                }
            }
            Ok(format!("#{{{body}}}"))
        })
    }
}

fn itemize(name: &str, unique: u32) -> String {
    format!("{FOREACH_ITEM_PREFIX}{name}_{unique}")
}

/// If `body` starts (after optional whitespace) with `name` at an identifier
/// boundary, returns the remainder after the name.
fn strip_leading_name<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    let trimmed = body.trim_start();
    let rest = trimmed.strip_prefix(name)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c == '.' || c == ',' || c == ':' || c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RawSqlNode;
    use crate::value::ValueObject;
    use crate::Value;

    fn ids_ctx() -> RenderContext {
        let mut map = ValueObject::new();
        map.insert(
            "ids".to_string(),
            Value::List(vec![1i32.into(), 2i32.into(), 3i32.into()]),
        );
        RenderContext::new(Value::Object(map), None)
    }

    fn foreach(body: &str) -> ForeachSqlNode {
        ForeachSqlNode::new(
            "ids",
            Some("i"),
            None,
            Some("("),
            Some(")"),
            Some(","),
            None,
            RawSqlNode::new(body).into(),
        )
        .unwrap()
    }

    #[test]
    fn renames_and_binds_each_iteration() {
        let mut ctx = ids_ctx();
        foreach("#{i}").apply(&mut ctx).unwrap();

        assert_eq!(ctx.sql(), "( #{__frch_i_0} , #{__frch_i_1} , #{__frch_i_2} )");
        for (n, expected) in [(0, 1), (1, 2), (2, 3)] {
            assert_eq!(
                ctx.bindings().entries().get(&format!("__frch_i_{n}")),
                Some(&Value::Int(expected))
            );
        }
        // bare names are unbound after the loop
        assert!(!ctx.bindings().contains("i"));
    }

    #[test]
    fn leaves_unrelated_placeholders_alone() {
        let mut ctx = ids_ctx();
        foreach("#{i} #{iTotal}").apply(&mut ctx).unwrap();
        assert!(ctx.sql().contains("#{iTotal}"));
    }

    #[test]
    fn rewrites_dotted_item_paths() {
        let mut ctx = ids_ctx();
        foreach("#{i.code}").apply(&mut ctx).unwrap();
        assert!(ctx.sql().contains("#{__frch_i_0.code}"));
    }

    #[test]
    fn binds_map_entries_by_key() {
        let mut inner = ValueObject::new();
        inner.insert("a".to_string(), Value::Int(1));
        inner.insert("b".to_string(), Value::Int(2));
        let mut map = ValueObject::new();
        map.insert("attrs".to_string(), Value::Object(inner));
        let mut ctx = RenderContext::new(Value::Object(map), None);

        let node = ForeachSqlNode::new(
            "attrs",
            Some("v"),
            Some("k"),
            None,
            None,
            Some("AND"),
            None,
            RawSqlNode::new("#{k} = #{v}").into(),
        )
        .unwrap();
        node.apply(&mut ctx).unwrap();

        assert_eq!(
            ctx.sql(),
            "#{__frch_k_0} = #{__frch_v_0} AND #{__frch_k_1} = #{__frch_v_1}"
        );
        assert_eq!(
            ctx.bindings().entries().get("__frch_k_0"),
            Some(&Value::String("a".into()))
        );
    }

    #[test]
    fn null_collection_respects_nullable() {
        let empty = Value::Object(ValueObject::new());

        let mut strict = RenderContext::new(empty.clone(), None);
        assert!(foreach("#{i}").apply(&mut strict).is_err());

        let mut lenient =
            RenderContext::new(empty, None).with_foreach_nullable_default(true);
        foreach("#{i}").apply(&mut lenient).unwrap();
        assert_eq!(lenient.sql(), "");
    }

    #[test]
    fn unique_numbers_span_nested_invocations() {
        // Two sequential foreach nodes in one evaluation share the counter,
        // so their generated names never collide.
        let mut ctx = ids_ctx();
        foreach("#{i}").apply(&mut ctx).unwrap();
        foreach("#{i}").apply(&mut ctx).unwrap();
        assert!(ctx.sql().contains("__frch_i_0"));
        assert!(ctx.sql().contains("__frch_i_5"));
    }
}
