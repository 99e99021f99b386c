use super::SqlNode;
use crate::render::RenderContext;
use crate::Result;

/// `<trim>`: renders its body into a side buffer, strips a leading/trailing
/// override token, then attaches the configured prefix/suffix.
///
/// Override lists are `|`-separated and matched case-insensitively against
/// the trimmed body; only the first matching override on each side is
/// removed, so re-applying a trim to its own output is a no-op.
#[derive(Debug, Clone)]
pub struct TrimSqlNode {
    body: Box<SqlNode>,
    prefix: Option<String>,
    suffix: Option<String>,
    prefix_overrides: Vec<String>,
    suffix_overrides: Vec<String>,
}

impl TrimSqlNode {
    pub fn new(
        body: SqlNode,
        prefix: Option<&str>,
        prefix_overrides: Option<&str>,
        suffix: Option<&str>,
        suffix_overrides: Option<&str>,
    ) -> TrimSqlNode {
        TrimSqlNode {
            body: Box::new(body),
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
            prefix_overrides: parse_overrides(prefix_overrides),
            suffix_overrides: parse_overrides(suffix_overrides),
        }
    }

    fn with_overrides(
        body: SqlNode,
        prefix: Option<&str>,
        prefix_overrides: Vec<String>,
        suffix: Option<&str>,
        suffix_overrides: Vec<String>,
    ) -> TrimSqlNode {
        TrimSqlNode {
            body: Box::new(body),
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
            prefix_overrides,
            suffix_overrides,
        }
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        let (applied, rendered) = ctx.capture(|ctx| self.body.apply(ctx))?;
        let processed = self.process(&rendered);
        if !processed.is_empty() {
            ctx.append_sql(&processed);
        }
        Ok(applied)
    }

    fn process(&self, rendered: &str) -> String {
        let mut sql = rendered.trim().to_string();
        if sql.is_empty() {
            return sql;
        }

        let upper = sql.to_uppercase();
        if let Some(matched) = self
            .prefix_overrides
            .iter()
            .find(|over| upper.starts_with(over.as_str()))
        {
            sql.drain(..matched.len());
        }

        let upper = sql.to_uppercase();
        if let Some(matched) = self
            .suffix_overrides
            .iter()
            .find(|over| upper.ends_with(over.as_str()) || upper.ends_with(over.trim_end()))
        {
            let cut = if upper.ends_with(matched.as_str()) {
                matched.len()
            } else {
                matched.trim_end().len()
            };
            sql.truncate(sql.len() - cut);
        }

        if let Some(prefix) = &self.prefix {
            sql = format!("{prefix} {}", sql.trim_start());
        }
        if let Some(suffix) = &self.suffix {
            sql = format!("{} {suffix}", sql.trim_end());
        }
        sql
    }
}

fn parse_overrides(overrides: Option<&str>) -> Vec<String> {
    overrides
        .map(|list| {
            list.split('|')
                .filter(|over| !over.is_empty())
                .map(str::to_uppercase)
                .collect()
        })
        .unwrap_or_default()
}

/// `<where>`: a trim with the `WHERE` prefix that swallows a leading
/// `AND`/`OR` connective.
#[derive(Debug, Clone)]
pub struct WhereSqlNode {
    inner: TrimSqlNode,
}

impl WhereSqlNode {
    pub fn new(body: SqlNode) -> WhereSqlNode {
        let overrides = ["AND ", "OR ", "AND\n", "OR\n", "AND\r", "OR\r", "AND\t", "OR\t"]
            .iter()
            .map(|over| over.to_string())
            .collect();
        WhereSqlNode {
            inner: TrimSqlNode::with_overrides(body, Some("WHERE"), overrides, None, vec![]),
        }
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        self.inner.apply(ctx)
    }
}

/// `<set>`: a trim with the `SET` prefix that swallows a stray comma on
/// either side.
#[derive(Debug, Clone)]
pub struct SetSqlNode {
    inner: TrimSqlNode,
}

impl SetSqlNode {
    pub fn new(body: SqlNode) -> SetSqlNode {
        SetSqlNode {
            inner: TrimSqlNode::with_overrides(
                body,
                Some("SET"),
                vec![",".to_string()],
                None,
                vec![",".to_string()],
            ),
        }
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        self.inner.apply(ctx)
    }
}
