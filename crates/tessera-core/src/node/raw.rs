use crate::render::RenderContext;
use crate::Result;

/// Static SQL text, appended without any per-invocation processing.
#[derive(Debug, Clone)]
pub struct RawSqlNode {
    text: String,
}

impl RawSqlNode {
    pub fn new(text: impl Into<String>) -> RawSqlNode {
        RawSqlNode { text: text.into() }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        ctx.append_sql(&self.text);
        Ok(true)
    }
}
