use super::SqlNode;
use crate::render::RenderContext;
use crate::Result;

/// An ordered sequence of child nodes.
#[derive(Debug, Clone)]
pub struct MixedSqlNode {
    children: Vec<SqlNode>,
}

impl MixedSqlNode {
    pub fn new(children: Vec<SqlNode>) -> MixedSqlNode {
        MixedSqlNode { children }
    }

    pub fn children(&self) -> &[SqlNode] {
        &self.children
    }

    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        for child in &self.children {
            child.apply(ctx)?;
        }
        Ok(true)
    }
}
