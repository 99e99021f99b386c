mod bind;
pub use bind::BindSqlNode;

mod branch;
pub use branch::{ChooseSqlNode, IfSqlNode};

mod foreach;
pub use foreach::{ForeachSqlNode, FOREACH_ITEM_PREFIX};

mod mixed;
pub use mixed::MixedSqlNode;

mod raw;
pub use raw::RawSqlNode;

mod text;
pub use text::TextSqlNode;

mod trim;
pub use trim::{SetSqlNode, TrimSqlNode, WhereSqlNode};

use crate::render::RenderContext;
use crate::Result;

/// One node of a compiled SQL template.
///
/// `apply` renders the node into the context's SQL buffer and may touch the
/// binding map; it reports whether the node contributed anything, which
/// `<choose>` uses to pick a branch.
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// Static text appended verbatim.
    Raw(RawSqlNode),
    /// Text with `${...}` interpolation applied per evaluation.
    Text(TextSqlNode),
    Mixed(MixedSqlNode),
    If(IfSqlNode),
    Choose(ChooseSqlNode),
    Trim(TrimSqlNode),
    Where(WhereSqlNode),
    Set(SetSqlNode),
    Foreach(ForeachSqlNode),
    /// `<bind>`: declares a named value computed from an expression.
    Bind(BindSqlNode),
}

impl SqlNode {
    pub fn apply(&self, ctx: &mut RenderContext) -> Result<bool> {
        match self {
            SqlNode::Raw(node) => node.apply(ctx),
            SqlNode::Text(node) => node.apply(ctx),
            SqlNode::Mixed(node) => node.apply(ctx),
            SqlNode::If(node) => node.apply(ctx),
            SqlNode::Choose(node) => node.apply(ctx),
            SqlNode::Trim(node) => node.apply(ctx),
            SqlNode::Where(node) => node.apply(ctx),
            SqlNode::Set(node) => node.apply(ctx),
            SqlNode::Foreach(node) => node.apply(ctx),
            SqlNode::Bind(node) => node.apply(ctx),
        }
    }

    /// Whether this node forces per-invocation evaluation. A template whose
    /// nodes are all static is compiled once at build time.
    pub fn is_dynamic(&self) -> bool {
        match self {
            SqlNode::Raw(_) => false,
            SqlNode::Text(node) => node.is_dynamic(),
            SqlNode::Mixed(node) => node.children().iter().any(SqlNode::is_dynamic),
            _ => true,
        }
    }
}

macro_rules! impl_from_node {
    ( $( $variant:ident => $ty:ty ),* $(,)? ) => {
        $(
            impl From<$ty> for SqlNode {
                fn from(node: $ty) -> SqlNode {
                    SqlNode::$variant(node)
                }
            }
        )*
    };
}

impl_from_node! {
    Raw => RawSqlNode,
    Text => TextSqlNode,
    Mixed => MixedSqlNode,
    If => IfSqlNode,
    Choose => ChooseSqlNode,
    Trim => TrimSqlNode,
    Where => WhereSqlNode,
    Set => SetSqlNode,
    Foreach => ForeachSqlNode,
    Bind => BindSqlNode,
}
