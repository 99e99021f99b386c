use super::{BoundSql, ParameterMapping};
use crate::{Configuration, Result, Value};

/// Produces the bound SQL for one invocation.
///
/// Static sources pair prebuilt text and mappings with the parameter;
/// dynamic sources evaluate their node tree and run the placeholder
/// rewriter per call.
pub trait SqlSource: Send + Sync {
    fn bound_sql(&self, config: &Configuration, parameter: &Value) -> Result<BoundSql>;
}

impl std::fmt::Debug for dyn SqlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn SqlSource")
    }
}

/// A fully-rewritten source: statement text with `?` placeholders and the
/// parameter mappings in textual order.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    pub fn new(sql: String, parameter_mappings: Vec<ParameterMapping>) -> StaticSqlSource {
        StaticSqlSource {
            sql,
            parameter_mappings,
        }
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, _config: &Configuration, parameter: &Value) -> Result<BoundSql> {
        Ok(BoundSql::new(
            self.sql.clone(),
            self.parameter_mappings.clone(),
            parameter.clone(),
        ))
    }
}
