use tessera_core::driver::Statement;
use tessera_core::exec::ParameterHandler;
use tessera_core::mapping::{BoundSql, ParamMode};
use tessera_core::ty::ValueKind;
use tessera_core::{Configuration, Result, Value};

use std::sync::Arc;
use tracing::trace;

/// Binds the bound SQL's parameter mappings into a prepared statement, in
/// slot order: per-evaluation bindings first, then parameter-object
/// navigation, with a bare scalar parameter answering any property.
pub struct DefaultParameterHandler {
    config: Arc<Configuration>,
    parameter: Value,
    bound_sql: BoundSql,
}

impl DefaultParameterHandler {
    pub fn new(
        config: Arc<Configuration>,
        parameter: Value,
        bound_sql: BoundSql,
    ) -> DefaultParameterHandler {
        DefaultParameterHandler {
            config,
            parameter,
            bound_sql,
        }
    }
}

impl ParameterHandler for DefaultParameterHandler {
    fn parameter(&self) -> &Value {
        &self.parameter
    }

    fn set_parameters(&mut self, stmt: &mut dyn Statement) -> Result<()> {
        for (i, mapping) in self.bound_sql.parameter_mappings().iter().enumerate() {
            if mapping.mode() == ParamMode::Out {
                continue;
            }

            let value = self.bound_sql.value_of(mapping.property())?;
            trace!(slot = i + 1, property = mapping.property(), value = %value, "binding parameter");

            let handler = match mapping.type_handler() {
                Some(handler) => handler.clone(),
                None => {
                    let kind = match mapping.value_kind() {
                        ValueKind::Any => ValueKind::of(&value),
                        declared => declared,
                    };
                    self.config.type_handlers().resolve(kind, mapping.sql_type())
                }
            };
            handler.set_parameter(stmt, i + 1, &value, mapping.sql_type())?;
        }
        Ok(())
    }
}
