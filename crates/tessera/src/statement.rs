mod parameter;
pub use parameter::DefaultParameterHandler;

mod handler;
pub use handler::DefaultStatementHandler;

use tessera_core::exec::{RowBounds, StatementHandler};
use tessera_core::mapping::MappedStatement;
use tessera_core::{plugin, Configuration, Result, Value};

use std::sync::Arc;

/// Builds the statement handler for one execution and folds the plugin
/// chain over it. One of the four interception construction points.
pub fn new_statement_handler(
    config: &Arc<Configuration>,
    ms: &Arc<MappedStatement>,
    parameter: Value,
    row_bounds: RowBounds,
) -> Result<Box<dyn StatementHandler>> {
    let handler = DefaultStatementHandler::new(config.clone(), ms.clone(), parameter, row_bounds)?;
    Ok(plugin::wrap_statement_handler(
        Box::new(handler),
        config.interceptors(),
    ))
}
