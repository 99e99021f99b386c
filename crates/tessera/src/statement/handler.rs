use super::DefaultParameterHandler;
use crate::cursor::DefaultCursor;
use crate::resultset::RowProjector;

use tessera_core::driver::{Connection, Statement, StatementOptions};
use tessera_core::exec::{
    Executor, ParameterHandler, ResultHandler, ResultSetHandler, RowBounds, RowCursor,
    StatementHandler,
};
use tessera_core::mapping::{BoundSql, MappedStatement, ParamMode, StatementType};
use tessera_core::{plugin, Configuration, Error, Result, Value};

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Drives one statement through the driver for all three statement kinds:
/// text statements skip binding, prepared statements bind through type
/// handlers, callable statements additionally register and read OUT
/// parameters.
pub struct DefaultStatementHandler {
    config: Arc<Configuration>,
    ms: Arc<MappedStatement>,
    parameter: Value,
    row_bounds: RowBounds,
    bound_sql: BoundSql,
    parameter_handler: Box<dyn ParameterHandler>,
}

impl DefaultStatementHandler {
    pub fn new(
        config: Arc<Configuration>,
        ms: Arc<MappedStatement>,
        parameter: Value,
        row_bounds: RowBounds,
    ) -> Result<DefaultStatementHandler> {
        let bound_sql = ms.bound_sql(&config, &parameter)?;

        // Construction point for parameter-handler interception.
        let parameter_handler = plugin::wrap_parameter_handler(
            Box::new(DefaultParameterHandler::new(
                config.clone(),
                parameter.clone(),
                bound_sql.clone(),
            )),
            config.interceptors(),
        );

        Ok(DefaultStatementHandler {
            config,
            ms,
            parameter,
            row_bounds,
            bound_sql,
            parameter_handler,
        })
    }

    fn new_projector(&self) -> Box<dyn ResultSetHandler> {
        // Construction point for result-set-handler interception.
        plugin::wrap_result_set_handler(
            Box::new(RowProjector::new(
                self.config.clone(),
                self.ms.clone(),
                self.parameter.clone(),
                self.bound_sql.clone(),
                self.row_bounds,
            )),
            self.config.interceptors(),
        )
    }

    fn register_out_parameters(&self, stmt: &mut dyn Statement) -> Result<()> {
        for (i, mapping) in self.bound_sql.parameter_mappings().iter().enumerate() {
            if matches!(mapping.mode(), ParamMode::Out | ParamMode::InOut) {
                let sql_type = mapping.sql_type().ok_or_else(|| {
                    Error::type_handler(format!(
                        "OUT parameter `{}` requires an explicit SQL type",
                        mapping.property()
                    ))
                })?;
                stmt.register_out(i + 1, sql_type)?;
            }
        }
        Ok(())
    }

    fn wrap_sql_failure(&self, activity: &str, err: Error) -> Error {
        err.context(Error::sql_execution(
            self.ms.resource(),
            activity,
            self.ms.id(),
            self.bound_sql.sql(),
            "statement execution failed",
        ))
    }
}

impl StatementHandler for DefaultStatementHandler {
    fn prepare(
        &mut self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<Duration>,
    ) -> Result<Box<dyn Statement>> {
        let timeout = match (self.ms.timeout(), transaction_timeout) {
            (Some(statement), Some(transaction)) => Some(statement.min(transaction)),
            (timeout, transaction) => timeout.or(transaction),
        };

        let wants_keys = self
            .ms
            .key_generator()
            .map(|generator| generator.wants_generated_keys())
            .unwrap_or(false);

        let options = StatementOptions {
            callable: self.ms.statement_type() == StatementType::Callable,
            return_generated_keys: wants_keys,
            result_set_type: self.ms.result_set_type(),
            timeout,
            fetch_size: self.ms.fetch_size(),
        };

        debug!(statement = self.ms.id(), sql = self.bound_sql.sql(), "preparing");
        connection
            .prepare(self.bound_sql.sql(), &options)
            .map_err(|err| self.wrap_sql_failure("preparing a statement", err))
    }

    fn parameterize(&mut self, stmt: &mut dyn Statement) -> Result<()> {
        match self.ms.statement_type() {
            StatementType::Statement => Ok(()),
            StatementType::Prepared => self.parameter_handler.set_parameters(stmt),
            StatementType::Callable => {
                self.register_out_parameters(stmt)?;
                self.parameter_handler.set_parameters(stmt)
            }
        }
    }

    fn batch(&mut self, stmt: &mut dyn Statement) -> Result<()> {
        stmt.add_batch()
    }

    fn update(&mut self, executor: &mut dyn Executor, stmt: &mut dyn Statement) -> Result<u64> {
        stmt.execute()
            .map_err(|err| self.wrap_sql_failure("executing an update", err))?;
        let rows = stmt.update_count().unwrap_or(0);

        if self.ms.statement_type() == StatementType::Callable {
            let mut projector = self.new_projector();
            projector.handle_output_parameters(executor, stmt)?;
            self.parameter = projector.parameter().clone();
        }

        if let Some(generator) = self.ms.key_generator().cloned() {
            generator.process_after(executor, &self.ms, Some(stmt), &mut self.parameter)?;
        }
        Ok(rows)
    }

    fn query(
        &mut self,
        executor: &mut dyn Executor,
        stmt: &mut dyn Statement,
        result_handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<tessera_core::exec::RowHandle>> {
        stmt.execute()
            .map_err(|err| self.wrap_sql_failure("executing a query", err))?;

        let mut projector = self.new_projector();
        let rows = projector.handle_result_sets(executor, stmt, result_handler)?;
        if self.ms.statement_type() == StatementType::Callable {
            projector.handle_output_parameters(executor, stmt)?;
            self.parameter = projector.parameter().clone();
        }
        Ok(rows)
    }

    fn query_cursor(&mut self, mut stmt: Box<dyn Statement>) -> Result<Box<dyn RowCursor>> {
        stmt.execute()
            .map_err(|err| self.wrap_sql_failure("executing a query", err))?;
        let cursor = DefaultCursor::new(
            self.config.clone(),
            self.ms.clone(),
            stmt,
            self.row_bounds,
        )?;
        Ok(Box::new(cursor))
    }

    fn bound_sql(&self) -> &BoundSql {
        &self.bound_sql
    }

    fn parameter(&self) -> &Value {
        &self.parameter
    }
}
