use super::Session;
use crate::executor::new_executor;

use tessera_core::exec::ExecutorType;
use tessera_core::{Configuration, Error, Result};

use std::sync::Arc;

/// Creates sessions against one built configuration. The configuration is
/// immutable once the factory owns it; sessions share it by reference.
pub struct SessionFactory {
    config: Arc<Configuration>,
}

impl SessionFactory {
    pub fn new(config: Configuration) -> SessionFactory {
        SessionFactory {
            config: Arc::new(config),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.config
    }

    /// Opens a session on the default executor type without auto-commit.
    pub fn open(&self) -> Result<Session> {
        self.open_with(self.config.settings().default_executor_type, false)
    }

    pub fn open_with(&self, executor_type: ExecutorType, auto_commit: bool) -> Result<Session> {
        let environment = self.config.environment().ok_or_else(|| {
            Error::executor("configuration declares no environment to open a session against")
        })?;
        let transaction = environment
            .transaction_factory()
            .new_transaction(environment.data_source().as_ref(), auto_commit)?;
        let executor = new_executor(&self.config, transaction, executor_type);
        Ok(Session::new(self.config.clone(), executor, auto_commit))
    }
}
