use crate::driver::{DataSource, TransactionFactory};

use std::sync::Arc;

/// One configured database environment: its id, the transaction factory,
/// and the data source. The id participates in cache keys so regions never
/// mix rows from different environments.
#[derive(Clone)]
pub struct Environment {
    id: String,
    transaction_factory: Arc<dyn TransactionFactory>,
    data_source: Arc<dyn DataSource>,
}

impl Environment {
    pub fn new(
        id: impl Into<String>,
        transaction_factory: Arc<dyn TransactionFactory>,
        data_source: Arc<dyn DataSource>,
    ) -> Environment {
        Environment {
            id: id.into(),
            transaction_factory,
            data_source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn transaction_factory(&self) -> &Arc<dyn TransactionFactory> {
        &self.transaction_factory
    }

    pub fn data_source(&self) -> &Arc<dyn DataSource> {
        &self.data_source
    }
}

impl core::fmt::Debug for Environment {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("Environment").field("id", &self.id).finish()
    }
}
