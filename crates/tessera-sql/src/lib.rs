mod assistant;
pub use assistant::{BuilderAssistant, StatementSpec};

mod config;
pub use config::{ConfigBuilder, DatabaseIdProvider, Resources};

mod dsl;
pub use dsl::{MapperBuilder, SelectKeySpec, StatementDsl, StatementOptions};

mod include;
pub use include::IncludeExpander;

mod mapper;
pub use mapper::MapperDocumentBuilder;

mod param_expr;
pub use param_expr::ParamExpression;

mod props;

mod script;
pub use script::{ScriptBuilder, XmlLanguageDriver, XML_LANGUAGE};

mod source;
pub use source::{DynamicSqlSource, ProviderSqlSource, RawSqlSource, SqlSourceBuilder};

mod statement;
pub use statement::StatementDocumentBuilder;

pub use tessera_core::{Error, Result};

use std::sync::Arc;
use tessera_core::Configuration;

/// Creates a configuration with the XML language driver installed as the
/// default. Entry point for both document-based and programmatic builds.
pub fn configuration() -> Configuration {
    let mut config = Configuration::new();
    config.register_language(XML_LANGUAGE, Arc::new(XmlLanguageDriver));
    config
}
