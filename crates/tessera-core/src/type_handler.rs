mod builtin;
pub use builtin::{
    AnyTypeHandler, BoolTypeHandler, BytesTypeHandler, DecimalTypeHandler, DoubleTypeHandler,
    IntTypeHandler, LongTypeHandler, StringTypeHandler, TimestampTypeHandler, UuidTypeHandler,
};

use crate::driver::{ResultSet, Statement};
use crate::ty::{SqlType, ValueKind};
use crate::{Error, Result, Value};

use indexmap::IndexMap;
use std::sync::Arc;

/// Bidirectional codec between an engine value and a driver column.
///
/// `set_parameter` coerces and binds one prepared-statement slot;
/// `result` reads one column of the current row back into the handler's
/// value shape. Nulls pass through both directions untouched.
pub trait TypeHandler: Send + Sync {
    fn set_parameter(
        &self,
        stmt: &mut dyn Statement,
        index: usize,
        value: &Value,
        sql_type: Option<SqlType>,
    ) -> Result<()>;

    fn result(&self, rs: &dyn ResultSet, column_index: usize) -> Result<Value>;
}

/// Registry of type handlers, keyed by value kind, by (kind, SQL type)
/// override, and by name for `typeHandler="..."` attributes.
pub struct TypeHandlerRegistry {
    by_kind: IndexMap<ValueKind, Arc<dyn TypeHandler>>,
    by_pair: IndexMap<(ValueKind, SqlType), Arc<dyn TypeHandler>>,
    named: IndexMap<String, Arc<dyn TypeHandler>>,
    any: Arc<dyn TypeHandler>,
}

impl TypeHandlerRegistry {
    pub fn new() -> TypeHandlerRegistry {
        let mut registry = TypeHandlerRegistry {
            by_kind: IndexMap::new(),
            by_pair: IndexMap::new(),
            named: IndexMap::new(),
            any: Arc::new(AnyTypeHandler),
        };

        registry.register_kind(ValueKind::Bool, Arc::new(BoolTypeHandler));
        registry.register_kind(ValueKind::Int, Arc::new(IntTypeHandler));
        registry.register_kind(ValueKind::Long, Arc::new(LongTypeHandler));
        registry.register_kind(ValueKind::Double, Arc::new(DoubleTypeHandler));
        registry.register_kind(ValueKind::Decimal, Arc::new(DecimalTypeHandler));
        registry.register_kind(ValueKind::String, Arc::new(StringTypeHandler));
        registry.register_kind(ValueKind::Bytes, Arc::new(BytesTypeHandler));
        registry.register_kind(ValueKind::Uuid, Arc::new(UuidTypeHandler));
        registry.register_kind(ValueKind::Timestamp, Arc::new(TimestampTypeHandler));
        registry
    }

    pub fn register_kind(&mut self, kind: ValueKind, handler: Arc<dyn TypeHandler>) {
        self.by_kind.insert(kind, handler);
    }

    pub fn register_pair(
        &mut self,
        kind: ValueKind,
        sql_type: SqlType,
        handler: Arc<dyn TypeHandler>,
    ) {
        self.by_pair.insert((kind, sql_type), handler);
    }

    pub fn register_named(&mut self, name: impl Into<String>, handler: Arc<dyn TypeHandler>) {
        self.named.insert(name.into(), handler);
    }

    /// Whether a scalar handler exists for the kind. Objects and lists
    /// report `false`; they are mapped structurally, not through a handler.
    pub fn has(&self, kind: ValueKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Resolves the handler for a (kind, SQL type) pair. A pair-specific
    /// override wins over the kind handler; `Any`, objects and lists fall
    /// back to the pass-through handler.
    pub fn resolve(&self, kind: ValueKind, sql_type: Option<SqlType>) -> Arc<dyn TypeHandler> {
        if let Some(sql_type) = sql_type {
            if let Some(handler) = self.by_pair.get(&(kind, sql_type)) {
                return handler.clone();
            }
        }
        self.by_kind.get(&kind).cloned().unwrap_or_else(|| self.any.clone())
    }

    /// Resolves a handler registered under an explicit name.
    pub fn named(&self, name: &str) -> Result<Arc<dyn TypeHandler>> {
        self.named
            .get(name)
            .cloned()
            .ok_or_else(|| Error::type_handler(format!("no type handler registered as `{name}`")))
    }
}

impl Default for TypeHandlerRegistry {
    fn default() -> TypeHandlerRegistry {
        TypeHandlerRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_kinds_have_handlers() {
        let registry = TypeHandlerRegistry::new();
        assert!(registry.has(ValueKind::Long));
        assert!(registry.has(ValueKind::Uuid));
        assert!(!registry.has(ValueKind::Object));
        assert!(!registry.has(ValueKind::Any));
    }

    #[test]
    fn pair_override_wins() {
        let mut registry = TypeHandlerRegistry::new();
        registry.register_pair(
            ValueKind::String,
            SqlType::Clob,
            Arc::new(StringTypeHandler),
        );
        // no panic and a handler comes back; identity is not observable, so
        // just exercise both paths
        registry.resolve(ValueKind::String, Some(SqlType::Clob));
        registry.resolve(ValueKind::String, Some(SqlType::Varchar));
        registry.resolve(ValueKind::Object, None);
    }

    #[test]
    fn named_lookup_errors_when_missing() {
        let registry = TypeHandlerRegistry::new();
        assert!(registry.named("jsonHandler").is_err());
    }
}
