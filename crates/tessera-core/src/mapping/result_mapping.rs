use crate::ty::{SqlType, ValueKind};
use crate::type_handler::TypeHandler;

use std::collections::HashSet;
use std::sync::Arc;

/// Role markers for a result mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFlag {
    /// Participates in the row key used to group nested results.
    Id,
    /// Feeds a constructor argument instead of a property.
    Constructor,
}

/// One entry of a result map: which column feeds which property (or
/// constructor argument), how it converts, and whether it fans out into a
/// nested query, a nested result map, or another result set.
#[derive(Clone)]
pub struct ResultMapping {
    property: Option<String>,
    column: Option<String>,
    value_kind: ValueKind,
    sql_type: Option<SqlType>,
    type_handler: Option<Arc<dyn TypeHandler>>,
    flags: Vec<ResultFlag>,
    /// Composite `{prop=col,...}` sub-mappings for multi-column keys.
    composites: Vec<ResultMapping>,
    nested_query_id: Option<String>,
    nested_result_map_id: Option<String>,
    column_prefix: Option<String>,
    not_null_columns: HashSet<String>,
    result_set: Option<String>,
    foreign_column: Option<String>,
    lazy: bool,
}

impl ResultMapping {
    pub fn builder() -> ResultMappingBuilder {
        ResultMappingBuilder {
            mapping: ResultMapping {
                property: None,
                column: None,
                value_kind: ValueKind::Any,
                sql_type: None,
                type_handler: None,
                flags: vec![],
                composites: vec![],
                nested_query_id: None,
                nested_result_map_id: None,
                column_prefix: None,
                not_null_columns: HashSet::new(),
                result_set: None,
                foreign_column: None,
                lazy: false,
            },
        }
    }

    pub fn property(&self) -> Option<&str> {
        self.property.as_deref()
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref()
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    pub fn sql_type(&self) -> Option<SqlType> {
        self.sql_type
    }

    pub fn type_handler(&self) -> Option<&Arc<dyn TypeHandler>> {
        self.type_handler.as_ref()
    }

    pub fn flags(&self) -> &[ResultFlag] {
        &self.flags
    }

    pub fn is_id(&self) -> bool {
        self.flags.contains(&ResultFlag::Id)
    }

    pub fn is_constructor(&self) -> bool {
        self.flags.contains(&ResultFlag::Constructor)
    }

    pub fn composites(&self) -> &[ResultMapping] {
        &self.composites
    }

    pub fn nested_query_id(&self) -> Option<&str> {
        self.nested_query_id.as_deref()
    }

    pub fn nested_result_map_id(&self) -> Option<&str> {
        self.nested_result_map_id.as_deref()
    }

    pub fn column_prefix(&self) -> Option<&str> {
        self.column_prefix.as_deref()
    }

    pub fn not_null_columns(&self) -> &HashSet<String> {
        &self.not_null_columns
    }

    pub fn result_set(&self) -> Option<&str> {
        self.result_set.as_deref()
    }

    pub fn foreign_column(&self) -> Option<&str> {
        self.foreign_column.as_deref()
    }

    pub fn lazy(&self) -> bool {
        self.lazy
    }
}

impl core::fmt::Debug for ResultMapping {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("ResultMapping")
            .field("property", &self.property)
            .field("column", &self.column)
            .field("flags", &self.flags)
            .field("nested_query_id", &self.nested_query_id)
            .field("nested_result_map_id", &self.nested_result_map_id)
            .field("result_set", &self.result_set)
            .finish()
    }
}

pub struct ResultMappingBuilder {
    mapping: ResultMapping,
}

impl ResultMappingBuilder {
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.mapping.property = Some(property.into());
        self
    }

    pub fn column(mut self, column: Option<String>) -> Self {
        self.mapping.column = column;
        self
    }

    pub fn value_kind(mut self, kind: ValueKind) -> Self {
        self.mapping.value_kind = kind;
        self
    }

    pub fn sql_type(mut self, sql_type: Option<SqlType>) -> Self {
        self.mapping.sql_type = sql_type;
        self
    }

    pub fn type_handler(mut self, handler: Option<Arc<dyn TypeHandler>>) -> Self {
        self.mapping.type_handler = handler;
        self
    }

    pub fn flags(mut self, flags: Vec<ResultFlag>) -> Self {
        self.mapping.flags = flags;
        self
    }

    pub fn composites(mut self, composites: Vec<ResultMapping>) -> Self {
        self.mapping.composites = composites;
        self
    }

    pub fn nested_query_id(mut self, id: Option<String>) -> Self {
        self.mapping.nested_query_id = id;
        self
    }

    pub fn nested_result_map_id(mut self, id: Option<String>) -> Self {
        self.mapping.nested_result_map_id = id;
        self
    }

    pub fn column_prefix(mut self, prefix: Option<String>) -> Self {
        self.mapping.column_prefix = prefix;
        self
    }

    pub fn not_null_columns(mut self, columns: HashSet<String>) -> Self {
        self.mapping.not_null_columns = columns;
        self
    }

    pub fn result_set(mut self, result_set: Option<String>) -> Self {
        self.mapping.result_set = result_set;
        self
    }

    pub fn foreign_column(mut self, column: Option<String>) -> Self {
        self.mapping.foreign_column = column;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.mapping.lazy = lazy;
        self
    }

    pub fn build(self) -> ResultMapping {
        self.mapping
    }
}
