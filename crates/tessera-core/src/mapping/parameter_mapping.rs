use crate::ty::{SqlType, ValueKind};
use crate::type_handler::TypeHandler;
use crate::{Error, Result};

use std::sync::Arc;

/// Direction of one statement parameter slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParamMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParamMode {
    pub fn parse(name: &str) -> Result<ParamMode> {
        Ok(match name.to_ascii_uppercase().as_str() {
            "IN" => ParamMode::In,
            "OUT" => ParamMode::Out,
            "INOUT" => ParamMode::InOut,
            other => return Err(Error::parse(format!("unknown parameter mode `{other}`"))),
        })
    }
}

/// One slot of a prepared statement: the property path that supplies the
/// value, its declared kinds, and an optional handler override.
#[derive(Clone)]
pub struct ParameterMapping {
    property: String,
    mode: ParamMode,
    value_kind: ValueKind,
    sql_type: Option<SqlType>,
    sql_type_name: Option<String>,
    numeric_scale: Option<u32>,
    type_handler: Option<Arc<dyn TypeHandler>>,
    /// Inline result-map reference for cursor OUT parameters.
    result_map_id: Option<String>,
}

impl ParameterMapping {
    pub fn builder(property: impl Into<String>) -> ParameterMappingBuilder {
        ParameterMappingBuilder {
            mapping: ParameterMapping {
                property: property.into(),
                mode: ParamMode::In,
                value_kind: ValueKind::Any,
                sql_type: None,
                sql_type_name: None,
                numeric_scale: None,
                type_handler: None,
                result_map_id: None,
            },
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn mode(&self) -> ParamMode {
        self.mode
    }

    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    pub fn sql_type(&self) -> Option<SqlType> {
        self.sql_type
    }

    pub fn sql_type_name(&self) -> Option<&str> {
        self.sql_type_name.as_deref()
    }

    pub fn numeric_scale(&self) -> Option<u32> {
        self.numeric_scale
    }

    pub fn type_handler(&self) -> Option<&Arc<dyn TypeHandler>> {
        self.type_handler.as_ref()
    }

    pub fn result_map_id(&self) -> Option<&str> {
        self.result_map_id.as_deref()
    }
}

impl core::fmt::Debug for ParameterMapping {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("ParameterMapping")
            .field("property", &self.property)
            .field("mode", &self.mode)
            .field("value_kind", &self.value_kind)
            .field("sql_type", &self.sql_type)
            .finish()
    }
}

pub struct ParameterMappingBuilder {
    mapping: ParameterMapping,
}

impl ParameterMappingBuilder {
    pub fn mode(mut self, mode: ParamMode) -> Self {
        self.mapping.mode = mode;
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

    pub fn sql_type_name(mut self, name: Option<String>) -> Self {
        self.mapping.sql_type_name = name;
        self
    }

    pub fn numeric_scale(mut self, scale: Option<u32>) -> Self {
        self.mapping.numeric_scale = scale;
        self
    }

    pub fn type_handler(mut self, handler: Option<Arc<dyn TypeHandler>>) -> Self {
        self.mapping.type_handler = handler;
        self
    }

    pub fn result_map_id(mut self, id: Option<String>) -> Self {
        self.mapping.result_map_id = id;
        self
    }

    pub fn build(self) -> ParameterMapping {
        self.mapping
    }
}
