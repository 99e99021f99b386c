use super::ParameterMapping;
use crate::meta::MetaValue;
use crate::path::PropertyPath;
use crate::value::ValueObject;
use crate::{Result, Value};

/// The per-invocation artifact a `SqlSource` produces: final statement text
/// with `?` placeholders, the ordered parameter mappings that fill them, the
/// parameter object, and any additional named bindings produced during
/// evaluation (`<bind>` results, foreach iteration variables).
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    parameter: Value,
    additional: ValueObject,
}

impl BoundSql {
    pub fn new(sql: String, parameter_mappings: Vec<ParameterMapping>, parameter: Value) -> BoundSql {
        BoundSql {
            sql,
            parameter_mappings,
            parameter,
            additional: ValueObject::new(),
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    pub fn parameter(&self) -> &Value {
        &self.parameter
    }

    pub fn set_additional(&mut self, name: impl Into<String>, value: Value) {
        self.additional.insert(name.into(), value);
    }

    pub fn has_additional(&self, name: &str) -> bool {
        let head = name.split(['.', '[']).next().unwrap_or(name);
        self.additional.contains_key(head)
    }

    pub fn additional(&self) -> &ValueObject {
        &self.additional
    }

    /// Resolves a mapping's property: additional bindings win (this is where
    /// per-iteration `__frch_*` names live), then the parameter object is
    /// navigated, and a bare scalar parameter answers any single-segment
    /// property.
    pub fn value_of(&self, property: &str) -> Result<Value> {
        let path = PropertyPath::parse(property)?;
        if self.has_additional(property) {
            let scoped = Value::Object(self.additional.clone());
            return MetaValue::new(&scoped).get_path(&path);
        }
        match &self.parameter {
            Value::Object(_) | Value::Proxy(_) => {
                MetaValue::new(&self.parameter).get_path(&path)
            }
            scalar => Ok(scalar.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn additional_bindings_shadow_parameter() {
        let mut object = ValueObject::new();
        object.insert("id".to_string(), Value::Long(1));
        let mut bound = BoundSql::new("?".to_string(), vec![], Value::Object(object));

        assert_eq!(bound.value_of("id").unwrap(), Value::Long(1));

        bound.set_additional("id", Value::Long(2));
        assert_eq!(bound.value_of("id").unwrap(), Value::Long(2));
    }

    #[test]
    fn scalar_parameter_answers_any_property() {
        let bound = BoundSql::new("?".to_string(), vec![], Value::Long(7));
        assert_eq!(bound.value_of("id").unwrap(), Value::Long(7));
        assert_eq!(bound.value_of("whatever").unwrap(), Value::Long(7));
    }
}
