use super::{Executor, KeyGenerator, RowBounds};
use crate::driver::{column_index, Statement};
use crate::mapping::MappedStatement;
use crate::meta::MetaValueMut;
use crate::{Error, Result, Value};

use std::sync::Arc;

/// Key generator that does nothing.
#[derive(Debug, Default)]
pub struct NoKeyGenerator;

impl KeyGenerator for NoKeyGenerator {
    fn process_before(
        &self,
        _executor: &mut dyn Executor,
        _ms: &Arc<MappedStatement>,
        _parameter: &mut Value,
    ) -> Result<()> {
        Ok(())
    }

    fn process_after(
        &self,
        _executor: &mut dyn Executor,
        _ms: &Arc<MappedStatement>,
        _stmt: Option<&mut dyn Statement>,
        _parameter: &mut Value,
    ) -> Result<()> {
        Ok(())
    }
}

/// Reads driver-generated keys after execution and writes them into the
/// statement's `keyProperty` paths. Multi-row inserts pair generated rows
/// with list elements positionally.
#[derive(Debug, Default)]
pub struct DriverKeyGenerator;

impl KeyGenerator for DriverKeyGenerator {
    fn wants_generated_keys(&self) -> bool {
        true
    }

    fn process_before(
        &self,
        _executor: &mut dyn Executor,
        _ms: &Arc<MappedStatement>,
        _parameter: &mut Value,
    ) -> Result<()> {
        Ok(())
    }

    fn process_after(
        &self,
        _executor: &mut dyn Executor,
        ms: &Arc<MappedStatement>,
        stmt: Option<&mut dyn Statement>,
        parameter: &mut Value,
    ) -> Result<()> {
        let Some(stmt) = stmt else {
            return Ok(());
        };
        let properties = ms.key_properties();
        if properties.is_empty() {
            return Ok(());
        }
        let Some(mut keys) = stmt.generated_keys()? else {
            return Ok(());
        };

        let mut row_index = 0usize;
        while keys.next()? {
            let row = read_key_row(keys.as_ref(), properties, ms.key_columns())?;

            match &mut *parameter {
                Value::List(items) => {
                    let Some(item) = items.get_mut(row_index) else {
                        break;
                    };
                    assign_keys(item, properties, &row)?;
                }
                single => {
                    if row_index > 0 {
                        break;
                    }
                    assign_keys(single, properties, &row)?;
                }
            }
            row_index += 1;
        }
        Ok(())
    }
}

fn read_key_row(
    keys: &dyn crate::driver::ResultSet,
    properties: &[String],
    key_columns: &[String],
) -> Result<Vec<Value>> {
    let mut row = Vec::with_capacity(properties.len());
    for (i, _property) in properties.iter().enumerate() {
        let index = match key_columns.get(i) {
            Some(column) => column_index(keys.columns(), column).ok_or_else(|| {
                Error::executor(format!("generated keys have no column `{column}`"))
            })?,
            None => i,
        };
        row.push(keys.get(index)?);
    }
    Ok(row)
}

fn assign_keys(target: &mut Value, properties: &[String], row: &[Value]) -> Result<()> {
    let mut meta = MetaValueMut::new(target);
    for (property, value) in properties.iter().zip(row) {
        meta.set(property, value.clone())?;
    }
    Ok(())
}

/// Runs a designated auxiliary SELECT before or after the main statement
/// and stores its single-row result under the `keyProperty` paths.
pub struct SelectKeyGenerator {
    key_statement: Arc<MappedStatement>,
    execute_before: bool,
}

impl SelectKeyGenerator {
    pub fn new(key_statement: Arc<MappedStatement>, execute_before: bool) -> SelectKeyGenerator {
        SelectKeyGenerator {
            key_statement,
            execute_before,
        }
    }

    fn run(&self, executor: &mut dyn Executor, parameter: &mut Value) -> Result<()> {
        let properties: Vec<String> = self.key_statement.key_properties().to_vec();
        if properties.is_empty() {
            return Ok(());
        }

        let mut key_parameter = parameter.clone();
        let rows = executor.query(
            &self.key_statement,
            &mut key_parameter,
            RowBounds::DEFAULT,
            None,
        )?;
        let row = match rows.len() {
            0 => {
                return Err(Error::executor(format!(
                    "key statement `{}` returned no data",
                    self.key_statement.id()
                )))
            }
            1 => &rows[0],
            _ => {
                return Err(Error::executor(format!(
                    "key statement `{}` returned more than one row",
                    self.key_statement.id()
                )))
            }
        };

        let mut meta = MetaValueMut::new(parameter);
        if let [property] = properties.as_slice() {
            let value = single_key_value(row, property);
            meta.set(property, value)?;
        } else {
            for property in &properties {
                let value = row.property(property).unwrap_or(Value::Null);
                meta.set(property, value)?;
            }
        }
        Ok(())
    }
}

/// With one key property, the key row may expose the value under the
/// property's name, hold it as its only column, or be the scalar itself.
fn single_key_value(row: &Value, property: &str) -> Value {
    if let Some(value) = row.property(property) {
        return value;
    }
    if let Some(object) = row.as_object() {
        if object.len() == 1 {
            return object.values().next().cloned().unwrap_or(Value::Null);
        }
    }
    row.clone()
}

impl KeyGenerator for SelectKeyGenerator {
    fn process_before(
        &self,
        executor: &mut dyn Executor,
        _ms: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<()> {
        if self.execute_before {
            self.run(executor, parameter)?;
        }
        Ok(())
    }

    fn process_after(
        &self,
        executor: &mut dyn Executor,
        _ms: &Arc<MappedStatement>,
        _stmt: Option<&mut dyn Statement>,
        parameter: &mut Value,
    ) -> Result<()> {
        if !self.execute_before {
            self.run(executor, parameter)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueObject;

    #[test]
    fn single_key_row_shapes() {
        let mut object = ValueObject::new();
        object.insert("id".to_string(), Value::Long(7));
        assert_eq!(single_key_value(&Value::Object(object), "id"), Value::Long(7));

        let mut single = ValueObject::new();
        single.insert("generated".to_string(), Value::Long(9));
        assert_eq!(
            single_key_value(&Value::Object(single), "id"),
            Value::Long(9)
        );

        assert_eq!(single_key_value(&Value::Long(3), "id"), Value::Long(3));
    }

    #[test]
    fn assign_keys_writes_paths() {
        let mut target = Value::object();
        assign_keys(
            &mut target,
            &["user.id".to_string()],
            &[Value::Long(5)],
        )
        .unwrap();
        assert_eq!(
            crate::meta::MetaValue::new(&target).get("user.id").unwrap(),
            Value::Long(5)
        );
    }
}
