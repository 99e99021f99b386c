use super::Session;

use tessera_core::mapping::{MappedStatement, SqlCommandType};
use tessera_core::value::ValueObject;
use tessera_core::{Error, Result, Value};

use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Arguments of one mapper-method invocation, before named-parameter
/// assembly.
pub enum Args {
    None,
    /// A single unnamed argument.
    One(Value),
    /// Explicitly named arguments.
    Named(Vec<(String, Value)>),
    /// Unnamed positional arguments.
    Positional(Vec<Value>),
}

/// Routes method names within one mapper namespace: resolves the mapped
/// statement, assembles the named-parameter object, dispatches on the
/// command kind, and converts the outcome.
pub struct Mapper<'s> {
    session: &'s mut Session,
    namespace: String,
}

impl<'s> Mapper<'s> {
    pub(super) fn new(session: &'s mut Session, namespace: String) -> Mapper<'s> {
        Mapper { session, namespace }
    }

    fn resolve(&self, method: &str) -> Result<Arc<MappedStatement>> {
        let id = format!("{}.{method}", self.namespace);
        self.session
            .configuration()
            .mapped_statement(&id)
            .map_err(|_| {
                Error::binding(format!(
                    "mapper `{}` declares no method `{method}`",
                    self.namespace
                ))
            })
    }

    /// Invokes a method: selects return their row list, writes return their
    /// affected-row count, flush markers return the flushed batch total.
    pub fn call(&mut self, method: &str, args: Args) -> Result<Value> {
        let ms = self.resolve(method)?;
        let mut parameter = build_parameter(
            args,
            self.session.configuration().settings().use_actual_param_name,
        );

        match ms.command() {
            SqlCommandType::Select => {
                let rows = self.session.select_list(ms.id(), parameter)?;
                Ok(Value::List(rows))
            }
            SqlCommandType::Insert | SqlCommandType::Update | SqlCommandType::Delete => {
                let count = self.session.update(ms.id(), &mut parameter)?;
                Ok(count_value(count))
            }
            SqlCommandType::Flush => {
                let flushed = self.session.flush_statements()?;
                let total: u64 = flushed
                    .iter()
                    .map(|batch| batch.update_counts.iter().sum::<u64>())
                    .sum();
                Ok(count_value(total))
            }
        }
    }

    pub fn select_list(&mut self, method: &str, args: Args) -> Result<Vec<Value>> {
        let ms = self.resolve(method)?;
        let parameter = build_parameter(
            args,
            self.session.configuration().settings().use_actual_param_name,
        );
        self.session.select_list(ms.id(), parameter)
    }

    pub fn select_one(&mut self, method: &str, args: Args) -> Result<Option<Value>> {
        let ms = self.resolve(method)?;
        let parameter = build_parameter(
            args,
            self.session.configuration().settings().use_actual_param_name,
        );
        self.session.select_one(ms.id(), parameter)
    }

    pub fn select_one_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        args: Args,
    ) -> Result<Option<T>> {
        self.select_one(method, args)?
            .map(|row| super::from_value(&row))
            .transpose()
    }

    pub fn select_list_as<T: DeserializeOwned>(
        &mut self,
        method: &str,
        args: Args,
    ) -> Result<Vec<T>> {
        self.select_list(method, args)?
            .iter()
            .map(super::from_value)
            .collect()
    }

    /// `MapKey`-style projection: rows keyed by one of their properties.
    pub fn select_map(
        &mut self,
        method: &str,
        args: Args,
        map_key: &str,
    ) -> Result<ValueObject> {
        let ms = self.resolve(method)?;
        let parameter = build_parameter(
            args,
            self.session.configuration().settings().use_actual_param_name,
        );
        self.session.select_map(ms.id(), parameter, map_key)
    }

    /// Affected-row invocation with the boolean row-count conversion:
    /// `true` iff any row was touched.
    pub fn call_affecting(&mut self, method: &str, args: Args) -> Result<bool> {
        let ms = self.resolve(method)?;
        let mut parameter = build_parameter(
            args,
            self.session.configuration().settings().use_actual_param_name,
        );
        let count = self.session.update(ms.id(), &mut parameter)?;
        Ok(count > 0)
    }
}

fn count_value(count: u64) -> Value {
    Value::Long(i64::try_from(count).unwrap_or(i64::MAX))
}

/// Named-parameter assembly:
/// - no arguments pass null;
/// - one unnamed argument passes directly, except collections, which wrap
///   into a map under `collection`/`list`;
/// - named or positional arguments build a map keyed by their names (or
///   `arg0..argN`), with non-colliding `param1..paramN` aliases added.
pub(crate) fn build_parameter(args: Args, use_actual_param_name: bool) -> Value {
    match args {
        Args::None => Value::Null,
        Args::One(value) => wrap_collection(value),
        Args::Named(pairs) => {
            let mut map = ValueObject::new();
            for (i, (name, value)) in pairs.iter().enumerate() {
                map.insert(name.clone(), value.clone());
                let alias = format!("param{}", i + 1);
                if !pairs.iter().any(|(name, _)| *name == alias) {
                    map.insert(alias, value.clone());
                }
            }
            Value::Object(map)
        }
        Args::Positional(values) => {
            let mut map = ValueObject::new();
            for (i, value) in values.into_iter().enumerate() {
                if use_actual_param_name {
                    map.insert(format!("arg{i}"), value.clone());
                }
                map.insert(format!("param{}", i + 1), value);
            }
            Value::Object(map)
        }
    }
}

fn wrap_collection(value: Value) -> Value {
    match value {
        Value::List(items) => {
            let mut map = ValueObject::new();
            map.insert("collection".to_string(), Value::List(items.clone()));
            map.insert("list".to_string(), Value::List(items));
            Value::Object(map)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_scalar_passes_through() {
        assert_eq!(
            build_parameter(Args::One(Value::Long(7)), true),
            Value::Long(7)
        );
    }

    #[test]
    fn single_collection_wraps() {
        let wrapped = build_parameter(Args::One(Value::List(vec![Value::Long(1)])), true);
        let map = wrapped.as_object().unwrap();
        assert!(map.contains_key("collection"));
        assert!(map.contains_key("list"));
    }

    #[test]
    fn named_arguments_gain_param_aliases() {
        let built = build_parameter(
            Args::Named(vec![
                ("id".to_string(), Value::Long(1)),
                ("name".to_string(), Value::String("ann".into())),
            ]),
            true,
        );
        let map = built.as_object().unwrap();
        assert_eq!(map.get("id"), Some(&Value::Long(1)));
        assert_eq!(map.get("param1"), Some(&Value::Long(1)));
        assert_eq!(map.get("param2"), Some(&Value::String("ann".into())));
    }

    #[test]
    fn user_declared_param_names_are_not_clobbered() {
        let built = build_parameter(
            Args::Named(vec![
                ("param1".to_string(), Value::Long(10)),
                ("other".to_string(), Value::Long(20)),
            ]),
            true,
        );
        let map = built.as_object().unwrap();
        // param1 keeps the user's value even though it is also the alias
        // slot of the first argument
        assert_eq!(map.get("param1"), Some(&Value::Long(10)));
        assert_eq!(map.get("param2"), Some(&Value::Long(20)));
    }

    #[test]
    fn positional_arguments_use_actual_names() {
        let built = build_parameter(
            Args::Positional(vec![Value::Long(1), Value::Long(2)]),
            true,
        );
        let map = built.as_object().unwrap();
        assert_eq!(map.get("arg0"), Some(&Value::Long(1)));
        assert_eq!(map.get("arg1"), Some(&Value::Long(2)));
        assert_eq!(map.get("param2"), Some(&Value::Long(2)));
    }
}
