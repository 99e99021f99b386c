use super::{BinaryOp, Expr, UnaryOp};
use crate::path::PropertyPath;
use crate::{Error, Result, Value};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::cmp::Ordering;

/// Resolution source for root identifiers.
///
/// The render context implements this with its layered lookup: explicit
/// bindings first, then the parameter object's properties, then the
/// `_parameter` fallback.
pub trait Scope {
    fn resolve(&self, name: &str) -> Result<Option<Value>>;
}

impl Scope for Value {
    fn resolve(&self, name: &str) -> Result<Option<Value>> {
        Ok(crate::meta::MetaValue::new(self)
            .get_path(&PropertyPath::parse(name)?)
            .ok())
    }
}

/// One step of a `foreach` iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterEntry {
    /// List position or object key.
    pub index: Value,
    pub item: Value,
}

pub(super) fn eval(expr: &Expr, scope: &dyn Scope) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => Ok(scope.resolve(name)?.unwrap_or(Value::Null)),
        Expr::Member { recv, name } => {
            let recv = eval(recv, scope)?;
            Ok(recv.property(name).unwrap_or(Value::Null))
        }
        Expr::Index { recv, index } => {
            let recv = eval(recv, scope)?;
            let index = eval(index, scope)?;
            index_value(&recv, &index)
        }
        Expr::Call { recv, method, args } => {
            let recv = eval(recv, scope)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>>>()?;
            call(&recv, method, &args)
        }
        Expr::Unary { op, expr } => {
            let value = eval(expr, scope)?;
            match op {
                UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                UnaryOp::Neg => match value.as_decimal() {
                    Some(dec) => Ok(narrow(-dec, value.kind() != crate::ty::ValueKind::Double)),
                    None => Err(Error::msg(format!("cannot negate {value}"))),
                },
            }
        }
        Expr::Binary { lhs, op, rhs } => binary(lhs, *op, rhs, scope),
    }
}

fn binary(lhs: &Expr, op: BinaryOp, rhs: &Expr, scope: &dyn Scope) -> Result<Value> {
    // Boolean operators short-circuit.
    match op {
        BinaryOp::And => {
            if !truthy(&eval(lhs, scope)?) {
                return Ok(Value::Bool(false));
            }
            return Ok(Value::Bool(truthy(&eval(rhs, scope)?)));
        }
        BinaryOp::Or => {
            if truthy(&eval(lhs, scope)?) {
                return Ok(Value::Bool(true));
            }
            return Ok(Value::Bool(truthy(&eval(rhs, scope)?)));
        }
        _ => {}
    }

    let lhs = eval(lhs, scope)?;
    let rhs = eval(rhs, scope)?;

    match op {
        BinaryOp::Eq => Ok(Value::Bool(loose_eq(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!loose_eq(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs)?;
            Ok(Value::Bool(match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            }))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            arithmetic(&lhs, op, &rhs)
        }
        BinaryOp::And | BinaryOp::Or => unreachable!(),
    }
}

/// Equality with numeric coercion: `Int(3) == Long(3)` and `3 == 3.0` hold.
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    if let (Some(l), Some(r)) = (lhs.as_decimal(), rhs.as_decimal()) {
        return l == r;
    }
    lhs == rhs
}

fn compare(lhs: &Value, rhs: &Value) -> Result<Ordering> {
    if let (Some(l), Some(r)) = (lhs.as_decimal(), rhs.as_decimal()) {
        return Ok(l.cmp(&r));
    }
    if let (Value::String(l), Value::String(r)) = (lhs, rhs) {
        return Ok(l.cmp(r));
    }
    Err(Error::msg(format!("cannot order {lhs} against {rhs}")))
}

fn arithmetic(lhs: &Value, op: BinaryOp, rhs: &Value) -> Result<Value> {
    let (Some(l), Some(r)) = (lhs.as_decimal(), rhs.as_decimal()) else {
        if op == BinaryOp::Add {
            if let (Value::String(l), Value::String(r)) = (lhs, rhs) {
                return Ok(Value::String(format!("{l}{r}")));
            }
        }
        return Err(Error::msg(format!("cannot apply {op:?} to {lhs} and {rhs}")));
    };

    let integral = lhs.as_i64().is_some() && rhs.as_i64().is_some();
    let result = match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r.is_zero() {
                return Err(Error::msg("division by zero"));
            }
            l / r
        }
        BinaryOp::Rem => {
            if r.is_zero() {
                return Err(Error::msg("division by zero"));
            }
            l % r
        }
        _ => unreachable!(),
    };

    Ok(narrow(result, integral))
}

/// Integral inputs produce integral outputs when the result is whole.
fn narrow(value: Decimal, integral: bool) -> Value {
    if integral && value.fract().is_zero() {
        if let Some(long) = value.to_i64() {
            return Value::Long(long);
        }
    }
    Value::Decimal(value)
}

fn index_value(recv: &Value, index: &Value) -> Result<Value> {
    match (recv, index) {
        (Value::Null, _) => Ok(Value::Null),
        (Value::List(items), index) => {
            let Some(position) = index.as_i64() else {
                return Err(Error::msg(format!("list index must be numeric, got {index}")));
            };
            Ok(usize::try_from(position)
                .ok()
                .and_then(|position| items.get(position).cloned())
                .unwrap_or(Value::Null))
        }
        (recv @ (Value::Object(_) | Value::Proxy(_)), Value::String(key)) => {
            Ok(recv.property(key).unwrap_or(Value::Null))
        }
        (recv, index) => Err(Error::msg(format!("cannot index {recv} with {index}"))),
    }
}

fn call(recv: &Value, method: &str, args: &[Value]) -> Result<Value> {
    match (method, args) {
        ("size" | "length", []) => {
            let len = match recv {
                Value::List(items) => items.len(),
                Value::Object(map) => map.len(),
                Value::String(text) => text.chars().count(),
                Value::Bytes(bytes) => bytes.len(),
                Value::Null => 0,
                other => return Err(Error::msg(format!("cannot take {method} of {other}"))),
            };
            Ok(Value::Long(len as i64))
        }
        ("isEmpty" | "is_empty", []) => {
            let empty = match recv {
                Value::List(items) => items.is_empty(),
                Value::Object(map) => map.is_empty(),
                Value::String(text) => text.is_empty(),
                Value::Bytes(bytes) => bytes.is_empty(),
                Value::Null => true,
                other => return Err(Error::msg(format!("cannot test emptiness of {other}"))),
            };
            Ok(Value::Bool(empty))
        }
        ("contains", [needle]) => {
            let found = match recv {
                Value::List(items) => items.iter().any(|item| loose_eq(item, needle)),
                Value::String(text) => needle
                    .as_str()
                    .map(|needle| text.contains(needle))
                    .unwrap_or(false),
                Value::Null => false,
                other => return Err(Error::msg(format!("cannot call contains on {other}"))),
            };
            Ok(Value::Bool(found))
        }
        ("trim", []) => match recv {
            Value::String(text) => Ok(Value::String(text.trim().to_string())),
            other => Err(Error::msg(format!("cannot trim {other}"))),
        },
        ("toString" | "to_string", []) => Ok(Value::String(recv.to_string())),
        _ => Err(Error::msg(format!(
            "unsupported method `{method}/{}` in expression",
            args.len()
        ))),
    }
}

/// Truthiness: booleans map directly; numbers are true iff non-zero, decided
/// in arbitrary precision; any other non-null value is true.
pub(super) fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(v) => *v,
        _ => match value.as_decimal() {
            Some(dec) => !dec.is_zero(),
            None => true,
        },
    }
}

pub(super) fn iterable(expr: &Expr, scope: &dyn Scope, nullable: bool) -> Result<Vec<IterEntry>> {
    let value = eval(expr, scope)?;
    match value {
        Value::Null => {
            if nullable {
                Ok(vec![])
            } else {
                Err(Error::msg(
                    "foreach collection expression evaluated to null",
                ))
            }
        }
        Value::List(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| IterEntry {
                index: Value::Long(i as i64),
                item,
            })
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, item)| IterEntry {
                index: Value::String(key),
                item,
            })
            .collect()),
        other => Err(Error::msg(format!(
            "foreach collection expression evaluated to a non-iterable value: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueObject;

    fn param() -> Value {
        let mut map = ValueObject::new();
        map.insert("name".to_string(), Value::String("ann".into()));
        map.insert("age".to_string(), Value::Int(0));
        map.insert(
            "ids".to_string(),
            Value::List(vec![1i32.into(), 2i32.into(), 3i32.into()]),
        );
        Value::Object(map)
    }

    #[test]
    fn null_checks() {
        let scope = param();
        assert!(Expr::parse("name != null").unwrap().eval_bool(&scope).unwrap());
        assert!(!Expr::parse("missing != null").unwrap().eval_bool(&scope).unwrap());
    }

    #[test]
    fn numeric_truthiness_uses_decimal_compare() {
        let scope = param();
        // age == 0 is false under the non-zero rule
        assert!(!Expr::parse("age").unwrap().eval_bool(&scope).unwrap());
        assert!(Expr::parse("age == 0").unwrap().eval_bool(&scope).unwrap());
        assert!(!Expr::parse("age > 0").unwrap().eval_bool(&scope).unwrap());
    }

    #[test]
    fn cross_width_numeric_equality() {
        let scope = param();
        // ids holds Int values; literals parse as Long
        assert!(Expr::parse("ids[0] == 1").unwrap().eval_bool(&scope).unwrap());
    }

    #[test]
    fn string_comparison() {
        let scope = param();
        assert!(Expr::parse("name == 'ann'").unwrap().eval_bool(&scope).unwrap());
        assert!(Expr::parse("name != ''").unwrap().eval_bool(&scope).unwrap());
    }

    #[test]
    fn collection_methods() {
        let scope = param();
        assert!(Expr::parse("ids.size() == 3").unwrap().eval_bool(&scope).unwrap());
        assert!(Expr::parse("ids.contains(2)").unwrap().eval_bool(&scope).unwrap());
        assert!(!Expr::parse("ids.isEmpty()").unwrap().eval_bool(&scope).unwrap());
    }

    #[test]
    fn arithmetic_narrows_integrals() {
        let scope = param();
        assert_eq!(
            Expr::parse("1 + 2 * 3").unwrap().eval(&scope).unwrap(),
            Value::Long(7)
        );
    }

    #[test]
    fn iterates_lists_and_objects() {
        let scope = param();
        let entries = Expr::parse("ids")
            .unwrap()
            .eval_iterable(&scope, false)
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].index, Value::Long(1));
        assert_eq!(entries[1].item, Value::Int(2));

        let err = Expr::parse("missing").unwrap().eval_iterable(&scope, false);
        assert!(err.is_err());
        let empty = Expr::parse("missing")
            .unwrap()
            .eval_iterable(&scope, true)
            .unwrap();
        assert!(empty.is_empty());
    }
}
