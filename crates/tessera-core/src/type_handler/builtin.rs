use super::TypeHandler;
use crate::driver::{ResultSet, Statement};
use crate::ty::{SqlType, ValueKind};
use crate::{Error, Result, Value};

use chrono::NaiveDateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

macro_rules! handler {
    ($name:ident, $kind:expr, $convert:expr) => {
        #[derive(Debug, Default)]
        pub struct $name;

        impl TypeHandler for $name {
            fn set_parameter(
                &self,
                stmt: &mut dyn Statement,
                index: usize,
                value: &Value,
                sql_type: Option<SqlType>,
            ) -> Result<()> {
                let value = convert_nullable(value, $kind, $convert)?;
                stmt.bind(index, value, sql_type)
            }

            fn result(&self, rs: &dyn ResultSet, column_index: usize) -> Result<Value> {
                let raw = rs.get(column_index)?;
                convert_nullable(&raw, $kind, $convert)
            }
        }
    };
}

fn convert_nullable(
    value: &Value,
    kind: ValueKind,
    convert: fn(&Value) -> Option<Value>,
) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    convert(value).ok_or_else(|| {
        Error::type_handler(format!(
            "cannot convert {:?} value `{value}` to {kind:?}",
            value.kind()
        ))
    })
}

/// Pass-through handler for untyped slots: the driver receives the value
/// as-is and raw column values come back unconverted.
#[derive(Debug, Default)]
pub struct AnyTypeHandler;

impl TypeHandler for AnyTypeHandler {
    fn set_parameter(
        &self,
        stmt: &mut dyn Statement,
        index: usize,
        value: &Value,
        sql_type: Option<SqlType>,
    ) -> Result<()> {
        stmt.bind(index, value.clone(), sql_type)
    }

    fn result(&self, rs: &dyn ResultSet, column_index: usize) -> Result<Value> {
        rs.get(column_index)
    }
}

handler!(BoolTypeHandler, ValueKind::Bool, |value| match value {
    Value::Bool(v) => Some(Value::Bool(*v)),
    Value::Int(v) => Some(Value::Bool(*v != 0)),
    Value::Long(v) => Some(Value::Bool(*v != 0)),
    Value::String(v) => match v.as_str() {
        "true" | "TRUE" | "1" => Some(Value::Bool(true)),
        "false" | "FALSE" | "0" => Some(Value::Bool(false)),
        _ => None,
    },
    _ => None,
});

handler!(IntTypeHandler, ValueKind::Int, |value| match value {
    Value::Int(v) => Some(Value::Int(*v)),
    Value::Long(v) => i32::try_from(*v).ok().map(Value::Int),
    Value::Decimal(v) => v.to_i32().map(Value::Int),
    Value::Bool(v) => Some(Value::Int(i32::from(*v))),
    Value::String(v) => v.parse().ok().map(Value::Int),
    _ => None,
});

handler!(LongTypeHandler, ValueKind::Long, |value| match value {
    Value::Int(v) => Some(Value::Long(i64::from(*v))),
    Value::Long(v) => Some(Value::Long(*v)),
    Value::Decimal(v) => v.to_i64().map(Value::Long),
    Value::Bool(v) => Some(Value::Long(i64::from(*v))),
    Value::String(v) => v.parse().ok().map(Value::Long),
    _ => None,
});

handler!(DoubleTypeHandler, ValueKind::Double, |value| match value {
    Value::Double(v) => Some(Value::Double(*v)),
    Value::Int(v) => Some(Value::Double(f64::from(*v))),
    Value::Long(v) => Some(Value::Double(*v as f64)),
    Value::Decimal(v) => v.to_f64().map(Value::Double),
    Value::String(v) => v.parse().ok().map(Value::Double),
    _ => None,
});

handler!(DecimalTypeHandler, ValueKind::Decimal, |value| match value {
    Value::String(v) => Decimal::from_str(v).ok().map(Value::Decimal),
    other => other.as_decimal().map(Value::Decimal),
});

handler!(StringTypeHandler, ValueKind::String, |value| match value {
    Value::List(_) | Value::Object(_) | Value::Proxy(_) => None,
    Value::Bytes(_) => None,
    other => Some(Value::String(other.to_string())),
});

handler!(BytesTypeHandler, ValueKind::Bytes, |value| match value {
    Value::Bytes(v) => Some(Value::Bytes(v.clone())),
    _ => None,
});

handler!(UuidTypeHandler, ValueKind::Uuid, |value| match value {
    Value::Uuid(v) => Some(Value::Uuid(*v)),
    Value::String(v) => uuid::Uuid::parse_str(v).ok().map(Value::Uuid),
    Value::Bytes(v) => uuid::Uuid::from_slice(v).ok().map(Value::Uuid),
    _ => None,
});

handler!(
    TimestampTypeHandler,
    ValueKind::Timestamp,
    |value| match value {
        Value::Timestamp(v) => Some(Value::Timestamp(*v)),
        Value::String(v) => NaiveDateTime::parse_from_str(v, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(Value::Timestamp),
        Value::Long(v) => chrono::DateTime::from_timestamp_millis(*v)
            .map(|ts| Value::Timestamp(ts.naive_utc())),
        _ => None,
    }
);

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(handler_convert: fn(&Value) -> Option<Value>, value: Value) -> Option<Value> {
        handler_convert(&value)
    }

    #[test]
    fn long_widens_and_parses() {
        let long = |value| convert(|v| match v {
            Value::Int(v) => Some(Value::Long(i64::from(*v))),
            Value::Long(v) => Some(Value::Long(*v)),
            Value::String(v) => v.parse().ok().map(Value::Long),
            _ => None,
        }, value);

        assert_eq!(long(Value::Int(4)), Some(Value::Long(4)));
        assert_eq!(long(Value::String("12".into())), Some(Value::Long(12)));
        assert_eq!(long(Value::Bytes(vec![])), None);
    }

    #[test]
    fn null_passes_through() {
        let out = convert_nullable(&Value::Null, ValueKind::Long, |_| None).unwrap();
        assert_eq!(out, Value::Null);
    }

    #[test]
    fn conversion_failure_is_typed_error() {
        let err = convert_nullable(&Value::Bytes(vec![1]), ValueKind::Int, |_| None).unwrap_err();
        assert!(err.is_type_handler());
    }

    #[test]
    fn timestamp_parses_standard_format() {
        let ts = NaiveDateTime::parse_from_str("2024-05-01 12:30:00", "%Y-%m-%d %H:%M:%S%.f");
        assert!(ts.is_ok());
    }
}
