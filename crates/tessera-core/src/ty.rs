use crate::{Error, Result, Value};

use serde::{Deserialize, Serialize};

/// The SQL-side type of a statement parameter or projected column.
///
/// Mirrors the type codes a relational driver understands. `Cursor` marks an
/// OUT parameter that yields a nested result set; `Undefined` lets the driver
/// infer the type from the bound value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
    Binary,
    VarBinary,
    Blob,
    Clob,
    Boolean,
    Null,
    Other,
    Cursor,
    Undefined,
}

impl SqlType {
    /// Resolves a SQL type from its document spelling (`jdbcType="VARCHAR"`).
    pub fn parse(name: &str) -> Result<SqlType> {
        use SqlType::*;

        Ok(match name.to_ascii_uppercase().as_str() {
            "BIT" => Bit,
            "TINYINT" => TinyInt,
            "SMALLINT" => SmallInt,
            "INTEGER" | "INT" => Integer,
            "BIGINT" => BigInt,
            "FLOAT" => Float,
            "REAL" => Real,
            "DOUBLE" => Double,
            "NUMERIC" => Numeric,
            "DECIMAL" => Decimal,
            "CHAR" => Char,
            "VARCHAR" => Varchar,
            "LONGVARCHAR" => LongVarchar,
            "DATE" => Date,
            "TIME" => Time,
            "TIMESTAMP" => Timestamp,
            "BINARY" => Binary,
            "VARBINARY" => VarBinary,
            "BLOB" => Blob,
            "CLOB" => Clob,
            "BOOLEAN" => Boolean,
            "NULL" => Null,
            "OTHER" => Other,
            "CURSOR" => Cursor,
            "UNDEFINED" => Undefined,
            other => return Err(Error::parse(format!("unknown SQL type `{other}`"))),
        })
    }
}

/// The value-side shape of a parameter or projected property.
///
/// This is what a `javaType` attribute resolves to through the alias
/// registry. `Any` defers the decision to the runtime value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    #[default]
    Any,
    Bool,
    Int,
    Long,
    Double,
    Decimal,
    String,
    Bytes,
    Uuid,
    Timestamp,
    List,
    Object,
    Cursor,
}

impl ValueKind {
    /// The kind of a concrete value. Null values report `Any`.
    pub fn of(value: &Value) -> ValueKind {
        match value {
            Value::Null => ValueKind::Any,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Long(_) => ValueKind::Long,
            Value::Double(_) => ValueKind::Double,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::List(_) => ValueKind::List,
            Value::Object(_) => ValueKind::Object,
            Value::Proxy(proxy) => ValueKind::of(&proxy.snapshot()),
        }
    }
}
