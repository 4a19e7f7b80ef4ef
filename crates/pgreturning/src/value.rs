//! Dynamically typed SQL values.
//!
//! [`Value`] is what flows through this crate: bound parameters, assignment values,
//! and the columns materialized from `RETURNING` rows. It implements `tokio-postgres`'
//! [`ToSql`] (coercing integer and float widths to the target column type) and
//! [`FromSql`] for the column types listed in [`Value::SUPPORTED_TYPES`].

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A dynamically-typed SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer
    SmallInt(i16),
    /// 32-bit signed integer
    Int(i32),
    /// 64-bit signed integer
    BigInt(i64),
    /// 32-bit floating point
    Real(f32),
    /// 64-bit floating point
    Double(f64),
    /// Text string
    Text(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// UUID
    Uuid(Uuid),
    /// Calendar date
    Date(NaiveDate),
    /// Timestamp without time zone
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone
    TimestampTz(DateTime<Utc>),
    /// JSON / JSONB document
    Json(serde_json::Value),
    /// SQL `DEFAULT` keyword. Only valid inside INSERT value lists.
    Default,
}

/// A hashable primary-key value, used to match returned rows to inputs.
///
/// Integer widths are unified so that an `Int(5)` input matches a `BigInt(5)` row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Text(String),
    Uuid(Uuid),
    Bytes(Vec<u8>),
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Int(v) => write!(f, "{v}"),
            Key::Text(v) => write!(f, "{v:?}"),
            Key::Uuid(v) => write!(f, "{v}"),
            Key::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

impl Value {
    /// Column types that can be decoded into a `Value`.
    pub const SUPPORTED_TYPES: &'static [Type] = &[
        Type::BOOL,
        Type::INT2,
        Type::INT4,
        Type::INT8,
        Type::FLOAT4,
        Type::FLOAT8,
        Type::TEXT,
        Type::VARCHAR,
        Type::BPCHAR,
        Type::NAME,
        Type::BYTEA,
        Type::UUID,
        Type::DATE,
        Type::TIMESTAMP,
        Type::TIMESTAMPTZ,
        Type::JSON,
        Type::JSONB,
    ];

    /// Check if this value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer content, widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(i64::from(*v)),
            Value::Int(v) => Some(i64::from(*v)),
            Value::BigInt(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point content (integers are widened).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Primary-key view of this value. NULL, DEFAULT, floats and documents are not keys.
    pub fn as_key(&self) -> Option<Key> {
        match self {
            Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => self.as_i64().map(Key::Int),
            Value::Text(v) => Some(Key::Text(v.clone())),
            Value::Uuid(v) => Some(Key::Uuid(*v)),
            Value::Bytes(v) => Some(Key::Bytes(v.clone())),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Null | Value::Default => J::Null,
            Value::Bool(v) => J::Bool(*v),
            Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => {
                self.as_i64().map_or(J::Null, J::from)
            }
            Value::Real(v) => J::from(f64::from(*v)),
            Value::Double(v) => J::from(*v),
            Value::Text(v) => J::String(v.clone()),
            Value::Bytes(v) => J::Array(v.iter().map(|b| J::from(*b)).collect()),
            Value::Uuid(v) => J::String(v.to_string()),
            Value::Date(v) => J::String(v.to_string()),
            Value::Timestamp(v) => J::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::TimestampTz(v) => J::String(v.to_rfc3339()),
            Value::Json(v) => v.clone(),
        }
    }
}

fn integer_to_sql(n: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(n)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(n)?.to_sql(ty, out)
    } else if *ty == Type::INT8 {
        n.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (n as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (n as f64).to_sql(ty, out)
    } else {
        Err(format!("cannot bind an integer to a parameter of type {ty}").into())
    }
}

fn float_to_sql(n: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::FLOAT4 {
        (n as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        n.to_sql(ty, out)
    } else {
        Err(format!("cannot bind a float to a parameter of type {ty}").into())
    }
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Default => Err("DEFAULT cannot be bound as a parameter".into()),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::SmallInt(v) => integer_to_sql(i64::from(*v), ty, out),
            Value::Int(v) => integer_to_sql(i64::from(*v), ty, out),
            Value::BigInt(v) => integer_to_sql(*v, ty, out),
            Value::Real(v) => float_to_sql(f64::from(*v), ty, out),
            Value::Double(v) => float_to_sql(*v, ty, out),
            Value::Text(v) => v.as_str().to_sql(ty, out),
            Value::Bytes(v) => v.as_slice().to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::Date(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => v.to_sql(ty, out),
            Value::TimestampTz(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = if *ty == Type::BOOL {
            Value::Bool(bool::from_sql(ty, raw)?)
        } else if *ty == Type::INT2 {
            Value::SmallInt(i16::from_sql(ty, raw)?)
        } else if *ty == Type::INT4 {
            Value::Int(i32::from_sql(ty, raw)?)
        } else if *ty == Type::INT8 {
            Value::BigInt(i64::from_sql(ty, raw)?)
        } else if *ty == Type::FLOAT4 {
            Value::Real(f32::from_sql(ty, raw)?)
        } else if *ty == Type::FLOAT8 {
            Value::Double(f64::from_sql(ty, raw)?)
        } else if [Type::TEXT, Type::VARCHAR, Type::BPCHAR, Type::NAME].contains(ty) {
            Value::Text(String::from_sql(ty, raw)?)
        } else if *ty == Type::BYTEA {
            Value::Bytes(Vec::<u8>::from_sql(ty, raw)?)
        } else if *ty == Type::UUID {
            Value::Uuid(Uuid::from_sql(ty, raw)?)
        } else if *ty == Type::DATE {
            Value::Date(NaiveDate::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMP {
            Value::Timestamp(NaiveDateTime::from_sql(ty, raw)?)
        } else if *ty == Type::TIMESTAMPTZ {
            Value::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?)
        } else if *ty == Type::JSON || *ty == Type::JSONB {
            Value::Json(serde_json::Value::from_sql(ty, raw)?)
        } else {
            return Err(format!("unsupported column type {ty}").into());
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(Value::Null)
    }

    fn accepts(ty: &Type) -> bool {
        Value::SUPPORTED_TYPES.contains(ty)
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Real,
    f64 => Double,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    NaiveDate => Date,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    serde_json::Value => Json,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
