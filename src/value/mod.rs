//! Typed values and their conversion to and from application types
//!
//! - `Value`: the canonical wire representation, always typed, even when null
//! - `codec`: `encode` / `decode` between `Value` and the shape-tagged `Native`
//! - `convert`: `ToValue` / `FromValue` for plain Rust types

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod codec;
pub mod convert;

pub use codec::{Datum, Native, Shape, decode, encode};
pub use convert::{FromValue, Primitive, ToValue};

/// Element type of a column or parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeCode {
    Bool,
    String,
    Bytes,
    Int64,
    Float32,
    Float64,
    Numeric,
    Date,
    Timestamp,
    Json,
}

impl TypeCode {
    /// Whether an array of this type can decode into a dense native array
    ///
    /// Numeric and Json elements have no dense counterpart that covers every
    /// value on the wire, so their arrays always decode with nullable elements.
    pub fn has_dense_array(&self) -> bool {
        !matches!(self, TypeCode::Numeric | TypeCode::Json)
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            TypeCode::Bool => "BOOL",
            TypeCode::String => "STRING",
            TypeCode::Bytes => "BYTES",
            TypeCode::Int64 => "INT64",
            TypeCode::Float32 => "FLOAT32",
            TypeCode::Float64 => "FLOAT64",
            TypeCode::Numeric => "NUMERIC",
            TypeCode::Date => "DATE",
            TypeCode::Timestamp => "TIMESTAMP",
            TypeCode::Json => "JSON",
        }
    }
}

impl Display for TypeCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Declared type of a column or parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Scalar(TypeCode),
    Array(TypeCode),
}

impl Type {
    pub fn code(&self) -> TypeCode {
        match self {
            Type::Scalar(code) | Type::Array(code) => *code,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Type::Array(_))
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Scalar(code) => write!(f, "{}", code),
            Type::Array(code) => write!(f, "ARRAY<{}>", code),
        }
    }
}

/// A non-null scalar as it travels on the wire
///
/// Json is carried as its canonical text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(String),
}

impl Scalar {
    pub fn code(&self) -> TypeCode {
        match self {
            Scalar::Bool(_) => TypeCode::Bool,
            Scalar::String(_) => TypeCode::String,
            Scalar::Bytes(_) => TypeCode::Bytes,
            Scalar::Int64(_) => TypeCode::Int64,
            Scalar::Float32(_) => TypeCode::Float32,
            Scalar::Float64(_) => TypeCode::Float64,
            Scalar::Numeric(_) => TypeCode::Numeric,
            Scalar::Date(_) => TypeCode::Date,
            Scalar::Timestamp(_) => TypeCode::Timestamp,
            Scalar::Json(_) => TypeCode::Json,
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Bool(true) => f.write_str("TRUE"),
            Scalar::Bool(false) => f.write_str("FALSE"),
            Scalar::String(v) => write!(f, "{:?}", v),
            Scalar::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Scalar::Int64(v) => write!(f, "{}", v),
            Scalar::Float32(v) => write!(f, "{}", v),
            Scalar::Float64(v) => write!(f, "{}", v),
            Scalar::Numeric(v) => write!(f, "{}", v),
            Scalar::Date(v) => write!(f, "{}", v),
            Scalar::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            Scalar::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Canonical typed value
///
/// A null scalar, a null array and an array holding null elements are three
/// different values:
///
/// - `Null(Type::Scalar(code))`
/// - `Null(Type::Array(code))`
/// - `Array(code, vec![None, ..])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null(Type),
    Scalar(Scalar),
    Array(TypeCode, Vec<Option<Scalar>>),
}

impl Value {
    /// Builds an array value, checking every element against the element type
    pub fn array(code: TypeCode, elements: Vec<Option<Scalar>>) -> Result<Self> {
        if let Some((i, element)) = elements
            .iter()
            .enumerate()
            .find_map(|(i, e)| e.as_ref().filter(|s| s.code() != code).map(|s| (i, s)))
        {
            return Err(Error::type_mismatch(format!(
                "element {} of ARRAY<{}> is {}",
                i,
                code,
                element.code()
            )));
        }
        Ok(Value::Array(code, elements))
    }

    pub fn datatype(&self) -> Type {
        match self {
            Value::Null(ty) => *ty,
            Value::Scalar(scalar) => Type::Scalar(scalar.code()),
            Value::Array(code, _) => Type::Array(*code),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null(_) => f.write_str("NULL"),
            Value::Scalar(scalar) => write!(f, "{}", scalar),
            Value::Array(_, elements) => {
                f.write_str("[")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match element {
                        Some(scalar) => write!(f, "{}", scalar)?,
                        None => f.write_str("NULL")?,
                    }
                }
                f.write_str("]")
            }
        }
    }
}
