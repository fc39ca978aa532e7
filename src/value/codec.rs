//! Conversion between application values and wire `Value`s
//!
//! A native value always carries the shape it is represented in: a plain
//! scalar, a nullable scalar, a dense array (no null elements) or an array of
//! nullable elements. Decoding takes the requested shape explicitly and fails
//! with `TypeMismatch` rather than coercing.

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::{
    error::{Error, Result},
    value::{Scalar, Type, TypeCode, Value},
};

/// A non-null application-side scalar
#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Numeric(Decimal),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl Datum {
    pub fn code(&self) -> TypeCode {
        match self {
            Datum::Bool(_) => TypeCode::Bool,
            Datum::String(_) => TypeCode::String,
            Datum::Bytes(_) => TypeCode::Bytes,
            Datum::Int64(_) => TypeCode::Int64,
            Datum::Float32(_) => TypeCode::Float32,
            Datum::Float64(_) => TypeCode::Float64,
            Datum::Numeric(_) => TypeCode::Numeric,
            Datum::Date(_) => TypeCode::Date,
            Datum::Timestamp(_) => TypeCode::Timestamp,
            Datum::Json(_) => TypeCode::Json,
        }
    }
}

/// Requested native representation for a decoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Plain scalar, NULL is rejected
    Scalar(TypeCode),
    NullableScalar(TypeCode),
    /// Array whose elements cannot be null
    DenseArray(TypeCode),
    /// Array whose elements may individually be null
    NullableArray(TypeCode),
}

impl Shape {
    pub fn code(&self) -> TypeCode {
        match self {
            Shape::Scalar(code)
            | Shape::NullableScalar(code)
            | Shape::DenseArray(code)
            | Shape::NullableArray(code) => *code,
        }
    }

    pub fn datatype(&self) -> Type {
        match self {
            Shape::Scalar(code) | Shape::NullableScalar(code) => Type::Scalar(*code),
            Shape::DenseArray(code) | Shape::NullableArray(code) => Type::Array(*code),
        }
    }

    /// Shape used when the caller doesn't name one
    ///
    /// Scalars decode as nullable. Arrays decode with nullable elements unless
    /// `native_arrays` is set and the element type has a dense form.
    pub fn default_for(ty: Type, native_arrays: bool) -> Shape {
        match ty {
            Type::Scalar(code) => Shape::NullableScalar(code),
            Type::Array(code) if native_arrays && code.has_dense_array() => {
                Shape::DenseArray(code)
            }
            Type::Array(code) => Shape::NullableArray(code),
        }
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shape::Scalar(code) => write!(f, "non-null {}", code),
            Shape::NullableScalar(code) => write!(f, "nullable {}", code),
            Shape::DenseArray(code) => write!(f, "dense ARRAY<{}>", code),
            Shape::NullableArray(code) => write!(f, "nullable-element ARRAY<{}>", code),
        }
    }
}

/// Application-side value, tagged with its shape
///
/// `Null` is the untyped "no value" marker; it takes the declared type it is
/// encoded against. The `Option` around array payloads is the null array.
#[derive(Debug, Clone, PartialEq)]
pub enum Native {
    Null,
    Scalar(Datum),
    NullableScalar(Option<Datum>),
    DenseArray(Option<Vec<Datum>>),
    NullableArray(Option<Vec<Option<Datum>>>),
}

impl Native {
    /// Shape this value round-trips through when stored as `ty`
    ///
    /// `Null` is encode-only: it decodes back as the nullable form of `ty`
    /// (`NullableScalar(None)` or `NullableArray(None)`), not as `Null`.
    pub fn shape(&self, ty: Type) -> Shape {
        let code = ty.code();
        match self {
            Native::Null => Shape::default_for(ty, false),
            Native::Scalar(_) => Shape::Scalar(code),
            Native::NullableScalar(_) => Shape::NullableScalar(code),
            Native::DenseArray(_) => Shape::DenseArray(code),
            Native::NullableArray(_) => Shape::NullableArray(code),
        }
    }

    /// The declared type implied by the value itself, if any
    ///
    /// Nulls and empty arrays carry no element type.
    pub fn infer_type(&self) -> Option<Type> {
        match self {
            Native::Null | Native::NullableScalar(None) => None,
            Native::Scalar(d) | Native::NullableScalar(Some(d)) => Some(Type::Scalar(d.code())),
            Native::DenseArray(datums) => datums
                .as_ref()
                .and_then(|v| v.first())
                .map(|d| Type::Array(d.code())),
            Native::NullableArray(elements) => elements
                .as_ref()
                .and_then(|v| v.iter().flatten().next())
                .map(|d| Type::Array(d.code())),
        }
    }

    fn describe(&self) -> String {
        match self {
            Native::Null => "untyped NULL".to_string(),
            Native::Scalar(d) => format!("non-null {}", d.code()),
            Native::NullableScalar(Some(d)) => format!("nullable {}", d.code()),
            Native::NullableScalar(None) => "nullable NULL".to_string(),
            Native::DenseArray(_) => "dense array".to_string(),
            Native::NullableArray(_) => "nullable-element array".to_string(),
        }
    }
}

/// Encodes a native value as a column or parameter of declared type `ty`
pub fn encode(native: &Native, ty: Type) -> Result<Value> {
    Ok(match (native, ty) {
        (Native::Null, ty) => Value::Null(ty),
        (Native::Scalar(datum), Type::Scalar(code))
        | (Native::NullableScalar(Some(datum)), Type::Scalar(code)) => {
            Value::Scalar(encode_datum(datum, code)?)
        }
        (Native::NullableScalar(None), Type::Scalar(_))
        | (Native::DenseArray(None), Type::Array(_))
        | (Native::NullableArray(None), Type::Array(_)) => Value::Null(ty),
        (Native::DenseArray(Some(datums)), Type::Array(code)) => Value::Array(
            code,
            datums
                .iter()
                .map(|d| encode_datum(d, code).map(Some))
                .collect::<Result<_>>()?,
        ),
        (Native::NullableArray(Some(elements)), Type::Array(code)) => Value::Array(
            code,
            elements
                .iter()
                .map(|e| e.as_ref().map(|d| encode_datum(d, code)).transpose())
                .collect::<Result<_>>()?,
        ),
        (native, ty) => {
            return Err(Error::type_mismatch(format!(
                "cannot encode {} as {}",
                native.describe(),
                ty
            )));
        }
    })
}

/// Decodes a wire value into the requested shape
pub fn decode(value: &Value, shape: Shape) -> Result<Native> {
    let ty = value.datatype();
    if ty != shape.datatype() {
        return Err(Error::type_mismatch(format!(
            "cannot decode {} into {}",
            ty, shape
        )));
    }
    if let Shape::DenseArray(code) = shape {
        if !code.has_dense_array() {
            return Err(Error::type_mismatch(format!(
                "ARRAY<{}> has no dense form, decode it into a nullable-element array",
                code
            )));
        }
    }

    Ok(match (value, shape) {
        (Value::Null(_), Shape::Scalar(code)) => {
            return Err(Error::type_mismatch(format!(
                "cannot decode NULL into non-null {}",
                code
            )));
        }
        (Value::Null(_), Shape::NullableScalar(_)) => Native::NullableScalar(None),
        (Value::Null(_), Shape::DenseArray(_)) => Native::DenseArray(None),
        (Value::Null(_), Shape::NullableArray(_)) => Native::NullableArray(None),
        (Value::Scalar(scalar), Shape::Scalar(_)) => Native::Scalar(decode_scalar(scalar)?),
        (Value::Scalar(scalar), Shape::NullableScalar(_)) => {
            Native::NullableScalar(Some(decode_scalar(scalar)?))
        }
        (Value::Array(code, elements), Shape::DenseArray(_)) => Native::DenseArray(Some(
            elements
                .iter()
                .enumerate()
                .map(|(i, e)| match e {
                    Some(scalar) => decode_element(scalar, *code, i),
                    None => Err(Error::type_mismatch(format!(
                        "element {} of ARRAY<{}> is NULL, decode it into a nullable-element array",
                        i, code
                    ))),
                })
                .collect::<Result<_>>()?,
        )),
        (Value::Array(code, elements), Shape::NullableArray(_)) => Native::NullableArray(Some(
            elements
                .iter()
                .enumerate()
                .map(|(i, e)| e.as_ref().map(|s| decode_element(s, *code, i)).transpose())
                .collect::<Result<_>>()?,
        )),
        (value, shape) => {
            return Err(Error::type_mismatch(format!(
                "cannot decode {} into {}",
                value.datatype(),
                shape
            )));
        }
    })
}

fn encode_datum(datum: &Datum, code: TypeCode) -> Result<Scalar> {
    if datum.code() != code {
        return Err(Error::type_mismatch(format!(
            "cannot encode {} as {}",
            datum.code(),
            code
        )));
    }
    Ok(match datum {
        Datum::Bool(v) => Scalar::Bool(*v),
        Datum::String(v) => Scalar::String(v.clone()),
        Datum::Bytes(v) => Scalar::Bytes(v.clone()),
        Datum::Int64(v) => Scalar::Int64(*v),
        Datum::Float32(v) => Scalar::Float32(*v),
        Datum::Float64(v) => Scalar::Float64(*v),
        Datum::Numeric(v) => Scalar::Numeric(*v),
        Datum::Date(v) => Scalar::Date(*v),
        Datum::Timestamp(v) => Scalar::Timestamp(*v),
        Datum::Json(v) => Scalar::Json(serde_json::to_string(v)?),
    })
}

fn decode_element(scalar: &Scalar, code: TypeCode, index: usize) -> Result<Datum> {
    if scalar.code() != code {
        return Err(Error::type_mismatch(format!(
            "element {} of ARRAY<{}> is {}",
            index,
            code,
            scalar.code()
        )));
    }
    decode_scalar(scalar)
}

fn decode_scalar(scalar: &Scalar) -> Result<Datum> {
    Ok(match scalar {
        Scalar::Bool(v) => Datum::Bool(*v),
        Scalar::String(v) => Datum::String(v.clone()),
        Scalar::Bytes(v) => Datum::Bytes(v.clone()),
        Scalar::Int64(v) => Datum::Int64(*v),
        Scalar::Float32(v) => Datum::Float32(*v),
        Scalar::Float64(v) => Datum::Float64(*v),
        Scalar::Numeric(v) => Datum::Numeric(*v),
        Scalar::Date(v) => Datum::Date(*v),
        Scalar::Timestamp(v) => Datum::Timestamp(*v),
        Scalar::Json(v) => Datum::Json(serde_json::from_str(v)?),
    })
}
