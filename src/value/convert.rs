//! Plain Rust types as statement parameters and decode targets
//!
//! Each primitive `T` gets six representations, each with a fixed shape:
//!
//! | Rust type                | Shape           |
//! |--------------------------|-----------------|
//! | `T`                      | `Scalar`        |
//! | `Option<T>`              | `NullableScalar`|
//! | `Vec<T>`                 | `DenseArray`    |
//! | `Option<Vec<T>>`         | `DenseArray`    |
//! | `Vec<Option<T>>`         | `NullableArray` |
//! | `Option<Vec<Option<T>>>` | `NullableArray` |
//!
//! `Vec<T>` and `Vec<Option<T>>` reject a NULL array; use the `Option` forms
//! for columns that may hold one.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::{
    error::{Error, Result},
    value::{
        Scalar, Type, TypeCode, Value,
        codec::{Datum, Native, Shape, decode, encode},
    },
};

/// A Rust type that maps onto a single element type
pub trait Primitive: Sized {
    const CODE: TypeCode;

    fn to_datum(&self) -> Datum;
    fn from_datum(datum: Datum) -> Result<Self>;
}

/// A Rust value that can be bound as a parameter
pub trait ToValue {
    fn to_value(&self) -> Result<Value>;
}

/// A Rust type a column can be decoded into
pub trait FromValue: Sized {
    fn shape() -> Shape;
    fn from_native(native: Native) -> Result<Self>;

    fn from_value(value: &Value) -> Result<Self> {
        Self::from_native(decode(value, Self::shape())?)
    }
}

fn wrong_datum(expected: TypeCode, datum: &Datum) -> Error {
    Error::type_mismatch(format!("expected {}, got {}", expected, datum.code()))
}

fn wrong_shape(shape: Shape, native: &Native) -> Error {
    match native {
        Native::DenseArray(None) | Native::NullableArray(None) => Error::type_mismatch(format!(
            "cannot decode NULL into {}, use an Option target",
            shape
        )),
        _ => Error::type_mismatch(format!("value does not have shape {}", shape)),
    }
}

macro_rules! impl_primitive {
    ($t:ty, $code:ident, $datum:ident, |$v:ident| $to:expr) => {
        impl Primitive for $t {
            const CODE: TypeCode = TypeCode::$code;

            fn to_datum(&self) -> Datum {
                let $v = self;
                Datum::$datum($to)
            }

            fn from_datum(datum: Datum) -> Result<Self> {
                match datum {
                    Datum::$datum(v) => Ok(v),
                    other => Err(wrong_datum(Self::CODE, &other)),
                }
            }
        }
    };
}

impl_primitive!(bool, Bool, Bool, |v| *v);
impl_primitive!(String, String, String, |v| v.clone());
impl_primitive!(Vec<u8>, Bytes, Bytes, |v| v.clone());
impl_primitive!(i64, Int64, Int64, |v| *v);
impl_primitive!(f32, Float32, Float32, |v| *v);
impl_primitive!(f64, Float64, Float64, |v| *v);
impl_primitive!(Decimal, Numeric, Numeric, |v| *v);
impl_primitive!(NaiveDate, Date, Date, |v| *v);
impl_primitive!(DateTime<Utc>, Timestamp, Timestamp, |v| *v);
impl_primitive!(serde_json::Value, Json, Json, |v| v.clone());

macro_rules! impl_value {
    ($($t:ty),* $(,)?) => {$(
        impl ToValue for $t {
            fn to_value(&self) -> Result<Value> {
                let native = Native::Scalar(self.to_datum());
                encode(&native, Type::Scalar(<$t as Primitive>::CODE))
            }
        }

        impl FromValue for $t {
            fn shape() -> Shape {
                Shape::Scalar(<$t as Primitive>::CODE)
            }

            fn from_native(native: Native) -> Result<Self> {
                match native {
                    Native::Scalar(datum) => <$t as Primitive>::from_datum(datum),
                    other => Err(wrong_shape(Self::shape(), &other)),
                }
            }
        }

        impl ToValue for Option<$t> {
            fn to_value(&self) -> Result<Value> {
                let native = Native::NullableScalar(self.as_ref().map(Primitive::to_datum));
                encode(&native, Type::Scalar(<$t as Primitive>::CODE))
            }
        }

        impl FromValue for Option<$t> {
            fn shape() -> Shape {
                Shape::NullableScalar(<$t as Primitive>::CODE)
            }

            fn from_native(native: Native) -> Result<Self> {
                match native {
                    Native::NullableScalar(datum) => {
                        datum.map(<$t as Primitive>::from_datum).transpose()
                    }
                    other => Err(wrong_shape(Self::shape(), &other)),
                }
            }
        }

        impl ToValue for Vec<$t> {
            fn to_value(&self) -> Result<Value> {
                let native = Native::DenseArray(Some(self.iter().map(Primitive::to_datum).collect()));
                encode(&native, Type::Array(<$t as Primitive>::CODE))
            }
        }

        impl FromValue for Vec<$t> {
            fn shape() -> Shape {
                Shape::DenseArray(<$t as Primitive>::CODE)
            }

            fn from_native(native: Native) -> Result<Self> {
                match native {
                    Native::DenseArray(Some(datums)) => datums
                        .into_iter()
                        .map(<$t as Primitive>::from_datum)
                        .collect(),
                    other => Err(wrong_shape(Self::shape(), &other)),
                }
            }
        }

        impl ToValue for Option<Vec<$t>> {
            fn to_value(&self) -> Result<Value> {
                let native = Native::DenseArray(
                    self.as_ref()
                        .map(|v| v.iter().map(Primitive::to_datum).collect()),
                );
                encode(&native, Type::Array(<$t as Primitive>::CODE))
            }
        }

        impl FromValue for Option<Vec<$t>> {
            fn shape() -> Shape {
                Shape::DenseArray(<$t as Primitive>::CODE)
            }

            fn from_native(native: Native) -> Result<Self> {
                match native {
                    Native::DenseArray(datums) => datums
                        .map(|d| {
                            d.into_iter()
                                .map(<$t as Primitive>::from_datum)
                                .collect::<Result<Vec<_>>>()
                        })
                        .transpose(),
                    other => Err(wrong_shape(Self::shape(), &other)),
                }
            }
        }

        impl ToValue for Vec<Option<$t>> {
            fn to_value(&self) -> Result<Value> {
                let native = Native::NullableArray(Some(
                    self.iter()
                        .map(|e| e.as_ref().map(Primitive::to_datum))
                        .collect(),
                ));
                encode(&native, Type::Array(<$t as Primitive>::CODE))
            }
        }

        impl FromValue for Vec<Option<$t>> {
            fn shape() -> Shape {
                Shape::NullableArray(<$t as Primitive>::CODE)
            }

            fn from_native(native: Native) -> Result<Self> {
                match native {
                    Native::NullableArray(Some(elements)) => elements
                        .into_iter()
                        .map(|e| e.map(<$t as Primitive>::from_datum).transpose())
                        .collect(),
                    other => Err(wrong_shape(Self::shape(), &other)),
                }
            }
        }

        impl ToValue for Option<Vec<Option<$t>>> {
            fn to_value(&self) -> Result<Value> {
                let native = Native::NullableArray(self.as_ref().map(|v| {
                    v.iter()
                        .map(|e| e.as_ref().map(Primitive::to_datum))
                        .collect()
                }));
                encode(&native, Type::Array(<$t as Primitive>::CODE))
            }
        }

        impl FromValue for Option<Vec<Option<$t>>> {
            fn shape() -> Shape {
                Shape::NullableArray(<$t as Primitive>::CODE)
            }

            fn from_native(native: Native) -> Result<Self> {
                match native {
                    Native::NullableArray(elements) => elements
                        .map(|v| {
                            v.into_iter()
                                .map(|e| e.map(<$t as Primitive>::from_datum).transpose())
                                .collect::<Result<Vec<_>>>()
                        })
                        .transpose(),
                    other => Err(wrong_shape(Self::shape(), &other)),
                }
            }
        }
    )*};
}

impl_value!(
    bool,
    String,
    Vec<u8>,
    i64,
    f32,
    f64,
    Decimal,
    NaiveDate,
    DateTime<Utc>,
    serde_json::Value,
);

impl ToValue for &str {
    fn to_value(&self) -> Result<Value> {
        Ok(Value::Scalar(Scalar::String(self.to_string())))
    }
}

/// Already-encoded values bind as themselves
impl ToValue for Value {
    fn to_value(&self) -> Result<Value> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{FromValue, ToValue};
    use crate::{
        error::{Error, Result},
        value::{Scalar, Type, TypeCode, Value},
    };

    #[test]
    fn test_native_types() -> Result<()> {
        let value = 100i64.to_value()?;
        assert_eq!(value, Value::Scalar(Scalar::Int64(100)));
        assert_eq!(i64::from_value(&value)?, 100);

        let value = vec![true, false].to_value()?;
        assert_eq!(Vec::<bool>::from_value(&value)?, vec![true, false]);

        let value = vec![b"b1".to_vec(), b"b2".to_vec()].to_value()?;
        assert_eq!(value.datatype(), Type::Array(TypeCode::Bytes));
        assert_eq!(
            Vec::<Vec<u8>>::from_value(&value)?,
            vec![b"b1".to_vec(), b"b2".to_vec()]
        );

        let date = NaiveDate::from_ymd_opt(2021, 10, 13).expect("date");
        assert_eq!(NaiveDate::from_value(&date.to_value()?)?, date);
        assert_eq!("string".to_value()?, Value::Scalar(Scalar::String("string".into())));
        Ok(())
    }

    #[test]
    fn test_nullable_types() -> Result<()> {
        let value = None::<i64>.to_value()?;
        assert_eq!(value, Value::Null(Type::Scalar(TypeCode::Int64)));
        assert_eq!(Option::<i64>::from_value(&value)?, None);
        assert!(matches!(i64::from_value(&value), Err(Error::TypeMismatch(_))));

        // there is no separate nullable bytes type, Option<Vec<u8>> covers it
        let value = None::<Vec<u8>>.to_value()?;
        assert_eq!(value, Value::Null(Type::Scalar(TypeCode::Bytes)));

        let value = vec![None::<f64>, None].to_value()?;
        assert_eq!(value, Value::Array(TypeCode::Float64, vec![None, None]));
        assert_eq!(Vec::<Option<f64>>::from_value(&value)?, vec![None, None]);
        assert!(matches!(
            Vec::<f64>::from_value(&value),
            Err(Error::TypeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_null_arrays() -> Result<()> {
        let value = None::<Vec<Option<String>>>.to_value()?;
        assert_eq!(value, Value::Null(Type::Array(TypeCode::String)));
        assert_eq!(Option::<Vec<Option<String>>>::from_value(&value)?, None);
        assert_eq!(Option::<Vec<String>>::from_value(&value)?, None);
        assert!(matches!(
            Vec::<Option<String>>::from_value(&value),
            Err(Error::TypeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_numeric_arrays() -> Result<()> {
        let halves = vec![Decimal::new(5, 1), Decimal::new(25, 2)];
        let value = halves.to_value()?;
        assert!(matches!(
            Vec::<Decimal>::from_value(&value),
            Err(Error::TypeMismatch(_))
        ));
        assert_eq!(
            Vec::<Option<Decimal>>::from_value(&value)?,
            vec![Some(Decimal::new(5, 1)), Some(Decimal::new(25, 2))]
        );
        Ok(())
    }

    #[test]
    fn test_encoded_value_binds_as_is() -> Result<()> {
        let value = Value::Null(Type::Array(TypeCode::Timestamp));
        assert_eq!(value.to_value()?, value);
        Ok(())
    }
}
