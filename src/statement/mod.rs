//! SQL statements with their bound parameters
//!
//! A `Statement` can only be obtained from `StatementBuilder::build`, which
//! checks that every placeholder in the text has a bound value. Once built it
//! is immutable.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::{Error, Result},
    value::{FromValue, Native, ToValue, Type, Value, encode},
};

pub mod lexer;

pub use lexer::{ParamKey, ParamScanner};

/// An immutable SQL statement whose placeholders are all bound
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: BTreeMap<ParamKey, Value>,
}

impl Statement {
    /// A statement with no parameters
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        Self::builder(sql).build()
    }

    pub fn builder(sql: impl Into<String>) -> StatementBuilder {
        StatementBuilder {
            sql: sql.into(),
            params: BTreeMap::new(),
            error: None,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &BTreeMap<ParamKey, Value> {
        &self.params
    }

    /// Encoded value of a named parameter, with or without the leading `@`
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.params.get(&ParamKey::named(name))
    }

    /// Decodes a named parameter into `T`
    pub fn param<T: FromValue>(&self, name: &str) -> Result<T> {
        match self.value(name) {
            Some(value) => T::from_value(value),
            None => Err(Error::execution(format!(
                "statement has no parameter @{}",
                name.trim_start_matches('@')
            ))),
        }
    }

    /// Decodes the n-th positional parameter (from 1) into `T`
    pub fn param_at<T: FromValue>(&self, position: usize) -> Result<T> {
        match self.params.get(&ParamKey::Positional(position)) {
            Some(value) => T::from_value(value),
            None => Err(Error::execution(format!(
                "statement has no parameter ?{}",
                position
            ))),
        }
    }
}

/// Collects parameter bindings for a `Statement`
///
/// The first binding error is kept and reported by `build`, so bindings can
/// be chained without checking each one.
#[derive(Debug, Clone)]
pub struct StatementBuilder {
    sql: String,
    params: BTreeMap<ParamKey, Value>,
    error: Option<Error>,
}

impl StatementBuilder {
    /// Binds a named parameter; the name may include the leading `@`
    pub fn bind(self, name: &str, value: impl ToValue) -> Self {
        let result = value.to_value();
        self.insert(ParamKey::named(name), result)
    }

    /// Binds the n-th `?` placeholder, counted from 1
    pub fn bind_position(self, position: usize, value: impl ToValue) -> Self {
        if position == 0 {
            return self.fail(Error::Construction(
                "positional parameters are counted from 1".to_string(),
            ));
        }
        let result = value.to_value();
        self.insert(ParamKey::Positional(position), result)
    }

    /// Binds a shape-tagged native value
    ///
    /// Without a declared type the type is inferred from the value; a null or
    /// empty array with nothing to infer from is a `TypeMismatch`.
    pub fn bind_native(self, name: &str, native: Native, ty: Option<Type>) -> Self {
        let result = match ty.or_else(|| native.infer_type()) {
            Some(ty) => encode(&native, ty),
            None => Err(Error::type_mismatch(format!(
                "cannot infer the type of parameter @{}, declare it",
                name.trim_start_matches('@')
            ))),
        };
        self.insert(ParamKey::named(name), result)
    }

    fn insert(mut self, key: ParamKey, value: Result<Value>) -> Self {
        match value {
            Ok(value) => {
                self.params.insert(key, value);
                self
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(mut self, err: Error) -> Self {
        self.error.get_or_insert(err);
        self
    }

    /// Checks every placeholder in the text is bound
    ///
    /// Bound values the text never references are kept.
    pub fn build(self) -> Result<Statement> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let referenced = ParamScanner::new(&self.sql).collect::<Result<BTreeSet<_>>>()?;
        let unbound = referenced
            .iter()
            .filter(|key| !self.params.contains_key(key))
            .map(|key| key.to_string())
            .collect::<Vec<_>>();
        if !unbound.is_empty() {
            return Err(Error::Construction(format!(
                "unbound parameters {} in {:?}",
                unbound.join(", "),
                self.sql
            )));
        }
        Ok(Statement {
            sql: self.sql,
            params: self.params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Statement;
    use crate::{
        error::{Error, Result},
        value::{Datum, Native, Scalar, Type, TypeCode, Value},
    };

    #[test]
    fn test_build() -> Result<()> {
        let stmt = Statement::builder("UPDATE budget SET amount = @amount WHERE id = @id")
            .bind("amount", 5000i64)
            .bind("@id", 2i64)
            .bind("unused", "extra")
            .build()?;
        assert_eq!(stmt.param::<i64>("@amount")?, 5000);
        assert_eq!(stmt.param::<i64>("id")?, 2);
        assert_eq!(stmt.param::<String>("unused")?, "extra");
        assert!(matches!(
            stmt.param::<i64>("missing"),
            Err(Error::ExecutionFailed { index: None, .. })
        ));
        assert!(matches!(
            stmt.param::<bool>("id"),
            Err(Error::TypeMismatch(_))
        ));
        Ok(())
    }

    #[test]
    fn test_unbound() {
        let err = Statement::builder("SELECT * FROM t WHERE a = @a AND b = @b")
            .bind("a", true)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            Error::Construction(
                "unbound parameters @b in \"SELECT * FROM t WHERE a = @a AND b = @b\"".to_string()
            )
        );

        assert!(matches!(
            Statement::new("DELETE FROM t WHERE id = ?"),
            Err(Error::Construction(_))
        ));
    }

    #[test]
    fn test_positional() -> Result<()> {
        let stmt = Statement::builder("SELECT * FROM t WHERE a = ? AND b = ?")
            .bind_position(1, "a")
            .bind_position(2, None::<i64>)
            .build()?;
        assert_eq!(stmt.param_at::<String>(1)?, "a");
        assert_eq!(stmt.param_at::<Option<i64>>(2)?, None);

        assert!(matches!(
            Statement::builder("SELECT ?").bind_position(0, 1i64).build(),
            Err(Error::Construction(_))
        ));
        Ok(())
    }

    #[test]
    fn test_bind_native() -> Result<()> {
        let stmt = Statement::builder("SELECT @a, @b")
            .bind_native("a", Native::Null, Some(Type::Array(TypeCode::Date)))
            .bind_native("b", Native::Scalar(Datum::Float64(1.5)), None)
            .build()?;
        assert_eq!(stmt.value("a"), Some(&Value::Null(Type::Array(TypeCode::Date))));
        assert_eq!(stmt.value("b"), Some(&Value::Scalar(Scalar::Float64(1.5))));

        let err = Statement::builder("SELECT @a")
            .bind_native("a", Native::Null, None)
            .bind("a", 1i64)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(_)));
        Ok(())
    }
}
