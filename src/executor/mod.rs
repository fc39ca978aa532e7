//! The executor seam: what the transaction engine needs from a database
//!
//! An `Executor` opens a `Scope`, the executor-side handle of one read-write
//! transaction. Network clients and the in-memory executor both plug in here.

use std::{sync::Arc, vec};

use crate::{
    config::SessionConfig,
    context::Context,
    error::{Error, Result},
    session::Session,
    statement::Statement,
    value::{FromValue, Native, Shape, Type, Value, decode},
};

pub mod memory;

pub use memory::{MemoryExecutor, MemoryScope, Tables};

/// Opens executor-side transactions
pub trait Executor: Clone {
    type Scope: Scope;

    fn begin(&self, ctx: &Context) -> Result<Self::Scope>;

    fn session(&self, config: SessionConfig) -> Session<Self> {
        Session::new(self.clone(), config)
    }
}

/// Executor-side handle of one read-write transaction
///
/// `commit` and `abort` consume the scope; it must release whatever it holds
/// even when they fail.
pub trait Scope {
    fn read(&mut self, ctx: &Context, statement: &Statement) -> Result<ResultSet>;

    /// Runs the statements in order, all or nothing
    ///
    /// Returns one count per statement. When statement `k` fails no effect of
    /// the batch remains and the error is `ExecutionFailed` with index `k`.
    fn execute_batch(&mut self, ctx: &Context, statements: &[Statement]) -> Result<Vec<i64>>;

    /// Validates the reads and applies the writes, or fails with `ConflictAborted`
    fn commit(self, ctx: &Context) -> Result<()>;

    fn abort(self, ctx: &Context) -> Result<()>;
}

/// Column of a result set
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub ty: Type,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Rows returned by a read, still in wire form
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Appends a row, checking it against the columns
    pub fn push(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::execution(format!(
                "row has {} values for {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        if let Some((column, value)) = self
            .columns
            .iter()
            .zip(&row)
            .find(|(column, value)| column.ty != value.datatype())
        {
            return Err(Error::execution(format!(
                "column {} is {}, got {}",
                column.name,
                column.ty,
                value.datatype()
            )));
        }
        self.rows.push(row);
        Ok(())
    }
}

/// Cursor over the rows of a read
#[derive(Debug)]
pub struct Rows {
    columns: Arc<[Column]>,
    rows: vec::IntoIter<Vec<Value>>,
    native_arrays: bool,
}

impl Rows {
    pub(crate) fn new(result: ResultSet, native_arrays: bool) -> Self {
        Self {
            columns: result.columns.into(),
            rows: result.rows.into_iter(),
            native_arrays,
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Decodes column `index` of every remaining row into `T`
    pub fn column<T: FromValue>(self, index: usize) -> Result<Vec<T>> {
        self.map(|row| row.get(index)).collect()
    }
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next().map(|values| Row {
            columns: self.columns.clone(),
            values,
            native_arrays: self.native_arrays,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Rows {}

/// A single result row
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<Value>,
    native_arrays: bool,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Result<&Value> {
        self.values.get(index).ok_or_else(|| {
            Error::type_mismatch(format!(
                "column index {} out of range for {} columns",
                index,
                self.values.len()
            ))
        })
    }

    /// Decodes a column into the shape `T` declares
    pub fn get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.value(index)?;
        T::from_value(value).map_err(|err| self.in_column(index, err))
    }

    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let index = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::type_mismatch(format!("no column named {}", name)))?;
        self.get(index)
    }

    /// Decodes a column into its default shape
    ///
    /// Scalars decode as nullable scalars. Arrays decode with nullable
    /// elements, or dense when native-array decoding is enabled and the
    /// element type has a dense form.
    pub fn native(&self, index: usize) -> Result<Native> {
        let value = self.value(index)?;
        let shape = Shape::default_for(value.datatype(), self.native_arrays);
        decode(value, shape).map_err(|err| self.in_column(index, err))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    fn in_column(&self, index: usize, err: Error) -> Error {
        match (err, self.columns.get(index)) {
            (Error::TypeMismatch(msg), Some(column)) => {
                Error::TypeMismatch(format!("column {}: {}", column.name, msg))
            }
            (err, _) => err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, ResultSet, Rows};
    use crate::{
        error::{Error, Result},
        value::{Datum, Native, Scalar, Type, TypeCode, Value},
    };

    fn result_set() -> Result<ResultSet> {
        let mut result = ResultSet::new(vec![
            Column::new("id", Type::Scalar(TypeCode::Int64)),
            Column::new("tags", Type::Array(TypeCode::String)),
            Column::new("prices", Type::Array(TypeCode::Numeric)),
        ]);
        result.push(vec![
            Value::Scalar(Scalar::Int64(1)),
            Value::Array(TypeCode::String, vec![Some(Scalar::String("a".into()))]),
            Value::Null(Type::Array(TypeCode::Numeric)),
        ])?;
        result.push(vec![
            Value::Scalar(Scalar::Int64(2)),
            Value::Array(TypeCode::String, vec![None]),
            Value::Array(TypeCode::Numeric, vec![]),
        ])?;
        Ok(result)
    }

    #[test]
    fn test_push_checks_columns() -> Result<()> {
        let mut result = result_set()?;
        assert!(matches!(
            result.push(vec![Value::Scalar(Scalar::Int64(3))]),
            Err(Error::ExecutionFailed { .. })
        ));
        assert!(matches!(
            result.push(vec![
                Value::Scalar(Scalar::Bool(true)),
                Value::Null(Type::Array(TypeCode::String)),
                Value::Null(Type::Array(TypeCode::Numeric)),
            ]),
            Err(Error::ExecutionFailed { .. })
        ));
        assert_eq!(result.rows.len(), 2);
        Ok(())
    }

    #[test]
    fn test_typed_access() -> Result<()> {
        let mut rows = Rows::new(result_set()?, false);
        assert_eq!(rows.len(), 2);

        let row = rows.next().expect("first row");
        assert_eq!(row.get::<i64>(0)?, 1);
        assert_eq!(row.get_by_name::<Vec<String>>("tags")?, vec!["a".to_string()]);
        assert_eq!(row.get::<Option<Vec<Option<rust_decimal::Decimal>>>>(2)?, None);
        assert!(matches!(row.get::<i64>(5), Err(Error::TypeMismatch(_))));
        assert!(matches!(row.get_by_name::<i64>("nope"), Err(Error::TypeMismatch(_))));

        let row = rows.next().expect("second row");
        let err = row.get::<Vec<String>>(1).unwrap_err();
        assert!(err.to_string().contains("column tags"));
        assert_eq!(row.get::<Vec<Option<String>>>(1)?, vec![None]);
        Ok(())
    }

    #[test]
    fn test_native_decode() -> Result<()> {
        let row = Rows::new(result_set()?, true).next().expect("row");
        assert_eq!(row.native(0)?, Native::NullableScalar(Some(Datum::Int64(1))));
        assert_eq!(
            row.native(1)?,
            Native::DenseArray(Some(vec![Datum::String("a".into())]))
        );
        assert_eq!(row.native(2)?, Native::NullableArray(None));

        let row = Rows::new(result_set()?, false).next().expect("row");
        assert_eq!(
            row.native(1)?,
            Native::NullableArray(Some(vec![Some(Datum::String("a".into()))]))
        );
        Ok(())
    }

    #[test]
    fn test_column() -> Result<()> {
        let ids = Rows::new(result_set()?, false).column::<i64>(0)?;
        assert_eq!(ids, vec![1, 2]);
        Ok(())
    }
}
