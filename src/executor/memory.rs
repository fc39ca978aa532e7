use std::{collections::HashMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    context::Context,
    error::{Error, Result},
    executor::{Executor, ResultSet, Scope},
    statement::Statement,
    storage::{
        engine::Engine as StorageEngine,
        mvcc::{Mvcc, MvccTransaction},
    },
    value::Value,
};

type QueryFn<E> = dyn Fn(&mut Tables<'_, E>, &Statement) -> Result<ResultSet> + Send + Sync;
type UpdateFn<E> = dyn Fn(&mut Tables<'_, E>, &Statement) -> Result<i64> + Send + Sync;

struct Handlers<E: StorageEngine> {
    queries: HashMap<String, Arc<QueryFn<E>>>,
    updates: HashMap<String, Arc<UpdateFn<E>>>,
}

impl<E: StorageEngine> Clone for Handlers<E> {
    fn clone(&self) -> Self {
        Self {
            queries: self.queries.clone(),
            updates: self.updates.clone(),
        }
    }
}

/// Statements are matched on their text with whitespace runs collapsed
fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// In-process executor over the MVCC storage engine
///
/// There is no SQL engine behind it: every statement text the application
/// uses is registered up front with a handler that reads and writes rows
/// through `Tables`. Reads run query handlers, batches run update handlers.
pub struct MemoryExecutor<E: StorageEngine> {
    mvcc: Mvcc<E>,
    handlers: Arc<Handlers<E>>,
}

impl<E: StorageEngine> Clone for MemoryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            mvcc: self.mvcc.clone(),
            handlers: self.handlers.clone(),
        }
    }
}

impl<E: StorageEngine> MemoryExecutor<E> {
    pub fn new(engine: E) -> Self {
        Self {
            mvcc: Mvcc::new(engine),
            handlers: Arc::new(Handlers {
                queries: HashMap::new(),
                updates: HashMap::new(),
            }),
        }
    }

    /// Registers the handler run when `sql` is read
    pub fn with_query<F>(mut self, sql: &str, handler: F) -> Self
    where
        F: Fn(&mut Tables<'_, E>, &Statement) -> Result<ResultSet> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.handlers)
            .queries
            .insert(normalize(sql), Arc::new(handler));
        self
    }

    /// Registers the handler run when `sql` is part of a batch
    pub fn with_update<F>(mut self, sql: &str, handler: F) -> Self
    where
        F: Fn(&mut Tables<'_, E>, &Statement) -> Result<i64> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.handlers)
            .updates
            .insert(normalize(sql), Arc::new(handler));
        self
    }
}

impl<E: StorageEngine> Executor for MemoryExecutor<E> {
    type Scope = MemoryScope<E>;

    fn begin(&self, ctx: &Context) -> Result<Self::Scope> {
        ctx.check()?;
        Ok(MemoryScope {
            txn: self.mvcc.begin()?,
            handlers: self.handlers.clone(),
        })
    }
}

/// A `MemoryExecutor` transaction
pub struct MemoryScope<E: StorageEngine> {
    txn: MvccTransaction<E>,
    handlers: Arc<Handlers<E>>,
}

impl<E: StorageEngine> MemoryScope<E> {
    fn execute(&mut self, statement: &Statement) -> Result<i64> {
        let sql = normalize(statement.sql());
        let handler = match self.handlers.updates.get(&sql) {
            Some(handler) => handler.clone(),
            None if self.handlers.queries.contains_key(&sql) => {
                return Err(Error::execution(format!("{:?} is a query, read it", sql)));
            }
            None => return Err(Error::execution(format!("unknown statement {:?}", sql))),
        };
        handler(&mut Tables { txn: &mut self.txn }, statement)
    }
}

impl<E: StorageEngine> Scope for MemoryScope<E> {
    fn read(&mut self, ctx: &Context, statement: &Statement) -> Result<ResultSet> {
        ctx.check()?;
        let sql = normalize(statement.sql());
        let handler = match self.handlers.queries.get(&sql) {
            Some(handler) => handler.clone(),
            None => return Err(Error::execution(format!("unknown query {:?}", sql))),
        };
        handler(&mut Tables { txn: &mut self.txn }, statement)
    }

    fn execute_batch(&mut self, ctx: &Context, statements: &[Statement]) -> Result<Vec<i64>> {
        let checkpoint = self.txn.checkpoint();
        let mut counts = Vec::with_capacity(statements.len());

        for (index, statement) in statements.iter().enumerate() {
            let result = ctx.check().and_then(|_| self.execute(statement));
            match result {
                Ok(count) => counts.push(count),
                Err(err) => {
                    self.txn.restore(checkpoint);
                    debug!(version = self.txn.version(), index, %err, "batch rolled back");
                    return Err(match err {
                        Error::Cancelled => Error::Cancelled,
                        Error::ExecutionFailed { message, .. } => Error::ExecutionFailed {
                            index: Some(index),
                            message,
                        },
                        other => Error::ExecutionFailed {
                            index: Some(index),
                            message: other.to_string(),
                        },
                    });
                }
            }
        }
        Ok(counts)
    }

    fn commit(self, ctx: &Context) -> Result<()> {
        if let Err(err) = ctx.check() {
            self.txn.rollback()?;
            return Err(err);
        }
        self.txn.commit()
    }

    fn abort(self, _ctx: &Context) -> Result<()> {
        self.txn.rollback()
    }
}

/// Row storage visible to statement handlers
///
/// Rows are addressed by table name and primary key and stored as bincode
/// encoded values. Everything goes through the enclosing transaction, so
/// reads are tracked for commit validation and writes stay buffered until
/// commit.
pub struct Tables<'a, E: StorageEngine> {
    txn: &'a mut MvccTransaction<E>,
}

impl<'a, E: StorageEngine> Tables<'a, E> {
    pub fn get(&mut self, table: &str, key: &[Value]) -> Result<Option<Vec<Value>>> {
        self.txn
            .get(&Self::row_key(table, key)?)?
            .map(|v| bincode::deserialize(&v))
            .transpose()
            .map_err(Error::from)
    }

    /// Inserts a new row, failing if the key is taken
    pub fn insert(&mut self, table: &str, key: &[Value], row: Vec<Value>) -> Result<()> {
        if self.get(table, key)?.is_some() {
            return Err(Error::execution(format!(
                "row {} already exists in {}",
                fmt_key(key),
                table
            )));
        }
        self.put(table, key, row)
    }

    /// Writes a row whether or not it exists
    pub fn put(&mut self, table: &str, key: &[Value], row: Vec<Value>) -> Result<()> {
        self.txn
            .set(Self::row_key(table, key)?, bincode::serialize(&row)?);
        Ok(())
    }

    /// Deletes a row, returning whether it existed
    pub fn delete(&mut self, table: &str, key: &[Value]) -> Result<bool> {
        if self.get(table, key)?.is_none() {
            return Ok(false);
        }
        self.txn.delete(Self::row_key(table, key)?);
        Ok(true)
    }

    /// All rows of a table
    pub fn scan(&mut self, table: &str) -> Result<Vec<Vec<Value>>> {
        let prefix = bincode::serialize(&KeyPrefix::Row(table.to_string()))?;
        self.txn
            .scan_prefix(&prefix)?
            .into_iter()
            .map(|result| bincode::deserialize(&result.value).map_err(Error::from))
            .collect()
    }

    fn row_key(table: &str, key: &[Value]) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&Key::Row(table.to_string(), key.to_vec()))?)
    }
}

fn fmt_key(key: &[Value]) -> String {
    let parts = key.iter().map(|v| v.to_string()).collect::<Vec<_>>();
    format!("({})", parts.join(", "))
}

/// Storage key of a row
///
/// bincode writes the variant index first, then the fields in order, so the
/// serialized `KeyPrefix::Row(table)` is a prefix of every row key of `table`.
#[derive(Debug, Serialize, Deserialize)]
enum Key {
    Row(String, Vec<Value>),
}

#[derive(Debug, Serialize, Deserialize)]
enum KeyPrefix {
    Row(String),
}

#[cfg(test)]
mod tests {
    use super::MemoryExecutor;
    use crate::{
        context::Context,
        error::{Error, Result},
        executor::{Column, Executor, ResultSet, Scope},
        statement::Statement,
        storage::memory::MemoryEngine,
        value::{Scalar, ToValue, Type, TypeCode, Value},
    };

    const INSERT: &str = "INSERT INTO kv (k, v) VALUES (@k, @v)";
    const SELECT: &str = "SELECT k, v FROM kv";

    fn executor() -> MemoryExecutor<MemoryEngine> {
        MemoryExecutor::new(MemoryEngine::new())
            .with_update(INSERT, |tables, stmt| {
                let key = vec![stmt.param::<String>("k")?.to_value()?];
                let value = stmt.param::<Option<i64>>("v")?.to_value()?;
                tables.insert("kv", &key, vec![key[0].clone(), value])?;
                Ok(1)
            })
            .with_query(SELECT, |tables, _| {
                let mut result = ResultSet::new(vec![
                    Column::new("k", Type::Scalar(TypeCode::String)),
                    Column::new("v", Type::Scalar(TypeCode::Int64)),
                ]);
                for row in tables.scan("kv")? {
                    result.push(row)?;
                }
                Ok(result)
            })
    }

    fn insert(k: &str, v: i64) -> Result<Statement> {
        Statement::builder(INSERT).bind("k", k).bind("v", v).build()
    }

    #[test]
    fn test_batch_and_read() -> Result<()> {
        let ctx = Context::background();
        let executor = executor();

        let mut scope = executor.begin(&ctx)?;
        let counts = scope.execute_batch(&ctx, &[insert("a", 1)?, insert("b", 2)?])?;
        assert_eq!(counts, vec![1, 1]);
        assert_eq!(scope.read(&ctx, &Statement::new(SELECT)?)?.rows.len(), 2);
        scope.commit(&ctx)?;

        let mut scope = executor.begin(&ctx)?;
        let result = scope.read(&ctx, &Statement::new("  SELECT k,  v\n FROM kv ")?)?;
        assert_eq!(
            result.rows[1],
            vec![
                Value::Scalar(Scalar::String("b".into())),
                Value::Scalar(Scalar::Int64(2))
            ]
        );
        scope.abort(&ctx)?;
        Ok(())
    }

    #[test]
    fn test_batch_is_atomic() -> Result<()> {
        let ctx = Context::background();
        let mut scope = executor().begin(&ctx)?;
        scope.execute_batch(&ctx, &[insert("a", 1)?])?;

        let err = scope
            .execute_batch(&ctx, &[insert("b", 2)?, insert("c", 3)?, insert("a", 4)?])
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionFailed { index: Some(2), .. }));

        // the earlier batch survives, the failed one left nothing behind
        let rows = scope.read(&ctx, &Statement::new(SELECT)?)?.rows;
        assert_eq!(rows.len(), 1);
        Ok(())
    }

    #[test]
    fn test_unknown_statement() -> Result<()> {
        let ctx = Context::background();
        let mut scope = executor().begin(&ctx)?;
        assert!(matches!(
            scope.read(&ctx, &Statement::new("SELECT 1")?),
            Err(Error::ExecutionFailed { index: None, .. })
        ));
        assert!(matches!(
            scope.execute_batch(&ctx, &[Statement::new(SELECT)?]),
            Err(Error::ExecutionFailed { index: Some(0), .. })
        ));
        Ok(())
    }

    #[test]
    fn test_cancelled_batch() -> Result<()> {
        let ctx = Context::background();
        let mut scope = executor().begin(&ctx)?;
        let cancelled = ctx.child();
        cancelled.cancel();
        assert_eq!(
            scope.execute_batch(&cancelled, &[insert("a", 1)?]),
            Err(Error::Cancelled)
        );
        assert!(scope.read(&ctx, &Statement::new(SELECT)?)?.rows.is_empty());
        assert_eq!(scope.commit(&cancelled), Err(Error::Cancelled));
        Ok(())
    }
}
