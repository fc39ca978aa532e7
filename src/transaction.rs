//! Client-side read-write transactions
//!
//! A `Transaction` starts Active and reaches exactly one terminal state:
//!
//! ```text
//! Active --commit--> Committed
//! Active --abort---> Aborted
//! Active --any failed read, batch or commit--> Aborted
//! ```
//!
//! Once terminal every operation fails with `AlreadyTerminal` and the executor
//! scope has been released.

use std::{
    fmt::Display,
    sync::atomic::{AtomicU64, Ordering},
};

use tracing::{debug, warn};

use crate::{
    batch::Batch,
    config::{QueryOptions, SessionConfig},
    context::Context,
    error::{Error, Result},
    executor::{Rows, Scope},
    statement::Statement,
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        })
    }
}

/// A read-write transaction over an executor scope
///
/// Reads see one snapshot; writes go through batches and take effect only if
/// the commit validates every read. Dropping an Active transaction aborts it.
pub struct Transaction<S: Scope> {
    id: u64,
    scope: Option<S>,
    state: TransactionState,
    config: SessionConfig,
}

impl<S: Scope> Transaction<S> {
    pub(crate) fn new(scope: S, config: SessionConfig) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(txn = id, "transaction started");
        Self {
            id,
            scope: Some(scope),
            state: TransactionState::Active,
            config,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs a query inside the transaction
    pub fn read(&mut self, ctx: &Context, statement: &Statement) -> Result<Rows> {
        self.read_with(ctx, statement, QueryOptions::default())
    }

    pub fn read_with(
        &mut self,
        ctx: &Context,
        statement: &Statement,
        options: QueryOptions,
    ) -> Result<Rows> {
        let native_arrays = options
            .decode_to_native_arrays
            .unwrap_or(self.config.decode_to_native_arrays);
        let result = self.call(ctx, |scope, ctx| scope.read(ctx, statement))?;
        Ok(Rows::new(result, native_arrays))
    }

    /// Starts an empty batch of writes
    pub fn new_batch(&mut self) -> Result<Batch<'_, S>> {
        self.ensure_active()?;
        Ok(Batch::new(self))
    }

    pub(crate) fn execute_batch(
        &mut self,
        ctx: &Context,
        statements: &[Statement],
    ) -> Result<Vec<i64>> {
        let counts = self.call(ctx, |scope, ctx| scope.execute_batch(ctx, statements))?;
        if counts.len() != statements.len() {
            return Err(self.abort_with(Error::Internal(format!(
                "executor returned {} counts for {} statements",
                counts.len(),
                statements.len()
            ))));
        }
        Ok(counts)
    }

    /// Commits, or fails with `ConflictAborted` if a read was invalidated
    ///
    /// The transaction is terminal afterwards whatever the outcome. A
    /// cancelled context never commits.
    pub fn commit(&mut self, ctx: &Context) -> Result<()> {
        self.ensure_active()?;
        if let Err(err) = ctx.check() {
            return Err(self.abort_with(err));
        }
        let scope = self.take_scope()?;
        match scope.commit(ctx) {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!(txn = self.id, "transaction committed");
                Ok(())
            }
            Err(err) => {
                self.state = TransactionState::Aborted;
                debug!(txn = self.id, %err, "transaction aborted at commit");
                Err(err)
            }
        }
    }

    /// Aborts, discarding every write
    pub fn abort(&mut self, ctx: &Context) -> Result<()> {
        self.ensure_active()?;
        let scope = self.take_scope()?;
        self.state = TransactionState::Aborted;
        debug!(txn = self.id, "transaction aborted");
        scope.abort(ctx)
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            state => Err(Error::AlreadyTerminal(state)),
        }
    }

    /// Runs an executor call, aborting the transaction if it fails
    ///
    /// Cancellation is checked before and after the call.
    fn call<T>(
        &mut self,
        ctx: &Context,
        f: impl FnOnce(&mut S, &Context) -> Result<T>,
    ) -> Result<T> {
        self.ensure_active()?;
        let scope = match self.scope.as_mut() {
            Some(scope) => scope,
            None => return Err(Error::Internal("active transaction without a scope".into())),
        };
        let result = ctx
            .check()
            .and_then(|_| f(scope, ctx))
            .and_then(|value| ctx.check().map(|_| value));
        result.map_err(|err| self.abort_with(err))
    }

    /// Aborts an active transaction because of `err`, which is handed back
    pub(crate) fn abort_with(&mut self, err: Error) -> Error {
        if let Some(scope) = self.scope.take() {
            self.state = TransactionState::Aborted;
            debug!(txn = self.id, %err, "transaction aborted");
            if let Err(abort_err) = scope.abort(&Context::background()) {
                warn!(txn = self.id, %abort_err, "failed to release aborted transaction");
            }
        }
        err
    }

    fn take_scope(&mut self) -> Result<S> {
        self.scope
            .take()
            .ok_or_else(|| Error::Internal("active transaction without a scope".into()))
    }
}

impl<S: Scope> Drop for Transaction<S> {
    fn drop(&mut self) {
        if let Some(scope) = self.scope.take() {
            warn!(txn = self.id, "transaction dropped while active, aborting");
            self.state = TransactionState::Aborted;
            if let Err(err) = scope.abort(&Context::background()) {
                warn!(txn = self.id, %err, "failed to release dropped transaction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{Transaction, TransactionState};
    use crate::{
        config::{QueryOptions, SessionConfig},
        context::Context,
        error::{Error, Result},
        executor::{Column, ResultSet, Scope},
        statement::Statement,
        value::{Datum, Native, Scalar, Type, TypeCode, Value},
    };

    /// Records what reached the executor, failing where told to
    #[derive(Default)]
    struct Probe {
        calls: Arc<Mutex<Vec<String>>>,
        fail_read: bool,
        conflict: bool,
        short_counts: bool,
    }

    impl Probe {
        fn log(&self, call: &str) {
            self.calls.lock().expect("lock").push(call.to_string());
        }
    }

    impl Scope for Probe {
        fn read(&mut self, _ctx: &Context, statement: &Statement) -> Result<ResultSet> {
            self.log(&format!("read {}", statement.sql()));
            if self.fail_read {
                return Err(Error::execution("table not found"));
            }
            let mut result = ResultSet::new(vec![Column::new("a", Type::Array(TypeCode::Int64))]);
            result.push(vec![Value::Array(TypeCode::Int64, vec![Some(Scalar::Int64(1))])])?;
            Ok(result)
        }

        fn execute_batch(&mut self, _ctx: &Context, statements: &[Statement]) -> Result<Vec<i64>> {
            self.log(&format!("batch {}", statements.len()));
            let n = if self.short_counts { 0 } else { statements.len() };
            Ok(vec![1; n])
        }

        fn commit(self, _ctx: &Context) -> Result<()> {
            self.log("commit");
            if self.conflict {
                return Err(Error::ConflictAborted);
            }
            Ok(())
        }

        fn abort(self, _ctx: &Context) -> Result<()> {
            self.log("abort");
            Ok(())
        }
    }

    fn txn(probe: Probe) -> (Transaction<Probe>, Arc<Mutex<Vec<String>>>) {
        let calls = probe.calls.clone();
        (Transaction::new(probe, SessionConfig::default()), calls)
    }

    fn calls(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().expect("lock").clone()
    }

    #[test]
    fn test_commit_is_terminal() -> Result<()> {
        let ctx = Context::background();
        let (mut txn, log) = txn(Probe::default());
        let stmt = Statement::new("SELECT a FROM t")?;

        txn.read(&ctx, &stmt)?;
        txn.commit(&ctx)?;
        assert_eq!(txn.state(), TransactionState::Committed);

        let terminal = Err(Error::AlreadyTerminal(TransactionState::Committed));
        assert_eq!(txn.read(&ctx, &stmt).map(|_| ()), terminal);
        assert_eq!(txn.commit(&ctx), terminal);
        assert_eq!(txn.abort(&ctx), terminal);
        assert_eq!(txn.new_batch().map(|_| ()), terminal);
        assert_eq!(
            Error::AlreadyTerminal(TransactionState::Committed).to_string(),
            "transaction is already committed"
        );

        drop(txn);
        assert_eq!(calls(&log), vec!["read SELECT a FROM t", "commit"]);
        Ok(())
    }

    #[test]
    fn test_failed_read_aborts() -> Result<()> {
        let ctx = Context::background();
        let (mut txn, log) = txn(Probe {
            fail_read: true,
            ..Probe::default()
        });
        let err = txn.read(&ctx, &Statement::new("SELECT 1")?).unwrap_err();
        assert!(matches!(err, Error::ExecutionFailed { .. }));
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(
            txn.commit(&ctx),
            Err(Error::AlreadyTerminal(TransactionState::Aborted))
        );
        assert_eq!(calls(&log), vec!["read SELECT 1", "abort"]);
        Ok(())
    }

    #[test]
    fn test_conflict_at_commit() -> Result<()> {
        let ctx = Context::background();
        let (mut txn, log) = txn(Probe {
            conflict: true,
            ..Probe::default()
        });
        let err = txn.commit(&ctx).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(txn.state(), TransactionState::Aborted);
        drop(txn);
        assert_eq!(calls(&log), vec!["commit"]);
        Ok(())
    }

    #[test]
    fn test_cancelled_never_commits() -> Result<()> {
        let ctx = Context::background();
        let (mut txn, log) = txn(Probe::default());
        ctx.cancel();
        assert_eq!(txn.commit(&ctx), Err(Error::Cancelled));
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert_eq!(calls(&log), vec!["abort"]);
        Ok(())
    }

    #[test]
    fn test_count_mismatch_aborts() -> Result<()> {
        let ctx = Context::background();
        let (mut txn, _) = txn(Probe {
            short_counts: true,
            ..Probe::default()
        });
        let stmt = Statement::new("UPDATE t SET a = 1")?;
        assert!(matches!(
            txn.execute_batch(&ctx, &[stmt]),
            Err(Error::Internal(_))
        ));
        assert_eq!(txn.state(), TransactionState::Aborted);
        Ok(())
    }

    #[test]
    fn test_drop_aborts() -> Result<()> {
        let (txn, log) = txn(Probe::default());
        drop(txn);
        assert_eq!(calls(&log), vec!["abort"]);
        Ok(())
    }

    #[test]
    fn test_read_options() -> Result<()> {
        let ctx = Context::background();
        let (mut txn, _) = txn(Probe::default());
        let stmt = Statement::new("SELECT a FROM t")?;

        let row = txn.read(&ctx, &stmt)?.next().expect("row");
        assert_eq!(
            row.native(0)?,
            Native::NullableArray(Some(vec![Some(Datum::Int64(1))]))
        );

        let options = QueryOptions::new().decode_to_native_arrays(true);
        let row = txn.read_with(&ctx, &stmt, options)?.next().expect("row");
        assert_eq!(row.native(0)?, Native::DenseArray(Some(vec![Datum::Int64(1)])));
        txn.abort(&ctx)
    }
}
