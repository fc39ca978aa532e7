use crate::{
    context::Context,
    error::{Error, Result},
    executor::Scope,
    statement::Statement,
    transaction::Transaction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Building,
    Submitted,
}

/// An ordered group of writes submitted atomically
///
/// Statements are collected while Building; `submit` runs them in order in a
/// single executor call and moves the batch to Submitted, whatever the
/// outcome. Either every statement takes effect or none does.
pub struct Batch<'t, S: Scope> {
    txn: &'t mut Transaction<S>,
    statements: Vec<Statement>,
    state: BatchState,
}

impl<'t, S: Scope> Batch<'t, S> {
    pub(crate) fn new(txn: &'t mut Transaction<S>) -> Self {
        Self {
            txn,
            statements: Vec::new(),
            state: BatchState::Building,
        }
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Adds a statement; appending to a submitted batch aborts the transaction
    pub fn append(&mut self, statement: Statement) -> Result<&mut Self> {
        if self.state == BatchState::Submitted {
            return Err(self.txn.abort_with(Error::Construction(
                "cannot append to a submitted batch".to_string(),
            )));
        }
        self.statements.push(statement);
        Ok(self)
    }

    /// Submits the batch, returning one count per statement in order
    ///
    /// An empty batch succeeds without reaching the executor, unless the
    /// context is cancelled. Any failure aborts the transaction, including a
    /// second submit; if statement `k` failed the error is `ExecutionFailed`
    /// with index `k`.
    pub fn submit(&mut self, ctx: &Context) -> Result<Vec<i64>> {
        if self.state == BatchState::Submitted {
            return Err(self.txn.abort_with(Error::Construction(
                "batch has already been submitted".to_string(),
            )));
        }
        self.txn.ensure_active()?;
        self.state = BatchState::Submitted;
        if let Err(err) = ctx.check() {
            return Err(self.txn.abort_with(err));
        }
        if self.statements.is_empty() {
            return Ok(Vec::new());
        }
        self.txn.execute_batch(ctx, &self.statements)
    }

    /// Submits the batch and checks that `expected` rows changed in total
    ///
    /// A different total aborts the transaction with `RowCountMismatch`.
    pub fn submit_expecting(&mut self, ctx: &Context, expected: i64) -> Result<Vec<i64>> {
        let counts = self.submit(ctx)?;
        let actual = counts.iter().sum::<i64>();
        if actual != expected {
            return Err(self
                .txn
                .abort_with(Error::RowCountMismatch { expected, actual }));
        }
        Ok(counts)
    }
}
