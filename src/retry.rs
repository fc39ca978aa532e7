//! Replaying transactions that lose a commit-time conflict

use tracing::warn;

use crate::{
    config::RetryPolicy,
    context::Context,
    error::Result,
    executor::Executor,
    session::Session,
    transaction::Transaction,
};

impl<E: Executor> Session<E> {
    /// Runs `f` in a fresh transaction and commits it, retrying on conflict
    ///
    /// Uses the session's retry policy. See `run_transaction_with`.
    pub fn run_transaction<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnMut(&mut Transaction<E::Scope>) -> Result<T>,
    {
        let policy = self.config().retry.clone();
        self.run_transaction_with(ctx, &policy, f)
    }

    /// Runs `f` in a fresh transaction and commits it if `f` left it active
    ///
    /// A `ConflictAborted` from `f` or from the commit replays the whole
    /// closure in a new transaction after a backoff, up to
    /// `policy.max_attempts` attempts in total. Any other error is returned
    /// as is. Cancellation is checked before every attempt and ends a backoff
    /// early.
    pub fn run_transaction_with<T, F>(
        &self,
        ctx: &Context,
        policy: &RetryPolicy,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut(&mut Transaction<E::Scope>) -> Result<T>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            ctx.check()?;
            let mut txn = self.open_transaction(ctx)?;
            let result = match f(&mut txn) {
                Ok(value) if txn.is_active() => txn.commit(ctx).map(|_| value),
                Ok(value) => Ok(value),
                Err(err) => {
                    if txn.is_active() {
                        if let Err(abort_err) = txn.abort(ctx) {
                            warn!(txn = txn.id(), %abort_err, "abort after failure failed");
                        }
                    }
                    Err(err)
                }
            };
            match result {
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let backoff = policy.backoff(attempt);
                    warn!(
                        txn = txn.id(),
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transaction conflicted, retrying"
                    );
                    ctx.sleep(backoff)?;
                }
                result => return result,
            }
        }
    }
}
