use crate::{
    config::SessionConfig,
    context::Context,
    error::Result,
    executor::Executor,
    transaction::Transaction,
};

/// Entry point for opening transactions against an executor
pub struct Session<E: Executor> {
    executor: E,
    config: SessionConfig,
}

impl<E: Executor> Clone for Session<E> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            config: self.config.clone(),
        }
    }
}

impl<E: Executor> Session<E> {
    pub fn new(executor: E, config: SessionConfig) -> Self {
        Self { executor, config }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Opens a read-write transaction
    pub fn open_transaction(&self, ctx: &Context) -> Result<Transaction<E::Scope>> {
        ctx.check()?;
        let scope = self.executor.begin(ctx)?;
        Ok(Transaction::new(scope, self.config.clone()))
    }
}
