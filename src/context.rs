use std::{
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Per-call context handed to every executor operation
///
/// Cloning shares the cancellation signal; `child` derives a context that is
/// cancelled along with its parent but can also be cancelled on its own.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
}

impl Context {
    /// A context that is never cancelled unless `cancel` is called on it
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with `Cancelled` once cancellation has been requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Blocks for `duration`, returning `Cancelled` early if cancelled
    ///
    /// The signal is polled every `SLEEP_SLICE`.
    pub fn sleep(&self, duration: Duration) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use std::{
        thread,
        time::{Duration, Instant},
    };

    use tokio_util::sync::CancellationToken;

    use super::Context;
    use crate::error::{Error, Result};

    #[test]
    fn test_cancel() -> Result<()> {
        let ctx = Context::background();
        ctx.check()?;

        let child = ctx.child();
        child.cancel();
        assert_eq!(child.check(), Err(Error::Cancelled));
        ctx.check()?;

        let token = CancellationToken::new();
        let ctx = Context::with_cancellation(token.clone());
        let child = ctx.child();
        token.cancel();
        assert!(ctx.is_cancelled());
        assert_eq!(child.check(), Err(Error::Cancelled));
        Ok(())
    }

    #[test]
    fn test_sleep_is_cancellable() -> Result<()> {
        let ctx = Context::background();
        ctx.sleep(Duration::from_millis(5))?;

        let remote = ctx.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });
        let start = Instant::now();
        assert_eq!(ctx.sleep(Duration::from_secs(60)), Err(Error::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
        canceller.join().expect("canceller thread");
        Ok(())
    }
}
