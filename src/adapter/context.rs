use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::SqlAdapterError;

/// Cancellation and deadline governing a session's calls.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Never cancelled, no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Keeps the earlier of the current and the new deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// A context cancelled together with this one, but cancellable on its own.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// # Errors
    /// `Cancelled` or `DeadlineExceeded` once either applies.
    pub fn check(&self) -> Result<(), SqlAdapterError> {
        if self.cancel.is_cancelled() {
            return Err(SqlAdapterError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(SqlAdapterError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the context is cancelled or its deadline passes first.
    ///
    /// # Errors
    /// The future's own error, or `Cancelled` / `DeadlineExceeded`.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, SqlAdapterError>
    where
        F: Future<Output = Result<T, SqlAdapterError>>,
    {
        self.check()?;
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(SqlAdapterError::Cancelled),
            () = expired => Err(SqlAdapterError::DeadlineExceeded),
            res = fut => res,
        }
    }

    /// # Errors
    /// `Cancelled` / `DeadlineExceeded` if either applies before `duration` elapses.
    pub async fn sleep(&self, duration: Duration) -> Result<(), SqlAdapterError> {
        self.run(async move {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_context_stops_work() {
        let ctx = Context::background();
        let child = ctx.child();
        ctx.cancel();
        let res = child
            .run(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(SqlAdapterError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        let res = ctx.sleep(Duration::from_secs(5)).await;
        assert!(matches!(res, Err(SqlAdapterError::DeadlineExceeded)));
        assert!(matches!(ctx.check(), Err(SqlAdapterError::DeadlineExceeded)));
    }

    #[tokio::test]
    async fn completes_when_unbounded() {
        let value = Context::background().run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }
}
