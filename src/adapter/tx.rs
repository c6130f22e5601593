use std::ops::Deref;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use super::{Context, NativeTx, Session, wait_for_connection};
use crate::error::SqlAdapterError;

/// A session clone bound to a native transaction.
///
/// Statements issued through it (it derefs to [`Session`]) run inside the transaction.
/// Finish it with [`Tx::commit`] or [`Tx::rollback`]; a transaction dropped unfinished is
/// rolled back by the native gateway.
pub struct Tx {
    session: Session,
    native: Arc<dyn NativeTx>,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx").field("session", &self.session).finish_non_exhaustive()
    }
}

impl Deref for Tx {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Tx {
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// # Errors
    /// The driver's commit error, translated; `TxDone` if already finished.
    pub async fn commit(self) -> Result<(), SqlAdapterError> {
        debug!("commit");
        self.session
            .context()
            .run(self.native.commit())
            .await
            .map_err(|err| self.session.dialect().translate_error(err))
    }

    /// Roll back. Runs even if the session context is already cancelled.
    ///
    /// # Errors
    /// The driver's rollback error, translated; `TxDone` if already finished.
    pub async fn rollback(self) -> Result<(), SqlAdapterError> {
        debug!("rollback");
        self.native
            .rollback()
            .await
            .map_err(|err| self.session.dialect().translate_error(err))
    }
}

impl Session {
    /// Start a transaction on a checked clone of this session.
    ///
    /// `BEGIN` goes through the retry loop; a connection that turns out dead while beginning
    /// is replaced before the next attempt.
    ///
    /// # Errors
    /// `Connectivity`, `Cancelled` / `DeadlineExceeded`, or the driver's begin error.
    pub async fn new_tx(&self, ctx: Context) -> Result<Tx, SqlAdapterError> {
        let mut clone = self.new_clone(ctx.clone(), true).await?;
        let retry = clone
            .settings()
            .map(|settings| settings.retry)
            .unwrap_or_default();

        let native = {
            let clone = &clone;
            wait_for_connection(&ctx, &retry, |err| err, move || async move {
                let conn = clone.connection().await?;
                match conn.begin().await {
                    Ok(native) => Ok(native),
                    Err(err) => {
                        let err = clone.dialect().translate_error(err);
                        if err.is_connection_lost() {
                            clone.invalidate_connection(&conn).await;
                        }
                        Err(err)
                    }
                }
            })
            .await?
        };

        debug!("begin");
        clone.bind_tx(ctx, Arc::clone(&native))?;
        Ok(Tx {
            session: clone,
            native,
        })
    }

    /// Run `f` inside a transaction: commit when it returns `Ok`, roll back when it returns
    /// `Err` or panics. A panic is re-raised after the rollback.
    ///
    /// ```rust,no_run
    /// # use sql_adapter::prelude::*;
    /// # async fn demo(session: &Session) -> Result<(), SqlAdapterError> {
    /// use futures_util::FutureExt;
    ///
    /// let moved = session
    ///     .run_tx(Context::background(), |tx| {
    ///         async move {
    ///             tx.exec_raw("UPDATE accounts SET balance = balance - ? WHERE id = ?", &[
    ///                 RowValues::Int(10),
    ///                 RowValues::Int(1),
    ///             ])
    ///             .await
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// # let _ = moved;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// The error `f` returned, `Rollback { source, rollback }` when rolling back failed too,
    /// or the begin/commit error.
    pub async fn run_tx<T, F>(&self, ctx: Context, f: F) -> Result<T, SqlAdapterError>
    where
        F: for<'t> FnOnce(&'t Tx) -> BoxFuture<'t, Result<T, SqlAdapterError>>,
    {
        let tx = self.new_tx(ctx).await?;
        let outcome = AssertUnwindSafe(f(&tx)).catch_unwind().await;
        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await?;
                Ok(value)
            }
            Ok(Err(err)) => {
                warn!(error = %err, "transaction body failed, rolling back");
                match tx.rollback().await {
                    Ok(()) => Err(err),
                    Err(rollback) => Err(SqlAdapterError::Rollback {
                        source: Box::new(err),
                        rollback: Box::new(rollback),
                    }),
                }
            }
            Err(panic) => {
                if let Err(rollback) = tx.rollback().await {
                    error!(error = %rollback, "rollback after panic failed");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}
