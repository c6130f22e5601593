use std::future::Future;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::Context;
use crate::config::RetryPolicy;
use crate::error::SqlAdapterError;

/// Repeat `connect` until it succeeds, a non-transient error occurs, or the policy runs out.
///
/// Every raw error passes through `translate` before it is classified, so a dialect can
/// mark e.g. "too many clients" as transient.
///
/// # Errors
/// - `Cancelled` / `DeadlineExceeded` as soon as the context says so, without further attempts.
/// - The translated error itself when it is not transient.
/// - `Connectivity { attempts, last }` once the attempt budget or the wait budget is spent.
pub async fn wait_for_connection<T, F, Fut>(
    ctx: &Context,
    policy: &RetryPolicy,
    translate: impl Fn(SqlAdapterError) -> SqlAdapterError,
    mut connect: F,
) -> Result<T, SqlAdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SqlAdapterError>>,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0_usize;

    loop {
        attempt += 1;
        let err = match ctx.run(connect()).await {
            Ok(conn) => {
                if attempt > 1 {
                    debug!(attempt, "connection established after retry");
                }
                return Ok(conn);
            }
            Err(err @ (SqlAdapterError::Cancelled | SqlAdapterError::DeadlineExceeded)) => {
                return Err(err);
            }
            Err(err) => translate(err),
        };

        if !err.is_transient() {
            return Err(err);
        }

        let delay = policy.backoff(attempt);
        let over_budget = policy
            .max_wait()
            .is_some_and(|max_wait| started.elapsed() + delay > max_wait);
        if attempt >= max_attempts || over_budget {
            warn!(attempt, error = %err, "giving up on connection");
            return Err(SqlAdapterError::Connectivity {
                attempts: attempt,
                last: Box::new(err),
            });
        }

        warn!(attempt, ?delay, error = %err, "connection attempt failed, retrying");
        ctx.sleep(delay).await?;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(2))
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let value = wait_for_connection(&Context::background(), &fast_policy(5), |e| e, move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(SqlAdapterError::ConnectionError("refused".into()))
            } else {
                Ok("conn")
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "conn");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_non_transient_error() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let err = wait_for_connection::<(), _, _>(
            &Context::background(),
            &fast_policy(5),
            |e| e,
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SqlAdapterError::ConfigError("bad password".into()))
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SqlAdapterError::ConfigError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn translation_can_make_errors_transient() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let err = wait_for_connection::<(), _, _>(
            &Context::background(),
            &fast_policy(3),
            |e| match e {
                SqlAdapterError::Other(msg) => SqlAdapterError::ResourceExhausted(msg),
                other => other,
            },
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SqlAdapterError::Other("too many clients".into()))
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SqlAdapterError::Connectivity { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_context_makes_no_attempt() {
        let ctx = Context::background();
        ctx.cancel();
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let err = wait_for_connection::<(), _, _>(&ctx, &fast_policy(5), |e| e, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(SqlAdapterError::ConnectionError("refused".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SqlAdapterError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_the_loop() {
        let ctx = Context::background();
        let policy = RetryPolicy::default()
            .with_max_attempts(5)
            .with_backoff(Duration::from_secs(30), Duration::from_secs(30));
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let started = Instant::now();
        let err = wait_for_connection::<(), _, _>(&ctx, &policy, |e| e, move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(SqlAdapterError::ConnectionError("refused".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SqlAdapterError::Cancelled), "{err:?}");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn wait_budget_caps_attempts() {
        let policy = RetryPolicy::default()
            .with_max_attempts(100)
            .with_backoff(Duration::from_millis(50), Duration::from_millis(50))
            .with_max_wait(Some(Duration::from_millis(10)));
        let err = wait_for_connection::<(), _, _>(&Context::background(), &policy, |e| e, || async {
            Err(SqlAdapterError::ConnectionError("refused".into()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SqlAdapterError::Connectivity { attempts: 1, .. }));
    }
}
