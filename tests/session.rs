mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{FakeBackend, postgres_session, rows, settings};
use pretty_assertions::assert_eq;
use sql_adapter::prelude::*;

fn refused() -> SqlAdapterError {
    SqlAdapterError::ConnectionError("connection refused".into())
}

fn bad_password() -> SqlAdapterError {
    SqlAdapterError::ConnectionError("password authentication failed for user \"svc\"".into())
}

fn lost() -> SqlAdapterError {
    SqlAdapterError::ConnectionLost("server closed the connection unexpectedly".into())
}

#[tokio::test]
async fn connect_retries_transient_failures() {
    let backend = FakeBackend::new().fail_connects(2, refused);
    let session = Session::connect(
        Arc::new(PostgresDialect::new()),
        backend.connector(),
        settings(3),
    )
    .await;
    assert!(session.is_ok());
    assert_eq!(backend.connects(), 3);
}

#[tokio::test]
async fn connect_gives_up_after_max_attempts() {
    let backend = FakeBackend::new().fail_connects(10, refused);
    let err = Session::connect(
        Arc::new(PostgresDialect::new()),
        backend.connector(),
        settings(3),
    )
    .await
    .unwrap_err();
    match err {
        SqlAdapterError::Connectivity { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, SqlAdapterError::ConnectionError(_)));
        }
        other => panic!("expected Connectivity, got {other:?}"),
    }
    assert_eq!(backend.connects(), 3);
}

#[tokio::test]
async fn authentication_failures_are_not_retried() {
    let backend = FakeBackend::new().fail_connects(10, bad_password);
    let err = Session::connect(
        Arc::new(PostgresDialect::new()),
        backend.connector(),
        settings(5),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SqlAdapterError::ConfigError(_)), "{err:?}");
    assert_eq!(backend.connects(), 1);
}

#[tokio::test]
async fn cancelled_context_stops_before_connecting() {
    let backend = FakeBackend::new();
    let ctx = Context::background();
    ctx.cancel();
    let mut session = Session::new(Arc::new(PostgresDialect::new()), backend.connector())
        .with_context(ctx)
        .await;
    let err = session.open(settings(3)).await.unwrap_err();
    assert!(matches!(err, SqlAdapterError::Cancelled));
    assert_eq!(backend.connects(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_between_attempts_stops_retrying() {
    let backend = FakeBackend::new().fail_connects(10, refused);
    let ctx = Context::background();
    let mut session = Session::new(Arc::new(PostgresDialect::new()), backend.connector())
        .with_context(ctx.clone())
        .await;
    let slow = settings(5).with_retry(
        RetryPolicy::default()
            .with_max_attempts(5)
            .with_backoff(Duration::from_secs(30), Duration::from_secs(30)),
    );
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        ctx.cancel();
    });

    let err = session.open(slow).await.unwrap_err();
    assert!(matches!(err, SqlAdapterError::Cancelled), "{err:?}");
    assert_eq!(backend.connects(), 1);
}

#[tokio::test]
async fn invalid_settings_are_rejected() {
    let backend = FakeBackend::new();
    let err = Session::connect(
        Arc::new(PostgresDialect::new()),
        backend.connector(),
        ConnectionSettings::new("", "app"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SqlAdapterError::ConfigError(_)));
    assert_eq!(backend.connects(), 0);
}

#[tokio::test]
async fn placeholders_are_rewritten_for_the_dialect() {
    let backend = FakeBackend::new();
    let session = postgres_session(&backend).await;
    let affected = session
        .exec_raw(
            "UPDATE accounts SET balance = ? WHERE id = ?",
            &[RowValues::Int(10), RowValues::Int(1)],
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(
        backend.log(),
        vec!["UPDATE accounts SET balance = $1 WHERE id = $2".to_string()]
    );
}

#[tokio::test]
async fn array_brackets_hold_postgres_placeholders() {
    let backend = FakeBackend::new();
    let session = postgres_session(&backend).await;
    session
        .exec_raw(
            "UPDATE t SET tags = ARRAY[?, ?]",
            &[RowValues::Int(1), RowValues::Int(2)],
        )
        .await
        .unwrap();
    assert_eq!(backend.log(), vec!["UPDATE t SET tags = ARRAY[$1, $2]".to_string()]);
}

#[tokio::test]
async fn dollar_quoted_bodies_take_no_arguments() {
    let backend = FakeBackend::new();
    let session = postgres_session(&backend).await;
    let body = "DO $$ BEGIN PERFORM '{}'::jsonb ? 'k'; END $$";
    session.exec_raw(body, &[]).await.unwrap();
    assert_eq!(backend.log(), vec![body.to_string()]);
}

#[tokio::test]
async fn argument_count_mismatch_never_reaches_the_driver() {
    let backend = FakeBackend::new();
    let session = postgres_session(&backend).await;
    let err = session
        .exec_raw("UPDATE t SET a = ? WHERE b = ?", &[RowValues::Int(1)])
        .await
        .unwrap_err();
    assert!(matches!(err, SqlAdapterError::ParameterError(_)));
    assert!(backend.log().is_empty());
}

#[tokio::test]
async fn lost_connection_is_replaced_once() {
    let backend = FakeBackend::new().fail_on("DELETE", 1, lost);
    let session = postgres_session(&backend).await;
    let affected = session
        .exec_raw("DELETE FROM sessions WHERE expired", &[])
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(backend.connects(), 2);
    assert_eq!(backend.count("DELETE"), 2);
}

#[tokio::test]
async fn second_loss_is_reported() {
    let backend = FakeBackend::new().fail_on("DELETE", 2, lost);
    let session = postgres_session(&backend).await;
    let err = session
        .exec_raw("DELETE FROM sessions", &[])
        .await
        .unwrap_err();
    assert!(err.is_connection_lost());
    assert_eq!(backend.count("DELETE"), 2);
}

#[tokio::test]
async fn ping_reconnects_a_dead_handle() {
    let backend = FakeBackend::new().fail_on("PING", 1, lost);
    let session = postgres_session(&backend).await;
    session.ping().await.unwrap();
    assert_eq!(backend.connects(), 2);
}

#[tokio::test]
async fn database_name_is_looked_up_once() {
    let backend = FakeBackend::new().respond(|sql, _| {
        sql.contains("CURRENT_DATABASE")
            .then(|| rows(&["name"], vec![vec!["app".into()]]))
    });
    let session = postgres_session(&backend).await;
    assert_eq!(session.lookup_name().await.unwrap(), "app");
    assert_eq!(session.lookup_name().await.unwrap(), "app");
    assert_eq!(backend.count("CURRENT_DATABASE"), 1);
}

#[tokio::test]
async fn table_existence_follows_the_catalog() {
    let backend = FakeBackend::new().respond(|sql, args| {
        if sql.contains("CURRENT_DATABASE") {
            return Some(rows(&["name"], vec![vec!["app".into()]]));
        }
        if sql.contains("information_schema.tables") {
            let known = args.get(1).and_then(RowValues::as_text) == Some("users");
            return Some(if known {
                rows(&["name"], vec![vec!["users".into()]])
            } else {
                rows(&["name"], Vec::new())
            });
        }
        None
    });
    let session = postgres_session(&backend).await;
    session.table_exists("users").await.unwrap();
    assert!(matches!(
        session.table_exists("ghosts").await,
        Err(SqlAdapterError::CollectionDoesNotExist(name)) if name == "ghosts"
    ));
    assert!(!session.collection("ghosts").exists().await.unwrap());
}

#[tokio::test]
async fn collections_lists_table_names() {
    let backend = FakeBackend::new().respond(|sql, _| {
        if sql.contains("CURRENT_DATABASE") {
            Some(rows(&["name"], vec![vec!["app".into()]]))
        } else if sql.contains("table_schema = 'public'") {
            Some(rows(
                &["name"],
                vec![vec!["accounts".into()], vec!["users".into()]],
            ))
        } else {
            None
        }
    });
    let session = postgres_session(&backend).await;
    assert_eq!(
        session.collections().await.unwrap(),
        vec!["accounts".to_string(), "users".to_string()]
    );
}

#[tokio::test]
async fn clones_share_settings_but_not_transactions() {
    let backend = FakeBackend::new();
    let session = postgres_session(&backend).await;
    let clone = session
        .new_clone(Context::background(), true)
        .await
        .unwrap();
    assert!(!clone.in_tx());
    assert_eq!(clone.settings().map(|s| s.database.as_str()), Some("app"));
    // The checked clone pinged the shared handle instead of opening a new one.
    assert_eq!(backend.connects(), 1);
    assert_eq!(backend.count("PING"), 1);
}

#[tokio::test]
async fn close_releases_the_handle() {
    let backend = FakeBackend::new();
    let session = postgres_session(&backend).await;
    session.close().await.unwrap();
    assert_eq!(backend.count("CLOSE"), 1);
    // The next statement reconnects.
    session.exec_raw("SELECT 1", &[]).await.unwrap();
    assert_eq!(backend.connects(), 2);
}
