//! A scripted in-memory backend: records every statement, fails where told to and answers
//! queries from a responder closure.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sql_adapter::prelude::*;

type Responder = Box<dyn Fn(&str, &[RowValues]) -> Option<ResultSet> + Send + Sync>;

struct Rule {
    pattern: String,
    remaining: usize,
    error: fn() -> SqlAdapterError,
}

#[derive(Default)]
struct Script {
    connect_failures: AtomicUsize,
    connect_error: Mutex<Option<fn() -> SqlAdapterError>>,
    connects: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    fail_rollback: AtomicBool,
    log: Mutex<Vec<String>>,
    applied: Mutex<Vec<String>>,
    rules: Mutex<Vec<Rule>>,
    responder: Mutex<Option<Responder>>,
}

impl Script {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }

    fn check(&self, sql: &str) -> Result<(), SqlAdapterError> {
        let mut rules = self.rules.lock().unwrap();
        for rule in rules.iter_mut() {
            if rule.remaining > 0 && sql.contains(&rule.pattern) {
                rule.remaining -= 1;
                return Err((rule.error)());
            }
        }
        Ok(())
    }

    fn exec(&self, prefix: &str, sql: &str) -> Result<u64, SqlAdapterError> {
        self.record(format!("{prefix}{sql}"));
        self.check(sql)?;
        Ok(1)
    }

    fn query(&self, prefix: &str, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        self.record(format!("{prefix}{sql}"));
        self.check(sql)?;
        let responder = self.responder.lock().unwrap();
        Ok(responder
            .as_ref()
            .and_then(|respond| respond(sql, args))
            .unwrap_or_default())
    }
}

/// Handle used by tests to script the backend and inspect what reached it.
#[derive(Clone, Default)]
pub struct FakeBackend {
    script: Arc<Script>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(FakeConnector {
            script: Arc::clone(&self.script),
        })
    }

    /// Fail the next `times` connection attempts with `error`.
    pub fn fail_connects(self, times: usize, error: fn() -> SqlAdapterError) -> Self {
        self.script.connect_failures.store(times, Ordering::SeqCst);
        *self.script.connect_error.lock().unwrap() = Some(error);
        self
    }

    /// Fail the next `times` statements containing `pattern`. `PING` matches pings.
    pub fn fail_on(self, pattern: &str, times: usize, error: fn() -> SqlAdapterError) -> Self {
        self.script.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            remaining: times,
            error,
        });
        self
    }

    pub fn fail_rollback(self) -> Self {
        self.script.fail_rollback.store(true, Ordering::SeqCst);
        self
    }

    pub fn respond<F>(self, responder: F) -> Self
    where
        F: Fn(&str, &[RowValues]) -> Option<ResultSet> + Send + Sync + 'static,
    {
        *self.script.responder.lock().unwrap() = Some(Box::new(responder));
        self
    }

    pub fn log(&self) -> Vec<String> {
        self.script.log.lock().unwrap().clone()
    }

    /// Writes that took effect: autocommitted ones plus those of committed transactions.
    pub fn applied(&self) -> Vec<String> {
        self.script.applied.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.log().iter().filter(|entry| entry.contains(pattern)).count()
    }

    pub fn connects(&self) -> usize {
        self.script.connects.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.script.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.script.rollbacks.load(Ordering::SeqCst)
    }
}

struct FakeConnector {
    script: Arc<Script>,
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(
        &self,
        _settings: &ConnectionSettings,
    ) -> Result<Arc<dyn NativeConnection>, SqlAdapterError> {
        self.script.connects.fetch_add(1, Ordering::SeqCst);
        let remaining = self.script.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.script
                .connect_failures
                .store(remaining - 1, Ordering::SeqCst);
            let scripted = *self.script.connect_error.lock().unwrap();
            let error = scripted
                .unwrap_or(|| SqlAdapterError::ConnectionError("connection refused".into()));
            return Err(error());
        }
        Ok(Arc::new(FakeConnection {
            script: Arc::clone(&self.script),
        }))
    }
}

struct FakeConnection {
    script: Arc<Script>,
}

#[async_trait]
impl Executor for FakeConnection {
    async fn exec(&self, sql: &str, _args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        let affected = self.script.exec("", sql)?;
        self.script.applied.lock().unwrap().push(sql.to_string());
        Ok(affected)
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        self.script.query("", sql, args)
    }
}

#[async_trait]
impl NativeConnection for FakeConnection {
    async fn ping(&self) -> Result<(), SqlAdapterError> {
        self.script.exec("", "PING").map(|_| ())
    }

    async fn begin(&self) -> Result<Arc<dyn NativeTx>, SqlAdapterError> {
        self.script.exec("", "BEGIN")?;
        Ok(Arc::new(FakeTx {
            script: Arc::clone(&self.script),
            done: AtomicBool::new(false),
            pending: Mutex::new(Vec::new()),
        }))
    }

    async fn close(&self) -> Result<(), SqlAdapterError> {
        self.script.record("CLOSE".to_string());
        Ok(())
    }
}

/// Statements issued inside a transaction are logged with a `[tx] ` prefix. Its writes stay
/// pending until commit.
struct FakeTx {
    script: Arc<Script>,
    done: AtomicBool,
    pending: Mutex<Vec<String>>,
}

impl FakeTx {
    fn finish(&self) -> Result<(), SqlAdapterError> {
        if self.done.swap(true, Ordering::SeqCst) {
            return Err(SqlAdapterError::TxDone);
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for FakeTx {
    async fn exec(&self, sql: &str, _args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        let affected = self.script.exec("[tx] ", sql)?;
        self.pending.lock().unwrap().push(sql.to_string());
        Ok(affected)
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        self.script.query("[tx] ", sql, args)
    }
}

#[async_trait]
impl NativeTx for FakeTx {
    async fn commit(&self) -> Result<(), SqlAdapterError> {
        self.finish()?;
        self.script.record("COMMIT".to_string());
        let writes = std::mem::take(&mut *self.pending.lock().unwrap());
        self.script.applied.lock().unwrap().extend(writes);
        self.script.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<(), SqlAdapterError> {
        self.finish()?;
        self.script.record("ROLLBACK".to_string());
        self.pending.lock().unwrap().clear();
        self.script.rollbacks.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_rollback.load(Ordering::SeqCst) {
            return Err(SqlAdapterError::ExecutionError("rollback refused".into()));
        }
        Ok(())
    }
}

/// Settings with a fast retry schedule.
pub fn settings(max_attempts: usize) -> ConnectionSettings {
    ConnectionSettings::new("fake.internal", "app").with_retry(
        RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_backoff(Duration::from_millis(1), Duration::from_millis(4)),
    )
}

pub fn rows(columns: &[&str], rows: Vec<Vec<RowValues>>) -> ResultSet {
    ResultSet::from_rows(columns.iter().map(|c| (*c).to_string()).collect(), rows)
}

pub async fn postgres_session(backend: &FakeBackend) -> Session {
    Session::connect(
        Arc::new(PostgresDialect::new()),
        backend.connector(),
        settings(3),
    )
    .await
    .unwrap()
}

pub async fn mssql_session(backend: &FakeBackend) -> Session {
    Session::connect(Arc::new(MssqlDialect::new()), backend.connector(), settings(3))
        .await
        .unwrap()
}
