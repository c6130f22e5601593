use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config as PgConfig, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod,
    Runtime,
};
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio_postgres::NoTls;
use tokio_postgres::error::SqlState;
use tracing::{debug, warn};

use super::params::as_refs;
use super::query::build_result_set;
use crate::adapter::{Connector, Executor, NativeConnection, NativeTx};
use crate::config::ConnectionSettings;
use crate::error::SqlAdapterError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Connects to PostgreSQL through a deadpool-postgres pool built from the session settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn pool_config(settings: &ConnectionSettings) -> PgConfig {
    let mut cfg = PgConfig::new();
    cfg.host = Some(settings.host.clone());
    cfg.port = Some(settings.port.unwrap_or(5432));
    cfg.dbname = Some(settings.database.clone());
    cfg.user.clone_from(&settings.user);
    cfg.password.clone_from(&settings.password);
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    if let Some(size) = settings.pool_max_size {
        cfg.pool = Some(PoolConfig::new(size));
    }
    for (key, value) in &settings.options {
        match key.as_str() {
            "application_name" => cfg.application_name = Some(value.clone()),
            "options" => cfg.options = Some(value.clone()),
            "connect_timeout" => match value.parse::<u64>() {
                Ok(secs) => cfg.connect_timeout = Some(Duration::from_secs(secs)),
                Err(_) => warn!(value = %value, "ignoring non-numeric connect_timeout"),
            },
            other => warn!(option = other, "ignoring unsupported postgres option"),
        }
    }
    cfg
}

fn pg_error(err: tokio_postgres::Error) -> SqlAdapterError {
    if err.is_closed() {
        SqlAdapterError::ConnectionLost(err.to_string())
    } else {
        SqlAdapterError::PostgresError(err)
    }
}

/// Classify a failure to open a connection: server-side refusals are final unless the server
/// is merely full or still starting.
fn connect_error(err: &tokio_postgres::Error) -> SqlAdapterError {
    let message = format!("postgres connect error: {err}");
    match err.code() {
        Some(code) if *code == SqlState::TOO_MANY_CONNECTIONS => {
            SqlAdapterError::ResourceExhausted(message)
        }
        Some(code) if *code == SqlState::CANNOT_CONNECT_NOW => {
            SqlAdapterError::ConnectionError(message)
        }
        Some(_) => SqlAdapterError::ConfigError(message),
        None => SqlAdapterError::ConnectionError(message),
    }
}

fn checkout_error(err: PoolError, establishing: bool) -> SqlAdapterError {
    match err {
        PoolError::Backend(e) if establishing => connect_error(&e),
        PoolError::Backend(e) if e.code().is_some() => connect_error(&e),
        PoolError::Backend(e) => SqlAdapterError::ConnectionLost(e.to_string()),
        PoolError::Closed => SqlAdapterError::ConnectionLost("postgres pool is closed".into()),
        PoolError::Timeout(_) => {
            SqlAdapterError::ResourceExhausted(format!("postgres pool checkout timed out: {err}"))
        }
        other => SqlAdapterError::ConnectionError(format!("postgres pool error: {other}")),
    }
}

#[async_trait]
impl Connector for PostgresConnector {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn NativeConnection>, SqlAdapterError> {
        let pool = pool_config(settings)
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                SqlAdapterError::ConfigError(format!("Failed to create Postgres pool: {e}"))
            })?;
        // The pool is lazy; one checkout proves the server accepts us.
        let client = pool.get().await.map_err(|e| checkout_error(e, true))?;
        drop(client);
        debug!(host = %settings.host, database = %settings.database, "postgres pool ready");
        Ok(Arc::new(PostgresConnection { pool }))
    }
}

struct PostgresConnection {
    pool: Pool,
}

impl PostgresConnection {
    async fn checkout(&self) -> Result<Object, SqlAdapterError> {
        self.pool.get().await.map_err(|e| checkout_error(e, false))
    }
}

async fn exec_on(client: &Object, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
    let stmt = client.prepare_cached(sql).await.map_err(pg_error)?;
    client.execute(&stmt, &as_refs(args)).await.map_err(pg_error)
}

async fn query_on(
    client: &Object,
    sql: &str,
    args: &[RowValues],
) -> Result<ResultSet, SqlAdapterError> {
    let stmt = client.prepare_cached(sql).await.map_err(pg_error)?;
    let rows = client.query(&stmt, &as_refs(args)).await.map_err(pg_error)?;
    build_result_set(stmt.columns(), &rows)
}

#[async_trait]
impl Executor for PostgresConnection {
    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        let client = self.checkout().await?;
        exec_on(&client, sql, args).await
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        let client = self.checkout().await?;
        query_on(&client, sql, args).await
    }
}

#[async_trait]
impl NativeConnection for PostgresConnection {
    async fn ping(&self) -> Result<(), SqlAdapterError> {
        let client = self.checkout().await?;
        client.simple_query("SELECT 1").await.map_err(pg_error)?;
        Ok(())
    }

    async fn begin(&self) -> Result<Arc<dyn NativeTx>, SqlAdapterError> {
        let client = self.checkout().await?;
        client.batch_execute("BEGIN").await.map_err(pg_error)?;
        Ok(Arc::new(PostgresTx {
            client: Mutex::new(Some(client)),
        }))
    }

    async fn close(&self) -> Result<(), SqlAdapterError> {
        self.pool.close();
        Ok(())
    }
}

/// A transaction pinned to one pooled connection until it finishes.
struct PostgresTx {
    client: Mutex<Option<Object>>,
}

impl PostgresTx {
    async fn finish(&self, sql: &str) -> Result<(), SqlAdapterError> {
        let client = self
            .client
            .lock()
            .await
            .take()
            .ok_or(SqlAdapterError::TxDone)?;
        if let Err(err) = client.batch_execute(sql).await {
            // Best-effort rollback so the connection goes back to the pool clean.
            let _ = client.batch_execute("ROLLBACK").await;
            return Err(pg_error(err));
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for PostgresTx {
    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(SqlAdapterError::TxDone)?;
        exec_on(client, sql, args).await
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        let guard = self.client.lock().await;
        let client = guard.as_ref().ok_or(SqlAdapterError::TxDone)?;
        query_on(client, sql, args).await
    }
}

#[async_trait]
impl NativeTx for PostgresTx {
    async fn commit(&self) -> Result<(), SqlAdapterError> {
        self.finish("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), SqlAdapterError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PostgresTx {
    fn drop(&mut self) {
        if let Some(client) = self.client.get_mut().take()
            && let Ok(handle) = Handle::try_current()
        {
            warn!("postgres transaction dropped unfinished, rolling back");
            handle.spawn(async move {
                let _ = client.batch_execute("ROLLBACK").await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_map_onto_pool_config() {
        let settings = ConnectionSettings::new("db.internal", "app")
            .with_credentials("svc", "pw")
            .with_pool_max_size(4)
            .with_option("application_name", "worker")
            .with_option("connect_timeout", "3");
        let cfg = pool_config(&settings);
        assert_eq!(cfg.host.as_deref(), Some("db.internal"));
        assert_eq!(cfg.port, Some(5432));
        assert_eq!(cfg.dbname.as_deref(), Some("app"));
        assert_eq!(cfg.application_name.as_deref(), Some("worker"));
        assert_eq!(cfg.connect_timeout, Some(Duration::from_secs(3)));
        assert_eq!(cfg.pool.map(|p| p.max_size), Some(4));
    }
}
