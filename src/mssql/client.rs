use std::sync::Arc;

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, SqlBrowser};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

use super::query::{bind_query_params, build_result_set, mssql_error};
use crate::adapter::{Connector, Executor, NativeConnection, NativeTx};
use crate::config::ConnectionSettings;
use crate::error::SqlAdapterError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// Type alias for SQL Server client
pub(crate) type MssqlClient = Client<Compat<TcpStream>>;

/// Opens tiberius clients from the session settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlConnector;

impl MssqlConnector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn client_config(settings: &ConnectionSettings) -> Result<Config, SqlAdapterError> {
    let mut config = Config::new();
    config.host(&settings.host);
    config.database(&settings.database);
    config.port(settings.port.unwrap_or(1433));
    if let (Some(user), Some(password)) = (&settings.user, &settings.password) {
        config.authentication(AuthMethod::sql_server(user, password));
    }
    if let Some(instance) = &settings.instance_name {
        config.instance_name(instance);
    }

    let mut trust_cert = true;
    for (key, value) in &settings.options {
        match key.as_str() {
            "application_name" => config.application_name(value),
            "trust_cert" => trust_cert = value != "false",
            "encrypt" => config.encryption(match value.as_str() {
                "off" => EncryptionLevel::Off,
                "on" => EncryptionLevel::On,
                "required" => EncryptionLevel::Required,
                "not_supported" => EncryptionLevel::NotSupported,
                other => {
                    return Err(SqlAdapterError::ConfigError(format!(
                        "unknown encrypt level {other:?}"
                    )));
                }
            }),
            other => warn!(option = other, "ignoring unsupported mssql option"),
        }
    }
    if trust_cert {
        config.trust_cert();
    }
    Ok(config)
}

/// Helper function to create a new MSSQL connection
///
/// # Errors
/// Returns `SqlAdapterError::ConnectionError` if the MSSQL connection fails.
async fn create_mssql_client(settings: &ConnectionSettings) -> Result<MssqlClient, SqlAdapterError> {
    let config = client_config(settings)?;

    let tcp = if settings.instance_name.is_some() {
        TcpStream::connect_named(&config).await
    } else {
        TcpStream::connect(config.get_addr())
            .await
            .map_err(tiberius::error::Error::from)
    }
    .map_err(|e| SqlAdapterError::ConnectionError(format!("TCP connection error: {e}")))?;
    tcp.set_nodelay(true)
        .map_err(|e| SqlAdapterError::ConnectionError(format!("TCP connection error: {e}")))?;

    Client::connect(config, tcp.compat_write())
        .await
        .map_err(|e| SqlAdapterError::ConnectionError(format!("SQL Server connection error: {e}")))
}

#[async_trait]
impl Connector for MssqlConnector {
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn NativeConnection>, SqlAdapterError> {
        let client = create_mssql_client(settings).await?;
        debug!(host = %settings.host, database = %settings.database, "mssql client ready");
        Ok(Arc::new(MssqlConnection {
            settings: settings.clone(),
            client: Mutex::new(Some(client)),
        }))
    }
}

/// One tiberius client shared by the session; a broken socket drops it.
struct MssqlConnection {
    settings: ConnectionSettings,
    client: Mutex<Option<MssqlClient>>,
}

fn closed() -> SqlAdapterError {
    SqlAdapterError::ConnectionLost("mssql client is closed".into())
}

/// Drop the client from `slot` once its socket is gone so later calls report the loss.
fn settle<T>(
    slot: &mut Option<MssqlClient>,
    result: Result<T, SqlAdapterError>,
) -> Result<T, SqlAdapterError> {
    if matches!(result, Err(SqlAdapterError::ConnectionLost(_))) {
        *slot = None;
    }
    result
}

async fn exec_on(client: &mut MssqlClient, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
    let result = bind_query_params(sql, args)
        .execute(client)
        .await
        .map_err(mssql_error)?;
    Ok(result.rows_affected().iter().sum())
}

#[async_trait]
impl Executor for MssqlConnection {
    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or_else(closed)?;
        let result = exec_on(client, sql, args).await;
        settle(&mut guard, result)
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or_else(closed)?;
        let result = build_result_set(client, sql, args).await;
        settle(&mut guard, result)
    }
}

#[async_trait]
impl NativeConnection for MssqlConnection {
    async fn ping(&self) -> Result<(), SqlAdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or_else(closed)?;
        let result = client
            .execute("SELECT 1", &[])
            .await
            .map(|_| ())
            .map_err(mssql_error);
        settle(&mut guard, result)
    }

    /// Transactions get their own client so the shared one stays usable by other sessions.
    async fn begin(&self) -> Result<Arc<dyn NativeTx>, SqlAdapterError> {
        let mut client = create_mssql_client(&self.settings).await?;
        client
            .simple_query("BEGIN TRANSACTION")
            .await
            .map_err(mssql_error)?
            .into_results()
            .await
            .map_err(mssql_error)?;
        Ok(Arc::new(MssqlTx {
            client: Mutex::new(Some(client)),
        }))
    }

    async fn close(&self) -> Result<(), SqlAdapterError> {
        if let Some(client) = self.client.lock().await.take() {
            client.close().await.map_err(mssql_error)?;
        }
        Ok(())
    }
}

/// A transaction on a dedicated client. Dropping it unfinished closes the socket, which the
/// server treats as a rollback.
struct MssqlTx {
    client: Mutex<Option<MssqlClient>>,
}

impl MssqlTx {
    async fn finish(&self, sql: &'static str) -> Result<(), SqlAdapterError> {
        let mut client = self
            .client
            .lock()
            .await
            .take()
            .ok_or(SqlAdapterError::TxDone)?;
        let outcome = match client.simple_query(sql).await {
            Ok(stream) => stream.into_results().await.map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            return Err(mssql_error(err));
        }
        if let Err(err) = client.close().await {
            debug!(error = %err, "closing finished mssql transaction client failed");
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for MssqlTx {
    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(SqlAdapterError::TxDone)?;
        let result = exec_on(client, sql, args).await;
        settle(&mut guard, result)
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        let mut guard = self.client.lock().await;
        let client = guard.as_mut().ok_or(SqlAdapterError::TxDone)?;
        let result = build_result_set(client, sql, args).await;
        settle(&mut guard, result)
    }
}

#[async_trait]
impl NativeTx for MssqlTx {
    async fn commit(&self) -> Result<(), SqlAdapterError> {
        self.finish("COMMIT TRANSACTION").await
    }

    async fn rollback(&self) -> Result<(), SqlAdapterError> {
        self.finish("ROLLBACK TRANSACTION").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_encrypt_level_is_rejected() {
        let settings = ConnectionSettings::new("sql.internal", "app").with_option("encrypt", "maybe");
        assert!(matches!(
            client_config(&settings),
            Err(SqlAdapterError::ConfigError(_))
        ));
    }

    #[test]
    fn default_port_is_1433() {
        let settings = ConnectionSettings::new("sql.internal", "app");
        let config = client_config(&settings).unwrap();
        assert_eq!(config.get_addr(), "sql.internal:1433");
    }
}
