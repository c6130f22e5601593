use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use super::{
    Collection, Connector, Context, Dialect, NativeConnection, NativeTx, RawQuery, Target,
    wait_for_connection,
};
use crate::builder::Query;
use crate::config::ConnectionSettings;
use crate::error::SqlAdapterError;
use crate::fragment::Fragment;
use crate::results::{ResultSet, Row};
use crate::translation::count_placeholders;
use crate::types::RowValues;

/// A database session: settings, a lazily established native handle and, optionally, a
/// bound transaction.
///
/// Each session owns its connection guard. Clones made with [`Session::new_clone`] start from
/// the same handle but reconnect independently.
pub struct Session {
    dialect: Arc<dyn Dialect>,
    connector: Arc<dyn Connector>,
    settings: Option<Arc<ConnectionSettings>>,
    context: Context,
    conn: Mutex<Option<Arc<dyn NativeConnection>>>,
    pub(super) tx: Option<Arc<dyn NativeTx>>,
    name: OnceCell<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("database_type", &self.dialect.database_type())
            .field("settings", &self.settings)
            .field("in_tx", &self.tx.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session that is not connected yet; call [`Session::open`] before issuing statements.
    #[must_use]
    pub fn new(dialect: Arc<dyn Dialect>, connector: Arc<dyn Connector>) -> Self {
        Self {
            dialect,
            connector,
            settings: None,
            context: Context::background(),
            conn: Mutex::new(None),
            tx: None,
            name: OnceCell::new(),
        }
    }

    /// Create a session and open it in one step.
    ///
    /// # Errors
    /// Same as [`Session::open`].
    pub async fn connect(
        dialect: Arc<dyn Dialect>,
        connector: Arc<dyn Connector>,
        settings: ConnectionSettings,
    ) -> Result<Self, SqlAdapterError> {
        let mut session = Self::new(dialect, connector);
        session.open(settings).await?;
        Ok(session)
    }

    /// Validate and store `settings`, then connect through the retry loop.
    ///
    /// # Errors
    /// `ConfigError` for invalid settings, otherwise whatever [`wait_for_connection`] returns.
    pub async fn open(&mut self, settings: ConnectionSettings) -> Result<(), SqlAdapterError> {
        settings.validate()?;
        debug!(
            host = %settings.host,
            database = %settings.database,
            "opening session"
        );
        self.settings = Some(Arc::new(settings));
        *self.conn.get_mut() = None;
        self.establish(false).await.map(|_| ())
    }

    #[must_use]
    pub fn dialect(&self) -> &Arc<dyn Dialect> {
        &self.dialect
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn settings(&self) -> Option<&ConnectionSettings> {
        self.settings.as_deref()
    }

    #[must_use]
    pub fn in_tx(&self) -> bool {
        self.tx.is_some()
    }

    fn required_settings(&self) -> Result<Arc<ConnectionSettings>, SqlAdapterError> {
        self.settings
            .clone()
            .ok_or_else(|| SqlAdapterError::ConfigError("session is not open".to_string()))
    }

    fn translate(&self, err: SqlAdapterError) -> SqlAdapterError {
        self.dialect.translate_error(err)
    }

    /// Return the stored handle, connecting first if there is none. With `verify`, an existing
    /// handle is pinged and replaced when the ping fails.
    ///
    /// The guard is held for the whole attempt, so concurrent callers wait for one
    /// connection instead of racing to open several.
    pub(super) async fn establish(
        &self,
        verify: bool,
    ) -> Result<Arc<dyn NativeConnection>, SqlAdapterError> {
        let mut guard = self.conn.lock().await;

        if let Some(conn) = guard.as_ref() {
            if !verify {
                return Ok(Arc::clone(conn));
            }
            match self.context.run(conn.ping()).await {
                Ok(()) => return Ok(Arc::clone(conn)),
                Err(err @ (SqlAdapterError::Cancelled | SqlAdapterError::DeadlineExceeded)) => {
                    return Err(err);
                }
                Err(err) => {
                    debug!(error = %self.translate(err), "ping failed, reconnecting");
                    *guard = None;
                }
            }
        }

        let settings = self.required_settings()?;
        let connector = &self.connector;
        let conn = wait_for_connection(
            &self.context,
            &settings.retry,
            |err| self.translate(err),
            || connector.connect(&settings),
        )
        .await?;
        *guard = Some(Arc::clone(&conn));
        Ok(conn)
    }

    /// The current native handle, connecting if needed.
    ///
    /// # Errors
    /// See [`Session::open`].
    pub async fn connection(&self) -> Result<Arc<dyn NativeConnection>, SqlAdapterError> {
        self.establish(false).await
    }

    /// Check the connection, reconnecting through the retry loop if it is gone.
    ///
    /// # Errors
    /// `Connectivity` when no working connection could be obtained.
    pub async fn ping(&self) -> Result<(), SqlAdapterError> {
        self.establish(true).await.map(|_| ())
    }

    /// Forget `stale` if it is still the stored handle.
    pub(super) async fn invalidate_connection(&self, stale: &Arc<dyn NativeConnection>) {
        let mut guard = self.conn.lock().await;
        if guard
            .as_ref()
            .is_some_and(|current| std::ptr::addr_eq(Arc::as_ptr(current), Arc::as_ptr(stale)))
        {
            *guard = None;
        }
    }

    /// Run `op` on the bound transaction, or on the connection with one reconnect on
    /// `ConnectionLost`.
    async fn dispatch<T, F, Fut>(&self, op: F) -> Result<T, SqlAdapterError>
    where
        F: Fn(Target) -> Fut,
        Fut: Future<Output = Result<T, SqlAdapterError>>,
    {
        if let Some(tx) = &self.tx {
            return self
                .context
                .run(op(Target::Transaction(Arc::clone(tx))))
                .await
                .map_err(|err| self.translate(err));
        }

        let conn = self.connection().await?;
        match self
            .context
            .run(op(Target::Connection(Arc::clone(&conn))))
            .await
            .map_err(|err| self.translate(err))
        {
            Err(err) if err.is_connection_lost() => {
                warn!(error = %err, "connection lost, reconnecting once");
                self.invalidate_connection(&conn).await;
                let conn = self.connection().await?;
                self.context
                    .run(op(Target::Connection(conn)))
                    .await
                    .map_err(|err| self.translate(err))
            }
            other => other,
        }
    }

    /// Final SQL and converted arguments for `query`, as they would be sent to the driver.
    ///
    /// # Errors
    /// `Compile` for a malformed statement, `ParameterError` when the argument count does not
    /// match the statement's placeholders.
    pub fn compile(&self, query: &Query) -> Result<(String, Vec<RowValues>), SqlAdapterError> {
        let sql = query.statement.compile(self.dialect.template())?;
        self.prepare(&sql, query.args.clone())
    }

    fn prepare(
        &self,
        sql: &str,
        args: Vec<RowValues>,
    ) -> Result<(String, Vec<RowValues>), SqlAdapterError> {
        let expected = count_placeholders(sql, self.dialect.placeholder_style());
        if expected != args.len() {
            return Err(SqlAdapterError::ParameterError(format!(
                "statement has {expected} placeholder(s) but {} argument(s) were supplied",
                args.len()
            )));
        }
        let sql = self.dialect.rewrite_placeholders(sql).into_owned();
        Ok((sql, self.dialect.convert_values(args)))
    }

    async fn exec_prepared(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        debug!(sql, args = args.len(), in_tx = self.in_tx(), "exec");
        self.dispatch(|target| async move { target.exec(sql, args).await })
            .await
    }

    async fn query_prepared(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<ResultSet, SqlAdapterError> {
        debug!(sql, args = args.len(), in_tx = self.in_tx(), "query");
        self.dispatch(|target| async move { target.query(sql, args).await })
            .await
    }

    /// Execute a built statement and return the affected-row count.
    ///
    /// # Errors
    /// Compile, parameter, connectivity or execution errors, translated by the dialect.
    pub async fn exec(&self, query: &Query) -> Result<u64, SqlAdapterError> {
        let (sql, args) = self.compile(query)?;
        self.exec_prepared(&sql, &args).await
    }

    /// Run a built statement and collect its rows.
    ///
    /// # Errors
    /// As [`Session::exec`].
    pub async fn query(&self, query: &Query) -> Result<ResultSet, SqlAdapterError> {
        let (sql, args) = self.compile(query)?;
        self.query_prepared(&sql, &args).await
    }

    /// # Errors
    /// `NoMoreRows` when the statement returns nothing, otherwise as [`Session::query`].
    pub async fn query_row(&self, query: &Query) -> Result<Row, SqlAdapterError> {
        self.query(query)
            .await?
            .into_rows()
            .into_iter()
            .next()
            .ok_or(SqlAdapterError::NoMoreRows)
    }

    /// Execute raw SQL written with neutral `?` markers.
    ///
    /// # Errors
    /// As [`Session::exec`].
    pub async fn exec_raw(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        let (sql, args) = self.prepare(sql, args.to_vec())?;
        self.exec_prepared(&sql, &args).await
    }

    /// Run raw SQL written with neutral `?` markers.
    ///
    /// # Errors
    /// As [`Session::query`].
    pub async fn query_raw(
        &self,
        sql: &str,
        args: &[RowValues],
    ) -> Result<ResultSet, SqlAdapterError> {
        let (sql, args) = self.prepare(sql, args.to_vec())?;
        self.query_prepared(&sql, &args).await
    }

    pub(super) async fn query_raw_query(
        &self,
        raw: &RawQuery,
    ) -> Result<ResultSet, SqlAdapterError> {
        self.query_raw(&raw.sql, &raw.args).await
    }

    /// A session sharing this one's settings and current handle, under `ctx`, with no
    /// transaction. With `check_connection` the handle is pinged (and replaced if dead) first.
    ///
    /// # Errors
    /// `Connectivity` when `check_connection` is set and no connection could be made.
    pub async fn new_clone(
        &self,
        ctx: Context,
        check_connection: bool,
    ) -> Result<Session, SqlAdapterError> {
        let clone = self.with_context(ctx).await;
        if check_connection {
            clone.establish(true).await?;
        }
        Ok(clone)
    }

    /// Non-checking clone under `ctx`.
    pub async fn with_context(&self, ctx: Context) -> Session {
        let current = self.conn.lock().await.clone();
        Session {
            dialect: Arc::clone(&self.dialect),
            connector: Arc::clone(&self.connector),
            settings: self.settings.clone(),
            context: ctx,
            conn: Mutex::new(current),
            tx: None,
            name: OnceCell::new_with(self.name.get().cloned()),
        }
    }

    /// Route every following statement through `native`.
    ///
    /// # Errors
    /// `TxAlreadyBound` if a transaction is already bound.
    pub fn bind_tx(&mut self, ctx: Context, native: Arc<dyn NativeTx>) -> Result<(), SqlAdapterError> {
        if self.tx.is_some() {
            return Err(SqlAdapterError::TxAlreadyBound);
        }
        self.context = ctx;
        self.tx = Some(native);
        Ok(())
    }

    #[must_use]
    pub fn collection(&self, name: impl Into<String>) -> Collection<'_> {
        Collection::new(self, name.into())
    }

    /// Names of the user tables in the current database.
    ///
    /// # Errors
    /// Connectivity or execution errors.
    pub async fn collections(&self) -> Result<Vec<String>, SqlAdapterError> {
        let database = self.lookup_name().await?;
        let rows = self
            .query_raw_query(&self.dialect.collections_query(&database))
            .await?;
        text_column(&rows, "name")
    }

    /// # Errors
    /// `CollectionDoesNotExist` when the table is not there.
    pub async fn table_exists(&self, table: &str) -> Result<(), SqlAdapterError> {
        let database = self.lookup_name().await?;
        let rows = self
            .query_raw_query(&self.dialect.table_exists_query(&database, table))
            .await?;
        if rows.is_empty() {
            return Err(SqlAdapterError::CollectionDoesNotExist(table.to_string()));
        }
        Ok(())
    }

    /// The current database name, fetched once per session.
    ///
    /// # Errors
    /// Connectivity or execution errors, `SchemaError` when the server returns no name.
    pub async fn lookup_name(&self) -> Result<String, SqlAdapterError> {
        self.name
            .get_or_try_init(|| async {
                let rows = self
                    .query_raw_query(&self.dialect.lookup_name_query())
                    .await?;
                text_column(&rows, "name")?.into_iter().next().ok_or_else(|| {
                    SqlAdapterError::SchemaError("server returned no database name".to_string())
                })
            })
            .await
            .cloned()
    }

    /// Primary-key columns of `table` in key order; empty when the table has none.
    ///
    /// # Errors
    /// Compile, connectivity or execution errors.
    pub async fn primary_keys(&self, table: &str) -> Result<Vec<String>, SqlAdapterError> {
        let raw = self.dialect.primary_keys_query(table)?;
        let rows = self.query_raw_query(&raw).await?;
        text_column(&rows, "pkey")
    }

    /// Drop this session's handle, closing it. Clones holding the same handle keep theirs.
    ///
    /// # Errors
    /// Whatever the driver reports while closing.
    pub async fn close(&self) -> Result<(), SqlAdapterError> {
        let conn = self.conn.lock().await.take();
        match conn {
            Some(conn) => {
                debug!("closing session connection");
                conn.close().await.map_err(|err| self.translate(err))
            }
            None => Ok(()),
        }
    }
}

fn text_column(rows: &ResultSet, column: &str) -> Result<Vec<String>, SqlAdapterError> {
    rows.iter()
        .map(|row| {
            row.get(column)
                .and_then(RowValues::as_text)
                .map(str::to_string)
                .ok_or_else(|| {
                    SqlAdapterError::SchemaError(format!("expected a text `{column}` column"))
                })
        })
        .collect()
}
