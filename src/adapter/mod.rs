//! Shared adapter base: sessions, transactions and collections on top of a native gateway.
//!
//! A backend plugs in through two seams. A [`Dialect`] supplies SQL shape (templates,
//! placeholder style, value conversion, error translation, introspection queries), and a
//! [`Connector`] supplies live connections that implement the narrow [`Executor`] contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ConnectionSettings;
use crate::error::SqlAdapterError;
use crate::results::ResultSet;
use crate::types::RowValues;

mod collection;
mod context;
mod dialect;
mod retry;
mod session;
mod tx;

pub use collection::{Collection, Finder, InsertedKey};
pub use context::Context;
pub(crate) use dialect::{is_raw_backend_error, message_matches};
pub use dialect::{
    Dialect, ErrorTranslator, InsertCapabilities, PlaceholderRewriter, RawQuery,
    SchemaIntrospection, TemplateProvider, ValueConverter,
};
pub use retry::wait_for_connection;
pub use session::Session;
pub use tx::Tx;

/// Statement execution against a native handle. SQL arrives with dialect placeholders and
/// converted arguments.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement and return the affected-row count.
    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError>;

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError>;
}

#[async_trait]
pub trait NativeConnection: Executor {
    async fn ping(&self) -> Result<(), SqlAdapterError>;

    async fn begin(&self) -> Result<Arc<dyn NativeTx>, SqlAdapterError>;

    async fn close(&self) -> Result<(), SqlAdapterError>;
}

/// A native transaction. After `commit` or `rollback` every further call fails with `TxDone`.
#[async_trait]
pub trait NativeTx: Executor {
    async fn commit(&self) -> Result<(), SqlAdapterError>;

    async fn rollback(&self) -> Result<(), SqlAdapterError>;
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Make a single connection attempt; retrying is the caller's job.
    async fn connect(
        &self,
        settings: &ConnectionSettings,
    ) -> Result<Arc<dyn NativeConnection>, SqlAdapterError>;
}

/// The handle a statement runs on: the session's connection or its bound transaction.
#[derive(Clone)]
pub(crate) enum Target {
    Connection(Arc<dyn NativeConnection>),
    Transaction(Arc<dyn NativeTx>),
}

impl Target {
    async fn exec(&self, sql: &str, args: &[RowValues]) -> Result<u64, SqlAdapterError> {
        match self {
            Target::Connection(conn) => conn.exec(sql, args).await,
            Target::Transaction(tx) => tx.exec(sql, args).await,
        }
    }

    async fn query(&self, sql: &str, args: &[RowValues]) -> Result<ResultSet, SqlAdapterError> {
        match self {
            Target::Connection(conn) => conn.query(sql, args).await,
            Target::Transaction(tx) => tx.query(sql, args).await,
        }
    }
}
