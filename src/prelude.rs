//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::adapter::{
    Collection, Connector, Context, Dialect, ErrorTranslator, Executor, Finder, InsertCapabilities,
    InsertedKey, NativeConnection, NativeTx, PlaceholderRewriter, RawQuery, SchemaIntrospection,
    Session, TemplateProvider, Tx, ValueConverter,
};
pub use crate::builder::{Cond, DeleteBuilder, InsertBuilder, Query, Record, SelectBuilder, UpdateBuilder};
pub use crate::config::{ConnectionSettings, RetryPolicy};
pub use crate::error::{CompileError, SqlAdapterError};
pub use crate::fragment::{CachePolicy, Template};
pub use crate::mssql::MssqlDialect;
pub use crate::postgres::PostgresDialect;
pub use crate::results::{ResultSet, Row};
pub use crate::translation::PlaceholderStyle;
pub use crate::types::{DatabaseType, RowValues};
pub use crate::dialect_for;

#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlConnector;
#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresConnector;
