//! A dialect-neutral SQL fragment compiler with an async session and collection layer for
//! PostgreSQL and SQL Server.
//!
//! Statements are assembled as fragment trees (or through the builders in [`builder`]),
//! compiled against a dialect [`fragment::Template`] whose output is memoized per fragment,
//! and executed through an [`adapter::Session`] that owns connection retry, transactions and
//! error translation. Backends plug in through [`adapter::Dialect`] and
//! [`adapter::Connector`].
//!
//! ```rust
//! use sql_adapter::fragment::Fragment;
//! use sql_adapter::prelude::*;
//!
//! let dialect = sql_adapter::dialect_for(DatabaseType::Postgres);
//! let query = SelectBuilder::new("accounts")
//!     .filter(Cond::eq("owner", "ada"))
//!     .limit(1)
//!     .build()
//!     .unwrap();
//! let sql = query.statement.compile(dialect.template()).unwrap();
//! assert_eq!(
//!     dialect.rewrite_placeholders(&sql),
//!     r#"SELECT * FROM "accounts" WHERE "owner" = $1 LIMIT 1"#
//! );
//! ```

use std::sync::Arc;

pub mod adapter;
pub mod builder;
pub mod config;
pub mod error;
pub mod fragment;
pub mod mssql;
pub mod postgres;
pub mod prelude;
pub mod results;
pub mod translation;
pub mod types;

pub use adapter::{Collection, Context, Dialect, Session, Tx};
pub use config::{ConnectionSettings, RetryPolicy};
pub use error::{CompileError, SqlAdapterError};
pub use results::{ResultSet, Row};
pub use types::{DatabaseType, RowValues};

/// The bundled dialect for `db_type`, sharing its process-wide template cache.
#[must_use]
pub fn dialect_for(db_type: DatabaseType) -> Arc<dyn Dialect> {
    match db_type {
        DatabaseType::Postgres => Arc::new(postgres::PostgresDialect::new()),
        DatabaseType::Mssql => Arc::new(mssql::MssqlDialect::new()),
    }
}
