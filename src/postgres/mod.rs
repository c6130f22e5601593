//! PostgreSQL dialect, plus the tokio-postgres gateway behind the `postgres` feature.

mod dialect;
mod template;

#[cfg(feature = "postgres")]
mod client;
#[cfg(feature = "postgres")]
mod params;
#[cfg(feature = "postgres")]
mod query;

#[cfg(feature = "postgres")]
pub use client::PostgresConnector;
pub use dialect::PostgresDialect;
pub use template::{build_template, template};
