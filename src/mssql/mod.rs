//! SQL Server dialect, plus the tiberius gateway behind the `mssql` feature.

mod dialect;
mod template;

#[cfg(feature = "mssql")]
mod client;
#[cfg(feature = "mssql")]
mod query;

#[cfg(feature = "mssql")]
pub use client::MssqlConnector;
pub use dialect::MssqlDialect;
pub use template::{build_template, template};
