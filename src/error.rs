use thiserror::Error;

use crate::fragment::TemplateKey;

/// Failure while rendering a fragment tree into SQL text.
///
/// These indicate a malformed statement or an incomplete template set and are never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("template set has no layout for {0:?}")]
    MissingTemplate(TemplateKey),

    #[error("layout {key:?} references slot `{slot}` which the fragment does not provide")]
    UnknownSlot { key: TemplateKey, slot: String },

    #[error("malformed fragment: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum SqlAdapterError {
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A single connection attempt failed; retried by `wait_for_connection`.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// An established connection went away underneath a statement.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Gave up connecting after {attempts} attempt(s): {last}")]
    Connectivity {
        attempts: usize,
        last: Box<SqlAdapterError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Collection does not exist: {0}")]
    CollectionDoesNotExist(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("No more rows in this result set")]
    NoMoreRows,

    #[error("Transaction has already been committed or rolled back")]
    TxDone,

    #[error("Session is already bound to a transaction")]
    TxAlreadyBound,

    #[error("{source}; rollback also failed: {rollback}")]
    Rollback {
        source: Box<SqlAdapterError>,
        rollback: Box<SqlAdapterError>,
    },

    /// A statement failed and putting session state back (e.g. `IDENTITY_INSERT`) failed too.
    #[error("{source}; restoring session state also failed: {restore}")]
    Restore {
        source: Box<SqlAdapterError>,
        restore: Box<SqlAdapterError>,
    },

    #[error("Other database error: {0}")]
    Other(String),
}

impl SqlAdapterError {
    /// Whether a connection attempt that failed with this error is worth repeating.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_) | Self::ConnectionLost(_) | Self::ResourceExhausted(_)
        )
    }

    #[must_use]
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

impl From<serde_json::Error> for SqlAdapterError {
    fn from(err: serde_json::Error) -> Self {
        SqlAdapterError::ParameterError(format!("JSON conversion error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SqlAdapterError::ConnectionError("refused".into()).is_transient());
        assert!(SqlAdapterError::ResourceExhausted("too many clients".into()).is_transient());
        assert!(!SqlAdapterError::ExecutionError("syntax".into()).is_transient());
        assert!(!SqlAdapterError::Cancelled.is_transient());
    }

    #[test]
    fn rollback_error_mentions_both_failures() {
        let err = SqlAdapterError::Rollback {
            source: Box::new(SqlAdapterError::ExecutionError("duplicate key".into())),
            rollback: Box::new(SqlAdapterError::ConnectionLost("socket closed".into())),
        };
        let text = err.to_string();
        assert!(text.contains("duplicate key"));
        assert!(text.contains("socket closed"));
    }
}
