use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SqlAdapterError;

/// Backoff schedule used while waiting for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total connection attempts, including the first one.
    pub max_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Upper bound on the total time spent waiting; `None` means attempts alone decide.
    pub max_wait_ms: Option<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            max_wait_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Fail on the first error.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = u64::try_from(initial.as_millis()).unwrap_or(u64::MAX);
        self.max_backoff_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait_ms = max_wait.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Delay before attempt number `attempt + 1` (1-based `attempt`), doubling each time.
    #[must_use]
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = u32::try_from(attempt.saturating_sub(1)).unwrap_or(u32::MAX).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(1_u64 << shift);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    #[must_use]
    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

/// Everything needed to reach one database.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// SQL Server named instance.
    #[serde(default)]
    pub instance_name: Option<String>,
    /// Extra driver options, passed through verbatim.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub pool_max_size: Option<usize>,
}

impl ConnectionSettings {
    #[must_use]
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            database: database.into(),
            user: None,
            password: None,
            instance_name: None,
            options: BTreeMap::new(),
            retry: RetryPolicy::default(),
            pool_max_size: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_pool_max_size(mut self, size: usize) -> Self {
        self.pool_max_size = Some(size);
        self
    }

    /// Load settings from a JSON document.
    ///
    /// # Errors
    /// `ConfigError` if the document is not valid settings JSON or fails [`Self::validate`].
    pub fn from_json(json: &str) -> Result<Self, SqlAdapterError> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| SqlAdapterError::ConfigError(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// # Errors
    /// `ConfigError` naming the first missing field.
    pub fn validate(&self) -> Result<(), SqlAdapterError> {
        if self.host.trim().is_empty() {
            return Err(SqlAdapterError::ConfigError("host is required".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(SqlAdapterError::ConfigError(
                "database is required".to_string(),
            ));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(SqlAdapterError::ConfigError(
                "user is required when a password is set".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SqlAdapterError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("instance_name", &self.instance_name)
            .field("options", &self.options)
            .field("retry", &self.retry)
            .field("pool_max_size", &self.pool_max_size)
            .finish()
    }
}
