use std::sync::Arc;

use super::template::{build_template, template};
use crate::adapter::{
    Dialect, ErrorTranslator, InsertCapabilities, PlaceholderRewriter, RawQuery,
    SchemaIntrospection, TemplateProvider, ValueConverter, is_raw_backend_error, message_matches,
};
use crate::error::{CompileError, SqlAdapterError};
use crate::fragment::{CachePolicy, Template, quote_path};
use crate::translation::PlaceholderStyle;
use crate::types::{DatabaseType, RowValues};

const LOGIN_FAILED: &[&str] = &["login failed for user", "cannot open database"];
const EXHAUSTED: &[&str] = &[
    "maximum number of",
    "insufficient system memory",
    "too many connections",
];
const UNREACHABLE: &[&str] = &[
    "connection refused",
    "connection reset",
    "timed out",
    "server is not found or not accessible",
];

/// SQL Server: `@PN` placeholders, `OUTPUT INSERTED`, `IDENTITY_INSERT` toggling, composite
/// values sent as JSON text.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect {
    template: Option<Arc<Template>>,
}

impl MssqlDialect {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a private template set with its own cache instead of the process-wide one.
    #[must_use]
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.template = Some(Arc::new(build_template(policy)));
        self
    }
}

impl TemplateProvider for MssqlDialect {
    fn template(&self) -> &Template {
        self.template.as_deref().unwrap_or_else(|| template())
    }
}

impl PlaceholderRewriter for MssqlDialect {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::AtP
    }
}

impl ValueConverter for MssqlDialect {
    fn convert_values(&self, args: Vec<RowValues>) -> Vec<RowValues> {
        args.into_iter()
            .map(|value| match value {
                RowValues::JSON(_)
                | RowValues::Map(_)
                | RowValues::IntArray(_)
                | RowValues::FloatArray(_)
                | RowValues::TextArray(_)
                | RowValues::BoolArray(_) => RowValues::Text(value.to_json().to_string()),
                other => other,
            })
            .collect()
    }
}

impl ErrorTranslator for MssqlDialect {
    fn translate_error(&self, err: SqlAdapterError) -> SqlAdapterError {
        if !is_raw_backend_error(&err) {
            return err;
        }
        if message_matches(&err, LOGIN_FAILED) {
            SqlAdapterError::ConfigError(err.to_string())
        } else if message_matches(&err, EXHAUSTED) {
            SqlAdapterError::ResourceExhausted(err.to_string())
        } else if message_matches(&err, UNREACHABLE) {
            SqlAdapterError::ConnectionError(err.to_string())
        } else {
            err
        }
    }
}

impl SchemaIntrospection for MssqlDialect {
    fn primary_keys_query(&self, table: &str) -> Result<RawQuery, CompileError> {
        Ok(RawQuery::new(
            "SELECT k.column_name AS pkey \
             FROM information_schema.table_constraints t \
             JOIN information_schema.key_column_usage k \
               ON k.constraint_name = t.constraint_name AND k.table_name = t.table_name \
             WHERE t.constraint_type = 'PRIMARY KEY' AND t.table_name = ? \
             ORDER BY k.ordinal_position",
            vec![RowValues::from(table)],
        ))
    }

    fn table_exists_query(&self, database: &str, table: &str) -> RawQuery {
        RawQuery::new(
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_catalog = ? AND table_name = ?",
            vec![RowValues::from(database), RowValues::from(table)],
        )
    }

    fn collections_query(&self, database: &str) -> RawQuery {
        RawQuery::new(
            "SELECT table_name AS name FROM information_schema.tables \
             WHERE table_type = 'BASE TABLE' AND table_catalog = ?",
            vec![RowValues::from(database)],
        )
    }

    fn lookup_name_query(&self) -> RawQuery {
        RawQuery::new("SELECT DB_NAME() AS name", Vec::new())
    }
}

impl InsertCapabilities for MssqlDialect {
    fn supports_returning(&self) -> bool {
        true
    }

    fn identity_columns_query(&self, table: &str) -> Option<RawQuery> {
        Some(RawQuery::new(
            "SELECT COUNT(1) AS n FROM sys.identity_columns WHERE OBJECT_NAME(object_id) = ?",
            vec![RowValues::from(table)],
        ))
    }

    fn identity_insert(&self, table: &str, enabled: bool) -> Result<Option<String>, CompileError> {
        let table = quote_path(self.template(), table)?;
        let state = if enabled { "ON" } else { "OFF" };
        Ok(Some(format!("SET IDENTITY_INSERT {table} {state}")))
    }
}

impl Dialect for MssqlDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Mssql
    }
}
