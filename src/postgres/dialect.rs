use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::template::{build_template, template};
use crate::adapter::{
    Dialect, ErrorTranslator, InsertCapabilities, PlaceholderRewriter, RawQuery,
    SchemaIntrospection, TemplateProvider, ValueConverter, is_raw_backend_error, message_matches,
};
use crate::error::{CompileError, SqlAdapterError};
use crate::fragment::{CachePolicy, Template, quote_path};
use crate::translation::PlaceholderStyle;
use crate::types::{DatabaseType, RowValues};

const EXHAUSTED: &[&str] = &[
    "too many clients",
    "remaining connection slots are reserved",
    "too many open",
];
const BAD_CREDENTIALS: &[&str] = &["password authentication failed", "no pg_hba.conf entry"];
const STARTING_UP: &[&str] = &["the database system is starting up", "connection refused"];
const TERMINATED: &[&str] = &["terminating connection due to administrator command"];

/// PostgreSQL: `$N` placeholders, `RETURNING`, native arrays, maps stored as JSON.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    template: Option<Arc<Template>>,
    returning: bool,
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self {
            template: None,
            returning: true,
        }
    }
}

impl PostgresDialect {
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

    /// With `false`, inserted keys are read back with `LASTVAL()` instead of `RETURNING`.
    #[must_use]
    pub fn with_returning(mut self, enabled: bool) -> Self {
        self.returning = enabled;
        self
    }
}

impl TemplateProvider for PostgresDialect {
    fn template(&self) -> &Template {
        self.template.as_deref().unwrap_or_else(|| template())
    }
}

impl PlaceholderRewriter for PostgresDialect {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Dollar
    }
}

impl ValueConverter for PostgresDialect {
    fn convert_values(&self, args: Vec<RowValues>) -> Vec<RowValues> {
        args.into_iter()
            .map(|value| match value {
                RowValues::Map(map) => RowValues::JSON(JsonValue::Object(map)),
                other => other,
            })
            .collect()
    }
}

impl ErrorTranslator for PostgresDialect {
    fn translate_error(&self, err: SqlAdapterError) -> SqlAdapterError {
        if !is_raw_backend_error(&err) {
            return err;
        }
        if message_matches(&err, EXHAUSTED) {
            SqlAdapterError::ResourceExhausted(err.to_string())
        } else if message_matches(&err, BAD_CREDENTIALS) {
            SqlAdapterError::ConfigError(err.to_string())
        } else if message_matches(&err, STARTING_UP) {
            SqlAdapterError::ConnectionError(err.to_string())
        } else if message_matches(&err, TERMINATED) {
            SqlAdapterError::ConnectionLost(err.to_string())
        } else {
            err
        }
    }
}

impl SchemaIntrospection for PostgresDialect {
    fn primary_keys_query(&self, table: &str) -> Result<RawQuery, CompileError> {
        let qualified = quote_path(self.template(), table)?;
        Ok(RawQuery::new(
            "SELECT a.attname::text AS pkey \
             FROM pg_index i \
             JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey) \
             WHERE i.indrelid = ?::text::regclass AND i.indisprimary \
             ORDER BY array_position(i.indkey::int2[], a.attnum)",
            vec![RowValues::Text(qualified)],
        ))
    }

    fn table_exists_query(&self, database: &str, table: &str) -> RawQuery {
        RawQuery::new(
            "SELECT table_name::text AS name FROM information_schema.tables \
             WHERE table_catalog = ?::text AND table_name = ?::text",
            vec![RowValues::from(database), RowValues::from(table)],
        )
    }

    fn collections_query(&self, database: &str) -> RawQuery {
        RawQuery::new(
            "SELECT table_name::text AS name FROM information_schema.tables \
             WHERE table_schema = 'public' AND table_catalog = ?::text",
            vec![RowValues::from(database)],
        )
    }

    fn lookup_name_query(&self) -> RawQuery {
        RawQuery::new("SELECT CURRENT_DATABASE()::text AS name", Vec::new())
    }
}

impl InsertCapabilities for PostgresDialect {
    fn supports_returning(&self) -> bool {
        self.returning
    }

    fn last_insert_id_query(&self) -> Option<RawQuery> {
        (!self.returning).then(|| RawQuery::new("SELECT LASTVAL() AS id", Vec::new()))
    }
}

impl Dialect for PostgresDialect {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgres
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn private_cache_policy_keeps_its_own_template() {
        let shared = PostgresDialect::new();
        let private = PostgresDialect::new()
            .with_cache_policy(CachePolicy::Bounded(std::num::NonZeroUsize::new(4).unwrap()));
        assert!(std::ptr::eq(shared.template(), template()));
        assert!(!std::ptr::eq(private.template(), template()));
        assert_eq!(private.template().quote_identifier("users").unwrap(), "\"users\"");
    }

    #[test]
    fn maps_become_json() {
        let mut map = serde_json::Map::new();
        map.insert("a".into(), json!(1));
        let converted = PostgresDialect::new().convert_values(vec![
            RowValues::Map(map),
            RowValues::IntArray(vec![1, 2]),
        ]);
        assert_eq!(converted[0], RowValues::JSON(json!({"a": 1})));
        assert_eq!(converted[1], RowValues::IntArray(vec![1, 2]));
    }

    #[test]
    fn translates_connection_pressure() {
        let dialect = PostgresDialect::new();
        let err = dialect.translate_error(SqlAdapterError::Other(
            "FATAL: sorry, too many clients already".into(),
        ));
        assert!(matches!(err, SqlAdapterError::ResourceExhausted(_)));
        assert!(err.is_transient());

        let err = dialect.translate_error(SqlAdapterError::ConnectionError(
            "password authentication failed for user \"app\"".into(),
        ));
        assert!(matches!(err, SqlAdapterError::ConfigError(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn classified_errors_pass_through() {
        let err = PostgresDialect::new()
            .translate_error(SqlAdapterError::ResourceExhausted("too many clients".into()));
        assert!(matches!(err, SqlAdapterError::ResourceExhausted(msg) if msg == "too many clients"));
    }

    #[test]
    fn placeholders_become_dollar_markers() {
        let dialect = PostgresDialect::new();
        assert_eq!(
            dialect.rewrite_placeholders("SELECT * FROM t WHERE a = ? AND b = '?'"),
            "SELECT * FROM t WHERE a = $1 AND b = '?'"
        );
    }

    #[test]
    fn without_returning_uses_lastval() {
        let dialect = PostgresDialect::new().with_returning(false);
        assert!(!dialect.supports_returning());
        assert_eq!(
            dialect.last_insert_id_query().map(|q| q.sql),
            Some("SELECT LASTVAL() AS id".to_string())
        );
    }

    #[test]
    fn primary_key_query_quotes_schema_path() {
        let query = PostgresDialect::new().primary_keys_query("app.users").unwrap();
        assert_eq!(query.args, vec![RowValues::Text(r#""app"."users""#.into())]);
        assert!(query.sql.contains("?::text::regclass"));
    }
}
