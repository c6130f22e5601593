use std::borrow::Cow;

use crate::error::{CompileError, SqlAdapterError};
use crate::fragment::Template;
use crate::translation::{PlaceholderStyle, rewrite_placeholders};
use crate::types::{DatabaseType, RowValues};

/// Raw SQL with neutral `?` markers and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuery {
    pub sql: String,
    pub args: Vec<RowValues>,
}

impl RawQuery {
    #[must_use]
    pub fn new(sql: impl Into<String>, args: Vec<RowValues>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }
}

pub trait TemplateProvider {
    fn template(&self) -> &Template;
}

pub trait PlaceholderRewriter {
    fn placeholder_style(&self) -> PlaceholderStyle;

    fn rewrite_placeholders<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        rewrite_placeholders(sql, self.placeholder_style())
    }
}

/// Normalizes arguments into types the native driver accepts. Must be pure.
pub trait ValueConverter {
    fn convert_values(&self, args: Vec<RowValues>) -> Vec<RowValues> {
        args
    }
}

/// Maps backend errors onto the crate's error taxonomy.
pub trait ErrorTranslator {
    fn translate_error(&self, err: SqlAdapterError) -> SqlAdapterError {
        err
    }
}

pub trait SchemaIntrospection {
    /// Query yielding one `pkey` column per primary-key column of `table`, in key order.
    ///
    /// # Errors
    /// `CompileError` if the table name cannot be quoted by the dialect's template.
    fn primary_keys_query(&self, table: &str) -> Result<RawQuery, CompileError>;

    /// Query yielding at least one row when `table` exists in `database`.
    fn table_exists_query(&self, database: &str, table: &str) -> RawQuery;

    /// Query yielding a `name` column per user table.
    fn collections_query(&self, database: &str) -> RawQuery;

    /// Query yielding the current database name in a `name` column.
    fn lookup_name_query(&self) -> RawQuery;
}

pub trait InsertCapabilities {
    /// Whether inserted keys can be read back from the insert itself.
    fn supports_returning(&self) -> bool;

    /// Query counting identity columns of `table` (column `n`), for dialects where inserting an
    /// explicit value into one needs a session toggle.
    fn identity_columns_query(&self, _table: &str) -> Option<RawQuery> {
        None
    }

    /// Statement switching explicit identity inserts on or off for `table`.
    ///
    /// # Errors
    /// `CompileError` if the table name cannot be quoted.
    fn identity_insert(&self, _table: &str, _enabled: bool) -> Result<Option<String>, CompileError> {
        Ok(None)
    }

    /// Follow-up query returning the generated key (column `id`) when `RETURNING` is not used.
    fn last_insert_id_query(&self) -> Option<RawQuery> {
        None
    }
}

/// Everything a session needs to know about one SQL dialect.
pub trait Dialect:
    TemplateProvider
    + PlaceholderRewriter
    + ValueConverter
    + ErrorTranslator
    + SchemaIntrospection
    + InsertCapabilities
    + Send
    + Sync
    + 'static
{
    fn database_type(&self) -> DatabaseType;
}

/// Shared message matching used by the bundled translators.
pub(crate) fn message_matches(err: &SqlAdapterError, needles: &[&str]) -> bool {
    let message = err.to_string().to_lowercase();
    needles.iter().any(|needle| message.contains(needle))
}

/// Whether `err` is still an unclassified backend failure a translator may reclassify.
pub(crate) fn is_raw_backend_error(err: &SqlAdapterError) -> bool {
    match err {
        SqlAdapterError::ConnectionError(_)
        | SqlAdapterError::ExecutionError(_)
        | SqlAdapterError::Other(_) => true,
        #[cfg(feature = "postgres")]
        SqlAdapterError::PostgresError(_) => true,
        #[cfg(feature = "mssql")]
        SqlAdapterError::MssqlError(_) => true,
        _ => false,
    }
}
