use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tokio::sync::OnceCell;
use tracing::{debug, error};

use super::Session;
use crate::builder::{Cond, DeleteBuilder, InsertBuilder, Query, Record, SelectBuilder, UpdateBuilder};
use crate::error::SqlAdapterError;
use crate::fragment::Statement;
use crate::results::{ResultSet, Row};
use crate::types::RowValues;

/// Key of a freshly inserted row, shaped by the table's primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertedKey {
    /// The table has no primary key.
    None,
    Single(RowValues),
    /// Compound primary key, by column name.
    Compound(BTreeMap<String, RowValues>),
}

impl InsertedKey {
    fn from_lookup<'a>(
        primary_keys: &[String],
        mut lookup: impl FnMut(usize, &str) -> Option<&'a RowValues>,
    ) -> Self {
        match primary_keys {
            [] => InsertedKey::None,
            [pk] => InsertedKey::Single(lookup(0, pk).cloned().unwrap_or(RowValues::Null)),
            keys => InsertedKey::Compound(
                keys.iter()
                    .enumerate()
                    .map(|(i, pk)| {
                        (
                            pk.clone(),
                            lookup(i, pk).cloned().unwrap_or(RowValues::Null),
                        )
                    })
                    .collect(),
            ),
        }
    }

    fn from_row(primary_keys: &[String], row: &Row) -> Self {
        Self::from_lookup(primary_keys, |i, pk| row.get(pk).or_else(|| row.get_by_index(i)))
    }

    fn from_record(primary_keys: &[String], record: &Record) -> Self {
        Self::from_lookup(primary_keys, |_, pk| record.get(pk))
    }
}

/// One table, reached through a session. Primary keys and the identity flag are looked up once.
#[derive(Debug)]
pub struct Collection<'s> {
    session: &'s Session,
    name: String,
    primary_keys: OnceCell<Vec<String>>,
    identity: OnceCell<bool>,
}

impl<'s> Collection<'s> {
    pub(super) fn new(session: &'s Session, name: String) -> Self {
        Self {
            session,
            name,
            primary_keys: OnceCell::new(),
            identity: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn session(&self) -> &'s Session {
        self.session
    }

    /// # Errors
    /// Introspection query failures.
    pub async fn primary_keys(&self) -> Result<&[String], SqlAdapterError> {
        self.primary_keys
            .get_or_try_init(|| self.session.primary_keys(&self.name))
            .await
            .map(Vec::as_slice)
    }

    async fn has_identity(&self) -> Result<bool, SqlAdapterError> {
        let Some(raw) = self.session.dialect().identity_columns_query(&self.name) else {
            return Ok(false);
        };
        self.identity
            .get_or_try_init(|| async {
                let rows = self.session.query_raw(&raw.sql, &raw.args).await?;
                Ok(rows
                    .first()
                    .and_then(|row| row.get("n"))
                    .and_then(RowValues::as_int)
                    .is_some_and(|n| *n > 0))
            })
            .await
            .copied()
    }

    /// # Errors
    /// Connectivity or execution errors other than the table being absent.
    pub async fn exists(&self) -> Result<bool, SqlAdapterError> {
        match self.session.table_exists(&self.name).await {
            Ok(()) => Ok(true),
            Err(SqlAdapterError::CollectionDoesNotExist(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Insert one record and report its key.
    ///
    /// A key column present in `record` with a non-NULL value (zero included) counts as an
    /// explicit key. When the dialect needs a session toggle for explicit identity values the
    /// insert is wrapped in it, inside a transaction if none is bound.
    ///
    /// # Errors
    /// Compile, execution or introspection errors; `Restore` when the insert failed and
    /// switching the identity toggle back failed too.
    pub async fn insert(&self, record: Record) -> Result<InsertedKey, SqlAdapterError> {
        let primary_keys = self.primary_keys().await?.to_vec();
        let explicit = primary_keys
            .iter()
            .any(|pk| record.get(pk).is_some_and(|value| !value.is_null()));

        if !explicit || !self.has_identity().await? {
            return insert_record(self.session, &self.name, &primary_keys, record).await;
        }
        if self.session.in_tx() {
            return insert_with_identity(self.session, &self.name, &primary_keys, record).await;
        }

        let table = self.name.clone();
        self.session
            .run_tx(self.session.context().clone(), move |tx| {
                async move { insert_with_identity(tx.session(), &table, &primary_keys, record).await }
                    .boxed()
            })
            .await
    }

    /// Rows matching `cond`, refined through the returned [`Finder`].
    #[must_use]
    pub fn find(&self, cond: Cond) -> Finder<'s> {
        Finder::new(self.session, &self.name, Some(cond))
    }

    #[must_use]
    pub fn find_all(&self) -> Finder<'s> {
        Finder::new(self.session, &self.name, None)
    }

    /// # Errors
    /// Compile or execution errors.
    pub async fn update(&self, cond: Cond, record: Record) -> Result<u64, SqlAdapterError> {
        self.find(cond).update(record).await
    }

    /// # Errors
    /// Compile or execution errors.
    pub async fn delete(&self, cond: Cond) -> Result<u64, SqlAdapterError> {
        self.find(cond).delete().await
    }

    /// Remove every row.
    ///
    /// # Errors
    /// Compile or execution errors.
    pub async fn truncate(&self) -> Result<(), SqlAdapterError> {
        self.session
            .exec(&Query::from(Statement::truncate(self.name.as_str())))
            .await
            .map(|_| ())
    }
}

async fn insert_record(
    session: &Session,
    table: &str,
    primary_keys: &[String],
    record: Record,
) -> Result<InsertedKey, SqlAdapterError> {
    let dialect = session.dialect();
    let returning = dialect.supports_returning() && !primary_keys.is_empty();

    let mut builder = InsertBuilder::new(table).record(record.clone());
    if returning {
        builder = builder.returning(primary_keys.iter().cloned());
    }
    let query = builder.build()?;

    if returning {
        let row = session.query_row(&query).await?;
        return Ok(InsertedKey::from_row(primary_keys, &row));
    }
    session.exec(&query).await?;

    let all_explicit = primary_keys
        .iter()
        .all(|pk| record.get(pk).is_some_and(|value| !value.is_null()));
    if let (false, [_], Some(raw)) = (all_explicit, primary_keys, dialect.last_insert_id_query()) {
        let row = session.query_raw(&raw.sql, &raw.args).await?.into_rows().into_iter().next();
        if let Some(row) = row {
            return Ok(InsertedKey::Single(
                row.get("id").or_else(|| row.get_by_index(0)).cloned().unwrap_or(RowValues::Null),
            ));
        }
    }
    Ok(InsertedKey::from_record(primary_keys, &record))
}

/// Insert with explicit identity values allowed, switching the toggle back on every exit.
async fn insert_with_identity(
    session: &Session,
    table: &str,
    primary_keys: &[String],
    record: Record,
) -> Result<InsertedKey, SqlAdapterError> {
    let dialect = session.dialect();
    let enable = dialect.identity_insert(table, true)?;
    let disable = dialect.identity_insert(table, false)?;

    if let Some(sql) = &enable {
        debug!(table, "identity insert on");
        session.exec_raw(sql, &[]).await?;
    }

    let outcome = AssertUnwindSafe(insert_record(session, table, primary_keys, record))
        .catch_unwind()
        .await;

    let restored = match &disable {
        Some(sql) => {
            debug!(table, "identity insert off");
            session.exec_raw(sql, &[]).await.map(|_| ())
        }
        None => Ok(()),
    };

    match outcome {
        Ok(Ok(key)) => restored.map(|()| key),
        Ok(Err(err)) => match restored {
            Ok(()) => Err(err),
            Err(restore) => Err(SqlAdapterError::Restore {
                source: Box::new(err),
                restore: Box::new(restore),
            }),
        },
        Err(panic) => {
            if let Err(restore) = restored {
                error!(table, error = %restore, "restoring identity insert after panic failed");
            }
            std::panic::resume_unwind(panic)
        }
    }
}

/// A pending select over one collection.
#[derive(Debug, Clone)]
pub struct Finder<'s> {
    session: &'s Session,
    table: String,
    cond: Option<Cond>,
    select: SelectBuilder,
}

impl<'s> Finder<'s> {
    fn new(session: &'s Session, table: &str, cond: Option<Cond>) -> Self {
        let mut select = SelectBuilder::new(table);
        if let Some(cond) = &cond {
            select = select.filter(cond.clone());
        }
        Self {
            session,
            table: table.to_string(),
            cond,
            select,
        }
    }

    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = self.select.columns(columns);
        self
    }

    /// Sort by `column`; a leading `-` sorts descending.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.select = self.select.order_by(column);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.select = self.select.limit(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.select = self.select.offset(offset);
        self
    }

    /// # Errors
    /// Compile or execution errors.
    pub async fn all(&self) -> Result<ResultSet, SqlAdapterError> {
        self.session.query(&self.select.build()?).await
    }

    /// # Errors
    /// `NoMoreRows` when nothing matches.
    pub async fn one(&self) -> Result<Row, SqlAdapterError> {
        let query = self.select.clone().limit(1).build()?;
        self.session.query_row(&query).await
    }

    /// Matching rows, ignoring limit and offset.
    ///
    /// # Errors
    /// Compile or execution errors, `SchemaError` if the count comes back in an unexpected shape.
    pub async fn count(&self) -> Result<u64, SqlAdapterError> {
        let row = self.session.query_row(&self.select.build_count()?).await?;
        row.get("_t")
            .or_else(|| row.get_by_index(0))
            .and_then(RowValues::as_int)
            .and_then(|n| u64::try_from(*n).ok())
            .ok_or_else(|| SqlAdapterError::SchemaError("count returned no integer".to_string()))
    }

    /// # Errors
    /// As [`Finder::count`].
    pub async fn exists(&self) -> Result<bool, SqlAdapterError> {
        Ok(self.count().await? > 0)
    }

    /// Apply `record` to every matching row.
    ///
    /// # Errors
    /// Compile or execution errors.
    pub async fn update(&self, record: Record) -> Result<u64, SqlAdapterError> {
        let mut builder = UpdateBuilder::new(self.table.as_str()).record(record);
        if let Some(cond) = &self.cond {
            builder = builder.filter(cond.clone());
        }
        self.session.exec(&builder.build()?).await
    }

    /// # Errors
    /// Compile or execution errors.
    pub async fn delete(&self) -> Result<u64, SqlAdapterError> {
        let mut builder = DeleteBuilder::new(self.table.as_str());
        if let Some(cond) = &self.cond {
            builder = builder.filter(cond.clone());
        }
        self.session.exec(&builder.build()?).await
    }
}
