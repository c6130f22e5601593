use super::{Cond, Query, Record};
use crate::error::CompileError;
use crate::fragment::{
    ColumnValue, ColumnValues, Columns, Returning, Statement, ValueGroup, ValueGroups, Where,
};
use crate::types::RowValues;

fn returning(columns: &[String]) -> Returning {
    Returning::new(Columns::from_names(columns.iter().cloned()))
}

fn lower_where(filter: Option<Cond>, args: &mut Vec<RowValues>) -> Where {
    filter
        .map(|cond| Where::from_group(cond.lower_group(args)))
        .unwrap_or_default()
}

/// Fluent builder for `INSERT` statements, single or multi-row.
#[derive(Debug, Clone)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<RowValues>>,
    returning: Vec<String>,
}

impl InsertBuilder {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            returning: Vec::new(),
        }
    }

    #[must_use]
    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn values(mut self, row: Vec<RowValues>) -> Self {
        self.rows.push(row);
        self
    }

    /// Insert one record; its columns become the statement's column list.
    #[must_use]
    pub fn record(mut self, record: Record) -> Self {
        let (columns, values) = record.into_parts();
        if self.columns.is_empty() {
            self.columns = columns;
        }
        self.rows.push(values);
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// # Errors
    /// `Malformed` when a row's width does not match the column list.
    pub fn build(self) -> Result<Query, CompileError> {
        let width = self.columns.len();
        if let Some(bad) = self.rows.iter().find(|row| row.len() != width) {
            return Err(CompileError::Malformed(format!(
                "insert row has {} values for {} columns",
                bad.len(),
                width
            )));
        }
        let groups = self
            .rows
            .iter()
            .filter(|row| !row.is_empty())
            .map(|row| ValueGroup::placeholders(row.len()))
            .collect();
        let statement = Statement::insert(self.table.as_str())
            .with_columns(Columns::from_names(self.columns))
            .with_values(ValueGroups::new(groups))
            .with_returning(returning(&self.returning));
        Ok(Query::new(statement, self.rows.into_iter().flatten().collect()))
    }
}

/// Fluent builder for `UPDATE` statements.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    table: String,
    set: Record,
    filter: Option<Cond>,
    returning: Vec<String>,
}

impl UpdateBuilder {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            set: Record::new(),
            filter: None,
            returning: Vec::new(),
        }
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.set.insert(column, value);
        self
    }

    #[must_use]
    pub fn record(mut self, record: Record) -> Self {
        for (column, value) in record.iter() {
            self.set.insert(column, value.clone());
        }
        self
    }

    #[must_use]
    pub fn filter(mut self, cond: Cond) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
        self
    }

    #[must_use]
    pub fn returning<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.returning = columns.into_iter().map(Into::into).collect();
        self
    }

    /// # Errors
    /// Never fails today; an empty `SET` list is reported when the statement compiles.
    pub fn build(self) -> Result<Query, CompileError> {
        let (columns, mut args) = self.set.into_parts();
        let assignments = ColumnValues::new(
            columns
                .into_iter()
                .map(|column| ColumnValue::placeholder(column, "="))
                .collect(),
        );
        let where_clause = lower_where(self.filter, &mut args);
        let statement = Statement::update(self.table.as_str())
            .with_assignments(assignments)
            .with_where(where_clause)
            .with_returning(returning(&self.returning));
        Ok(Query::new(statement, args))
    }
}

/// Fluent builder for `DELETE` statements.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: String,
    filter: Option<Cond>,
}

impl DeleteBuilder {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, cond: Cond) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
        self
    }

    /// # Errors
    /// Never fails today; a missing table is reported when the statement compiles.
    pub fn build(self) -> Result<Query, CompileError> {
        let mut args = Vec::new();
        let where_clause = lower_where(self.filter, &mut args);
        let statement = Statement::delete(self.table.as_str()).with_where(where_clause);
        Ok(Query::new(statement, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use pretty_assertions::assert_eq;

    #[test]
    fn multi_row_insert() {
        let query = InsertBuilder::new("tags")
            .columns(["name", "weight"])
            .values(vec!["a".into(), RowValues::Int(1)])
            .values(vec!["b".into(), RowValues::Int(2)])
            .build()
            .unwrap();
        assert_eq!(
            query.statement.compile(crate::postgres::template()).unwrap(),
            r#"INSERT INTO "tags" ("name", "weight") VALUES (?, ?), (?, ?)"#
        );
        assert_eq!(query.args.len(), 4);
        assert_eq!(query.args[2], RowValues::Text("b".into()));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let err = InsertBuilder::new("tags")
            .columns(["name", "weight"])
            .values(vec!["a".into()])
            .build()
            .unwrap_err();
        assert!(matches!(err, CompileError::Malformed(_)));
    }

    #[test]
    fn update_args_set_then_where() {
        let query = UpdateBuilder::new("users")
            .set("name", "grace")
            .filter(Cond::eq("id", 9))
            .build()
            .unwrap();
        assert_eq!(
            query.statement.compile(crate::mssql::template()).unwrap(),
            "UPDATE [users] SET [name] = ? WHERE [id] = ?"
        );
        assert_eq!(query.args, vec![RowValues::Text("grace".into()), RowValues::Int(9)]);
    }

    #[test]
    fn empty_update_fails_at_compile() {
        let query = UpdateBuilder::new("users").build().unwrap();
        assert!(matches!(
            query.statement.compile(crate::postgres::template()),
            Err(CompileError::Malformed(_))
        ));
    }

    #[test]
    fn delete_without_filter() {
        let query = DeleteBuilder::new("sessions").build().unwrap();
        assert_eq!(
            query.statement.compile(crate::postgres::template()).unwrap(),
            r#"DELETE FROM "sessions""#
        );
        assert!(query.args.is_empty());
    }
}
