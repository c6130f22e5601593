use super::{Cond, Query};
use crate::error::CompileError;
use crate::fragment::{
    Columns, GroupBy, Join, JoinKind, Joins, OrderBy, SortColumn, Statement, Where,
};
use crate::types::RowValues;

#[derive(Debug, Clone)]
struct JoinSpec {
    kind: JoinKind,
    table: String,
    on: Option<Cond>,
    using: Vec<String>,
}

/// Fluent builder for `SELECT` statements.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    table: String,
    columns: Vec<String>,
    joins: Vec<JoinSpec>,
    filter: Option<Cond>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
}

impl SelectBuilder {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
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

    /// Add a condition; repeated calls are combined with `AND`.
    #[must_use]
    pub fn filter(mut self, cond: Cond) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(cond),
            None => cond,
        });
        self
    }

    #[must_use]
    pub fn join(mut self, kind: JoinKind, table: impl Into<String>, on: Cond) -> Self {
        self.joins.push(JoinSpec {
            kind,
            table: table.into(),
            on: Some(on),
            using: Vec::new(),
        });
        self
    }

    #[must_use]
    pub fn join_using<I, S>(mut self, kind: JoinKind, table: impl Into<String>, using: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.joins.push(JoinSpec {
            kind,
            table: table.into(),
            on: None,
            using: using.into_iter().map(Into::into).collect(),
        });
        self
    }

    #[must_use]
    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append a sort column; a leading `-` sorts descending.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by.push(column.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    fn lower_joins(&self, args: &mut Vec<RowValues>) -> Joins {
        Joins::new(
            self.joins
                .iter()
                .map(|spec| {
                    let mut join = Join::new(spec.kind, spec.table.as_str());
                    if let Some(on) = &spec.on {
                        join = join.on(on.clone().lower_group(args));
                    }
                    if !spec.using.is_empty() {
                        join = join.using(Columns::from_names(spec.using.iter().cloned()));
                    }
                    join
                })
                .collect(),
        )
    }

    fn lower_where(&self, args: &mut Vec<RowValues>) -> Where {
        self.filter
            .clone()
            .map(|cond| Where::from_group(cond.lower_group(args)))
            .unwrap_or_default()
    }

    /// # Errors
    /// `Malformed` when the select has neither a table nor any column.
    pub fn build(&self) -> Result<Query, CompileError> {
        if self.table.trim().is_empty() && self.columns.is_empty() {
            return Err(CompileError::Malformed(
                "select needs a table or at least one column".to_string(),
            ));
        }
        let mut args = Vec::new();
        let joins = self.lower_joins(&mut args);
        let where_clause = self.lower_where(&mut args);

        let mut statement = Statement::select(self.table.as_str())
            .with_columns(Columns::from_names(self.columns.iter().cloned()))
            .with_joins(joins)
            .with_where(where_clause)
            .with_group_by(GroupBy::new(Columns::from_names(self.group_by.iter().cloned())))
            .with_order_by(OrderBy::new(
                self.order_by.iter().map(|spec| SortColumn::parse(spec)).collect(),
            ))
            .with_distinct(self.distinct);
        statement.set_limit(self.limit);
        statement.set_offset(self.offset);
        Ok(Query::new(statement, args))
    }

    /// `SELECT COUNT(1)` over the same table, joins and filter, ignoring paging and ordering.
    ///
    /// # Errors
    /// `Malformed` when the builder has no table.
    pub fn build_count(&self) -> Result<Query, CompileError> {
        if self.table.trim().is_empty() {
            return Err(CompileError::Malformed("count needs a table".to_string()));
        }
        let mut args = Vec::new();
        let joins = self.lower_joins(&mut args);
        let where_clause = self.lower_where(&mut args);
        let statement = Statement::count(self.table.as_str())
            .with_joins(joins)
            .with_where(where_clause);
        Ok(Query::new(statement, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragment;
    use pretty_assertions::assert_eq;

    #[test]
    fn join_args_come_before_where_args() {
        let query = SelectBuilder::new("posts p")
            .columns(["p.title"])
            .join(
                JoinKind::Inner,
                "authors a",
                Cond::columns_eq("a.id", "p.author_id").and(Cond::eq("a.active", true)),
            )
            .filter(Cond::gt("p.score", 10))
            .order_by("-p.score")
            .limit(3)
            .build()
            .unwrap();
        assert_eq!(
            query.statement.compile(crate::postgres::template()).unwrap(),
            r#"SELECT "p"."title" FROM "posts" AS "p" INNER JOIN "authors" AS "a" ON "a"."id" = "p"."author_id" AND "a"."active" = ? WHERE "p"."score" > ? ORDER BY "p"."score" DESC LIMIT 3"#
        );
        assert_eq!(query.args, vec![RowValues::Bool(true), RowValues::Int(10)]);
    }

    #[test]
    fn count_ignores_paging() {
        let query = SelectBuilder::new("users")
            .filter(Cond::eq("team", "blue"))
            .limit(10)
            .offset(10)
            .build_count()
            .unwrap();
        assert_eq!(
            query.statement.compile(crate::mssql::template()).unwrap(),
            "SELECT COUNT(1) AS _t FROM [users] WHERE [team] = ?"
        );
        assert_eq!(query.args, vec![RowValues::Text("blue".into())]);
    }

    #[test]
    fn group_by_and_distinct() {
        let query = SelectBuilder::new("events")
            .columns(["kind", "COUNT(*) AS n"])
            .group_by(["kind"])
            .distinct()
            .build()
            .unwrap();
        assert_eq!(
            query.statement.compile(crate::postgres::template()).unwrap(),
            r#"SELECT DISTINCT "kind", COUNT(*) AS "n" FROM "events" GROUP BY "kind""#
        );
    }
}
