use super::layout::Slots;
use super::{
    ColumnValues, Columns, Fragment, FingerprintSlot, GroupBy, Joins, OrderBy, Returning, Table,
    Template, TemplateKey, ValueGroups, Where,
};
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Count,
    Truncate,
    DropTable,
}

impl StatementKind {
    #[must_use]
    pub fn template_key(self) -> TemplateKey {
        match self {
            StatementKind::Select => TemplateKey::Select,
            StatementKind::Insert => TemplateKey::Insert,
            StatementKind::Update => TemplateKey::Update,
            StatementKind::Delete => TemplateKey::Delete,
            StatementKind::Count => TemplateKey::Count,
            StatementKind::Truncate => TemplateKey::Truncate,
            StatementKind::DropTable => TemplateKey::DropTable,
        }
    }
}

/// Top-level statement fragment. Children that are not set stay empty and drop out of the
/// rendered text.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Statement {
    kind: StatementKind,
    table: Table,
    columns: Columns,
    values: ValueGroups,
    assignments: ColumnValues,
    joins: Joins,
    where_clause: Where,
    group_by: GroupBy,
    order_by: OrderBy,
    returning: Returning,
    limit: Option<u64>,
    offset: Option<u64>,
    distinct: bool,
    fingerprint: FingerprintSlot,
}

macro_rules! with_child {
    ($name:ident, $field:ident, $ty:ty) => {
        #[must_use]
        pub fn $name(mut self, $field: $ty) -> Self {
            self.$field = $field;
            self.fingerprint.reset();
            self
        }
    };
}

impl Statement {
    #[must_use]
    pub fn new(kind: StatementKind, table: impl Into<Table>) -> Self {
        Self {
            kind,
            table: table.into(),
            columns: Columns::default(),
            values: ValueGroups::default(),
            assignments: ColumnValues::default(),
            joins: Joins::default(),
            where_clause: Where::default(),
            group_by: GroupBy::default(),
            order_by: OrderBy::default(),
            returning: Returning::default(),
            limit: None,
            offset: None,
            distinct: false,
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn select(table: impl Into<Table>) -> Self {
        Self::new(StatementKind::Select, table)
    }

    #[must_use]
    pub fn insert(table: impl Into<Table>) -> Self {
        Self::new(StatementKind::Insert, table)
    }

    #[must_use]
    pub fn update(table: impl Into<Table>) -> Self {
        Self::new(StatementKind::Update, table)
    }

    #[must_use]
    pub fn delete(table: impl Into<Table>) -> Self {
        Self::new(StatementKind::Delete, table)
    }

    #[must_use]
    pub fn count(table: impl Into<Table>) -> Self {
        Self::new(StatementKind::Count, table)
    }

    #[must_use]
    pub fn truncate(table: impl Into<Table>) -> Self {
        Self::new(StatementKind::Truncate, table)
    }

    #[must_use]
    pub fn drop_table(table: impl Into<Table>) -> Self {
        Self::new(StatementKind::DropTable, table)
    }

    with_child!(with_columns, columns, Columns);
    with_child!(with_values, values, ValueGroups);
    with_child!(with_assignments, assignments, ColumnValues);
    with_child!(with_joins, joins, Joins);
    with_child!(with_where, where_clause, Where);
    with_child!(with_group_by, group_by, GroupBy);
    with_child!(with_order_by, order_by, OrderBy);
    with_child!(with_returning, returning, Returning);
    with_child!(with_distinct, distinct, bool);

    #[must_use]
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.set_limit(Some(limit));
        self
    }

    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.set_offset(Some(offset));
        self
    }

    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
        self.fingerprint.reset();
    }

    pub fn set_offset(&mut self, offset: Option<u64>) {
        self.offset = offset;
        self.fingerprint.reset();
    }

    /// Mutable access to the `WHERE` clause. Invalidates this statement's fingerprint.
    pub fn where_mut(&mut self) -> &mut Where {
        self.fingerprint.reset();
        &mut self.where_clause
    }

    #[must_use]
    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    #[must_use]
    pub fn table(&self) -> &Table {
        &self.table
    }

    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    #[must_use]
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    #[must_use]
    pub fn returning(&self) -> &Returning {
        &self.returning
    }

    fn validate(&self) -> Result<(), CompileError> {
        if self.kind != StatementKind::Select && self.table.is_empty() {
            return Err(CompileError::Malformed(format!(
                "{:?} statement without a table",
                self.kind
            )));
        }
        if self.kind == StatementKind::Update && self.assignments.is_empty() {
            return Err(CompileError::Malformed(
                "UPDATE statement without assignments".to_string(),
            ));
        }
        Ok(())
    }
}

fn number(value: Option<u64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

impl Fragment for Statement {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        self.validate()?;

        let offset = self.offset.filter(|n| *n > 0);
        let columns = if self.kind == StatementKind::Select && self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.compile(template)?
        };
        let order_by = if self.order_by.is_empty()
            && offset.is_some()
            && template.has_layout(TemplateKey::DefaultOrderBy)
        {
            template.literal(TemplateKey::DefaultOrderBy)?
        } else {
            self.order_by.compile(template)?
        };
        let distinct = if self.distinct {
            template.literal(TemplateKey::Distinct)?
        } else {
            String::new()
        };
        let (top, fetch) = if offset.is_some() {
            (None, self.limit)
        } else {
            (self.limit, None)
        };

        let slots = Slots::new()
            .with("table", self.table.compile(template)?)
            .with("columns", columns)
            .with("values", self.values.compile(template)?)
            .with("assignments", self.assignments.compile(template)?)
            .with("joins", self.joins.compile(template)?)
            .with("where", self.where_clause.compile(template)?)
            .with("group_by", self.group_by.compile(template)?)
            .with("order_by", order_by)
            .with("returning", self.returning.compile(template)?)
            .with("distinct", distinct)
            .with("limit", number(self.limit))
            .with("offset", number(offset))
            .with("top", number(top))
            .with("fetch", number(fetch));

        let sql = template.render(self.kind.template_key(), &slots)?;
        Ok(sql.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::{
        CachePolicy, ColumnValue, Condition, Join, JoinKind, SortColumn, ValueGroup,
    };
    use pretty_assertions::assert_eq;

    fn by_id() -> Where {
        Where::new(vec![Condition::Column(ColumnValue::placeholder("id", "="))])
    }

    #[test]
    fn full_select_postgres() {
        let template = crate::postgres::template();
        let stmt = Statement::select("posts p")
            .with_columns(Columns::from_names(["p.id", "a.name AS author"]))
            .with_joins(Joins::new(vec![Join::new(JoinKind::Inner, "authors a").using(
                Columns::from_names(["author_id"]),
            )]))
            .with_where(by_id())
            .with_order_by(OrderBy::new(vec![SortColumn::parse("-p.id")]))
            .with_limit(10)
            .with_offset(20);
        assert_eq!(
            stmt.compile(template).unwrap(),
            r#"SELECT "p"."id", "a"."name" AS "author" FROM "posts" AS "p" INNER JOIN "authors" AS "a" USING ("author_id") WHERE "id" = ? ORDER BY "p"."id" DESC LIMIT 10 OFFSET 20"#
        );
    }

    #[test]
    fn bare_select_defaults_to_star() {
        let template = crate::postgres::template();
        assert_eq!(
            Statement::select("users").compile(template).unwrap(),
            r#"SELECT * FROM "users""#
        );
    }

    #[test]
    fn mssql_top_without_offset() {
        let template = crate::mssql::template();
        let stmt = Statement::select("users").with_distinct(true).with_limit(5);
        assert_eq!(
            stmt.compile(template).unwrap(),
            "SELECT DISTINCT TOP (5) * FROM [users]"
        );
    }

    #[test]
    fn mssql_paging_injects_default_order() {
        let template = crate::mssql::template();
        let stmt = Statement::select("users").with_limit(5).with_offset(10);
        assert_eq!(
            stmt.compile(template).unwrap(),
            "SELECT * FROM [users] ORDER BY (SELECT NULL) OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn zero_offset_is_ignored() {
        let template = crate::postgres::template();
        let stmt = Statement::select("users").with_offset(0);
        assert_eq!(stmt.compile(template).unwrap(), r#"SELECT * FROM "users""#);
    }

    #[test]
    fn insert_with_returning() {
        let stmt = Statement::insert("users")
            .with_columns(Columns::from_names(["name", "email"]))
            .with_values(ValueGroups::new(vec![ValueGroup::placeholders(2)]))
            .with_returning(Returning::new(Columns::from_names(["id"])));
        assert_eq!(
            stmt.compile(crate::postgres::template()).unwrap(),
            r#"INSERT INTO "users" ("name", "email") VALUES (?, ?) RETURNING "id""#
        );
        assert_eq!(
            stmt.compile(crate::mssql::template()).unwrap(),
            "INSERT INTO [users] ([name], [email]) OUTPUT INSERTED.[id] VALUES (?, ?)"
        );
    }

    #[test]
    fn insert_without_values_uses_default_values() {
        let stmt = Statement::insert("audit");
        assert_eq!(
            stmt.compile(crate::postgres::template()).unwrap(),
            r#"INSERT INTO "audit" DEFAULT VALUES"#
        );
    }

    #[test]
    fn update_and_delete() {
        let template = crate::postgres::template();
        let update = Statement::update("users")
            .with_assignments(ColumnValues::new(vec![
                ColumnValue::placeholder("name", "="),
                ColumnValue::placeholder("email", "="),
            ]))
            .with_where(by_id());
        assert_eq!(
            update.compile(template).unwrap(),
            r#"UPDATE "users" SET "name" = ?, "email" = ? WHERE "id" = ?"#
        );
        assert_eq!(
            Statement::delete("users").compile(template).unwrap(),
            r#"DELETE FROM "users""#
        );
    }

    #[test]
    fn count_truncate_drop() {
        let template = crate::postgres::template();
        assert_eq!(
            Statement::count("users").with_where(by_id()).compile(template).unwrap(),
            r#"SELECT COUNT(1) AS _t FROM "users" WHERE "id" = ?"#
        );
        assert_eq!(
            Statement::truncate("users").compile(template).unwrap(),
            r#"TRUNCATE TABLE "users" RESTART IDENTITY"#
        );
        assert_eq!(
            Statement::drop_table("users").compile(crate::mssql::template()).unwrap(),
            "DROP TABLE [users]"
        );
    }

    #[test]
    fn malformed_statements_are_rejected() {
        let template = crate::postgres::build_template(CachePolicy::Unbounded);
        assert!(matches!(
            Statement::update("users").compile(&template),
            Err(CompileError::Malformed(_))
        ));
        assert!(matches!(
            Statement::insert("").compile(&template),
            Err(CompileError::Malformed(_))
        ));
        assert!(template.cache().is_empty());
    }

    #[test]
    fn template_without_statement_layout() {
        let template = Template::builder("partial")
            .layout(TemplateKey::IdentifierQuote, "\"{value}\"")
            .layout(TemplateKey::ColumnSeparator, ", ")
            .build();
        assert_eq!(
            Statement::select("users").compile(&template).unwrap_err(),
            CompileError::MissingTemplate(TemplateKey::Select)
        );
    }
}
