use lazy_static::lazy_static;
use regex::Regex;

use super::layout::Slots;
use super::{Fragment, FingerprintSlot, Template, TemplateKey, compile_joined};
use crate::error::CompileError;

lazy_static! {
    static ref COLUMN_ALIAS: Regex =
        Regex::new(r"(?i)^(.+?)\s+as\s+(\S+)$").expect("static column alias pattern");
}

/// Quote a dotted path (`schema.table.column`) one segment at a time.
///
/// `*` is kept as is, and so is anything that looks like an expression rather than a name.
pub(crate) fn quote_path(template: &Template, path: &str) -> Result<String, CompileError> {
    let path = path.trim();
    if is_expression(path) {
        return Ok(path.to_string());
    }
    let parts = path
        .split('.')
        .map(|segment| {
            let segment = segment.trim();
            if segment == "*" {
                Ok(segment.to_string())
            } else {
                template.quote_identifier(segment)
            }
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("."))
}

fn is_expression(text: &str) -> bool {
    text.contains(['(', ')', '"', '\'', '`', '[', ' '])
}

/// A column reference, optionally aliased (`name AS alias`).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Column {
    name: String,
    fingerprint: FingerprintSlot,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Fragment for Column {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let name = self.name.trim();
        if let Some(caps) = COLUMN_ALIAS.captures(name) {
            let column = quote_path(template, &caps[1])?;
            let alias = template.quote_identifier(&caps[2])?;
            return template.render(
                TemplateKey::ColumnAlias,
                &Slots::new().with("column", column).with("alias", alias),
            );
        }
        quote_path(template, name)
    }

    fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::new(name)
    }
}

impl From<String> for Column {
    fn from(name: String) -> Self {
        Column::new(name)
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct Columns {
    columns: Vec<Column>,
    fingerprint: FingerprintSlot,
}

impl Columns {
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(Column::new).collect())
    }

    pub fn push(&mut self, column: Column) {
        self.columns.push(column);
        self.fingerprint.reset();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }
}

impl Fragment for Columns {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        compile_joined(&self.columns, template, TemplateKey::ColumnSeparator)
    }

    fn is_empty(&self) -> bool {
        self.columns.iter().all(Column::is_empty)
    }
}

/// Columns handed back by a write statement (`RETURNING` / `OUTPUT INSERTED`).
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct Returning {
    columns: Columns,
    fingerprint: FingerprintSlot,
}

impl Returning {
    #[must_use]
    pub fn new(columns: Columns) -> Self {
        Self {
            columns,
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn columns(&self) -> &Columns {
        &self.columns
    }
}

impl Fragment for Returning {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let mut wrapped = Vec::with_capacity(self.columns.len());
        for column in self.columns.iter().filter(|c| !c.is_empty()) {
            let column = column.compile(template)?;
            wrapped.push(template.render(
                TemplateKey::ReturningColumn,
                &Slots::new().with("column", column),
            )?);
        }
        let columns = wrapped.join(&template.literal(TemplateKey::ColumnSeparator)?);
        template.render(TemplateKey::Returning, &Slots::new().with("columns", columns))
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct GroupBy {
    columns: Columns,
    fingerprint: FingerprintSlot,
}

impl GroupBy {
    #[must_use]
    pub fn new(columns: Columns) -> Self {
        Self {
            columns,
            fingerprint: FingerprintSlot::new(),
        }
    }
}

impl Fragment for GroupBy {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let columns = self.columns.compile(template)?;
        template.render(TemplateKey::GroupBy, &Slots::new().with("columns", columns))
    }

    fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::CachePolicy;

    #[test]
    fn dotted_paths_and_aliases() {
        let template = crate::postgres::template();
        assert_eq!(
            Column::new("u.name AS author").compile(template).unwrap(),
            r#""u"."name" AS "author""#
        );
        assert_eq!(Column::new("u.*").compile(template).unwrap(), r#""u".*"#);
        assert_eq!(Column::new("*").compile(template).unwrap(), "*");
    }

    #[test]
    fn expressions_are_left_alone() {
        let template = crate::postgres::template();
        assert_eq!(
            Column::new("COUNT(*) AS total").compile(template).unwrap(),
            r#"COUNT(*) AS "total""#
        );
    }

    #[test]
    fn returning_wraps_each_column_per_dialect() {
        let columns = Columns::from_names(["id", "created_at"]);
        let pg = crate::postgres::build_template(CachePolicy::Unbounded);
        let ms = crate::mssql::build_template(CachePolicy::Unbounded);
        assert_eq!(
            Returning::new(columns.clone()).compile(&pg).unwrap(),
            r#"RETURNING "id", "created_at""#
        );
        assert_eq!(
            Returning::new(columns).compile(&ms).unwrap(),
            "OUTPUT INSERTED.[id], INSERTED.[created_at]"
        );
    }

    #[test]
    fn empty_group_by_vanishes() {
        let template = crate::postgres::template();
        assert_eq!(GroupBy::default().compile(template).unwrap(), "");
        assert_eq!(
            GroupBy::new(Columns::from_names(["team"])).compile(template).unwrap(),
            r#"GROUP BY "team""#
        );
    }
}
