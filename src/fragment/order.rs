use super::layout::Slots;
use super::{Column, Fragment, FingerprintSlot, Template, TemplateKey, compile_joined};
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default)]
pub enum Order {
    /// No explicit direction; the database default applies.
    #[default]
    Default,
    Asc,
    Desc,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct SortColumn {
    column: Column,
    order: Order,
    fingerprint: FingerprintSlot,
}

impl SortColumn {
    #[must_use]
    pub fn new(column: impl Into<Column>, order: Order) -> Self {
        Self {
            column: column.into(),
            order,
            fingerprint: FingerprintSlot::new(),
        }
    }

    /// `"-name"` sorts descending, `"name"` uses the default direction.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        match spec.strip_prefix('-') {
            Some(rest) => Self::new(rest.trim(), Order::Desc),
            None => Self::new(spec, Order::Default),
        }
    }
}

impl Fragment for SortColumn {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let column = self.column.compile(template)?;
        let key = match self.order {
            Order::Default => return Ok(column),
            Order::Asc => TemplateKey::SortAsc,
            Order::Desc => TemplateKey::SortDesc,
        };
        template.render(key, &Slots::new().with("column", column))
    }

    fn is_empty(&self) -> bool {
        self.column.is_empty()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct OrderBy {
    columns: Vec<SortColumn>,
    fingerprint: FingerprintSlot,
}

impl OrderBy {
    #[must_use]
    pub fn new(columns: Vec<SortColumn>) -> Self {
        Self {
            columns,
            fingerprint: FingerprintSlot::new(),
        }
    }

    pub fn push(&mut self, column: SortColumn) {
        self.columns.push(column);
        self.fingerprint.reset();
    }
}

impl Fragment for OrderBy {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let columns = compile_joined(&self.columns, template, TemplateKey::ColumnSeparator)?;
        template.render(TemplateKey::OrderBy, &Slots::new().with("columns", columns))
    }

    fn is_empty(&self) -> bool {
        self.columns.iter().all(SortColumn::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minus_prefix_means_descending() {
        let template = crate::postgres::template();
        let order = OrderBy::new(vec![
            SortColumn::parse("-created_at"),
            SortColumn::parse("name"),
            SortColumn::new("id", Order::Asc),
        ]);
        assert_eq!(
            order.compile(template).unwrap(),
            r#"ORDER BY "created_at" DESC, "name", "id" ASC"#
        );
    }
}
