use lazy_static::lazy_static;

use crate::fragment::{CachePolicy, Template, TemplateKey};

const LAYOUTS: &[(TemplateKey, &str)] = &[
    (TemplateKey::IdentifierQuote, r#""{value}""#),
    (TemplateKey::ValueQuote, "'{value}'"),
    (TemplateKey::ColumnSeparator, ", "),
    (TemplateKey::ValueSeparator, ", "),
    (TemplateKey::AndSeparator, " AND "),
    (TemplateKey::OrSeparator, " OR "),
    (TemplateKey::AssignmentSeparator, ", "),
    (TemplateKey::ClauseGroup, "({clause})"),
    (TemplateKey::ColumnAlias, "{column} AS {alias}"),
    (TemplateKey::TableAlias, "{table} AS {alias}"),
    (TemplateKey::ValueGroup, "({values})"),
    (TemplateKey::ColumnValue, "{column} {operator}[[ {value}]]"),
    (TemplateKey::SortAsc, "{column} ASC"),
    (TemplateKey::SortDesc, "{column} DESC"),
    (TemplateKey::OrderBy, "[[ORDER BY {columns}]]"),
    (TemplateKey::GroupBy, "[[GROUP BY {columns}]]"),
    (TemplateKey::Where, "[[WHERE {conditions}]]"),
    (
        TemplateKey::Join,
        "{type} JOIN {table} [[ON {on}]] [[USING ({using})]]",
    ),
    (TemplateKey::Returning, "[[RETURNING {columns}]]"),
    (TemplateKey::ReturningColumn, "{column}"),
    (TemplateKey::Distinct, "DISTINCT"),
    (
        TemplateKey::Select,
        "SELECT [[{distinct}]] {columns} [[FROM {table}]] {joins} {where} {group_by} {order_by} \
         [[LIMIT {limit}]] [[OFFSET {offset}]]",
    ),
    (
        TemplateKey::Insert,
        "INSERT INTO {table} [[({columns})]] [[VALUES {values}||DEFAULT VALUES]] [[{returning}]]",
    ),
    (
        TemplateKey::Update,
        "UPDATE {table} SET {assignments} {where} [[{returning}]]",
    ),
    (TemplateKey::Delete, "DELETE FROM {table} {where}"),
    (
        TemplateKey::Count,
        "SELECT COUNT(1) AS _t FROM {table} {joins} {where}",
    ),
    (TemplateKey::Truncate, "TRUNCATE TABLE {table} RESTART IDENTITY"),
    (TemplateKey::DropTable, "DROP TABLE {table}"),
];

/// PostgreSQL template set with its own cache.
#[must_use]
pub fn build_template(policy: CachePolicy) -> Template {
    Template::builder("postgresql")
        .layouts(LAYOUTS.iter().copied())
        .identifier_escape('"', r#""""#)
        .value_escape('\'', "''")
        .cache_policy(policy)
        .build()
}

lazy_static! {
    static ref TEMPLATE: Template = build_template(CachePolicy::Unbounded);
}

/// The process-wide PostgreSQL template set.
#[must_use]
pub fn template() -> &'static Template {
    &TEMPLATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_statement_kind_has_a_layout() {
        let template = template();
        for key in [
            TemplateKey::Select,
            TemplateKey::Insert,
            TemplateKey::Update,
            TemplateKey::Delete,
            TemplateKey::Count,
            TemplateKey::Truncate,
            TemplateKey::DropTable,
        ] {
            assert!(template.has_layout(key), "{key:?}");
        }
        assert!(!template.has_layout(TemplateKey::DefaultOrderBy));
    }

    #[test]
    fn quotes_embedded_quotes() {
        assert_eq!(
            template().quote_identifier(r#"we"ird"#).unwrap(),
            r#""we""ird""#
        );
        assert_eq!(template().quote_value("it's").unwrap(), "'it''s'");
    }
}
