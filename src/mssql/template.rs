use lazy_static::lazy_static;

use crate::fragment::{CachePolicy, Template, TemplateKey};

// Paging goes through OFFSET/FETCH, which needs an ORDER BY; TOP covers a bare limit.
const LAYOUTS: &[(TemplateKey, &str)] = &[
    (TemplateKey::IdentifierQuote, "[{value}]"),
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
    (TemplateKey::DefaultOrderBy, "ORDER BY (SELECT NULL)"),
    (TemplateKey::GroupBy, "[[GROUP BY {columns}]]"),
    (TemplateKey::Where, "[[WHERE {conditions}]]"),
    (
        TemplateKey::Join,
        "{type} JOIN {table} [[ON {on}]] [[USING ({using})]]",
    ),
    (TemplateKey::Returning, "[[OUTPUT {columns}]]"),
    (TemplateKey::ReturningColumn, "INSERTED.{column}"),
    (TemplateKey::Distinct, "DISTINCT"),
    (
        TemplateKey::Select,
        "SELECT [[{distinct}]] [[TOP ({top})]] {columns} [[FROM {table}]] {joins} {where} \
         {group_by} {order_by} [[OFFSET {offset} ROWS [[FETCH NEXT {fetch} ROWS ONLY]]]]",
    ),
    (
        TemplateKey::Insert,
        "INSERT INTO {table} [[({columns})]] [[{returning}]] [[VALUES {values}||DEFAULT VALUES]]",
    ),
    (
        TemplateKey::Update,
        "UPDATE {table} SET {assignments} [[{returning}]] {where}",
    ),
    (TemplateKey::Delete, "DELETE FROM {table} {where}"),
    (
        TemplateKey::Count,
        "SELECT COUNT(1) AS _t FROM {table} {joins} {where}",
    ),
    (TemplateKey::Truncate, "TRUNCATE TABLE {table}"),
    (TemplateKey::DropTable, "DROP TABLE {table}"),
];

/// SQL Server template set with its own cache.
#[must_use]
pub fn build_template(policy: CachePolicy) -> Template {
    Template::builder("mssql")
        .layouts(LAYOUTS.iter().copied())
        .identifier_escape(']', "]]")
        .value_escape('\'', "''")
        .cache_policy(policy)
        .build()
}

lazy_static! {
    static ref TEMPLATE: Template = build_template(CachePolicy::Unbounded);
}

/// The process-wide SQL Server template set.
#[must_use]
pub fn template() -> &'static Template {
    &TEMPLATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brackets_are_escaped() {
        assert_eq!(template().quote_identifier("a]b").unwrap(), "[a]]b]");
    }

    #[test]
    fn paging_needs_default_order() {
        assert!(template().has_layout(TemplateKey::DefaultOrderBy));
    }
}
