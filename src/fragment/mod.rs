//! Dialect-neutral SQL fragments and the template compiler that renders them.
//!
//! A fragment tree is compiled against a [`Template`]: every node renders through one layout of
//! the template set and its compiled text is memoized in the template's [`FragmentCache`] under
//! the node's fingerprint. Arguments never appear in fragments; values are written as the
//! neutral `?` marker and rewritten per dialect afterwards.
//!
//! ```rust
//! use sql_adapter::fragment::{Fragment, Statement, Table, Where, Condition, ColumnValue};
//!
//! let stmt = Statement::delete(Table::new("users"))
//!     .with_where(Where::new(vec![Condition::Column(ColumnValue::placeholder("id", "="))]));
//! let sql = stmt.compile(sql_adapter::postgres::template()).unwrap();
//! assert_eq!(sql, r#"DELETE FROM "users" WHERE "id" = ?"#);
//! ```

use std::hash::Hash;
use std::sync::Arc;

mod cache;
mod column;
mod condition;
mod fingerprint;
mod join;
mod layout;
mod order;
mod statement;
mod table;
mod template;
mod value;

pub use cache::{CachePolicy, CacheStats, FragmentCache};
pub use column::{Column, Columns, GroupBy, Returning};
pub(crate) use column::quote_path;
pub use condition::{ColumnValue, ColumnValues, Condition, ConditionGroup, Logical, Operand, Where};
pub use fingerprint::{FingerprintSlot, fingerprint_of};
pub use join::{Join, JoinKind, Joins};
pub use layout::{Layout, Slots};
pub use order::{Order, OrderBy, SortColumn};
pub use statement::{Statement, StatementKind};
pub use table::Table;
pub use template::{Template, TemplateBuilder, TemplateKey};
pub use value::{Raw, Value, ValueGroup, ValueGroups};

use crate::error::CompileError;

/// A node of SQL syntax that can be compiled against a template set.
pub trait Fragment: Hash + Send + Sync {
    fn fingerprint_slot(&self) -> &FingerprintSlot;

    /// Render this node without consulting the cache. Children are compiled (and cached)
    /// through [`Fragment::compile`].
    ///
    /// # Errors
    /// Any `CompileError` raised by this node's layout or its children.
    fn render(&self, template: &Template) -> Result<String, CompileError>;

    fn is_empty(&self) -> bool {
        false
    }

    /// Kind identifier plus structural hash, memoized in the fragment's own slot.
    fn fingerprint(&self) -> Arc<str> {
        self.fingerprint_slot().get_or_init(|| fingerprint_of(self))
    }

    /// Compile through the template's cache. Empty fragments compile to `""`.
    ///
    /// # Errors
    /// Any `CompileError` raised while rendering; failures are never cached.
    fn compile(&self, template: &Template) -> Result<String, CompileError> {
        if self.is_empty() {
            return Ok(String::new());
        }
        let compiled = template
            .cache()
            .get_or_compute(self.fingerprint(), || self.render(template))?;
        Ok(compiled.to_string())
    }

    /// Forget the memoized fingerprint.
    fn reset(&self) {
        self.fingerprint_slot().reset();
    }
}

/// Compile every non-empty item and join the results with the `separator` layout.
pub(crate) fn compile_joined<F: Fragment>(
    items: &[F],
    template: &Template,
    separator: TemplateKey,
) -> Result<String, CompileError> {
    let parts = items
        .iter()
        .filter(|item| !item.is_empty())
        .map(|item| item.compile(template))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.is_empty() {
        return Ok(String::new());
    }
    if parts.len() == 1 {
        return Ok(parts.into_iter().next().unwrap_or_default());
    }
    Ok(parts.join(&template.literal(separator)?))
}
