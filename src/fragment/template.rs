use std::collections::HashMap;
use std::fmt;

use super::cache::{CachePolicy, FragmentCache};
use super::layout::{Layout, Slots};
use crate::error::CompileError;

/// One layout per fragment kind (plus quoting and separator snippets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateKey {
    IdentifierQuote,
    ValueQuote,

    ColumnSeparator,
    ValueSeparator,
    AndSeparator,
    OrSeparator,
    AssignmentSeparator,

    ClauseGroup,
    ColumnAlias,
    TableAlias,
    ValueGroup,
    ColumnValue,
    SortAsc,
    SortDesc,
    OrderBy,
    /// Ordering injected when a dialect needs `ORDER BY` for paging and none was given.
    DefaultOrderBy,
    GroupBy,
    Where,
    Join,
    Returning,
    ReturningColumn,
    Distinct,

    Select,
    Insert,
    Update,
    Delete,
    Count,
    Truncate,
    DropTable,
}

/// A dialect's template set: layouts, quoting rules and the compiled-fragment cache.
pub struct Template {
    name: String,
    layouts: HashMap<TemplateKey, Layout>,
    identifier_escape: (char, String),
    value_escape: (char, String),
    cache: FragmentCache,
}

impl Template {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TemplateBuilder {
        TemplateBuilder {
            name: name.into(),
            layouts: HashMap::new(),
            identifier_escape: ('"', "\"\"".to_string()),
            value_escape: ('\'', "''".to_string()),
            policy: CachePolicy::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn layout(&self, key: TemplateKey) -> Option<&Layout> {
        self.layouts.get(&key)
    }

    #[must_use]
    pub fn has_layout(&self, key: TemplateKey) -> bool {
        self.layouts.contains_key(&key)
    }

    /// Render the layout registered for `key`.
    ///
    /// # Errors
    /// `MissingTemplate` if the set has no layout for `key`, `UnknownSlot` if the layout asks
    /// for a slot not present in `slots`.
    pub fn render(&self, key: TemplateKey, slots: &Slots) -> Result<String, CompileError> {
        self.layouts
            .get(&key)
            .ok_or(CompileError::MissingTemplate(key))?
            .render(key, slots)
    }

    /// Render a slot-free layout such as a separator.
    ///
    /// # Errors
    /// See [`Template::render`].
    pub fn literal(&self, key: TemplateKey) -> Result<String, CompileError> {
        self.render(key, &Slots::new())
    }

    /// # Errors
    /// `MissingTemplate` when the set has no `IdentifierQuote` layout.
    pub fn quote_identifier(&self, name: &str) -> Result<String, CompileError> {
        let (needle, replacement) = &self.identifier_escape;
        let escaped = name.replace(*needle, replacement);
        self.render(TemplateKey::IdentifierQuote, &Slots::new().with("value", escaped))
    }

    /// # Errors
    /// `MissingTemplate` when the set has no `ValueQuote` layout.
    pub fn quote_value(&self, value: &str) -> Result<String, CompileError> {
        let (needle, replacement) = &self.value_escape;
        let escaped = value.replace(*needle, replacement);
        self.render(TemplateKey::ValueQuote, &Slots::new().with("value", escaped))
    }

    #[must_use]
    pub fn cache(&self) -> &FragmentCache {
        &self.cache
    }

    /// Same layouts under a different cache policy, with an empty cache.
    #[must_use]
    pub fn with_cache_policy(&self, policy: CachePolicy) -> Self {
        Self {
            name: self.name.clone(),
            layouts: self.layouts.clone(),
            identifier_escape: self.identifier_escape.clone(),
            value_escape: self.value_escape.clone(),
            cache: FragmentCache::new(policy),
        }
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("layouts", &self.layouts.len())
            .field("cache", &self.cache)
            .finish()
    }
}

pub struct TemplateBuilder {
    name: String,
    layouts: HashMap<TemplateKey, Layout>,
    identifier_escape: (char, String),
    value_escape: (char, String),
    policy: CachePolicy,
}

impl TemplateBuilder {
    #[must_use]
    pub fn layout(mut self, key: TemplateKey, source: &str) -> Self {
        self.layouts.insert(key, Layout::parse(source));
        self
    }

    #[must_use]
    pub fn layouts<'a>(mut self, entries: impl IntoIterator<Item = (TemplateKey, &'a str)>) -> Self {
        for (key, source) in entries {
            self.layouts.insert(key, Layout::parse(source));
        }
        self
    }

    /// Character doubled (or otherwise replaced) inside quoted identifiers.
    #[must_use]
    pub fn identifier_escape(mut self, needle: char, replacement: impl Into<String>) -> Self {
        self.identifier_escape = (needle, replacement.into());
        self
    }

    #[must_use]
    pub fn value_escape(mut self, needle: char, replacement: impl Into<String>) -> Self {
        self.value_escape = (needle, replacement.into());
        self
    }

    #[must_use]
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn build(self) -> Template {
        Template {
            name: self.name,
            layouts: self.layouts,
            identifier_escape: self.identifier_escape,
            value_escape: self.value_escape,
            cache: FragmentCache::new(self.policy),
        }
    }
}
