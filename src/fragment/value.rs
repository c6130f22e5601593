use super::{Fragment, FingerprintSlot, Template, TemplateKey, compile_joined};
use crate::error::CompileError;
use crate::fragment::layout::Slots;

/// Verbatim SQL text. Never quoted or rewritten by the compiler.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Raw {
    sql: String,
    fingerprint: FingerprintSlot,
}

impl Raw {
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl Fragment for Raw {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, _template: &Template) -> Result<String, CompileError> {
        Ok(self.sql.clone())
    }

    fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum ValueKind {
    Placeholder,
    Literal(String),
    Raw(String),
}

/// A single value position: an argument marker, a quoted literal or raw text.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Value {
    kind: ValueKind,
    fingerprint: FingerprintSlot,
}

impl Value {
    fn from_kind(kind: ValueKind) -> Self {
        Self {
            kind,
            fingerprint: FingerprintSlot::new(),
        }
    }

    /// The neutral `?` argument marker.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::from_kind(ValueKind::Placeholder)
    }

    /// A string literal quoted by the template's `ValueQuote` layout.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self::from_kind(ValueKind::Literal(text.into()))
    }

    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::from_kind(ValueKind::Raw(sql.into()))
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self.kind, ValueKind::Placeholder)
    }
}

impl Fragment for Value {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        match &self.kind {
            ValueKind::Placeholder => Ok("?".to_string()),
            ValueKind::Literal(text) => template.quote_value(text),
            ValueKind::Raw(sql) => Ok(sql.clone()),
        }
    }
}

/// A parenthesized list of values, e.g. one row of `VALUES` or the right side of `IN`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct ValueGroup {
    values: Vec<Value>,
    fingerprint: FingerprintSlot,
}

impl ValueGroup {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn placeholders(count: usize) -> Self {
        Self::new((0..count).map(|_| Value::placeholder()).collect())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
        self.fingerprint.reset();
    }
}

impl Fragment for ValueGroup {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let values = compile_joined(&self.values, template, TemplateKey::ValueSeparator)?;
        template.render(TemplateKey::ValueGroup, &Slots::new().with("values", values))
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Several value groups, as in a multi-row `INSERT ... VALUES (..), (..)`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct ValueGroups {
    groups: Vec<ValueGroup>,
    fingerprint: FingerprintSlot,
}

impl ValueGroups {
    #[must_use]
    pub fn new(groups: Vec<ValueGroup>) -> Self {
        Self {
            groups,
            fingerprint: FingerprintSlot::new(),
        }
    }

    pub fn push(&mut self, group: ValueGroup) {
        self.groups.push(group);
        self.fingerprint.reset();
    }
}

impl Fragment for ValueGroups {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        compile_joined(&self.groups, template, TemplateKey::ValueSeparator)
    }

    fn is_empty(&self) -> bool {
        self.groups.iter().all(ValueGroup::is_empty)
    }
}
