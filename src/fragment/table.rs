use lazy_static::lazy_static;
use regex::Regex;

use super::column::quote_path;
use super::layout::Slots;
use super::{Fragment, FingerprintSlot, Template, TemplateKey};
use crate::error::CompileError;

lazy_static! {
    static ref TABLE_ALIAS: Regex =
        Regex::new(r"(?i)^(\S+)\s+(?:as\s+)?(\S+)$").expect("static table alias pattern");
}

/// One or more comma-separated table references, each optionally aliased.
///
/// `"users u"`, `"users AS u"` and `"public.users"` are all accepted.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct Table {
    name: String,
    fingerprint: FingerprintSlot,
}

impl Table {
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

    fn render_one(template: &Template, reference: &str) -> Result<String, CompileError> {
        if let Some(caps) = TABLE_ALIAS.captures(reference) {
            let table = quote_path(template, &caps[1])?;
            let alias = template.quote_identifier(&caps[2])?;
            return template.render(
                TemplateKey::TableAlias,
                &Slots::new().with("table", table).with("alias", alias),
            );
        }
        quote_path(template, reference)
    }
}

impl Fragment for Table {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let parts = self
            .name
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| Self::render_one(template, part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(&template.literal(TemplateKey::ColumnSeparator)?))
    }

    fn is_empty(&self) -> bool {
        self.name.trim().is_empty()
    }
}

impl From<&str> for Table {
    fn from(name: &str) -> Self {
        Table::new(name)
    }
}
