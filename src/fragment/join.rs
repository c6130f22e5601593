use super::layout::Slots;
use super::{Columns, ConditionGroup, Fragment, FingerprintSlot, Table, Template, TemplateKey};
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
            JoinKind::Cross => "CROSS",
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Join {
    kind: JoinKind,
    table: Table,
    on: ConditionGroup,
    using: Columns,
    fingerprint: FingerprintSlot,
}

impl Join {
    #[must_use]
    pub fn new(kind: JoinKind, table: impl Into<Table>) -> Self {
        Self {
            kind,
            table: table.into(),
            on: ConditionGroup::default(),
            using: Columns::default(),
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn on(mut self, on: ConditionGroup) -> Self {
        self.on = on;
        self.fingerprint.reset();
        self
    }

    #[must_use]
    pub fn using(mut self, using: Columns) -> Self {
        self.using = using;
        self.fingerprint.reset();
        self
    }
}

impl Fragment for Join {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        if self.table.is_empty() {
            return Err(CompileError::Malformed("join without a table".to_string()));
        }
        let slots = Slots::new()
            .with("type", self.kind.as_sql())
            .with("table", self.table.compile(template)?)
            .with("on", self.on.compile(template)?)
            .with("using", self.using.compile(template)?);
        Ok(template.render(TemplateKey::Join, &slots)?.trim().to_string())
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct Joins {
    joins: Vec<Join>,
    fingerprint: FingerprintSlot,
}

impl Joins {
    #[must_use]
    pub fn new(joins: Vec<Join>) -> Self {
        Self {
            joins,
            fingerprint: FingerprintSlot::new(),
        }
    }

    pub fn push(&mut self, join: Join) {
        self.joins.push(join);
        self.fingerprint.reset();
    }
}

impl Fragment for Joins {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let parts = self
            .joins
            .iter()
            .map(|join| join.compile(template))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(" "))
    }

    fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }
}
