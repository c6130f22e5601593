use super::layout::Slots;
use super::{
    Column, Fragment, FingerprintSlot, Raw, Template, TemplateKey, Value, ValueGroup,
    compile_joined,
};
use crate::error::CompileError;

/// Right-hand side of a comparison.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Operand {
    Value(Value),
    Group(ValueGroup),
    Column(Column),
    Raw(Raw),
}

impl Operand {
    fn compile(&self, template: &Template) -> Result<String, CompileError> {
        match self {
            Operand::Value(value) => value.compile(template),
            Operand::Group(group) if group.is_empty() => Ok("(NULL)".to_string()),
            Operand::Group(group) => group.compile(template),
            Operand::Column(column) => column.compile(template),
            Operand::Raw(raw) => raw.compile(template),
        }
    }
}

/// `column operator operand`, or `column operator` for unary tests such as `IS NULL`.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ColumnValue {
    column: Column,
    operator: String,
    operand: Option<Operand>,
    fingerprint: FingerprintSlot,
}

impl ColumnValue {
    #[must_use]
    pub fn new(column: impl Into<Column>, operator: impl Into<String>, operand: Option<Operand>) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            operand,
            fingerprint: FingerprintSlot::new(),
        }
    }

    /// `column operator ?`
    #[must_use]
    pub fn placeholder(column: impl Into<Column>, operator: impl Into<String>) -> Self {
        Self::new(column, operator, Some(Operand::Value(Value::placeholder())))
    }

    #[must_use]
    pub fn column(&self) -> &Column {
        &self.column
    }
}

impl Fragment for ColumnValue {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let column = self.column.compile(template)?;
        let value = match &self.operand {
            Some(operand) => operand.compile(template)?,
            None => String::new(),
        };
        template.render(
            TemplateKey::ColumnValue,
            &Slots::new()
                .with("column", column)
                .with("operator", self.operator.trim())
                .with("value", value),
        )
    }

    fn is_empty(&self) -> bool {
        self.column.is_empty()
    }
}

/// Assignment list for `UPDATE ... SET`.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct ColumnValues {
    values: Vec<ColumnValue>,
    fingerprint: FingerprintSlot,
}

impl ColumnValues {
    #[must_use]
    pub fn new(values: Vec<ColumnValue>) -> Self {
        Self {
            values,
            fingerprint: FingerprintSlot::new(),
        }
    }

    pub fn push(&mut self, value: ColumnValue) {
        self.values.push(value);
        self.fingerprint.reset();
    }
}

impl Fragment for ColumnValues {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        compile_joined(&self.values, template, TemplateKey::AssignmentSeparator)
    }

    fn is_empty(&self) -> bool {
        self.values.iter().all(ColumnValue::is_empty)
    }
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Default)]
pub enum Logical {
    #[default]
    And,
    Or,
}

impl Logical {
    fn separator(self) -> TemplateKey {
        match self {
            Logical::And => TemplateKey::AndSeparator,
            Logical::Or => TemplateKey::OrSeparator,
        }
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Condition {
    Column(ColumnValue),
    Raw(Raw),
    Group(ConditionGroup),
}

impl Condition {
    fn is_empty(&self) -> bool {
        match self {
            Condition::Column(cv) => cv.is_empty(),
            Condition::Raw(raw) => raw.is_empty(),
            Condition::Group(group) => group.is_empty(),
        }
    }

    /// Whether this condition needs parentheses when joined with siblings.
    fn needs_grouping(&self) -> bool {
        match self {
            Condition::Column(_) => false,
            Condition::Raw(_) => true,
            Condition::Group(group) => group.live_len() > 1,
        }
    }

    fn compile(&self, template: &Template) -> Result<String, CompileError> {
        match self {
            Condition::Column(cv) => cv.compile(template),
            Condition::Raw(raw) => raw.compile(template),
            Condition::Group(group) => group.compile(template),
        }
    }
}

/// Conditions joined by one logical operator. Nested groups with several members are
/// parenthesized.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct ConditionGroup {
    logical: Logical,
    conditions: Vec<Condition>,
    fingerprint: FingerprintSlot,
}

impl ConditionGroup {
    #[must_use]
    pub fn new(logical: Logical, conditions: Vec<Condition>) -> Self {
        Self {
            logical,
            conditions,
            fingerprint: FingerprintSlot::new(),
        }
    }

    #[must_use]
    pub fn and(conditions: Vec<Condition>) -> Self {
        Self::new(Logical::And, conditions)
    }

    #[must_use]
    pub fn or(conditions: Vec<Condition>) -> Self {
        Self::new(Logical::Or, conditions)
    }

    #[must_use]
    pub fn logical(&self) -> Logical {
        self.logical
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
        self.fingerprint.reset();
    }

    fn live_len(&self) -> usize {
        self.conditions.iter().filter(|c| !c.is_empty()).count()
    }
}

impl Fragment for ConditionGroup {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let live: Vec<&Condition> = self.conditions.iter().filter(|c| !c.is_empty()).collect();
        let several = live.len() > 1;
        let mut parts = Vec::with_capacity(live.len());
        for condition in live {
            let compiled = condition.compile(template)?;
            if several && condition.needs_grouping() {
                parts.push(template.render(
                    TemplateKey::ClauseGroup,
                    &Slots::new().with("clause", compiled),
                )?);
            } else {
                parts.push(compiled);
            }
        }
        if parts.len() <= 1 {
            return Ok(parts.pop().unwrap_or_default());
        }
        Ok(parts.join(&template.literal(self.logical.separator())?))
    }

    fn is_empty(&self) -> bool {
        self.live_len() == 0
    }
}

/// `WHERE` clause. Compiles to nothing when it holds no non-empty condition.
#[derive(Debug, Clone, Hash, PartialEq, Eq, Default)]
pub struct Where {
    group: ConditionGroup,
    fingerprint: FingerprintSlot,
}

impl Where {
    #[must_use]
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self::from_group(ConditionGroup::and(conditions))
    }

    #[must_use]
    pub fn from_group(group: ConditionGroup) -> Self {
        Self {
            group,
            fingerprint: FingerprintSlot::new(),
        }
    }

    pub fn push(&mut self, condition: Condition) {
        self.group.push(condition);
        self.fingerprint.reset();
    }
}

impl Fragment for Where {
    fn fingerprint_slot(&self) -> &FingerprintSlot {
        &self.fingerprint
    }

    fn render(&self, template: &Template) -> Result<String, CompileError> {
        let conditions = self.group.compile(template)?;
        template.render(TemplateKey::Where, &Slots::new().with("conditions", conditions))
    }

    fn is_empty(&self) -> bool {
        self.group.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(column: &str) -> Condition {
        Condition::Column(ColumnValue::placeholder(column, "="))
    }

    #[test]
    fn empty_where_has_no_keyword() {
        let template = crate::postgres::template();
        let empty = Where::new(vec![Condition::Group(ConditionGroup::or(vec![]))]);
        assert_eq!(empty.compile(template).unwrap(), "");
    }

    #[test]
    fn nested_groups_are_parenthesized() {
        let template = crate::postgres::template();
        let clause = Where::new(vec![
            eq("active"),
            Condition::Group(ConditionGroup::or(vec![eq("role"), eq("owner")])),
        ]);
        assert_eq!(
            clause.compile(template).unwrap(),
            r#"WHERE "active" = ? AND ("role" = ? OR "owner" = ?)"#
        );
    }

    #[test]
    fn single_member_group_is_not_parenthesized() {
        let template = crate::postgres::template();
        let clause = Where::new(vec![Condition::Group(ConditionGroup::or(vec![eq("id")]))]);
        assert_eq!(clause.compile(template).unwrap(), r#"WHERE "id" = ?"#);
    }

    #[test]
    fn unary_operator_and_raw_part() {
        let template = crate::postgres::template();
        let clause = Where::new(vec![
            Condition::Column(ColumnValue::new("deleted_at", "IS NULL", None)),
            Condition::Raw(Raw::new("score > 10 OR vip")),
        ]);
        assert_eq!(
            clause.compile(template).unwrap(),
            r#"WHERE "deleted_at" IS NULL AND (score > 10 OR vip)"#
        );
    }

    #[test]
    fn empty_in_list_never_matches() {
        let template = crate::postgres::template();
        let cv = ColumnValue::new("id", "IN", Some(Operand::Group(ValueGroup::default())));
        assert_eq!(cv.compile(template).unwrap(), r#""id" IN (NULL)"#);
    }
}
