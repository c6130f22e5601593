use crate::fragment::{
    Column, ColumnValue, Condition, ConditionGroup, Operand, Raw, ValueGroup,
};
use crate::types::RowValues;

/// Condition builder. Every value becomes a `?` argument; nothing is inlined into SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum Cond {
    Compare {
        column: String,
        operator: &'static str,
        value: RowValues,
    },
    Columns {
        left: String,
        operator: &'static str,
        right: String,
    },
    In {
        column: String,
        negated: bool,
        values: Vec<RowValues>,
    },
    Null {
        column: String,
        negated: bool,
    },
    Raw {
        sql: String,
        args: Vec<RowValues>,
    },
    And(Vec<Cond>),
    Or(Vec<Cond>),
}

impl Cond {
    fn compare(column: impl Into<String>, operator: &'static str, value: RowValues) -> Self {
        Cond::Compare {
            column: column.into(),
            operator,
            value,
        }
    }

    /// `column = value`; a NULL value becomes `column IS NULL`.
    #[must_use]
    pub fn eq(column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        match value.into() {
            RowValues::Null => Self::is_null(column),
            value => Self::compare(column, "=", value),
        }
    }

    /// `column <> value`; a NULL value becomes `column IS NOT NULL`.
    #[must_use]
    pub fn ne(column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        match value.into() {
            RowValues::Null => Self::is_not_null(column),
            value => Self::compare(column, "<>", value),
        }
    }

    #[must_use]
    pub fn gt(column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        Self::compare(column, ">", value.into())
    }

    #[must_use]
    pub fn gte(column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        Self::compare(column, ">=", value.into())
    }

    #[must_use]
    pub fn lt(column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        Self::compare(column, "<", value.into())
    }

    #[must_use]
    pub fn lte(column: impl Into<String>, value: impl Into<RowValues>) -> Self {
        Self::compare(column, "<=", value.into())
    }

    #[must_use]
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, "LIKE", RowValues::Text(pattern.into()))
    }

    #[must_use]
    pub fn not_like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::compare(column, "NOT LIKE", RowValues::Text(pattern.into()))
    }

    /// Compare two columns, e.g. for a join condition.
    #[must_use]
    pub fn columns_eq(left: impl Into<String>, right: impl Into<String>) -> Self {
        Cond::Columns {
            left: left.into(),
            operator: "=",
            right: right.into(),
        }
    }

    /// `column IN (...)`. An empty list matches nothing.
    #[must_use]
    pub fn in_list<V: Into<RowValues>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Cond::In {
            column: column.into(),
            negated: false,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `column NOT IN (...)`. An empty list filters nothing.
    #[must_use]
    pub fn not_in<V: Into<RowValues>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Cond::In {
            column: column.into(),
            negated: true,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_null(column: impl Into<String>) -> Self {
        Cond::Null {
            column: column.into(),
            negated: false,
        }
    }

    #[must_use]
    pub fn is_not_null(column: impl Into<String>) -> Self {
        Cond::Null {
            column: column.into(),
            negated: true,
        }
    }

    /// Raw SQL with `?` markers, one per entry of `args`.
    #[must_use]
    pub fn raw(sql: impl Into<String>, args: Vec<RowValues>) -> Self {
        Cond::Raw {
            sql: sql.into(),
            args,
        }
    }

    #[must_use]
    pub fn all(conds: Vec<Cond>) -> Self {
        Cond::And(conds)
    }

    #[must_use]
    pub fn any(conds: Vec<Cond>) -> Self {
        Cond::Or(conds)
    }

    #[must_use]
    pub fn and(self, other: Cond) -> Self {
        match self {
            Cond::And(mut conds) => {
                conds.push(other);
                Cond::And(conds)
            }
            first => Cond::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Cond) -> Self {
        match self {
            Cond::Or(mut conds) => {
                conds.push(other);
                Cond::Or(conds)
            }
            first => Cond::Or(vec![first, other]),
        }
    }

    /// Lower into a condition fragment, appending arguments to `args` in textual order.
    pub(crate) fn lower(self, args: &mut Vec<RowValues>) -> Condition {
        match self {
            Cond::Compare {
                column,
                operator,
                value,
            } => {
                args.push(value);
                Condition::Column(ColumnValue::placeholder(column, operator))
            }
            Cond::Columns {
                left,
                operator,
                right,
            } => Condition::Column(ColumnValue::new(
                left,
                operator,
                Some(Operand::Column(Column::new(right))),
            )),
            Cond::In {
                negated: true,
                values,
                ..
            } if values.is_empty() => Condition::Raw(Raw::new("")),
            Cond::In {
                column,
                negated,
                values,
            } => {
                let group = ValueGroup::placeholders(values.len());
                args.extend(values);
                let operator = if negated { "NOT IN" } else { "IN" };
                Condition::Column(ColumnValue::new(column, operator, Some(Operand::Group(group))))
            }
            Cond::Null { column, negated } => {
                let operator = if negated { "IS NOT NULL" } else { "IS NULL" };
                Condition::Column(ColumnValue::new(column, operator, None))
            }
            Cond::Raw { sql, args: raw_args } => {
                args.extend(raw_args);
                Condition::Raw(Raw::new(sql))
            }
            Cond::And(conds) => Condition::Group(ConditionGroup::and(
                conds.into_iter().map(|c| c.lower(args)).collect(),
            )),
            Cond::Or(conds) => Condition::Group(ConditionGroup::or(
                conds.into_iter().map(|c| c.lower(args)).collect(),
            )),
        }
    }

    /// Lower into a top-level `AND` group.
    pub(crate) fn lower_group(self, args: &mut Vec<RowValues>) -> ConditionGroup {
        match self.lower(args) {
            Condition::Group(group) => group,
            single => ConditionGroup::and(vec![single]),
        }
    }
}
