use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use super::row::{Row, index_columns};
use crate::error::SqlAdapterError;
use crate::types::RowValues;

/// The rows returned by a query, plus the affected-row count for write statements.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    rows: Vec<Row>,
    /// The number of rows affected (for DML statements)
    pub rows_affected: u64,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    #[must_use]
    pub fn new(column_names: Vec<String>) -> Self {
        Self::with_capacity(column_names, 0)
    }

    #[must_use]
    pub fn with_capacity(column_names: Vec<String>, capacity: usize) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            rows: Vec::with_capacity(capacity),
            rows_affected: 0,
            column_names: Arc::new(column_names),
            column_index,
        }
    }

    /// Build a result set from column names and row values in one go.
    #[must_use]
    pub fn from_rows(column_names: Vec<String>, rows: Vec<Vec<RowValues>>) -> Self {
        let mut set = Self::with_capacity(column_names, rows.len());
        for values in rows {
            set.push_row(values);
        }
        set
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn push_row(&mut self, values: Vec<RowValues>) {
        self.rows.push(Row::with_index(
            Arc::clone(&self.column_names),
            Arc::clone(&self.column_index),
            values,
        ));
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Decode every row into `T`.
    ///
    /// # Errors
    /// `ParameterError` on the first row that does not fit `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>, SqlAdapterError> {
        self.rows.iter().map(Row::decode).collect()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
