//! Row-oriented in-memory table with an explicit column list.

use crate::value::Value;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use thiserror::Error;

/// Schema violations detected when a table is built or checked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("row {row} has {found} values but the table has {expected} columns")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("column '{0}' not found")]
    UnknownColumn(String),
}

static MISSING: Value = Value::Null;

/// One record. Values are positional, aligned with [`Table::columns`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row(values)
    }
}

/// An ordered sequence of rows sharing one column list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Build a table, rejecting duplicate column names and ragged rows.
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Result<Self, TableError> {
        let mut seen = HashSet::with_capacity(columns.len());
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }
        for (i, row) in rows.iter().enumerate() {
            if row.0.len() != columns.len() {
                return Err(TableError::RowWidth {
                    row: i,
                    expected: columns.len(),
                    found: row.0.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Build a table from `(column, value)` records, e.g. parsed JSON objects.
    ///
    /// Columns are taken in first-seen order across all records; a record that lacks
    /// a column gets `Null` there. A record repeating a column keeps the last value.
    pub fn from_records<I, R, K>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut columns: Vec<String> = Vec::new();
        let mut rows: Vec<Vec<Value>> = Vec::new();
        for record in records {
            let mut values = vec![Value::Null; columns.len()];
            for (name, value) in record {
                let name = name.into();
                let idx = match columns.iter().position(|c| *c == name) {
                    Some(idx) => idx,
                    None => {
                        columns.push(name);
                        columns.len() - 1
                    }
                };
                if idx >= values.len() {
                    values.resize(idx + 1, Value::Null);
                }
                values[idx] = value;
            }
            rows.push(values);
        }
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut values| {
                values.resize(width, Value::Null);
                Row(values)
            })
            .collect();
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Fail with [`TableError::UnknownColumn`] for the first name that is not a column.
    ///
    /// Table operations treat unknown columns as all-missing; callers that take column
    /// names from users check them here first.
    pub fn require_columns<S: AsRef<str>>(&self, names: &[S]) -> Result<(), TableError> {
        for name in names {
            let name = name.as_ref();
            if self.column_index(name).is_none() {
                return Err(TableError::UnknownColumn(name.to_string()));
            }
        }
        Ok(())
    }

    /// Value at `row` in column `name`. Unknown columns and rows read as missing.
    pub fn value(&self, row: usize, name: &str) -> &Value {
        self.column_index(name)
            .and_then(|ci| self.rows.get(row)?.get(ci))
            .unwrap_or(&MISSING)
    }

    /// Iterate over one column. Yields `Null` for every row when the column is unknown.
    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Value> + 'a {
        let ci = self.column_index(name);
        self.rows.iter().map(move |row| match ci {
            Some(ci) => &row.0[ci],
            None => &MISSING,
        })
    }

    /// Replace column `name` with `values`, appending it when the table lacks it.
    ///
    /// `values` is aligned with the rows: extra values are dropped and missing ones
    /// become `Null`.
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) {
        let ci = match self.column_index(name) {
            Some(ci) => ci,
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.0.push(Value::Null);
                }
                self.columns.len() - 1
            }
        };
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.0[ci] = values.next().unwrap_or_default();
        }
    }

    /// First `n` rows, for previews.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Keep rows for which `keep` returns true.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&Table, usize) -> bool,
    {
        let rows = (0..self.rows.len())
            .filter(|&i| keep(self, i))
            .map(|i| self.rows[i].clone())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub(crate) fn from_parts_unchecked(columns: Vec<String>, rows: Vec<Row>) -> Self {
        debug_assert!(rows.iter().all(|r| r.0.len() == columns.len()));
        Self { columns, rows }
    }
}

/// Serializes as an array of `{column: value}` objects, the shape chart front ends expect.
impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RecordRef {
                columns: &self.columns,
                row,
            })?;
        }
        seq.end()
    }
}

struct RecordRef<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl Serialize for RecordRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in self.columns.iter().zip(&self.row.0) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Build a table inline: `table!["date", "x"; ["2024-01-01", 1], ["2024-01-02", 2]]`.
///
/// Panics on ragged rows; intended for tests and small fixtures.
#[macro_export]
macro_rules! table {
    ($($col:expr),* $(,)? ; $([$($val:expr),* $(,)?]),* $(,)?) => {
        $crate::Table::new(
            vec![$(String::from($col)),*],
            vec![$($crate::Row(vec![$($crate::Value::from($val)),*])),*],
        )
        .expect("table! literal must be rectangular")
    };
}
