//! Rows and batches of rows passed between operators of a pipeline.

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::operators::scalar::value::ScalarValue;

/// Identifies a row in a table storage.
pub type RowId = u64;

/// A row of values. Values are stored in the order of the output columns of the operator that produced the row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    values: Vec<ScalarValue>,
    /// The row of a table this row has been read from. Only set for rows produced by table scans.
    row_id: Option<RowId>,
}

impl Row {
    pub fn new(values: Vec<ScalarValue>) -> Self {
        Row { values, row_id: None }
    }

    /// Creates a row read from the given row of a table.
    pub fn with_row_id(values: Vec<ScalarValue>, row_id: RowId) -> Self {
        Row {
            values,
            row_id: Some(row_id),
        }
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.values
    }

    /// Returns the value at the given position.
    ///
    /// # Panics
    ///
    /// This method panics if the position is out of bounds.
    pub fn get(&self, i: usize) -> &ScalarValue {
        &self.values[i]
    }

    pub fn row_id(&self) -> Option<RowId> {
        self.row_id
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns a row that consists of values of this row followed by values of the `right` row.
    pub fn concat(&self, right: &[ScalarValue]) -> Row {
        let mut values = Vec::with_capacity(self.values.len() + right.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(right);
        Row::new(values)
    }
}

impl Display for Row {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.values.iter().join(", "))
    }
}

impl From<Vec<ScalarValue>> for Row {
    fn from(values: Vec<ScalarValue>) -> Self {
        Row::new(values)
    }
}

/// A batch of rows. Each row of a batch is either valid or invalid.
/// Operators skip invalid rows, so a filter can drop a row by marking it invalid.
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    rows: Vec<Row>,
    valid: Vec<bool>,
}

impl RowBatch {
    /// Creates a batch in which all rows are valid.
    pub fn new(rows: Vec<Row>) -> Self {
        let valid = vec![true; rows.len()];
        RowBatch { rows, valid }
    }

    /// Creates an empty batch that can hold the given number of rows without reallocation.
    pub fn with_capacity(capacity: usize) -> Self {
        RowBatch {
            rows: Vec::with_capacity(capacity),
            valid: Vec::with_capacity(capacity),
        }
    }

    /// Adds a valid row to this batch.
    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
        self.valid.push(true);
    }

    /// The total number of rows in this batch including invalid rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// The number of valid rows.
    pub fn num_valid(&self) -> usize {
        self.valid.iter().filter(|v| **v).count()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_valid(&self, i: usize) -> bool {
        self.valid[i]
    }

    pub fn mark_valid(&mut self, i: usize) {
        self.valid[i] = true;
    }

    pub fn mark_invalid(&mut self, i: usize) {
        self.valid[i] = false;
    }

    pub fn row(&self, i: usize) -> &Row {
        &self.rows[i]
    }

    /// Returns an iterator over valid rows of this batch.
    pub fn valid_rows(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().zip(self.valid.iter()).filter(|(_, valid)| **valid).map(|(row, _)| row)
    }

    /// Removes all rows from this batch and returns the valid ones.
    pub fn take_valid_rows(&mut self) -> Vec<Row> {
        let rows = std::mem::take(&mut self.rows);
        let valid = std::mem::take(&mut self.valid);
        rows.into_iter().zip(valid.into_iter()).filter(|(_, valid)| *valid).map(|(row, _)| row).collect()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.valid.clear();
    }
}
