//! Access to table data.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use parking_lot::RwLock;

use crate::catalog::{Oid, Table, TableInfo};
use crate::error::ExecutionError;
use crate::execution::row_batch::{Row, RowId};
use crate::operators::scalar::value::ScalarValue;
use crate::txn::TransactionContext;

/// Provides access to rows of tables. Rows of a table have all columns of that table in order they are
/// defined in the table. Every row has a [RowId] that identifies it in update and delete operations.
pub trait TableStorage: Debug + Send + Sync {
    /// Returns all rows of the given table.
    fn scan(&self, txn: &TransactionContext, table: &TableInfo) -> Result<Vec<Row>, ExecutionError>;

    /// Inserts the given rows into the given table. `columns` are positions of columns rows provide
    /// values for. Other columns are set to NULL. Returns the number of inserted rows.
    fn insert(
        &self,
        txn: &TransactionContext,
        table: &TableInfo,
        columns: &[usize],
        rows: Vec<Vec<ScalarValue>>,
    ) -> Result<usize, ExecutionError>;

    /// Sets values of the given columns of the row with the given id.
    /// Returns `false` if there is no such row.
    fn update(
        &self,
        txn: &TransactionContext,
        table: &TableInfo,
        row_id: RowId,
        values: &[(usize, ScalarValue)],
    ) -> Result<bool, ExecutionError>;

    /// Deletes the row with the given id. Returns `false` if there is no such row.
    fn delete(&self, txn: &TransactionContext, table: &TableInfo, row_id: RowId) -> Result<bool, ExecutionError>;
}

/// A [TableStorage] that keeps all rows in memory.
#[derive(Debug, Default)]
pub struct MemoryTableStorage {
    inner: RwLock<HashMap<Oid, TableData>>,
}

#[derive(Debug)]
struct TableData {
    name: String,
    num_columns: usize,
    rows: BTreeMap<RowId, Vec<ScalarValue>>,
    next_row_id: RowId,
}

impl MemoryTableStorage {
    pub fn new() -> Self {
        MemoryTableStorage::default()
    }

    /// Creates an empty table. Returns an error if the table already exists.
    pub fn create_table(&self, table: &Table) -> Result<(), ExecutionError> {
        let mut inner = self.inner.write();
        if inner.contains_key(&table.oid()) {
            return Err(ExecutionError::argument(format!("Table already exists. Table: {}", table.name())));
        }
        inner.insert(
            table.oid(),
            TableData {
                name: table.name().to_string(),
                num_columns: table.columns().len(),
                rows: BTreeMap::new(),
                next_row_id: 1,
            },
        );
        Ok(())
    }

    /// Adds the given rows to the table with the given oid. Every row must provide values of all columns.
    pub fn load_rows(&self, table_oid: Oid, rows: Vec<Vec<ScalarValue>>) -> Result<(), ExecutionError> {
        let mut inner = self.inner.write();
        let data = get_table_mut(&mut inner, table_oid)?;
        let columns: Vec<usize> = (0..data.num_columns).collect();
        for row in rows {
            data.add_row(&columns, row)?;
        }
        Ok(())
    }

    /// The number of rows in the table with the given oid.
    pub fn num_rows(&self, table_oid: Oid) -> Result<usize, ExecutionError> {
        let inner = self.inner.read();
        match inner.get(&table_oid) {
            Some(data) => Ok(data.rows.len()),
            None => Err(unknown_table(table_oid)),
        }
    }
}

impl TableData {
    fn add_row(&mut self, columns: &[usize], values: Vec<ScalarValue>) -> Result<RowId, ExecutionError> {
        if columns.len() != values.len() {
            return Err(ExecutionError::argument(format!(
                "Expected {} values but got {}. Table: {}",
                columns.len(),
                values.len(),
                self.name
            )));
        }
        let mut row = vec![ScalarValue::Null; self.num_columns];
        for (column, value) in columns.iter().zip(values.into_iter()) {
            self.set_value(&mut row, *column, value)?;
        }
        let row_id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(row_id, row);
        Ok(row_id)
    }

    fn set_value(&self, row: &mut [ScalarValue], column: usize, value: ScalarValue) -> Result<(), ExecutionError> {
        match row.get_mut(column) {
            Some(v) => {
                *v = value;
                Ok(())
            }
            None => Err(ExecutionError::argument(format!("Unknown column #{}. Table: {}", column, self.name))),
        }
    }
}

impl TableStorage for MemoryTableStorage {
    fn scan(&self, _txn: &TransactionContext, table: &TableInfo) -> Result<Vec<Row>, ExecutionError> {
        let inner = self.inner.read();
        match inner.get(&table.oid) {
            Some(data) => Ok(data.rows.iter().map(|(id, values)| Row::with_row_id(values.clone(), *id)).collect()),
            None => Err(unknown_table(table.oid)),
        }
    }

    fn insert(
        &self,
        txn: &TransactionContext,
        table: &TableInfo,
        columns: &[usize],
        rows: Vec<Vec<ScalarValue>>,
    ) -> Result<usize, ExecutionError> {
        check_writable(txn)?;
        let mut inner = self.inner.write();
        let data = get_table_mut(&mut inner, table.oid)?;
        let num_rows = rows.len();
        for row in rows {
            data.add_row(columns, row)?;
        }
        Ok(num_rows)
    }

    fn update(
        &self,
        txn: &TransactionContext,
        table: &TableInfo,
        row_id: RowId,
        values: &[(usize, ScalarValue)],
    ) -> Result<bool, ExecutionError> {
        check_writable(txn)?;
        let mut inner = self.inner.write();
        let data = get_table_mut(&mut inner, table.oid)?;
        let mut row = match data.rows.get(&row_id) {
            Some(row) => row.clone(),
            None => return Ok(false),
        };
        for (column, value) in values {
            data.set_value(&mut row, *column, value.clone())?;
        }
        data.rows.insert(row_id, row);
        Ok(true)
    }

    fn delete(&self, txn: &TransactionContext, table: &TableInfo, row_id: RowId) -> Result<bool, ExecutionError> {
        check_writable(txn)?;
        let mut inner = self.inner.write();
        let data = get_table_mut(&mut inner, table.oid)?;
        Ok(data.rows.remove(&row_id).is_some())
    }
}

fn get_table_mut(tables: &mut HashMap<Oid, TableData>, oid: Oid) -> Result<&mut TableData, ExecutionError> {
    tables.get_mut(&oid).ok_or_else(|| unknown_table(oid))
}

fn unknown_table(oid: Oid) -> ExecutionError {
    ExecutionError::argument(format!("Table does not exist. Table oid: {}", oid))
}

fn check_writable(txn: &TransactionContext) -> Result<(), ExecutionError> {
    if txn.is_read_only() {
        Err(ExecutionError::argument(format!("Transaction {} is read-only", txn.txn_id())))
    } else {
        Ok(())
    }
}
