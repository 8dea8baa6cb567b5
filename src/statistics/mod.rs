//! Table and column statistics consumed by the optimizer.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::Oid;
use crate::error::OptimizerError;
use crate::operators::scalar::value::ScalarValue;
use crate::txn::TransactionContext;

pub mod selectivity;
pub mod simple;

/// The number of rows returned by an operator in case when no statistics is available.
pub const UNKNOWN_ROW_COUNT: f64 = 1000f64;

pub type StatsStorageRef = Arc<dyn StatsStorage>;
pub type TableStatsRef = Arc<TableStats>;

/// Provides read access to statistics collected for database tables.
/// The optimizer never writes statistics.
pub trait StatsStorage: Debug + Sync + Send {
    /// Returns statistics of the given table or `None` if no statistics has been collected.
    fn get_table_stats(&self, database_oid: Oid, table_oid: Oid, txn: &TransactionContext) -> Option<TableStatsRef>;
}

/// Statistics of a database table.
#[derive(Debug, Clone)]
pub struct TableStats {
    num_rows: f64,
    columns: HashMap<String, ColumnStats>,
}

impl TableStats {
    /// Creates statistics of a table with the given number of rows and no column statistics.
    pub fn new(num_rows: f64) -> Self {
        assert!(num_rows >= 0f64, "num_rows must be non negative");
        TableStats {
            num_rows,
            columns: HashMap::new(),
        }
    }

    /// Adds statistics of a column.
    pub fn with_column(mut self, name: &str, stats: ColumnStats) -> Self {
        self.columns.insert(name.to_string(), stats);
        self
    }

    /// The number of rows in the table.
    pub fn num_rows(&self) -> f64 {
        self.num_rows
    }

    /// Returns statistics of the column with the given name.
    pub fn column_stats(&self, name: &str) -> Option<&ColumnStats> {
        self.columns.get(name)
    }

    /// The number of columns with statistics.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Statistics of a column.
#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    /// The number of distinct values.
    pub cardinality: f64,
    /// The fraction of NULL values.
    pub frac_null: f64,
    /// The most common values.
    pub most_common_vals: Vec<ScalarValue>,
    /// Frequencies (fractions of rows) of the most common values.
    pub most_common_freqs: Vec<f64>,
    /// Bounds of an equi-depth histogram of numeric values.
    pub histogram_bounds: Vec<f64>,
}

impl ColumnStats {
    /// Creates column statistics with the given number of distinct values.
    pub fn new(cardinality: f64) -> Self {
        ColumnStats {
            cardinality,
            ..Default::default()
        }
    }

    /// Sets the fraction of NULL values.
    pub fn with_frac_null(mut self, frac_null: f64) -> Self {
        self.frac_null = frac_null;
        self
    }

    /// Sets the most common values and their frequencies.
    pub fn with_most_common(mut self, vals: Vec<ScalarValue>, freqs: Vec<f64>) -> Result<Self, OptimizerError> {
        if vals.len() != freqs.len() {
            return Err(OptimizerError::argument(format!(
                "The number of most common values does not match the number of their frequencies: {} != {}",
                vals.len(),
                freqs.len()
            )));
        }
        self.most_common_vals = vals;
        self.most_common_freqs = freqs;
        Ok(self)
    }

    /// Sets histogram bounds.
    pub fn with_histogram(mut self, bounds: Vec<f64>) -> Self {
        self.histogram_bounds = bounds;
        self
    }

    /// Returns the frequency of the given value if it is one of the most common values.
    pub fn most_common_freq(&self, value: &ScalarValue) -> Option<f64> {
        self.most_common_vals
            .iter()
            .position(|v| v.compare(value) == Some(std::cmp::Ordering::Equal))
            .map(|i| self.most_common_freqs[i])
    }

    /// Returns the frequency of the most common value.
    pub fn max_most_common_freq(&self) -> Option<f64> {
        self.most_common_freqs.iter().cloned().fold(None, |acc, f| match acc {
            Some(max) if max >= f => Some(max),
            _ => Some(f),
        })
    }
}

/// A [StatsStorage] that keeps statistics in memory.
#[derive(Debug, Default)]
pub struct MemoryStatsStorage {
    tables: RwLock<HashMap<(Oid, Oid), TableStatsRef>>,
}

impl MemoryStatsStorage {
    pub fn new() -> Self {
        MemoryStatsStorage::default()
    }

    /// Replaces statistics of the given table.
    pub fn set_table_stats(&self, database_oid: Oid, table_oid: Oid, stats: TableStats) {
        let mut tables = self.tables.write();
        tables.insert((database_oid, table_oid), Arc::new(stats));
    }
}

impl StatsStorage for MemoryStatsStorage {
    fn get_table_stats(&self, database_oid: Oid, table_oid: Oid, _txn: &TransactionContext) -> Option<TableStatsRef> {
        let tables = self.tables.read();
        tables.get(&(database_oid, table_oid)).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn most_common_values() {
        let stats = ColumnStats::new(10.0)
            .with_most_common(vec![ScalarValue::Int32(1), ScalarValue::Int32(7)], vec![0.2, 0.5])
            .unwrap();

        assert_eq!(stats.most_common_freq(&ScalarValue::Int64(7)), Some(0.5));
        assert_eq!(stats.most_common_freq(&ScalarValue::Int32(3)), None);
        assert_eq!(stats.max_most_common_freq(), Some(0.5));
    }

    #[test]
    fn most_common_values_length_mismatch() {
        let result = ColumnStats::new(10.0).with_most_common(vec![ScalarValue::Int32(1)], vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn memory_stats_storage() {
        let txn = TransactionContext::new(1);
        let storage = MemoryStatsStorage::new();
        storage.set_table_stats(1, 10, TableStats::new(100.0).with_column("a1", ColumnStats::new(5.0)));

        let stats = storage.get_table_stats(1, 10, &txn).expect("no stats");
        assert_eq!(stats.num_rows(), 100.0);
        assert_eq!(stats.column_stats("a1").map(|c| c.cardinality), Some(5.0));
        assert!(storage.get_table_stats(1, 11, &txn).is_none());
    }
}
