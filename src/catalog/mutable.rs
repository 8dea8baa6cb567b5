//! Mutable implementation of a database catalog.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::catalog::{Catalog, Index, IndexRef, Oid, Table, TableRef};
use crate::error::OptimizerError;
use crate::txn::TransactionContext;

/// A [database catalog](Catalog) that stores database objects in memory
/// and provides operations to add/remove database objects.
///
/// # Error handling
///
/// Errors returned by methods of the `MutableCatalog` are recoverable.
#[derive(Debug, Default)]
pub struct MutableCatalog {
    inner: RwLock<CatalogObjects>,
}

#[derive(Debug, Default)]
struct CatalogObjects {
    tables: HashMap<String, TableRef>,
    indexes: HashMap<Oid, Vec<IndexRef>>,
}

impl MutableCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        MutableCatalog::default()
    }

    /// Adds the given table. If a table with the same name or oid already exists this method returns an error.
    pub fn add_table(&self, table: Table) -> Result<TableRef, OptimizerError> {
        let mut inner = self.inner.write();
        if inner.tables.contains_key(table.name()) {
            return Err(OptimizerError::argument(format!("Table already exists. Table: {}", table.name())));
        }
        if inner.tables.values().any(|t| t.oid() == table.oid()) {
            return Err(OptimizerError::argument(format!("Table oid is already used. Oid: {}", table.oid())));
        }
        let table = Arc::new(table);
        inner.tables.insert(table.name().to_string(), table.clone());
        Ok(table)
    }

    /// Adds the given index. If the table does not exist or the index already exists this method returns an error.
    pub fn add_index(&self, index: Index) -> Result<(), OptimizerError> {
        let mut inner = self.inner.write();
        if !inner.tables.values().any(|t| t.oid() == index.table_oid()) {
            return Err(OptimizerError::argument(format!(
                "Table does not exist. Table oid: {}",
                index.table_oid()
            )));
        }
        let indexes = inner.indexes.entry(index.table_oid()).or_default();
        if indexes.iter().any(|i| i.name() == index.name()) {
            return Err(OptimizerError::argument(format!("Index already exists. Index: {}", index.name())));
        }
        indexes.push(Arc::new(index));
        Ok(())
    }

    /// Removes the table with the given name and all of its indexes.
    pub fn remove_table(&self, name: &str) -> Result<(), OptimizerError> {
        let mut inner = self.inner.write();
        match inner.tables.remove(name) {
            Some(table) => {
                inner.indexes.remove(&table.oid());
                Ok(())
            }
            None => Err(OptimizerError::argument(format!("Table does not exist. Table: {}", name))),
        }
    }
}

impl Catalog for MutableCatalog {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn get_table(&self, name: &str, _txn: &TransactionContext) -> Option<TableRef> {
        let inner = self.inner.read();
        inner.tables.get(name).cloned()
    }

    fn get_table_by_oid(&self, database_oid: Oid, table_oid: Oid, _txn: &TransactionContext) -> Option<TableRef> {
        let inner = self.inner.read();
        inner
            .tables
            .values()
            .find(|t| t.oid() == table_oid && t.database_oid() == database_oid)
            .cloned()
    }

    fn get_indexes(&self, table_oid: Oid, _txn: &TransactionContext) -> Vec<IndexRef> {
        let inner = self.inner.read();
        inner.indexes.get(&table_oid).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::{IndexBuilder, TableBuilder, DEFAULT_DATABASE_OID};
    use crate::datatypes::DataType;

    #[test]
    fn add_and_remove_table() {
        let txn = TransactionContext::new(1);
        let catalog = MutableCatalog::new();
        let table = TableBuilder::new("a", 10).add_column("a1", DataType::Int32).build().unwrap();
        let table = catalog.add_table(table).unwrap();

        let index = IndexBuilder::new(table.clone(), "a_a1_idx", 11).add_column("a1").build().unwrap();
        catalog.add_index(index).unwrap();

        assert!(catalog.get_table("a", &txn).is_some(), "table by name");
        assert!(catalog.get_table_by_oid(DEFAULT_DATABASE_OID, 10, &txn).is_some(), "table by oid");
        assert_eq!(catalog.get_indexes(10, &txn).len(), 1, "indexes");

        catalog.remove_table("a").unwrap();
        assert!(catalog.get_table("a", &txn).is_none(), "removed table");
        assert!(catalog.get_indexes(10, &txn).is_empty(), "removed indexes");
    }

    #[test]
    fn add_duplicate_table() {
        let catalog = MutableCatalog::new();
        let table = TableBuilder::new("a", 10).add_column("a1", DataType::Int32).build().unwrap();
        catalog.add_table(table.clone()).unwrap();
        assert!(catalog.add_table(table).is_err());
    }

    #[test]
    fn add_index_to_unknown_table() {
        let catalog = MutableCatalog::new();
        let table = TableBuilder::new("a", 10).add_column("a1", DataType::Int32).build().unwrap();
        let index = IndexBuilder::new(Arc::new(table), "a_a1_idx", 11).add_column("a1").build().unwrap();
        assert!(catalog.add_index(index).is_err());
    }
}
