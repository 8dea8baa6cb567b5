//! Database catalog.

use std::any::Any;
use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

use crate::datatypes::DataType;
use crate::error::OptimizerError;
use crate::txn::TransactionContext;

pub mod mutable;

pub type CatalogRef = Arc<dyn Catalog>;
pub type TableRef = Arc<Table>;
pub type IndexRef = Arc<Index>;
pub type ColumnRef = Arc<Column>;

/// Object identifier of a database object.
pub type Oid = u32;

/// The oid of the default database.
pub const DEFAULT_DATABASE_OID: Oid = 1;

/// Provides access to database objects used by the optimizer and the execution engine.
/// The catalog is never mutated by the optimizer.
pub trait Catalog: Debug + Sync + Send {
    /// Returns this catalog as [`Any`](std::any::Any) in order it can be downcast to its implementation.
    fn as_any(&self) -> &dyn Any;

    /// Returns a table with the given name.
    fn get_table(&self, name: &str, txn: &TransactionContext) -> Option<TableRef>;

    /// Returns a table with the given oid registered in the given database.
    fn get_table_by_oid(&self, database_oid: Oid, table_oid: Oid, txn: &TransactionContext) -> Option<TableRef>;

    /// Returns all indexes of the table with the given oid.
    fn get_indexes(&self, table_oid: Oid, txn: &TransactionContext) -> Vec<IndexRef>;
}

/// Identifies a table in operators and plans. A lightweight counterpart of a [Table].
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TableInfo {
    pub database_oid: Oid,
    pub oid: Oid,
    pub name: String,
}

impl TableInfo {
    pub fn new(database_oid: Oid, oid: Oid, name: &str) -> Self {
        TableInfo {
            database_oid,
            oid,
            name: name.to_string(),
        }
    }
}

impl Display for TableInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Represents a database table.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    oid: Oid,
    database_oid: Oid,
    columns: Vec<ColumnRef>,
}

impl Table {
    /// The name of this table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object identifier of this table.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// The object identifier of the database this table belongs to.
    pub fn database_oid(&self) -> Oid {
        self.database_oid
    }

    /// The columns of this table.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Returns a column with the given name.
    pub fn get_column(&self, name: &str) -> Option<ColumnRef> {
        self.columns.iter().find(|c| c.name == name).cloned()
    }

    /// Returns the position of the column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Returns the identifier of this table used by operators.
    pub fn info(&self) -> TableInfo {
        TableInfo::new(self.database_oid, self.oid, &self.name)
    }
}

/// A builder to create instances of a [Table].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    oid: Oid,
    database_oid: Oid,
    columns: Vec<ColumnRef>,
}

impl TableBuilder {
    /// Creates a builder for a table the given name and oid.
    pub fn new(name: &str, oid: Oid) -> Self {
        TableBuilder {
            name: name.to_string(),
            oid,
            database_oid: DEFAULT_DATABASE_OID,
            columns: Vec::new(),
        }
    }

    /// Sets the database this table belongs to.
    pub fn database(mut self, database_oid: Oid) -> Self {
        self.database_oid = database_oid;
        self
    }

    /// Adds a nullable column with the given name and data type to this table.
    pub fn add_column(self, name: &str, data_type: DataType) -> TableBuilder {
        self.add_column_with_nullability(name, data_type, true)
    }

    /// Adds a column with the given name, data type and nullability to this table.
    pub fn add_column_with_nullability(mut self, name: &str, data_type: DataType, nullable: bool) -> TableBuilder {
        let column = Column {
            name: name.to_string(),
            table: self.name.clone(),
            data_type,
            nullable,
        };
        self.columns.push(Arc::new(column));
        self
    }

    /// Creates an instance of a [Table] with previously specified properties.
    pub fn build(self) -> Result<Table, OptimizerError> {
        if self.columns.is_empty() {
            return Err(OptimizerError::argument("No columns has been specified"));
        }

        let mut names = HashSet::new();
        for col in self.columns.iter() {
            if !names.insert(col.name()) {
                let message = format!("Column already exists. Column: {} table: {}", col.name(), self.name);
                return Err(OptimizerError::argument(message));
            }
        }

        Ok(Table {
            name: self.name,
            oid: self.oid,
            database_oid: self.database_oid,
            columns: self.columns,
        })
    }
}

/// Represents a database index.
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    oid: Oid,
    table_oid: Oid,
    columns: Vec<ColumnRef>,
    key_attrs: Vec<usize>,
    unique: bool,
}

impl Index {
    /// The name of this index.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The object identifier of this index.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// The oid of the table this index is defined for.
    pub fn table_oid(&self) -> Oid {
        self.table_oid
    }

    /// Returns the key columns of this index.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    /// Positions of the key columns in the table, in key order.
    pub fn key_attrs(&self) -> &[usize] {
        &self.key_attrs
    }

    /// Whether keys of this index are unique.
    pub fn is_unique(&self) -> bool {
        self.unique
    }
}

/// A builder to create instances of an [Index].
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    name: String,
    oid: Oid,
    table: TableRef,
    columns: Vec<String>,
    unique: bool,
}

impl IndexBuilder {
    /// Creates a builder for an index with the given name.
    pub fn new(table: TableRef, name: &str, oid: Oid) -> Self {
        IndexBuilder {
            name: name.to_string(),
            oid,
            table,
            columns: Vec::new(),
            unique: false,
        }
    }

    /// Adds a key column.
    pub fn add_column(mut self, column: &str) -> IndexBuilder {
        self.columns.push(column.into());
        self
    }

    /// Marks this index as unique.
    pub fn unique(mut self) -> IndexBuilder {
        self.unique = true;
        self
    }

    /// Creates an instance of an [Index] with previously specified properties.
    pub fn build(self) -> Result<Index, OptimizerError> {
        if self.columns.is_empty() {
            return Err(OptimizerError::argument("No columns have been specified"));
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        let mut key_attrs = Vec::with_capacity(self.columns.len());
        for name in self.columns.iter() {
            match (self.table.get_column(name), self.table.column_index(name)) {
                (Some(col), Some(pos)) => {
                    columns.push(col);
                    key_attrs.push(pos);
                }
                _ => {
                    return Err(OptimizerError::argument(format!(
                        "Column does not exist. Table: {}, column: {}",
                        self.table.name, name
                    )))
                }
            }
        }

        Ok(Index {
            name: self.name,
            oid: self.oid,
            table_oid: self.table.oid,
            columns,
            key_attrs,
            unique: self.unique,
        })
    }
}

/// A column of a database table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    table: String,
    data_type: DataType,
    nullable: bool,
}

impl Column {
    /// The name of this column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name of the table this column belongs to.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The data type of this column.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Whether this column accepts NULL values.
    pub fn nullable(&self) -> bool {
        self.nullable
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn table_with_duplicate_columns() {
        let result = TableBuilder::new("a", 1)
            .add_column("a1", DataType::Int32)
            .add_column("a1", DataType::Int32)
            .build();
        let err = result.expect_err("duplicate columns");
        assert_eq!(format!("{}", err), "Argument error: Column already exists. Column: a1 table: a");
    }

    #[test]
    fn index_key_attrs() {
        let table = TableBuilder::new("a", 1)
            .add_column("a1", DataType::Int32)
            .add_column("a2", DataType::Int32)
            .add_column("a3", DataType::String)
            .build()
            .unwrap();
        let index = IndexBuilder::new(Arc::new(table), "a_idx", 2)
            .add_column("a3")
            .add_column("a1")
            .build()
            .unwrap();

        assert_eq!(index.key_attrs(), &[2, 0]);
        assert_eq!(index.table_oid(), 1);
    }

    #[test]
    fn index_with_unknown_column() {
        let table = TableBuilder::new("a", 1).add_column("a1", DataType::Int32).build().unwrap();
        let result = IndexBuilder::new(Arc::new(table), "a_idx", 2).add_column("a2").build();
        assert!(result.is_err(), "unknown column");
    }
}
