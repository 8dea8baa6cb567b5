use crate::catalog::TableInfo;
use crate::datatypes::DataType;

/// Uniquely identifies a column within a query.
pub type ColumnId = usize;

/// A reference to [Metadata].
pub type MetadataRef = triomphe::Arc<Metadata>;

/// Stores a mapping between database objects and their identifiers that are globally unique within a query.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    columns: Vec<ColumnMetadata>,
}

/// Column metadata. If the table property is set then this is information about a column that belongs
/// to a database table. Otherwise this is a metadata of a synthetic column derived from an expression
/// (a projection or an aggregate).
#[derive(Debug, Clone)]
pub struct ColumnMetadata {
    name: String,
    data_type: DataType,
    table: Option<TableColumn>,
}

/// Describes where a column of a base table comes from.
#[derive(Debug, Clone)]
pub struct TableColumn {
    /// The alias of the table in the query.
    pub alias: String,
    /// The table.
    pub table: TableInfo,
    /// The position of the column in the table.
    pub column_index: usize,
}

impl ColumnMetadata {
    /// Creates column metadata for a column that belongs to the given table.
    pub fn new_table_column(name: String, data_type: DataType, table: TableColumn) -> Self {
        ColumnMetadata {
            name,
            data_type,
            table: Some(table),
        }
    }

    /// Creates column metadata for a synthetic column.
    pub fn new_synthetic_column(name: String, data_type: DataType) -> Self {
        ColumnMetadata {
            name,
            data_type,
            table: None,
        }
    }

    /// Returns the name of this column.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the type of this column.
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Returns the table this column belongs to. If the table is absent then this a synthetic column.
    pub fn table(&self) -> Option<&TableColumn> {
        self.table.as_ref()
    }
}

impl Metadata {
    /// Creates an empty metadata.
    pub fn new() -> Self {
        Metadata::default()
    }

    /// Adds a new column and returns its identifier. Identifiers start from 1.
    pub fn add_column(&mut self, column: ColumnMetadata) -> ColumnId {
        self.columns.push(column);
        self.columns.len()
    }

    /// Retrieves column metadata by the given column id.
    ///
    /// # Panics
    ///
    /// This method panics if there is no column with the given id.
    pub fn get_column(&self, column_id: &ColumnId) -> &ColumnMetadata {
        column_id
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .unwrap_or_else(|| panic!("Unknown or unexpected column id: {:?}", column_id))
    }

    /// Retrieves column metadata by the given column id. Returns `None` if the column does not exist.
    pub fn find_column(&self, column_id: &ColumnId) -> Option<&ColumnMetadata> {
        column_id.checked_sub(1).and_then(|i| self.columns.get(i))
    }

    /// Returns the alias of the table the given column belongs to.
    pub fn table_alias(&self, column_id: &ColumnId) -> Option<&str> {
        self.find_column(column_id).and_then(|c| c.table()).map(|t| t.alias.as_str())
    }

    /// Returns an iterator over available column metadata.
    pub fn columns(&self) -> impl Iterator<Item = (ColumnId, &ColumnMetadata)> {
        self.columns.iter().enumerate().map(|(i, c)| (i + 1, c))
    }
}
