//! A builder of logical operator trees.

use std::collections::BTreeSet;

use crate::catalog::{CatalogRef, TableRef};
use crate::datatypes::DataType;
use crate::error::OptimizerError;
use crate::meta::{ColumnId, ColumnMetadata, Metadata, MetadataRef, TableColumn};
use crate::operators::logical::LogicalOperator;
use crate::operators::scalar::expr::{AnnotatedExpr, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;
use crate::operators::{JoinType, OperatorExpr};
use crate::properties::SortKey;
use crate::txn::TransactionContext;

/// Builds logical operator trees and registers their columns in query [metadata](Metadata).
/// Column references are resolved against tables of a [catalog](crate::catalog::Catalog).
#[derive(Debug)]
pub struct OperatorBuilder {
    catalog: CatalogRef,
    txn: TransactionContext,
    metadata: Metadata,
}

impl OperatorBuilder {
    /// Creates a builder that resolves tables using the given catalog.
    pub fn new(catalog: CatalogRef, txn: TransactionContext) -> Self {
        OperatorBuilder {
            catalog,
            txn,
            metadata: Metadata::new(),
        }
    }

    /// Creates a scan of the table with the given name that returns the given columns.
    pub fn get(&mut self, table: &str, columns: &[&str]) -> Result<OperatorExpr, OptimizerError> {
        self.get_as(table, table, columns)
    }

    /// Creates a scan of the table with the given name and alias that returns the given columns.
    pub fn get_as(&mut self, table: &str, alias: &str, columns: &[&str]) -> Result<OperatorExpr, OptimizerError> {
        let table_ref = self.get_table(table)?;
        let mut column_ids = Vec::with_capacity(columns.len());

        for name in columns {
            let (index, column) = table_ref
                .column_index(name)
                .and_then(|i| table_ref.columns().get(i).map(|c| (i, c.clone())))
                .ok_or_else(|| {
                    OptimizerError::argument(format!("Column does not exist. Table: {} column: {}", table, name))
                })?;
            let metadata = ColumnMetadata::new_table_column(
                column.name().to_string(),
                column.data_type(),
                TableColumn {
                    alias: alias.to_string(),
                    table: table_ref.info(),
                    column_index: index,
                },
            );
            column_ids.push(self.metadata.add_column(metadata));
        }

        let op = LogicalOperator::Get {
            table: Some(table_ref.info()),
            alias: alias.to_string(),
            columns: column_ids,
            predicates: vec![],
        };
        Ok(OperatorExpr::logical(op, vec![]))
    }

    /// Creates an operator that produces a single empty row (`SELECT` without `FROM`).
    pub fn empty(&mut self) -> OperatorExpr {
        let op = LogicalOperator::Get {
            table: None,
            alias: String::new(),
            columns: vec![],
            predicates: vec![],
        };
        OperatorExpr::logical(op, vec![])
    }

    /// Returns the identifier of a column with the given name from the table with the given alias.
    pub fn column(&self, alias: &str, name: &str) -> Result<ColumnId, OptimizerError> {
        self.metadata
            .columns()
            .find(|(_, c)| c.name() == name && c.table().map(|t| t.alias == alias).unwrap_or(false))
            .map(|(id, _)| id)
            .ok_or_else(|| OptimizerError::argument(format!("Unknown column: {}.{}", alias, name)))
    }

    /// Adds a filter.
    pub fn filter(&self, input: OperatorExpr, predicates: Vec<ScalarExpr>) -> OperatorExpr {
        let predicates = self.annotate(predicates);
        OperatorExpr::logical(LogicalOperator::Filter { predicates }, vec![input])
    }

    /// Adds an inner join.
    pub fn join(&self, left: OperatorExpr, right: OperatorExpr, predicates: Vec<ScalarExpr>) -> OperatorExpr {
        let predicates = self.annotate(predicates);
        OperatorExpr::logical(LogicalOperator::InnerJoin { predicates }, vec![left, right])
    }

    /// Adds a left, right or full outer join.
    pub fn outer_join(
        &self,
        join_type: JoinType,
        left: OperatorExpr,
        right: OperatorExpr,
        predicates: Vec<ScalarExpr>,
    ) -> OperatorExpr {
        let predicates = self.annotate(predicates);
        let join = LogicalOperator::OuterJoin { join_type, predicates };
        OperatorExpr::logical(join, vec![left, right])
    }

    /// Adds a projection. A column reference retains its column id, other expressions get a new column.
    pub fn project(&mut self, input: OperatorExpr, exprs: Vec<ScalarExpr>) -> Result<OperatorExpr, OptimizerError> {
        let mut columns = Vec::with_capacity(exprs.len());
        for expr in exprs.iter() {
            let id = match expr {
                ScalarExpr::Column(id) => *id,
                _ => {
                    let data_type = self.resolve_type(expr)?;
                    self.metadata
                        .add_column(ColumnMetadata::new_synthetic_column("?column?".to_string(), data_type))
                }
            };
            columns.push(id);
        }
        Ok(OperatorExpr::logical(LogicalOperator::Projection { exprs, columns }, vec![input]))
    }

    /// Adds an aggregation. `aggregates` must be aggregate function calls.
    /// `having` predicates can reference group by columns and the results of aggregates
    /// (by the column ids returned by [OperatorExpr::output_columns]).
    pub fn aggregate(
        &mut self,
        input: OperatorExpr,
        group_by: Vec<ColumnId>,
        aggregates: Vec<ScalarExpr>,
    ) -> Result<OperatorExpr, OptimizerError> {
        let mut columns = Vec::with_capacity(aggregates.len());
        for expr in aggregates.iter() {
            match expr {
                ScalarExpr::Aggregate { func, .. } => {
                    let data_type = self.resolve_type(expr)?;
                    let name = format!("{}", func);
                    columns.push(self.metadata.add_column(ColumnMetadata::new_synthetic_column(name, data_type)));
                }
                _ => return Err(OptimizerError::argument(format!("Not an aggregate function: {}", expr))),
            }
        }
        let op = LogicalOperator::Aggregate {
            group_by,
            aggregates,
            columns,
            having: vec![],
        };
        Ok(OperatorExpr::logical(op, vec![input]))
    }

    /// Sets HAVING predicates of the given aggregation.
    pub fn having(&self, aggregate: OperatorExpr, predicates: Vec<ScalarExpr>) -> Result<OperatorExpr, OptimizerError> {
        let OperatorExpr { op, children } = aggregate;
        match op.as_logical() {
            Some(LogicalOperator::Aggregate {
                group_by,
                aggregates,
                columns,
                ..
            }) => {
                let op = LogicalOperator::Aggregate {
                    group_by: group_by.clone(),
                    aggregates: aggregates.clone(),
                    columns: columns.clone(),
                    having: self.annotate(predicates),
                };
                Ok(OperatorExpr::logical(op, children))
            }
            _ => Err(OptimizerError::argument(format!("HAVING requires an aggregate: {}", op))),
        }
    }

    /// Removes duplicate rows.
    pub fn distinct(&self, input: OperatorExpr) -> OperatorExpr {
        let columns = input.output_columns();
        OperatorExpr::logical(LogicalOperator::Distinct { columns }, vec![input])
    }

    /// Adds a limit. If `sort` is not empty rows are sorted before the limit is applied.
    pub fn limit(&self, input: OperatorExpr, offset: usize, limit: usize, sort: Vec<SortKey>) -> OperatorExpr {
        OperatorExpr::logical(LogicalOperator::Limit { offset, limit, sort }, vec![input])
    }

    /// Inserts the given rows into all columns of the given table.
    pub fn insert_values(&mut self, table: &str, rows: Vec<Vec<ScalarValue>>) -> Result<OperatorExpr, OptimizerError> {
        let (table_ref, columns) = self.target_columns(table)?;
        if rows.is_empty() {
            return Err(OptimizerError::argument("INSERT: no rows"));
        }
        for row in rows.iter() {
            if row.len() != columns.len() {
                return Err(OptimizerError::argument(format!(
                    "INSERT: expected {} values but got {}",
                    columns.len(),
                    row.len()
                )));
            }
        }
        let values = rows.into_iter().map(|row| row.into_iter().map(ScalarExpr::Scalar).collect()).collect();
        let op = LogicalOperator::Insert {
            table: table_ref.info(),
            columns,
            values,
        };
        Ok(OperatorExpr::logical(op, vec![]))
    }

    /// Inserts rows produced by the given operator into all columns of the given table.
    pub fn insert_select(&mut self, table: &str, input: OperatorExpr) -> Result<OperatorExpr, OptimizerError> {
        let (table_ref, columns) = self.target_columns(table)?;
        let num_input_columns = input.output_columns().len();
        if num_input_columns != columns.len() {
            return Err(OptimizerError::argument(format!(
                "INSERT: expected {} columns but got {}",
                columns.len(),
                num_input_columns
            )));
        }
        let op = LogicalOperator::Insert {
            table: table_ref.info(),
            columns,
            values: vec![],
        };
        Ok(OperatorExpr::logical(op, vec![input]))
    }

    /// Updates rows produced by the given operator (a scan of the table with the given alias).
    pub fn update(
        &self,
        alias: &str,
        input: OperatorExpr,
        updates: Vec<(&str, ScalarExpr)>,
    ) -> Result<OperatorExpr, OptimizerError> {
        let table = self.scanned_table(&input, alias)?;
        let mut resolved = Vec::with_capacity(updates.len());
        for (name, expr) in updates {
            resolved.push((self.column(alias, name)?, expr));
        }
        let op = LogicalOperator::Update {
            table,
            updates: resolved,
        };
        Ok(OperatorExpr::logical(op, vec![input]))
    }

    /// Deletes rows produced by the given operator (a scan of the table with the given alias).
    pub fn delete(&self, alias: &str, input: OperatorExpr) -> Result<OperatorExpr, OptimizerError> {
        let table = self.scanned_table(&input, alias)?;
        Ok(OperatorExpr::logical(LogicalOperator::Delete { table }, vec![input]))
    }

    /// Returns the metadata collected so far.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Consumes this builder and returns the metadata.
    pub fn build_metadata(self) -> MetadataRef {
        MetadataRef::new(self.metadata)
    }

    fn get_table(&self, name: &str) -> Result<TableRef, OptimizerError> {
        self.catalog
            .get_table(name, &self.txn)
            .ok_or_else(|| OptimizerError::argument(format!("Table does not exist. Table: {}", name)))
    }

    fn target_columns(&mut self, table: &str) -> Result<(TableRef, Vec<ColumnId>), OptimizerError> {
        let table_ref = self.get_table(table)?;
        let mut columns = Vec::with_capacity(table_ref.columns().len());
        for (i, column) in table_ref.columns().iter().enumerate() {
            let metadata = ColumnMetadata::new_table_column(
                column.name().to_string(),
                column.data_type(),
                TableColumn {
                    alias: table.to_string(),
                    table: table_ref.info(),
                    column_index: i,
                },
            );
            columns.push(self.metadata.add_column(metadata));
        }
        Ok((table_ref, columns))
    }

    fn scanned_table(&self, input: &OperatorExpr, alias: &str) -> Result<crate::catalog::TableInfo, OptimizerError> {
        let columns = input.output_columns();
        columns
            .iter()
            .filter_map(|id| self.metadata.find_column(id).and_then(|c| c.table()))
            .find(|t| t.alias == alias)
            .map(|t| t.table.clone())
            .ok_or_else(|| OptimizerError::argument(format!("Input does not read table: {}", alias)))
    }

    fn annotate(&self, predicates: Vec<ScalarExpr>) -> Vec<AnnotatedExpr> {
        predicates
            .into_iter()
            .flat_map(|p| p.split_conjunction())
            .map(|expr| {
                let aliases: BTreeSet<String> = expr
                    .columns()
                    .iter()
                    .filter_map(|c| self.metadata.table_alias(c))
                    .map(|a| a.to_string())
                    .collect();
                AnnotatedExpr::new(expr, aliases)
            })
            .collect()
    }

    fn resolve_type(&self, expr: &ScalarExpr) -> Result<DataType, OptimizerError> {
        match expr {
            ScalarExpr::Column(id) => self
                .metadata
                .find_column(id)
                .map(|c| c.data_type())
                .ok_or_else(|| OptimizerError::argument(format!("Unknown column: {}", id))),
            ScalarExpr::Scalar(value) => Ok(value.data_type()),
            ScalarExpr::BinaryExpr { lhs, op, rhs } => {
                if op.is_arithmetic() {
                    let lhs = self.resolve_type(lhs)?;
                    let rhs = self.resolve_type(rhs)?;
                    lhs.common_type(&rhs).ok_or_else(|| {
                        OptimizerError::argument(format!("Incompatible types: {} {} {}", lhs, op, rhs))
                    })
                } else {
                    Ok(DataType::Bool)
                }
            }
            ScalarExpr::Not(_) | ScalarExpr::IsNull(_) | ScalarExpr::IsNotNull(_) => Ok(DataType::Bool),
            ScalarExpr::Aggregate { func, args } => {
                let arg_type = match args.first() {
                    Some(arg) => Some(self.resolve_type(arg)?),
                    None => None,
                };
                Ok(func.return_type(arg_type))
            }
        }
    }
}
