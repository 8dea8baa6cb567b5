use std::sync::Arc;

use crate::catalog::mutable::MutableCatalog;
use crate::catalog::TableInfo;
use crate::cost::{Cost, CostModel};
use crate::datatypes::DataType;
use crate::memo::{GroupId, Memo};
use crate::meta::{ColumnId, ColumnMetadata, Metadata, MetadataRef, TableColumn};
use crate::operators::logical::LogicalOperator;
use crate::operators::physical::PhysicalOperator;
use crate::operators::Operator;
use crate::optimizer::OptimizerContext;
use crate::statistics::{MemoryStatsStorage, TableStats};
use crate::txn::TransactionContext;

/// Computes costs of physical operators whose inputs have a fixed number of rows.
pub struct CostTester {
    metadata: Metadata,
    stats: Arc<MemoryStatsStorage>,
    memo: Memo,
    next_oid: u32,
}

impl CostTester {
    pub fn new() -> Self {
        CostTester {
            metadata: Metadata::new(),
            stats: Arc::new(MemoryStatsStorage::new()),
            memo: Memo::new(),
            next_oid: 10,
        }
    }

    /// Registers columns of a table with the given statistics.
    pub fn add_table(&mut self, name: &str, columns: &[&str], stats: Option<TableStats>) -> (TableInfo, Vec<ColumnId>) {
        let table = TableInfo::new(1, self.next_oid, name);
        self.next_oid += 1;

        let ids = columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let column = TableColumn {
                    alias: name.into(),
                    table: table.clone(),
                    column_index: i,
                };
                self.metadata
                    .add_column(ColumnMetadata::new_table_column(c.to_string(), DataType::Int32, column))
            })
            .collect();

        if let Some(stats) = stats {
            self.stats.set_table_stats(table.database_oid, table.oid, stats);
        }
        (table, ids)
    }

    /// Adds a group that produces the given columns and the given number of rows.
    pub fn input(&mut self, columns: Vec<ColumnId>, num_rows: f64) -> GroupId {
        let get = LogicalOperator::Get {
            table: None,
            alias: format!("input{}", self.memo.num_groups()),
            columns,
            predicates: vec![],
        };
        let group = self.memo.insert_expression(Operator::Logical(get), vec![], None, false).group_id();
        self.memo.set_num_rows(group, num_rows);
        group
    }

    /// Returns the cost of the given operator computed by the given cost model.
    pub fn cost(&mut self, model: &dyn CostModel, op: PhysicalOperator, inputs: Vec<GroupId>) -> Cost {
        let result = self.memo.insert_expression(Operator::Physical(op), inputs, None, false);
        let expr_id = result.expr_id().expect("Expected an expression");

        let ctx = OptimizerContext::new(
            Arc::new(MutableCatalog::new()),
            self.stats.clone(),
            TransactionContext::new(1),
            MetadataRef::new(self.metadata.clone()),
        );
        model.calculate_cost(self.memo.expr(expr_id), &self.memo, &ctx)
    }
}
