//! Cardinality estimation of memo groups.

use crate::catalog::TableInfo;
use crate::memo::{GroupExpr, Memo, MemoGroupCallback};
use crate::meta::{ColumnId, Metadata, MetadataRef};
use crate::operators::logical::LogicalOperator;
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::expr::AnnotatedExpr;
use crate::operators::{JoinType, Operator};
use crate::statistics::selectivity::{estimate_selectivity, join_selectivity, ColumnStatsProvider};
use crate::statistics::{ColumnStats, StatsStorage, StatsStorageRef, UNKNOWN_ROW_COUNT};
use crate::txn::TransactionContext;

/// A [ColumnStatsProvider] that resolves columns of base tables via [Metadata]
/// and reads their statistics from a [StatsStorage].
pub struct TableColumnStats<'a> {
    metadata: &'a Metadata,
    stats: &'a dyn StatsStorage,
    txn: &'a TransactionContext,
}

impl<'a> TableColumnStats<'a> {
    pub fn new(metadata: &'a Metadata, stats: &'a dyn StatsStorage, txn: &'a TransactionContext) -> Self {
        TableColumnStats { metadata, stats, txn }
    }

    /// Returns the number of rows of the given table or `None` if the table has not been analyzed.
    pub fn table_rows(&self, table: &TableInfo) -> Option<f64> {
        self.stats
            .get_table_stats(table.database_oid, table.oid, self.txn)
            .map(|s| s.num_rows())
    }
}

impl ColumnStatsProvider for TableColumnStats<'_> {
    fn column_stats(&self, column_id: ColumnId) -> Option<ColumnStats> {
        let column = self.metadata.find_column(&column_id)?;
        let table = column.table()?;
        let table_stats = self.stats.get_table_stats(table.table.database_oid, table.table.oid, self.txn)?;
        table_stats.column_stats(column.name()).cloned()
    }
}

/// Estimates the number of rows produced by a new memo group.
/// Base tables use their statistics; other operators scale the row counts of their inputs
/// by selectivity estimates of their predicates.
#[derive(Debug)]
pub struct StatsCalculator {
    metadata: MetadataRef,
    stats: StatsStorageRef,
    txn: TransactionContext,
}

impl StatsCalculator {
    pub fn new(metadata: MetadataRef, stats: StatsStorageRef, txn: TransactionContext) -> Self {
        StatsCalculator { metadata, stats, txn }
    }

    fn provider(&self) -> TableColumnStats<'_> {
        TableColumnStats::new(&self.metadata, self.stats.as_ref(), &self.txn)
    }

    fn scan_rows(&self, table: &TableInfo, predicates: &[AnnotatedExpr]) -> f64 {
        let provider = self.provider();
        let num_rows = provider.table_rows(table).unwrap_or(UNKNOWN_ROW_COUNT);
        num_rows * self.filter_selectivity(predicates)
    }

    fn filter_selectivity(&self, predicates: &[AnnotatedExpr]) -> f64 {
        let provider = self.provider();
        predicates.iter().map(|p| estimate_selectivity(&p.expr, &provider)).product()
    }

    fn join_rows(&self, left: f64, right: f64, predicates: &[AnnotatedExpr]) -> f64 {
        let provider = self.provider();
        let selectivity: f64 = predicates
            .iter()
            .map(|p| match p.expr.as_column_equality() {
                Some((l, r)) => {
                    let l = provider.column_stats(l);
                    let r = provider.column_stats(r);
                    join_selectivity(l.as_ref(), r.as_ref())
                }
                None => estimate_selectivity(&p.expr, &provider),
            })
            .product();
        left * right * selectivity
    }

    /// An outer join produces at least one row for every row of its preserved inputs.
    fn outer_join_rows(&self, join_type: JoinType, left: f64, right: f64, predicates: &[AnnotatedExpr]) -> f64 {
        let mut rows = self.join_rows(left, right, predicates);
        if join_type.preserves_left() {
            rows = rows.max(left);
        }
        if join_type.preserves_right() {
            rows = rows.max(right);
        }
        rows
    }

    fn group_rows(&self, input: f64, keys: &[ColumnId]) -> f64 {
        if keys.is_empty() {
            return 1.0;
        }
        let provider = self.provider();
        let groups = keys.iter().try_fold(1f64, |acc, c| {
            provider.column_stats(*c).filter(|s| s.cardinality > 0.0).map(|s| acc * s.cardinality)
        });
        match groups {
            Some(groups) => groups.min(input),
            None => input,
        }
    }

    fn logical_rows(&self, op: &LogicalOperator, children: &[f64]) -> f64 {
        let input = children.first().copied().unwrap_or(1.0);
        match op {
            LogicalOperator::Get { table: None, .. } => 1.0,
            LogicalOperator::Get {
                table: Some(table),
                predicates,
                ..
            } => self.scan_rows(table, predicates),
            LogicalOperator::Filter { predicates } => input * self.filter_selectivity(predicates),
            LogicalOperator::Projection { .. } => input,
            LogicalOperator::InnerJoin { predicates } => {
                let right = children.get(1).copied().unwrap_or(1.0);
                self.join_rows(input, right, predicates)
            }
            LogicalOperator::OuterJoin { join_type, predicates } => {
                let right = children.get(1).copied().unwrap_or(1.0);
                self.outer_join_rows(*join_type, input, right, predicates)
            }
            LogicalOperator::Aggregate { group_by, having, .. } => {
                self.group_rows(input, group_by) * self.filter_selectivity(having)
            }
            LogicalOperator::Distinct { columns } => self.group_rows(input, columns),
            LogicalOperator::Limit { limit, .. } => input.min(*limit as f64),
            LogicalOperator::Insert { values, .. } if !values.is_empty() => values.len() as f64,
            LogicalOperator::Insert { .. } | LogicalOperator::Update { .. } | LogicalOperator::Delete { .. } => input,
        }
    }

    fn physical_rows(&self, op: &PhysicalOperator, children: &[f64]) -> f64 {
        let input = children.first().copied().unwrap_or(1.0);
        match op {
            PhysicalOperator::DummyScan => 1.0,
            PhysicalOperator::SeqScan { table, predicates, .. }
            | PhysicalOperator::IndexScan { table, predicates, .. } => self.scan_rows(table, predicates),
            PhysicalOperator::Filter { predicates } => input * self.filter_selectivity(predicates),
            PhysicalOperator::InnerNLJoin { predicates } => {
                let right = children.get(1).copied().unwrap_or(1.0);
                self.join_rows(input, right, predicates)
            }
            PhysicalOperator::OuterNLJoin { join_type, predicates } => {
                let right = children.get(1).copied().unwrap_or(1.0);
                self.outer_join_rows(*join_type, input, right, predicates)
            }
            PhysicalOperator::InnerHashJoin {
                left_keys,
                right_keys,
                predicates,
            } => {
                let right = children.get(1).copied().unwrap_or(1.0);
                let provider = self.provider();
                let keys: f64 = left_keys
                    .iter()
                    .zip(right_keys.iter())
                    .map(|(l, r)| join_selectivity(provider.column_stats(*l).as_ref(), provider.column_stats(*r).as_ref()))
                    .product();
                self.join_rows(input, right, predicates) * keys
            }
            PhysicalOperator::HashGroupBy { group_by, having, .. }
            | PhysicalOperator::SortGroupBy { group_by, having, .. } => {
                self.group_rows(input, group_by) * self.filter_selectivity(having)
            }
            PhysicalOperator::Aggregate { having, .. } => self.filter_selectivity(having),
            PhysicalOperator::HashDistinct { columns } => self.group_rows(input, columns),
            PhysicalOperator::Limit { limit, .. } => input.min(*limit as f64),
            PhysicalOperator::Insert { values, .. } if !values.is_empty() => values.len() as f64,
            PhysicalOperator::Projection { .. }
            | PhysicalOperator::OrderBy { .. }
            | PhysicalOperator::Insert { .. }
            | PhysicalOperator::Update { .. }
            | PhysicalOperator::Delete { .. } => input,
        }
    }
}

impl MemoGroupCallback for StatsCalculator {
    fn new_group(&self, memo: &Memo, expr: &GroupExpr) -> Option<f64> {
        let children: Vec<f64> = expr
            .children()
            .iter()
            .map(|c| memo.group(*c).num_rows().unwrap_or(UNKNOWN_ROW_COUNT))
            .collect();
        let num_rows = match expr.op() {
            Operator::Logical(op) => self.logical_rows(op, &children),
            Operator::Physical(op) => self.physical_rows(op, &children),
            Operator::Leaf(_) => return None,
        };
        log::debug!("Group {} num_rows: {}", expr.group_id(), num_rows);
        Some(num_rows.max(0.0))
    }
}
