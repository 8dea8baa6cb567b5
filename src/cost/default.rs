//! The default cost model.

use crate::catalog::TableInfo;
use crate::cost::{child_rows, Cost, CostModel, DEFAULT_INDEX_TUPLE_COST, DEFAULT_TUPLE_COST};
use crate::memo::{GroupExpr, Memo};
use crate::meta::ColumnId;
use crate::operators::physical::{IndexInfo, PhysicalOperator};
use crate::operators::scalar::expr::{AnnotatedExpr, BinaryOp};
use crate::optimizer::OptimizerContext;
use crate::statistics::selectivity::{equality_selectivity, ColumnStatsProvider};
use crate::statistics::simple::TableColumnStats;

/// The smallest fraction of build-side rows a hash bucket can hold.
const MIN_BUCKET_SIZE_FRAC: f64 = 1.0e-6;

/// Estimates the cost of an operator from the number of rows it processes.
///
/// * `DummyScan` costs nothing.
/// * `SeqScan` costs `rows * TUPLE_COST`, or `1` if the table has no statistics.
/// * `IndexScan` costs `log2(rows) * INDEX_TUPLE_COST + scanned_rows * TUPLE_COST` where `scanned_rows`
///   is reduced by equality predicates on the leading key columns of the index. It costs `0` if the table
///   has no statistics.
/// * `OrderBy` costs `rows * log2(rows) * TUPLE_COST`.
/// * Nested loop joins (inner and outer) cost `left_rows * right_rows * TUPLE_COST`.
/// * `InnerHashJoin` costs `(left_rows + right_rows * bucket_size_frac) * TUPLE_COST` where
///   `bucket_size_frac` is the fraction of build side rows a probe is expected to visit.
/// * Hash-based aggregation and distinct pay for both building a hash table and scanning it.
#[derive(Debug)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn calculate_cost(&self, expr: &GroupExpr, memo: &Memo, ctx: &OptimizerContext) -> Cost {
        let input_rows = child_rows(expr, memo, 0);

        match expr.physical() {
            PhysicalOperator::DummyScan => 0.0,
            PhysicalOperator::SeqScan { table, .. } => match table_rows(table, ctx) {
                Some(rows) => rows * DEFAULT_TUPLE_COST,
                None => 1.0,
            },
            PhysicalOperator::IndexScan {
                table,
                predicates,
                index,
                ..
            } => match table_rows(table, ctx) {
                Some(rows) => {
                    let scanned = index_scan_rows(rows, index, predicates, ctx);
                    index_lookup_cost(rows) + scanned * DEFAULT_TUPLE_COST
                }
                None => 0.0,
            },
            PhysicalOperator::Filter { .. } | PhysicalOperator::Projection { .. } => input_rows * DEFAULT_TUPLE_COST,
            PhysicalOperator::OrderBy { .. } => sort_cost(input_rows),
            PhysicalOperator::Limit { limit, .. } => input_rows.min(*limit as f64) * DEFAULT_TUPLE_COST,
            PhysicalOperator::InnerNLJoin { .. } | PhysicalOperator::OuterNLJoin { .. } => {
                let right_rows = child_rows(expr, memo, 1);
                input_rows * right_rows * DEFAULT_TUPLE_COST
            }
            PhysicalOperator::InnerHashJoin { left_keys, .. } => {
                let right_rows = child_rows(expr, memo, 1);
                let bucket_size_frac = bucket_size_frac(left_keys, ctx);
                (input_rows + right_rows * bucket_size_frac) * DEFAULT_TUPLE_COST
            }
            PhysicalOperator::HashGroupBy { .. } | PhysicalOperator::HashDistinct { .. } => {
                hash_cost(input_rows) + group_by_cost(input_rows)
            }
            PhysicalOperator::SortGroupBy { .. } | PhysicalOperator::Aggregate { .. } => group_by_cost(input_rows),
            PhysicalOperator::Insert { values, .. } if !values.is_empty() => values.len() as f64 * DEFAULT_TUPLE_COST,
            PhysicalOperator::Insert { .. } | PhysicalOperator::Update { .. } | PhysicalOperator::Delete { .. } => {
                input_rows * DEFAULT_TUPLE_COST
            }
        }
    }
}

/// Returns the number of rows in the given table or `None` if the table has no statistics.
pub(crate) fn table_rows(table: &TableInfo, ctx: &OptimizerContext) -> Option<f64> {
    let provider = TableColumnStats::new(&ctx.metadata, ctx.stats.as_ref(), &ctx.txn);
    provider.table_rows(table)
}

/// The cost of descending an index with the given number of entries.
pub(crate) fn index_lookup_cost(rows: f64) -> Cost {
    if rows > 1.0 {
        rows.log2() * DEFAULT_INDEX_TUPLE_COST
    } else {
        0.0
    }
}

/// Estimates the number of index entries an index scan reads.
/// Only equality predicates on a prefix of the key columns of the index narrow the scan.
pub(crate) fn index_scan_rows(rows: f64, index: &IndexInfo, predicates: &[AnnotatedExpr], ctx: &OptimizerContext) -> f64 {
    let provider = TableColumnStats::new(&ctx.metadata, ctx.stats.as_ref(), &ctx.txn);
    let mut selectivity = 1.0;

    for key in index.key_columns.iter() {
        let value = predicates.iter().find_map(|p| match p.expr.as_column_comparison() {
            Some((column, BinaryOp::Eq, value)) if column == *key => Some(value),
            _ => None,
        });
        match value {
            Some(value) => {
                let stats = provider.column_stats(*key);
                selectivity *= equality_selectivity(stats.as_ref(), value);
            }
            None => break,
        }
    }

    rows * selectivity
}

/// Estimates the fraction of the build side of a hash join stored in a single hash bucket.
/// Uses the number of distinct values of the first key column adjusted by the frequency of
/// its most common value. Returns `1.0` when there are no statistics.
pub(crate) fn bucket_size_frac(build_keys: &[ColumnId], ctx: &OptimizerContext) -> f64 {
    let provider = TableColumnStats::new(&ctx.metadata, ctx.stats.as_ref(), &ctx.txn);
    let stats = match build_keys.first().and_then(|c| provider.column_stats(*c)) {
        Some(stats) if stats.cardinality >= 1.0 => stats,
        _ => return 1.0,
    };

    let ndistinct = stats.cardinality;
    let mut frac = 1.0 / ndistinct;

    let avg_freq = (1.0 - stats.frac_null) / ndistinct;
    if let Some(max_freq) = stats.max_most_common_freq() {
        if avg_freq > 0.0 && max_freq > avg_freq {
            frac *= max_freq / avg_freq;
        }
    }

    frac.max(MIN_BUCKET_SIZE_FRAC).min(1.0)
}

/// `rows * log2(rows) * TUPLE_COST`.
pub(crate) fn sort_cost(rows: f64) -> Cost {
    if rows <= 0.0 {
        1.0
    } else if rows <= 1.0 {
        0.0
    } else {
        rows * rows.log2() * DEFAULT_TUPLE_COST
    }
}

pub(crate) fn hash_cost(rows: f64) -> Cost {
    rows * DEFAULT_TUPLE_COST
}

pub(crate) fn group_by_cost(rows: f64) -> Cost {
    rows * DEFAULT_TUPLE_COST
}
