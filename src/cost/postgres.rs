//! A cost model that charges operators for CPU work the way PostgreSQL does.

use crate::cost::default::{bucket_size_frac, index_lookup_cost, index_scan_rows, table_rows, DefaultCostModel};
use crate::cost::{child_rows, group_rows, Cost, CostModel, DEFAULT_OPERATOR_COST, DEFAULT_TUPLE_COST};
use crate::memo::{GroupExpr, Memo};
use crate::operators::physical::PhysicalOperator;
use crate::optimizer::OptimizerContext;

/// Extends the [DefaultCostModel] with the cost of evaluating predicates and hash functions.
/// Every predicate and every hash key costs [DEFAULT_OPERATOR_COST] per row it is evaluated on.
///
/// The cost of a hash join is split into the cost of building a hash table from the left input,
/// the cost of probing it with rows of the right input and the cost of emitting matched rows.
#[derive(Debug)]
pub struct PostgresCostModel;

impl CostModel for PostgresCostModel {
    fn calculate_cost(&self, expr: &GroupExpr, memo: &Memo, ctx: &OptimizerContext) -> Cost {
        let input_rows = child_rows(expr, memo, 0);

        match expr.physical() {
            PhysicalOperator::SeqScan { table, predicates, .. } => match table_rows(table, ctx) {
                Some(rows) => rows * (DEFAULT_TUPLE_COST + qual_cost(predicates.len())),
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
                    index_lookup_cost(rows) + scanned * (DEFAULT_TUPLE_COST + qual_cost(predicates.len()))
                }
                None => 0.0,
            },
            PhysicalOperator::Filter { predicates } => input_rows * (DEFAULT_TUPLE_COST + qual_cost(predicates.len())),
            PhysicalOperator::Projection { exprs, .. } => input_rows * (DEFAULT_TUPLE_COST + qual_cost(exprs.len())),
            PhysicalOperator::InnerNLJoin { predicates } | PhysicalOperator::OuterNLJoin { predicates, .. } => {
                let right_rows = child_rows(expr, memo, 1);
                input_rows * right_rows * (DEFAULT_TUPLE_COST + qual_cost(predicates.len()))
            }
            PhysicalOperator::InnerHashJoin {
                left_keys, predicates, ..
            } => {
                let right_rows = child_rows(expr, memo, 1);
                let output_rows = group_rows(memo, expr.group_id());
                let hash_cost = qual_cost(left_keys.len());

                let build = input_rows * (DEFAULT_TUPLE_COST + hash_cost);
                let probe = right_rows * (hash_cost + bucket_size_frac(left_keys, ctx) * input_rows * DEFAULT_OPERATOR_COST);
                let emit = output_rows * (DEFAULT_TUPLE_COST + qual_cost(predicates.len()));
                build + probe + emit
            }
            PhysicalOperator::HashGroupBy {
                group_by, aggregates, ..
            } => {
                let output_rows = group_rows(memo, expr.group_id());
                input_rows * (DEFAULT_TUPLE_COST + qual_cost(group_by.len() + aggregates.len()))
                    + output_rows * DEFAULT_TUPLE_COST
            }
            PhysicalOperator::SortGroupBy {
                group_by, aggregates, ..
            } => input_rows * (DEFAULT_TUPLE_COST + qual_cost(group_by.len() + aggregates.len())),
            PhysicalOperator::Aggregate { aggregates, .. } => {
                input_rows * (DEFAULT_TUPLE_COST + qual_cost(aggregates.len()))
            }
            PhysicalOperator::HashDistinct { columns } => {
                let output_rows = group_rows(memo, expr.group_id());
                input_rows * (DEFAULT_TUPLE_COST + qual_cost(columns.len())) + output_rows * DEFAULT_TUPLE_COST
            }
            PhysicalOperator::DummyScan
            | PhysicalOperator::OrderBy { .. }
            | PhysicalOperator::Limit { .. }
            | PhysicalOperator::Insert { .. }
            | PhysicalOperator::Update { .. }
            | PhysicalOperator::Delete { .. } => DefaultCostModel.calculate_cost(expr, memo, ctx),
        }
    }
}

fn qual_cost(num_quals: usize) -> Cost {
    num_quals as f64 * DEFAULT_OPERATOR_COST
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cost::testing::CostTester;
    use crate::operators::scalar::expr::{AnnotatedExpr, BinaryOp, ScalarExpr};
    use crate::operators::scalar::value::ScalarValue;
    use crate::statistics::{ColumnStats, TableStats};

    fn assert_cost(actual: Cost, expected: Cost) {
        assert!((actual - expected).abs() < 1e-9, "cost: {} expected: {}", actual, expected);
    }

    #[test]
    fn predicates_increase_scan_cost() {
        let mut tester = CostTester::new();
        let (table, cols) = tester.add_table("a", &["a1"], Some(TableStats::new(100.0)));
        let predicate = ScalarExpr::binary(ScalarExpr::Column(cols[0]), BinaryOp::Gt, ScalarExpr::Scalar(ScalarValue::Int32(1)));

        let scan = PhysicalOperator::SeqScan {
            table: table.clone(),
            alias: "a".into(),
            columns: cols.clone(),
            predicates: vec![],
        };
        assert_cost(tester.cost(&PostgresCostModel, scan, vec![]), 1.0);

        let filtered = PhysicalOperator::SeqScan {
            table,
            alias: "a".into(),
            columns: cols,
            predicates: vec![AnnotatedExpr::new(predicate, Default::default())],
        };
        assert_cost(tester.cost(&PostgresCostModel, filtered, vec![]), 100.0 * (0.01 + 0.0025));
    }

    #[test]
    fn hash_join_is_cheaper_than_nl_join() {
        let mut tester = CostTester::new();
        let (_, a) = tester.add_table("a", &["a1"], Some(TableStats::new(1000.0).with_column("a1", ColumnStats::new(1000.0))));
        let (_, b) = tester.add_table("b", &["b1"], None);
        let left = tester.input(a.clone(), 1000.0);
        let right = tester.input(b.clone(), 1000.0);

        let nl_join = PhysicalOperator::InnerNLJoin {
            predicates: vec![AnnotatedExpr::new(ScalarExpr::column_eq(a[0], b[0]), Default::default())],
        };
        let hash_join = PhysicalOperator::InnerHashJoin {
            left_keys: a,
            right_keys: b,
            predicates: vec![],
        };
        let nl_join_cost = tester.cost(&PostgresCostModel, nl_join, vec![left, right]);
        let hash_join_cost = tester.cost(&PostgresCostModel, hash_join, vec![left, right]);

        assert!(hash_join_cost < nl_join_cost, "hash join: {} nl join: {}", hash_join_cost, nl_join_cost);
    }

    #[test]
    fn delegates_to_default_model() {
        let mut tester = CostTester::new();
        let (_, a) = tester.add_table("a", &["a1"], None);
        let input = tester.input(a, 10.0);
        let limit = PhysicalOperator::Limit {
            offset: 0,
            limit: 5,
            sort: vec![],
        };
        assert_cost(tester.cost(&PostgresCostModel, limit, vec![input]), 5.0 * 0.01);
    }
}
