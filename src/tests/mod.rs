use std::time::Duration;

use crate::cost::CostModelKind;
use crate::execution::ExecutionConfig;
use crate::meta::ColumnId;
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::expr::{AggregateFunction, BinaryOp, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;
use crate::operators::{JoinType, OperatorExpr};
use crate::optimizer::OptimizerConfig;
use crate::plan::PhysicalPlan;
use crate::properties::{PropertySet, SortKey};
use crate::testing::OptimizerTester;
use crate::txn::TransactionContext;

fn col(id: ColumnId) -> ScalarExpr {
    ScalarExpr::Column(id)
}

fn cmp(column: ColumnId, op: BinaryOp, value: i32) -> ScalarExpr {
    ScalarExpr::binary(col(column), op, ScalarExpr::Scalar(ScalarValue::Int32(value)))
}

fn parallel_config() -> ExecutionConfig {
    ExecutionConfig::default()
        .with_parallel_execution(true)
        .with_num_threads(2)
        .with_vector_size(2)
}

fn count_scans(plan: &PhysicalPlan) -> usize {
    let mut n = 0;
    plan.visit(&mut |p| {
        if matches!(p.op, PhysicalOperator::SeqScan { .. } | PhysicalOperator::IndexScan { .. }) {
            n += 1;
        }
    });
    n
}

/// a JOIN b ON a1 = b1 JOIN c ON b1 = c1 ... JOIN f ON e1 = f1
fn six_way_join(tester: &mut OptimizerTester) -> OperatorExpr {
    let b = tester.builder();
    let mut expr = b.get("a", &["a1", "a2"]).unwrap();
    let mut prev: ColumnId = 1;

    for name in ["b", "c", "d", "e", "f"].iter() {
        let c1 = format!("{}1", name);
        let c2 = format!("{}2", name);
        let right = b.get(name, &[c1.as_str(), c2.as_str()]).unwrap();
        let key = right.output_columns()[0];
        expr = b.join(expr, right, vec![ScalarExpr::column_eq(prev, key)]);
        prev = key;
    }
    expr
}

#[test]
fn index_scan_with_equality_on_key_column() {
    let mut tester = OptimizerTester::new();
    let b = tester.builder();
    let a = b.get("a", &["a1", "a2"]).unwrap();
    let filter = b.filter(a, vec![cmp(1, BinaryOp::Eq, 10)]);

    let plan = tester.optimize(filter, &PropertySet::empty());
    assert_eq!(plan.to_string().trim_end(), "IndexScan a index=a1_idx cols=[1, 2] filter=[col:1 = 10]");
    assert!((plan.cost - 0.15).abs() < 0.001, "cost: {}", plan.cost);
}

#[test]
fn seq_scan_when_predicate_does_not_use_index() {
    let mut tester = OptimizerTester::new();
    let b = tester.builder();
    let a = b.get("a", &["a1", "a2"]).unwrap();
    let filter = b.filter(a, vec![cmp(2, BinaryOp::Eq, 10)]);

    let plan = tester.optimize(filter, &PropertySet::empty());
    assert_eq!(plan.to_string().trim_end(), "SeqScan a cols=[1, 2] filter=[col:2 = 10]");
    assert!((plan.cost - 10.0).abs() < 1e-9, "cost: {}", plan.cost);
}

#[test]
fn trivial_cost_model_prefers_index_scan() {
    let mut tester = OptimizerTester::new();
    tester.set_config(OptimizerConfig::default().with_cost_model(CostModelKind::Trivial));

    let b = tester.builder();
    let a = b.get("a", &["a1", "a2"]).unwrap();
    let filter = b.filter(a, vec![cmp(2, BinaryOp::Eq, 10)]);

    tester.expect_plan(
        filter,
        &PropertySet::empty(),
        "IndexScan a index=a1_idx cols=[1, 2] filter=[col:2 = 10]",
    );
}

#[test]
fn index_scan_provides_order_of_key_columns() {
    let mut tester = OptimizerTester::new();
    let a = tester.builder().get("a", &["a1", "a2"]).unwrap();

    tester.expect_plan(
        a,
        &PropertySet::sort(vec![SortKey::asc(1)]),
        "IndexScan a index=a1_idx cols=[1, 2]",
    );
}

#[test]
fn sort_enforcer() {
    let mut tester = OptimizerTester::new();
    let a = tester.builder().get("a", &["a1", "a2"]).unwrap();

    tester.expect_plan(
        a,
        &PropertySet::sort(vec![SortKey::asc(2)]),
        r#"
OrderBy sort=[col:2 ASC]
  SeqScan a cols=[1, 2]
"#,
    );
}

#[test]
fn equi_join_uses_hash_join() {
    let mut tester = OptimizerTester::new();
    let b = tester.builder();
    let a = b.get("a", &["a1", "a2"]).unwrap();
    let t = b.get("b", &["b1", "b2"]).unwrap();
    let join = b.join(a, t, vec![ScalarExpr::column_eq(1, 3)]);

    let plan = tester.optimize(join, &PropertySet::empty());
    assert!(matches!(plan.op, PhysicalOperator::InnerHashJoin { .. }), "plan:\n{}", plan);
}

#[test]
fn rule_order_does_not_change_plan_cost() {
    let mut costs = Vec::new();

    for _ in 0..5 {
        let mut tester = OptimizerTester::new();
        let b = tester.builder();
        let a = b.get("a", &["a1", "a2"]).unwrap();
        let t = b.get("b", &["b1", "b2"]).unwrap();
        let c = b.get("c", &["c1", "c2"]).unwrap();
        let join = b.join(a, t, vec![ScalarExpr::column_eq(1, 3)]);
        let join = b.join(join, c, vec![ScalarExpr::column_eq(3, 5)]);
        let filter = b.filter(join, vec![cmp(2, BinaryOp::Gt, 10)]);

        let plan = tester.optimize(filter, &PropertySet::empty());
        assert_eq!(count_scans(&plan), 3, "plan:\n{}", plan);
        costs.push(plan.cost);
    }

    let first = costs[0];
    for cost in costs {
        assert!((cost - first).abs() < 1e-9, "costs differ: {} {}", first, cost);
    }
}

#[test]
fn timeout_returns_complete_plan() {
    let mut tester = OptimizerTester::new();
    tester.shuffle_rules(false);
    tester.set_timeout(Duration::from_millis(1));
    let expr = six_way_join(&mut tester);
    let b = tester.builder();
    let expr = b.project(expr, vec![col(2), col(8), col(10), col(12)]).unwrap();

    let plan = tester.optimize(expr.clone(), &PropertySet::empty());
    assert_eq!(count_scans(&plan), 6, "plan:\n{}", plan);

    let rows = tester.query(expr.clone(), &PropertySet::empty(), ExecutionConfig::default());
    assert_eq!(rows, vec!["10, 7, 8, 9"]);

    tester.set_timeout(Duration::from_secs(60));
    let best = tester.optimize(expr, &PropertySet::empty());
    assert!(best.cost <= plan.cost + 1e-9, "best: {} timed out: {}", best.cost, plan.cost);
}

#[test]
fn query_with_join_filter_and_order() {
    let mut tester = OptimizerTester::new();
    let b = tester.builder();
    let a = b.get("a", &["a1", "a2"]).unwrap();
    let t = b.get("b", &["b1", "b2"]).unwrap();
    let join = b.join(a, t, vec![ScalarExpr::column_eq(1, 3)]);
    let filter = b.filter(join, vec![cmp(2, BinaryOp::Gt, 10)]);
    let project = b.project(filter, vec![col(1), col(2), col(4)]).unwrap();
    let required = PropertySet::sort(vec![SortKey::desc(4)]);

    let rows = tester.query(project.clone(), &required, ExecutionConfig::default());
    assert_eq!(rows, vec!["2, 20, 3", "2, 20, 2"]);

    let rows = tester.query(project, &required, parallel_config());
    assert_eq!(rows, vec!["2, 20, 3", "2, 20, 2"]);
}

#[test]
fn query_with_left_join() {
    let mut tester = OptimizerTester::new();
    let b = tester.builder();
    let a = b.get("a", &["a1", "a2"]).unwrap();
    let c = b.get("c", &["c1", "c2"]).unwrap();
    let join = b.outer_join(JoinType::Left, a, c, vec![ScalarExpr::column_eq(1, 3)]);
    let required = PropertySet::sort(vec![SortKey::asc(1)]);

    let plan = tester.optimize(join.clone(), &required);
    assert!(plan.to_string().contains("LeftNLJoin on=[col:1 = col:3]"), "plan:\n{}", plan);

    let expected = vec!["1, 10, 1, 1", "2, 20, 2, 1", "3, 30, NULL, NULL", "4, 10, NULL, NULL"];
    let rows = tester.query(join.clone(), &required, ExecutionConfig::default());
    assert_eq!(rows, expected);

    let rows = tester.query(join, &required, parallel_config());
    assert_eq!(rows, expected);
}

#[test]
fn query_with_group_by() {
    let mut tester = OptimizerTester::new();
    let b = tester.builder();
    let t = b.get("b", &["b1", "b2"]).unwrap();
    let count = ScalarExpr::Aggregate {
        func: AggregateFunction::Count,
        args: vec![col(2)],
    };
    let aggregate = b.aggregate(t, vec![1], vec![count]).unwrap();

    let rows = tester.query(aggregate, &PropertySet::sort(vec![SortKey::asc(1)]), ExecutionConfig::default());
    assert_eq!(rows, vec!["1, 1", "2, 2", "4, 1", "5, 1"]);
}

#[test]
fn insert_and_delete() {
    let mut tester = OptimizerTester::new();
    let txn = TransactionContext::new(1);
    let empty = PropertySet::empty();

    let insert = tester
        .builder()
        .insert_values(
            "c",
            vec![
                vec![ScalarValue::Int32(3), ScalarValue::Int32(2)],
                vec![ScalarValue::Int32(0), ScalarValue::Int32(5)],
            ],
        )
        .unwrap();
    let (rows, stats) = tester.execute(insert, &empty, ExecutionConfig::default(), &txn);
    assert!(rows.is_empty(), "rows: {:?}", rows);
    assert_eq!(stats.rows_affected, 2);

    let b = tester.builder();
    let c = b.get("c", &["c1", "c2"]).unwrap();
    let c2 = c.output_columns()[1];
    let filter = b.filter(c, vec![cmp(c2, BinaryOp::Eq, 5)]);
    let delete = b.delete("c", filter).unwrap();
    let (_, stats) = tester.execute(delete, &empty, ExecutionConfig::default(), &txn);
    assert_eq!(stats.rows_affected, 1);

    let c = tester.builder().get("c", &["c1", "c2"]).unwrap();
    let c1 = c.output_columns()[0];
    let rows = tester.query(c, &PropertySet::sort(vec![SortKey::asc(c1)]), ExecutionConfig::default());
    assert_eq!(rows, vec!["1, 1", "2, 1", "3, 2"]);
}
