use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::catalog::{TableBuilder, TableInfo};
use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::compilation::{CompiledQuery, ExecutionStats};
use crate::execution::config::ExecutionConfig;
use crate::execution::consumer::BufferingConsumer;
use crate::execution::table_storage::MemoryTableStorage;
use crate::meta::{ColumnId, ColumnMetadata, Metadata, TableColumn};
use crate::operators::physical::{IndexInfo, PhysicalOperator};
use crate::operators::scalar::expr::{AggregateFunction, AnnotatedExpr, BinaryOp, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;
use crate::operators::JoinType;
use crate::plan::PhysicalPlan;
use crate::properties::SortKey;
use crate::txn::TransactionContext;

struct TestDatabase {
    metadata: Metadata,
    storage: MemoryTableStorage,
    next_oid: u32,
}

impl TestDatabase {
    fn new() -> Self {
        TestDatabase {
            metadata: Metadata::new(),
            storage: MemoryTableStorage::new(),
            next_oid: 100,
        }
    }

    fn add_table(
        &mut self,
        name: &str,
        columns: &[(&str, DataType)],
        rows: Vec<Vec<ScalarValue>>,
    ) -> (TableInfo, Vec<ColumnId>) {
        let oid = self.next_oid;
        self.next_oid += 1;

        let mut builder = TableBuilder::new(name, oid);
        for (column, data_type) in columns {
            builder = builder.add_column(column, *data_type);
        }
        let table = builder.build().expect("Invalid table");
        self.storage.create_table(&table).expect("Failed to create a table");
        self.storage.load_rows(oid, rows).expect("Failed to load rows");

        let info = table.info();
        let ids = columns
            .iter()
            .enumerate()
            .map(|(i, (column, data_type))| {
                let table_column = TableColumn {
                    alias: name.to_string(),
                    table: info.clone(),
                    column_index: i,
                };
                let column = ColumnMetadata::new_table_column(column.to_string(), *data_type, table_column);
                self.metadata.add_column(column)
            })
            .collect();
        (info, ids)
    }

    fn add_column(&mut self, name: &str, data_type: DataType) -> ColumnId {
        self.metadata.add_column(ColumnMetadata::new_synthetic_column(name.to_string(), data_type))
    }

    fn run(
        &self,
        plan: &PhysicalPlan,
        config: ExecutionConfig,
        txn: &TransactionContext,
    ) -> Result<(Vec<String>, ExecutionStats), ExecutionError> {
        let query = CompiledQuery::compile(plan, &self.metadata, config)?;
        let consumer = BufferingConsumer::new();
        let stats = query.execute(txn, &self.storage, &consumer)?;
        let rows = consumer.take_rows().into_iter().map(|r| r.to_string()).collect();
        Ok((rows, stats))
    }

    fn query(&self, plan: &PhysicalPlan) -> Vec<String> {
        self.query_with_config(plan, ExecutionConfig::default())
    }

    fn query_with_config(&self, plan: &PhysicalPlan, config: ExecutionConfig) -> Vec<String> {
        let (rows, _) = self.run(plan, config, &TransactionContext::new(1)).expect("Failed to execute a query");
        rows
    }

    fn explain(&self, plan: &PhysicalPlan, config: ExecutionConfig) -> String {
        let query = CompiledQuery::compile(plan, &self.metadata, config).expect("Failed to compile a query");
        query.explain()
    }
}

fn parallel_config() -> ExecutionConfig {
    ExecutionConfig::default()
        .with_parallel_execution(true)
        .with_num_threads(4)
        .with_vector_size(16)
}

fn sorted(mut rows: Vec<String>) -> Vec<String> {
    rows.sort();
    rows
}

fn node(op: PhysicalOperator, children: Vec<PhysicalPlan>) -> PhysicalPlan {
    PhysicalPlan {
        op,
        children,
        cost: 0.0,
        num_rows: None,
    }
}

fn seq_scan(table: &TableInfo, columns: &[ColumnId]) -> PhysicalPlan {
    node(
        PhysicalOperator::SeqScan {
            table: table.clone(),
            alias: table.name.clone(),
            columns: columns.to_vec(),
            predicates: vec![],
        },
        vec![],
    )
}

fn filter(expr: ScalarExpr, input: PhysicalPlan) -> PhysicalPlan {
    node(
        PhysicalOperator::Filter {
            predicates: vec![predicate(expr)],
        },
        vec![input],
    )
}

fn predicate(expr: ScalarExpr) -> AnnotatedExpr {
    AnnotatedExpr::new(expr, BTreeSet::new())
}

fn col(id: ColumnId) -> ScalarExpr {
    ScalarExpr::Column(id)
}

fn int(v: i32) -> ScalarExpr {
    ScalarExpr::Scalar(ScalarValue::Int32(v))
}

fn string(v: &str) -> ScalarValue {
    ScalarValue::String(v.to_string())
}

fn binary(lhs: ScalarExpr, op: BinaryOp, rhs: ScalarExpr) -> ScalarExpr {
    ScalarExpr::binary(lhs, op, rhs)
}

fn aggr(func: AggregateFunction, args: Vec<ScalarExpr>) -> ScalarExpr {
    ScalarExpr::Aggregate { func, args }
}

/// Table `a(a1 int, a2 string, a3 int)`.
fn table_a(db: &mut TestDatabase) -> (TableInfo, Vec<ColumnId>) {
    db.add_table(
        "a",
        &[("a1", DataType::Int32), ("a2", DataType::String), ("a3", DataType::Int32)],
        vec![
            vec![ScalarValue::Int32(1), string("x"), ScalarValue::Int32(10)],
            vec![ScalarValue::Int32(2), string("y"), ScalarValue::Null],
            vec![ScalarValue::Int32(3), string("x"), ScalarValue::Int32(30)],
            vec![ScalarValue::Int32(4), string("z"), ScalarValue::Int32(5)],
        ],
    )
}

/// Table `b(b1 bigint, b2 string)`.
fn table_b(db: &mut TestDatabase) -> (TableInfo, Vec<ColumnId>) {
    db.add_table(
        "b",
        &[("b1", DataType::Int64), ("b2", DataType::String)],
        vec![
            vec![ScalarValue::Int64(1), string("one")],
            vec![ScalarValue::Int64(3), string("three")],
            vec![ScalarValue::Int64(3), string("three again")],
            vec![ScalarValue::Null, string("null")],
            vec![ScalarValue::Int64(5), string("five")],
        ],
    )
}

fn hash_join(
    left_keys: Vec<ColumnId>,
    right_keys: Vec<ColumnId>,
    left: PhysicalPlan,
    right: PhysicalPlan,
) -> PhysicalPlan {
    node(
        PhysicalOperator::InnerHashJoin {
            left_keys,
            right_keys,
            predicates: vec![],
        },
        vec![left, right],
    )
}

#[test]
fn filter_and_projection() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);
    let expr = db.add_column("expr", DataType::Int32);

    let plan = node(
        PhysicalOperator::Projection {
            exprs: vec![binary(col(cols[0]), BinaryOp::Multiply, int(10)), col(cols[1])],
            columns: vec![expr, cols[1]],
        },
        vec![filter(binary(col(cols[0]), BinaryOp::Gt, int(1)), seq_scan(&a, &cols))],
    );

    assert_eq!(db.query(&plan), vec!["20, 'y'", "30, 'x'", "40, 'z'"]);
}

#[test]
fn scan_predicates_on_columns_not_in_output() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);

    let plan = node(
        PhysicalOperator::SeqScan {
            table: a.clone(),
            alias: "a".into(),
            columns: vec![cols[1]],
            predicates: vec![predicate(binary(col(cols[2]), BinaryOp::Gt, int(6)))],
        },
        vec![],
    );

    assert_eq!(db.query(&plan), vec!["'x'", "'x'"]);
}

#[test]
fn index_scan_returns_rows_in_key_order() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);

    let plan = node(
        PhysicalOperator::IndexScan {
            table: a.clone(),
            alias: "a".into(),
            columns: vec![cols[1], cols[2]],
            predicates: vec![],
            index: IndexInfo {
                name: "a_a3_idx".into(),
                oid: 200,
                key_columns: vec![cols[2]],
            },
        },
        vec![],
    );

    assert_eq!(db.query(&plan), vec!["'z', 5", "'x', 10", "'x', 30", "'y', NULL"]);
    assert_eq!(db.explain(&plan, parallel_config()), "0: serial IndexScan#0\n");
}

#[test]
fn order_by_places_nulls_first_in_descending_order() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);

    let plan = node(
        PhysicalOperator::OrderBy {
            sort: vec![SortKey::desc(cols[2])],
        },
        vec![seq_scan(&a, &[cols[0], cols[2]])],
    );

    let expected = vec!["2, NULL", "3, 30", "1, 10", "4, 5"];
    assert_eq!(db.query(&plan), expected);
    assert_eq!(db.query_with_config(&plan, parallel_config().with_vector_size(1)), expected);
    assert_eq!(db.explain(&plan, parallel_config()), "0: serial OrderBy#0\n1: parallel OrderBy#0 -> SeqScan#1\n");
}

#[test]
fn limit_with_offset() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);

    let plan = node(
        PhysicalOperator::Limit {
            offset: 1,
            limit: 2,
            sort: vec![],
        },
        vec![seq_scan(&a, &cols[0..1])],
    );

    assert_eq!(db.query(&plan), vec!["2", "3"]);
    assert_eq!(db.query_with_config(&plan, parallel_config().with_vector_size(1)), vec!["2", "3"]);
}

#[test]
fn distinct_passes_first_row_of_every_key() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);

    let plan = node(
        PhysicalOperator::HashDistinct { columns: vec![cols[1]] },
        vec![seq_scan(&a, &cols[0..2])],
    );

    assert_eq!(db.query(&plan), vec!["1, 'x'", "2, 'y'", "4, 'z'"]);
}

#[test]
fn hash_join_basic() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (b, b_cols) = table_b(&mut db);

    let plan = hash_join(
        vec![a_cols[0]],
        vec![b_cols[0]],
        seq_scan(&a, &a_cols[0..2]),
        seq_scan(&b, &b_cols),
    );

    let expected = vec!["1, 'x', 1, 'one'", "3, 'x', 3, 'three'", "3, 'x', 3, 'three again'"];
    assert_eq!(db.query(&plan), expected);

    let config = parallel_config().with_vector_size(1).with_bloom_filter(true).with_prefetch(true);
    assert_eq!(sorted(db.query_with_config(&plan, config)), sorted(db.query(&plan)));
}

#[test]
fn hash_join_residual_predicates() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (b, b_cols) = table_b(&mut db);

    let plan = node(
        PhysicalOperator::InnerHashJoin {
            left_keys: vec![a_cols[0]],
            right_keys: vec![b_cols[0]],
            predicates: vec![predicate(binary(
                col(b_cols[1]),
                BinaryOp::NotEq,
                ScalarExpr::Scalar(string("three")),
            ))],
        },
        vec![seq_scan(&a, &a_cols[0..2]), seq_scan(&b, &b_cols)],
    );

    assert_eq!(db.query(&plan), vec!["1, 'x', 1, 'one'", "3, 'x', 3, 'three again'"]);
}

#[test]
fn hash_join_incompatible_keys() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (b, b_cols) = table_b(&mut db);

    let plan = hash_join(vec![a_cols[1]], vec![b_cols[0]], seq_scan(&a, &a_cols), seq_scan(&b, &b_cols));
    let err = CompiledQuery::compile(&plan, &db.metadata, ExecutionConfig::default()).unwrap_err();

    assert_eq!(
        err.to_string(),
        format!(
            "Argument error: Join keys col:{} and col:{} have incompatible types: String and Int64",
            a_cols[1], b_cols[0]
        )
    );
}

#[test]
fn stage_boundary_at_the_input_of_the_build_side() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (b, b_cols) = table_b(&mut db);

    // Rows of the filter reach the build side in batches. The build side rejects single rows.
    let left = filter(binary(col(a_cols[0]), BinaryOp::Gt, int(1)), seq_scan(&a, &a_cols[0..2]));
    let plan = hash_join(vec![a_cols[0]], vec![b_cols[0]], left, seq_scan(&b, &b_cols));

    let config = ExecutionConfig::default();
    assert_eq!(
        db.explain(&plan, config.clone()),
        "0: parallel InnerHashJoin#0 -> SeqScan#3\n1: parallel InnerHashJoin#0 -> Filter#1 -> SeqScan#2 boundaries=[1]\n"
    );
    assert_eq!(db.query_with_config(&plan, config), vec!["3, 'x', 3, 'three'", "3, 'x', 3, 'three again'"]);

    let config = parallel_config().with_vector_size(2).with_prefetch(true);
    assert_eq!(
        db.explain(&plan, config.clone()),
        "0: parallel InnerHashJoin#0 -> SeqScan#3 boundaries=[1]\n1: parallel InnerHashJoin#0 -> Filter#1 -> SeqScan#2 boundaries=[1]\n"
    );
    assert_eq!(
        sorted(db.query_with_config(&plan, config)),
        vec!["3, 'x', 3, 'three again'", "3, 'x', 3, 'three'"]
    );
}

#[test]
fn hash_join_matches_nested_loop_join() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut random_rows = |n: usize| -> Vec<Vec<ScalarValue>> {
        (0..n)
            .map(|i| {
                let key = if rng.gen_bool(0.1) {
                    ScalarValue::Null
                } else {
                    ScalarValue::Int32(rng.gen_range(0..20))
                };
                vec![key, ScalarValue::Int32(i as i32)]
            })
            .collect()
    };
    let left_rows = random_rows(200);
    let right_rows = random_rows(150);

    let mut db = TestDatabase::new();
    let (l, l_cols) = db.add_table("l", &[("k", DataType::Int32), ("v", DataType::Int32)], left_rows);
    let (r, r_cols) = db.add_table("r", &[("k", DataType::Int32), ("v", DataType::Int32)], right_rows);

    let hash_join_plan = hash_join(vec![l_cols[0]], vec![r_cols[0]], seq_scan(&l, &l_cols), seq_scan(&r, &r_cols));
    let nl_join_plan = node(
        PhysicalOperator::InnerNLJoin {
            predicates: vec![predicate(ScalarExpr::column_eq(l_cols[0], r_cols[0]))],
        },
        vec![seq_scan(&l, &l_cols), seq_scan(&r, &r_cols)],
    );

    let expected = sorted(db.query(&nl_join_plan));
    assert!(!expected.is_empty(), "No matching rows");
    assert!(expected.iter().all(|r| !r.contains("NULL")), "NULL keys must not match");

    assert_eq!(sorted(db.query(&hash_join_plan)), expected, "serial hash join");

    let config = parallel_config().with_bloom_filter(true).with_prefetch(true);
    assert_eq!(sorted(db.query_with_config(&hash_join_plan, config)), expected, "parallel hash join");
    assert_eq!(
        sorted(db.query_with_config(&nl_join_plan, parallel_config())),
        expected,
        "parallel nested loop join"
    );
}

fn outer_nl_join(join_type: JoinType, left: PhysicalPlan, right: PhysicalPlan, on: ScalarExpr) -> PhysicalPlan {
    node(
        PhysicalOperator::OuterNLJoin {
            join_type,
            predicates: vec![predicate(on)],
        },
        vec![left, right],
    )
}

#[test]
fn left_join_pads_unmatched_rows_with_nulls() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (b, b_cols) = table_b(&mut db);

    let plan = outer_nl_join(
        JoinType::Left,
        seq_scan(&a, &a_cols[0..2]),
        seq_scan(&b, &b_cols),
        ScalarExpr::column_eq(a_cols[0], b_cols[0]),
    );

    let expected = vec![
        "1, 'x', 1, 'one'",
        "2, 'y', NULL, NULL",
        "3, 'x', 3, 'three again'",
        "3, 'x', 3, 'three'",
        "4, 'z', NULL, NULL",
    ];
    assert_eq!(sorted(db.query(&plan)), expected);
    assert_eq!(sorted(db.query_with_config(&plan, parallel_config().with_vector_size(1))), expected);
}

#[test]
fn right_and_full_joins_emit_unmatched_rows_of_the_right_input() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (b, b_cols) = table_b(&mut db);

    let join = |join_type| {
        outer_nl_join(
            join_type,
            seq_scan(&a, &a_cols[0..2]),
            seq_scan(&b, &b_cols),
            ScalarExpr::column_eq(a_cols[0], b_cols[0]),
        )
    };

    let right = join(JoinType::Right);
    let expected = vec![
        "1, 'x', 1, 'one'",
        "3, 'x', 3, 'three again'",
        "3, 'x', 3, 'three'",
        "NULL, NULL, 5, 'five'",
        "NULL, NULL, NULL, 'null'",
    ];
    assert_eq!(sorted(db.query(&right)), expected);
    assert_eq!(sorted(db.query_with_config(&right, parallel_config().with_vector_size(1))), expected);

    let full = join(JoinType::Full);
    let expected = vec![
        "1, 'x', 1, 'one'",
        "2, 'y', NULL, NULL",
        "3, 'x', 3, 'three again'",
        "3, 'x', 3, 'three'",
        "4, 'z', NULL, NULL",
        "NULL, NULL, 5, 'five'",
        "NULL, NULL, NULL, 'null'",
    ];
    assert_eq!(sorted(db.query(&full)), expected);
    assert_eq!(sorted(db.query_with_config(&full, parallel_config().with_vector_size(1))), expected);
}

#[test]
fn right_join_with_empty_left_input() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (b, b_cols) = table_b(&mut db);

    let plan = outer_nl_join(
        JoinType::Right,
        filter(binary(col(a_cols[0]), BinaryOp::Gt, int(100)), seq_scan(&a, &a_cols[0..1])),
        seq_scan(&b, &b_cols[1..2]),
        binary(col(a_cols[0]), BinaryOp::Gt, int(0)),
    );

    let expected = vec!["NULL, 'five'", "NULL, 'null'", "NULL, 'one'", "NULL, 'three again'", "NULL, 'three'"];
    assert_eq!(sorted(db.query(&plan)), expected);
    assert_eq!(sorted(db.query_with_config(&plan, parallel_config())), expected);
}

#[test]
fn hash_group_by() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);
    let count = db.add_column("count", DataType::Int64);
    let sum = db.add_column("sum", DataType::Int32);
    let avg = db.add_column("avg", DataType::Decimal);

    let group_by = |having: Vec<AnnotatedExpr>| {
        node(
            PhysicalOperator::HashGroupBy {
                group_by: vec![cols[1]],
                aggregates: vec![
                    aggr(AggregateFunction::Count, vec![]),
                    aggr(AggregateFunction::Sum, vec![col(cols[2])]),
                    aggr(AggregateFunction::Avg, vec![col(cols[2])]),
                ],
                columns: vec![count, sum, avg],
                having,
            },
            vec![seq_scan(&a, &cols)],
        )
    };

    let plan = group_by(vec![]);
    let expected = vec!["'x', 2, 40, 20", "'y', 1, NULL, NULL", "'z', 1, 5, 5"];
    assert_eq!(sorted(db.query(&plan)), expected);
    assert_eq!(sorted(db.query_with_config(&plan, parallel_config().with_vector_size(1))), expected);

    let plan = group_by(vec![predicate(binary(
        col(count),
        BinaryOp::Gt,
        ScalarExpr::Scalar(ScalarValue::Int64(1)),
    ))]);
    assert_eq!(db.query(&plan), vec!["'x', 2, 40, 20"]);
}

#[test]
fn parallel_hash_group_by_merges_partial_aggregates() {
    let mut rng = StdRng::seed_from_u64(7);
    let rows = (0..1000)
        .map(|_| {
            let value = if rng.gen_bool(0.05) {
                ScalarValue::Null
            } else {
                ScalarValue::Int64(rng.gen_range(-100..100))
            };
            vec![ScalarValue::Int32(rng.gen_range(0..50)), value]
        })
        .collect();

    let mut db = TestDatabase::new();
    let (t, cols) = db.add_table("t", &[("k", DataType::Int32), ("v", DataType::Int64)], rows);
    let columns = vec![
        db.add_column("count", DataType::Int64),
        db.add_column("count_v", DataType::Int64),
        db.add_column("min", DataType::Int64),
        db.add_column("max", DataType::Int64),
        db.add_column("sum", DataType::Int64),
        db.add_column("avg", DataType::Decimal),
    ];
    let plan = node(
        PhysicalOperator::HashGroupBy {
            group_by: vec![cols[0]],
            aggregates: vec![
                aggr(AggregateFunction::Count, vec![]),
                aggr(AggregateFunction::Count, vec![col(cols[1])]),
                aggr(AggregateFunction::Min, vec![col(cols[1])]),
                aggr(AggregateFunction::Max, vec![col(cols[1])]),
                aggr(AggregateFunction::Sum, vec![col(cols[1])]),
                aggr(AggregateFunction::Avg, vec![col(cols[1])]),
            ],
            columns,
            having: vec![],
        },
        vec![seq_scan(&t, &cols)],
    );

    let serial = sorted(db.query(&plan));
    assert_eq!(serial.len(), 50);
    assert_eq!(sorted(db.query_with_config(&plan, parallel_config())), serial);
}

#[test]
fn aggregate_without_input_rows() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);
    let count = db.add_column("count", DataType::Int64);
    let sum = db.add_column("sum", DataType::Int32);

    let aggregate = |input: PhysicalPlan| {
        node(
            PhysicalOperator::Aggregate {
                aggregates: vec![
                    aggr(AggregateFunction::Count, vec![]),
                    aggr(AggregateFunction::Sum, vec![col(cols[2])]),
                ],
                columns: vec![count, sum],
                having: vec![],
            },
            vec![input],
        )
    };

    let plan = aggregate(seq_scan(&a, &cols));
    assert_eq!(db.query(&plan), vec!["4, 45"]);
    assert_eq!(db.query_with_config(&plan, parallel_config().with_vector_size(1)), vec!["4, 45"]);

    let plan = aggregate(filter(binary(col(cols[0]), BinaryOp::Gt, int(100)), seq_scan(&a, &cols)));
    assert_eq!(db.query(&plan), vec!["0, NULL"]);
}

#[test]
fn sort_group_by() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);
    let count = db.add_column("count", DataType::Int64);
    let max = db.add_column("max", DataType::Int32);

    let plan = node(
        PhysicalOperator::SortGroupBy {
            group_by: vec![cols[1]],
            aggregates: vec![
                aggr(AggregateFunction::Count, vec![]),
                aggr(AggregateFunction::Max, vec![col(cols[0])]),
            ],
            columns: vec![count, max],
            having: vec![],
        },
        vec![node(
            PhysicalOperator::OrderBy {
                sort: vec![SortKey::asc(cols[1])],
            },
            vec![seq_scan(&a, &cols)],
        )],
    );

    let expected = vec!["'x', 2, 3", "'y', 1, 2", "'z', 1, 4"];
    assert_eq!(db.query(&plan), expected);
    assert_eq!(db.query_with_config(&plan, parallel_config().with_vector_size(1)), expected);
    assert_eq!(
        db.explain(&plan, parallel_config()),
        "0: serial SortGroupBy#0 -> OrderBy#1\n1: parallel OrderBy#1 -> SeqScan#2\n"
    );
}

#[test]
fn insert_update_delete() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);
    let txn = TransactionContext::new(1);
    let config = ExecutionConfig::default;

    let insert = node(
        PhysicalOperator::Insert {
            table: a.clone(),
            columns: vec![cols[0], cols[1]],
            values: vec![
                vec![int(5), ScalarExpr::Scalar(string("w"))],
                vec![int(6), ScalarExpr::Scalar(string("v"))],
            ],
        },
        vec![],
    );
    let (rows, stats) = db.run(&insert, config(), &txn).expect("Insert failed");
    assert!(rows.is_empty());
    assert_eq!(stats.rows_affected, 2);
    assert_eq!(db.storage.num_rows(a.oid).expect("No table"), 6);

    let update = node(
        PhysicalOperator::Update {
            table: a.clone(),
            updates: vec![(cols[2], binary(col(cols[0]), BinaryOp::Multiply, int(2)))],
        },
        vec![filter(binary(col(cols[0]), BinaryOp::Gt, int(4)), seq_scan(&a, &cols))],
    );
    let (_, stats) = db.run(&update, config(), &txn).expect("Update failed");
    assert_eq!(stats.rows_affected, 2);

    let delete = node(
        PhysicalOperator::Delete { table: a.clone() },
        vec![filter(ScalarExpr::IsNull(Box::new(col(cols[2]))), seq_scan(&a, &cols))],
    );
    let (_, stats) = db.run(&delete, config(), &txn).expect("Delete failed");
    assert_eq!(stats.rows_affected, 1);

    assert_eq!(
        db.query(&seq_scan(&a, &cols)),
        vec!["1, 'x', 10", "3, 'x', 30", "4, 'z', 5", "5, 'w', 10", "6, 'v', 12"]
    );
}

#[test]
fn insert_rows_of_a_query() {
    let mut db = TestDatabase::new();
    let (a, a_cols) = table_a(&mut db);
    let (c, c_cols) = db.add_table("c", &[("c1", DataType::Int64), ("c2", DataType::String)], vec![]);

    let plan = node(
        PhysicalOperator::Insert {
            table: c.clone(),
            columns: c_cols.clone(),
            values: vec![],
        },
        vec![filter(binary(col(a_cols[0]), BinaryOp::LtEq, int(2)), seq_scan(&a, &a_cols[0..2]))],
    );
    let (_, stats) = db.run(&plan, ExecutionConfig::default(), &TransactionContext::new(1)).expect("Insert failed");

    assert_eq!(stats.rows_affected, 2);
    assert_eq!(db.query(&seq_scan(&c, &c_cols)), vec!["1, 'x'", "2, 'y'"]);
}

#[test]
fn modification_in_read_only_transaction() {
    let mut db = TestDatabase::new();
    let (a, cols) = table_a(&mut db);

    let plan = node(
        PhysicalOperator::Delete { table: a.clone() },
        vec![seq_scan(&a, &cols)],
    );
    let err = db.run(&plan, ExecutionConfig::default(), &TransactionContext::read_only(2)).unwrap_err();

    assert_eq!(err.to_string(), "Argument error: Transaction 2 is read-only");
    assert_eq!(db.storage.num_rows(a.oid).expect("No table"), 4);
}
