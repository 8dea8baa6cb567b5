//! Test setup for the optimizer and for queries executed end to end.

use std::sync::{Arc, Once};
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::catalog::mutable::MutableCatalog;
use crate::catalog::{IndexBuilder, TableBuilder};
use crate::datatypes::DataType;
use crate::execution::{BufferingConsumer, CompiledQuery, ExecutionConfig, ExecutionStats, MemoryTableStorage};
use crate::meta::MetadataRef;
use crate::operators::builder::OperatorBuilder;
use crate::operators::scalar::value::ScalarValue;
use crate::operators::OperatorExpr;
use crate::optimizer::{Optimizer, OptimizerConfig, OptimizerContext};
use crate::plan::{format_plan, PhysicalPlan};
use crate::properties::PropertySet;
use crate::rules::{Rule, RuleSet};
use crate::statistics::{ColumnStats, MemoryStatsStorage, TableStats};
use crate::txn::TransactionContext;

static INIT_LOG: Once = Once::new();

/// Initializes a logger. Subsequent calls have no effect.
pub fn init_logging() {
    INIT_LOG.call_once(pretty_env_logger::init);
}

/// Tables, indexes, statistics and rows described in YAML:
///
/// ```text
/// tables:
///   - name: a
///     rows: 1000
///     columns:
///       - { name: a1, type: int32, cardinality: 100 }
///       - { name: a2, type: string }
///     indexes:
///       - { name: a1_idx, columns: [a1] }
///     data:
///       - [1, 'one']
/// ```
///
/// `rows` and `cardinality` set the statistics used by the optimizer and `data` is loaded into the storage.
/// A table without `rows` has no statistics.
#[derive(Debug, Deserialize)]
pub struct CatalogFixture {
    tables: Vec<TableFixture>,
}

#[derive(Debug, Deserialize)]
struct TableFixture {
    name: String,
    #[serde(default)]
    rows: Option<f64>,
    columns: Vec<ColumnFixture>,
    #[serde(default)]
    indexes: Vec<IndexFixture>,
    #[serde(default)]
    data: Vec<Vec<serde_yaml::Value>>,
}

#[derive(Debug, Deserialize)]
struct ColumnFixture {
    name: String,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    cardinality: Option<f64>,
    #[serde(default)]
    frac_null: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IndexFixture {
    name: String,
    columns: Vec<String>,
    #[serde(default)]
    unique: bool,
}

impl CatalogFixture {
    pub fn from_yaml(yaml: &str) -> Self {
        serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("Invalid catalog fixture: {}\n{}", e, yaml))
    }

    /// Registers tables of this fixture in the given catalog, statistics and storage.
    pub fn load(&self, catalog: &MutableCatalog, stats: &MemoryStatsStorage, storage: &MemoryTableStorage) {
        let mut next_oid = 100;

        for table in self.tables.iter() {
            let types: Vec<DataType> = table.columns.iter().map(|c| parse_data_type(&c.data_type)).collect();
            let mut builder = TableBuilder::new(&table.name, next_oid);
            next_oid += 1;
            for (column, data_type) in table.columns.iter().zip(types.iter()) {
                builder = builder.add_column(&column.name, *data_type);
            }
            let table_def = builder.build().expect("Invalid table");

            storage.create_table(&table_def).expect("Failed to create a table");
            let rows = table
                .data
                .iter()
                .map(|row| {
                    assert_eq!(row.len(), types.len(), "Table {}: invalid row {:?}", table.name, row);
                    row.iter().zip(types.iter()).map(|(v, t)| yaml_value(v, *t)).collect()
                })
                .collect();
            storage.load_rows(table_def.oid(), rows).expect("Failed to load rows");

            if let Some(num_rows) = table.rows {
                let mut table_stats = TableStats::new(num_rows);
                for column in table.columns.iter() {
                    if let Some(cardinality) = column.cardinality {
                        let column_stats = ColumnStats::new(cardinality).with_frac_null(column.frac_null.unwrap_or(0.0));
                        table_stats = table_stats.with_column(&column.name, column_stats);
                    }
                }
                stats.set_table_stats(table_def.database_oid(), table_def.oid(), table_stats);
            }

            let table_ref = catalog.add_table(table_def).expect("Failed to add a table");
            for index in table.indexes.iter() {
                let mut builder = IndexBuilder::new(table_ref.clone(), &index.name, next_oid);
                next_oid += 1;
                for column in index.columns.iter() {
                    builder = builder.add_column(column);
                }
                if index.unique {
                    builder = builder.unique();
                }
                catalog.add_index(builder.build().expect("Invalid index")).expect("Failed to add an index");
            }
        }
    }
}

fn parse_data_type(name: &str) -> DataType {
    match name.to_lowercase().as_str() {
        "bool" => DataType::Bool,
        "tinyint" => DataType::TinyInt,
        "smallint" => DataType::SmallInt,
        "int32" | "int" => DataType::Int32,
        "int64" | "bigint" => DataType::Int64,
        "decimal" => DataType::Decimal,
        "date" => DataType::Date,
        "timestamp" => DataType::Timestamp,
        "string" => DataType::String,
        _ => panic!("Unexpected data type: {}", name),
    }
}

fn yaml_value(value: &serde_yaml::Value, data_type: DataType) -> ScalarValue {
    let value = match value {
        serde_yaml::Value::Null => ScalarValue::Null,
        serde_yaml::Value::Bool(v) => ScalarValue::Bool(*v),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(v) => ScalarValue::Int64(v),
            None => ScalarValue::Decimal(n.as_f64().unwrap_or_default().into()),
        },
        serde_yaml::Value::String(s) => ScalarValue::String(s.clone()),
        _ => panic!("Unexpected value: {:?}", value),
    };
    value
        .cast(data_type)
        .unwrap_or_else(|| panic!("Can not convert {} to {}", value, data_type))
}

/// The catalog used by [OptimizerTester::new].
///
/// Tables `a` and `b` have statistics and an index on their first column, tables `c`, `d`, `e` and `f`
/// only have statistics. Every table has two `INT` columns and a few rows.
pub const DEFAULT_CATALOG: &str = r#"
tables:
  - name: a
    rows: 1000
    columns:
      - { name: a1, type: int32, cardinality: 100 }
      - { name: a2, type: int32, cardinality: 10 }
    indexes:
      - { name: a1_idx, columns: [a1] }
    data:
      - [1, 10]
      - [2, 20]
      - [3, 30]
      - [4, 10]
  - name: b
    rows: 100
    columns:
      - { name: b1, type: int32, cardinality: 100 }
      - { name: b2, type: int32, cardinality: 5 }
    indexes:
      - { name: b1_idx, columns: [b1], unique: true }
    data:
      - [1, 1]
      - [2, 2]
      - [2, 3]
      - [4, 4]
      - [5, 5]
  - name: c
    rows: 50
    columns:
      - { name: c1, type: int32, cardinality: 50 }
      - { name: c2, type: int32, cardinality: 5 }
    data:
      - [1, 1]
      - [2, 1]
  - name: d
    rows: 200
    columns:
      - { name: d1, type: int32, cardinality: 100 }
      - { name: d2, type: int32, cardinality: 20 }
    data:
      - [1, 7]
  - name: e
    rows: 300
    columns:
      - { name: e1, type: int32, cardinality: 300 }
      - { name: e2, type: int32, cardinality: 30 }
    data:
      - [1, 8]
  - name: f
    rows: 20
    columns:
      - { name: f1, type: int32, cardinality: 20 }
      - { name: f2, type: int32, cardinality: 2 }
    data:
      - [1, 9]
"#;

/// Provides a test setup for the [optimizer](crate::optimizer::Optimizer).
///
/// By default the tester uses all available rules in random order and [DEFAULT_CATALOG].
pub struct OptimizerTester {
    catalog: Arc<MutableCatalog>,
    stats: Arc<MemoryStatsStorage>,
    storage: MemoryTableStorage,
    builder: OperatorBuilder,
    config: OptimizerConfig,
    shuffle_rules: bool,
    rules_filter: Box<dyn Fn(&dyn Rule) -> bool>,
}

impl OptimizerTester {
    pub fn new() -> Self {
        Self::with_catalog(DEFAULT_CATALOG)
    }

    /// Creates a tester that uses a catalog described by the given [fixture](CatalogFixture).
    pub fn with_catalog(yaml: &str) -> Self {
        init_logging();

        let catalog = Arc::new(MutableCatalog::new());
        let stats = Arc::new(MemoryStatsStorage::new());
        let storage = MemoryTableStorage::new();
        CatalogFixture::from_yaml(yaml).load(&catalog, &stats, &storage);

        let builder = OperatorBuilder::new(catalog.clone(), TransactionContext::new(1));

        OptimizerTester {
            catalog,
            stats,
            storage,
            builder,
            config: OptimizerConfig::default(),
            shuffle_rules: true,
            rules_filter: Box::new(|_| true),
        }
    }

    /// Returns a builder used to create operator trees.
    pub fn builder(&mut self) -> &mut OperatorBuilder {
        &mut self.builder
    }

    /// A toggle to enable/disable rule shuffling.
    pub fn shuffle_rules(&mut self, value: bool) {
        self.shuffle_rules = value;
    }

    /// Rules that satisfy the given predicate won't be used by the optimizer.
    pub fn disable_rules<F>(&mut self, f: F)
    where
        F: Fn(&dyn Rule) -> bool + 'static,
    {
        self.rules_filter = Box::new(move |r| !(f)(r));
    }

    pub fn set_config(&mut self, config: OptimizerConfig) {
        self.config = config;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.config = self.config.clone().with_timeout_limit(timeout);
    }

    /// Optimizes the given operator tree.
    pub fn optimize(&self, expr: OperatorExpr, required: &PropertySet) -> PhysicalPlan {
        let optimizer = Optimizer::new(triomphe::Arc::new(self.rules()));
        let ctx = self.context();
        let plan = optimizer
            .optimize(expr, required, &ctx)
            .unwrap_or_else(|e| panic!("Failed to optimize an operator tree: {}", e));

        log::debug!("Plan:\n{}", format_plan(&plan));
        plan
    }

    /// Optimizes the given operator tree and compares the result with the expected plan.
    pub fn expect_plan(&self, expr: OperatorExpr, required: &PropertySet, expected: &str) {
        let plan = self.optimize(expr, required);
        assert_eq!(format_plan(&plan).trim_end(), expected.trim(), "plan does not match");
    }

    /// Optimizes the given operator tree, executes the plan and returns the rows it produced.
    pub fn query(&self, expr: OperatorExpr, required: &PropertySet, config: ExecutionConfig) -> Vec<String> {
        let (rows, _) = self.execute(expr, required, config, &TransactionContext::new(1));
        rows
    }

    /// Optimizes and executes the given operator tree.
    pub fn execute(
        &self,
        expr: OperatorExpr,
        required: &PropertySet,
        config: ExecutionConfig,
        txn: &TransactionContext,
    ) -> (Vec<String>, ExecutionStats) {
        let plan = self.optimize(expr, required);
        let query = CompiledQuery::compile(&plan, self.builder.metadata(), config)
            .unwrap_or_else(|e| panic!("Failed to compile a plan: {}\n{}", e, format_plan(&plan)));
        let consumer = BufferingConsumer::new();
        let stats = query
            .execute(txn, &self.storage, &consumer)
            .unwrap_or_else(|e| panic!("Failed to execute a plan: {}\n{}", e, format_plan(&plan)));
        let rows = consumer.take_rows().into_iter().map(|r| r.to_string()).collect();
        (rows, stats)
    }

    fn rules(&self) -> RuleSet {
        let mut rules = RuleSet::default();
        rules.retain(|r| (self.rules_filter)(r));
        if self.shuffle_rules {
            rules.reorder(|rules| rules.shuffle(&mut rand::thread_rng()));
        }
        rules
    }

    fn context(&self) -> OptimizerContext {
        OptimizerContext::new(
            self.catalog.clone(),
            self.stats.clone(),
            TransactionContext::new(1),
            MetadataRef::new(self.builder.metadata().clone()),
        )
        .with_config(self.config.clone())
    }
}
