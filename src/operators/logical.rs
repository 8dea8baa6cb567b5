use crate::catalog::TableInfo;
use crate::meta::ColumnId;
use crate::operators::scalar::expr::{AnnotatedExpr, ScalarExpr};
use crate::operators::{JoinType, OpType, OperatorFormatter};
use crate::properties::SortKey;

/// A logical operator describes a high-level operation without specifying an algorithm to be used.
/// Inputs of a logical operator are stored separately (see [OperatorExpr](crate::operators::OperatorExpr)).
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum LogicalOperator {
    /// Retrieves rows from a table. A `Get` without a table produces a single empty row.
    Get {
        table: Option<TableInfo>,
        alias: String,
        columns: Vec<ColumnId>,
        predicates: Vec<AnnotatedExpr>,
    },
    Filter {
        predicates: Vec<AnnotatedExpr>,
    },
    Projection {
        exprs: Vec<ScalarExpr>,
        columns: Vec<ColumnId>,
    },
    InnerJoin {
        predicates: Vec<AnnotatedExpr>,
    },
    /// A left, right or full outer join. Unlike inner joins outer joins are never reordered.
    OuterJoin {
        join_type: JoinType,
        predicates: Vec<AnnotatedExpr>,
    },
    /// An aggregation. Output columns are `group_by` columns followed by `columns`
    /// where `columns[i]` stores the result of `aggregates[i]`.
    Aggregate {
        group_by: Vec<ColumnId>,
        aggregates: Vec<ScalarExpr>,
        columns: Vec<ColumnId>,
        having: Vec<AnnotatedExpr>,
    },
    Distinct {
        columns: Vec<ColumnId>,
    },
    Limit {
        offset: usize,
        limit: usize,
        sort: Vec<SortKey>,
    },
    /// Inserts rows into a table. Rows are either `values` (no inputs) or rows produced by the input operator.
    Insert {
        table: TableInfo,
        columns: Vec<ColumnId>,
        values: Vec<Vec<ScalarExpr>>,
    },
    Update {
        table: TableInfo,
        updates: Vec<(ColumnId, ScalarExpr)>,
    },
    Delete {
        table: TableInfo,
    },
}

impl LogicalOperator {
    /// Returns the type of this operator.
    pub fn op_type(&self) -> OpType {
        match self {
            LogicalOperator::Get { .. } => OpType::Get,
            LogicalOperator::Filter { .. } => OpType::Filter,
            LogicalOperator::Projection { .. } => OpType::Projection,
            LogicalOperator::InnerJoin { .. } => OpType::InnerJoin,
            LogicalOperator::OuterJoin { .. } => OpType::OuterJoin,
            LogicalOperator::Aggregate { .. } => OpType::Aggregate,
            LogicalOperator::Distinct { .. } => OpType::Distinct,
            LogicalOperator::Limit { .. } => OpType::Limit,
            LogicalOperator::Insert { .. } => OpType::Insert,
            LogicalOperator::Update { .. } => OpType::Update,
            LogicalOperator::Delete { .. } => OpType::Delete,
        }
    }

    /// The number of inputs this operator expects.
    pub fn num_children(&self) -> usize {
        match self {
            LogicalOperator::Get { .. } => 0,
            LogicalOperator::InnerJoin { .. } | LogicalOperator::OuterJoin { .. } => 2,
            LogicalOperator::Insert { values, .. } if !values.is_empty() => 0,
            _ => 1,
        }
    }

    /// Returns columns produced by this operator given the output columns of its inputs.
    pub fn output_columns(&self, children: &[Vec<ColumnId>]) -> Vec<ColumnId> {
        match self {
            LogicalOperator::Get { columns, .. } => columns.clone(),
            LogicalOperator::Projection { columns, .. } => columns.clone(),
            LogicalOperator::InnerJoin { .. } | LogicalOperator::OuterJoin { .. } => {
                children.iter().flatten().copied().collect()
            }
            LogicalOperator::Aggregate { group_by, columns, .. } => {
                group_by.iter().chain(columns.iter()).copied().collect()
            }
            LogicalOperator::Filter { .. } | LogicalOperator::Distinct { .. } | LogicalOperator::Limit { .. } => {
                children.first().cloned().unwrap_or_default()
            }
            LogicalOperator::Insert { .. } | LogicalOperator::Update { .. } | LogicalOperator::Delete { .. } => {
                Vec::new()
            }
        }
    }

    /// Returns predicates of this operator.
    pub fn predicates(&self) -> &[AnnotatedExpr] {
        match self {
            LogicalOperator::Get { predicates, .. }
            | LogicalOperator::Filter { predicates }
            | LogicalOperator::InnerJoin { predicates }
            | LogicalOperator::OuterJoin { predicates, .. } => predicates,
            LogicalOperator::Aggregate { having, .. } => having,
            _ => &[],
        }
    }

    pub fn format<F>(&self, f: &mut F)
    where
        F: OperatorFormatter,
    {
        match self {
            LogicalOperator::Get {
                table,
                alias,
                columns,
                predicates,
            } => {
                f.write_name("LogicalGet");
                match table {
                    Some(table) => {
                        f.write_source(&table.name);
                        if alias != &table.name {
                            f.write_value("alias", alias);
                        }
                    }
                    None => f.write_source("dummy"),
                }
                f.write_children();
                f.write_values("cols", columns);
                f.write_values("filter", predicates);
            }
            LogicalOperator::Filter { predicates } => {
                f.write_name("LogicalFilter");
                f.write_children();
                f.write_values("filter", predicates);
            }
            LogicalOperator::Projection { exprs, columns } => {
                f.write_name("LogicalProjection");
                f.write_children();
                f.write_values("cols", columns);
                f.write_values("exprs", exprs);
            }
            LogicalOperator::InnerJoin { predicates } => {
                f.write_name("LogicalInnerJoin");
                f.write_children();
                f.write_values("on", predicates);
            }
            LogicalOperator::OuterJoin { join_type, predicates } => {
                f.write_name(&format!("Logical{}Join", join_type));
                f.write_children();
                f.write_values("on", predicates);
            }
            LogicalOperator::Aggregate {
                group_by,
                aggregates,
                columns,
                having,
            } => {
                f.write_name("LogicalAggregate");
                f.write_children();
                f.write_values("group_by", group_by);
                f.write_values("aggrs", aggregates);
                f.write_values("cols", columns);
                f.write_values("having", having);
            }
            LogicalOperator::Distinct { columns } => {
                f.write_name("LogicalDistinct");
                f.write_children();
                f.write_values("cols", columns);
            }
            LogicalOperator::Limit { offset, limit, sort } => {
                f.write_name("LogicalLimit");
                f.write_children();
                f.write_value("limit", limit);
                if *offset > 0 {
                    f.write_value("offset", offset);
                }
                f.write_values("sort", sort);
            }
            LogicalOperator::Insert { table, columns, values } => {
                f.write_name("LogicalInsert");
                f.write_source(&table.name);
                f.write_children();
                f.write_values("cols", columns);
                if !values.is_empty() {
                    f.write_value("rows", values.len());
                }
            }
            LogicalOperator::Update { table, updates } => {
                f.write_name("LogicalUpdate");
                f.write_source(&table.name);
                f.write_children();
                let updates: Vec<String> = updates.iter().map(|(c, e)| format!("col:{}={}", c, e)).collect();
                f.write_values("set", &updates);
            }
            LogicalOperator::Delete { table } => {
                f.write_name("LogicalDelete");
                f.write_source(&table.name);
                f.write_children();
            }
        }
    }
}
