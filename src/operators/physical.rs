use std::fmt::{Display, Formatter};

use crate::catalog::{Oid, TableInfo};
use crate::meta::ColumnId;
use crate::operators::scalar::expr::{AnnotatedExpr, ScalarExpr};
use crate::operators::{JoinType, OperatorFormatter};
use crate::properties::SortKey;

/// An index used by an index scan.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct IndexInfo {
    pub name: String,
    pub oid: Oid,
    /// Key columns of the index in key order.
    pub key_columns: Vec<ColumnId>,
}

impl Display for IndexInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A physical operator represents an algorithm that can be used to implement a [logical operator].
///
/// [logical operator]: crate::operators::logical::LogicalOperator
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum PhysicalOperator {
    /// Produces a single empty row.
    DummyScan,
    SeqScan {
        table: TableInfo,
        alias: String,
        columns: Vec<ColumnId>,
        predicates: Vec<AnnotatedExpr>,
    },
    /// Scans a table using an index. Rows are returned in the order of index key columns.
    IndexScan {
        table: TableInfo,
        alias: String,
        columns: Vec<ColumnId>,
        predicates: Vec<AnnotatedExpr>,
        index: IndexInfo,
    },
    Filter {
        predicates: Vec<AnnotatedExpr>,
    },
    Projection {
        exprs: Vec<ScalarExpr>,
        columns: Vec<ColumnId>,
    },
    OrderBy {
        sort: Vec<SortKey>,
    },
    Limit {
        offset: usize,
        limit: usize,
        sort: Vec<SortKey>,
    },
    InnerNLJoin {
        predicates: Vec<AnnotatedExpr>,
    },
    /// An outer nested loop join. Rows without a match are padded with NULLs.
    OuterNLJoin {
        join_type: JoinType,
        predicates: Vec<AnnotatedExpr>,
    },
    /// A hash join. The left input is the build side.
    /// `left_keys[i] = right_keys[i]` are equi-join predicates; the remaining predicates are evaluated
    /// on the joined rows.
    InnerHashJoin {
        left_keys: Vec<ColumnId>,
        right_keys: Vec<ColumnId>,
        predicates: Vec<AnnotatedExpr>,
    },
    HashGroupBy {
        group_by: Vec<ColumnId>,
        aggregates: Vec<ScalarExpr>,
        columns: Vec<ColumnId>,
        having: Vec<AnnotatedExpr>,
    },
    SortGroupBy {
        group_by: Vec<ColumnId>,
        aggregates: Vec<ScalarExpr>,
        columns: Vec<ColumnId>,
        having: Vec<AnnotatedExpr>,
    },
    /// An aggregation without grouping keys. Always produces exactly one row.
    Aggregate {
        aggregates: Vec<ScalarExpr>,
        columns: Vec<ColumnId>,
        having: Vec<AnnotatedExpr>,
    },
    HashDistinct {
        columns: Vec<ColumnId>,
    },
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

impl PhysicalOperator {
    /// The name of this operator.
    pub fn name(&self) -> &'static str {
        match self {
            PhysicalOperator::DummyScan => "DummyScan",
            PhysicalOperator::SeqScan { .. } => "SeqScan",
            PhysicalOperator::IndexScan { .. } => "IndexScan",
            PhysicalOperator::Filter { .. } => "Filter",
            PhysicalOperator::Projection { .. } => "Projection",
            PhysicalOperator::OrderBy { .. } => "OrderBy",
            PhysicalOperator::Limit { .. } => "Limit",
            PhysicalOperator::InnerNLJoin { .. } => "InnerNLJoin",
            PhysicalOperator::OuterNLJoin { join_type, .. } => match join_type {
                JoinType::Left => "LeftNLJoin",
                JoinType::Right => "RightNLJoin",
                JoinType::Full => "FullNLJoin",
            },
            PhysicalOperator::InnerHashJoin { .. } => "InnerHashJoin",
            PhysicalOperator::HashGroupBy { .. } => "HashGroupBy",
            PhysicalOperator::SortGroupBy { .. } => "SortGroupBy",
            PhysicalOperator::Aggregate { .. } => "Aggregate",
            PhysicalOperator::HashDistinct { .. } => "HashDistinct",
            PhysicalOperator::Insert { .. } => "Insert",
            PhysicalOperator::Update { .. } => "Update",
            PhysicalOperator::Delete { .. } => "Delete",
        }
    }

    /// Returns columns produced by this operator given the output columns of its inputs.
    pub fn output_columns(&self, children: &[Vec<ColumnId>]) -> Vec<ColumnId> {
        match self {
            PhysicalOperator::DummyScan => Vec::new(),
            PhysicalOperator::SeqScan { columns, .. } | PhysicalOperator::IndexScan { columns, .. } => columns.clone(),
            PhysicalOperator::Projection { columns, .. } => columns.clone(),
            PhysicalOperator::InnerNLJoin { .. }
            | PhysicalOperator::OuterNLJoin { .. }
            | PhysicalOperator::InnerHashJoin { .. } => children.iter().flatten().copied().collect(),
            PhysicalOperator::HashGroupBy { group_by, columns, .. }
            | PhysicalOperator::SortGroupBy { group_by, columns, .. } => {
                group_by.iter().chain(columns.iter()).copied().collect()
            }
            PhysicalOperator::Aggregate { columns, .. } => columns.clone(),
            PhysicalOperator::Filter { .. }
            | PhysicalOperator::OrderBy { .. }
            | PhysicalOperator::Limit { .. }
            | PhysicalOperator::HashDistinct { .. } => children.first().cloned().unwrap_or_default(),
            PhysicalOperator::Insert { .. } | PhysicalOperator::Update { .. } | PhysicalOperator::Delete { .. } => {
                Vec::new()
            }
        }
    }

    /// Returns `true` if this is a data modification operator.
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            PhysicalOperator::Insert { .. } | PhysicalOperator::Update { .. } | PhysicalOperator::Delete { .. }
        )
    }

    pub fn format<F>(&self, f: &mut F)
    where
        F: OperatorFormatter,
    {
        f.write_name(self.name());
        match self {
            PhysicalOperator::DummyScan => f.write_children(),
            PhysicalOperator::SeqScan {
                table,
                alias,
                columns,
                predicates,
            } => {
                f.write_source(&table.name);
                if alias != &table.name {
                    f.write_value("alias", alias);
                }
                f.write_children();
                f.write_values("cols", columns);
                f.write_values("filter", predicates);
            }
            PhysicalOperator::IndexScan {
                table,
                alias,
                columns,
                predicates,
                index,
            } => {
                f.write_source(&table.name);
                if alias != &table.name {
                    f.write_value("alias", alias);
                }
                f.write_children();
                f.write_value("index", index);
                f.write_values("cols", columns);
                f.write_values("filter", predicates);
            }
            PhysicalOperator::Filter { predicates } => {
                f.write_children();
                f.write_values("filter", predicates);
            }
            PhysicalOperator::Projection { exprs, columns } => {
                f.write_children();
                f.write_values("cols", columns);
                f.write_values("exprs", exprs);
            }
            PhysicalOperator::OrderBy { sort } => {
                f.write_children();
                f.write_values("sort", sort);
            }
            PhysicalOperator::Limit { offset, limit, sort } => {
                f.write_children();
                f.write_value("limit", limit);
                if *offset > 0 {
                    f.write_value("offset", offset);
                }
                f.write_values("sort", sort);
            }
            PhysicalOperator::InnerNLJoin { predicates } | PhysicalOperator::OuterNLJoin { predicates, .. } => {
                f.write_children();
                f.write_values("on", predicates);
            }
            PhysicalOperator::InnerHashJoin {
                left_keys,
                right_keys,
                predicates,
            } => {
                f.write_children();
                f.write_values("left_keys", left_keys);
                f.write_values("right_keys", right_keys);
                f.write_values("on", predicates);
            }
            PhysicalOperator::HashGroupBy {
                group_by,
                aggregates,
                columns,
                having,
            }
            | PhysicalOperator::SortGroupBy {
                group_by,
                aggregates,
                columns,
                having,
            } => {
                f.write_children();
                f.write_values("group_by", group_by);
                f.write_values("aggrs", aggregates);
                f.write_values("cols", columns);
                f.write_values("having", having);
            }
            PhysicalOperator::Aggregate {
                aggregates,
                columns,
                having,
            } => {
                f.write_children();
                f.write_values("aggrs", aggregates);
                f.write_values("cols", columns);
                f.write_values("having", having);
            }
            PhysicalOperator::HashDistinct { columns } => {
                f.write_children();
                f.write_values("cols", columns);
            }
            PhysicalOperator::Insert { table, columns, values } => {
                f.write_source(&table.name);
                f.write_children();
                f.write_values("cols", columns);
                if !values.is_empty() {
                    f.write_value("rows", values.len());
                }
            }
            PhysicalOperator::Update { table, updates } => {
                f.write_source(&table.name);
                f.write_children();
                let updates: Vec<String> = updates.iter().map(|(c, e)| format!("col:{}={}", c, e)).collect();
                f.write_values("set", &updates);
            }
            PhysicalOperator::Delete { table } => {
                f.write_source(&table.name);
                f.write_children();
            }
        }
    }
}
