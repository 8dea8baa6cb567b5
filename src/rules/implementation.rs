//! Implementation rules. See [rules module](super).

use crate::catalog::Index;
use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::logical::LogicalOperator;
use crate::operators::physical::{IndexInfo, PhysicalOperator};
use crate::operators::scalar::expr::AnnotatedExpr;
use crate::operators::{OpType, OperatorExpr};
use crate::rules::pattern::Pattern;
use crate::rules::{Rule, RuleContext, RuleType};

/// Replaces the logical operator of the given expression with the given physical operator.
/// Inputs of the expression are retained.
fn implement(op: PhysicalOperator, expr: &OperatorExpr) -> Vec<OperatorExpr> {
    vec![OperatorExpr::physical(op, expr.children.clone())]
}

macro_rules! implementation_rule_boilerplate {
    ($name:ident, $op_type:expr) => {
        impl $name {
            pub fn new() -> Self {
                $name {
                    pattern: Pattern::any_inputs($op_type),
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::new()
            }
        }
    };
}

macro_rules! implementation_rule_methods {
    ($name:ident) => {
        fn name(&self) -> String {
            stringify!($name).into()
        }

        fn rule_type(&self) -> RuleType {
            RuleType::Implementation
        }

        fn pattern(&self) -> &Pattern {
            &self.pattern
        }
    };
}

/// `Get` without a table => `DummyScan`.
#[derive(Debug)]
pub struct GetToDummyScan {
    pattern: Pattern,
}

implementation_rule_boilerplate!(GetToDummyScan, OpType::Get);

impl Rule for GetToDummyScan {
    implementation_rule_methods!(GetToDummyScan);

    fn check(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> bool {
        matches!(expr.logical_op(), LogicalOperator::Get { table: None, .. })
    }

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        Ok(implement(PhysicalOperator::DummyScan, expr))
    }
}

/// `Get` => `SeqScan`.
#[derive(Debug)]
pub struct GetToSeqScan {
    pattern: Pattern,
}

implementation_rule_boilerplate!(GetToSeqScan, OpType::Get);

impl Rule for GetToSeqScan {
    implementation_rule_methods!(GetToSeqScan);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Get {
                table: Some(table),
                alias,
                columns,
                predicates,
            } => {
                let scan = PhysicalOperator::SeqScan {
                    table: table.clone(),
                    alias: alias.clone(),
                    columns: columns.clone(),
                    predicates: predicates.clone(),
                };
                Ok(implement(scan, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Get` => `IndexScan`. Produces an index scan for every index of the table
/// which key columns are accessible through the scanned table alias.
#[derive(Debug)]
pub struct GetToIndexScan {
    pattern: Pattern,
}

implementation_rule_boilerplate!(GetToIndexScan, OpType::Get);

impl GetToIndexScan {
    fn key_columns(&self, ctx: &RuleContext, alias: &str, columns: &[ColumnId], index: &Index) -> Option<Vec<ColumnId>> {
        let metadata = ctx.metadata();
        index
            .key_attrs()
            .iter()
            .map(|attr| {
                columns.iter().copied().find(|id| {
                    metadata
                        .find_column(id)
                        .and_then(|c| c.table())
                        .map(|t| t.alias == alias && t.column_index == *attr)
                        .unwrap_or(false)
                })
            })
            .collect()
    }
}

impl Rule for GetToIndexScan {
    implementation_rule_methods!(GetToIndexScan);

    fn check(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> bool {
        matches!(expr.logical_op(), LogicalOperator::Get { table: Some(_), .. })
    }

    fn transform(&self, expr: &OperatorExpr, ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        let (table, alias, columns, predicates) = match expr.logical_op() {
            LogicalOperator::Get {
                table: Some(table),
                alias,
                columns,
                predicates,
            } => (table, alias, columns, predicates),
            _ => return Ok(Vec::new()),
        };
        let indexes = ctx.catalog().get_indexes(table.oid, ctx.txn());
        let mut result = Vec::with_capacity(indexes.len());

        for index in indexes.iter() {
            let key_columns = match self.key_columns(ctx, alias, columns, index) {
                Some(key_columns) => key_columns,
                None => {
                    log::debug!("{}: index {} has key columns not produced by {}", self.name(), index.name(), alias);
                    continue;
                }
            };
            let scan = PhysicalOperator::IndexScan {
                table: table.clone(),
                alias: alias.clone(),
                columns: columns.clone(),
                predicates: predicates.clone(),
                index: IndexInfo {
                    name: index.name().to_string(),
                    oid: index.oid(),
                    key_columns,
                },
            };
            result.extend(implement(scan, expr));
        }

        Ok(result)
    }
}

/// `Filter` => `Filter`.
#[derive(Debug)]
pub struct LogicalFilterToPhysical {
    pattern: Pattern,
}

implementation_rule_boilerplate!(LogicalFilterToPhysical, OpType::Filter);

impl Rule for LogicalFilterToPhysical {
    implementation_rule_methods!(LogicalFilterToPhysical);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Filter { predicates } => {
                let filter = PhysicalOperator::Filter {
                    predicates: predicates.clone(),
                };
                Ok(implement(filter, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Projection` => `Projection`.
#[derive(Debug)]
pub struct LogicalProjectionToPhysical {
    pattern: Pattern,
}

implementation_rule_boilerplate!(LogicalProjectionToPhysical, OpType::Projection);

impl Rule for LogicalProjectionToPhysical {
    implementation_rule_methods!(LogicalProjectionToPhysical);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Projection { exprs, columns } => {
                let projection = PhysicalOperator::Projection {
                    exprs: exprs.clone(),
                    columns: columns.clone(),
                };
                Ok(implement(projection, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `InnerJoin` => `InnerNLJoin`.
#[derive(Debug)]
pub struct InnerJoinToInnerNLJoin {
    pattern: Pattern,
}

implementation_rule_boilerplate!(InnerJoinToInnerNLJoin, OpType::InnerJoin);

impl Rule for InnerJoinToInnerNLJoin {
    implementation_rule_methods!(InnerJoinToInnerNLJoin);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::InnerJoin { predicates } => {
                let join = PhysicalOperator::InnerNLJoin {
                    predicates: predicates.clone(),
                };
                Ok(implement(join, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `OuterJoin` => `OuterNLJoin`.
#[derive(Debug)]
pub struct OuterJoinToOuterNLJoin {
    pattern: Pattern,
}

implementation_rule_boilerplate!(OuterJoinToOuterNLJoin, OpType::OuterJoin);

impl Rule for OuterJoinToOuterNLJoin {
    implementation_rule_methods!(OuterJoinToOuterNLJoin);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::OuterJoin { join_type, predicates } => {
                let join = PhysicalOperator::OuterNLJoin {
                    join_type: *join_type,
                    predicates: predicates.clone(),
                };
                Ok(implement(join, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `InnerJoin` => `InnerHashJoin`. Applicable only to joins with at least one equality predicate
/// between a column of the left input and a column of the right input.
#[derive(Debug)]
pub struct InnerJoinToInnerHashJoin {
    pattern: Pattern,
}

implementation_rule_boilerplate!(InnerJoinToInnerHashJoin, OpType::InnerJoin);

impl Rule for InnerJoinToInnerHashJoin {
    implementation_rule_methods!(InnerJoinToInnerHashJoin);

    fn check(&self, expr: &OperatorExpr, ctx: &RuleContext) -> bool {
        let has_keys = !split_join_keys(expr, ctx).0.is_empty();
        if !has_keys {
            log::debug!("{}: no equi-join predicates", self.name());
        }
        has_keys
    }

    fn transform(&self, expr: &OperatorExpr, ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        let (keys, predicates) = split_join_keys(expr, ctx);
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let (left_keys, right_keys) = keys.into_iter().unzip();
        let join = PhysicalOperator::InnerHashJoin {
            left_keys,
            right_keys,
            predicates,
        };
        Ok(implement(join, expr))
    }
}

/// Splits predicates of a join into pairs of key columns `(left, right)` and the remaining predicates.
fn split_join_keys(
    expr: &OperatorExpr,
    ctx: &RuleContext,
) -> (Vec<(ColumnId, ColumnId)>, Vec<AnnotatedExpr>) {
    let left = ctx.output_columns(expr.child(0));
    let right = ctx.output_columns(expr.child(1));
    let mut keys = Vec::new();
    let mut residual = Vec::new();

    for predicate in expr.logical_op().predicates() {
        match predicate.expr.as_column_equality() {
            Some((l, r)) if left.contains(&l) && right.contains(&r) => keys.push((l, r)),
            Some((l, r)) if left.contains(&r) && right.contains(&l) => keys.push((r, l)),
            _ => residual.push(predicate.clone()),
        }
    }
    (keys, residual)
}

/// `Aggregate` with grouping keys => `HashGroupBy`.
#[derive(Debug)]
pub struct GroupByToHashGroupBy {
    pattern: Pattern,
}

implementation_rule_boilerplate!(GroupByToHashGroupBy, OpType::Aggregate);

impl Rule for GroupByToHashGroupBy {
    implementation_rule_methods!(GroupByToHashGroupBy);

    fn check(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> bool {
        has_group_by(expr)
    }

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Aggregate {
                group_by,
                aggregates,
                columns,
                having,
            } if !group_by.is_empty() => {
                let op = PhysicalOperator::HashGroupBy {
                    group_by: group_by.clone(),
                    aggregates: aggregates.clone(),
                    columns: columns.clone(),
                    having: having.clone(),
                };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Aggregate` with grouping keys => `SortGroupBy`.
#[derive(Debug)]
pub struct GroupByToSortGroupBy {
    pattern: Pattern,
}

implementation_rule_boilerplate!(GroupByToSortGroupBy, OpType::Aggregate);

impl Rule for GroupByToSortGroupBy {
    implementation_rule_methods!(GroupByToSortGroupBy);

    fn check(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> bool {
        has_group_by(expr)
    }

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Aggregate {
                group_by,
                aggregates,
                columns,
                having,
            } if !group_by.is_empty() => {
                let op = PhysicalOperator::SortGroupBy {
                    group_by: group_by.clone(),
                    aggregates: aggregates.clone(),
                    columns: columns.clone(),
                    having: having.clone(),
                };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Aggregate` without grouping keys => `Aggregate`.
#[derive(Debug)]
pub struct AggregateToPlainAggregate {
    pattern: Pattern,
}

implementation_rule_boilerplate!(AggregateToPlainAggregate, OpType::Aggregate);

impl Rule for AggregateToPlainAggregate {
    implementation_rule_methods!(AggregateToPlainAggregate);

    fn check(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> bool {
        !has_group_by(expr)
    }

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Aggregate {
                group_by,
                aggregates,
                columns,
                having,
            } if group_by.is_empty() => {
                let op = PhysicalOperator::Aggregate {
                    aggregates: aggregates.clone(),
                    columns: columns.clone(),
                    having: having.clone(),
                };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn has_group_by(expr: &OperatorExpr) -> bool {
    matches!(expr.logical_op(), LogicalOperator::Aggregate { group_by, .. } if !group_by.is_empty())
}

/// `Distinct` => `HashDistinct`.
#[derive(Debug)]
pub struct DistinctToHashDistinct {
    pattern: Pattern,
}

implementation_rule_boilerplate!(DistinctToHashDistinct, OpType::Distinct);

impl Rule for DistinctToHashDistinct {
    implementation_rule_methods!(DistinctToHashDistinct);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Distinct { columns } => {
                let op = PhysicalOperator::HashDistinct {
                    columns: columns.clone(),
                };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Limit` => `Limit`.
#[derive(Debug)]
pub struct LimitToPhysical {
    pattern: Pattern,
}

implementation_rule_boilerplate!(LimitToPhysical, OpType::Limit);

impl Rule for LimitToPhysical {
    implementation_rule_methods!(LimitToPhysical);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Limit { offset, limit, sort } => {
                let op = PhysicalOperator::Limit {
                    offset: *offset,
                    limit: *limit,
                    sort: sort.clone(),
                };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Insert` => `Insert`.
#[derive(Debug)]
pub struct InsertToPhysical {
    pattern: Pattern,
}

implementation_rule_boilerplate!(InsertToPhysical, OpType::Insert);

impl Rule for InsertToPhysical {
    implementation_rule_methods!(InsertToPhysical);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Insert { table, columns, values } => {
                let op = PhysicalOperator::Insert {
                    table: table.clone(),
                    columns: columns.clone(),
                    values: values.clone(),
                };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Update` => `Update`.
#[derive(Debug)]
pub struct UpdateToPhysical {
    pattern: Pattern,
}

implementation_rule_boilerplate!(UpdateToPhysical, OpType::Update);

impl Rule for UpdateToPhysical {
    implementation_rule_methods!(UpdateToPhysical);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Update { table, updates } => {
                let op = PhysicalOperator::Update {
                    table: table.clone(),
                    updates: updates.clone(),
                };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// `Delete` => `Delete`.
#[derive(Debug)]
pub struct DeleteToPhysical {
    pattern: Pattern,
}

implementation_rule_boilerplate!(DeleteToPhysical, OpType::Delete);

impl Rule for DeleteToPhysical {
    implementation_rule_methods!(DeleteToPhysical);

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.logical_op() {
            LogicalOperator::Delete { table } => {
                let op = PhysicalOperator::Delete { table: table.clone() };
                Ok(implement(op, expr))
            }
            _ => Ok(Vec::new()),
        }
    }
}
