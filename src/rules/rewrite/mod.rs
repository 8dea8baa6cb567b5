//! Rewrite rules. Rewrite rules are applied to an operator tree before it is copied into a memo.
//!
//! Operator-level rules ([PushFilterThroughJoin], [CombineConsecutiveFilter], [EmbedFilterIntoGet])
//! form the [PredicatePushDown](super::RewriteRuleSetName::PredicatePushDown) rule set.
//! Scalar-level rules that simplify predicates are applied by the [ExpressionRewriter](expression::ExpressionRewriter).

use crate::error::OptimizerError;
use crate::meta::ColumnId;
use crate::operators::logical::LogicalOperator;
use crate::operators::scalar::expr::AnnotatedExpr;
use crate::operators::{OpType, OperatorExpr};
use crate::rules::pattern::Pattern;
use crate::rules::{Rule, RuleContext, RuleType};

pub mod expression;

/// Pushes predicates of a filter placed on top of an inner join into the join's inputs.
///
/// ```text
///   Filter a.x > 1 AND b.y > 2 AND a.x = b.y       InnerJoin a.x = b.y
///     InnerJoin                                =>    Filter a.x > 1
///       A                                              A
///       B                                            Filter b.y > 2
///                                                      B
/// ```
/// Predicates of the join that reference only one of its inputs are pushed down as well.
/// Predicates that reference both inputs or no columns at all become predicates of the join.
#[derive(Debug)]
pub struct PushFilterThroughJoin {
    pattern: Pattern,
}

impl PushFilterThroughJoin {
    pub fn new() -> Self {
        let join = Pattern::new(OpType::InnerJoin, vec![Pattern::leaf(), Pattern::leaf()]);
        PushFilterThroughJoin {
            pattern: Pattern::new(OpType::Filter, vec![join]),
        }
    }
}

impl Rule for PushFilterThroughJoin {
    fn name(&self) -> String {
        "PushFilterThroughJoin".into()
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Rewrite
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(&self, expr: &OperatorExpr, ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        let join = expr.child(0);
        let left = join.child(0);
        let right = join.child(1);
        let left_columns = ctx.output_columns(left);
        let right_columns = ctx.output_columns(right);

        let mut left_filters = Vec::new();
        let mut right_filters = Vec::new();
        let mut join_filters = Vec::new();

        let predicates = join.logical_op().predicates().iter().chain(expr.logical_op().predicates().iter());
        for predicate in dedup_predicates(predicates) {
            let columns = predicate.expr.columns();
            if columns.is_empty() {
                join_filters.push(predicate);
            } else if is_subset(&columns, &left_columns) {
                left_filters.push(predicate);
            } else if is_subset(&columns, &right_columns) {
                right_filters.push(predicate);
            } else {
                join_filters.push(predicate);
            }
        }

        let left = add_filter(left.clone(), left_filters);
        let right = add_filter(right.clone(), right_filters);
        let join = OperatorExpr::logical(
            LogicalOperator::InnerJoin {
                predicates: join_filters,
            },
            vec![left, right],
        );
        Ok(vec![join])
    }
}

/// Combines two consecutive filters into one.
///
/// ```text
///   Filter p1            Filter p2 AND p1
///     Filter p2     =>     A
///       A
/// ```
#[derive(Debug)]
pub struct CombineConsecutiveFilter {
    pattern: Pattern,
}

impl CombineConsecutiveFilter {
    pub fn new() -> Self {
        CombineConsecutiveFilter {
            pattern: Pattern::new(OpType::Filter, vec![Pattern::new(OpType::Filter, vec![Pattern::leaf()])]),
        }
    }
}

impl Rule for CombineConsecutiveFilter {
    fn name(&self) -> String {
        "CombineConsecutiveFilter".into()
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Rewrite
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        let inner = expr.child(0);
        let predicates = inner.logical_op().predicates().iter().chain(expr.logical_op().predicates().iter());
        let filter = LogicalOperator::Filter {
            predicates: dedup_predicates(predicates),
        };
        Ok(vec![OperatorExpr::logical(filter, inner.children.clone())])
    }
}

/// Moves predicates of a filter into the table scan below it.
///
/// ```text
///   Filter p1            Get A filter=p1
///     Get A         =>
/// ```
#[derive(Debug)]
pub struct EmbedFilterIntoGet {
    pattern: Pattern,
}

impl EmbedFilterIntoGet {
    pub fn new() -> Self {
        EmbedFilterIntoGet {
            pattern: Pattern::new(OpType::Filter, vec![Pattern::new(OpType::Get, vec![])]),
        }
    }
}

impl Rule for EmbedFilterIntoGet {
    fn name(&self) -> String {
        "EmbedFilterIntoGet".into()
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Rewrite
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn check(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> bool {
        match expr.child(0).logical_op() {
            LogicalOperator::Get {
                table: Some(_), columns, ..
            } => expr
                .logical_op()
                .predicates()
                .iter()
                .all(|p| is_subset(&p.expr.columns(), columns)),
            _ => false,
        }
    }

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        match expr.child(0).logical_op() {
            LogicalOperator::Get {
                table: Some(table),
                alias,
                columns,
                predicates,
            } => {
                let predicates = predicates.iter().chain(expr.logical_op().predicates().iter());
                let get = LogicalOperator::Get {
                    table: Some(table.clone()),
                    alias: alias.clone(),
                    columns: columns.clone(),
                    predicates: dedup_predicates(predicates),
                };
                Ok(vec![OperatorExpr::logical(get, vec![])])
            }
            _ => Ok(Vec::new()),
        }
    }
}

fn dedup_predicates<'a, I>(predicates: I) -> Vec<AnnotatedExpr>
where
    I: Iterator<Item = &'a AnnotatedExpr>,
{
    let mut result: Vec<AnnotatedExpr> = Vec::new();
    for predicate in predicates {
        if !result.contains(predicate) {
            result.push(predicate.clone());
        }
    }
    result
}

fn is_subset(columns: &[ColumnId], of: &[ColumnId]) -> bool {
    columns.iter().all(|c| of.contains(c))
}

fn add_filter(input: OperatorExpr, predicates: Vec<AnnotatedExpr>) -> OperatorExpr {
    if predicates.is_empty() {
        input
    } else {
        OperatorExpr::logical(LogicalOperator::Filter { predicates }, vec![input])
    }
}
