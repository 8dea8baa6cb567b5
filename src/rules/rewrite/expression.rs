//! Simplification of predicates.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt::Debug;

use crate::meta::{ColumnId, Metadata};
use crate::operators::logical::LogicalOperator;
use crate::operators::scalar::expr::{AnnotatedExpr, BinaryOp, ExprRewriter, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;
use crate::operators::{Operator, OperatorExpr};

/// A rule that rewrites a conjunction of predicates into an equivalent conjunction.
pub trait ScalarRewriteRule: Debug {
    /// The name of this rule.
    fn name(&self) -> &'static str;

    /// Rewrites the given conjunction.
    fn rewrite(&self, predicates: Vec<ScalarExpr>) -> Vec<ScalarExpr>;
}

/// Applies [scalar rewrite rules](ScalarRewriteRule) to predicates of an operator tree.
/// Rules are applied in order until none of them changes the predicates or the iteration limit is reached.
///
/// A filter which predicates become empty (always true) is removed from the tree.
#[derive(Debug)]
pub struct ExpressionRewriter {
    rules: Vec<Box<dyn ScalarRewriteRule>>,
    max_iterations: usize,
}

impl ExpressionRewriter {
    /// Creates a rewriter with the given rules.
    pub fn new(rules: Vec<Box<dyn ScalarRewriteRule>>, max_iterations: usize) -> Self {
        ExpressionRewriter { rules, max_iterations }
    }

    /// Sets the maximum number of passes over the rules of this rewriter.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Simplifies a conjunction of predicates.
    pub fn rewrite_predicates(&self, mut predicates: Vec<ScalarExpr>) -> Vec<ScalarExpr> {
        for _ in 0..self.max_iterations {
            let mut changed = false;
            for rule in self.rules.iter() {
                let result = rule.rewrite(predicates.clone());
                if result != predicates {
                    log::debug!("{}: {:?} => {:?}", rule.name(), DisplayExprs(&predicates), DisplayExprs(&result));
                    predicates = result;
                    changed = true;
                }
            }
            if !changed {
                return predicates;
            }
        }
        log::warn!("Predicate rewrite has not finished in {} iterations", self.max_iterations);
        predicates
    }

    /// Rewrites predicates of every operator of the given tree (inputs first).
    pub fn rewrite_tree(&self, expr: OperatorExpr, metadata: &Metadata) -> OperatorExpr {
        let OperatorExpr { op, children } = expr;
        let mut children: Vec<OperatorExpr> =
            children.into_iter().map(|c| self.rewrite_tree(c, metadata)).collect();

        let op = match op {
            Operator::Logical(LogicalOperator::Filter { predicates }) => {
                let predicates = self.rewrite_annotated(predicates, metadata);
                if predicates.is_empty() && children.len() == 1 {
                    return children.swap_remove(0);
                }
                LogicalOperator::Filter { predicates }
            }
            Operator::Logical(LogicalOperator::InnerJoin { predicates }) => LogicalOperator::InnerJoin {
                predicates: self.rewrite_annotated(predicates, metadata),
            },
            Operator::Logical(LogicalOperator::OuterJoin { join_type, predicates }) => LogicalOperator::OuterJoin {
                join_type,
                predicates: self.rewrite_annotated(predicates, metadata),
            },
            Operator::Logical(LogicalOperator::Get {
                table,
                alias,
                columns,
                predicates,
            }) => LogicalOperator::Get {
                table,
                alias,
                columns,
                predicates: self.rewrite_annotated(predicates, metadata),
            },
            Operator::Logical(LogicalOperator::Aggregate {
                group_by,
                aggregates,
                columns,
                having,
            }) => LogicalOperator::Aggregate {
                group_by,
                aggregates,
                columns,
                having: self.rewrite_annotated(having, metadata),
            },
            op => return OperatorExpr::new(op, children),
        };
        OperatorExpr::logical(op, children)
    }

    fn rewrite_annotated(&self, predicates: Vec<AnnotatedExpr>, metadata: &Metadata) -> Vec<AnnotatedExpr> {
        if predicates.is_empty() {
            return predicates;
        }
        let exprs = predicates.into_iter().flat_map(|p| p.expr.split_conjunction()).collect();
        self.rewrite_predicates(exprs)
            .into_iter()
            .map(|expr| {
                let aliases: BTreeSet<String> = expr
                    .columns()
                    .iter()
                    .filter_map(|c| metadata.table_alias(c))
                    .map(|a| a.to_string())
                    .collect();
                AnnotatedExpr::new(expr, aliases)
            })
            .collect()
    }
}

impl Default for ExpressionRewriter {
    /// Creates a rewriter with all available rules.
    fn default() -> Self {
        ExpressionRewriter::new(
            vec![
                Box::new(EquivalentTransform),
                Box::new(ComparatorElimination),
                Box::new(TransitiveClosureConstant),
                Box::new(RedundantEquality),
            ],
            8,
        )
    }
}

struct DisplayExprs<'a>(&'a [ScalarExpr]);

impl Debug for DisplayExprs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter().map(|e| e.to_string())).finish()
    }
}

fn bool_expr(value: bool) -> ScalarExpr {
    ScalarExpr::Scalar(ScalarValue::Bool(value))
}

fn as_bool(expr: &ScalarExpr) -> Option<bool> {
    match expr {
        ScalarExpr::Scalar(value) => value.as_bool(),
        _ => None,
    }
}

/// Evaluates comparisons between constants and simplifies boolean expressions.
///
/// ```text
///   1 < 2            => true
///   x AND true       => x
///   x OR true        => true
///   NOT false        => true
/// ```
/// A conjunction that contains `false` is replaced by `false`. `true` is removed from a conjunction.
#[derive(Debug)]
pub struct ComparatorElimination;

impl ComparatorElimination {
    fn fold(expr: ScalarExpr) -> ScalarExpr {
        struct Fold;
        impl ExprRewriter for Fold {
            type Error = Infallible;

            fn rewrite(&mut self, expr: ScalarExpr) -> Result<ScalarExpr, Self::Error> {
                let result = match expr {
                    ScalarExpr::BinaryExpr { lhs, op, rhs } => match (*lhs, op, *rhs) {
                        (ScalarExpr::Scalar(l), op, ScalarExpr::Scalar(r)) if op.is_comparison() => {
                            match l.compare(&r) {
                                Some(ordering) => bool_expr(comparison_holds(&op, ordering)),
                                None if l.is_null() || r.is_null() => ScalarExpr::Scalar(ScalarValue::Null),
                                None => ScalarExpr::binary(ScalarExpr::Scalar(l), op, ScalarExpr::Scalar(r)),
                            }
                        }
                        (l, BinaryOp::And, r) => match (as_bool(&l), as_bool(&r)) {
                            (Some(false), _) | (_, Some(false)) => bool_expr(false),
                            (Some(true), _) => r,
                            (_, Some(true)) => l,
                            _ => ScalarExpr::binary(l, BinaryOp::And, r),
                        },
                        (l, BinaryOp::Or, r) => match (as_bool(&l), as_bool(&r)) {
                            (Some(true), _) | (_, Some(true)) => bool_expr(true),
                            (Some(false), _) => r,
                            (_, Some(false)) => l,
                            _ => ScalarExpr::binary(l, BinaryOp::Or, r),
                        },
                        (l, op, r) => ScalarExpr::binary(l, op, r),
                    },
                    ScalarExpr::Not(expr) => match *expr {
                        ScalarExpr::Scalar(ScalarValue::Bool(value)) => bool_expr(!value),
                        ScalarExpr::Not(inner) => *inner,
                        expr => ScalarExpr::Not(Box::new(expr)),
                    },
                    ScalarExpr::IsNull(expr) => match *expr {
                        ScalarExpr::Scalar(value) => bool_expr(value.is_null()),
                        expr => ScalarExpr::IsNull(Box::new(expr)),
                    },
                    ScalarExpr::IsNotNull(expr) => match *expr {
                        ScalarExpr::Scalar(value) => bool_expr(!value.is_null()),
                        expr => ScalarExpr::IsNotNull(Box::new(expr)),
                    },
                    _ => expr,
                };
                Ok(result)
            }
        }
        match expr.rewrite(&mut Fold) {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }
}

impl ScalarRewriteRule for ComparatorElimination {
    fn name(&self) -> &'static str {
        "ComparatorElimination"
    }

    fn rewrite(&self, predicates: Vec<ScalarExpr>) -> Vec<ScalarExpr> {
        let mut result = Vec::with_capacity(predicates.len());
        for predicate in predicates {
            let predicate = ComparatorElimination::fold(predicate);
            match as_bool(&predicate) {
                Some(true) => {}
                Some(false) => return vec![bool_expr(false)],
                None => result.extend(predicate.split_conjunction()),
            }
        }
        result
    }
}

fn comparison_holds(op: &BinaryOp, ordering: Ordering) -> bool {
    match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => false,
    }
}

/// Moves constants to the right side of comparisons: `1 < col:1` => `col:1 > 1`.
#[derive(Debug)]
pub struct EquivalentTransform;

impl ScalarRewriteRule for EquivalentTransform {
    fn name(&self) -> &'static str {
        "EquivalentTransform"
    }

    fn rewrite(&self, predicates: Vec<ScalarExpr>) -> Vec<ScalarExpr> {
        predicates
            .into_iter()
            .map(|predicate| match predicate {
                ScalarExpr::BinaryExpr { lhs, op, rhs }
                    if matches!(lhs.as_ref(), ScalarExpr::Scalar(_)) && !matches!(rhs.as_ref(), ScalarExpr::Scalar(_)) =>
                {
                    match op.commute() {
                        Some(commuted) => ScalarExpr::BinaryExpr {
                            lhs: rhs,
                            op: commuted,
                            rhs: lhs,
                        },
                        None => ScalarExpr::BinaryExpr { lhs, op, rhs },
                    }
                }
                predicate => predicate,
            })
            .collect()
    }
}

/// Adds predicates implied by equalities between columns and constants:
/// `col:1 = col:2 AND col:1 = 10` => `col:1 = col:2 AND col:1 = 10 AND col:2 = 10`.
#[derive(Debug)]
pub struct TransitiveClosureConstant;

impl ScalarRewriteRule for TransitiveClosureConstant {
    fn name(&self) -> &'static str {
        "TransitiveClosureConstant"
    }

    fn rewrite(&self, mut predicates: Vec<ScalarExpr>) -> Vec<ScalarExpr> {
        let equalities: Vec<(ColumnId, ColumnId)> =
            predicates.iter().filter_map(|p| p.as_column_equality()).filter(|(l, r)| l != r).collect();
        if equalities.is_empty() {
            return predicates;
        }
        let constants: Vec<(ColumnId, ScalarValue)> = predicates
            .iter()
            .filter_map(|p| match p.as_column_comparison() {
                Some((column, BinaryOp::Eq, value)) if !value.is_null() => Some((column, value.clone())),
                _ => None,
            })
            .collect();

        let mut new_predicates = Vec::new();
        for (column, value) in constants.iter() {
            for (l, r) in equalities.iter() {
                let other = if l == column {
                    *r
                } else if r == column {
                    *l
                } else {
                    continue;
                };
                let predicate = ScalarExpr::binary(ScalarExpr::Column(other), BinaryOp::Eq, ScalarExpr::Scalar(value.clone()));
                if !predicates.contains(&predicate) && !new_predicates.contains(&predicate) {
                    new_predicates.push(predicate);
                }
            }
        }
        predicates.extend(new_predicates);
        predicates
    }
}

/// Removes duplicate predicates and detects contradicting equalities:
/// `col:1 = 1 AND col:1 = 1` => `col:1 = 1`, `col:1 = 1 AND col:1 = 2` => `false`.
#[derive(Debug)]
pub struct RedundantEquality;

impl ScalarRewriteRule for RedundantEquality {
    fn name(&self) -> &'static str {
        "RedundantEquality"
    }

    fn rewrite(&self, predicates: Vec<ScalarExpr>) -> Vec<ScalarExpr> {
        let mut result: Vec<ScalarExpr> = Vec::with_capacity(predicates.len());
        let mut constants: Vec<(ColumnId, ScalarValue)> = Vec::new();

        for predicate in predicates {
            if result.contains(&predicate) {
                continue;
            }
            if let Some((column, BinaryOp::Eq, value)) = predicate.as_column_comparison() {
                let conflict = constants
                    .iter()
                    .any(|(c, v)| *c == column && v.compare(value).map(|o| o != Ordering::Equal).unwrap_or(false));
                if conflict {
                    return vec![bool_expr(false)];
                }
                constants.push((column, value.clone()));
            }
            result.push(predicate);
        }
        result
    }
}
