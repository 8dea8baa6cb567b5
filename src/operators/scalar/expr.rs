use std::collections::BTreeSet;
use std::convert::TryFrom;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::datatypes::DataType;
use crate::meta::ColumnId;
use crate::operators::scalar::value::ScalarValue;

/// Scalar expressions supported by the optimizer and the execution engine.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ScalarExpr {
    Column(ColumnId),
    Scalar(ScalarValue),
    BinaryExpr {
        lhs: Box<ScalarExpr>,
        op: BinaryOp,
        rhs: Box<ScalarExpr>,
    },
    Not(Box<ScalarExpr>),
    IsNull(Box<ScalarExpr>),
    IsNotNull(Box<ScalarExpr>),
    /// An aggregate function. `COUNT(*)` has no arguments.
    Aggregate {
        func: AggregateFunction,
        args: Vec<ScalarExpr>,
    },
}

impl ScalarExpr {
    /// Creates a binary expression.
    pub fn binary(lhs: ScalarExpr, op: BinaryOp, rhs: ScalarExpr) -> ScalarExpr {
        ScalarExpr::BinaryExpr {
            lhs: Box::new(lhs),
            op,
            rhs: Box::new(rhs),
        }
    }

    /// Creates an expression `col:lhs = col:rhs`.
    pub fn column_eq(lhs: ColumnId, rhs: ColumnId) -> ScalarExpr {
        ScalarExpr::binary(ScalarExpr::Column(lhs), BinaryOp::Eq, ScalarExpr::Column(rhs))
    }

    /// If this expression is a column reference returns that column.
    pub fn as_column(&self) -> Option<ColumnId> {
        match self {
            ScalarExpr::Column(id) => Some(*id),
            _ => None,
        }
    }

    /// Performs a depth-first traversal of this expression tree calling methods of the given `visitor`.
    ///
    /// If [ExprVisitor::pre_visit] returns `Ok(false)` then child expressions of the expression are not visited.
    ///
    /// If an error is returned then traversal terminates.
    pub fn accept<V>(&self, visitor: &mut V) -> Result<(), V::Error>
    where
        V: ExprVisitor,
    {
        if !visitor.pre_visit(self)? {
            return Ok(());
        }
        match self {
            ScalarExpr::Column(_) | ScalarExpr::Scalar(_) => {}
            ScalarExpr::BinaryExpr { lhs, rhs, .. } => {
                lhs.accept(visitor)?;
                rhs.accept(visitor)?;
            }
            ScalarExpr::Not(expr) | ScalarExpr::IsNull(expr) | ScalarExpr::IsNotNull(expr) => {
                expr.accept(visitor)?;
            }
            ScalarExpr::Aggregate { args, .. } => {
                for arg in args {
                    arg.accept(visitor)?;
                }
            }
        }
        visitor.post_visit(self)
    }

    /// Performs a depth-first traversal of this expression and recursively rewrites it using the given `rewriter`.
    ///
    /// If [ExprRewriter::pre_rewrite] returns `Ok(false)` then child expressions of the expression are not visited.
    pub fn rewrite<V>(self, rewriter: &mut V) -> Result<Self, V::Error>
    where
        V: ExprRewriter,
    {
        if !rewriter.pre_rewrite(&self)? {
            return Ok(self);
        }
        let expr = match self {
            ScalarExpr::Column(_) | ScalarExpr::Scalar(_) => self,
            ScalarExpr::BinaryExpr { lhs, op, rhs } => ScalarExpr::BinaryExpr {
                lhs: Box::new(lhs.rewrite(rewriter)?),
                op,
                rhs: Box::new(rhs.rewrite(rewriter)?),
            },
            ScalarExpr::Not(expr) => ScalarExpr::Not(Box::new(expr.rewrite(rewriter)?)),
            ScalarExpr::IsNull(expr) => ScalarExpr::IsNull(Box::new(expr.rewrite(rewriter)?)),
            ScalarExpr::IsNotNull(expr) => ScalarExpr::IsNotNull(Box::new(expr.rewrite(rewriter)?)),
            ScalarExpr::Aggregate { func, args } => ScalarExpr::Aggregate {
                func,
                args: args.into_iter().map(|a| a.rewrite(rewriter)).collect::<Result<Vec<_>, _>>()?,
            },
        };
        rewriter.rewrite(expr)
    }

    /// Returns columns referenced by this expression in the order they first appear.
    pub fn columns(&self) -> Vec<ColumnId> {
        struct CollectColumns {
            columns: Vec<ColumnId>,
        }
        impl ExprVisitor for CollectColumns {
            type Error = ();

            fn post_visit(&mut self, expr: &ScalarExpr) -> Result<(), Self::Error> {
                if let ScalarExpr::Column(id) = expr {
                    if !self.columns.contains(id) {
                        self.columns.push(*id);
                    }
                }
                Ok(())
            }
        }
        let mut visitor = CollectColumns { columns: Vec::new() };
        // CollectColumns never fails.
        let _ = self.accept(&mut visitor);
        visitor.columns
    }

    /// Splits a conjunction `a AND b AND c` into `[a, b, c]`.
    pub fn split_conjunction(self) -> Vec<ScalarExpr> {
        match self {
            ScalarExpr::BinaryExpr {
                lhs,
                op: BinaryOp::And,
                rhs,
            } => {
                let mut result = lhs.split_conjunction();
                result.extend(rhs.split_conjunction());
                result
            }
            _ => vec![self],
        }
    }

    /// Combines the given expressions into a conjunction. Returns `None` if `exprs` is empty.
    pub fn conjunction(exprs: Vec<ScalarExpr>) -> Option<ScalarExpr> {
        exprs.into_iter().reduce(|acc, e| ScalarExpr::binary(acc, BinaryOp::And, e))
    }

    /// If this expression is an equality between two columns returns those columns.
    pub fn as_column_equality(&self) -> Option<(ColumnId, ColumnId)> {
        match self {
            ScalarExpr::BinaryExpr {
                lhs,
                op: BinaryOp::Eq,
                rhs,
            } => match (lhs.as_ref(), rhs.as_ref()) {
                (ScalarExpr::Column(l), ScalarExpr::Column(r)) => Some((*l, *r)),
                _ => None,
            },
            _ => None,
        }
    }

    /// If this expression compares a column with a constant returns the column, the operator and the constant.
    pub fn as_column_comparison(&self) -> Option<(ColumnId, &BinaryOp, &ScalarValue)> {
        match self {
            ScalarExpr::BinaryExpr { lhs, op, rhs } if op.is_comparison() => match (lhs.as_ref(), rhs.as_ref()) {
                (ScalarExpr::Column(c), ScalarExpr::Scalar(v)) => Some((*c, op, v)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Called by [ScalarExpr::accept] during a traversal of an expression tree.
pub trait ExprVisitor {
    /// The error type returned when operation fails.
    type Error;

    /// Called before all child expressions of `expr` are visited.
    fn pre_visit(&mut self, _expr: &ScalarExpr) -> Result<bool, Self::Error> {
        Ok(true)
    }

    /// Called after all child expressions of `expr` are visited.
    fn post_visit(&mut self, expr: &ScalarExpr) -> Result<(), Self::Error>;
}

/// Called by [ScalarExpr::rewrite] during a traversal of an expression tree.
pub trait ExprRewriter {
    /// The error type returned when operation fails.
    type Error;

    /// Called before all child expressions of `expr` are rewritten.
    fn pre_rewrite(&mut self, _expr: &ScalarExpr) -> Result<bool, Self::Error> {
        Ok(true)
    }

    /// Rewrites the given expression. Called after all children of the given expression are rewritten.
    fn rewrite(&mut self, expr: ScalarExpr) -> Result<ScalarExpr, Self::Error>;
}

/// Binary operators.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    /// Returns `true` if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }

    /// Returns `true` if this is an arithmetic operator.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo
        )
    }

    /// Returns an operator `op'` such that `a op b` is equivalent to `b op' a`.
    /// Returns `None` for operators that are not comparisons.
    pub fn commute(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Eq),
            BinaryOp::NotEq => Some(BinaryOp::NotEq),
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::LtEq => Some(BinaryOp::GtEq),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::GtEq => Some(BinaryOp::LtEq),
            _ => None,
        }
    }
}

impl Display for ScalarExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarExpr::Column(column_id) => write!(f, "col:{}", column_id),
            ScalarExpr::Scalar(value) => write!(f, "{}", value),
            ScalarExpr::BinaryExpr { lhs, op, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            ScalarExpr::Not(expr) => write!(f, "NOT {}", expr),
            ScalarExpr::IsNull(expr) => write!(f, "{} IS NULL", expr),
            ScalarExpr::IsNotNull(expr) => write!(f, "{} IS NOT NULL", expr),
            ScalarExpr::Aggregate { func, args } if args.is_empty() => write!(f, "{}(*)", func),
            ScalarExpr::Aggregate { func, args } => write!(f, "{}({})", func, args.iter().join(", ")),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        };
        write!(f, "{}", s)
    }
}

/// Supported aggregate functions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum AggregateFunction {
    Avg,
    Count,
    Max,
    Min,
    Sum,
}

impl AggregateFunction {
    /// Returns the type of the result of this function for an argument of the given type.
    pub fn return_type(&self, arg_type: Option<DataType>) -> DataType {
        match (self, arg_type) {
            (AggregateFunction::Count, _) => DataType::Int64,
            (AggregateFunction::Avg, _) => DataType::Decimal,
            (_, Some(tpe)) => tpe,
            (_, None) => DataType::Null,
        }
    }
}

impl TryFrom<&str> for AggregateFunction {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "avg" => Ok(AggregateFunction::Avg),
            "count" => Ok(AggregateFunction::Count),
            "max" => Ok(AggregateFunction::Max),
            "min" => Ok(AggregateFunction::Min),
            "sum" => Ok(AggregateFunction::Sum),
            _ => Err(()),
        }
    }
}

impl Display for AggregateFunction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregateFunction::Avg => write!(f, "avg"),
            AggregateFunction::Count => write!(f, "count"),
            AggregateFunction::Max => write!(f, "max"),
            AggregateFunction::Min => write!(f, "min"),
            AggregateFunction::Sum => write!(f, "sum"),
        }
    }
}

/// A predicate annotated with the set of table aliases it references.
/// Predicate push-down uses the alias set to decide where a predicate can be evaluated.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct AnnotatedExpr {
    pub expr: ScalarExpr,
    pub table_aliases: BTreeSet<String>,
}

impl AnnotatedExpr {
    /// Creates a new annotated expression.
    pub fn new(expr: ScalarExpr, table_aliases: BTreeSet<String>) -> Self {
        AnnotatedExpr { expr, table_aliases }
    }

    /// Returns `true` if every table this predicate references belongs to `aliases`.
    pub fn is_bound_by(&self, aliases: &BTreeSet<String>) -> bool {
        self.table_aliases.is_subset(aliases)
    }
}

impl Display for AnnotatedExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.expr)
    }
}
