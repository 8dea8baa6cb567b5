//! Scalar expressions compiled against the column layout of the rows an operator receives.

use std::cmp::Ordering;
use std::convert::TryFrom;

use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::meta::{ColumnId, Metadata};
use crate::operators::scalar::expr::{AnnotatedExpr, BinaryOp, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;

/// A scalar expression in which column references are replaced with positions of values in a row.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    Column(usize),
    Scalar(ScalarValue),
    Binary {
        lhs: Box<CompiledExpr>,
        op: BinaryOp,
        rhs: Box<CompiledExpr>,
    },
    Not(Box<CompiledExpr>),
    IsNull(Box<CompiledExpr>),
    IsNotNull(Box<CompiledExpr>),
}

impl CompiledExpr {
    /// Compiles the given expression. `layout` contains the columns of input rows in order.
    pub fn compile(expr: &ScalarExpr, layout: &[ColumnId]) -> Result<CompiledExpr, ExecutionError> {
        let compile = |e: &ScalarExpr| CompiledExpr::compile(e, layout).map(Box::new);
        let expr = match expr {
            ScalarExpr::Column(id) => {
                let pos = layout.iter().position(|c| c == id).ok_or_else(|| {
                    ExecutionError::argument(format!("Unknown column: col:{}. Input columns: {:?}", id, layout))
                })?;
                CompiledExpr::Column(pos)
            }
            ScalarExpr::Scalar(value) => CompiledExpr::Scalar(value.clone()),
            ScalarExpr::BinaryExpr { lhs, op, rhs } => CompiledExpr::Binary {
                lhs: compile(lhs)?,
                op: *op,
                rhs: compile(rhs)?,
            },
            ScalarExpr::Not(expr) => CompiledExpr::Not(compile(expr)?),
            ScalarExpr::IsNull(expr) => CompiledExpr::IsNull(compile(expr)?),
            ScalarExpr::IsNotNull(expr) => CompiledExpr::IsNotNull(compile(expr)?),
            ScalarExpr::Aggregate { .. } => {
                return Err(ExecutionError::argument(format!(
                    "Aggregate function can not be evaluated as a scalar expression: {}",
                    expr
                )))
            }
        };
        Ok(expr)
    }

    /// Evaluates this expression. NULL operands follow SQL three-valued logic.
    pub fn eval(&self, row: &[ScalarValue]) -> Result<ScalarValue, ExecutionError> {
        match self {
            CompiledExpr::Column(pos) => row.get(*pos).cloned().ok_or_else(|| {
                ExecutionError::internal(format!("Column index {} is out of bounds. Row length: {}", pos, row.len()))
            }),
            CompiledExpr::Scalar(value) => Ok(value.clone()),
            CompiledExpr::Binary { lhs, op, rhs } => match op {
                BinaryOp::And => {
                    let lhs = eval_bool(lhs, row)?;
                    if lhs == Some(false) {
                        return Ok(ScalarValue::Bool(false));
                    }
                    let rhs = eval_bool(rhs, row)?;
                    Ok(match (lhs, rhs) {
                        (_, Some(false)) => ScalarValue::Bool(false),
                        (Some(true), Some(true)) => ScalarValue::Bool(true),
                        _ => ScalarValue::Null,
                    })
                }
                BinaryOp::Or => {
                    let lhs = eval_bool(lhs, row)?;
                    if lhs == Some(true) {
                        return Ok(ScalarValue::Bool(true));
                    }
                    let rhs = eval_bool(rhs, row)?;
                    Ok(match (lhs, rhs) {
                        (_, Some(true)) => ScalarValue::Bool(true),
                        (Some(false), Some(false)) => ScalarValue::Bool(false),
                        _ => ScalarValue::Null,
                    })
                }
                _ => {
                    let lhs = lhs.eval(row)?;
                    let rhs = rhs.eval(row)?;
                    eval_binary(&lhs, op, &rhs)
                }
            },
            CompiledExpr::Not(expr) => match eval_bool(expr, row)? {
                Some(value) => Ok(ScalarValue::Bool(!value)),
                None => Ok(ScalarValue::Null),
            },
            CompiledExpr::IsNull(expr) => Ok(ScalarValue::Bool(expr.eval(row)?.is_null())),
            CompiledExpr::IsNotNull(expr) => Ok(ScalarValue::Bool(!expr.eval(row)?.is_null())),
        }
    }

    /// Evaluates this expression as a predicate. Only `TRUE` passes, `FALSE` and `NULL` do not.
    pub fn eval_predicate(&self, row: &[ScalarValue]) -> Result<bool, ExecutionError> {
        Ok(eval_bool(self, row)? == Some(true))
    }
}

/// Compiles a list of predicates.
pub fn compile_predicates(
    predicates: &[AnnotatedExpr],
    layout: &[ColumnId],
) -> Result<Vec<CompiledExpr>, ExecutionError> {
    predicates.iter().map(|p| CompiledExpr::compile(&p.expr, layout)).collect()
}

/// Returns `true` if a row satisfies all the given predicates.
pub fn eval_predicates(predicates: &[CompiledExpr], row: &[ScalarValue]) -> Result<bool, ExecutionError> {
    for predicate in predicates {
        if !predicate.eval_predicate(row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Returns the type of values produced by the given expression.
pub fn expr_type(expr: &ScalarExpr, metadata: &Metadata) -> Result<DataType, ExecutionError> {
    match expr {
        ScalarExpr::Column(id) => metadata
            .find_column(id)
            .map(|c| c.data_type())
            .ok_or_else(|| ExecutionError::argument(format!("Unknown column: col:{}", id))),
        ScalarExpr::Scalar(value) => Ok(value.data_type()),
        ScalarExpr::BinaryExpr { lhs, op, rhs } if op.is_arithmetic() => {
            let lhs = expr_type(lhs, metadata)?;
            let rhs = expr_type(rhs, metadata)?;
            lhs.common_type(&rhs).ok_or_else(|| ExecutionError::type_mismatch(lhs, rhs))
        }
        ScalarExpr::BinaryExpr { .. } | ScalarExpr::Not(_) | ScalarExpr::IsNull(_) | ScalarExpr::IsNotNull(_) => {
            Ok(DataType::Bool)
        }
        ScalarExpr::Aggregate { func, args } => {
            let arg_type = match args.first() {
                Some(arg) => Some(expr_type(arg, metadata)?),
                None => None,
            };
            Ok(func.return_type(arg_type))
        }
    }
}

fn eval_bool(expr: &CompiledExpr, row: &[ScalarValue]) -> Result<Option<bool>, ExecutionError> {
    match expr.eval(row)? {
        ScalarValue::Null => Ok(None),
        ScalarValue::Bool(value) => Ok(Some(value)),
        other => Err(ExecutionError::type_mismatch(DataType::Bool, other.data_type())),
    }
}

/// Evaluates a comparison or an arithmetic operator.
pub fn eval_binary(lhs: &ScalarValue, op: &BinaryOp, rhs: &ScalarValue) -> Result<ScalarValue, ExecutionError> {
    if lhs.is_null() || rhs.is_null() {
        return Ok(ScalarValue::Null);
    }
    if op.is_comparison() {
        let ordering = lhs
            .compare(rhs)
            .ok_or_else(|| ExecutionError::type_mismatch(lhs.data_type(), rhs.data_type()))?;
        let result = match op {
            BinaryOp::Eq => ordering == Ordering::Equal,
            BinaryOp::NotEq => ordering != Ordering::Equal,
            BinaryOp::Lt => ordering == Ordering::Less,
            BinaryOp::LtEq => ordering != Ordering::Greater,
            BinaryOp::Gt => ordering == Ordering::Greater,
            BinaryOp::GtEq => ordering != Ordering::Less,
            _ => unreachable!(),
        };
        return Ok(ScalarValue::Bool(result));
    }
    if op.is_arithmetic() {
        return eval_arithmetic(lhs, op, rhs);
    }
    Err(ExecutionError::argument(format!("Unexpected operator: {} {} {}", lhs, op, rhs)))
}

fn eval_arithmetic(lhs: &ScalarValue, op: &BinaryOp, rhs: &ScalarValue) -> Result<ScalarValue, ExecutionError> {
    let result_type = match lhs.data_type().common_type(&rhs.data_type()) {
        Some(tpe) if tpe.is_numeric() => tpe,
        _ => return Err(ExecutionError::type_mismatch(lhs.data_type(), rhs.data_type())),
    };

    if result_type == DataType::Decimal {
        let (l, r) = match (lhs.as_f64(), rhs.as_f64()) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(ExecutionError::type_mismatch(lhs.data_type(), rhs.data_type())),
        };
        let value = match op {
            BinaryOp::Plus => l + r,
            BinaryOp::Minus => l - r,
            BinaryOp::Multiply => l * r,
            BinaryOp::Divide if r == 0.0 => return Err(division_by_zero(lhs, op, rhs)),
            BinaryOp::Divide => l / r,
            BinaryOp::Modulo if r == 0.0 => return Err(division_by_zero(lhs, op, rhs)),
            BinaryOp::Modulo => l % r,
            _ => unreachable!(),
        };
        return Ok(ScalarValue::decimal(value));
    }

    let (l, r) = match (lhs.as_i64(), rhs.as_i64()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(ExecutionError::type_mismatch(lhs.data_type(), rhs.data_type())),
    };
    let value = match op {
        BinaryOp::Plus => l.checked_add(r),
        BinaryOp::Minus => l.checked_sub(r),
        BinaryOp::Multiply => l.checked_mul(r),
        BinaryOp::Divide if r == 0 => return Err(division_by_zero(lhs, op, rhs)),
        BinaryOp::Divide => l.checked_div(r),
        BinaryOp::Modulo if r == 0 => return Err(division_by_zero(lhs, op, rhs)),
        BinaryOp::Modulo => l.checked_rem(r),
        _ => unreachable!(),
    };
    let overflow = || ExecutionError::argument(format!("Integer overflow: {} {} {}", lhs, op, rhs));
    let value = value.ok_or_else(overflow)?;
    let value = match result_type {
        DataType::TinyInt => i8::try_from(value).map(ScalarValue::TinyInt).map_err(|_| overflow())?,
        DataType::SmallInt => i16::try_from(value).map(ScalarValue::SmallInt).map_err(|_| overflow())?,
        DataType::Int32 => i32::try_from(value).map(ScalarValue::Int32).map_err(|_| overflow())?,
        _ => ScalarValue::Int64(value),
    };
    Ok(value)
}

fn division_by_zero(lhs: &ScalarValue, op: &BinaryOp, rhs: &ScalarValue) -> ExecutionError {
    ExecutionError::argument(format!("Division by zero: {} {} {}", lhs, op, rhs))
}

#[cfg(test)]
mod test {
    use super::*;

    fn col(id: ColumnId) -> ScalarExpr {
        ScalarExpr::Column(id)
    }

    fn val(v: ScalarValue) -> ScalarExpr {
        ScalarExpr::Scalar(v)
    }

    fn eval(expr: ScalarExpr, row: Vec<ScalarValue>) -> String {
        let layout: Vec<ColumnId> = (1..=row.len()).collect();
        let expr = CompiledExpr::compile(&expr, &layout).unwrap();
        match expr.eval(&row) {
            Ok(value) => format!("{}", value),
            Err(err) => format!("error: {}", err),
        }
    }

    #[test]
    fn columns_are_resolved_by_position() {
        let expr = CompiledExpr::compile(&col(7), &[3, 7]).unwrap();
        assert_eq!(expr, CompiledExpr::Column(1));

        let err = CompiledExpr::compile(&col(8), &[3, 7]).expect_err("unknown column");
        assert!(matches!(err, ExecutionError::Argument(_)), "unexpected error: {}", err);
    }

    #[test]
    fn comparisons() {
        let row = vec![ScalarValue::Int32(1), ScalarValue::Int64(2), ScalarValue::Null];
        assert_eq!(eval(ScalarExpr::binary(col(1), BinaryOp::Lt, col(2)), row.clone()), "true");
        assert_eq!(eval(ScalarExpr::binary(col(1), BinaryOp::GtEq, col(2)), row.clone()), "false");
        assert_eq!(eval(ScalarExpr::binary(col(1), BinaryOp::Eq, col(3)), row.clone()), "NULL");
        assert_eq!(
            eval(ScalarExpr::binary(col(1), BinaryOp::Eq, val(ScalarValue::String("a".into()))), row),
            "error: Type error: expected Int32 but got String"
        );
    }

    #[test]
    fn three_valued_logic() {
        let t = || val(ScalarValue::Bool(true));
        let f = || val(ScalarValue::Bool(false));
        let n = || val(ScalarValue::Null);

        assert_eq!(eval(ScalarExpr::binary(n(), BinaryOp::And, f()), vec![]), "false");
        assert_eq!(eval(ScalarExpr::binary(n(), BinaryOp::And, t()), vec![]), "NULL");
        assert_eq!(eval(ScalarExpr::binary(n(), BinaryOp::Or, t()), vec![]), "true");
        assert_eq!(eval(ScalarExpr::binary(f(), BinaryOp::Or, n()), vec![]), "NULL");
        assert_eq!(eval(ScalarExpr::Not(Box::new(n())), vec![]), "NULL");
        assert_eq!(eval(ScalarExpr::IsNull(Box::new(n())), vec![]), "true");
        assert_eq!(eval(ScalarExpr::IsNotNull(Box::new(t())), vec![]), "true");
    }

    #[test]
    fn arithmetic() {
        let row = vec![ScalarValue::Int32(7), ScalarValue::SmallInt(2), ScalarValue::decimal(0.5)];
        assert_eq!(eval(ScalarExpr::binary(col(1), BinaryOp::Plus, col(2)), row.clone()), "9");
        assert_eq!(eval(ScalarExpr::binary(col(1), BinaryOp::Divide, col(2)), row.clone()), "3");
        assert_eq!(eval(ScalarExpr::binary(col(1), BinaryOp::Modulo, col(2)), row.clone()), "1");
        assert_eq!(eval(ScalarExpr::binary(col(1), BinaryOp::Multiply, col(3)), row.clone()), "3.5");
        assert_eq!(
            eval(ScalarExpr::binary(col(1), BinaryOp::Divide, val(ScalarValue::Int32(0))), row),
            "error: Argument error: Division by zero: 7 / 0"
        );
        assert_eq!(
            eval(
                ScalarExpr::binary(val(ScalarValue::Int32(i32::MAX)), BinaryOp::Plus, val(ScalarValue::Int32(1))),
                vec![]
            ),
            format!("error: Argument error: Integer overflow: {} + 1", i32::MAX)
        );
    }

    #[test]
    fn predicates() {
        let layout = vec![1, 2];
        let predicates = vec![
            AnnotatedExpr::new(
                ScalarExpr::binary(col(1), BinaryOp::Gt, val(ScalarValue::Int32(1))),
                Default::default(),
            ),
            AnnotatedExpr::new(ScalarExpr::IsNotNull(Box::new(col(2))), Default::default()),
        ];
        let predicates = compile_predicates(&predicates, &layout).unwrap();

        let passes = |row: Vec<ScalarValue>| eval_predicates(&predicates, &row).unwrap();
        assert!(passes(vec![ScalarValue::Int32(2), ScalarValue::Int32(0)]), "2, 0");
        assert!(!passes(vec![ScalarValue::Int32(1), ScalarValue::Int32(0)]), "1, 0");
        assert!(!passes(vec![ScalarValue::Null, ScalarValue::Int32(0)]), "NULL, 0");
        assert!(!passes(vec![ScalarValue::Int32(2), ScalarValue::Null]), "2, NULL");
    }
}
