//! Scalar expressions.

pub mod expr;
pub mod value;

pub use expr::{AggregateFunction, AnnotatedExpr, BinaryOp, ScalarExpr};
pub use value::ScalarValue;
