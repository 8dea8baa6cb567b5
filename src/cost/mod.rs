//! Cost models.
//!
//! A [CostModel] estimates the cost of a single physical operator. The cost of a plan is the sum of the costs
//! of its operators: the optimizer adds the costs of the best plans of the inputs of an expression
//! to the cost returned by the model.

use std::fmt::Debug;

use crate::memo::{GroupExpr, GroupId, Memo};
use crate::optimizer::OptimizerContext;
use crate::statistics::UNKNOWN_ROW_COUNT;

pub mod default;
pub mod postgres;
#[cfg(test)]
mod testing;
pub mod trivial;

/// The cost of an operator or a plan.
pub type Cost = f64;

/// The cost of processing a single tuple.
pub const DEFAULT_TUPLE_COST: f64 = 0.01;
/// The cost of processing a single index entry during an index scan.
pub const DEFAULT_INDEX_TUPLE_COST: f64 = 0.005;
/// The cost of evaluating an operator (a predicate or a hash function) on a single tuple.
pub const DEFAULT_OPERATOR_COST: f64 = 0.0025;

/// Estimates the cost of physical expressions.
pub trait CostModel: Debug {
    /// Returns the cost of the operator of the given physical expression excluding the costs of its inputs.
    fn calculate_cost(&self, expr: &GroupExpr, memo: &Memo, ctx: &OptimizerContext) -> Cost;
}

/// Available cost models.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum CostModelKind {
    /// See [DefaultCostModel](default::DefaultCostModel).
    Default,
    /// See [PostgresCostModel](postgres::PostgresCostModel).
    Postgres,
    /// See [TrivialCostModel](trivial::TrivialCostModel).
    Trivial,
}

impl CostModelKind {
    /// Creates an instance of the cost model of this kind.
    pub fn create(&self) -> Box<dyn CostModel> {
        match self {
            CostModelKind::Default => Box::new(default::DefaultCostModel),
            CostModelKind::Postgres => Box::new(postgres::PostgresCostModel),
            CostModelKind::Trivial => Box::new(trivial::TrivialCostModel),
        }
    }
}

impl Default for CostModelKind {
    fn default() -> Self {
        CostModelKind::Default
    }
}

/// Returns the number of rows produced by the given group.
pub(crate) fn group_rows(memo: &Memo, group: GroupId) -> f64 {
    memo.group(group).num_rows().unwrap_or(UNKNOWN_ROW_COUNT)
}

/// Returns the number of rows produced by the i-th input of the given expression.
pub(crate) fn child_rows(expr: &GroupExpr, memo: &Memo, i: usize) -> f64 {
    expr.children().get(i).map(|c| group_rows(memo, *c)).unwrap_or(1.0)
}
