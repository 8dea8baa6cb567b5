use crate::cost::{Cost, CostModel};
use crate::memo::{GroupExpr, Memo};
use crate::operators::physical::PhysicalOperator;
use crate::optimizer::OptimizerContext;

/// A cost model that only charges for sequential scans. Always prefers index scans.
#[derive(Debug)]
pub struct TrivialCostModel;

impl CostModel for TrivialCostModel {
    fn calculate_cost(&self, expr: &GroupExpr, _memo: &Memo, _ctx: &OptimizerContext) -> Cost {
        match expr.physical() {
            PhysicalOperator::SeqScan { .. } => 1.0,
            _ => 0.0,
        }
    }
}
