//! Physical plans produced by the optimizer.

use std::fmt::{Display, Formatter};

use crate::cost::Cost;
use crate::error::OptimizerError;
use crate::memo::{GroupId, Memo};
use crate::meta::ColumnId;
use crate::operators::physical::PhysicalOperator;
use crate::operators::StringOperatorFormatter;
use crate::properties::PropertySet;

/// A tree of physical operators. A node of a plan is the winner of a memo group.
#[derive(Debug, Clone, PartialEq)]
pub struct PhysicalPlan {
    pub op: PhysicalOperator,
    pub children: Vec<PhysicalPlan>,
    /// The total cost of this plan.
    pub cost: Cost,
    /// The estimated number of rows this plan produces.
    pub num_rows: Option<f64>,
}

impl PhysicalPlan {
    /// Returns the child with the given index.
    ///
    /// # Panics
    ///
    /// This method panics if there is no such child.
    pub fn child(&self, i: usize) -> &PhysicalPlan {
        self.children
            .get(i)
            .unwrap_or_else(|| panic!("Operator {} has no child #{}", self.op.name(), i))
    }

    /// Returns columns produced by this plan.
    pub fn output_columns(&self) -> Vec<ColumnId> {
        let children: Vec<Vec<ColumnId>> = self.children.iter().map(|c| c.output_columns()).collect();
        self.op.output_columns(&children)
    }

    /// Calls the given function for every node of this plan. Children are visited before their parent.
    pub fn visit<F>(&self, f: &mut F)
    where
        F: FnMut(&PhysicalPlan),
    {
        for child in self.children.iter() {
            child.visit(f);
        }
        (f)(self);
    }
}

impl Display for PhysicalPlan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_plan(self))
    }
}

/// Builds a textual representation of the given plan. Each operator is written on its own line
/// and children are indented by two spaces.
pub fn format_plan(plan: &PhysicalPlan) -> String {
    fn format(plan: &PhysicalPlan, depth: usize, buf: &mut String) {
        for _ in 0..depth {
            buf.push_str("  ");
        }
        let mut fmt = StringOperatorFormatter::new(buf);
        plan.op.format(&mut fmt);
        buf.push('\n');
        for child in plan.children.iter() {
            format(child, depth + 1, buf);
        }
    }

    let mut buf = String::new();
    format(plan, 0, &mut buf);
    buf
}

/// Builds the cheapest plan of the given group that provides the required properties
/// from the winners of memo groups.
pub fn choose_best_plan(memo: &Memo, group_id: GroupId, required: &PropertySet) -> Result<PhysicalPlan, OptimizerError> {
    let group = memo.group(group_id);
    let winner = match group.winner(required) {
        Some(winner) => winner,
        None => {
            let message = format!("No plan for group {} with required properties {}", group_id, required);
            return Err(OptimizerError::internal(message));
        }
    };
    let expr = memo.expr(winner.expr);
    let op = match expr.op().as_physical() {
        Some(op) => op.clone(),
        None => {
            let message = format!("Winner of group {} is not a physical expression: {}", group_id, expr);
            return Err(OptimizerError::internal(message));
        }
    };
    if winner.input_properties.len() != expr.children().len() {
        let message = format!(
            "Winner {} requires {} input properties but has {} inputs",
            expr,
            winner.input_properties.len(),
            expr.children().len()
        );
        return Err(OptimizerError::internal(message));
    }

    let mut children = Vec::with_capacity(expr.children().len());
    for (child, child_required) in expr.children().iter().zip(winner.input_properties.iter()) {
        if *child == group_id && child_required == required {
            let message = format!("Winner {} of group {} refers to itself", expr, group_id);
            return Err(OptimizerError::internal(message));
        }
        children.push(choose_best_plan(memo, *child, child_required)?);
    }

    Ok(PhysicalPlan {
        op,
        children,
        cost: winner.cost,
        num_rows: group.num_rows(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operators::Operator;
    use crate::properties::{Property, SortKey};

    fn physical(memo: &mut Memo, op: PhysicalOperator, children: Vec<GroupId>, target: Option<GroupId>) -> GroupId {
        memo.insert_expression(Operator::Physical(op), children, target, false).group_id()
    }

    #[test]
    fn plan_from_winners() {
        let mut memo = Memo::new();
        let scan = physical(&mut memo, PhysicalOperator::DummyScan, vec![], None);
        let limit = PhysicalOperator::Limit {
            offset: 0,
            limit: 10,
            sort: vec![],
        };
        let root = physical(&mut memo, limit, vec![scan], None);

        let scan_expr = memo.group(scan).physical_exprs()[0];
        let root_expr = memo.group(root).physical_exprs()[0];
        memo.update_winner(scan, &PropertySet::empty(), scan_expr, 1.0, vec![]);
        memo.update_winner(root, &PropertySet::empty(), root_expr, 2.0, vec![PropertySet::empty()]);

        let plan = choose_best_plan(&memo, root, &PropertySet::empty()).expect("plan");
        assert_eq!(format_plan(&plan), "Limit limit=10\n  DummyScan\n");
        assert_eq!(plan.cost, 2.0);
        assert_eq!(plan.child(0).cost, 1.0);
    }

    #[test]
    fn plan_with_enforcer() {
        let mut memo = Memo::new();
        let scan = physical(&mut memo, PhysicalOperator::DummyScan, vec![], None);
        let scan_expr = memo.group(scan).physical_exprs()[0];

        let sort = vec![SortKey::asc(1)];
        let required = PropertySet::new(vec![Property::Sort(sort.clone())]);
        let enforcer = memo
            .insert_expression(Operator::Physical(PhysicalOperator::OrderBy { sort }), vec![scan], Some(scan), true)
            .expr_id()
            .expect("enforcer");

        memo.update_winner(scan, &PropertySet::empty(), scan_expr, 1.0, vec![]);
        memo.update_winner(scan, &required, enforcer, 3.0, vec![PropertySet::empty()]);

        let plan = choose_best_plan(&memo, scan, &required).expect("plan");
        assert_eq!(format_plan(&plan), "OrderBy sort=[col:1 ASC]\n  DummyScan\n");
    }

    #[test]
    fn missing_winner_is_an_error() {
        let mut memo = Memo::new();
        let scan = physical(&mut memo, PhysicalOperator::DummyScan, vec![], None);
        let err = choose_best_plan(&memo, scan, &PropertySet::empty()).expect_err("no plan");
        assert!(matches!(err, OptimizerError::Internal(_)), "unexpected error: {}", err);
    }
}
