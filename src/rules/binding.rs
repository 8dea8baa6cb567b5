//! Bindings of memo expressions to rule patterns.

use crate::memo::{ExprId, GroupId, Memo};
use crate::operators::OperatorExpr;
use crate::rules::pattern::Pattern;

/// Iterates over all operator trees rooted at a memo expression that match a pattern.
///
/// Inputs matched by [leaf patterns](Pattern::leaf) are bound to [leaves](crate::operators::Operator::Leaf)
/// that refer to the input groups. Inputs matched by other patterns are bound to every logical
/// expression of the input group that matches the pattern, so an expression with two such inputs
/// produces the cartesian product of their bindings.
#[derive(Debug)]
pub struct GroupExprBindingIterator {
    bindings: std::vec::IntoIter<OperatorExpr>,
}

impl GroupExprBindingIterator {
    pub fn new(memo: &Memo, expr_id: ExprId, pattern: &Pattern) -> Self {
        let bindings = bind_expr(memo, expr_id, pattern);
        GroupExprBindingIterator {
            bindings: bindings.into_iter(),
        }
    }
}

impl Iterator for GroupExprBindingIterator {
    type Item = OperatorExpr;

    fn next(&mut self) -> Option<Self::Item> {
        self.bindings.next()
    }
}

fn bind_expr(memo: &Memo, expr_id: ExprId, pattern: &Pattern) -> Vec<OperatorExpr> {
    let expr = memo.expr(expr_id);
    if pattern.is_leaf() {
        return vec![OperatorExpr::leaf(expr.group_id())];
    }
    if !pattern.matches_root(expr.op()) || !pattern.matches_arity(expr.children().len()) {
        return Vec::new();
    }
    let child_patterns = match pattern.children() {
        Some(children) => children,
        None => return vec![expr.to_operator_expr()],
    };

    let mut bindings: Vec<Vec<OperatorExpr>> = vec![Vec::new()];
    for (group, child_pattern) in expr.children().iter().zip(child_patterns.iter()) {
        let child_bindings = bind_group(memo, *group, child_pattern);
        if child_bindings.is_empty() {
            return Vec::new();
        }
        let mut next = Vec::with_capacity(bindings.len() * child_bindings.len());
        for prefix in bindings.iter() {
            for child in child_bindings.iter() {
                let mut children = prefix.clone();
                children.push(child.clone());
                next.push(children);
            }
        }
        bindings = next;
    }

    bindings
        .into_iter()
        .map(|children| OperatorExpr::new(expr.op().clone(), children))
        .collect()
}

fn bind_group(memo: &Memo, group_id: GroupId, pattern: &Pattern) -> Vec<OperatorExpr> {
    if pattern.is_leaf() {
        return vec![OperatorExpr::leaf(group_id)];
    }
    let group = memo.group(group_id);
    group.logical_exprs().iter().flat_map(|expr| bind_expr(memo, *expr, pattern)).collect()
}
