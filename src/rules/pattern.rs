//! Patterns to match operator trees.

use crate::operators::{OpType, Operator, OperatorExpr};

/// A pattern is a tree of [operator types](OpType). [OpType::Leaf] matches any expression.
///
/// ```text
///   Pattern::new(OpType::InnerJoin, vec![
///     Pattern::new(OpType::InnerJoin, vec![Pattern::leaf(), Pattern::leaf()]),
///     Pattern::leaf(),
///   ])
/// ```
/// matches an inner join which left input is another inner join.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Pattern {
    op_type: OpType,
    /// `None` means any number of inputs matched by leaves.
    children: Option<Vec<Pattern>>,
}

impl Pattern {
    /// Creates a pattern that matches an operator of the given type which inputs match the given patterns.
    pub fn new(op_type: OpType, children: Vec<Pattern>) -> Self {
        Pattern {
            op_type,
            children: Some(children),
        }
    }

    /// Creates a pattern that matches any expression.
    pub fn leaf() -> Self {
        Pattern {
            op_type: OpType::Leaf,
            children: Some(Vec::new()),
        }
    }

    /// Creates a pattern that matches an operator of the given type with any number of inputs.
    pub fn any_inputs(op_type: OpType) -> Self {
        Pattern {
            op_type,
            children: None,
        }
    }

    pub fn op_type(&self) -> OpType {
        self.op_type
    }

    /// Patterns of inputs. `None` if this pattern matches any number of inputs.
    pub fn children(&self) -> Option<&[Pattern]> {
        self.children.as_deref()
    }

    pub fn is_leaf(&self) -> bool {
        self.op_type == OpType::Leaf
    }

    /// Returns `true` if the given operator can be the root of an expression matched by this pattern.
    pub fn matches_root(&self, op: &Operator) -> bool {
        self.is_leaf() || self.op_type == op.op_type()
    }

    /// Returns `true` if the given number of inputs is acceptable for the root of this pattern.
    pub fn matches_arity(&self, num_children: usize) -> bool {
        match &self.children {
            _ if self.is_leaf() => true,
            Some(children) => children.len() == num_children,
            None => true,
        }
    }

    /// Tests whether the given operator tree matches this pattern.
    pub fn matches(&self, expr: &OperatorExpr) -> bool {
        if self.is_leaf() {
            return true;
        }
        if !self.matches_root(&expr.op) || !self.matches_arity(expr.children.len()) {
            return false;
        }
        match &self.children {
            Some(children) => children.iter().zip(expr.children.iter()).all(|(p, e)| p.matches(e)),
            None => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operators::logical::LogicalOperator;

    fn filter(input: OperatorExpr) -> OperatorExpr {
        OperatorExpr::logical(LogicalOperator::Filter { predicates: vec![] }, vec![input])
    }

    fn dummy() -> OperatorExpr {
        let get = LogicalOperator::Get {
            table: None,
            alias: "".into(),
            columns: vec![],
            predicates: vec![],
        };
        OperatorExpr::logical(get, vec![])
    }

    #[test]
    fn nested_pattern() {
        let pattern = Pattern::new(OpType::Filter, vec![Pattern::new(OpType::Filter, vec![Pattern::leaf()])]);

        assert!(pattern.matches(&filter(filter(dummy()))), "filter(filter(get))");
        assert!(!pattern.matches(&filter(dummy())), "filter(get)");
        assert!(!pattern.matches(&dummy()), "get");
    }

    #[test]
    fn any_inputs() {
        let pattern = Pattern::any_inputs(OpType::Get);

        assert!(pattern.matches(&dummy()));
        assert!(!pattern.matches(&filter(dummy())));
    }
}
