//! Transformation rules. See [rules module](super).

use std::collections::BTreeSet;

use crate::error::OptimizerError;
use crate::operators::logical::LogicalOperator;
use crate::operators::scalar::expr::AnnotatedExpr;
use crate::operators::{OpType, OperatorExpr};
use crate::rules::pattern::Pattern;
use crate::rules::{Rule, RuleContext, RuleType};

/// `A JOIN B` => `B JOIN A`.
#[derive(Debug)]
pub struct InnerJoinCommutativity {
    pattern: Pattern,
}

impl InnerJoinCommutativity {
    pub fn new() -> Self {
        InnerJoinCommutativity {
            pattern: Pattern::new(OpType::InnerJoin, vec![Pattern::leaf(), Pattern::leaf()]),
        }
    }
}

impl Rule for InnerJoinCommutativity {
    fn name(&self) -> String {
        "InnerJoinCommutativity".into()
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(&self, expr: &OperatorExpr, _ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        let left = expr.child(0).clone();
        let right = expr.child(1).clone();
        let op = expr.logical_op().clone();

        Ok(vec![OperatorExpr::logical(op, vec![right, left])])
    }
}

/// `(A JOIN B) JOIN C` => `A JOIN (B JOIN C)`.
///
/// Predicates that reference only `B` and `C` become the predicates of the new inner join.
/// The rule is not applied when the new inner join would be a cross join.
#[derive(Debug)]
pub struct InnerJoinAssociativity {
    pattern: Pattern,
}

impl InnerJoinAssociativity {
    pub fn new() -> Self {
        let inner = Pattern::new(OpType::InnerJoin, vec![Pattern::leaf(), Pattern::leaf()]);
        InnerJoinAssociativity {
            pattern: Pattern::new(OpType::InnerJoin, vec![inner, Pattern::leaf()]),
        }
    }
}

impl Rule for InnerJoinAssociativity {
    fn name(&self) -> String {
        "InnerJoinAssociativity".into()
    }

    fn rule_type(&self) -> RuleType {
        RuleType::Transformation
    }

    fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    fn transform(&self, expr: &OperatorExpr, ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError> {
        let inner = expr.child(0);
        let a = inner.child(0);
        let b = inner.child(1);
        let c = expr.child(1);

        let predicates: BTreeSet<AnnotatedExpr> = expr
            .logical_op()
            .predicates()
            .iter()
            .chain(inner.logical_op().predicates().iter())
            .cloned()
            .collect();

        let mut bc_aliases = ctx.table_aliases(b);
        bc_aliases.extend(ctx.table_aliases(c));

        let (bc_predicates, top_predicates): (Vec<AnnotatedExpr>, Vec<AnnotatedExpr>) = predicates
            .into_iter()
            .partition(|p| !p.table_aliases.is_empty() && p.is_bound_by(&bc_aliases));

        if bc_predicates.is_empty() {
            log::debug!("{}: skipped a cross join of {:?}", self.name(), bc_aliases);
            return Ok(Vec::new());
        }

        let bc = OperatorExpr::logical(
            LogicalOperator::InnerJoin {
                predicates: bc_predicates,
            },
            vec![b.clone(), c.clone()],
        );
        let top = OperatorExpr::logical(
            LogicalOperator::InnerJoin {
                predicates: top_predicates,
            },
            vec![a.clone(), bc],
        );
        Ok(vec![top])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operators::scalar::expr::ScalarExpr;
    use crate::rules::testing::RuleTester;

    #[test]
    fn join_commutativity() {
        let mut tester = RuleTester::new(InnerJoinCommutativity::new());
        let builder = tester.builder();
        let a = builder.get("a", &["a1", "a2"]).unwrap();
        let b = builder.get("b", &["b1", "b2"]).unwrap();
        let a1 = builder.column("a", "a1").unwrap();
        let b1 = builder.column("b", "b1").unwrap();
        let join = builder.join(a, b, vec![ScalarExpr::column_eq(a1, b1)]);

        tester.apply(
            &join,
            r#"
LogicalInnerJoin on=[col:1 = col:3]
  Leaf 01
  Leaf 00
"#,
        );
    }

    #[test]
    fn join_associativity() {
        let mut tester = RuleTester::new(InnerJoinAssociativity::new());
        let builder = tester.builder();
        let a = builder.get("a", &["a1"]).unwrap();
        let b = builder.get("b", &["b1"]).unwrap();
        let c = builder.get("c", &["c1"]).unwrap();
        let ab = builder.join(a, b, vec![ScalarExpr::column_eq(1, 2)]);
        let abc = builder.join(ab, c, vec![ScalarExpr::column_eq(2, 3)]);

        tester.apply(
            &abc,
            r#"
LogicalInnerJoin on=[col:1 = col:2]
  Leaf 00
  LogicalInnerJoin on=[col:2 = col:3]
    Leaf 01
    Leaf 03
"#,
        );
    }

    #[test]
    fn join_associativity_moves_predicates_bound_by_new_join() {
        let mut tester = RuleTester::new(InnerJoinAssociativity::new());
        let builder = tester.builder();
        let a = builder.get("a", &["a1"]).unwrap();
        let b = builder.get("b", &["b1"]).unwrap();
        let c = builder.get("c", &["c1"]).unwrap();
        let ab = builder.join(a, b, vec![]);
        let abc = builder.join(ab, c, vec![ScalarExpr::column_eq(1, 2), ScalarExpr::column_eq(2, 3)]);

        tester.apply(
            &abc,
            r#"
LogicalInnerJoin on=[col:1 = col:2]
  Leaf 00
  LogicalInnerJoin on=[col:2 = col:3]
    Leaf 01
    Leaf 03
"#,
        );
    }

    #[test]
    fn join_associativity_does_not_produce_cross_joins() {
        let mut tester = RuleTester::new(InnerJoinAssociativity::new());
        let builder = tester.builder();
        let a = builder.get("a", &["a1"]).unwrap();
        let b = builder.get("b", &["b1"]).unwrap();
        let c = builder.get("c", &["c1"]).unwrap();
        let ab = builder.join(a, b, vec![ScalarExpr::column_eq(1, 2)]);
        let abc = builder.join(ab, c, vec![ScalarExpr::column_eq(1, 3)]);

        tester.no_match(&abc);
    }

    #[test]
    fn commutativity_of_cross_join() {
        let mut tester = RuleTester::new(InnerJoinCommutativity::new());
        let builder = tester.builder();
        let a = builder.get("a", &["a1"]).unwrap();
        let b = builder.get("b", &["b1"]).unwrap();
        let join = builder.join(a, b, vec![]);

        tester.apply(
            &join,
            r#"
LogicalInnerJoin
  Leaf 01
  Leaf 00
"#,
        );
    }
}
