use std::sync::Arc;

use crate::catalog::mutable::MutableCatalog;
use crate::catalog::TableBuilder;
use crate::datatypes::DataType;
use crate::memo::Memo;
use crate::meta::MetadataRef;
use crate::operators::builder::OperatorBuilder;
use crate::operators::{format_operator_tree, OperatorExpr};
use crate::optimizer::OptimizerContext;
use crate::rules::binding::GroupExprBindingIterator;
use crate::rules::{Rule, RuleContext, RuleType};
use crate::statistics::MemoryStatsStorage;
use crate::txn::TransactionContext;

/// Expects that given expression does not match the given rule. See [RuleTester::no_match].
pub fn expect_no_match<T, F>(rule: T, build_expr: F)
where
    T: Rule + 'static,
    F: FnOnce(&mut OperatorBuilder) -> OperatorExpr,
{
    let mut tester = RuleTester::new(rule);
    let expr = build_expr(tester.builder());
    tester.no_match(&expr)
}

/// Expects that given rule can be applied to the expression produced by `build_expr` and compares
/// the result with the expected value. See [RuleTester::apply].
pub fn expect_apply<T, F>(rule: T, build_expr: F, expected: &str)
where
    T: Rule + 'static,
    F: FnOnce(&mut OperatorBuilder) -> OperatorExpr,
{
    let mut tester = RuleTester::new(rule);
    let expr = build_expr(tester.builder());
    tester.apply(&expr, expected)
}

/// Provides methods to test [optimization rules].
///
/// The tester's catalog contains tables `a`, `b`, `c` and `d`, each with two `INT` columns
/// (`a1`, `a2`, `b1`, `b2`, ...).
///
/// Transformation and implementation rules are applied to expressions copied into a memo so inputs
/// of the results are displayed as `Leaf <group>`. Rewrite rules are applied to operator trees.
///
/// [optimization rules]: crate::rules::Rule
pub struct RuleTester {
    rule: Box<dyn Rule>,
    catalog: Arc<MutableCatalog>,
    builder: OperatorBuilder,
}

impl RuleTester {
    /// Creates a tester for the given rule.
    pub fn new<T>(rule: T) -> Self
    where
        T: Rule + 'static,
    {
        let catalog = MutableCatalog::new();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            let table = TableBuilder::new(name, 10 + i as u32)
                .add_column(&format!("{}1", name), DataType::Int32)
                .add_column(&format!("{}2", name), DataType::Int32)
                .build()
                .expect("Invalid table");
            catalog.add_table(table).expect("Failed to add a table");
        }
        let catalog = Arc::new(catalog);
        let builder = OperatorBuilder::new(catalog.clone(), TransactionContext::new(1));

        RuleTester {
            rule: Box::new(rule),
            catalog,
            builder,
        }
    }

    /// Returns a builder used to create input expressions.
    pub fn builder(&mut self) -> &mut OperatorBuilder {
        &mut self.builder
    }

    /// Returns the catalog used by this tester. Used to add indexes.
    pub fn catalog(&self) -> &MutableCatalog {
        &self.catalog
    }

    /// Applies the rule to the given expression and then compares the results with the expected value.
    /// Multiple results are written one after another.
    pub fn apply(&mut self, expr: &OperatorExpr, expected: &str) {
        let results = self.transform(expr);
        assert!(!results.is_empty(), "Rule has not been applied: {:?}\n{}", self.rule, format_operator_tree(expr));

        let actual: String = results.iter().map(format_operator_tree).collect();
        assert_eq!(actual.trim_end(), expected.trim(), "rule: {:?}", self.rule);
    }

    /// Expects the rule either not to match the given expression or to produce no results.
    pub fn no_match(&mut self, expr: &OperatorExpr) {
        let results = self.transform(expr);
        let actual: String = results.iter().map(format_operator_tree).collect();

        assert!(
            results.is_empty(),
            "Rule should have not been applied. Rule: {:?} expr:\n{}result:\n{}",
            self.rule,
            format_operator_tree(expr),
            actual
        );
    }

    fn transform(&self, expr: &OperatorExpr) -> Vec<OperatorExpr> {
        let ctx = self.context();
        let rule = self.rule.as_ref();

        if rule.rule_type() == RuleType::Rewrite {
            let rule_ctx = RuleContext::new(&ctx);
            if !rule.pattern().matches(expr) || !rule.check(expr, &rule_ctx) {
                return Vec::new();
            }
            return rule
                .transform(expr, &rule_ctx)
                .unwrap_or_else(|e| panic!("Failed to apply a rule. Rule: {:?}. Error: {}", rule, e));
        }

        let mut memo = Memo::new();
        let expr_id = memo
            .insert_operator_tree(expr, None)
            .expr_id()
            .expect("Expression must not be a leaf");
        let rule_ctx = RuleContext::with_memo(&memo, &ctx);

        let mut results = Vec::new();
        for binding in GroupExprBindingIterator::new(&memo, expr_id, rule.pattern()) {
            if !rule.check(&binding, &rule_ctx) {
                continue;
            }
            match rule.transform(&binding, &rule_ctx) {
                Ok(exprs) => results.extend(exprs),
                Err(e) => panic!("Failed to apply a rule. Rule: {:?}. Error: {}", rule, e),
            }
        }
        results
    }

    fn context(&self) -> OptimizerContext {
        OptimizerContext::new(
            self.catalog.clone(),
            Arc::new(MemoryStatsStorage::new()),
            TransactionContext::new(1),
            MetadataRef::new(self.builder.metadata().clone()),
        )
    }
}
