//! The rewrite phase. Rewrite rules are applied to an operator tree before it is copied into a memo.

use crate::error::OptimizerError;
use crate::operators::{format_operator_tree, OperatorExpr};
use crate::optimizer::OptimizerContext;
use crate::rules::rewrite::expression::ExpressionRewriter;
use crate::rules::{RewriteRuleSetName, Rule, RuleContext, RuleSet};

/// Simplifies predicates of the given operator tree and then pushes them down.
pub fn rewrite(expr: OperatorExpr, rules: &RuleSet, ctx: &OptimizerContext) -> Result<OperatorExpr, OptimizerError> {
    let max_iterations = ctx.config.max_rewrite_iterations;
    let rewriter = ExpressionRewriter::default().with_max_iterations(max_iterations);
    let expr = rewriter.rewrite_tree(expr, &ctx.metadata);

    let push_down = rules.rewrite_rules(RewriteRuleSetName::PredicatePushDown);
    let expr = top_down_rewrite(expr, push_down, ctx)?;
    let expr = bottom_up_rewrite(expr, push_down, ctx)?;

    log::debug!("Rewritten expression:\n{}", format_operator_tree(&expr));
    Ok(expr)
}

/// Applies the given rules to the root of an operator tree and then to its inputs.
pub fn top_down_rewrite(
    expr: OperatorExpr,
    rules: &[Box<dyn Rule>],
    ctx: &OptimizerContext,
) -> Result<OperatorExpr, OptimizerError> {
    let OperatorExpr { op, children } = apply_rules(expr, rules, ctx)?;
    let children = children
        .into_iter()
        .map(|child| top_down_rewrite(child, rules, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OperatorExpr::new(op, children))
}

/// Applies the given rules to the inputs of an operator tree and then to its root.
/// When a rule replaces the root the inputs of the new root are rewritten again.
pub fn bottom_up_rewrite(
    expr: OperatorExpr,
    rules: &[Box<dyn Rule>],
    ctx: &OptimizerContext,
) -> Result<OperatorExpr, OptimizerError> {
    let OperatorExpr { op, children } = expr;
    let children = children
        .into_iter()
        .map(|child| bottom_up_rewrite(child, rules, ctx))
        .collect::<Result<Vec<_>, _>>()?;

    let expr = OperatorExpr::new(op, children);
    let rewritten = apply_rules(expr.clone(), rules, ctx)?;
    if rewritten == expr {
        return Ok(rewritten);
    }

    let OperatorExpr { op, children } = rewritten;
    let children = children
        .into_iter()
        .map(|child| bottom_up_rewrite(child, rules, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(OperatorExpr::new(op, children))
}

/// Applies rules to the root of the given operator tree until none of them changes it.
/// Stops after [max_rewrite_iterations](crate::optimizer::OptimizerConfig::max_rewrite_iterations) passes.
fn apply_rules(
    mut expr: OperatorExpr,
    rules: &[Box<dyn Rule>],
    ctx: &OptimizerContext,
) -> Result<OperatorExpr, OptimizerError> {
    let rule_ctx = RuleContext::new(ctx);
    let max_iterations = ctx.config.max_rewrite_iterations;

    for _ in 0..max_iterations {
        let mut changed = false;
        for rule in rules.iter() {
            if !rule.pattern().matches(&expr) || !rule.check(&expr, &rule_ctx) {
                continue;
            }
            let mut results = rule.transform(&expr, &rule_ctx)?;
            if results.is_empty() {
                continue;
            }
            let result = results.swap_remove(0);
            if result == expr {
                continue;
            }
            log::debug!("Rewrite {}:\n{}=>\n{}", rule.name(), format_operator_tree(&expr), format_operator_tree(&result));
            expr = result;
            changed = true;
        }
        if !changed {
            return Ok(expr);
        }
    }

    log::warn!("Rewrite has not finished in {} iterations", max_iterations);
    Ok(expr)
}
