//! Rules used by the optimizer.

use std::collections::{BTreeSet, HashMap};
use std::fmt::{Debug, Formatter};

use crate::catalog::CatalogRef;
use crate::error::OptimizerError;
use crate::memo::{Group, GroupId, Memo};
use crate::meta::{ColumnId, Metadata};
use crate::operators::{Operator, OperatorExpr};
use crate::optimizer::OptimizerContext;
use crate::rules::implementation::*;
use crate::rules::pattern::Pattern;
use crate::rules::rewrite::{CombineConsecutiveFilter, EmbedFilterIntoGet, PushFilterThroughJoin};
use crate::rules::transformation::{InnerJoinAssociativity, InnerJoinCommutativity};
use crate::txn::TransactionContext;

pub mod binding;
pub mod implementation;
pub mod pattern;
pub mod rewrite;
#[cfg(test)]
pub mod testing;
pub mod transformation;

/// The promise of transformation and rewrite rules.
pub const LOGICAL_PROMISE: i32 = 1;
/// The promise of implementation rules.
pub const PHYSICAL_PROMISE: i32 = 2;

/// An optimization rule. A rule matches operator trees described by its [pattern](Rule::pattern)
/// and produces equivalent operator trees.
///
/// Rules never modify a memo. Children of an operator tree passed to [Rule::transform] that are
/// matched by [leaf patterns](Pattern::leaf) are either [leaves](Operator::Leaf) referring to memo groups
/// (during the search) or complete operator trees (during the rewrite phase).
pub trait Rule {
    /// The name of this rule.
    fn name(&self) -> String;

    /// Returns type type of this rule.
    fn rule_type(&self) -> RuleType;

    /// The pattern an operator tree must match in order this rule can be applied to it.
    fn pattern(&self) -> &Pattern;

    /// Rules with higher promise are applied first. A rule with non-positive promise is not applied.
    fn promise(&self, _expr: &Operator, _ctx: &RuleContext) -> i32 {
        match self.rule_type() {
            RuleType::Implementation => PHYSICAL_PROMISE,
            RuleType::Transformation | RuleType::Rewrite => LOGICAL_PROMISE,
        }
    }

    /// Checks whether this rule can be applied to the given operator tree that matches its pattern.
    fn check(&self, _expr: &OperatorExpr, _ctx: &RuleContext) -> bool {
        true
    }

    /// Produces operator trees equivalent to the given one. An empty result means the rule is not applicable.
    fn transform(&self, expr: &OperatorExpr, ctx: &RuleContext) -> Result<Vec<OperatorExpr>, OptimizerError>;
}

impl Debug for dyn Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        rule_debug_format(self, f)
    }
}

/// Rule type specifies which expressions a rule produces.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RuleType {
    /// Transformation rules produce equivalent logical expressions.
    Transformation,
    /// Implementation rules produce physical expressions.
    /// Physical expressions are used to compute cost of a query plan.
    Implementation,
    /// Rewrite rules transform an operator tree before it is copied into a memo.
    Rewrite,
}

/// Names of groups of rewrite rules.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RewriteRuleSetName {
    PredicatePushDown,
}

/// An opaque identifier of an optimization rule.
pub type RuleId = usize;

/// Provides access to objects available to rules.
pub struct RuleContext<'a> {
    memo: Option<&'a Memo>,
    ctx: &'a OptimizerContext,
}

impl<'a> RuleContext<'a> {
    /// Creates a context for rules applied to operator trees outside of a memo.
    pub fn new(ctx: &'a OptimizerContext) -> Self {
        RuleContext { memo: None, ctx }
    }

    /// Creates a context for rules applied to expressions of the given memo.
    pub fn with_memo(memo: &'a Memo, ctx: &'a OptimizerContext) -> Self {
        RuleContext { memo: Some(memo), ctx }
    }

    pub fn memo(&self) -> Option<&Memo> {
        self.memo
    }

    pub fn catalog(&self) -> &CatalogRef {
        &self.ctx.catalog
    }

    pub fn metadata(&self) -> &Metadata {
        &self.ctx.metadata
    }

    pub fn txn(&self) -> &TransactionContext {
        &self.ctx.txn
    }

    /// Returns columns produced by the given operator tree.
    pub fn output_columns(&self, expr: &OperatorExpr) -> Vec<ColumnId> {
        expr.output_columns_with(&|group: GroupId| self.group(group).output_columns().to_vec())
    }

    /// Returns aliases of tables referenced by the given operator tree.
    pub fn table_aliases(&self, expr: &OperatorExpr) -> BTreeSet<String> {
        expr.table_aliases_with(&|group: GroupId| self.group(group).table_aliases().clone())
    }

    fn group(&self, group: GroupId) -> &Group {
        match self.memo {
            Some(memo) => memo.group(group),
            None => panic!("Leaf {} can not be resolved without a memo", group),
        }
    }
}

impl Debug for RuleContext<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleContext").field("memo", &self.memo).finish()
    }
}

/// A collection of optimization rules used by the optimizer.
/// Transformation and implementation rules are identified by [RuleId]s.
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
    rewrite_rules: HashMap<RewriteRuleSetName, Vec<Box<dyn Rule>>>,
}

impl RuleSet {
    /// Creates an empty rule set.
    pub fn new() -> Self {
        RuleSet {
            rules: Vec::new(),
            rewrite_rules: HashMap::new(),
        }
    }

    /// Adds a transformation or an implementation rule.
    pub fn add_rule<T>(&mut self, rule: T)
    where
        T: Rule + 'static,
    {
        assert_ne!(rule.rule_type(), RuleType::Rewrite, "Use add_rewrite_rule to add rewrite rules");
        self.rules.push(Box::new(rule));
    }

    /// Adds a rewrite rule to the given group of rewrite rules.
    pub fn add_rewrite_rule<T>(&mut self, name: RewriteRuleSetName, rule: T)
    where
        T: Rule + 'static,
    {
        assert_eq!(rule.rule_type(), RuleType::Rewrite, "Not a rewrite rule: {}", rule.name());
        self.rewrite_rules.entry(name).or_default().push(Box::new(rule));
    }

    /// Returns an iterator over transformation and implementation rules.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &dyn Rule)> {
        self.rules.iter().enumerate().map(|(id, r)| (id, r.as_ref()))
    }

    /// Returns a rule with the given identifier.
    pub fn get_rule(&self, rule_id: RuleId) -> Result<&dyn Rule, OptimizerError> {
        self.rules
            .get(rule_id)
            .map(|r| r.as_ref())
            .ok_or_else(|| OptimizerError::internal(format!("Rule#{} does not exist", rule_id)))
    }

    /// Returns rewrite rules from the given group.
    pub fn rewrite_rules(&self, name: RewriteRuleSetName) -> &[Box<dyn Rule>] {
        self.rewrite_rules.get(&name).map(|r| r.as_slice()).unwrap_or_default()
    }

    /// Removes rules for which the given predicate returns `false`.
    pub fn retain<F>(&mut self, f: F)
    where
        F: Fn(&dyn Rule) -> bool,
    {
        self.rules.retain(|r| f(r.as_ref()));
        for rules in self.rewrite_rules.values_mut() {
            rules.retain(|r| f(r.as_ref()));
        }
    }

    /// Reorders transformation and implementation rules.
    pub fn reorder<F>(&mut self, f: F)
    where
        F: FnOnce(&mut Vec<Box<dyn Rule>>),
    {
        f(&mut self.rules)
    }
}

impl Default for RuleSet {
    /// Creates a rule set with all available rules.
    fn default() -> Self {
        let mut rules = RuleSet::new();

        rules.add_rule(InnerJoinCommutativity::new());
        rules.add_rule(InnerJoinAssociativity::new());

        rules.add_rule(GetToDummyScan::new());
        rules.add_rule(GetToSeqScan::new());
        rules.add_rule(GetToIndexScan::new());
        rules.add_rule(LogicalFilterToPhysical::new());
        rules.add_rule(LogicalProjectionToPhysical::new());
        rules.add_rule(InnerJoinToInnerNLJoin::new());
        rules.add_rule(InnerJoinToInnerHashJoin::new());
        rules.add_rule(OuterJoinToOuterNLJoin::new());
        rules.add_rule(GroupByToHashGroupBy::new());
        rules.add_rule(GroupByToSortGroupBy::new());
        rules.add_rule(AggregateToPlainAggregate::new());
        rules.add_rule(DistinctToHashDistinct::new());
        rules.add_rule(LimitToPhysical::new());
        rules.add_rule(InsertToPhysical::new());
        rules.add_rule(UpdateToPhysical::new());
        rules.add_rule(DeleteToPhysical::new());

        let push_down = RewriteRuleSetName::PredicatePushDown;
        rules.add_rewrite_rule(push_down, PushFilterThroughJoin::new());
        rules.add_rewrite_rule(push_down, CombineConsecutiveFilter::new());
        rules.add_rewrite_rule(push_down, EmbedFilterIntoGet::new());

        rules
    }
}

impl Debug for RuleSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        struct DebugRule<'a> {
            rule: &'a dyn Rule,
        }
        impl Debug for DebugRule<'_> {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                rule_debug_format(self.rule, f)
            }
        }
        f.debug_struct("RuleSet")
            .field("rules", &self.rules.iter().map(|r| DebugRule { rule: r.as_ref() }).collect::<Vec<_>>())
            .field("rewrite_rules", &self.rewrite_rules.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn rule_debug_format(rule: &dyn Rule, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Rule")
        .field("name", &rule.name())
        .field("type", &rule.rule_type())
        .finish()
}
