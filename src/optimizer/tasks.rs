//! The search for the cheapest plan. See [Search].

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use crate::cost::{Cost, CostModel};
use crate::error::OptimizerError;
use crate::memo::{ExprId, GroupId, InsertResult, Memo};
use crate::operators::physical::PhysicalOperator;
use crate::operators::Operator;
use crate::optimizer::OptimizerContext;
use crate::properties::deriver::{derive_input_properties, enforcer, PropertyAlternative};
use crate::properties::{Property, PropertyKind, PropertySet};
use crate::rules::binding::GroupExprBindingIterator;
use crate::rules::{RuleContext, RuleId, RuleSet, RuleType};

/// A unit of work of the search.
#[derive(Debug)]
pub enum Task {
    /// Finds the cheapest expression of a group that provides the required properties.
    OptimizeGroup { group: GroupId, required: PropertySet },
    /// Applies transformation and implementation rules to a logical expression.
    OptimizeExpression { expr: ExprId, required: PropertySet },
    /// Applies transformation rules to all logical expressions of a group.
    ExploreGroup { group: GroupId },
    /// Applies transformation rules to a logical expression.
    ExploreExpression { expr: ExprId },
    /// Applies a rule to an expression and adds the results to the group of that expression.
    ApplyRule {
        expr: ExprId,
        rule_id: RuleId,
        required: PropertySet,
        explore_only: bool,
    },
    /// Computes the cost of a physical expression. Suspended while inputs of the expression are optimized.
    CostExpression {
        expr: ExprId,
        required: PropertySet,
        state: Option<CostState>,
    },
}

impl Task {
    /// Returns `true` if this task only adds logical alternatives to the memo.
    fn is_exploration(&self, rules: &RuleSet) -> bool {
        match self {
            Task::ExploreGroup { .. } | Task::ExploreExpression { .. } => true,
            Task::ApplyRule {
                rule_id, explore_only, ..
            } => {
                *explore_only
                    || rules
                        .get_rule(*rule_id)
                        .map(|r| r.rule_type() == RuleType::Transformation)
                        .unwrap_or_default()
            }
            _ => false,
        }
    }
}

impl Display for Task {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::OptimizeGroup { group, required } => write!(f, "OptimizeGroup: {} {}", group, required),
            Task::OptimizeExpression { expr, required } => write!(f, "OptimizeExpression: expr: {} {}", expr, required),
            Task::ExploreGroup { group } => write!(f, "ExploreGroup: {}", group),
            Task::ExploreExpression { expr } => write!(f, "ExploreExpression: expr: {}", expr),
            Task::ApplyRule {
                expr,
                rule_id,
                required,
                explore_only,
            } => write!(f, "ApplyRule: expr: {} rule_id: {} {} explore: {}", expr, rule_id, required, explore_only),
            Task::CostExpression { expr, required, state } => {
                write!(f, "CostExpression: expr: {} {}", expr, required)?;
                if let Some(state) = state {
                    write!(f, " alternative: {} input: {}", state.alternative, state.input)?;
                }
                Ok(())
            }
        }
    }
}

/// The progress of a [CostExpression](Task::CostExpression) task.
#[derive(Debug)]
pub struct CostState {
    alternatives: Vec<PropertyAlternative>,
    /// The alternative being costed.
    alternative: usize,
    /// The input that is being optimized.
    input: usize,
    /// The total cost of the inputs optimized so far.
    input_cost: Cost,
    /// Whether an [OptimizeGroup](Task::OptimizeGroup) task has been scheduled for the current input.
    input_scheduled: bool,
}

impl CostState {
    fn new(alternatives: Vec<PropertyAlternative>) -> Self {
        CostState {
            alternatives,
            alternative: 0,
            input: 0,
            input_cost: 0.0,
            input_scheduled: false,
        }
    }

    fn next_alternative(&mut self) {
        self.alternative += 1;
        self.input = 0;
        self.input_cost = 0.0;
        self.input_scheduled = false;
    }
}

/// Statistics collected during the search.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub tasks: usize,
    pub skipped_tasks: usize,
    pub max_stack_depth: usize,
    pub rules_applied: usize,
    pub exprs_costed: usize,
    pub timed_out: bool,
    pub elapsed: Duration,
}

#[derive(Debug, Default)]
struct TaskStack {
    tasks: Vec<Task>,
}

impl TaskStack {
    fn push(&mut self, task: Task) {
        log::debug!(" + {}", task);
        self.tasks.push(task);
    }

    fn pop(&mut self) -> Option<Task> {
        self.tasks.pop()
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

/// Searches for the cheapest plan of a group. Tasks are executed from a stack so tasks scheduled
/// by a task complete before the tasks scheduled earlier.
///
/// When [timeout_limit](crate::optimizer::OptimizerConfig::timeout_limit) is exceeded the search
/// stops exploring alternatives: it only implements and costs expressions until the root group has a plan.
pub struct Search<'a> {
    memo: &'a mut Memo,
    rules: &'a RuleSet,
    cost_model: &'a dyn CostModel,
    ctx: &'a OptimizerContext,
    tasks: TaskStack,
    optimized: HashSet<(GroupId, PropertySet)>,
    stats: SearchStats,
}

impl<'a> Search<'a> {
    pub fn new(memo: &'a mut Memo, rules: &'a RuleSet, cost_model: &'a dyn CostModel, ctx: &'a OptimizerContext) -> Self {
        Search {
            memo,
            rules,
            cost_model,
            ctx,
            tasks: TaskStack::default(),
            optimized: HashSet::new(),
            stats: SearchStats::default(),
        }
    }

    /// Searches for the cheapest plan of the given group that provides the required properties.
    pub fn run(mut self, root: GroupId, required: &PropertySet) -> Result<SearchStats, OptimizerError> {
        let start_time = Instant::now();
        let timeout_limit = self.ctx.config.timeout_limit;

        self.tasks.push(Task::OptimizeGroup {
            group: root,
            required: required.clone(),
        });

        while let Some(task) = self.tasks.pop() {
            if !self.stats.timed_out && start_time.elapsed() > timeout_limit {
                log::warn!("Optimization time limit of {:?} exceeded", timeout_limit);
                self.stats.timed_out = true;
            }
            if self.stats.timed_out {
                if self.memo.group(root).winner(required).is_some() {
                    break;
                }
                if task.is_exploration(self.rules) {
                    self.stats.skipped_tasks += 1;
                    continue;
                }
            }

            log::debug!("{}", task);
            self.stats.tasks += 1;
            self.stats.max_stack_depth = self.stats.max_stack_depth.max(self.tasks.len() + 1);

            match task {
                Task::OptimizeGroup { group, required } => self.optimize_group(group, required),
                Task::OptimizeExpression { expr, required } => self.optimize_expr(expr, Some(required)),
                Task::ExploreGroup { group } => self.explore_group(group),
                Task::ExploreExpression { expr } => self.optimize_expr(expr, None),
                Task::ApplyRule {
                    expr,
                    rule_id,
                    required,
                    explore_only,
                } => self.apply_rule(expr, rule_id, required, explore_only)?,
                Task::CostExpression { expr, required, state } => self.cost_expr(expr, required, state),
            }
        }

        self.stats.elapsed = start_time.elapsed();
        Ok(self.stats)
    }

    fn optimize_group(&mut self, group_id: GroupId, required: PropertySet) {
        if self.stats.timed_out && self.memo.group(group_id).winner(&required).is_some() {
            return;
        }
        if !self.optimized.insert((group_id, required.clone())) {
            log::debug!("Group has already been optimized: {} {}", group_id, required);
            return;
        }

        let group = self.memo.group(group_id);
        let physical_exprs = group.physical_exprs().to_vec();
        let logical_exprs = group.logical_exprs().to_vec();

        if self.ctx.config.explore_enforcers && !required.is_empty() {
            self.enforce_group(group_id, &required);
        }

        for expr in physical_exprs {
            self.tasks.push(Task::CostExpression {
                expr,
                required: required.clone(),
                state: None,
            });
        }
        for expr in logical_exprs {
            self.tasks.push(Task::OptimizeExpression {
                expr,
                required: required.clone(),
            });
        }

        self.memo.set_explored(group_id);
    }

    /// Adds an enforcer of the last required property on top of the given group.
    fn enforce_group(&mut self, group_id: GroupId, required: &PropertySet) {
        if let Some(property) = required.iter().last() {
            let op = Operator::Physical(enforcer(property));
            let result = self.memo.insert_expression(op, vec![group_id], Some(group_id), true);
            if let Some(expr) = result.expr_id() {
                self.tasks.push(Task::CostExpression {
                    expr,
                    required: required.clone(),
                    state: None,
                });
            }
        }
    }

    fn explore_group(&mut self, group_id: GroupId) {
        let group = self.memo.group(group_id);
        if group.is_explored() {
            return;
        }
        let logical_exprs = group.logical_exprs().to_vec();
        self.memo.set_explored(group_id);

        for expr in logical_exprs {
            self.tasks.push(Task::ExploreExpression { expr });
        }
    }

    /// Schedules rules that can be applied to the given expression.
    /// Explores input groups that must provide alternatives for rule patterns.
    /// If `required` is `None` only transformation rules are applied.
    fn optimize_expr(&mut self, expr_id: ExprId, required: Option<PropertySet>) {
        let memo: &Memo = self.memo;
        let expr = memo.expr(expr_id);
        let rule_ctx = RuleContext::with_memo(memo, self.ctx);
        let explore_only = required.is_none();
        let timed_out = self.stats.timed_out;

        let mut candidates = Vec::new();
        let mut explore_inputs = Vec::new();

        for (rule_id, rule) in self.rules.rules() {
            if expr.is_rule_applied(rule_id) {
                continue;
            }
            let is_transformation = rule.rule_type() == RuleType::Transformation;
            if timed_out && is_transformation {
                continue;
            }
            if explore_only && !is_transformation {
                continue;
            }
            let pattern = rule.pattern();
            if !pattern.matches_root(expr.op()) || !pattern.matches_arity(expr.children().len()) {
                continue;
            }
            let promise = rule.promise(expr.op(), &rule_ctx);
            if promise <= 0 {
                continue;
            }
            candidates.push((promise, rule_id));

            if let Some(patterns) = pattern.children() {
                for (group, pattern) in expr.children().iter().zip(patterns.iter()) {
                    if !pattern.is_leaf() && !explore_inputs.contains(group) {
                        explore_inputs.push(*group);
                    }
                }
            }
        }

        // Rules with higher promise are pushed last and are applied first.
        candidates.sort_by_key(|(promise, _)| *promise);

        let required = required.unwrap_or_default();
        for (_, rule_id) in candidates {
            self.tasks.push(Task::ApplyRule {
                expr: expr_id,
                rule_id,
                required: required.clone(),
                explore_only,
            });
        }
        for group in explore_inputs {
            self.tasks.push(Task::ExploreGroup { group });
        }
    }

    fn apply_rule(
        &mut self,
        expr_id: ExprId,
        rule_id: RuleId,
        required: PropertySet,
        explore_only: bool,
    ) -> Result<(), OptimizerError> {
        if self.memo.expr(expr_id).is_rule_applied(rule_id) {
            return Ok(());
        }
        self.memo.mark_rule_applied(expr_id, rule_id);

        let rules = self.rules;
        let rule = rules.get_rule(rule_id)?;
        let group_id = self.memo.expr(expr_id).group_id();

        let mut new_exprs = Vec::new();
        {
            let rule_ctx = RuleContext::with_memo(self.memo, self.ctx);
            for binding in GroupExprBindingIterator::new(self.memo, expr_id, rule.pattern()) {
                if !rule.check(&binding, &rule_ctx) {
                    continue;
                }
                new_exprs.extend(rule.transform(&binding, &rule_ctx)?);
            }
        }

        if !new_exprs.is_empty() {
            self.stats.rules_applied += 1;
        }

        for new_expr in new_exprs {
            let result = self.memo.record_transformed_expression(&new_expr, group_id);
            let new_expr_id = match result {
                InsertResult::New(expr_id, _) => expr_id,
                InsertResult::Existing(..) | InsertResult::Leaf(_) => continue,
            };
            log::debug!("{}: + {}", rule.name(), self.memo.expr(new_expr_id));

            if self.memo.expr(new_expr_id).is_logical() {
                let task = if explore_only {
                    Task::ExploreExpression { expr: new_expr_id }
                } else {
                    Task::OptimizeExpression {
                        expr: new_expr_id,
                        required: required.clone(),
                    }
                };
                self.tasks.push(task);
            } else if !explore_only {
                self.tasks.push(Task::CostExpression {
                    expr: new_expr_id,
                    required: required.clone(),
                    state: None,
                });
            }
        }
        Ok(())
    }

    fn cost_expr(&mut self, expr_id: ExprId, required: PropertySet, state: Option<CostState>) {
        let mut state = match state {
            Some(state) => state,
            None => CostState::new(self.property_alternatives(expr_id, &required)),
        };
        let children = self.memo.expr(expr_id).children().to_vec();

        while state.alternative < state.alternatives.len() {
            let mut inputs_optimized = true;

            while state.input < children.len() {
                let input_group = children[state.input];
                let input_required = &state.alternatives[state.alternative].inputs[state.input];

                match self.memo.group(input_group).winner(input_required) {
                    Some(winner) => {
                        state.input_cost += winner.cost;
                        state.input += 1;
                        state.input_scheduled = false;
                    }
                    None if !state.input_scheduled => {
                        let task = Task::OptimizeGroup {
                            group: input_group,
                            required: input_required.clone(),
                        };
                        state.input_scheduled = true;
                        self.tasks.push(Task::CostExpression {
                            expr: expr_id,
                            required,
                            state: Some(state),
                        });
                        self.tasks.push(task);
                        return;
                    }
                    None => {
                        log::debug!("No plan for input {} {}. Expr: {}", input_group, input_required, expr_id);
                        inputs_optimized = false;
                        break;
                    }
                }
            }

            if inputs_optimized {
                let alternative = &state.alternatives[state.alternative];
                let expr = self.memo.expr(expr_id);
                let cost = state.input_cost + self.cost_model.calculate_cost(expr, self.memo, self.ctx);
                self.stats.exprs_costed += 1;

                log::debug!("Expr cost: {} expr: {} {} alternative: {:?}", cost, expr, required, alternative);

                let alternative = alternative.clone();
                self.memo
                    .set_lowest_cost(expr_id, alternative.output.clone(), cost, alternative.inputs.clone());
                self.update_winner(expr_id, &required, cost, alternative);
            }

            state.next_alternative();
        }
    }

    /// Returns alternatives for the given expression. An enforcer provides the required properties
    /// and requires all properties except the enforced one from its input.
    fn property_alternatives(&self, expr_id: ExprId, required: &PropertySet) -> Vec<PropertyAlternative> {
        let expr = self.memo.expr(expr_id);
        if expr.is_enforced() {
            return match enforced_property(expr.physical()) {
                Some(kind) => vec![PropertyAlternative {
                    output: required.clone(),
                    inputs: vec![required.without(kind)],
                }],
                None => Vec::new(),
            };
        }
        derive_input_properties(expr, required, self.memo)
    }

    /// Updates winners of the group of the given expression. Properties the expression does not provide
    /// are enforced: properties of the kinds starting from the first missing one are provided by enforcers
    /// placed on top of the expression in the enforcement order.
    fn update_winner(&mut self, expr_id: ExprId, required: &PropertySet, cost: Cost, alternative: PropertyAlternative) {
        let group_id = self.memo.expr(expr_id).group_id();
        let PropertyAlternative { output, inputs } = alternative;

        let missing = output.missing(required);
        let first_missing = match missing.first() {
            Some(property) => property.kind(),
            None => {
                self.memo.update_winner(group_id, required, expr_id, cost, inputs);
                return;
            }
        };

        let mut provided = PropertySet::new(required.iter().filter(|p| p.kind() < first_missing).cloned().collect());
        let enforced: Vec<Property> = required.iter().filter(|p| p.kind() >= first_missing).cloned().collect();

        self.memo.update_winner(group_id, &provided, expr_id, cost, inputs);

        let mut cost = cost;
        for property in enforced {
            let op = Operator::Physical(enforcer(&property));
            let result = self.memo.insert_expression(op, vec![group_id], Some(group_id), true);
            let enforcer_id = match result.expr_id() {
                Some(expr_id) => expr_id,
                None => return,
            };
            cost += self.cost_model.calculate_cost(self.memo.expr(enforcer_id), self.memo, self.ctx);

            let input = provided.clone();
            provided.add(property);
            self.memo.set_lowest_cost(enforcer_id, provided.clone(), cost, vec![input.clone()]);
            self.memo.update_winner(group_id, &provided, enforcer_id, cost, vec![input]);
        }
    }
}

/// Returns the kind of the property the given enforcer operator provides.
fn enforced_property(op: &PhysicalOperator) -> Option<PropertyKind> {
    match op {
        PhysicalOperator::Filter { .. } => Some(PropertyKind::Predicate),
        PhysicalOperator::Projection { .. } => Some(PropertyKind::Columns),
        PhysicalOperator::HashDistinct { .. } => Some(PropertyKind::Distinct),
        PhysicalOperator::OrderBy { .. } => Some(PropertyKind::Sort),
        PhysicalOperator::Limit { .. } => Some(PropertyKind::Limit),
        _ => None,
    }
}
