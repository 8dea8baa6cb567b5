//! Cost-based optimizer. See [Optimizer].

use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::time::Duration;

use crate::catalog::CatalogRef;
use crate::cost::CostModelKind;
use crate::error::OptimizerError;
use crate::memo::{format_memo, GroupId, Memo};
use crate::meta::MetadataRef;
use crate::operators::{format_operator_tree, OperatorExpr};
use crate::plan::{choose_best_plan, PhysicalPlan};
use crate::properties::PropertySet;
use crate::rules::RuleSet;
use crate::statistics::simple::StatsCalculator;
use crate::statistics::StatsStorageRef;
use crate::txn::TransactionContext;

pub mod rewrite;
pub mod tasks;

/// Configuration options of the optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// The search stops when this time is exceeded and the root group has a plan.
    pub timeout_limit: Duration,
    /// The cost model used to compare plans.
    pub cost_model: CostModelKind,
    /// The maximum number of passes of the rewrite phase over a single operator or a list of predicates.
    pub max_rewrite_iterations: usize,
    /// Whether required properties are also provided by enforcers placed on top of the best plan
    /// of a group that provides weaker properties.
    pub explore_enforcers: bool,
}

impl OptimizerConfig {
    pub fn with_timeout_limit(mut self, timeout_limit: Duration) -> Self {
        self.timeout_limit = timeout_limit;
        self
    }

    pub fn with_cost_model(mut self, cost_model: CostModelKind) -> Self {
        self.cost_model = cost_model;
        self
    }

    pub fn with_max_rewrite_iterations(mut self, max_rewrite_iterations: usize) -> Self {
        self.max_rewrite_iterations = max_rewrite_iterations;
        self
    }

    pub fn with_explore_enforcers(mut self, explore_enforcers: bool) -> Self {
        self.explore_enforcers = explore_enforcers;
        self
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            timeout_limit: Duration::from_millis(5000),
            cost_model: CostModelKind::Default,
            max_rewrite_iterations: 8,
            explore_enforcers: false,
        }
    }
}

/// Objects the optimizer uses to optimize a query.
#[derive(Debug, Clone)]
pub struct OptimizerContext {
    pub catalog: CatalogRef,
    pub stats: StatsStorageRef,
    pub txn: TransactionContext,
    pub metadata: MetadataRef,
    pub config: OptimizerConfig,
}

impl OptimizerContext {
    /// Creates a context with the default configuration.
    pub fn new(catalog: CatalogRef, stats: StatsStorageRef, txn: TransactionContext, metadata: MetadataRef) -> Self {
        OptimizerContext {
            catalog,
            stats,
            txn,
            metadata,
            config: OptimizerConfig::default(),
        }
    }

    /// Replaces the configuration of this context.
    pub fn with_config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }
}

/// Cost-based optimizer.
///
/// The optimizer rewrites an operator tree using rewrite rules, copies the result into a [memo](Memo)
/// and then searches for the cheapest physical plan that provides the required properties.
pub struct Optimizer {
    rules: triomphe::Arc<RuleSet>,
}

impl Optimizer {
    /// Creates an optimizer that uses the given rules.
    pub fn new(rules: triomphe::Arc<RuleSet>) -> Self {
        Optimizer { rules }
    }

    /// Returns the rules used by this optimizer.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Optimizes the given operator tree.
    pub fn optimize(
        &self,
        expr: OperatorExpr,
        required: &PropertySet,
        ctx: &OptimizerContext,
    ) -> Result<PhysicalPlan, OptimizerError> {
        let (memo, root) = self.optimize_into_memo(expr, required, ctx)?;
        choose_best_plan(&memo, root, required)
    }

    /// Optimizes the given operator tree and returns the memo and the root group.
    pub fn optimize_into_memo(
        &self,
        expr: OperatorExpr,
        required: &PropertySet,
        ctx: &OptimizerContext,
    ) -> Result<(Memo, GroupId), OptimizerError> {
        log::debug!("Optimizing expression:\n{}required: {}", format_operator_tree(&expr), required);

        let expr = rewrite::rewrite(expr, &self.rules, ctx)?;

        let calculator = StatsCalculator::new(ctx.metadata.clone(), ctx.stats.clone(), ctx.txn.clone());
        let mut memo = Memo::with_callback(Rc::new(calculator));
        let root = memo.insert_operator_tree(&expr, None).group_id();

        log::debug!("Initial memo:\n{}", format_memo(&memo));

        let cost_model = ctx.config.cost_model.create();
        let stats = tasks::Search::new(&mut memo, &self.rules, cost_model.as_ref(), ctx).run(root, required)?;

        log::debug!("Search stats: {:?}", stats);
        log::debug!("Final memo:\n{}", format_memo(&memo));

        Ok((memo, root))
    }
}

impl Debug for Optimizer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Optimizer").field("rules", self.rules.as_ref()).finish()
    }
}
