//! Memo. See [Memo].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

use crate::cost::Cost;
use crate::meta::ColumnId;
use crate::operators::logical::LogicalOperator;
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::expr::AnnotatedExpr;
use crate::operators::{Operator, OperatorExpr, StringOperatorFormatter};
use crate::properties::PropertySet;
use crate::rules::RuleId;

/// Uniquely identifies a group in a memo.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GroupId(pub usize);

impl GroupId {
    /// An identifier that does not refer to any group.
    pub const UNDEFINED: GroupId = GroupId(usize::MAX);

    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for GroupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Uniquely identifies an expression in a memo.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ExprId(pub usize);

impl ExprId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl Display for ExprId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A result of [Memo::insert_expression].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InsertResult {
    /// The expression is a placeholder for an existing group.
    Leaf(GroupId),
    /// An identical expression already exists.
    Existing(ExprId, GroupId),
    /// A new expression has been added.
    New(ExprId, GroupId),
}

impl InsertResult {
    /// The group the expression belongs to.
    pub fn group_id(&self) -> GroupId {
        match self {
            InsertResult::Leaf(group) | InsertResult::Existing(_, group) | InsertResult::New(_, group) => *group,
        }
    }

    /// The identifier of the inserted expression. `None` for leaves.
    pub fn expr_id(&self) -> Option<ExprId> {
        match self {
            InsertResult::Leaf(_) => None,
            InsertResult::Existing(expr, _) | InsertResult::New(expr, _) => Some(*expr),
        }
    }
}

/// The best expression of a group for some required properties.
#[derive(Debug, Clone)]
pub struct Winner {
    /// The winning physical expression.
    pub expr: ExprId,
    /// The total cost of the plan rooted at the expression.
    pub cost: Cost,
    /// Properties required from the inputs of the expression.
    pub input_properties: Vec<PropertySet>,
}

/// An expression stored in a memo. Child expressions are referenced by their groups.
#[derive(Debug, Clone)]
pub struct GroupExpr {
    id: ExprId,
    group: GroupId,
    op: Operator,
    children: Vec<GroupId>,
    enforced: bool,
    applied_rules: HashSet<RuleId>,
    lowest_cost: HashMap<PropertySet, (Cost, Vec<PropertySet>)>,
}

impl GroupExpr {
    pub fn id(&self) -> ExprId {
        self.id
    }

    /// The group this expression belongs to.
    pub fn group_id(&self) -> GroupId {
        self.group
    }

    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    /// Whether this expression has been added by an enforcer.
    pub fn is_enforced(&self) -> bool {
        self.enforced
    }

    pub fn is_logical(&self) -> bool {
        self.op.is_logical()
    }

    pub fn is_physical(&self) -> bool {
        self.op.is_physical()
    }

    /// Returns the physical operator of this expression.
    ///
    /// # Panics
    ///
    /// This method panics if this is not a physical expression.
    pub fn physical(&self) -> &PhysicalOperator {
        self.op
            .as_physical()
            .unwrap_or_else(|| panic!("Expected a physical expression but got: {}", self.op))
    }

    /// Returns the logical operator of this expression.
    ///
    /// # Panics
    ///
    /// This method panics if this is not a logical expression.
    pub fn logical(&self) -> &LogicalOperator {
        self.op
            .as_logical()
            .unwrap_or_else(|| panic!("Expected a logical expression but got: {}", self.op))
    }

    /// Whether the rule with the given id has been applied to this expression.
    pub fn is_rule_applied(&self, rule_id: RuleId) -> bool {
        self.applied_rules.contains(&rule_id)
    }

    /// Returns the lowest cost of this expression for the given output properties
    /// and the properties required from its inputs.
    pub fn lowest_cost(&self, properties: &PropertySet) -> Option<&(Cost, Vec<PropertySet>)> {
        self.lowest_cost.get(properties)
    }

    /// Returns an operator tree which root is the operator of this expression and which children
    /// are leaves referring to child groups of this expression.
    pub fn to_operator_expr(&self) -> OperatorExpr {
        let children = self.children.iter().map(|g| OperatorExpr::leaf(*g)).collect();
        OperatorExpr::new(self.op.clone(), children)
    }
}

impl Display for GroupExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut buf = String::new();
        let mut fmt = StringOperatorFormatter::with_children(&mut buf, &self.children);
        self.op.format(&mut fmt);
        write!(f, "[{} {}]", self.id, buf)
    }
}

/// A group of logically equivalent expressions.
#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    logical_exprs: Vec<ExprId>,
    physical_exprs: Vec<ExprId>,
    enforced_exprs: Vec<ExprId>,
    winners: HashMap<PropertySet, Winner>,
    table_aliases: BTreeSet<String>,
    output_columns: Vec<ColumnId>,
    num_rows: Option<f64>,
    explored: bool,
    signature: GroupSignature,
}

/// Describes the result of a tree of inner joins and filters: input groups that are not joins or filters
/// and the predicates applied to them. Join reordering produces trees with equal signatures.
/// Inputs are a sorted multiset: a self-join reads its input twice.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct GroupSignature {
    inputs: Vec<GroupId>,
    predicates: BTreeSet<AnnotatedExpr>,
}

impl Group {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn logical_exprs(&self) -> &[ExprId] {
        &self.logical_exprs
    }

    pub fn physical_exprs(&self) -> &[ExprId] {
        &self.physical_exprs
    }

    pub fn enforced_exprs(&self) -> &[ExprId] {
        &self.enforced_exprs
    }

    /// Aliases of tables referenced by expressions of this group.
    pub fn table_aliases(&self) -> &BTreeSet<String> {
        &self.table_aliases
    }

    /// Columns produced by expressions of this group.
    pub fn output_columns(&self) -> &[ColumnId] {
        &self.output_columns
    }

    /// The estimated number of rows produced by expressions of this group.
    pub fn num_rows(&self) -> Option<f64> {
        self.num_rows
    }

    /// Whether transformation rules have been applied to all logical expressions of this group.
    pub fn is_explored(&self) -> bool {
        self.explored
    }

    /// Returns the best expression for the given properties.
    pub fn winner(&self, properties: &PropertySet) -> Option<&Winner> {
        self.winners.get(properties)
    }

    /// Returns all winners of this group.
    pub fn winners(&self) -> impl Iterator<Item = (&PropertySet, &Winner)> {
        self.winners.iter()
    }
}

/// Called when a new group is added to a memo.
pub trait MemoGroupCallback: Debug {
    /// Returns the estimated number of rows produced by expressions of the given group.
    /// `expr` is the first expression of the group.
    fn new_group(&self, memo: &Memo, expr: &GroupExpr) -> Option<f64>;
}

/// `Memo` is the primary data structure used by the cost-based optimizer:
///  * It stores each expression as a group of logically equivalent expressions.
///  * It provides memoization of identical subexpressions within an expression tree.
///
/// Two expressions are identical if they have equal operators and the same child groups.
/// Groups and expressions are stored in arenas and are referenced by their identifiers.
#[derive(Default)]
pub struct Memo {
    groups: Vec<Group>,
    exprs: Vec<GroupExpr>,
    expr_index: HashMap<(Operator, Vec<GroupId>), ExprId>,
    join_groups: HashMap<GroupSignature, GroupId>,
    callback: Option<Rc<dyn MemoGroupCallback>>,
}

impl Memo {
    /// Creates an empty memo.
    pub fn new() -> Self {
        Memo::default()
    }

    /// Creates an empty memo with the given callback.
    pub fn with_callback(callback: Rc<dyn MemoGroupCallback>) -> Self {
        Memo {
            callback: Some(callback),
            ..Default::default()
        }
    }

    /// Copies the given operator tree into this memo. Child operators are inserted first.
    /// If `target` is specified the root expression is added to that group.
    pub fn insert_operator_tree(&mut self, expr: &OperatorExpr, target: Option<GroupId>) -> InsertResult {
        let children: Vec<GroupId> = expr
            .children
            .iter()
            .map(|child| self.insert_operator_tree(child, None).group_id())
            .collect();

        self.insert_expression(expr.op.clone(), children, target, false)
    }

    /// Adds an expression produced by a rule to the given group.
    pub fn record_transformed_expression(&mut self, expr: &OperatorExpr, target: GroupId) -> InsertResult {
        self.insert_operator_tree(expr, Some(target))
    }

    /// Adds the given expression to this memo.
    ///
    /// * A [leaf](Operator::Leaf) is never added: this method returns the group it refers to.
    /// * If an identical expression exists this method returns that expression.
    /// * Otherwise the expression is added to the `target` group or to a new group if `target` is `None`.
    ///   An inner join or a filter without a target is added to an existing group that computes
    ///   the same join of the same inputs, if there is one.
    ///
    /// # Panics
    ///
    /// This method panics if `target` is specified and the expression (or the leaf) belongs to another group.
    pub fn insert_expression(
        &mut self,
        op: Operator,
        children: Vec<GroupId>,
        target: Option<GroupId>,
        enforced: bool,
    ) -> InsertResult {
        if let Operator::Leaf(group) = op {
            if let Some(target) = target {
                assert_eq!(target, group, "Leaf group does not match the target group");
            }
            return InsertResult::Leaf(group);
        }

        let key = (op, children);
        if let Some(expr_id) = self.expr_index.get(&key) {
            let existing_group = self.exprs[expr_id.index()].group;
            if let Some(target) = target {
                assert_eq!(
                    target, existing_group,
                    "Expression {} already belongs to another group",
                    self.exprs[expr_id.index()]
                );
            }
            return InsertResult::Existing(*expr_id, existing_group);
        }

        let (op, children) = key;
        let expr_id = ExprId(self.exprs.len());
        let (group_id, new_group) = match target {
            Some(target) => {
                assert!(target.index() < self.groups.len(), "Unknown group: {}", target);
                (target, false)
            }
            None => match self.find_join_group(&op, &children) {
                Some(group) => (group, false),
                None => (self.add_group(&op, &children), true),
            },
        };

        let expr = GroupExpr {
            id: expr_id,
            group: group_id,
            op,
            children,
            enforced,
            applied_rules: HashSet::new(),
            lowest_cost: HashMap::new(),
        };
        self.expr_index.insert((expr.op.clone(), expr.children.clone()), expr_id);

        let group = &mut self.groups[group_id.index()];
        if enforced {
            group.enforced_exprs.push(expr_id);
        } else if expr.op.is_logical() {
            group.logical_exprs.push(expr_id);
        } else {
            group.physical_exprs.push(expr_id);
        }
        self.exprs.push(expr);

        if new_group {
            if let Some(callback) = self.callback.clone() {
                let num_rows = callback.new_group(self, &self.exprs[expr_id.index()]);
                self.groups[group_id.index()].num_rows = num_rows;
            }
        }

        InsertResult::New(expr_id, group_id)
    }

    /// Returns a group with the given id.
    ///
    /// # Panics
    ///
    /// This method panics if there is no such group.
    pub fn group(&self, group_id: GroupId) -> &Group {
        self.groups
            .get(group_id.index())
            .unwrap_or_else(|| panic!("Group id is invalid: {}", group_id))
    }

    /// Returns an expression with the given id.
    ///
    /// # Panics
    ///
    /// This method panics if there is no such expression.
    pub fn expr(&self, expr_id: ExprId) -> &GroupExpr {
        self.exprs
            .get(expr_id.index())
            .unwrap_or_else(|| panic!("Expression id is invalid: {}", expr_id))
    }

    /// The number of groups.
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// The number of expressions.
    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }

    /// Returns all groups.
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Marks the rule as applied to the given expression.
    pub fn mark_rule_applied(&mut self, expr_id: ExprId, rule_id: RuleId) {
        self.exprs[expr_id.index()].applied_rules.insert(rule_id);
    }

    /// Marks the given group as explored.
    pub fn set_explored(&mut self, group_id: GroupId) {
        self.groups[group_id.index()].explored = true;
    }

    /// Sets the estimated number of rows of the given group.
    pub fn set_num_rows(&mut self, group_id: GroupId, num_rows: f64) {
        self.groups[group_id.index()].num_rows = Some(num_rows);
    }

    /// Records the cost of the given expression for the given output properties.
    /// Returns `false` and leaves the record unchanged if a cheaper or equally cheap record exists.
    pub fn set_lowest_cost(
        &mut self,
        expr_id: ExprId,
        properties: PropertySet,
        cost: Cost,
        input_properties: Vec<PropertySet>,
    ) -> bool {
        let expr = &mut self.exprs[expr_id.index()];
        match expr.lowest_cost.get(&properties) {
            Some((existing, _)) if *existing <= cost => false,
            _ => {
                expr.lowest_cost.insert(properties, (cost, input_properties));
                true
            }
        }
    }

    /// Sets the given expression as the winner of its group for the given properties if it is strictly
    /// cheaper than the current winner. Returns `true` if the winner has been replaced.
    pub fn update_winner(
        &mut self,
        group_id: GroupId,
        properties: &PropertySet,
        expr: ExprId,
        cost: Cost,
        input_properties: Vec<PropertySet>,
    ) -> bool {
        let group = &mut self.groups[group_id.index()];
        match group.winners.get(properties) {
            Some(winner) if winner.cost <= cost => false,
            _ => {
                log::debug!("New winner: group: {} props: {} expr: {} cost: {}", group_id, properties, expr, cost);
                let winner = Winner {
                    expr,
                    cost,
                    input_properties,
                };
                group.winners.insert(properties.clone(), winner);
                true
            }
        }
    }

    fn find_join_group(&self, op: &Operator, children: &[GroupId]) -> Option<GroupId> {
        let signature = self.join_signature(op, children)?;
        self.join_groups.get(&signature).copied()
    }

    fn join_signature(&self, op: &Operator, children: &[GroupId]) -> Option<GroupSignature> {
        match op {
            Operator::Logical(LogicalOperator::InnerJoin { predicates })
            | Operator::Logical(LogicalOperator::Filter { predicates }) => {
                let mut signature = GroupSignature {
                    inputs: Vec::new(),
                    predicates: predicates.iter().cloned().collect(),
                };
                for child in children {
                    let child = &self.group(*child).signature;
                    signature.inputs.extend(child.inputs.iter().copied());
                    signature.predicates.extend(child.predicates.iter().cloned());
                }
                signature.inputs.sort();
                Some(signature)
            }
            _ => None,
        }
    }

    fn add_group(&mut self, op: &Operator, children: &[GroupId]) -> GroupId {
        let group_id = GroupId(self.groups.len());
        let signature = match self.join_signature(op, children) {
            Some(signature) => {
                self.join_groups.insert(signature.clone(), group_id);
                signature
            }
            None => {
                GroupSignature {
                    inputs: vec![group_id],
                    predicates: BTreeSet::new(),
                }
            }
        };
        let child_columns: Vec<Vec<ColumnId>> =
            children.iter().map(|c| self.group(*c).output_columns.clone()).collect();
        let (table_aliases, output_columns) = match op {
            Operator::Logical(op) => {
                let aliases = match op {
                    LogicalOperator::Get { table: Some(_), alias, .. } => {
                        let mut aliases = BTreeSet::new();
                        aliases.insert(alias.clone());
                        aliases
                    }
                    _ => self.children_aliases(children),
                };
                (aliases, op.output_columns(&child_columns))
            }
            Operator::Physical(op) => {
                let aliases = match op {
                    PhysicalOperator::SeqScan { alias, .. } | PhysicalOperator::IndexScan { alias, .. } => {
                        let mut aliases = BTreeSet::new();
                        aliases.insert(alias.clone());
                        aliases
                    }
                    _ => self.children_aliases(children),
                };
                (aliases, op.output_columns(&child_columns))
            }
            Operator::Leaf(group) => panic!("Leaf can not be added to a memo: {}", group),
        };

        self.groups.push(Group {
            id: group_id,
            logical_exprs: Vec::new(),
            physical_exprs: Vec::new(),
            enforced_exprs: Vec::new(),
            winners: HashMap::new(),
            table_aliases,
            output_columns,
            num_rows: None,
            explored: false,
            signature,
        });
        group_id
    }

    fn children_aliases(&self, children: &[GroupId]) -> BTreeSet<String> {
        children.iter().flat_map(|c| self.group(*c).table_aliases.iter().cloned()).collect()
    }
}

impl Debug for Memo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("num_groups", &self.groups.len())
            .field("num_exprs", &self.exprs.len())
            .finish()
    }
}

/// Builds a textual representation of the given memo.
/// Groups are written in reverse order: logical expressions first, then physical and enforced ones.
///
/// ```text
/// 02 LogicalInnerJoin [00 01] on=[col:1 = col:3]
///    InnerNLJoin [00 01] on=[col:1 = col:3]
/// 01 LogicalGet b cols=[3]
/// 00 LogicalGet a cols=[1, 2]
/// ```
pub fn format_memo(memo: &Memo) -> String {
    let mut buf = String::new();
    for group in memo.groups.iter().rev() {
        buf.push_str(format!("{} ", group.id).as_str());
        let exprs = group
            .logical_exprs
            .iter()
            .chain(group.physical_exprs.iter())
            .chain(group.enforced_exprs.iter());
        for (i, expr_id) in exprs.enumerate() {
            if i > 0 {
                // newline + 3 spaces
                buf.push_str("\n   ");
            }
            let expr = memo.expr(*expr_id);
            let mut fmt = StringOperatorFormatter::with_children(&mut buf, &expr.children);
            expr.op.format(&mut fmt);
        }
        buf.push('\n');
    }
    buf
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::TableInfo;
    use crate::operators::scalar::expr::{AnnotatedExpr, ScalarExpr};
    use crate::properties::SortKey;

    fn get(table: &str, columns: Vec<ColumnId>) -> OperatorExpr {
        let op = LogicalOperator::Get {
            table: Some(TableInfo::new(1, 1, table)),
            alias: table.into(),
            columns,
            predicates: vec![],
        };
        OperatorExpr::logical(op, vec![])
    }

    fn join(left: OperatorExpr, right: OperatorExpr, l: ColumnId, r: ColumnId) -> OperatorExpr {
        let predicate = AnnotatedExpr::new(ScalarExpr::column_eq(l, r), BTreeSet::new());
        OperatorExpr::logical(
            LogicalOperator::InnerJoin {
                predicates: vec![predicate],
            },
            vec![left, right],
        )
    }

    fn expect_memo(memo: &Memo, expected: &str) {
        let buf = format_memo(memo);
        assert_eq!(buf.trim(), expected.trim());
    }

    #[test]
    fn test_basics() {
        let mut memo = Memo::new();
        let expr = join(get("a", vec![1, 2]), get("b", vec![3]), 1, 3);
        let result = memo.insert_operator_tree(&expr, None);

        assert!(matches!(result, InsertResult::New(ExprId(2), GroupId(2))), "result: {:?}", result);
        expect_memo(
            &memo,
            r#"
02 LogicalInnerJoin [00 01] on=[col:1 = col:3]
01 LogicalGet b cols=[3]
00 LogicalGet a cols=[1, 2]
"#,
        );

        let group = memo.group(GroupId(2));
        assert_eq!(group.output_columns(), &[1, 2, 3]);
        let aliases: Vec<&String> = group.table_aliases().iter().collect();
        assert_eq!(aliases, vec!["a", "b"]);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut memo = Memo::new();
        let expr = join(get("a", vec![1, 2]), get("b", vec![3]), 1, 3);

        let first = memo.insert_operator_tree(&expr, None);
        let second = memo.insert_operator_tree(&expr, None);

        assert_eq!(second, InsertResult::Existing(first.expr_id().unwrap(), first.group_id()));
        assert_eq!(memo.num_groups(), 3);
        assert_eq!(memo.num_exprs(), 3);
    }

    #[test]
    fn test_nested_duplicates() {
        let mut memo = Memo::new();
        let expr = join(get("a", vec![1]), get("a", vec![1]), 1, 1);
        memo.insert_operator_tree(&expr, None);

        expect_memo(
            &memo,
            r#"
01 LogicalInnerJoin [00 00] on=[col:1 = col:1]
00 LogicalGet a cols=[1]
"#,
        );
    }

    #[test]
    fn test_leaf() {
        let mut memo = Memo::new();
        let result = memo.insert_operator_tree(&get("a", vec![1]), None);
        let group = result.group_id();

        let leaf = OperatorExpr::leaf(group);
        assert_eq!(memo.insert_operator_tree(&leaf, Some(group)), InsertResult::Leaf(group));
        assert_eq!(memo.num_exprs(), 1);
    }

    #[test]
    fn test_record_transformed_expression() {
        let mut memo = Memo::new();
        let expr = join(get("a", vec![1]), get("b", vec![2]), 1, 2);
        let root = memo.insert_operator_tree(&expr, None).group_id();

        let commuted = join(OperatorExpr::leaf(GroupId(1)), OperatorExpr::leaf(GroupId(0)), 1, 2);
        let result = memo.record_transformed_expression(&commuted, root);
        assert_eq!(result, InsertResult::New(ExprId(3), root));

        // a leaf child never creates a group
        assert_eq!(memo.num_groups(), 3);
        expect_memo(
            &memo,
            r#"
02 LogicalInnerJoin [00 01] on=[col:1 = col:2]
   LogicalInnerJoin [01 00] on=[col:1 = col:2]
01 LogicalGet b cols=[2]
00 LogicalGet a cols=[1]
"#,
        );
    }

    #[test]
    fn test_reordered_joins_share_group() {
        let mut memo = Memo::new();
        let a = get("a", vec![1]);
        let b = get("b", vec![2]);
        let c = get("c", vec![3]);
        let ab_c = join(join(a.clone(), b.clone(), 1, 2), c.clone(), 2, 3);
        let root = memo.insert_operator_tree(&ab_c, None).group_id();

        let a_bc = join(a, join(b, c, 2, 3), 1, 2);
        let result = memo.insert_operator_tree(&a_bc, None);

        assert_eq!(result.group_id(), root);
        expect_memo(
            &memo,
            r#"
05 LogicalInnerJoin [01 03] on=[col:2 = col:3]
04 LogicalInnerJoin [02 03] on=[col:2 = col:3]
   LogicalInnerJoin [00 05] on=[col:1 = col:2]
03 LogicalGet c cols=[3]
02 LogicalInnerJoin [00 01] on=[col:1 = col:2]
01 LogicalGet b cols=[2]
00 LogicalGet a cols=[1]
"#,
        );
    }

    #[test]
    fn test_self_join_and_filter_do_not_share_group() {
        let mut memo = Memo::new();
        let self_join = join(get("a", vec![1]), get("a", vec![1]), 1, 1);
        let join_group = memo.insert_operator_tree(&self_join, None).group_id();

        let predicate = AnnotatedExpr::new(ScalarExpr::column_eq(1, 1), BTreeSet::new());
        let filter = OperatorExpr::logical(
            LogicalOperator::Filter {
                predicates: vec![predicate],
            },
            vec![get("a", vec![1])],
        );
        let filter_group = memo.insert_operator_tree(&filter, None).group_id();

        assert_ne!(join_group, filter_group);
        expect_memo(
            &memo,
            r#"
02 LogicalFilter [00] filter=[col:1 = col:1]
01 LogicalInnerJoin [00 00] on=[col:1 = col:1]
00 LogicalGet a cols=[1]
"#,
        );
    }

    #[test]
    #[should_panic(expected = "already belongs to another group")]
    fn test_existing_expression_in_another_group() {
        let mut memo = Memo::new();
        memo.insert_operator_tree(&get("a", vec![1]), None);
        memo.insert_operator_tree(&get("b", vec![2]), None);
        memo.insert_operator_tree(&get("a", vec![1]), Some(GroupId(1)));
    }

    #[test]
    fn test_winner_is_replaced_only_by_cheaper_expression() {
        let mut memo = Memo::new();
        let group = memo.insert_operator_tree(&get("a", vec![1]), None).group_id();
        let props = PropertySet::sort(vec![SortKey::asc(1)]);

        assert!(memo.update_winner(group, &props, ExprId(0), 10.0, vec![]));
        assert!(!memo.update_winner(group, &props, ExprId(0), 10.0, vec![]), "equal cost");
        assert!(!memo.update_winner(group, &props, ExprId(0), 11.0, vec![]), "higher cost");
        assert!(memo.update_winner(group, &props, ExprId(0), 5.0, vec![]), "lower cost");

        let winner = memo.group(group).winner(&props).expect("no winner");
        assert_eq!(winner.cost, 5.0);
        assert!(memo.group(group).winner(&PropertySet::empty()).is_none());
    }

    #[test]
    fn test_callback_sets_num_rows() {
        #[derive(Debug)]
        struct RowCount;
        impl MemoGroupCallback for RowCount {
            fn new_group(&self, memo: &Memo, expr: &GroupExpr) -> Option<f64> {
                let children: f64 = expr.children().iter().filter_map(|c| memo.group(*c).num_rows()).sum();
                Some(children + 1.0)
            }
        }

        let mut memo = Memo::with_callback(Rc::new(RowCount));
        let expr = join(get("a", vec![1]), get("b", vec![2]), 1, 2);
        let group = memo.insert_operator_tree(&expr, None).group_id();

        assert_eq!(memo.group(group).num_rows(), Some(3.0));
    }
}
