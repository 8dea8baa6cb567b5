//! Operators and operator trees.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use crate::memo::GroupId;
use crate::meta::ColumnId;
use crate::operators::logical::LogicalOperator;
use crate::operators::physical::PhysicalOperator;

pub mod builder;
pub mod logical;
pub mod physical;
pub mod scalar;

/// An operator of an operator tree or a memo expression.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Operator {
    Logical(LogicalOperator),
    Physical(PhysicalOperator),
    /// A placeholder for a memo group. Used by rule bindings so an expression can refer
    /// to an existing group without copying its expressions.
    Leaf(GroupId),
}

impl Operator {
    /// Returns the type of this operator.
    pub fn op_type(&self) -> OpType {
        match self {
            Operator::Logical(op) => op.op_type(),
            Operator::Physical(_) => OpType::Physical,
            Operator::Leaf(_) => OpType::Leaf,
        }
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::Logical(_))
    }

    pub fn is_physical(&self) -> bool {
        matches!(self, Operator::Physical(_))
    }

    pub fn as_logical(&self) -> Option<&LogicalOperator> {
        match self {
            Operator::Logical(op) => Some(op),
            _ => None,
        }
    }

    pub fn as_physical(&self) -> Option<&PhysicalOperator> {
        match self {
            Operator::Physical(op) => Some(op),
            _ => None,
        }
    }

    /// Writes a textual representation of this operator to the given formatter.
    pub fn format<F>(&self, f: &mut F)
    where
        F: OperatorFormatter,
    {
        match self {
            Operator::Logical(op) => op.format(f),
            Operator::Physical(op) => op.format(f),
            Operator::Leaf(group) => {
                f.write_name("Leaf");
                f.write_source(&format!("{}", group));
                f.write_children();
            }
        }
    }
}

impl From<LogicalOperator> for Operator {
    fn from(op: LogicalOperator) -> Self {
        Operator::Logical(op)
    }
}

impl From<PhysicalOperator> for Operator {
    fn from(op: PhysicalOperator) -> Self {
        Operator::Physical(op)
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut buf = String::new();
        let mut fmt = StringOperatorFormatter::new(&mut buf);
        self.format(&mut fmt);
        write!(f, "{}", buf)
    }
}

/// Operator types used by rule patterns.
/// Patterns only match logical operators so physical operators share a single type.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum OpType {
    /// Matches any group.
    Leaf,
    Get,
    Filter,
    Projection,
    InnerJoin,
    OuterJoin,
    Aggregate,
    Distinct,
    Limit,
    Insert,
    Update,
    Delete,
    Physical,
}

/// The type of an outer join: which inputs retain rows that have no matching row in the other input.
/// Columns of the missing side are padded with NULLs.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum JoinType {
    Left,
    Right,
    Full,
}

impl JoinType {
    /// Whether rows of the left input without a match are retained.
    pub fn preserves_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// Whether rows of the right input without a match are retained.
    pub fn preserves_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

impl Display for JoinType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Left => write!(f, "Left"),
            JoinType::Right => write!(f, "Right"),
            JoinType::Full => write!(f, "Full"),
        }
    }
}

/// An operator tree. Used as an input of the optimizer and as an input/output of optimization rules.
/// A child can be a [leaf](Operator::Leaf) that refers to a memo group.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct OperatorExpr {
    pub op: Operator,
    pub children: Vec<OperatorExpr>,
}

impl OperatorExpr {
    /// Creates a new operator tree node.
    pub fn new(op: Operator, children: Vec<OperatorExpr>) -> Self {
        OperatorExpr { op, children }
    }

    /// Creates a node with the given logical operator.
    pub fn logical(op: LogicalOperator, children: Vec<OperatorExpr>) -> Self {
        OperatorExpr::new(Operator::Logical(op), children)
    }

    /// Creates a node with the given physical operator.
    pub fn physical(op: PhysicalOperator, children: Vec<OperatorExpr>) -> Self {
        OperatorExpr::new(Operator::Physical(op), children)
    }

    /// Creates a node that refers to the given memo group.
    pub fn leaf(group: GroupId) -> Self {
        OperatorExpr::new(Operator::Leaf(group), Vec::new())
    }

    pub fn op_type(&self) -> OpType {
        self.op.op_type()
    }

    /// Returns the logical operator of this node.
    ///
    /// # Panics
    ///
    /// This method panics if the operator of this node is not a logical operator.
    pub fn logical_op(&self) -> &LogicalOperator {
        match &self.op {
            Operator::Logical(op) => op,
            _ => panic!("Expected a logical operator but got: {}", self.op),
        }
    }

    /// Returns the child with the given index.
    ///
    /// # Panics
    ///
    /// This method panics if there is no such child.
    pub fn child(&self, i: usize) -> &OperatorExpr {
        self.children
            .get(i)
            .unwrap_or_else(|| panic!("Operator {} has no child #{}", self.op, i))
    }

    /// Returns columns produced by this tree. Columns of leaves are provided by `leaf_columns`.
    pub fn output_columns_with<F>(&self, leaf_columns: &F) -> Vec<ColumnId>
    where
        F: Fn(GroupId) -> Vec<ColumnId>,
    {
        let children: Vec<Vec<ColumnId>> = self.children.iter().map(|c| c.output_columns_with(leaf_columns)).collect();
        match &self.op {
            Operator::Logical(op) => op.output_columns(&children),
            Operator::Physical(op) => op.output_columns(&children),
            Operator::Leaf(group) => leaf_columns(*group),
        }
    }

    /// Returns aliases of tables referenced by this tree. Aliases of leaves are provided by `leaf_aliases`.
    pub fn table_aliases_with<F>(&self, leaf_aliases: &F) -> BTreeSet<String>
    where
        F: Fn(GroupId) -> BTreeSet<String>,
    {
        match &self.op {
            Operator::Leaf(group) => leaf_aliases(*group),
            Operator::Logical(LogicalOperator::Get { table: Some(_), alias, .. })
            | Operator::Physical(PhysicalOperator::SeqScan { alias, .. })
            | Operator::Physical(PhysicalOperator::IndexScan { alias, .. }) => {
                let mut aliases = BTreeSet::new();
                aliases.insert(alias.clone());
                aliases
            }
            _ => self.children.iter().flat_map(|c| c.table_aliases_with(leaf_aliases)).collect(),
        }
    }

    /// Returns columns produced by this tree. The tree must not contain leaves.
    pub fn output_columns(&self) -> Vec<ColumnId> {
        self.output_columns_with(&|group: GroupId| -> Vec<ColumnId> { panic!("Unexpected leaf: {}", group) })
    }

    /// Returns aliases of tables referenced by this tree. The tree must not contain leaves.
    pub fn table_aliases(&self) -> BTreeSet<String> {
        self.table_aliases_with(&|group: GroupId| -> BTreeSet<String> { panic!("Unexpected leaf: {}", group) })
    }
}

impl Display for OperatorExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format_operator_tree(self))
    }
}

/// Provides methods to build a textual representation of an operator.
pub trait OperatorFormatter {
    /// Writes the name of an operator.
    fn write_name(&mut self, name: &str);

    /// Writes the `source` attribute of an operator (a table name for example).
    fn write_source(&mut self, source: &str);

    /// Called by an operator after its name and source have been written.
    /// Formatters that display inputs of an operator inline write them here.
    fn write_children(&mut self);

    /// Writes a value of some attribute of an operator.
    fn write_value<D>(&mut self, name: &str, value: D)
    where
        D: Display;

    /// Writes values of some attribute of an operator. Empty lists are not written.
    fn write_values<D>(&mut self, name: &str, values: &[D])
    where
        D: Display;
}

/// An [OperatorFormatter] that writes an operator into a string buffer.
/// If `children` is set they are written after the name of the operator.
pub struct StringOperatorFormatter<'b> {
    buf: &'b mut String,
    children: Option<String>,
}

impl<'b> StringOperatorFormatter<'b> {
    pub fn new(buf: &'b mut String) -> Self {
        StringOperatorFormatter { buf, children: None }
    }

    /// Creates a formatter that writes the given inputs (memo groups) of an operator.
    pub fn with_children(buf: &'b mut String, children: &[GroupId]) -> Self {
        let children = if children.is_empty() {
            None
        } else {
            let ids: Vec<String> = children.iter().map(|c| format!("{}", c)).collect();
            Some(format!("[{}]", ids.join(" ")))
        };
        StringOperatorFormatter { buf, children }
    }
}

impl OperatorFormatter for StringOperatorFormatter<'_> {
    fn write_name(&mut self, name: &str) {
        self.buf.push_str(name);
    }

    fn write_source(&mut self, source: &str) {
        self.buf.push(' ');
        self.buf.push_str(source);
    }

    fn write_children(&mut self) {
        if let Some(children) = self.children.take() {
            self.buf.push(' ');
            self.buf.push_str(&children);
        }
    }

    fn write_value<D>(&mut self, name: &str, value: D)
    where
        D: Display,
    {
        self.buf.push(' ');
        self.buf.push_str(name);
        self.buf.push('=');
        self.buf.push_str(value.to_string().as_str());
    }

    fn write_values<D>(&mut self, name: &str, values: &[D])
    where
        D: Display,
    {
        if values.is_empty() {
            return;
        }
        self.buf.push(' ');
        self.buf.push_str(name);
        self.buf.push_str("=[");
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            self.buf.push_str(&value.to_string());
        }
        self.buf.push(']');
    }
}

/// Builds the following textual representation of the given operator tree:
///
/// ```text:
///  RootExpr [root-expr-properties]
///    Expr_0 [expr_0-properties]
///      ...
///    Expr_n [expr_n-properties]
/// ```
pub fn format_operator_tree(expr: &OperatorExpr) -> String {
    fn format(expr: &OperatorExpr, depth: usize, buf: &mut String) {
        for _ in 0..depth {
            buf.push_str("  ");
        }
        let mut fmt = StringOperatorFormatter::new(buf);
        expr.op.format(&mut fmt);
        buf.push('\n');
        for child in expr.children.iter() {
            format(child, depth + 1, buf);
        }
    }

    let mut buf = String::new();
    format(expr, 0, &mut buf);
    buf
}
