//! Derivation of properties required from inputs of physical operators.

use crate::memo::{GroupExpr, Memo};
use crate::meta::ColumnId;
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::expr::ScalarExpr;
use crate::operators::JoinType;
use crate::properties::{Property, PropertySet, SortKey};

/// An alternative way to execute a physical expression: the properties the expression provides
/// and the properties it requires from each of its inputs.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PropertyAlternative {
    pub output: PropertySet,
    pub inputs: Vec<PropertySet>,
}

impl PropertyAlternative {
    fn new(output: PropertySet, inputs: Vec<PropertySet>) -> Self {
        PropertyAlternative { output, inputs }
    }

    /// An alternative that provides nothing and requires nothing from its inputs.
    fn none(num_children: usize) -> Self {
        PropertyAlternative::new(PropertySet::empty(), vec![PropertySet::empty(); num_children])
    }
}

/// Returns alternatives for the given physical expression under the given required properties.
/// Properties that are required but not provided by an alternative must be enforced by the caller.
pub fn derive_input_properties(expr: &GroupExpr, required: &PropertySet, memo: &Memo) -> Vec<PropertyAlternative> {
    let num_children = expr.children().len();
    let required_sort = required.sort_keys().filter(|s| !s.is_empty());

    match expr.physical() {
        PhysicalOperator::IndexScan { index, .. } => match required_sort {
            Some(sort) if is_ascending_prefix(sort, &index.key_columns) => {
                vec![PropertyAlternative::new(PropertySet::sort(sort.to_vec()), vec![])]
            }
            _ => vec![PropertyAlternative::none(num_children)],
        },
        PhysicalOperator::Filter { .. } => match required_sort {
            Some(sort) => {
                let sorted = PropertySet::sort(sort.to_vec());
                vec![
                    PropertyAlternative::new(sorted.clone(), vec![sorted]),
                    PropertyAlternative::none(num_children),
                ]
            }
            None => vec![PropertyAlternative::none(num_children)],
        },
        PhysicalOperator::Projection { exprs, .. } => match required_sort {
            Some(sort) if sort_passes_through(sort, exprs.iter().filter_map(|e| e.as_column())) => {
                let sorted = PropertySet::sort(sort.to_vec());
                vec![
                    PropertyAlternative::new(sorted.clone(), vec![sorted]),
                    PropertyAlternative::none(num_children),
                ]
            }
            _ => vec![PropertyAlternative::none(num_children)],
        },
        PhysicalOperator::InnerNLJoin { .. }
        | PhysicalOperator::OuterNLJoin {
            join_type: JoinType::Left,
            ..
        } => {
            // The outer loop iterates over the left input so its order is preserved.
            // Unmatched rows of the right input are emitted last so right and full joins provide no order.
            let left = expr.children()[0];
            let left_columns = memo.group(left).output_columns();
            match required_sort {
                Some(sort) if sort.iter().all(|k| left_columns.contains(&k.column)) => {
                    let sorted = PropertySet::sort(sort.to_vec());
                    vec![
                        PropertyAlternative::new(sorted.clone(), vec![sorted, PropertySet::empty()]),
                        PropertyAlternative::none(num_children),
                    ]
                }
                _ => vec![PropertyAlternative::none(num_children)],
            }
        }
        PhysicalOperator::Limit { sort, .. } if !sort.is_empty() => {
            let sorted = PropertySet::sort(sort.clone());
            vec![PropertyAlternative::new(sorted.clone(), vec![sorted])]
        }
        PhysicalOperator::SortGroupBy { group_by, .. } => {
            let sort: Vec<SortKey> = group_by.iter().map(|c| SortKey::asc(*c)).collect();
            let sorted = PropertySet::sort(sort);
            vec![PropertyAlternative::new(sorted.clone(), vec![sorted])]
        }
        PhysicalOperator::OrderBy { sort } => {
            vec![PropertyAlternative::new(PropertySet::sort(sort.clone()), vec![PropertySet::empty()])]
        }
        _ => vec![PropertyAlternative::none(num_children)],
    }
}

/// Returns the physical operator that enforces the given property.
pub fn enforcer(property: &Property) -> PhysicalOperator {
    match property {
        Property::Predicate(predicates) => PhysicalOperator::Filter {
            predicates: predicates.clone(),
        },
        Property::Columns(columns) => PhysicalOperator::Projection {
            exprs: columns.iter().map(|c| ScalarExpr::Column(*c)).collect(),
            columns: columns.clone(),
        },
        Property::Distinct(columns) => PhysicalOperator::HashDistinct {
            columns: columns.clone(),
        },
        Property::Sort(sort) => PhysicalOperator::OrderBy { sort: sort.clone() },
        Property::Limit { offset, limit } => PhysicalOperator::Limit {
            offset: *offset,
            limit: *limit,
            sort: vec![],
        },
    }
}

fn is_ascending_prefix(sort: &[SortKey], key_columns: &[ColumnId]) -> bool {
    sort.len() <= key_columns.len() && sort.iter().zip(key_columns.iter()).all(|(k, c)| k.ascending && k.column == *c)
}

fn sort_passes_through<I>(sort: &[SortKey], columns: I) -> bool
where
    I: Iterator<Item = ColumnId>,
{
    let columns: Vec<ColumnId> = columns.collect();
    sort.iter().all(|k| columns.contains(&k.column))
}
