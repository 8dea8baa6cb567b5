//! Physical properties. See [PropertySet].

use std::fmt::{Display, Formatter};

use itertools::Itertools;

use crate::meta::ColumnId;
use crate::operators::scalar::expr::AnnotatedExpr;

pub mod deriver;

/// A column of a sort order.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SortKey {
    pub column: ColumnId,
    pub ascending: bool,
}

impl SortKey {
    /// Ascending order by the given column.
    pub fn asc(column: ColumnId) -> Self {
        SortKey {
            column,
            ascending: true,
        }
    }

    /// Descending order by the given column.
    pub fn desc(column: ColumnId) -> Self {
        SortKey {
            column,
            ascending: false,
        }
    }
}

impl Display for SortKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "col:{} {}", self.column, if self.ascending { "ASC" } else { "DESC" })
    }
}

/// A physical property that can be required from or provided by an operator.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum Property {
    /// Rows must satisfy the given predicates.
    Predicate(Vec<AnnotatedExpr>),
    /// Rows must consist of the given columns in the given order.
    Columns(Vec<ColumnId>),
    /// Rows must be distinct on the given columns.
    Distinct(Vec<ColumnId>),
    /// Rows must be sorted by the given keys.
    Sort(Vec<SortKey>),
    /// Only `limit` rows after `offset` rows must be returned.
    Limit { offset: usize, limit: usize },
}

/// The kind of a [Property]. The order of kinds is the order in which missing properties are enforced
/// (from the bottom of a plan to its top).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum PropertyKind {
    Predicate,
    Columns,
    Distinct,
    Sort,
    Limit,
}

impl Property {
    /// Returns the kind of this property.
    pub fn kind(&self) -> PropertyKind {
        match self {
            Property::Predicate(_) => PropertyKind::Predicate,
            Property::Columns(_) => PropertyKind::Columns,
            Property::Distinct(_) => PropertyKind::Distinct,
            Property::Sort(_) => PropertyKind::Sort,
            Property::Limit { .. } => PropertyKind::Limit,
        }
    }

    /// Returns `true` if this property (provided by an operator) satisfies the `required` property.
    pub fn satisfies(&self, required: &Property) -> bool {
        match (self, required) {
            (Property::Sort(provided), Property::Sort(required)) => {
                provided.len() >= required.len() && provided.iter().zip(required.iter()).all(|(p, r)| p == r)
            }
            (Property::Distinct(provided), Property::Distinct(required)) => {
                provided.len() == required.len() && provided.iter().all(|c| required.contains(c))
            }
            (Property::Predicate(provided), Property::Predicate(required)) => {
                required.iter().all(|p| provided.contains(p))
            }
            (provided, required) => provided == required,
        }
    }
}

impl Display for Property {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Property::Predicate(predicates) => write!(f, "predicate=[{}]", predicates.iter().join(", ")),
            Property::Columns(columns) => write!(f, "columns={:?}", columns),
            Property::Distinct(columns) => write!(f, "distinct={:?}", columns),
            Property::Sort(keys) => write!(f, "sort=[{}]", keys.iter().join(", ")),
            Property::Limit { offset, limit } => write!(f, "limit={} offset={}", limit, offset),
        }
    }
}

/// A set of physical properties. At most one property of each [kind](PropertyKind) is stored.
/// Properties are kept in the order of their kinds so two sets with the same properties are equal
/// and have the same hash.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Default)]
pub struct PropertySet {
    properties: Vec<Property>,
}

impl PropertySet {
    /// Returns an empty property set.
    pub fn empty() -> Self {
        PropertySet::default()
    }

    /// Creates a property set from the given properties.
    /// If the list contains multiple properties of the same kind the last one wins.
    pub fn new(properties: Vec<Property>) -> Self {
        let mut set = PropertySet::empty();
        for p in properties {
            set.add(p);
        }
        set
    }

    /// Returns a property set with a single sort property.
    pub fn sort(keys: Vec<SortKey>) -> Self {
        PropertySet::new(vec![Property::Sort(keys)])
    }

    /// Adds the given property to this set. An existing property of the same kind is replaced.
    pub fn add(&mut self, property: Property) {
        let kind = property.kind();
        match self.properties.binary_search_by(|p| p.kind().cmp(&kind)) {
            Ok(i) => self.properties[i] = property,
            Err(i) => self.properties.insert(i, property),
        }
    }

    /// Returns a copy of this set with the given property added.
    pub fn with(&self, property: Property) -> Self {
        let mut set = self.clone();
        set.add(property);
        set
    }

    /// Returns a copy of this set without properties of the given kind.
    pub fn without(&self, kind: PropertyKind) -> Self {
        PropertySet {
            properties: self.properties.iter().filter(|p| p.kind() != kind).cloned().collect(),
        }
    }

    /// Returns a property of the given kind.
    pub fn get(&self, kind: PropertyKind) -> Option<&Property> {
        self.properties.iter().find(|p| p.kind() == kind)
    }

    /// Returns the sort order if this set contains one.
    pub fn sort_keys(&self) -> Option<&[SortKey]> {
        match self.get(PropertyKind::Sort) {
            Some(Property::Sort(keys)) => Some(keys),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }

    /// Returns `true` if properties of this set satisfy every property of the `required` set.
    pub fn satisfies(&self, required: &PropertySet) -> bool {
        required
            .properties
            .iter()
            .all(|r| self.get(r.kind()).map(|p| p.satisfies(r)).unwrap_or(false))
    }

    /// Returns properties of `required` that are not satisfied by this set, in enforcement order.
    pub fn missing(&self, required: &PropertySet) -> Vec<Property> {
        required
            .properties
            .iter()
            .filter(|r| !self.get(r.kind()).map(|p| p.satisfies(r)).unwrap_or(false))
            .cloned()
            .collect()
    }
}

impl Display for PropertySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.properties.iter().join(", "))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn canonical_order() {
        let a = PropertySet::new(vec![Property::Limit { offset: 0, limit: 10 }, Property::Sort(vec![SortKey::asc(1)])]);
        let b = PropertySet::new(vec![Property::Sort(vec![SortKey::asc(1)]), Property::Limit { offset: 0, limit: 10 }]);

        assert_eq!(a, b);
        assert_eq!(format!("{}", a), "{sort=[col:1 ASC], limit=10 offset=0}");
    }

    #[test]
    fn sort_prefix_satisfies() {
        let provided = PropertySet::sort(vec![SortKey::asc(1), SortKey::desc(2)]);

        assert!(provided.satisfies(&PropertySet::sort(vec![SortKey::asc(1)])), "prefix");
        assert!(!provided.satisfies(&PropertySet::sort(vec![SortKey::desc(1)])), "direction");
        assert!(!provided.satisfies(&PropertySet::sort(vec![SortKey::desc(2)])), "not a prefix");
        assert!(provided.satisfies(&PropertySet::empty()), "empty");
        assert!(!PropertySet::empty().satisfies(&provided), "nothing provided");
    }

    #[test]
    fn missing_properties() {
        let required = PropertySet::new(vec![
            Property::Limit { offset: 0, limit: 5 },
            Property::Sort(vec![SortKey::asc(1)]),
            Property::Distinct(vec![1, 2]),
        ]);
        let provided = PropertySet::new(vec![Property::Distinct(vec![2, 1])]);
        let missing: Vec<PropertyKind> = provided.missing(&required).iter().map(|p| p.kind()).collect();

        assert_eq!(missing, vec![PropertyKind::Sort, PropertyKind::Limit]);
    }

    #[test]
    fn replace_property_of_the_same_kind() {
        let set = PropertySet::sort(vec![SortKey::asc(1)]).with(Property::Sort(vec![SortKey::asc(2)]));
        assert_eq!(set.sort_keys(), Some(&[SortKey::asc(2)][..]));
        assert_eq!(set.len(), 1);
        assert!(set.without(PropertyKind::Sort).is_empty());
    }
}
