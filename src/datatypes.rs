use std::fmt::{Display, Formatter};

/// Data types supported in scalar expressions and column definitions.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum DataType {
    Null,
    Bool,
    TinyInt,
    SmallInt,
    Int32,
    Int64,
    Decimal,
    Date,
    Timestamp,
    String,
}

impl DataType {
    /// Returns `true` if values of this type do not have a fixed size.
    pub fn is_variable_length(&self) -> bool {
        matches!(self, DataType::String)
    }

    /// Returns `true` if this is a numeric type.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DataType::TinyInt | DataType::SmallInt | DataType::Int32 | DataType::Int64 | DataType::Decimal
        )
    }

    /// Returns the shape in which values of this type are stored in memory:
    /// a value slot and an optional length slot for variable-length data.
    pub fn materialization(&self) -> Materialization {
        match self {
            DataType::Null | DataType::Bool | DataType::TinyInt => Materialization::fixed(PhysicalType::Int8),
            DataType::SmallInt => Materialization::fixed(PhysicalType::Int16),
            DataType::Int32 | DataType::Date => Materialization::fixed(PhysicalType::Int32),
            DataType::Int64 | DataType::Timestamp => Materialization::fixed(PhysicalType::Int64),
            DataType::Decimal => Materialization::fixed(PhysicalType::Double),
            DataType::String => Materialization {
                value: PhysicalType::Offset,
                length: Some(PhysicalType::Int32),
            },
        }
    }

    /// Returns a type both types can be converted to without a loss of precision.
    /// Returns `None` if there is no such type.
    pub fn common_type(&self, other: &DataType) -> Option<DataType> {
        if self == other {
            return Some(*self);
        }
        match (self, other) {
            (DataType::Null, t) | (t, DataType::Null) => Some(*t),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                if *a == DataType::Decimal || *b == DataType::Decimal {
                    Some(DataType::Decimal)
                } else if a.numeric_rank() >= b.numeric_rank() {
                    Some(*a)
                } else {
                    Some(*b)
                }
            }
            _ => None,
        }
    }

    fn numeric_rank(&self) -> u8 {
        match self {
            DataType::TinyInt => 1,
            DataType::SmallInt => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            DataType::Decimal => 5,
            _ => 0,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Describes how a value of a [DataType] is laid out in memory.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Materialization {
    /// The type of the slot that stores the value.
    pub value: PhysicalType,
    /// The type of the slot that stores the length of a variable-length value.
    pub length: Option<PhysicalType>,
}

impl Materialization {
    fn fixed(value: PhysicalType) -> Self {
        Materialization { value, length: None }
    }
}

/// Machine-level types of storage slots.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum PhysicalType {
    Int8,
    Int16,
    Int32,
    Int64,
    Double,
    /// A reference into a variable-length data heap.
    Offset,
}

impl PhysicalType {
    /// The number of bytes a slot of this type occupies.
    pub fn num_bytes(&self) -> usize {
        match self {
            PhysicalType::Int8 => 1,
            PhysicalType::Int16 => 2,
            PhysicalType::Int32 => 4,
            PhysicalType::Int64 | PhysicalType::Double | PhysicalType::Offset => 8,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_materialization() {
        assert_eq!(DataType::Int32.materialization().value.num_bytes(), 4);
        assert_eq!(DataType::Bool.materialization().value.num_bytes(), 1);

        let varchar = DataType::String.materialization();
        assert_eq!(varchar.value, PhysicalType::Offset);
        assert_eq!(varchar.length, Some(PhysicalType::Int32));
    }

    #[test]
    fn test_common_type() {
        assert_eq!(DataType::Int32.common_type(&DataType::Int64), Some(DataType::Int64));
        assert_eq!(DataType::SmallInt.common_type(&DataType::Decimal), Some(DataType::Decimal));
        assert_eq!(DataType::Null.common_type(&DataType::String), Some(DataType::String));
        assert_eq!(DataType::Bool.common_type(&DataType::Int32), None);
    }
}
