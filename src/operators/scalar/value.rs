use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use ordered_float::OrderedFloat;

use crate::datatypes::DataType;

/// Supported scalar values.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int32(i32),
    Int64(i64),
    Decimal(OrderedFloat<f64>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    String(String),
}

impl ScalarValue {
    /// Returns the type of this scalar value.
    pub fn data_type(&self) -> DataType {
        match self {
            ScalarValue::Null => DataType::Null,
            ScalarValue::Bool(_) => DataType::Bool,
            ScalarValue::TinyInt(_) => DataType::TinyInt,
            ScalarValue::SmallInt(_) => DataType::SmallInt,
            ScalarValue::Int32(_) => DataType::Int32,
            ScalarValue::Int64(_) => DataType::Int64,
            ScalarValue::Decimal(_) => DataType::Decimal,
            ScalarValue::Date(_) => DataType::Date,
            ScalarValue::Timestamp(_) => DataType::Timestamp,
            ScalarValue::String(_) => DataType::String,
        }
    }

    /// Creates a decimal value.
    pub fn decimal(value: f64) -> ScalarValue {
        ScalarValue::Decimal(OrderedFloat(value))
    }

    /// Returns `true` if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Returns the value of an integer type as `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::TinyInt(v) => Some(*v as i64),
            ScalarValue::SmallInt(v) => Some(*v as i64),
            ScalarValue::Int32(v) => Some(*v as i64),
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value of a numeric type as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Decimal(v) => Some(v.0),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the value as a boolean. NULL is returned as `None`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScalarValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Compares this value with another value of a compatible type.
    /// Numeric values of different types are compared by their numeric value.
    /// Returns `None` if either value is NULL or the types are not comparable.
    pub fn compare(&self, other: &ScalarValue) -> Option<Ordering> {
        match (self, other) {
            (ScalarValue::Null, _) | (_, ScalarValue::Null) => None,
            (ScalarValue::Bool(l), ScalarValue::Bool(r)) => Some(l.cmp(r)),
            (ScalarValue::Date(l), ScalarValue::Date(r)) => Some(l.cmp(r)),
            (ScalarValue::Timestamp(l), ScalarValue::Timestamp(r)) => Some(l.cmp(r)),
            (ScalarValue::String(l), ScalarValue::String(r)) => Some(l.cmp(r)),
            (l, r) => match (l.as_i64(), r.as_i64()) {
                (Some(l), Some(r)) => Some(l.cmp(&r)),
                _ => match (l.as_f64(), r.as_f64()) {
                    (Some(l), Some(r)) => OrderedFloat(l).partial_cmp(&OrderedFloat(r)),
                    _ => None,
                },
            },
        }
    }

    /// Converts this value to the given type. NULL can be converted to any type.
    /// Returns `None` if the conversion is not supported or loses information.
    pub fn cast(&self, data_type: DataType) -> Option<ScalarValue> {
        use std::convert::TryFrom;

        if self.data_type() == data_type || self.is_null() {
            return Some(self.clone());
        }
        match data_type {
            DataType::TinyInt => self.as_i64().and_then(|v| i8::try_from(v).ok()).map(ScalarValue::TinyInt),
            DataType::SmallInt => self.as_i64().and_then(|v| i16::try_from(v).ok()).map(ScalarValue::SmallInt),
            DataType::Int32 => self.as_i64().and_then(|v| i32::try_from(v).ok()).map(ScalarValue::Int32),
            DataType::Int64 => self.as_i64().map(ScalarValue::Int64),
            DataType::Decimal => self.as_f64().map(ScalarValue::decimal),
            DataType::Timestamp => match self {
                ScalarValue::Date(d) => d.and_hms_opt(0, 0, 0).map(ScalarValue::Timestamp),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Encodes a date as the number of days since 0001-01-01.
pub fn date_to_days(date: &NaiveDate) -> i32 {
    use chrono::Datelike;
    date.num_days_from_ce()
}

/// Decodes a date encoded by [date_to_days].
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days)
}

/// Encodes a timestamp as the number of microseconds since the unix epoch.
pub fn timestamp_to_micros(ts: &NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

/// Decodes a timestamp encoded by [timestamp_to_micros].
pub fn micros_to_timestamp(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|ts| ts.naive_utc())
}

impl Display for ScalarValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Bool(value) => write!(f, "{}", value),
            ScalarValue::TinyInt(value) => write!(f, "{}", value),
            ScalarValue::SmallInt(value) => write!(f, "{}", value),
            ScalarValue::Int32(value) => write!(f, "{}", value),
            ScalarValue::Int64(value) => write!(f, "{}", value),
            ScalarValue::Decimal(value) => write!(f, "{}", value),
            ScalarValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            ScalarValue::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S%.f")),
            ScalarValue::String(value) => write!(f, "'{}'", value),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scalar_value_data_types() {
        assert_eq!(ScalarValue::Null.data_type(), DataType::Null, "null value");
        assert_eq!(ScalarValue::Bool(true).data_type(), DataType::Bool, "bool value");
        assert_eq!(ScalarValue::Int32(1).data_type(), DataType::Int32, "i32 value");
        assert_eq!(ScalarValue::decimal(1.5).data_type(), DataType::Decimal, "decimal value");
        assert_eq!(ScalarValue::String(String::from("abc")).data_type(), DataType::String, "string value");
    }

    #[test]
    fn test_compare_numeric_values_of_different_types() {
        assert_eq!(ScalarValue::Int32(1).compare(&ScalarValue::Int64(2)), Some(Ordering::Less));
        assert_eq!(ScalarValue::decimal(2.0).compare(&ScalarValue::Int32(2)), Some(Ordering::Equal));
        assert_eq!(ScalarValue::Int32(1).compare(&ScalarValue::Null), None);
        assert_eq!(ScalarValue::Int32(1).compare(&ScalarValue::String("1".into())), None);
    }

    #[test]
    fn test_cast() {
        assert_eq!(ScalarValue::Int32(7).cast(DataType::Int64), Some(ScalarValue::Int64(7)));
        assert_eq!(ScalarValue::Int64(70000).cast(DataType::SmallInt), None);
        assert_eq!(ScalarValue::Null.cast(DataType::Date), Some(ScalarValue::Null));
    }

    #[test]
    fn test_date_time_encoding() {
        let date = NaiveDate::from_ymd_opt(2021, 3, 14).unwrap();
        assert_eq!(days_to_date(date_to_days(&date)), Some(date));

        let ts = date.and_hms_micro_opt(12, 30, 5, 250).unwrap();
        assert_eq!(micros_to_timestamp(timestamp_to_micros(&ts)), Some(ts));
    }
}
