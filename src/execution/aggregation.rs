//! Aggregate functions evaluated by the hash group by and aggregate operators.

use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::expression::{eval_binary, expr_type, CompiledExpr};
use crate::execution::hash_table::EntryMut;
use crate::meta::{ColumnId, Metadata};
use crate::operators::scalar::expr::{AggregateFunction, BinaryOp, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;

/// Storage of intermediate values of aggregate functions.
pub trait Accumulators {
    fn get(&self, slot: usize) -> Result<ScalarValue, ExecutionError>;

    fn set(&mut self, slot: usize, value: &ScalarValue) -> Result<(), ExecutionError>;
}

impl Accumulators for Vec<ScalarValue> {
    fn get(&self, slot: usize) -> Result<ScalarValue, ExecutionError> {
        self.as_slice()
            .get(slot)
            .cloned()
            .ok_or_else(|| ExecutionError::internal(format!("Unknown aggregate slot: {}", slot)))
    }

    fn set(&mut self, slot: usize, value: &ScalarValue) -> Result<(), ExecutionError> {
        match self.get_mut(slot) {
            Some(v) => {
                *v = value.clone();
                Ok(())
            }
            None => Err(ExecutionError::internal(format!("Unknown aggregate slot: {}", slot))),
        }
    }
}

impl Accumulators for EntryMut<'_> {
    fn get(&self, slot: usize) -> Result<ScalarValue, ExecutionError> {
        EntryMut::get(self, slot)
    }

    fn set(&mut self, slot: usize, value: &ScalarValue) -> Result<(), ExecutionError> {
        EntryMut::set(self, slot, value)
    }
}

#[derive(Debug, Clone)]
struct AggregateInfo {
    func: AggregateFunction,
    /// `None` for `COUNT(*)`.
    arg: Option<CompiledExpr>,
    /// The first slot of this aggregate.
    slot: usize,
    result_type: DataType,
}

/// Describes a list of aggregate functions and the slots that store their intermediate values.
///
/// * `COUNT(x)` and `COUNT(*)` use a single `Int64` slot.
/// * `SUM`, `MIN`, `MAX` use a single slot of the type of their argument.
/// * `AVG` uses three slots: an internal `SUM` (`Decimal`), an internal `COUNT` (`Int64`)
/// and the `Decimal` result computed by [finalize_values](Self::finalize_values).
#[derive(Debug, Clone)]
pub struct Aggregation {
    aggregates: Vec<AggregateInfo>,
    slot_types: Vec<DataType>,
}

impl Aggregation {
    /// Prepares the given aggregate expressions. Arguments are compiled against the given input layout.
    pub fn setup(
        aggregates: &[ScalarExpr],
        layout: &[ColumnId],
        metadata: &Metadata,
    ) -> Result<Aggregation, ExecutionError> {
        let mut infos = Vec::with_capacity(aggregates.len());
        let mut slot_types = Vec::new();

        for expr in aggregates {
            let (func, args) = match expr {
                ScalarExpr::Aggregate { func, args } => (*func, args),
                _ => return Err(ExecutionError::argument(format!("Not an aggregate function: {}", expr))),
            };
            if args.len() > 1 {
                return Err(ExecutionError::argument(format!("Too many arguments: {}", expr)));
            }
            if args.is_empty() && func != AggregateFunction::Count {
                return Err(ExecutionError::argument(format!("No arguments: {}", expr)));
            }
            let (arg, arg_type) = match args.first() {
                Some(arg) => (Some(CompiledExpr::compile(arg, layout)?), Some(expr_type(arg, metadata)?)),
                None => (None, None),
            };
            let result_type = func.return_type(arg_type);
            let slot = slot_types.len();

            match func {
                AggregateFunction::Count => slot_types.push(DataType::Int64),
                AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
                    slot_types.push(result_type)
                }
                AggregateFunction::Avg => {
                    slot_types.push(DataType::Decimal);
                    slot_types.push(DataType::Int64);
                    slot_types.push(DataType::Decimal);
                }
            }

            infos.push(AggregateInfo {
                func,
                arg,
                slot,
                result_type,
            });
        }

        Ok(Aggregation {
            aggregates: infos,
            slot_types,
        })
    }

    /// Types of slots that store intermediate values.
    pub fn slot_types(&self) -> &[DataType] {
        &self.slot_types
    }

    /// Types of finalized values.
    pub fn result_types(&self) -> Vec<DataType> {
        self.aggregates.iter().map(|a| a.result_type).collect()
    }

    pub fn num_aggregates(&self) -> usize {
        self.aggregates.len()
    }

    /// Writes initial values into the given accumulators.
    pub fn create_initial_values<A>(&self, acc: &mut A) -> Result<(), ExecutionError>
    where
        A: Accumulators,
    {
        for agg in self.aggregates.iter() {
            match agg.func {
                AggregateFunction::Count => acc.set(agg.slot, &ScalarValue::Int64(0))?,
                AggregateFunction::Sum | AggregateFunction::Min | AggregateFunction::Max => {
                    acc.set(agg.slot, &ScalarValue::Null)?
                }
                AggregateFunction::Avg => {
                    acc.set(agg.slot, &ScalarValue::decimal(0.0))?;
                    acc.set(agg.slot + 1, &ScalarValue::Int64(0))?;
                    acc.set(agg.slot + 2, &ScalarValue::Null)?;
                }
            }
        }
        Ok(())
    }

    /// Returns a list of accumulators with initial values.
    pub fn initial_values(&self) -> Result<Vec<ScalarValue>, ExecutionError> {
        let mut values = vec![ScalarValue::Null; self.slot_types.len()];
        self.create_initial_values(&mut values)?;
        Ok(values)
    }

    /// Updates the given accumulators with values of the given row. NULL arguments are ignored.
    pub fn advance_values<A>(&self, acc: &mut A, row: &[ScalarValue]) -> Result<(), ExecutionError>
    where
        A: Accumulators,
    {
        for agg in self.aggregates.iter() {
            let arg = match &agg.arg {
                Some(arg) => arg.eval(row)?,
                None => {
                    // COUNT(*)
                    increment(acc, agg.slot, 1)?;
                    continue;
                }
            };
            if arg.is_null() {
                continue;
            }
            match agg.func {
                AggregateFunction::Count => increment(acc, agg.slot, 1)?,
                AggregateFunction::Sum => add(acc, agg.slot, &arg, agg.result_type)?,
                AggregateFunction::Min => keep_if(acc, agg.slot, &arg, BinaryOp::Lt, agg.result_type)?,
                AggregateFunction::Max => keep_if(acc, agg.slot, &arg, BinaryOp::Gt, agg.result_type)?,
                AggregateFunction::Avg => {
                    add(acc, agg.slot, &arg, DataType::Decimal)?;
                    increment(acc, agg.slot + 1, 1)?;
                }
            }
        }
        Ok(())
    }

    /// Merges intermediate values of `other` into `acc`.
    pub fn merge_values<A, B>(&self, acc: &mut A, other: &B) -> Result<(), ExecutionError>
    where
        A: Accumulators,
        B: Accumulators,
    {
        for agg in self.aggregates.iter() {
            let value = other.get(agg.slot)?;
            match agg.func {
                AggregateFunction::Count => {
                    increment(acc, agg.slot, value.as_i64().unwrap_or_default())?;
                }
                _ if value.is_null() => {}
                AggregateFunction::Sum => add(acc, agg.slot, &value, agg.result_type)?,
                AggregateFunction::Min => keep_if(acc, agg.slot, &value, BinaryOp::Lt, agg.result_type)?,
                AggregateFunction::Max => keep_if(acc, agg.slot, &value, BinaryOp::Gt, agg.result_type)?,
                AggregateFunction::Avg => {
                    add(acc, agg.slot, &value, DataType::Decimal)?;
                    let count = other.get(agg.slot + 1)?;
                    increment(acc, agg.slot + 1, count.as_i64().unwrap_or_default())?;
                }
            }
        }
        Ok(())
    }

    /// Computes final values of aggregate functions. `AVG` of no values is NULL.
    pub fn finalize_values<A>(&self, acc: &mut A) -> Result<Vec<ScalarValue>, ExecutionError>
    where
        A: Accumulators,
    {
        let mut result = Vec::with_capacity(self.aggregates.len());
        for agg in self.aggregates.iter() {
            let value = match agg.func {
                AggregateFunction::Avg => {
                    let sum = acc.get(agg.slot)?.as_f64().unwrap_or_default();
                    let count = acc.get(agg.slot + 1)?.as_i64().unwrap_or_default();
                    let avg = if count == 0 {
                        ScalarValue::Null
                    } else {
                        ScalarValue::decimal(sum / count as f64)
                    };
                    acc.set(agg.slot + 2, &avg)?;
                    avg
                }
                _ => acc.get(agg.slot)?,
            };
            result.push(value);
        }
        Ok(result)
    }

    /// Values produced by an aggregation without input rows: `COUNT` is `0`, other functions are NULL.
    pub fn empty_input_values(&self) -> Result<Vec<ScalarValue>, ExecutionError> {
        let mut values = self.initial_values()?;
        self.finalize_values(&mut values)
    }
}

fn increment<A>(acc: &mut A, slot: usize, n: i64) -> Result<(), ExecutionError>
where
    A: Accumulators,
{
    let count = acc.get(slot)?.as_i64().unwrap_or_default();
    acc.set(slot, &ScalarValue::Int64(count + n))
}

fn add<A>(acc: &mut A, slot: usize, value: &ScalarValue, data_type: DataType) -> Result<(), ExecutionError>
where
    A: Accumulators,
{
    let current = acc.get(slot)?;
    let sum = if current.is_null() {
        value.clone()
    } else {
        eval_binary(&current, &BinaryOp::Plus, value)?
    };
    let sum = sum
        .cast(data_type)
        .ok_or_else(|| ExecutionError::argument(format!("Numeric overflow: {} + {}", current, value)))?;
    acc.set(slot, &sum)
}

fn keep_if<A>(
    acc: &mut A,
    slot: usize,
    value: &ScalarValue,
    op: BinaryOp,
    data_type: DataType,
) -> Result<(), ExecutionError>
where
    A: Accumulators,
{
    let current = acc.get(slot)?;
    let replace = current.is_null() || eval_binary(value, &op, &current)?.as_bool() == Some(true);
    if replace {
        let value = value
            .cast(data_type)
            .ok_or_else(|| ExecutionError::type_mismatch(data_type, value.data_type()))?;
        acc.set(slot, &value)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::ColumnMetadata;
    use itertools::Itertools;

    fn aggregate(func: AggregateFunction, args: Vec<ScalarExpr>) -> ScalarExpr {
        ScalarExpr::Aggregate { func, args }
    }

    fn new_aggregation(aggregates: Vec<ScalarExpr>) -> Aggregation {
        let mut metadata = Metadata::new();
        let a = metadata.add_column(ColumnMetadata::new_synthetic_column("a".into(), DataType::Int32));
        let b = metadata.add_column(ColumnMetadata::new_synthetic_column("b".into(), DataType::Decimal));
        Aggregation::setup(&aggregates, &[a, b], &metadata).unwrap()
    }

    fn all_aggregates() -> Vec<ScalarExpr> {
        let a = || ScalarExpr::Column(1);
        vec![
            aggregate(AggregateFunction::Count, vec![]),
            aggregate(AggregateFunction::Count, vec![a()]),
            aggregate(AggregateFunction::Sum, vec![a()]),
            aggregate(AggregateFunction::Min, vec![a()]),
            aggregate(AggregateFunction::Max, vec![a()]),
            aggregate(AggregateFunction::Avg, vec![a()]),
        ]
    }

    fn row(a: Option<i32>) -> Vec<ScalarValue> {
        vec![a.map(ScalarValue::Int32).unwrap_or(ScalarValue::Null), ScalarValue::decimal(1.0)]
    }

    #[test]
    fn slot_types() {
        let aggregation = new_aggregation(all_aggregates());
        assert_eq!(
            format!("{:?}", aggregation.slot_types()),
            "[Int64, Int64, Int32, Int32, Int32, Decimal, Int64, Decimal]"
        );
        assert_eq!(
            format!("{:?}", aggregation.result_types()),
            "[Int64, Int64, Int32, Int32, Int32, Decimal]"
        );
    }

    #[test]
    fn advance_and_finalize() {
        let aggregation = new_aggregation(all_aggregates());
        let mut acc = aggregation.initial_values().unwrap();
        for a in [Some(4), None, Some(1), Some(7)].iter() {
            aggregation.advance_values(&mut acc, &row(*a)).unwrap();
        }
        let result = aggregation.finalize_values(&mut acc).unwrap();
        assert_eq!(result.iter().join(", "), "4, 3, 12, 1, 7, 4");
    }

    #[test]
    fn empty_input() {
        let aggregation = new_aggregation(all_aggregates());
        let result = aggregation.empty_input_values().unwrap();
        assert_eq!(result.iter().join(", "), "0, 0, NULL, NULL, NULL, NULL");
    }

    #[test]
    fn merge_partial_values() {
        let aggregation = new_aggregation(all_aggregates());
        let mut left = aggregation.initial_values().unwrap();
        let mut right = aggregation.initial_values().unwrap();
        let empty = aggregation.initial_values().unwrap();

        aggregation.advance_values(&mut left, &row(Some(2))).unwrap();
        aggregation.advance_values(&mut right, &row(Some(5))).unwrap();
        aggregation.advance_values(&mut right, &row(None)).unwrap();

        aggregation.merge_values(&mut left, &right).unwrap();
        aggregation.merge_values(&mut left, &empty).unwrap();

        let result = aggregation.finalize_values(&mut left).unwrap();
        assert_eq!(result.iter().join(", "), "3, 2, 7, 2, 5, 3.5");
    }

    #[test]
    fn not_an_aggregate() {
        let metadata = Metadata::new();
        let err = Aggregation::setup(&[ScalarExpr::Column(1)], &[1], &metadata).expect_err("not an aggregate");
        assert_eq!(format!("{}", err), "Argument error: Not an aggregate function: col:1");
    }
}
