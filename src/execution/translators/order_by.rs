use std::cmp::Ordering;

use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::pipeline::{LocalStateId, Pipeline, PipelineId, PipelineLocalState, TranslatorId};
use crate::execution::row_batch::Row;
use crate::execution::runtime_state::StateId;
use crate::execution::translators::{column_positions, OperatorTranslator};
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::value::ScalarValue;
use crate::plan::PhysicalPlan;

/// Sorts its input. A pipeline breaker: rows of the input pipeline are collected by every worker thread,
/// concatenated and sorted when the input pipeline completes and then pushed through the output pipeline
/// by a single thread.
#[derive(Debug)]
pub struct OrderByTranslator {
    id: TranslatorId,
    child: TranslatorId,
    input_pipeline: PipelineId,
    output_pipeline: PipelineId,
    keys: Vec<(usize, bool)>,
    buffer: LocalStateId,
    sorted: StateId,
}

impl OrderByTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let sort = match &plan.op {
            PhysicalOperator::OrderBy { sort } => sort,
            _ => return Err(ExecutionError::internal(format!("Not an order by: {}", plan.op.name()))),
        };
        let input = plan.child(0);
        let layout = input.output_columns();
        let columns: Vec<_> = sort.iter().map(|k| k.column).collect();
        let positions = column_positions(&layout, &columns)?;
        let keys = positions.into_iter().zip(sort.iter().map(|k| k.ascending)).collect();

        ctx.pipeline_mut(pipeline)?.mark_serial();

        let input_pipeline = ctx.new_pipeline();
        ctx.pipeline_mut(input_pipeline)?.add_step(id);
        let buffer = ctx.register_local(input_pipeline, "order_by_buffer")?;
        let sorted = ctx.register_state::<Vec<Row>>("order_by_sorted");
        let child = ctx.prepare(input, input_pipeline)?;

        Ok(OrderByTranslator {
            id,
            child,
            input_pipeline,
            output_pipeline: pipeline,
            keys,
            buffer,
            sorted,
        })
    }
}

impl OperatorTranslator for OrderByTranslator {
    fn name(&self) -> &'static str {
        "OrderBy"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)?;
        let rows = exec.state().take::<Vec<Row>>(self.sorted)?;
        exec.run_source(self.output_pipeline, rows)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let buffer = ctx.local::<Vec<Row>, _>(self.buffer, || Ok(Vec::new()))?;
        buffer.push(row);
        Ok(())
    }

    fn finish_pipeline(
        &self,
        exec: &ExecutionContext<'_>,
        pipeline: &Pipeline,
        locals: &mut [PipelineLocalState],
    ) -> Result<(), ExecutionError> {
        if pipeline.id() != self.input_pipeline {
            return Ok(());
        }
        let mut rows = Vec::new();
        for local in locals.iter_mut() {
            if let Some(buffer) = local.take::<Vec<Row>>(self.buffer)? {
                rows.extend(buffer);
            }
        }
        rows.sort_by(|a, b| compare_rows(a.values(), b.values(), &self.keys));
        log::debug!("OrderBy#{}: sorted {} rows from {} buffers", self.id, rows.len(), locals.len());

        exec.state().set(self.sorted, rows)
    }

    fn tear_down_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().clear(self.sorted)
    }
}

/// Compares rows by the values at the given positions. `true` means ascending order.
/// NULLs are greater than any other value so they come last in ascending order and first in descending order.
pub(crate) fn compare_rows(a: &[ScalarValue], b: &[ScalarValue], keys: &[(usize, bool)]) -> Ordering {
    for (position, ascending) in keys {
        let l = &a[*position];
        let r = &b[*position];
        let ord = match (l.is_null(), r.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => l.compare(r).unwrap_or(Ordering::Equal),
        };
        let ord = if *ascending { ord } else { ord.reverse() };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod test {
    use super::*;

    fn sort(mut rows: Vec<Vec<ScalarValue>>, keys: &[(usize, bool)]) -> String {
        rows.sort_by(|a, b| compare_rows(a, b, keys));
        rows.into_iter().map(|r| Row::new(r).to_string()).collect::<Vec<_>>().join("; ")
    }

    #[test]
    fn nulls_last_in_ascending_order() {
        let rows = vec![
            vec![ScalarValue::Int32(2)],
            vec![ScalarValue::Null],
            vec![ScalarValue::Int32(1)],
        ];
        assert_eq!(sort(rows.clone(), &[(0, true)]), "1; 2; NULL");
        assert_eq!(sort(rows, &[(0, false)]), "NULL; 2; 1");
    }

    #[test]
    fn multiple_keys() {
        let rows = vec![
            vec![ScalarValue::Int32(1), ScalarValue::String("b".into())],
            vec![ScalarValue::Int32(2), ScalarValue::String("a".into())],
            vec![ScalarValue::Int32(1), ScalarValue::String("c".into())],
        ];
        assert_eq!(sort(rows, &[(0, true), (1, false)]), "1, 'c'; 1, 'b'; 2, 'a'");
    }
}
