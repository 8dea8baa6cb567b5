use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::expression::{compile_predicates, eval_predicates, CompiledExpr};
use crate::execution::pipeline::{PipelineId, TranslatorId};
use crate::execution::row_batch::{Row, RowBatch};
use crate::execution::translators::OperatorTranslator;
use crate::operators::physical::PhysicalOperator;
use crate::plan::PhysicalPlan;

/// Passes rows that satisfy all predicates.
#[derive(Debug)]
pub struct FilterTranslator {
    child: TranslatorId,
    predicates: Vec<CompiledExpr>,
}

impl FilterTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        _id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let predicates = match &plan.op {
            PhysicalOperator::Filter { predicates } => predicates,
            _ => return Err(ExecutionError::internal(format!("Not a filter: {}", plan.op.name()))),
        };
        let input = plan.child(0);
        let predicates = compile_predicates(predicates, &input.output_columns())?;
        let child = ctx.prepare(input, pipeline)?;

        Ok(FilterTranslator { child, predicates })
    }
}

impl OperatorTranslator for FilterTranslator {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)
    }

    fn consume_batch(&self, ctx: &mut ConsumerContext<'_, '_>, batch: &mut RowBatch) -> Result<(), ExecutionError> {
        for i in 0..batch.num_rows() {
            if batch.is_valid(i) && !eval_predicates(&self.predicates, batch.row(i).values())? {
                batch.mark_invalid(i);
            }
        }
        for row in batch.take_valid_rows() {
            ctx.consume_row(row)?;
        }
        Ok(())
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        if eval_predicates(&self.predicates, row.values())? {
            ctx.consume_row(row)
        } else {
            Ok(())
        }
    }
}
