use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::pipeline::{PipelineId, TranslatorId};
use crate::execution::row_batch::Row;
use crate::execution::runtime_state::StateId;
use crate::execution::translators::OperatorTranslator;
use crate::operators::physical::PhysicalOperator;
use crate::plan::PhysicalPlan;

/// Skips the first `offset` rows and passes at most `limit` rows that follow them.
/// The order of rows is the order of the input so the pipeline of a limit is always serial.
#[derive(Debug)]
pub struct LimitTranslator {
    child: TranslatorId,
    offset: usize,
    limit: usize,
    counter: StateId,
}

impl LimitTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        _id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let (offset, limit) = match &plan.op {
            PhysicalOperator::Limit { offset, limit, .. } => (*offset, *limit),
            _ => return Err(ExecutionError::internal(format!("Not a limit: {}", plan.op.name()))),
        };
        ctx.pipeline_mut(pipeline)?.mark_serial();
        let counter = ctx.register_state::<usize>("limit_counter");
        let child = ctx.prepare(plan.child(0), pipeline)?;

        Ok(LimitTranslator {
            child,
            offset,
            limit,
            counter,
        })
    }
}

impl OperatorTranslator for LimitTranslator {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn initialize_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().set(self.counter, 0usize)
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let n = ctx.exec().state().with(self.counter, |counter: &mut usize| {
            let n = *counter;
            *counter += 1;
            n
        })?;
        if n >= self.offset && n - self.offset < self.limit {
            ctx.consume_row(row)
        } else {
            Ok(())
        }
    }
}
