use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::expression::CompiledExpr;
use crate::execution::pipeline::{PipelineId, TranslatorId};
use crate::execution::row_batch::Row;
use crate::execution::translators::OperatorTranslator;
use crate::operators::physical::PhysicalOperator;
use crate::plan::PhysicalPlan;

/// Evaluates a list of expressions. The row id of an input row is passed to its output row.
#[derive(Debug)]
pub struct ProjectionTranslator {
    child: TranslatorId,
    exprs: Vec<CompiledExpr>,
}

impl ProjectionTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        _id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let exprs = match &plan.op {
            PhysicalOperator::Projection { exprs, .. } => exprs,
            _ => return Err(ExecutionError::internal(format!("Not a projection: {}", plan.op.name()))),
        };
        let input = plan.child(0);
        let layout = input.output_columns();
        let exprs = exprs
            .iter()
            .map(|e| CompiledExpr::compile(e, &layout))
            .collect::<Result<Vec<_>, _>>()?;
        let child = ctx.prepare(input, pipeline)?;

        Ok(ProjectionTranslator { child, exprs })
    }
}

impl OperatorTranslator for ProjectionTranslator {
    fn name(&self) -> &'static str {
        "Projection"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let values = self.exprs.iter().map(|e| e.eval(row.values())).collect::<Result<Vec<_>, _>>()?;
        let row = match row.row_id() {
            Some(row_id) => Row::with_row_id(values, row_id),
            None => Row::new(values),
        };
        ctx.consume_row(row)
    }
}
