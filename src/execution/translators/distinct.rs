use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::hash_table::OaHashTable;
use crate::execution::pipeline::{PipelineId, TranslatorId};
use crate::execution::row_batch::Row;
use crate::execution::runtime_state::StateId;
use crate::execution::translators::{column_positions, project, OperatorTranslator};
use crate::operators::physical::PhysicalOperator;
use crate::plan::PhysicalPlan;

/// Removes rows with duplicate values of the given columns.
/// The first row with the given values is passed unchanged, all other such rows are dropped.
#[derive(Debug)]
pub struct HashDistinctTranslator {
    child: TranslatorId,
    key_positions: Vec<usize>,
    key_types: Vec<DataType>,
    seen: StateId,
}

impl HashDistinctTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        _id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let columns = match &plan.op {
            PhysicalOperator::HashDistinct { columns } => columns,
            _ => return Err(ExecutionError::internal(format!("Not a distinct: {}", plan.op.name()))),
        };
        let input = plan.child(0);
        let key_positions = column_positions(&input.output_columns(), columns)?;
        let key_types = ctx.column_types(columns)?;

        ctx.pipeline_mut(pipeline)?.mark_serial();
        let seen = ctx.register_state::<OaHashTable>("distinct_keys");
        let child = ctx.prepare(input, pipeline)?;

        Ok(HashDistinctTranslator {
            child,
            key_positions,
            key_types,
            seen,
        })
    }
}

impl OperatorTranslator for HashDistinctTranslator {
    fn name(&self) -> &'static str {
        "HashDistinct"
    }

    fn initialize_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let table = OaHashTable::new(&self.key_types, &[], exec.config().hash_table_initial_size);
        exec.state().set(self.seen, table)
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let keys = project(row.values(), &self.key_positions);
        let found = ctx.exec().state().with(self.seen, |table: &mut OaHashTable| {
            table.probe_or_insert(&keys).map(|(found, _)| found)
        })??;
        if found {
            Ok(())
        } else {
            ctx.consume_row(row)
        }
    }

    fn tear_down_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().clear(self.seen)
    }
}
