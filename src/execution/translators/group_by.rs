use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::aggregation::Aggregation;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::expression::{compile_predicates, eval_predicates, CompiledExpr};
use crate::execution::hash_table::OaHashTable;
use crate::execution::pipeline::{LocalStateId, Pipeline, PipelineId, PipelineLocalState, TranslatorId};
use crate::execution::row_batch::Row;
use crate::execution::runtime_state::StateId;
use crate::execution::translators::{column_positions, project, OperatorTranslator};
use crate::meta::ColumnId;
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::expr::{AnnotatedExpr, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;
use crate::plan::PhysicalPlan;

struct GroupBySetup<'a> {
    group_by: &'a [ColumnId],
    aggregation: Aggregation,
    having: Vec<CompiledExpr>,
}

fn setup<'a>(
    ctx: &CompilationContext<'_>,
    input: &PhysicalPlan,
    group_by: &'a [ColumnId],
    aggregates: &[ScalarExpr],
    columns: &[ColumnId],
    having: &[AnnotatedExpr],
) -> Result<GroupBySetup<'a>, ExecutionError> {
    if aggregates.len() != columns.len() {
        return Err(ExecutionError::argument(format!(
            "Number of aggregates does not match the number of output columns: {} != {}",
            aggregates.len(),
            columns.len()
        )));
    }
    let aggregation = Aggregation::setup(aggregates, &input.output_columns(), ctx.metadata())?;
    let output_layout: Vec<_> = group_by.iter().chain(columns.iter()).copied().collect();
    let having = compile_predicates(having, &output_layout)?;

    Ok(GroupBySetup {
        group_by,
        aggregation,
        having,
    })
}

/// Finalizes values of the given group. Returns `None` if the group does not satisfy HAVING predicates.
fn finalize_group(
    aggregation: &Aggregation,
    having: &[CompiledExpr],
    keys: &[ScalarValue],
    mut acc: Vec<ScalarValue>,
) -> Result<Option<Row>, ExecutionError> {
    let mut values = Vec::with_capacity(keys.len() + aggregation.num_aggregates());
    values.extend_from_slice(keys);
    values.extend(aggregation.finalize_values(&mut acc)?);
    if eval_predicates(having, &values)? {
        Ok(Some(Row::new(values)))
    } else {
        Ok(None)
    }
}

/// Groups rows using a hash table. A pipeline breaker: every worker thread aggregates its rows
/// in a thread-local table, partial aggregates are merged when the input pipeline completes.
#[derive(Debug)]
pub struct HashGroupByTranslator {
    id: TranslatorId,
    child: TranslatorId,
    input_pipeline: PipelineId,
    output_pipeline: PipelineId,
    key_positions: Vec<usize>,
    key_types: Vec<DataType>,
    aggregation: Aggregation,
    having: Vec<CompiledExpr>,
    local_table: LocalStateId,
    table: StateId,
}

impl HashGroupByTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let input = plan.child(0);
        let setup = match &plan.op {
            PhysicalOperator::HashGroupBy {
                group_by,
                aggregates,
                columns,
                having,
            } => setup(ctx, input, group_by, aggregates, columns, having)?,
            _ => return Err(ExecutionError::internal(format!("Not a hash group by: {}", plan.op.name()))),
        };
        let key_positions = column_positions(&input.output_columns(), setup.group_by)?;
        let key_types = ctx.column_types(setup.group_by)?;

        let input_pipeline = ctx.new_pipeline();
        ctx.pipeline_mut(input_pipeline)?.add_step(id);
        let local_table = ctx.register_local(input_pipeline, "group_by_table")?;
        let table = ctx.register_state::<OaHashTable>("group_by_table");
        let child = ctx.prepare(input, input_pipeline)?;

        Ok(HashGroupByTranslator {
            id,
            child,
            input_pipeline,
            output_pipeline: pipeline,
            key_positions,
            key_types,
            aggregation: setup.aggregation,
            having: setup.having,
            local_table,
            table,
        })
    }

    fn new_table(&self, initial_size: usize) -> OaHashTable {
        OaHashTable::new(&self.key_types, self.aggregation.slot_types(), initial_size)
    }
}

impl OperatorTranslator for HashGroupByTranslator {
    fn name(&self) -> &'static str {
        "HashGroupBy"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)?;

        let table = exec.state().take::<OaHashTable>(self.table)?;
        let mut rows = Vec::with_capacity(table.num_keys());
        for vector in table.vector_iter(exec.config().vector_size) {
            for (keys, value) in vector {
                let keys = table.load_keys(keys)?;
                let acc = table.load_value(value)?;
                if let Some(row) = finalize_group(&self.aggregation, &self.having, &keys, acc)? {
                    rows.push(row);
                }
            }
        }
        log::debug!("HashGroupBy#{}: {} groups, {} rows", self.id, table.num_keys(), rows.len());

        exec.run_source(self.output_pipeline, rows)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let keys = project(row.values(), &self.key_positions);
        let initial_size = ctx.exec().config().hash_table_initial_size;
        let table = ctx.local::<OaHashTable, _>(self.local_table, || Ok(self.new_table(initial_size)))?;

        let (found, mut entry) = table.probe_or_insert(&keys)?;
        if !found {
            self.aggregation.create_initial_values(&mut entry)?;
        }
        self.aggregation.advance_values(&mut entry, row.values())
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
        let mut tables = Vec::with_capacity(locals.len());
        for local in locals.iter_mut() {
            if let Some(table) = local.take::<OaHashTable>(self.local_table)? {
                tables.push(table);
            }
        }

        let initial_size = exec.config().hash_table_initial_size;
        let table = if tables.len() == 1 {
            match tables.pop() {
                Some(table) => table,
                None => self.new_table(initial_size),
            }
        } else {
            let mut global = self.new_table(initial_size);
            for local in tables.iter() {
                for (keys, value) in local.iter() {
                    let keys = local.load_keys(keys)?;
                    let partial = local.load_value(value)?;
                    let (found, mut entry) = global.probe_or_insert(&keys)?;
                    if !found {
                        self.aggregation.create_initial_values(&mut entry)?;
                    }
                    self.aggregation.merge_values(&mut entry, &partial)?;
                }
            }
            log::debug!(
                "HashGroupBy#{}: merged {} thread-local tables. Groups: {}",
                self.id,
                tables.len(),
                global.num_keys()
            );
            global
        };

        exec.state().set(self.table, table)
    }

    fn tear_down_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().clear(self.table)
    }
}

/// Groups rows ordered by the grouping columns. A group is complete when a row with different
/// values of the grouping columns arrives, so groups are passed to the next operator while the input
/// is being consumed. The pipeline of a sort group by is always serial.
#[derive(Debug)]
pub struct SortGroupByTranslator {
    id: TranslatorId,
    child: TranslatorId,
    pipeline: PipelineId,
    key_positions: Vec<usize>,
    aggregation: Aggregation,
    having: Vec<CompiledExpr>,
    current_group: StateId,
}

/// Grouping values and accumulators of the group that is being aggregated.
type CurrentGroup = Option<(Vec<ScalarValue>, Vec<ScalarValue>)>;

impl SortGroupByTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let input = plan.child(0);
        let setup = match &plan.op {
            PhysicalOperator::SortGroupBy {
                group_by,
                aggregates,
                columns,
                having,
            } => setup(ctx, input, group_by, aggregates, columns, having)?,
            _ => return Err(ExecutionError::internal(format!("Not a sort group by: {}", plan.op.name()))),
        };
        let key_positions = column_positions(&input.output_columns(), setup.group_by)?;

        ctx.pipeline_mut(pipeline)?.mark_serial();
        let current_group = ctx.register_state::<CurrentGroup>("sort_group_by_current_group");
        let child = ctx.prepare(input, pipeline)?;

        Ok(SortGroupByTranslator {
            id,
            child,
            pipeline,
            key_positions,
            aggregation: setup.aggregation,
            having: setup.having,
            current_group,
        })
    }
}

impl OperatorTranslator for SortGroupByTranslator {
    fn name(&self) -> &'static str {
        "SortGroupBy"
    }

    fn initialize_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().set::<CurrentGroup>(self.current_group, None)
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let keys = project(row.values(), &self.key_positions);
        let aggregation = &self.aggregation;

        let completed = ctx.exec().state().with(self.current_group, |group: &mut CurrentGroup| {
            let same_group = matches!(group, Some((current, _)) if *current == keys);
            let completed = if same_group {
                None
            } else {
                let acc = aggregation.initial_values()?;
                group.replace((keys, acc))
            };
            if let Some((_, acc)) = group.as_mut() {
                aggregation.advance_values(acc, row.values())?;
            }
            Ok::<_, ExecutionError>(completed)
        })??;

        match completed {
            Some((keys, acc)) => match finalize_group(aggregation, &self.having, &keys, acc)? {
                Some(row) => ctx.consume_row(row),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn finish_pipeline(
        &self,
        exec: &ExecutionContext<'_>,
        pipeline: &Pipeline,
        locals: &mut [PipelineLocalState],
    ) -> Result<(), ExecutionError> {
        if pipeline.id() != self.pipeline {
            return Ok(());
        }
        let last = exec.state().with(self.current_group, |group: &mut CurrentGroup| group.take())?;
        let row = match last {
            Some((keys, acc)) => finalize_group(&self.aggregation, &self.having, &keys, acc)?,
            None => None,
        };
        if let Some(row) = row {
            let locals = locals
                .first_mut()
                .ok_or_else(|| ExecutionError::internal("SortGroupBy: no thread-local state"))?;
            exec.push_rows_from(pipeline, self.id, vec![row], locals)?;
        }
        Ok(())
    }

    fn tear_down_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().clear(self.current_group)
    }
}

/// Computes aggregate functions over all input rows. Always produces exactly one row
/// unless the row is rejected by HAVING predicates.
#[derive(Debug)]
pub struct AggregateTranslator {
    child: TranslatorId,
    input_pipeline: PipelineId,
    output_pipeline: PipelineId,
    aggregation: Aggregation,
    having: Vec<CompiledExpr>,
    local_values: LocalStateId,
    values: StateId,
}

impl AggregateTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let input = plan.child(0);
        let setup = match &plan.op {
            PhysicalOperator::Aggregate {
                aggregates,
                columns,
                having,
            } => setup(ctx, input, &[], aggregates, columns, having)?,
            _ => return Err(ExecutionError::internal(format!("Not an aggregate: {}", plan.op.name()))),
        };

        let input_pipeline = ctx.new_pipeline();
        ctx.pipeline_mut(input_pipeline)?.add_step(id);
        let local_values = ctx.register_local(input_pipeline, "aggregate_values")?;
        let values = ctx.register_state::<Vec<ScalarValue>>("aggregate_values");
        let child = ctx.prepare(input, input_pipeline)?;

        Ok(AggregateTranslator {
            child,
            input_pipeline,
            output_pipeline: pipeline,
            aggregation: setup.aggregation,
            having: setup.having,
            local_values,
            values,
        })
    }
}

impl OperatorTranslator for AggregateTranslator {
    fn name(&self) -> &'static str {
        "Aggregate"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)?;

        let acc = exec.state().take::<Vec<ScalarValue>>(self.values)?;
        let rows = finalize_group(&self.aggregation, &self.having, &[], acc)?.into_iter().collect();
        exec.run_source(self.output_pipeline, rows)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let aggregation = &self.aggregation;
        let acc = ctx.local::<Vec<ScalarValue>, _>(self.local_values, || aggregation.initial_values())?;
        aggregation.advance_values(acc, row.values())
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
        let mut acc = self.aggregation.initial_values()?;
        for local in locals.iter_mut() {
            if let Some(partial) = local.take::<Vec<ScalarValue>>(self.local_values)? {
                self.aggregation.merge_values(&mut acc, &partial)?;
            }
        }
        exec.state().set(self.values, acc)
    }

    fn tear_down_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().clear(self.values)
    }
}
