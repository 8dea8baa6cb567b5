use std::sync::Arc;

use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::bloom_filter::BloomFilter;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::expression::{compile_predicates, eval_predicates, CompiledExpr};
use crate::execution::hash_table::OaHashTable;
use crate::execution::pipeline::{LocalStateId, Pipeline, PipelineId, PipelineLocalState, TranslatorId};
use crate::execution::row_batch::{Row, RowBatch};
use crate::execution::runtime_state::StateId;
use crate::execution::translators::{column_positions, unexpected_row, OperatorTranslator};
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::value::ScalarValue;
use crate::plan::PhysicalPlan;

/// The number of rows of the build side used to size bloom filters when the optimizer
/// has no estimate.
const DEFAULT_BUILD_SIDE_ROWS: usize = 1024;

/// An inner hash join. The left input is the build side and the right input is the probe side.
///
/// Rows of the build side are inserted lazily into thread-local hash tables. When the build pipeline completes
/// thread-local tables are merged into a single table that is then probed by rows of the right input.
/// Join keys are compared after both sides have been cast to their common type. NULL keys never match.
#[derive(Debug)]
pub struct HashJoinTranslator {
    id: TranslatorId,
    left: TranslatorId,
    right: TranslatorId,
    build_pipeline: PipelineId,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    key_types: Vec<DataType>,
    value_types: Vec<DataType>,
    predicates: Vec<CompiledExpr>,
    build_side_rows: usize,
    local_table: LocalStateId,
    local_bloom: LocalStateId,
    probe_table: LocalStateId,
    join_table: StateId,
}

#[derive(Debug)]
struct JoinTable {
    table: OaHashTable,
    bloom: Option<BloomFilter>,
}

impl HashJoinTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let (left_keys, right_keys, predicates) = match &plan.op {
            PhysicalOperator::InnerHashJoin {
                left_keys,
                right_keys,
                predicates,
            } => (left_keys, right_keys, predicates),
            _ => return Err(ExecutionError::internal(format!("Not a hash join: {}", plan.op.name()))),
        };
        if left_keys.len() != right_keys.len() || left_keys.is_empty() {
            return Err(ExecutionError::argument(format!(
                "Invalid join keys. Left: {:?} right: {:?}",
                left_keys, right_keys
            )));
        }

        let left = plan.child(0);
        let right = plan.child(1);
        let left_layout = left.output_columns();
        let right_layout = right.output_columns();

        let key_types = left_keys
            .iter()
            .zip(right_keys.iter())
            .map(|(l, r)| {
                let left_type = ctx.column_type(l)?;
                let right_type = ctx.column_type(r)?;
                left_type.common_type(&right_type).ok_or_else(|| {
                    ExecutionError::argument(format!(
                        "Join keys col:{} and col:{} have incompatible types: {} and {}",
                        l, r, left_type, right_type
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let value_types = ctx.column_types(&left_layout)?;

        let mut joined_layout = left_layout.clone();
        joined_layout.extend_from_slice(&right_layout);
        let predicates = compile_predicates(predicates, &joined_layout)?;

        let left_keys = column_positions(&left_layout, left_keys)?;
        let right_keys = column_positions(&right_layout, right_keys)?;

        if ctx.config().enable_prefetch {
            // Rows of the probe side are passed in batches so buckets can be prefetched.
            ctx.pipeline_mut(pipeline)?.install_boundary_at_input(id);
        }
        let probe_table = ctx.register_local(pipeline, "hash_join_probe_table")?;

        let build_pipeline = ctx.new_pipeline();
        let build = ctx.pipeline_mut(build_pipeline)?;
        build.add_step(id);
        build.install_boundary_at_input(id);

        let local_table = ctx.register_local(build_pipeline, "hash_join_table")?;
        let local_bloom = ctx.register_local(build_pipeline, "hash_join_bloom_filter")?;
        let join_table = ctx.register_state::<Arc<JoinTable>>("hash_join_table");

        let build_side_rows = left.num_rows.map(|n| n.max(1.0) as usize).unwrap_or(DEFAULT_BUILD_SIDE_ROWS);
        let left = ctx.prepare(left, build_pipeline)?;
        let right = ctx.prepare(right, pipeline)?;

        Ok(HashJoinTranslator {
            id,
            left,
            right,
            build_pipeline,
            left_keys,
            right_keys,
            key_types,
            value_types,
            predicates,
            build_side_rows,
            local_table,
            local_bloom,
            probe_table,
            join_table,
        })
    }

    /// Returns values of the given keys cast to the key types or `None` if one of the keys is NULL.
    fn join_keys(&self, row: &[ScalarValue], positions: &[usize]) -> Result<Option<Vec<ScalarValue>>, ExecutionError> {
        let mut keys = Vec::with_capacity(positions.len());
        for (position, data_type) in positions.iter().zip(self.key_types.iter()) {
            let value = &row[*position];
            if value.is_null() {
                return Ok(None);
            }
            let key = value
                .cast(*data_type)
                .ok_or_else(|| ExecutionError::type_mismatch(*data_type, value.data_type()))?;
            keys.push(key);
        }
        Ok(Some(keys))
    }

    fn new_table(&self, initial_size: usize) -> OaHashTable {
        OaHashTable::new(&self.key_types, &self.value_types, initial_size)
    }

    fn build_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let keys = match self.join_keys(row.values(), &self.left_keys)? {
            Some(keys) => keys,
            None => return Ok(()),
        };
        let config = ctx.exec().config();

        if config.enable_bloom_filter {
            let (expected, fp_rate) = (self.build_side_rows, config.bloom_filter_fp_rate);
            let bloom =
                ctx.local::<BloomFilter, _>(self.local_bloom, || Ok(BloomFilter::new(expected, fp_rate)))?;
            bloom.insert(&keys);
        }

        let initial_size = config.hash_table_initial_size;
        let table = ctx.local::<OaHashTable, _>(self.local_table, || Ok(self.new_table(initial_size)))?;
        table.insert_lazy(keys, row.values())
    }

    fn shared_table(&self, ctx: &mut ConsumerContext<'_, '_>) -> Result<Arc<JoinTable>, ExecutionError> {
        let exec = ctx.exec();
        let join_table = self.join_table;
        let table = ctx.local::<Arc<JoinTable>, _>(self.probe_table, || {
            exec.state().get_cloned::<Arc<JoinTable>>(join_table)
        })?;
        Ok(table.clone())
    }

    fn probe_row(
        &self,
        ctx: &mut ConsumerContext<'_, '_>,
        join_table: &JoinTable,
        row: Row,
        keys: Vec<ScalarValue>,
        hash: u64,
    ) -> Result<(), ExecutionError> {
        if let Some(bloom) = &join_table.bloom {
            if !bloom.contains_hash(hash) {
                return Ok(());
            }
        }
        for value in join_table.table.find_all_with_hash(hash, &keys)? {
            let mut values = join_table.table.load_value(value)?;
            values.extend_from_slice(row.values());
            if eval_predicates(&self.predicates, &values)? {
                ctx.consume_row(Row::new(values))?;
            }
        }
        Ok(())
    }
}

impl OperatorTranslator for HashJoinTranslator {
    fn name(&self) -> &'static str {
        "InnerHashJoin"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.left)?;
        exec.produce(self.right)
    }

    fn consume_batch(&self, ctx: &mut ConsumerContext<'_, '_>, batch: &mut RowBatch) -> Result<(), ExecutionError> {
        let rows = batch.take_valid_rows();
        if ctx.pipeline().id() == self.build_pipeline {
            for row in rows {
                self.build_row(ctx, row)?;
            }
            return Ok(());
        }

        let config = ctx.exec().config();
        let join_table = self.shared_table(ctx)?;
        if !config.enable_prefetch {
            for row in rows {
                if let Some(keys) = self.join_keys(row.values(), &self.right_keys)? {
                    let hash = join_table.table.hash_keys(&keys);
                    self.probe_row(ctx, &join_table, row, keys, hash)?;
                }
            }
            return Ok(());
        }

        let mut vector = Vec::with_capacity(config.prefetch_vector_size);
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            vector.clear();
            for row in rows.by_ref().take(config.prefetch_vector_size.max(1)) {
                if let Some(keys) = self.join_keys(row.values(), &self.right_keys)? {
                    let hash = join_table.table.hash_keys(&keys);
                    join_table.table.prefetch_bucket(hash);
                    vector.push((row, keys, hash));
                }
            }
            for (row, keys, hash) in vector.drain(..) {
                self.probe_row(ctx, &join_table, row, keys, hash)?;
            }
        }
        Ok(())
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        if ctx.pipeline().id() == self.build_pipeline {
            // There is a stage boundary at the input of the build side.
            return Err(unexpected_row(self, ctx));
        }
        let join_table = self.shared_table(ctx)?;
        match self.join_keys(row.values(), &self.right_keys)? {
            Some(keys) => {
                let hash = join_table.table.hash_keys(&keys);
                self.probe_row(ctx, &join_table, row, keys, hash)
            }
            None => Ok(()),
        }
    }

    fn finish_pipeline(
        &self,
        exec: &ExecutionContext<'_>,
        pipeline: &Pipeline,
        locals: &mut [PipelineLocalState],
    ) -> Result<(), ExecutionError> {
        if pipeline.id() != self.build_pipeline {
            return Ok(());
        }

        let mut tables = Vec::with_capacity(locals.len());
        let mut bloom: Option<BloomFilter> = None;
        for local in locals.iter_mut() {
            if let Some(table) = local.take::<OaHashTable>(self.local_table)? {
                tables.push(table);
            }
            if let Some(local_bloom) = local.take::<BloomFilter>(self.local_bloom)? {
                match bloom.as_mut() {
                    Some(bloom) => bloom.union(&local_bloom)?,
                    None => bloom = Some(local_bloom),
                }
            }
        }

        let initial_size = exec.config().hash_table_initial_size;
        let table = if tables.len() == 1 {
            let mut table = tables.pop().unwrap_or_else(|| self.new_table(initial_size));
            table.build_lazy()?;
            table
        } else {
            let mut table = self.new_table(initial_size);
            table.reserve_lazy(&tables);
            for local in tables {
                table.merge_lazy_unfinished(local)?;
            }
            table
        };
        log::debug!(
            "InnerHashJoin#{}: built a hash table with {} entries ({} keys) from {} thread-local tables",
            self.id,
            table.num_entries(),
            table.num_keys(),
            locals.len()
        );

        exec.state().set(self.join_table, Arc::new(JoinTable { table, bloom }))
    }

    fn tear_down_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().clear(self.join_table)
    }
}
