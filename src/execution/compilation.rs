//! Compilation of physical plans into pipelines of operator translators and their execution.

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};

use itertools::Itertools;
use rayon::prelude::*;

use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::config::ExecutionConfig;
use crate::execution::consumer::{ConsumerContext, QueryResultConsumer};
use crate::execution::pipeline::{LocalStateId, Pipeline, PipelineId, PipelineLocalState, TranslatorId};
use crate::execution::row_batch::{Row, RowBatch};
use crate::execution::runtime_state::{QueryState, RuntimeState, StateId};
use crate::execution::table_storage::TableStorage;
use crate::execution::translators::{create_translator, OperatorTranslator};
use crate::meta::{ColumnId, Metadata};
use crate::plan::PhysicalPlan;
use crate::txn::TransactionContext;

/// Builds a [CompiledQuery] from a physical plan.
///
/// Translators are created top-down. A translator is added to the pipeline of its parent
/// and registers the state it needs in the runtime state of the query or in the context of its pipeline.
pub struct CompilationContext<'a> {
    metadata: &'a Metadata,
    config: ExecutionConfig,
    runtime_state: RuntimeState,
    pipelines: Vec<Pipeline>,
    translators: Vec<Option<Box<dyn OperatorTranslator>>>,
}

impl<'a> CompilationContext<'a> {
    pub fn new(metadata: &'a Metadata, config: ExecutionConfig) -> Self {
        CompilationContext {
            metadata,
            config,
            runtime_state: RuntimeState::new(),
            pipelines: Vec::new(),
            translators: Vec::new(),
        }
    }

    /// Compiles the given plan.
    pub fn compile(mut self, plan: &PhysicalPlan) -> Result<CompiledQuery, ExecutionError> {
        let main_pipeline = self.new_pipeline();
        let root = self.prepare(plan, main_pipeline)?;
        self.runtime_state.finalize_type();

        let translators = self
            .translators
            .into_iter()
            .enumerate()
            .map(|(id, t)| {
                t.ok_or_else(|| ExecutionError::internal(format!("Translator {} has not been prepared", id)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let query = CompiledQuery {
            translators,
            pipelines: self.pipelines,
            runtime_state: self.runtime_state,
            root,
            config: self.config,
        };
        log::debug!("Compiled query:\n{}", query.explain());
        Ok(query)
    }

    /// Creates a translator for the given plan and adds it to the given pipeline.
    pub fn prepare(&mut self, plan: &PhysicalPlan, pipeline: PipelineId) -> Result<TranslatorId, ExecutionError> {
        let id = self.translators.len();
        self.translators.push(None);
        self.pipeline_mut(pipeline)?.add_step(id);

        let translator = create_translator(self, plan, id, pipeline)?;
        self.translators[id] = Some(translator);
        Ok(id)
    }

    /// Creates a new empty pipeline.
    pub fn new_pipeline(&mut self) -> PipelineId {
        let id = self.pipelines.len();
        self.pipelines.push(Pipeline::new(id));
        id
    }

    pub fn pipeline_mut(&mut self, id: PipelineId) -> Result<&mut Pipeline, ExecutionError> {
        self.pipelines
            .get_mut(id)
            .ok_or_else(|| ExecutionError::internal(format!("Unknown pipeline: {}", id)))
    }

    /// Registers a query-wide state slot.
    pub fn register_state<T>(&mut self, name: &str) -> StateId
    where
        T: Any + Send,
    {
        self.runtime_state.register_state::<T>(name)
    }

    /// Registers a thread-local state slot of the given pipeline.
    pub fn register_local(&mut self, pipeline: PipelineId, name: &str) -> Result<LocalStateId, ExecutionError> {
        Ok(self.pipeline_mut(pipeline)?.context_mut().register_local(name))
    }

    pub fn metadata(&self) -> &'a Metadata {
        self.metadata
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Returns the type of the given column.
    pub fn column_type(&self, column: &ColumnId) -> Result<DataType, ExecutionError> {
        self.metadata
            .find_column(column)
            .map(|c| c.data_type())
            .ok_or_else(|| ExecutionError::argument(format!("Unknown column: col:{}", column)))
    }

    /// Returns types of the given columns.
    pub fn column_types(&self, columns: &[ColumnId]) -> Result<Vec<DataType>, ExecutionError> {
        columns.iter().map(|c| self.column_type(c)).collect()
    }
}

/// Statistics of an execution of a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// The number of rows passed to the result consumer.
    pub rows_produced: usize,
    /// The number of rows inserted, updated or deleted.
    pub rows_affected: usize,
}

/// A query that is ready to be executed.
pub struct CompiledQuery {
    translators: Vec<Box<dyn OperatorTranslator>>,
    pipelines: Vec<Pipeline>,
    runtime_state: RuntimeState,
    root: TranslatorId,
    config: ExecutionConfig,
}

impl CompiledQuery {
    /// Compiles the given plan.
    pub fn compile(
        plan: &PhysicalPlan,
        metadata: &Metadata,
        config: ExecutionConfig,
    ) -> Result<CompiledQuery, ExecutionError> {
        CompilationContext::new(metadata, config).compile(plan)
    }

    /// Executes this query and passes the rows it produces to the given consumer.
    pub fn execute(
        &self,
        txn: &TransactionContext,
        storage: &dyn TableStorage,
        consumer: &dyn QueryResultConsumer,
    ) -> Result<ExecutionStats, ExecutionError> {
        if self.config.parallel_execution && self.config.num_threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.num_threads)
                .build()
                .map_err(|e| ExecutionError::internal(format!("Failed to create a thread pool: {}", e)))?;
            pool.install(|| self.run(txn, storage, consumer))
        } else {
            self.run(txn, storage, consumer)
        }
    }

    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    pub fn translators(&self) -> impl Iterator<Item = (TranslatorId, &dyn OperatorTranslator)> {
        self.translators.iter().enumerate().map(|(id, t)| (id, t.as_ref()))
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Returns a description of pipelines of this query. One pipeline per line.
    pub fn explain(&self) -> String {
        let mut buf = String::new();
        for pipeline in self.pipelines.iter() {
            let translators =
                pipeline.translators().iter().map(|t| format!("{}#{}", self.translators[*t].name(), t)).join(" -> ");
            let parallelism = if pipeline.is_parallel() { "parallel" } else { "serial" };
            buf.push_str(&format!("{}: {} {}", pipeline.id(), parallelism, translators));
            if !pipeline.stage_boundaries().is_empty() {
                buf.push_str(&format!(" boundaries={:?}", pipeline.stage_boundaries()));
            }
            buf.push('\n');
        }
        buf
    }

    fn run(
        &self,
        txn: &TransactionContext,
        storage: &dyn TableStorage,
        consumer: &dyn QueryResultConsumer,
    ) -> Result<ExecutionStats, ExecutionError> {
        let exec = ExecutionContext {
            query: self,
            state: QueryState::new(&self.runtime_state),
            txn,
            storage,
            consumer,
            rows_produced: AtomicUsize::new(0),
            rows_affected: AtomicUsize::new(0),
        };

        let result = self
            .translators
            .iter()
            .try_for_each(|t| t.initialize_state(&exec))
            .and_then(|_| exec.produce(self.root));

        let tear_down = self.translators.iter().try_for_each(|t| t.tear_down_state(&exec));
        result?;
        tear_down?;

        Ok(exec.stats())
    }
}

impl Debug for CompiledQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("translators", &self.translators)
            .field("pipelines", &self.pipelines)
            .field("root", &self.root)
            .finish()
    }
}

/// The context of an execution of a [CompiledQuery].
pub struct ExecutionContext<'q> {
    query: &'q CompiledQuery,
    state: QueryState,
    txn: &'q TransactionContext,
    storage: &'q dyn TableStorage,
    consumer: &'q dyn QueryResultConsumer,
    rows_produced: AtomicUsize,
    rows_affected: AtomicUsize,
}

impl<'q> ExecutionContext<'q> {
    pub fn config(&self) -> &'q ExecutionConfig {
        &self.query.config
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn txn(&self) -> &'q TransactionContext {
        self.txn
    }

    pub fn storage(&self) -> &'q dyn TableStorage {
        self.storage
    }

    pub fn translator(&self, id: TranslatorId) -> Result<&'q dyn OperatorTranslator, ExecutionError> {
        self.query
            .translators
            .get(id)
            .map(|t| t.as_ref())
            .ok_or_else(|| ExecutionError::internal(format!("Unknown translator: {}", id)))
    }

    pub fn pipeline(&self, id: PipelineId) -> Result<&'q Pipeline, ExecutionError> {
        self.query
            .pipelines
            .get(id)
            .ok_or_else(|| ExecutionError::internal(format!("Unknown pipeline: {}", id)))
    }

    /// Calls [produce](OperatorTranslator::produce) of the given translator.
    pub fn produce(&self, id: TranslatorId) -> Result<(), ExecutionError> {
        let translator = self.translator(id)?;
        log::debug!("Produce {}#{}", translator.name(), id);
        translator.produce(self)
    }

    /// Pushes the given rows through the given pipeline starting from its source and then
    /// completes the pipeline. Rows of a parallel pipeline are processed by multiple threads.
    pub fn run_source(&self, pipeline_id: PipelineId, rows: Vec<Row>) -> Result<(), ExecutionError> {
        let pipeline = self.pipeline(pipeline_id)?;
        let config = self.config();
        let vector_size = config.vector_size.max(1);
        let source = pipeline.source_position();

        let chunks = rows.into_iter().chunks(vector_size);
        let batches: Vec<Vec<Row>> = (&chunks).into_iter().map(|c| c.collect()).collect();

        let mut locals = if config.parallel_execution && pipeline.is_parallel() && batches.len() > 1 {
            log::debug!("Running {} in parallel. Batches: {}", pipeline, batches.len());
            batches
                .into_par_iter()
                .try_fold(
                    || pipeline.context().new_local_state(),
                    |mut locals, rows| {
                        self.push_rows(pipeline, source, rows, &mut locals)?;
                        Ok(locals)
                    },
                )
                .collect::<Result<Vec<_>, ExecutionError>>()?
        } else {
            log::debug!("Running {}. Batches: {}", pipeline, batches.len());
            let mut locals = pipeline.context().new_local_state();
            for rows in batches {
                self.push_rows(pipeline, source, rows, &mut locals)?;
            }
            vec![locals]
        };

        self.finish_pipeline(pipeline, &mut locals)
    }

    /// Pushes the given rows through the given pipeline as if they were produced by the given translator.
    pub fn push_rows_from(
        &self,
        pipeline: &Pipeline,
        translator: TranslatorId,
        rows: Vec<Row>,
        locals: &mut PipelineLocalState,
    ) -> Result<(), ExecutionError> {
        let position = pipeline.position_of(translator).ok_or_else(|| {
            ExecutionError::internal(format!("Translator {} does not belong to pipeline {}", translator, pipeline.id()))
        })?;
        self.push_rows(pipeline, position, rows, locals)
    }

    fn push_rows(
        &self,
        pipeline: &Pipeline,
        cursor: usize,
        rows: Vec<Row>,
        locals: &mut PipelineLocalState,
    ) -> Result<(), ExecutionError> {
        let mut ctx = ConsumerContext::new(self, pipeline, cursor, locals);
        ctx.consume_batch(RowBatch::new(rows))
    }

    fn finish_pipeline(&self, pipeline: &Pipeline, locals: &mut [PipelineLocalState]) -> Result<(), ExecutionError> {
        for id in pipeline.translators().iter().rev() {
            self.translator(*id)?.finish_pipeline(self, pipeline, locals)?;
        }
        Ok(())
    }

    pub(crate) fn deliver_row(&self, row: Row) -> Result<(), ExecutionError> {
        self.rows_produced.fetch_add(1, Ordering::Relaxed);
        self.consumer.consume_row(row)
    }

    pub(crate) fn deliver_batch(&self, rows: Vec<Row>) -> Result<(), ExecutionError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.rows_produced.fetch_add(rows.len(), Ordering::Relaxed);
        self.consumer.consume_batch(rows)
    }

    /// Records the number of rows modified by a data modification operator.
    pub fn add_rows_affected(&self, n: usize) {
        self.rows_affected.fetch_add(n, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ExecutionStats {
        ExecutionStats {
            rows_produced: self.rows_produced.load(Ordering::Relaxed),
            rows_affected: self.rows_affected.load(Ordering::Relaxed),
        }
    }
}

impl Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("state", &self.state)
            .field("txn", &self.txn)
            .field("stats", &self.stats())
            .finish()
    }
}
