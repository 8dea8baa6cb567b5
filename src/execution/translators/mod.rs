//! Operator translators.
//!
//! An operator translator implements a physical operator. The root translator of a query starts execution
//! by calling [produce](OperatorTranslator::produce) of its child which calls produce of its own children
//! and so on until a source (a table scan) is reached. A source pushes its rows through its pipeline by
//! calling `consume` methods of the translators that follow it.
//!
//! Translators do not store execution state in their fields: query-wide state is stored in
//! the [QueryState](crate::execution::runtime_state::QueryState) and thread-local state is stored
//! in the [PipelineLocalState] of the thread that runs a pipeline.

use std::fmt::Debug;

use crate::catalog::TableInfo;
use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::pipeline::{Pipeline, PipelineId, PipelineLocalState, TranslatorId};
use crate::execution::row_batch::{Row, RowBatch};
use crate::meta::{ColumnId, Metadata};
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::value::ScalarValue;
use crate::plan::PhysicalPlan;

pub mod distinct;
pub mod filter;
pub mod group_by;
pub mod hash_join;
pub mod limit;
pub mod modify;
pub mod nested_loop_join;
pub mod order_by;
pub mod projection;
pub mod scan;

/// Implements a physical operator. See [module docs](self).
pub trait OperatorTranslator: Debug + Send + Sync {
    /// The name of this translator.
    fn name(&self) -> &'static str;

    /// Called before a query is executed.
    fn initialize_state(&self, _exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Ok(())
    }

    /// Produces rows of this operator.
    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError>;

    /// Consumes a batch of rows. By default calls [consume_row](Self::consume_row) for every valid row.
    fn consume_batch(&self, ctx: &mut ConsumerContext<'_, '_>, batch: &mut RowBatch) -> Result<(), ExecutionError> {
        for row in batch.take_valid_rows() {
            self.consume_row(ctx, row)?;
        }
        Ok(())
    }

    /// Consumes a row produced by the previous translator of the current pipeline.
    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError>;

    /// Called when all rows of the given pipeline have been processed.
    /// `locals` contains the thread-local states of all threads that executed the pipeline.
    fn finish_pipeline(
        &self,
        _exec: &ExecutionContext<'_>,
        _pipeline: &Pipeline,
        _locals: &mut [PipelineLocalState],
    ) -> Result<(), ExecutionError> {
        Ok(())
    }

    /// Called after a query has been executed, successfully or not.
    fn tear_down_state(&self, _exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// Creates a translator of the root operator of the given plan.
/// `pipeline` is the pipeline the translator has been added to.
pub fn create_translator(
    ctx: &mut CompilationContext<'_>,
    plan: &PhysicalPlan,
    id: TranslatorId,
    pipeline: PipelineId,
) -> Result<Box<dyn OperatorTranslator>, ExecutionError> {
    let translator: Box<dyn OperatorTranslator> = match &plan.op {
        PhysicalOperator::DummyScan
        | PhysicalOperator::SeqScan { .. }
        | PhysicalOperator::IndexScan { .. } => Box::new(scan::ScanTranslator::prepare(ctx, plan, id, pipeline)?),
        PhysicalOperator::Filter { .. } => Box::new(filter::FilterTranslator::prepare(ctx, plan, id, pipeline)?),
        PhysicalOperator::Projection { .. } => {
            Box::new(projection::ProjectionTranslator::prepare(ctx, plan, id, pipeline)?)
        }
        PhysicalOperator::OrderBy { .. } => Box::new(order_by::OrderByTranslator::prepare(ctx, plan, id, pipeline)?),
        PhysicalOperator::Limit { .. } => Box::new(limit::LimitTranslator::prepare(ctx, plan, id, pipeline)?),
        PhysicalOperator::InnerNLJoin { .. } | PhysicalOperator::OuterNLJoin { .. } => {
            Box::new(nested_loop_join::NestedLoopJoinTranslator::prepare(ctx, plan, id, pipeline)?)
        }
        PhysicalOperator::InnerHashJoin { .. } => {
            Box::new(hash_join::HashJoinTranslator::prepare(ctx, plan, id, pipeline)?)
        }
        PhysicalOperator::HashGroupBy { .. } => {
            Box::new(group_by::HashGroupByTranslator::prepare(ctx, plan, id, pipeline)?)
        }
        PhysicalOperator::SortGroupBy { .. } => {
            Box::new(group_by::SortGroupByTranslator::prepare(ctx, plan, id, pipeline)?)
        }
        PhysicalOperator::Aggregate { .. } => {
            Box::new(group_by::AggregateTranslator::prepare(ctx, plan, id, pipeline)?)
        }
        PhysicalOperator::HashDistinct { .. } => {
            Box::new(distinct::HashDistinctTranslator::prepare(ctx, plan, id, pipeline)?)
        }
        PhysicalOperator::Insert { .. } => Box::new(modify::InsertTranslator::prepare(ctx, plan, id, pipeline)?),
        PhysicalOperator::Update { .. } => Box::new(modify::UpdateTranslator::prepare(ctx, plan, id, pipeline)?),
        PhysicalOperator::Delete { .. } => Box::new(modify::DeleteTranslator::prepare(ctx, plan, id, pipeline)?),
    };
    Ok(translator)
}

/// Returns positions of the given columns in the given layout.
pub(crate) fn column_positions(layout: &[ColumnId], columns: &[ColumnId]) -> Result<Vec<usize>, ExecutionError> {
    columns
        .iter()
        .map(|c| {
            layout.iter().position(|l| l == c).ok_or_else(|| {
                ExecutionError::argument(format!("Unknown column: col:{}. Input columns: {:?}", c, layout))
            })
        })
        .collect()
}

/// Returns the position of the given column in rows of the given table.
pub(crate) fn table_column(metadata: &Metadata, table: &TableInfo, column: &ColumnId) -> Result<usize, ExecutionError> {
    let column_meta = metadata
        .find_column(column)
        .ok_or_else(|| ExecutionError::argument(format!("Unknown column: col:{}", column)))?;
    match column_meta.table() {
        Some(c) if c.table.oid == table.oid => Ok(c.column_index),
        _ => Err(ExecutionError::argument(format!(
            "Column col:{} does not belong to table {}",
            column, table.name
        ))),
    }
}

/// Returns values at the given positions.
pub(crate) fn project(row: &[ScalarValue], positions: &[usize]) -> Vec<ScalarValue> {
    positions.iter().map(|p| row[*p].clone()).collect()
}

/// An error returned when a translator receives a row it does not expect.
pub(crate) fn unexpected_row(translator: &dyn OperatorTranslator, ctx: &ConsumerContext<'_, '_>) -> ExecutionError {
    ExecutionError::internal(format!(
        "{} does not consume rows of pipeline {}",
        translator.name(),
        ctx.pipeline().id()
    ))
}

#[cfg(test)]
mod tests;
