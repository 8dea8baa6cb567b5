use std::sync::Arc;

use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::expression::{compile_predicates, eval_predicates, CompiledExpr};
use crate::execution::pipeline::{LocalStateId, Pipeline, PipelineId, PipelineLocalState, TranslatorId};
use crate::execution::row_batch::Row;
use crate::execution::runtime_state::StateId;
use crate::execution::translators::OperatorTranslator;
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::value::ScalarValue;
use crate::operators::JoinType;
use crate::plan::PhysicalPlan;

/// A nested loop join. Rows of the right input are materialized first, then every row of the left input
/// is joined with every materialized row. Output rows consist of columns of the left row followed by
/// columns of the right row.
///
/// Outer joins pad a missing side with NULLs. Rows of the right input that matched no left row
/// are emitted when the left pipeline finishes.
#[derive(Debug)]
pub struct NestedLoopJoinTranslator {
    id: TranslatorId,
    name: &'static str,
    join_type: Option<JoinType>,
    left: TranslatorId,
    right: TranslatorId,
    outer_pipeline: PipelineId,
    inner_pipeline: PipelineId,
    predicates: Vec<CompiledExpr>,
    left_width: usize,
    right_width: usize,
    buffer: LocalStateId,
    probe_state: LocalStateId,
    inner_rows: StateId,
}

/// Per-thread state of the left pipeline.
#[derive(Debug)]
struct ProbeState {
    right_rows: Arc<Vec<Row>>,
    // Empty unless the join preserves rows of the right input.
    matched: Vec<bool>,
}

impl NestedLoopJoinTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let (join_type, predicates) = match &plan.op {
            PhysicalOperator::InnerNLJoin { predicates } => (None, predicates),
            PhysicalOperator::OuterNLJoin { join_type, predicates } => (Some(*join_type), predicates),
            _ => return Err(ExecutionError::internal(format!("Not a nested loop join: {}", plan.op.name()))),
        };
        let left = plan.child(0);
        let right = plan.child(1);
        let mut layout = left.output_columns();
        let left_width = layout.len();
        let right_columns = right.output_columns();
        let right_width = right_columns.len();
        layout.extend(right_columns);
        let predicates = compile_predicates(predicates, &layout)?;

        let probe_state = ctx.register_local(pipeline, "nl_join_rows")?;

        let inner_pipeline = ctx.new_pipeline();
        ctx.pipeline_mut(inner_pipeline)?.add_step(id);
        let buffer = ctx.register_local(inner_pipeline, "nl_join_buffer")?;
        let inner_rows = ctx.register_state::<Arc<Vec<Row>>>("nl_join_rows");

        let right = ctx.prepare(right, inner_pipeline)?;
        let left = ctx.prepare(left, pipeline)?;

        Ok(NestedLoopJoinTranslator {
            id,
            name: plan.op.name(),
            join_type,
            left,
            right,
            outer_pipeline: pipeline,
            inner_pipeline,
            predicates,
            left_width,
            right_width,
            buffer,
            probe_state,
            inner_rows,
        })
    }

    fn preserves_left(&self) -> bool {
        self.join_type.map(|t| t.preserves_left()).unwrap_or(false)
    }

    fn preserves_right(&self) -> bool {
        self.join_type.map(|t| t.preserves_right()).unwrap_or(false)
    }

    fn emit_unmatched_right_rows(
        &self,
        exec: &ExecutionContext<'_>,
        pipeline: &Pipeline,
        locals: &mut [PipelineLocalState],
    ) -> Result<(), ExecutionError> {
        let right_rows = exec.state().get_cloned::<Arc<Vec<Row>>>(self.inner_rows)?;
        let mut matched = vec![false; right_rows.len()];
        // A thread that saw no left rows has no state: none of the right rows matched there.
        for local in locals.iter_mut() {
            if let Some(state) = local.take::<ProbeState>(self.probe_state)? {
                for (m, local_m) in matched.iter_mut().zip(state.matched.iter()) {
                    *m |= *local_m;
                }
            }
        }

        let rows: Vec<Row> = right_rows
            .iter()
            .zip(matched)
            .filter(|(_, matched)| !matched)
            .map(|(row, _)| {
                let mut values = vec![ScalarValue::Null; self.left_width];
                values.extend_from_slice(row.values());
                Row::new(values)
            })
            .collect();

        log::debug!("{}#{}: {} unmatched rows of the right input", self.name, self.id, rows.len());

        if rows.is_empty() {
            return Ok(());
        }
        let locals = locals
            .first_mut()
            .ok_or_else(|| ExecutionError::internal(format!("{}: no thread-local state", self.name)))?;
        exec.push_rows_from(pipeline, self.id, rows, locals)
    }
}

impl OperatorTranslator for NestedLoopJoinTranslator {
    fn name(&self) -> &'static str {
        self.name
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.right)?;
        exec.produce(self.left)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        if ctx.pipeline().id() == self.inner_pipeline {
            let buffer = ctx.local::<Vec<Row>, _>(self.buffer, || Ok(Vec::new()))?;
            buffer.push(row);
            return Ok(());
        }

        let exec = ctx.exec();
        let inner_rows = self.inner_rows;
        let track_right = self.preserves_right();
        let right_rows = ctx
            .local::<ProbeState, _>(self.probe_state, || {
                let right_rows = exec.state().get_cloned::<Arc<Vec<Row>>>(inner_rows)?;
                let matched = if track_right { vec![false; right_rows.len()] } else { Vec::new() };
                Ok(ProbeState { right_rows, matched })
            })?
            .right_rows
            .clone();

        let mut matched_any = false;
        let mut matched_right = Vec::new();
        for (i, right) in right_rows.iter().enumerate() {
            let joined = row.concat(right.values());
            if eval_predicates(&self.predicates, joined.values())? {
                matched_any = true;
                if track_right {
                    matched_right.push(i);
                }
                ctx.consume_row(joined)?;
            }
        }

        if !matched_right.is_empty() {
            let state = ctx.local::<ProbeState, _>(self.probe_state, || {
                Err(ExecutionError::internal("Nested loop join state is missing"))
            })?;
            for i in matched_right {
                state.matched[i] = true;
            }
        }
        if !matched_any && self.preserves_left() {
            ctx.consume_row(row.concat(&vec![ScalarValue::Null; self.right_width]))?;
        }
        Ok(())
    }

    fn finish_pipeline(
        &self,
        exec: &ExecutionContext<'_>,
        pipeline: &Pipeline,
        locals: &mut [PipelineLocalState],
    ) -> Result<(), ExecutionError> {
        if pipeline.id() == self.outer_pipeline {
            return if self.preserves_right() {
                self.emit_unmatched_right_rows(exec, pipeline, locals)
            } else {
                Ok(())
            };
        }
        if pipeline.id() != self.inner_pipeline {
            return Ok(());
        }
        let mut rows = Vec::new();
        for local in locals.iter_mut() {
            if let Some(buffer) = local.take::<Vec<Row>>(self.buffer)? {
                rows.extend(buffer);
            }
        }
        log::debug!("{}#{}: materialized {} rows", self.name, self.id, rows.len());

        exec.state().set(self.inner_rows, Arc::new(rows))
    }

    fn tear_down_state(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.state().clear(self.inner_rows)
    }
}
