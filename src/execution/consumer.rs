//! Consumers of rows: [ConsumerContext] moves rows through a pipeline and
//! a [QueryResultConsumer] receives the rows a query produces.

use parking_lot::Mutex;

use crate::error::ExecutionError;
use crate::execution::compilation::ExecutionContext;
use crate::execution::pipeline::{LocalStateId, Pipeline, PipelineLocalState};
use crate::execution::row_batch::{Row, RowBatch};

/// Receives the result of a query.
pub trait QueryResultConsumer: Send + Sync {
    fn consume_row(&self, row: Row) -> Result<(), ExecutionError>;

    fn consume_batch(&self, rows: Vec<Row>) -> Result<(), ExecutionError> {
        for row in rows {
            self.consume_row(row)?;
        }
        Ok(())
    }
}

/// A [QueryResultConsumer] that keeps all rows in memory.
#[derive(Debug, Default)]
pub struct BufferingConsumer {
    rows: Mutex<Vec<Row>>,
}

impl BufferingConsumer {
    pub fn new() -> Self {
        BufferingConsumer::default()
    }

    /// Returns a copy of the rows received so far.
    pub fn rows(&self) -> Vec<Row> {
        self.rows.lock().clone()
    }

    /// Removes all received rows.
    pub fn take_rows(&self) -> Vec<Row> {
        std::mem::take(&mut *self.rows.lock())
    }

    pub fn num_rows(&self) -> usize {
        self.rows.lock().len()
    }
}

impl QueryResultConsumer for BufferingConsumer {
    fn consume_row(&self, row: Row) -> Result<(), ExecutionError> {
        self.rows.lock().push(row);
        Ok(())
    }

    fn consume_batch(&self, rows: Vec<Row>) -> Result<(), ExecutionError> {
        self.rows.lock().extend(rows);
        Ok(())
    }
}

/// Pushes rows produced by a translator of a pipeline to the translators that follow it.
///
/// The cursor points to the translator that is currently producing rows.
/// A row that reaches a stage boundary is put into the batch of the next stage instead of being passed
/// to the next translator. That batch is processed after the current stage completes.
pub struct ConsumerContext<'e, 'q> {
    exec: &'e ExecutionContext<'q>,
    pipeline: &'e Pipeline,
    cursor: usize,
    locals: &'e mut PipelineLocalState,
    staged: RowBatch,
}

impl<'e, 'q> ConsumerContext<'e, 'q> {
    /// Creates a context in which rows are produced by the translator at the given position.
    pub fn new(
        exec: &'e ExecutionContext<'q>,
        pipeline: &'e Pipeline,
        cursor: usize,
        locals: &'e mut PipelineLocalState,
    ) -> Self {
        ConsumerContext {
            exec,
            pipeline,
            cursor,
            locals,
            staged: RowBatch::default(),
        }
    }

    pub fn exec(&self) -> &'e ExecutionContext<'q> {
        self.exec
    }

    pub fn pipeline(&self) -> &'e Pipeline {
        self.pipeline
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Returns the value of the given thread-local slot. An empty slot is initialized by `init`.
    pub fn local<T, F>(&mut self, id: LocalStateId, init: F) -> Result<&mut T, ExecutionError>
    where
        T: std::any::Any + Send,
        F: FnOnce() -> Result<T, ExecutionError>,
    {
        self.locals.get_or_init(id, init)
    }

    /// Passes the given row to the next translator.
    pub fn consume_row(&mut self, row: Row) -> Result<(), ExecutionError> {
        let cursor = self.cursor;
        let result = if self.pipeline.at_stage_boundary(cursor) {
            self.staged.add_row(row);
            Ok(())
        } else {
            match self.pipeline.next_step(&mut self.cursor) {
                None => self.exec.deliver_row(row),
                Some(translator) => self.exec.translator(translator).and_then(|t| t.consume_row(self, row)),
            }
        };
        self.cursor = cursor;
        result
    }

    /// Passes the given batch to the next translator. Rows of the batch are processed stage by stage.
    pub fn consume_batch(&mut self, batch: RowBatch) -> Result<(), ExecutionError> {
        let cursor = self.cursor;
        let result = self.run_stages(batch);
        self.cursor = cursor;
        result
    }

    fn run_stages(&mut self, mut batch: RowBatch) -> Result<(), ExecutionError> {
        loop {
            let stage_start = match self.pipeline.next_step(&mut self.cursor) {
                None => return self.exec.deliver_batch(batch.take_valid_rows()),
                Some(translator_id) => {
                    let translator = self.exec.translator(translator_id)?;
                    log::debug!(
                        "Pipeline {}: stage {} {}#{} rows={}",
                        self.pipeline.id(),
                        self.cursor,
                        translator.name(),
                        translator_id,
                        batch.num_valid()
                    );
                    let stage_start = self.cursor;
                    translator.consume_batch(self, &mut batch)?;
                    stage_start
                }
            };

            match self.pipeline.next_stage_boundary(stage_start) {
                Some(boundary) if !self.staged.is_empty() => {
                    batch = std::mem::take(&mut self.staged);
                    self.cursor = boundary;
                }
                _ => return Ok(()),
            }
        }
    }
}
