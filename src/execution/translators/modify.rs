//! Data modification operators. Modification operators produce no rows: the number of modified rows
//! is reported by [ExecutionStats](crate::execution::compilation::ExecutionStats).
//! Pipelines of modification operators are always serial.

use crate::catalog::TableInfo;
use crate::datatypes::DataType;
use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::expression::CompiledExpr;
use crate::execution::pipeline::{PipelineId, TranslatorId};
use crate::execution::row_batch::{Row, RowBatch, RowId};
use crate::execution::translators::{table_column, OperatorTranslator};
use crate::operators::physical::PhysicalOperator;
use crate::operators::scalar::value::ScalarValue;
use crate::plan::PhysicalPlan;

fn cast_value(value: ScalarValue, data_type: DataType) -> Result<ScalarValue, ExecutionError> {
    value
        .cast(data_type)
        .ok_or_else(|| ExecutionError::type_mismatch(data_type, value.data_type()))
}

fn row_id_of(row: &Row, op: &str, table: &TableInfo) -> Result<RowId, ExecutionError> {
    row.row_id().ok_or_else(|| {
        ExecutionError::internal(format!("{}: input row of table {} has no row id: {}", op, table.name, row))
    })
}

/// Inserts rows into a table. Rows are either a list of expressions or rows of the input operator.
#[derive(Debug)]
pub struct InsertTranslator {
    id: TranslatorId,
    child: Option<TranslatorId>,
    table: TableInfo,
    table_columns: Vec<usize>,
    column_types: Vec<DataType>,
    values: Vec<Vec<CompiledExpr>>,
}

impl InsertTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let (table, columns, values) = match &plan.op {
            PhysicalOperator::Insert { table, columns, values } => (table, columns, values),
            _ => return Err(ExecutionError::internal(format!("Not an insert: {}", plan.op.name()))),
        };
        let table_columns = columns
            .iter()
            .map(|c| table_column(ctx.metadata(), table, c))
            .collect::<Result<Vec<_>, _>>()?;
        let column_types = ctx.column_types(columns)?;

        let values = values
            .iter()
            .map(|row| {
                if row.len() != columns.len() {
                    return Err(ExecutionError::argument(format!(
                        "Insert into {}: expected {} values but got {}",
                        table.name,
                        columns.len(),
                        row.len()
                    )));
                }
                row.iter().map(|e| CompiledExpr::compile(e, &[])).collect()
            })
            .collect::<Result<Vec<_>, _>>()?;

        ctx.pipeline_mut(pipeline)?.mark_serial();
        let child = if values.is_empty() {
            Some(ctx.prepare(plan.child(0), pipeline)?)
        } else {
            None
        };

        Ok(InsertTranslator {
            id,
            child,
            table: table.clone(),
            table_columns,
            column_types,
            values,
        })
    }

    fn insert_rows(&self, exec: &ExecutionContext<'_>, rows: Vec<Vec<ScalarValue>>) -> Result<(), ExecutionError> {
        let rows = rows
            .into_iter()
            .map(|row| {
                if row.len() != self.column_types.len() {
                    return Err(ExecutionError::internal(format!(
                        "Insert into {}: expected {} values but got {}",
                        self.table.name,
                        self.column_types.len(),
                        row.len()
                    )));
                }
                row.into_iter().zip(self.column_types.iter()).map(|(v, t)| cast_value(v, *t)).collect()
            })
            .collect::<Result<Vec<Vec<_>>, _>>()?;

        let inserted = exec.storage().insert(exec.txn(), &self.table, &self.table_columns, rows)?;
        log::debug!("Insert#{}: inserted {} rows into {}", self.id, inserted, self.table.name);
        exec.add_rows_affected(inserted);
        Ok(())
    }
}

impl OperatorTranslator for InsertTranslator {
    fn name(&self) -> &'static str {
        "Insert"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        match self.child {
            Some(child) => exec.produce(child),
            None => {
                let rows = self
                    .values
                    .iter()
                    .map(|row| row.iter().map(|e| e.eval(&[])).collect())
                    .collect::<Result<Vec<Vec<_>>, _>>()?;
                self.insert_rows(exec, rows)
            }
        }
    }

    fn consume_batch(&self, ctx: &mut ConsumerContext<'_, '_>, batch: &mut RowBatch) -> Result<(), ExecutionError> {
        let rows = batch.take_valid_rows().into_iter().map(|r| r.into_values()).collect();
        self.insert_rows(ctx.exec(), rows)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        self.insert_rows(ctx.exec(), vec![row.into_values()])
    }
}

/// Sets new values of columns of rows produced by the input operator.
/// Input rows must be rows of the updated table.
#[derive(Debug)]
pub struct UpdateTranslator {
    child: TranslatorId,
    table: TableInfo,
    updates: Vec<(usize, DataType, CompiledExpr)>,
}

impl UpdateTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        _id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let (table, updates) = match &plan.op {
            PhysicalOperator::Update { table, updates } => (table, updates),
            _ => return Err(ExecutionError::internal(format!("Not an update: {}", plan.op.name()))),
        };
        let input = plan.child(0);
        let layout = input.output_columns();
        let updates = updates
            .iter()
            .map(|(column, expr)| {
                let position = table_column(ctx.metadata(), table, column)?;
                let data_type = ctx.column_type(column)?;
                let expr = CompiledExpr::compile(expr, &layout)?;
                Ok((position, data_type, expr))
            })
            .collect::<Result<Vec<_>, ExecutionError>>()?;

        ctx.pipeline_mut(pipeline)?.mark_serial();
        let child = ctx.prepare(input, pipeline)?;

        Ok(UpdateTranslator {
            child,
            table: table.clone(),
            updates,
        })
    }
}

impl OperatorTranslator for UpdateTranslator {
    fn name(&self) -> &'static str {
        "Update"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let row_id = row_id_of(&row, "Update", &self.table)?;
        let values = self
            .updates
            .iter()
            .map(|(position, data_type, expr)| {
                let value = cast_value(expr.eval(row.values())?, *data_type)?;
                Ok((*position, value))
            })
            .collect::<Result<Vec<_>, ExecutionError>>()?;

        let exec = ctx.exec();
        if exec.storage().update(exec.txn(), &self.table, row_id, &values)? {
            exec.add_rows_affected(1);
        }
        Ok(())
    }
}

/// Deletes rows produced by the input operator. Input rows must be rows of the given table.
#[derive(Debug)]
pub struct DeleteTranslator {
    child: TranslatorId,
    table: TableInfo,
}

impl DeleteTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        _id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let table = match &plan.op {
            PhysicalOperator::Delete { table } => table,
            _ => return Err(ExecutionError::internal(format!("Not a delete: {}", plan.op.name()))),
        };
        ctx.pipeline_mut(pipeline)?.mark_serial();
        let child = ctx.prepare(plan.child(0), pipeline)?;

        Ok(DeleteTranslator {
            child,
            table: table.clone(),
        })
    }
}

impl OperatorTranslator for DeleteTranslator {
    fn name(&self) -> &'static str {
        "Delete"
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        exec.produce(self.child)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, row: Row) -> Result<(), ExecutionError> {
        let row_id = row_id_of(&row, "Delete", &self.table)?;
        let exec = ctx.exec();
        if exec.storage().delete(exec.txn(), &self.table, row_id)? {
            exec.add_rows_affected(1);
        }
        Ok(())
    }
}
