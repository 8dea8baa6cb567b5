use crate::catalog::TableInfo;
use crate::error::ExecutionError;
use crate::execution::compilation::{CompilationContext, ExecutionContext};
use crate::execution::consumer::ConsumerContext;
use crate::execution::expression::{compile_predicates, eval_predicates, CompiledExpr};
use crate::execution::pipeline::{PipelineId, TranslatorId};
use crate::execution::row_batch::Row;
use crate::execution::translators::order_by::compare_rows;
use crate::execution::translators::{table_column, unexpected_row, OperatorTranslator};
use crate::operators::physical::PhysicalOperator;
use crate::plan::PhysicalPlan;

/// A source of rows: a sequential scan, an index scan or a dummy scan that produces a single empty row.
///
/// An index scan reads rows of a table in the order of the key columns of its index, so
/// its pipeline is always executed by a single thread.
#[derive(Debug)]
pub struct ScanTranslator {
    id: TranslatorId,
    pipeline: PipelineId,
    source: ScanSource,
}

#[derive(Debug)]
enum ScanSource {
    Dummy,
    Table {
        table: TableInfo,
        /// Positions of the columns of the scan layout in the rows of the table.
        table_columns: Vec<usize>,
        /// The number of columns of the scan layout the scan produces.
        num_output: usize,
        predicates: Vec<CompiledExpr>,
        /// Positions of key columns of the index in the scan layout.
        order: Vec<(usize, bool)>,
    },
}

impl ScanTranslator {
    pub fn prepare(
        ctx: &mut CompilationContext<'_>,
        plan: &PhysicalPlan,
        id: TranslatorId,
        pipeline: PipelineId,
    ) -> Result<Self, ExecutionError> {
        let (table, columns, predicates, key_columns) = match &plan.op {
            PhysicalOperator::DummyScan => {
                return Ok(ScanTranslator {
                    id,
                    pipeline,
                    source: ScanSource::Dummy,
                })
            }
            PhysicalOperator::SeqScan {
                table,
                columns,
                predicates,
                ..
            } => (table, columns, predicates, Vec::new()),
            PhysicalOperator::IndexScan {
                table,
                columns,
                predicates,
                index,
                ..
            } => {
                ctx.pipeline_mut(pipeline)?.mark_serial();
                (table, columns, predicates, index.key_columns.clone())
            }
            _ => return Err(ExecutionError::internal(format!("Not a scan operator: {}", plan.op.name()))),
        };

        // Predicates and index keys can refer to columns the scan does not produce.
        let mut layout = columns.clone();
        let referenced = predicates.iter().flat_map(|p| p.expr.columns()).chain(key_columns.iter().copied());
        for column in referenced {
            if !layout.contains(&column) {
                layout.push(column);
            }
        }

        let table_columns = layout
            .iter()
            .map(|c| table_column(ctx.metadata(), table, c))
            .collect::<Result<Vec<_>, _>>()?;
        let predicates = compile_predicates(predicates, &layout)?;
        let order = key_columns
            .iter()
            .map(|c| layout.iter().position(|l| l == c).map(|p| (p, true)))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ExecutionError::internal("Index key column is not in the scan layout"))?;

        Ok(ScanTranslator {
            id,
            pipeline,
            source: ScanSource::Table {
                table: table.clone(),
                table_columns,
                num_output: columns.len(),
                predicates,
                order,
            },
        })
    }
}

impl OperatorTranslator for ScanTranslator {
    fn name(&self) -> &'static str {
        match self.source {
            ScanSource::Dummy => "DummyScan",
            ScanSource::Table { ref order, .. } if !order.is_empty() => "IndexScan",
            ScanSource::Table { .. } => "SeqScan",
        }
    }

    fn produce(&self, exec: &ExecutionContext<'_>) -> Result<(), ExecutionError> {
        let rows = match &self.source {
            ScanSource::Dummy => vec![Row::new(Vec::new())],
            ScanSource::Table {
                table,
                table_columns,
                num_output,
                predicates,
                order,
            } => {
                let table_rows = exec.storage().scan(exec.txn(), table)?;
                let num_rows = table_rows.len();
                let mut rows = Vec::with_capacity(num_rows);

                for row in table_rows {
                    let mut values = Vec::with_capacity(table_columns.len());
                    for column in table_columns {
                        let value = row.values().get(*column).ok_or_else(|| {
                            ExecutionError::internal(format!("Table {} has no column #{}", table.name, column))
                        })?;
                        values.push(value.clone());
                    }
                    if eval_predicates(predicates, &values)? {
                        rows.push((values, row.row_id()));
                    }
                }
                if !order.is_empty() {
                    rows.sort_by(|(a, _), (b, _)| compare_rows(a, b, order));
                }
                log::debug!(
                    "Scan#{} {}: {} rows, {} rows after filter",
                    self.id,
                    table.name,
                    num_rows,
                    rows.len()
                );

                rows.into_iter()
                    .map(|(mut values, row_id)| {
                        values.truncate(*num_output);
                        match row_id {
                            Some(row_id) => Row::with_row_id(values, row_id),
                            None => Row::new(values),
                        }
                    })
                    .collect()
            }
        };
        exec.run_source(self.pipeline, rows)
    }

    fn consume_row(&self, ctx: &mut ConsumerContext<'_, '_>, _row: Row) -> Result<(), ExecutionError> {
        Err(unexpected_row(self, ctx))
    }
}
