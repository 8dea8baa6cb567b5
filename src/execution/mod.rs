//! Push-based execution of physical plans.
//!
//! A physical plan is compiled into a [CompiledQuery]: a set of operator translators arranged into pipelines.
//! A pipeline starts at a source (a table scan or a pipeline breaker such as a hash join build side or
//! an order by) and pushes batches of rows towards its root. The rows the root of the main pipeline
//! produces are passed to a [QueryResultConsumer].
//!
//! ```text
//!   HashJoin ─┬─ Scan a    pipeline 1: [HashJoin, Scan a]          (build side)
//!             └─ Scan b    pipeline 0: [Projection, HashJoin, Scan b]
//! ```
//!
//! Parallel pipelines are executed by `rayon` worker threads. Every worker owns its thread-local state until
//! the pipeline completes and operators merge thread-local states into the state of the query.

pub mod aggregation;
pub mod bloom_filter;
pub mod compilation;
pub mod config;
pub mod consumer;
pub mod expression;
pub mod hash_table;
pub mod pipeline;
pub mod row_batch;
pub mod runtime_state;
pub mod storage;
pub mod table_storage;
pub mod translators;

pub use compilation::{CompiledQuery, ExecutionStats};
pub use config::ExecutionConfig;
pub use consumer::{BufferingConsumer, QueryResultConsumer};
pub use row_batch::{Row, RowBatch};
pub use table_storage::{MemoryTableStorage, TableStorage};
