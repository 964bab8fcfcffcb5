//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod job;
mod message;
mod partition;
mod row;
mod run_result;

pub use job::{JobDefinition, JobRunStatus, JobRunnerState};
pub use message::{AffectedRow, BatchStage, MessageSeverity, ResultMessage};
pub use partition::{
    BatchRange, FetchWindow, PartitionConfig, PartitionPlanner, PartitionWindow, StoreScope,
    WindowCursor, batch_ranges,
};
pub use row::{RowError, RowFailure, RowOutcome, RowRecord};
pub use run_result::RunResult;
