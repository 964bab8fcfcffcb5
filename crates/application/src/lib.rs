//! Application services and ports.

#![forbid(unsafe_code)]

mod execution_context;
mod job_ports;
mod job_runner_service;
mod lease_lock_manager;
mod row_pipeline;

pub use execution_context::ExecutionContext;
pub use job_ports::{
    BatchEventPublisher, BatchExecutedEvent, ContentStore, DataSource, MessageSink, ProgressSink,
    RowTransform,
};
pub use job_runner_service::{JobRun, JobRunnerService};
pub use lease_lock_manager::{LeaseFingerprint, LeaseLockManager, LeaseToken};
pub use row_pipeline::{BatchInput, BatchReport, RowPipeline};
