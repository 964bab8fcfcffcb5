use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use batchward_core::JobId;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ProgressSink;

/// Per-run state shared between the runner, transforms and event receivers.
///
/// Clones share the same cancellation token and progress sink.
#[derive(Clone)]
pub struct ExecutionContext {
    job_id: JobId,
    run_id: Uuid,
    cancellation: CancellationToken,
    progress_sink: Arc<dyn ProgressSink>,
}

impl ExecutionContext {
    /// Creates a context for one run.
    #[must_use]
    pub fn new(
        job_id: JobId,
        cancellation: CancellationToken,
        progress_sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            job_id,
            run_id: Uuid::new_v4(),
            cancellation,
            progress_sink,
        }
    }

    /// Returns the job being executed.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Returns the identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancellation_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Forwards progress to the sink.
    pub fn report_progress(&self, processed: u64, total: u64) {
        self.progress_sink.report(processed, total);
    }
}

impl Debug for ExecutionContext {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ExecutionContext")
            .field("job_id", &self.job_id)
            .field("run_id", &self.run_id)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}
