use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use batchward_core::{AppError, AppResult, JobId};
use batchward_domain::{JobDefinition, JobRunStatus, JobRunnerState, ResultMessage, RunResult};
use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    BatchEventPublisher, DataSource, ExecutionContext, LeaseLockManager, MessageSink,
    ProgressSink, RowPipeline, RowTransform,
};

mod execution;
mod registry;

use registry::{ActiveRun, ActiveRuns, RunGuard, lock};

/// Finished run returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct JobRun {
    /// Executed job.
    pub job_id: JobId,
    /// Identifier of this run.
    pub run_id: Uuid,
    /// Terminal status.
    pub status: JobRunStatus,
    /// Aggregated counts and messages.
    pub result: RunResult,
}

/// Orchestrates lease, partitioning, row pipeline and result aggregation.
#[derive(Clone)]
pub struct JobRunnerService {
    lease_manager: Arc<LeaseLockManager>,
    data_source: Arc<dyn DataSource>,
    progress_sink: Arc<dyn ProgressSink>,
    message_sink: Option<Arc<dyn MessageSink>>,
    event_publisher: Option<Arc<dyn BatchEventPublisher>>,
    active_runs: ActiveRuns,
}

impl JobRunnerService {
    /// Creates a job runner.
    #[must_use]
    pub fn new(
        lease_manager: Arc<LeaseLockManager>,
        data_source: Arc<dyn DataSource>,
        progress_sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            lease_manager,
            data_source,
            progress_sink,
            message_sink: None,
            event_publisher: None,
            active_runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Adds an operator-facing message stream.
    #[must_use]
    pub fn with_message_sink(mut self, message_sink: Arc<dyn MessageSink>) -> Self {
        self.message_sink = Some(message_sink);
        self
    }

    /// Adds a batch event publisher.
    #[must_use]
    pub fn with_event_publisher(mut self, event_publisher: Arc<dyn BatchEventPublisher>) -> Self {
        self.event_publisher = Some(event_publisher);
        self
    }

    /// Runs one job to completion, cancellation or fault.
    ///
    /// Returns [`AppError::LeaseContention`] without creating any run state
    /// when another execution holds the job's lease.
    ///
    /// Dropping the returned future, or a panicking transform, still clears
    /// the run's registry entry and releases its lease in the background.
    pub async fn run(
        &self,
        job: &JobDefinition,
        transform: Arc<dyn RowTransform>,
    ) -> AppResult<JobRun> {
        let job_id = job.job_id().clone();
        let (cancellation, mut guard) = self.register(&job_id)?;

        let Some(lease) = self.lease_manager.try_acquire(&job_id).await else {
            self.transition(&job_id, JobRunnerState::Faulted);
            warn!(job_id = %job_id, "job skipped, lease is held elsewhere");
            return Err(AppError::LeaseContention(job_id));
        };
        guard.hold(lease);

        self.transition(&job_id, JobRunnerState::Running);
        let context = ExecutionContext::new(job_id.clone(), cancellation, self.progress_sink.clone());
        let mut pipeline = RowPipeline::new(job.entity_name());
        if let Some(event_publisher) = &self.event_publisher {
            pipeline = pipeline.with_event_publisher(event_publisher.clone());
        }

        let mut result = RunResult::start(Utc::now());
        let span = info_span!("job_run", job_id = %job_id, run_id = %context.run_id());
        let status = self
            .execute(job, &pipeline, transform.as_ref(), &context, &mut result)
            .instrument(span)
            .await;

        match guard.release_lease().await {
            Ok(true) => {}
            Ok(false) => self.record(
                &mut result,
                ResultMessage::warning(
                    "lease was no longer held at release; it may have expired during the run",
                ),
            ),
            Err(error) => {
                warn!(job_id = %job_id, error = %error, "failed to release lease");
                self.record(
                    &mut result,
                    ResultMessage::warning(format!("failed to release lease: {error}")),
                );
            }
        }

        result.finish(Utc::now())?;
        self.transition(&job_id, status.into());
        drop(guard);

        info!(
            job_id = %job_id,
            run_id = %context.run_id(),
            status = status.as_str(),
            total_records = result.total_records(),
            new_records = result.new_records(),
            modified_records = result.modified_records(),
            has_errors = result.has_errors(),
            "job run finished"
        );

        Ok(JobRun {
            job_id,
            run_id: context.run_id(),
            status,
            result,
        })
    }

    /// Requests cancellation of the job's current run; returns whether one exists.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match lock(&self.active_runs).get(job_id) {
            Some(active_run) => {
                info!(job_id = %job_id, "cancellation requested");
                active_run.cancellation.cancel();
                true
            }
            None => false,
        }
    }

    /// Returns whether any process currently holds the job's lease.
    pub async fn is_running(&self, job_id: &JobId) -> bool {
        self.lease_manager.is_leased(job_id).await
    }

    /// Returns the job's lifecycle state inside this runner.
    pub fn state(&self, job_id: &JobId) -> JobRunnerState {
        lock(&self.active_runs)
            .get(job_id)
            .map_or(JobRunnerState::Idle, |active_run| active_run.state)
    }

    fn register(&self, job_id: &JobId) -> AppResult<(CancellationToken, RunGuard)> {
        let mut active_runs = lock(&self.active_runs);
        if active_runs.contains_key(job_id) {
            warn!(job_id = %job_id, "job is already running in this process");
            return Err(AppError::LeaseContention(job_id.clone()));
        }

        let cancellation = CancellationToken::new();
        active_runs.insert(
            job_id.clone(),
            ActiveRun {
                state: JobRunnerState::Acquiring,
                cancellation: cancellation.clone(),
            },
        );

        let guard = RunGuard::new(
            job_id.clone(),
            self.active_runs.clone(),
            self.lease_manager.clone(),
        );

        Ok((cancellation, guard))
    }

    fn transition(&self, job_id: &JobId, next: JobRunnerState) {
        if let Some(active_run) = lock(&self.active_runs).get_mut(job_id) {
            if !active_run.state.can_transition_to(next) {
                warn!(
                    job_id = %job_id,
                    from = active_run.state.as_str(),
                    to = next.as_str(),
                    "unexpected job state transition"
                );
            }

            active_run.state = next;
        }
    }

    fn record(&self, result: &mut RunResult, message: ResultMessage) {
        if let Some(message_sink) = &self.message_sink {
            message_sink.publish(&message);
        }

        result.add_message(message);
    }
}

#[cfg(test)]
mod tests;
