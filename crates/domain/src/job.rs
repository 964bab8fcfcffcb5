use batchward_core::{AppResult, JobId, NonEmptyString};
use serde::{Deserialize, Serialize};

use crate::PartitionConfig;

/// Static description of a bulk job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDefinition {
    job_id: JobId,
    entity_name: NonEmptyString,
    partition: PartitionConfig,
}

impl JobDefinition {
    /// Creates a validated job definition.
    pub fn new(
        job_id: JobId,
        entity_name: impl Into<String>,
        partition: PartitionConfig,
    ) -> AppResult<Self> {
        Ok(Self {
            job_id,
            entity_name: NonEmptyString::new(entity_name)?,
            partition,
        })
    }

    /// Returns the job identifier.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Returns the entity name reported in row messages.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.entity_name.as_str()
    }

    /// Returns the partition configuration.
    #[must_use]
    pub fn partition(&self) -> PartitionConfig {
        self.partition
    }
}

/// Terminal status of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    /// Every window and batch ran.
    Completed,
    /// Cancellation was honored at a batch boundary.
    Cancelled,
    /// A non-record-scoped failure stopped the run.
    Faulted,
}

impl JobRunStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Faulted => "faulted",
        }
    }
}

impl From<JobRunStatus> for JobRunnerState {
    fn from(value: JobRunStatus) -> Self {
        match value {
            JobRunStatus::Completed => Self::Completed,
            JobRunStatus::Cancelled => Self::Cancelled,
            JobRunStatus::Faulted => Self::Faulted,
        }
    }
}

/// Lifecycle state of a job inside one runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunnerState {
    /// No execution in progress.
    #[default]
    Idle,
    /// Waiting for the lease.
    Acquiring,
    /// Iterating windows and batches.
    Running,
    /// Finished all work.
    Completed,
    /// Stopped on request.
    Cancelled,
    /// Stopped by a failure or lease contention.
    Faulted,
}

impl JobRunnerState {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Faulted => "faulted",
        }
    }

    /// Returns whether moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Acquiring)
                | (Self::Acquiring, Self::Running | Self::Faulted)
                | (
                    Self::Running,
                    Self::Completed | Self::Cancelled | Self::Faulted
                )
                | (Self::Completed | Self::Cancelled | Self::Faulted, Self::Idle)
        )
    }
}
