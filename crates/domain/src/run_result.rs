use std::error::Error as StdError;

use batchward_core::{AppError, AppResult, root_cause};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::{BatchStage, MessageSeverity, ResultMessage, RowOutcome};

/// Aggregated outcome of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    total_records: u64,
    new_records: u64,
    modified_records: u64,
    cancelled: bool,
    messages: Vec<ResultMessage>,
}

impl RunResult {
    /// Starts an empty result at the given instant.
    #[must_use]
    pub fn start(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            ended_at: None,
            total_records: 0,
            new_records: 0,
            modified_records: 0,
            cancelled: false,
            messages: Vec::new(),
        }
    }

    /// Returns the run start.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Returns the run end once finished.
    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Returns the elapsed run time once finished.
    #[must_use]
    pub fn elapsed(&self) -> Option<TimeDelta> {
        self.ended_at.map(|ended_at| ended_at - self.started_at)
    }

    /// Returns the number of records known to the run.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    /// Returns the number of created records.
    #[must_use]
    pub fn new_records(&self) -> u64 {
        self.new_records
    }

    /// Returns the number of modified records.
    #[must_use]
    pub fn modified_records(&self) -> u64 {
        self.modified_records
    }

    /// Returns created plus modified records.
    #[must_use]
    pub fn affected_records(&self) -> u64 {
        self.new_records + self.modified_records
    }

    /// Returns whether the run was cancelled.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancelled
    }

    /// Returns the messages in the order they were added.
    #[must_use]
    pub fn messages(&self) -> &[ResultMessage] {
        self.messages.as_slice()
    }

    /// Returns whether any warning was recorded.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        self.has_severity(MessageSeverity::Warning)
    }

    /// Returns whether any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.has_severity(MessageSeverity::Error)
    }

    /// Returns whether [`Self::finish`] already ran.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Adds records discovered for one store scope.
    pub fn add_total_records(&mut self, count: u64) {
        self.total_records = self.total_records.saturating_add(count);
    }

    /// Counts one record outcome.
    pub fn record_outcome(&mut self, outcome: RowOutcome) {
        match outcome {
            RowOutcome::Created => self.new_records += 1,
            RowOutcome::Updated => self.modified_records += 1,
            RowOutcome::Skipped => {}
        }
    }

    /// Marks the run as cancelled.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Appends one message.
    pub fn add_message(&mut self, message: ResultMessage) {
        self.messages.push(message);
    }

    /// Appends an informational message.
    pub fn add_info(&mut self, text: impl Into<String>) {
        self.add_message(ResultMessage::info(text));
    }

    /// Appends a warning message.
    pub fn add_warning(&mut self, text: impl Into<String>) {
        self.add_message(ResultMessage::warning(text));
    }

    /// Appends an error message built from the innermost cause of `error`.
    pub fn add_error(&mut self, error: &(dyn StdError + 'static), stage: Option<&BatchStage>) {
        let cause = root_cause(error);
        let text = match stage {
            Some(stage) => format!("{stage} {cause}"),
            None => cause.to_string(),
        };

        self.add_message(ResultMessage::error(text));
    }

    /// Sets the end timestamp; a run finishes exactly once.
    pub fn finish(&mut self, ended_at: DateTime<Utc>) -> AppResult<()> {
        if self.ended_at.is_some() {
            return Err(AppError::Conflict("run result is already finished".to_owned()));
        }

        self.ended_at = Some(ended_at);
        Ok(())
    }

    fn has_severity(&self, severity: MessageSeverity) -> bool {
        self.messages
            .iter()
            .any(|message| message.severity() == severity)
    }
}
