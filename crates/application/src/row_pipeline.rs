use std::sync::Arc;

use batchward_core::{AppError, root_cause};
use batchward_domain::{
    AffectedRow, ResultMessage, RowError, RowFailure, RowOutcome, RowRecord, StoreScope,
};
use serde_json::Value;
use tracing::debug;

use crate::{BatchEventPublisher, BatchExecutedEvent, ExecutionContext, RowTransform};

/// Records of one batch handed to the pipeline.
#[derive(Debug, Clone)]
pub struct BatchInput {
    /// Store scope the records were fetched from.
    pub store_scope: StoreScope,
    /// One-based batch number within the run.
    pub batch_index: u64,
    /// Absolute position of the first record within its store scope.
    pub first_position: u64,
    /// Records in source order.
    pub values: Vec<Value>,
}

/// Counts and messages produced by one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Outcomes of records that passed, in order.
    pub outcomes: Vec<RowOutcome>,
    /// One error message per failed record.
    pub messages: Vec<ResultMessage>,
    /// Number of records handed to the transform.
    pub processed: usize,
}

impl BatchReport {
    /// Returns how many records failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.processed - self.outcomes.len()
    }
}

/// Applies a row transform to each record of a batch, isolating row failures.
pub struct RowPipeline {
    entity_name: String,
    event_publisher: Option<Arc<dyn BatchEventPublisher>>,
}

impl RowPipeline {
    /// Creates a pipeline that tags row errors with `entity_name`.
    #[must_use]
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            event_publisher: None,
        }
    }

    /// Publishes a [`BatchExecutedEvent`] after every finished batch.
    #[must_use]
    pub fn with_event_publisher(mut self, event_publisher: Arc<dyn BatchEventPublisher>) -> Self {
        self.event_publisher = Some(event_publisher);
        self
    }

    /// Runs every record of the batch through `transform`.
    ///
    /// Invalid records become error messages and the batch goes on. A fatal
    /// failure stops the batch immediately and no event is published for it.
    pub async fn process_batch(
        &self,
        context: &ExecutionContext,
        transform: &dyn RowTransform,
        input: BatchInput,
    ) -> Result<BatchReport, AppError> {
        let BatchInput {
            store_scope,
            batch_index,
            first_position,
            values,
        } = input;
        let mut report = BatchReport::default();
        let mut records = Vec::with_capacity(values.len());

        for (position, value) in values.into_iter().enumerate() {
            report.processed += 1;

            match transform.apply(context, &value).await {
                Ok(outcome) => {
                    report.outcomes.push(outcome);
                    records.push(RowRecord::succeeded(position, value));
                }
                Err(RowFailure::Invalid(row_error)) => {
                    let absolute_position = first_position + position as u64;
                    debug!(
                        job_id = %context.job_id(),
                        batch_index,
                        position = absolute_position,
                        error = %row_error,
                        "row failed"
                    );
                    report
                        .messages
                        .push(self.row_error_message(&row_error, absolute_position));
                    records.push(RowRecord::failed(position, value, row_error.to_string()));
                }
                Err(RowFailure::Fatal(error)) => return Err(error),
            }
        }

        if let Some(event_publisher) = &self.event_publisher {
            event_publisher.publish(BatchExecutedEvent {
                context: context.clone(),
                store_scope,
                batch_index,
                records,
            });
        }

        Ok(report)
    }

    fn row_error_message(&self, row_error: &RowError, position: u64) -> ResultMessage {
        let message = ResultMessage::error(root_cause(row_error).to_string())
            .with_affected_row(AffectedRow::new(position, self.entity_name.as_str()));

        match row_error.field_name() {
            Some(field_name) => message.with_affected_field(field_name),
            None => message,
        }
    }
}
