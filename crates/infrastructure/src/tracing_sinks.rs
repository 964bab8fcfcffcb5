use batchward_application::{MessageSink, ProgressSink};
use batchward_domain::{MessageSeverity, ResultMessage};
use tracing::{error, info, warn};

/// Progress sink writing one structured log line per batch.
#[derive(Debug, Clone, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report(&self, processed: u64, total: u64) {
        info!(processed, total, "job progress");
    }
}

/// Message sink forwarding run messages to the log at their severity.
#[derive(Debug, Clone, Default)]
pub struct TracingMessageSink;

impl MessageSink for TracingMessageSink {
    fn publish(&self, message: &ResultMessage) {
        let position = message.affected_row().map(|row| row.position());
        let entity_name = message.affected_row().map(|row| row.entity_name());
        let field_name = message.affected_field();

        match message.severity() {
            MessageSeverity::Info => info!(
                position,
                entity_name,
                field_name,
                text = message.text(),
                "job message"
            ),
            MessageSeverity::Warning => warn!(
                position,
                entity_name,
                field_name,
                text = message.text(),
                "job message"
            ),
            MessageSeverity::Error => error!(
                position,
                entity_name,
                field_name,
                text = message.text(),
                "job message"
            ),
        }
    }
}
