use batchward_application::{BatchEventPublisher, BatchExecutedEvent};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;

/// Batch event publisher backed by an unbounded tokio channel.
///
/// Publishing never blocks the run. Events sent after the receiver is
/// dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelBatchEventPublisher {
    sender: UnboundedSender<BatchExecutedEvent>,
}

impl ChannelBatchEventPublisher {
    /// Creates a publisher and the receiver consuming its events.
    #[must_use]
    pub fn channel() -> (Self, UnboundedReceiver<BatchExecutedEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl BatchEventPublisher for ChannelBatchEventPublisher {
    fn publish(&self, event: BatchExecutedEvent) {
        let batch_index = event.batch_index;
        if self.sender.send(event).is_err() {
            debug!(batch_index, "batch event dropped, no receiver");
        }
    }
}
