use batchward_domain::{RowRecord, StoreScope};

use crate::ExecutionContext;

/// Notification emitted once per finished batch.
#[derive(Debug, Clone)]
pub struct BatchExecutedEvent {
    /// Context of the run that executed the batch.
    pub context: ExecutionContext,
    /// Store scope the batch belongs to.
    pub store_scope: StoreScope,
    /// One-based batch number within the run.
    pub batch_index: u64,
    /// Every record of the batch, failed ones included.
    pub records: Vec<RowRecord>,
}

/// Fire-and-forget channel for batch notifications.
pub trait BatchEventPublisher: Send + Sync {
    /// Publishes one event; receivers never influence the run.
    fn publish(&self, event: BatchExecutedEvent);
}
