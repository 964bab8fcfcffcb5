use batchward_domain::ResultMessage;

/// Receives progress after every completed batch.
pub trait ProgressSink: Send + Sync {
    /// Reports processed records against the last known total.
    fn report(&self, processed: u64, total: u64);
}

/// Operator-facing stream of run messages.
pub trait MessageSink: Send + Sync {
    /// Publishes one message as soon as it is recorded.
    fn publish(&self, message: &ResultMessage);
}
