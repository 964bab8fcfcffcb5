use async_trait::async_trait;
use batchward_domain::{RowFailure, RowOutcome};
use serde_json::Value;

use crate::ExecutionContext;

/// Caller-supplied per-record transform and validation step.
#[async_trait]
pub trait RowTransform: Send + Sync {
    /// Applies the operation to one record.
    ///
    /// Return [`RowFailure::Invalid`] for problems with the record itself and
    /// [`RowFailure::Fatal`] when the target system can no longer be reached.
    async fn apply(
        &self,
        context: &ExecutionContext,
        record: &Value,
    ) -> Result<RowOutcome, RowFailure>;
}
