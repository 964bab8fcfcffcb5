use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use batchward_core::{AppResult, JobId};
use batchward_domain::JobRunnerState;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{LeaseLockManager, LeaseToken};

pub(super) type ActiveRuns = Arc<Mutex<HashMap<JobId, ActiveRun>>>;

#[derive(Debug, Clone)]
pub(super) struct ActiveRun {
    pub(super) state: JobRunnerState,
    pub(super) cancellation: CancellationToken,
}

/// Locks the registry; it is never held across an await point.
pub(super) fn lock(
    active_runs: &Mutex<HashMap<JobId, ActiveRun>>,
) -> MutexGuard<'_, HashMap<JobId, ActiveRun>> {
    active_runs.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry entry and lease of one in-flight run.
///
/// Dropping the guard removes the registry entry. A lease still held at that
/// point (run future dropped or transform panicked) is released on a
/// background task, or left to expire when no runtime is available.
pub(super) struct RunGuard {
    job_id: JobId,
    active_runs: ActiveRuns,
    lease_manager: Arc<LeaseLockManager>,
    lease: Option<LeaseToken>,
}

impl RunGuard {
    pub(super) fn new(
        job_id: JobId,
        active_runs: ActiveRuns,
        lease_manager: Arc<LeaseLockManager>,
    ) -> Self {
        Self {
            job_id,
            active_runs,
            lease_manager,
            lease: None,
        }
    }

    pub(super) fn hold(&mut self, lease: LeaseToken) {
        self.lease = Some(lease);
    }

    pub(super) async fn release_lease(&mut self) -> AppResult<bool> {
        match self.lease.take() {
            Some(lease) => self.lease_manager.release(lease).await,
            None => Ok(false),
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock(&self.active_runs).remove(&self.job_id);

        let Some(lease) = self.lease.take() else {
            return;
        };

        let job_id = self.job_id.clone();
        match Handle::try_current() {
            Ok(runtime) => {
                warn!(job_id = %job_id, "run ended abnormally, releasing lease in background");
                let lease_manager = self.lease_manager.clone();
                runtime.spawn(async move {
                    match lease_manager.release(lease).await {
                        Ok(released) => {
                            debug!(job_id = %job_id, released, "abandoned lease handled");
                        }
                        Err(error) => warn!(
                            job_id = %job_id,
                            error = %error,
                            "failed to release abandoned lease"
                        ),
                    }
                });
            }
            Err(_) => warn!(
                job_id = %job_id,
                "run ended abnormally outside a runtime, lease left to expire"
            ),
        }
    }
}
