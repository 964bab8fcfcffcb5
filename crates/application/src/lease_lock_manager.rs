//! Time-bounded job leases persisted in a shared content store.
//!
//! Exclusivity holds on two levels. Inside one process, the read-check-write
//! sequence runs under a `RwLock` (readers for [`LeaseLockManager::is_leased`],
//! a writer for acquire and release). Across processes, each holder writes a
//! unique fingerprint with an expiry and only deletes the fingerprint it
//! wrote, so a lease that expired and was re-granted elsewhere is never
//! removed by its previous holder. Two processes racing on an absent or
//! expired fingerprint are not serialized by the in-process lock.

use std::sync::Arc;

use batchward_core::{AppError, AppResult, JobId};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ContentStore;

const DEFAULT_PATH_PREFIX: &str = "leases";

/// Persisted lease record stored at the job's well-known path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaseFingerprint {
    /// Unique token written by the holder.
    pub token: String,
    /// Identity of the holding process.
    pub holder_id: String,
    /// When the lease was granted.
    pub acquired_at: DateTime<Utc>,
    /// When the lease stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl LeaseFingerprint {
    /// Returns whether the lease is still valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Exclusive claim on one job, returned by a successful acquire.
#[derive(Debug, PartialEq, Eq)]
pub struct LeaseToken {
    job_id: JobId,
    fingerprint: LeaseFingerprint,
    validity: TimeDelta,
}

impl LeaseToken {
    /// Returns the leased job.
    #[must_use]
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Returns the fingerprint this token wrote.
    #[must_use]
    pub fn fingerprint(&self) -> &LeaseFingerprint {
        &self.fingerprint
    }

    /// Returns how long the lease stays valid after acquisition.
    #[must_use]
    pub fn validity(&self) -> TimeDelta {
        self.validity
    }
}

/// Grants, tests and releases job leases.
pub struct LeaseLockManager {
    store: Arc<dyn ContentStore>,
    holder_id: String,
    lease_duration: TimeDelta,
    path_prefix: String,
    critical_section: RwLock<()>,
}

impl LeaseLockManager {
    /// Creates a lease manager with a fixed lease duration.
    pub fn new(
        store: Arc<dyn ContentStore>,
        holder_id: impl Into<String>,
        lease_seconds: u32,
    ) -> AppResult<Self> {
        let holder_id = holder_id.into();
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "lease holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "lease_seconds must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            store,
            holder_id,
            lease_duration: TimeDelta::seconds(i64::from(lease_seconds)),
            path_prefix: DEFAULT_PATH_PREFIX.to_owned(),
            critical_section: RwLock::new(()),
        })
    }

    /// Stores fingerprints under a different path prefix.
    #[must_use]
    pub fn with_path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = path_prefix.into().trim_end_matches('/').to_owned();
        self
    }

    /// Returns the configured lease duration.
    #[must_use]
    pub fn lease_duration(&self) -> TimeDelta {
        self.lease_duration
    }

    /// Returns the storage path holding the job's fingerprint.
    #[must_use]
    pub fn path_for(&self, job_id: &JobId) -> String {
        if self.path_prefix.is_empty() {
            format!("{job_id}.lease")
        } else {
            format!("{}/{job_id}.lease", self.path_prefix)
        }
    }

    /// Attempts to take the lease; storage failures deny the lease.
    pub async fn try_acquire(&self, job_id: &JobId) -> Option<LeaseToken> {
        let _guard = self.critical_section.write().await;
        let path = self.path_for(job_id);

        match self.acquire_locked(job_id, path.as_str()).await {
            Ok(token) => token,
            Err(error) => {
                warn!(
                    job_id = %job_id,
                    path = %path,
                    error = %error,
                    "lease acquisition failed, treating lease as held"
                );
                None
            }
        }
    }

    /// Returns whether a valid lease exists; storage failures report leased.
    pub async fn is_leased(&self, job_id: &JobId) -> bool {
        let _guard = self.critical_section.read().await;
        let path = self.path_for(job_id);

        match self.read_fingerprint(path.as_str()).await {
            Ok(Some(fingerprint)) => fingerprint.is_valid_at(Utc::now()),
            Ok(None) => false,
            Err(error) => {
                warn!(
                    job_id = %job_id,
                    path = %path,
                    error = %error,
                    "lease check failed, treating lease as held"
                );
                true
            }
        }
    }

    /// Deletes the fingerprint if it is still the one `token` wrote.
    ///
    /// Returns `Ok(false)` when the lease expired and another holder replaced
    /// it, or when it is already gone.
    pub async fn release(&self, token: LeaseToken) -> AppResult<bool> {
        let _guard = self.critical_section.write().await;
        let path = self.path_for(&token.job_id);

        match self.read_fingerprint(path.as_str()).await? {
            Some(current) if current == token.fingerprint => {
                let deleted = self.store.delete(path.as_str()).await?;
                info!(job_id = %token.job_id, "lease released");
                Ok(deleted)
            }
            Some(current) => {
                warn!(
                    job_id = %token.job_id,
                    current_holder = %current.holder_id,
                    "lease was superseded by another holder, leaving it in place"
                );
                Ok(false)
            }
            None => {
                debug!(job_id = %token.job_id, "lease already removed");
                Ok(false)
            }
        }
    }

    async fn acquire_locked(&self, job_id: &JobId, path: &str) -> AppResult<Option<LeaseToken>> {
        let now = Utc::now();

        if let Some(current) = self.read_fingerprint(path).await? {
            if current.is_valid_at(now) {
                debug!(
                    job_id = %job_id,
                    holder_id = %current.holder_id,
                    expires_at = %current.expires_at,
                    "lease is held"
                );
                return Ok(None);
            }

            info!(
                job_id = %job_id,
                previous_holder = %current.holder_id,
                expired_at = %current.expires_at,
                "superseding expired lease"
            );
        }

        let fingerprint = LeaseFingerprint {
            token: format!("{}:{}", self.holder_id, Uuid::new_v4()),
            holder_id: self.holder_id.clone(),
            acquired_at: now,
            expires_at: now + self.lease_duration,
        };
        let content = serde_json::to_string(&fingerprint).map_err(|error| {
            AppError::Internal(format!("failed to encode lease fingerprint: {error}"))
        })?;

        self.store.write(path, content.as_str()).await?;
        info!(
            job_id = %job_id,
            expires_at = %fingerprint.expires_at,
            "lease acquired"
        );

        Ok(Some(LeaseToken {
            job_id: job_id.clone(),
            fingerprint,
            validity: self.lease_duration,
        }))
    }

    async fn read_fingerprint(&self, path: &str) -> AppResult<Option<LeaseFingerprint>> {
        if !self.store.exists(path).await? {
            return Ok(None);
        }

        let Some(content) = self.store.read(path).await? else {
            return Ok(None);
        };

        serde_json::from_str(content.as_str())
            .map(Some)
            .map_err(|error| {
                AppError::Storage(format!("unreadable lease fingerprint at '{path}': {error}"))
            })
    }
}
