use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

const MAX_JOB_ID_LENGTH: usize = 128;

/// Stable identifier of a bulk job.
///
/// Job ids double as storage path segments for lease fingerprints, so only
/// ASCII alphanumerics, `-`, `_` and `.` are accepted and a leading `.` is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

impl JobId {
    /// Creates a validated job identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(AppError::Validation("job id must not be empty".to_owned()));
        }

        if trimmed.len() > MAX_JOB_ID_LENGTH {
            return Err(AppError::Validation(format!(
                "job id must be at most {MAX_JOB_ID_LENGTH} characters"
            )));
        }

        if trimmed.starts_with('.') {
            return Err(AppError::Validation(format!(
                "job id '{trimmed}' must not start with '.'"
            )));
        }

        if let Some(invalid) = trimmed
            .chars()
            .find(|character| !(character.is_ascii_alphanumeric() || "-_.".contains(*character)))
        {
            return Err(AppError::Validation(format!(
                "job id '{trimmed}' contains unsupported character '{invalid}'"
            )));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for JobId {
    type Error = AppError;

    fn try_from(value: String) -> AppResult<Self> {
        Self::new(value)
    }
}

impl From<JobId> for String {
    fn from(value: JobId) -> Self {
        value.0
    }
}

impl Display for JobId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}
