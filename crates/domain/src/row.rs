use std::error::Error as StdError;
use std::fmt::{Display, Formatter};

use batchward_core::AppError;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// What a per-record operation did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// A new target record was created.
    Created,
    /// An existing target record was modified.
    Updated,
    /// The record required no change.
    Skipped,
}

/// Record-scoped failure raised by a transform or validation step.
#[derive(Debug)]
pub struct RowError {
    message: String,
    field_name: Option<String>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl RowError {
    /// Creates a row error without field context.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field_name: None,
            source: None,
        }
    }

    /// Creates a row error for one field.
    #[must_use]
    pub fn for_field(field_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field_name: Some(field_name.into()),
            source: None,
        }
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the failing field name, if known.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }
}

impl Display for RowError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.message.as_str())
    }
}

impl StdError for RowError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|source| source as &(dyn StdError + 'static))
    }
}

/// Failure returned by a per-record operation.
#[derive(Debug, Error)]
pub enum RowFailure {
    /// The record itself is invalid; the batch goes on.
    #[error(transparent)]
    Invalid(#[from] RowError),

    /// Something outside the record broke; the run must stop.
    #[error(transparent)]
    Fatal(#[from] AppError),
}

/// One record as processed inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowRecord<T = Value> {
    position: usize,
    value: T,
    error: Option<String>,
}

impl<T> RowRecord<T> {
    /// Creates a successfully processed record.
    #[must_use]
    pub fn succeeded(position: usize, value: T) -> Self {
        Self {
            position,
            value,
            error: None,
        }
    }

    /// Creates a record that failed with the given message.
    #[must_use]
    pub fn failed(position: usize, value: T, error: impl Into<String>) -> Self {
        Self {
            position,
            value,
            error: Some(error.into()),
        }
    }

    /// Returns the zero-based position inside the batch.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns the source value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the failure text, if the record failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns whether the record failed.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}
