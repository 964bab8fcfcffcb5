use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of one result message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSeverity {
    /// Informational note.
    Info,
    /// Something looked wrong but processing went on unaffected.
    Warning,
    /// A record or the run failed.
    Error,
}

impl MessageSeverity {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Row a message refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedRow {
    position: u64,
    entity_name: String,
}

impl AffectedRow {
    /// Creates a row reference from its absolute record position.
    #[must_use]
    pub fn new(position: u64, entity_name: impl Into<String>) -> Self {
        Self {
            position,
            entity_name: entity_name.into(),
        }
    }

    /// Returns the zero-based record position within the store scope.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Returns the entity name the row belongs to.
    #[must_use]
    pub fn entity_name(&self) -> &str {
        self.entity_name.as_str()
    }
}

/// Batch and stage a fatal failure happened in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStage {
    batch_index: u64,
    stage: String,
}

impl BatchStage {
    /// Creates a batch stage marker.
    #[must_use]
    pub fn new(batch_index: u64, stage: impl Into<String>) -> Self {
        Self {
            batch_index,
            stage: stage.into(),
        }
    }

    /// Returns the one-based batch number within the run.
    #[must_use]
    pub fn batch_index(&self) -> u64 {
        self.batch_index
    }

    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        self.stage.as_str()
    }
}

impl Display for BatchStage {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "[Batch: {}, Stage: {}]",
            self.batch_index, self.stage
        )
    }
}

/// Structured message collected while a run executes.
///
/// Messages are built with the `with_*` methods and become read-only once
/// appended to a [`crate::RunResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    severity: MessageSeverity,
    text: String,
    affected_row: Option<AffectedRow>,
    affected_field: Option<String>,
    created_at: DateTime<Utc>,
}

impl ResultMessage {
    /// Creates a message without row context.
    #[must_use]
    pub fn new(severity: MessageSeverity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
            affected_row: None,
            affected_field: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an informational message.
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self::new(MessageSeverity::Info, text)
    }

    /// Creates a warning message.
    #[must_use]
    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(MessageSeverity::Warning, text)
    }

    /// Creates an error message.
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageSeverity::Error, text)
    }

    /// Attaches the affected row.
    #[must_use]
    pub fn with_affected_row(mut self, affected_row: AffectedRow) -> Self {
        self.affected_row = Some(affected_row);
        self
    }

    /// Attaches the affected field name.
    #[must_use]
    pub fn with_affected_field(mut self, field_name: impl Into<String>) -> Self {
        self.affected_field = Some(field_name.into());
        self
    }

    /// Returns the message severity.
    #[must_use]
    pub fn severity(&self) -> MessageSeverity {
        self.severity
    }

    /// Returns the message text.
    #[must_use]
    pub fn text(&self) -> &str {
        self.text.as_str()
    }

    /// Returns the affected row, if any.
    #[must_use]
    pub fn affected_row(&self) -> Option<&AffectedRow> {
        self.affected_row.as_ref()
    }

    /// Returns the affected field name, if any.
    #[must_use]
    pub fn affected_field(&self) -> Option<&str> {
        self.affected_field.as_deref()
    }

    /// Returns when the message was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
