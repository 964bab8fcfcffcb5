use async_trait::async_trait;
use batchward_application::{ExecutionContext, RowTransform};
use batchward_domain::{RowError, RowFailure, RowOutcome};
use serde_json::Value;

const IDENTITY_FIELD: &str = "id";

/// Validates incoming records before they are imported.
///
/// Every required field must be present and non-empty. Records carrying an
/// `id` update an existing entity, all others create one.
#[derive(Debug, Clone, Default)]
pub struct ImportTransform {
    required_fields: Vec<String>,
}

impl ImportTransform {
    pub fn new(required_fields: Vec<String>) -> Self {
        Self { required_fields }
    }
}

#[async_trait]
impl RowTransform for ImportTransform {
    async fn apply(
        &self,
        _context: &ExecutionContext,
        record: &Value,
    ) -> Result<RowOutcome, RowFailure> {
        let Some(fields) = record.as_object() else {
            return Err(RowError::new("record must be a JSON object").into());
        };

        for field_name in &self.required_fields {
            if fields.get(field_name).is_none_or(is_blank) {
                return Err(RowError::for_field(
                    field_name.as_str(),
                    format!("{field_name} is required"),
                )
                .into());
            }
        }

        if fields.get(IDENTITY_FIELD).is_some_and(|id| !is_blank(id)) {
            Ok(RowOutcome::Updated)
        } else {
            Ok(RowOutcome::Created)
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}
