use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("No lessons available for batch '{batch_id}'")]
    NoLessonsAvailable { batch_id: String },

    #[error(
        "Not enough matching dates for batch '{batch_id}': {needed} lessons but only {found} dates in the window"
    )]
    InsufficientScheduleWindow {
        batch_id: String,
        needed: usize,
        found: usize,
    },

    #[error("Call {instance_id} has no weekday pattern to cascade along")]
    NoRecurrencePattern { instance_id: Uuid },

    #[error("Call {instance_id} is not part of any chain in batch '{batch_id}'")]
    ChainNotFound { instance_id: Uuid, batch_id: String },

    #[error("No available slot found after call {instance_id}")]
    NoAvailableSlot { instance_id: Uuid },

    #[error("Cannot {action} call {instance_id} while it is {from}")]
    InvalidTransition {
        instance_id: Uuid,
        from: String,
        action: &'static str,
    },

    #[error("Call {instance_id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict {
        instance_id: Uuid,
        expected: u64,
        found: u64,
    },

    #[error("{service} error: {message}")]
    ExternalService { service: String, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to read store: {0}")]
    StoreRead(std::io::Error),

    #[error("Failed to write store: {0}")]
    StoreWrite(std::io::Error),

    #[error("Failed to acquire the data directory lock")]
    LockFailed,

    #[error("Failed to read config: {0}")]
    ConfigRead(std::io::Error),

    #[error("Failed to write config: {0}")]
    ConfigWrite(std::io::Error),

    #[error("Invalid config format: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(String),
}

impl SchedulerError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// True for errors that abort an operation before anything was persisted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::NoLessonsAvailable { .. }
                | Self::InsufficientScheduleWindow { .. }
                | Self::NoRecurrencePattern { .. }
                | Self::ChainNotFound { .. }
                | Self::NoAvailableSlot { .. }
                | Self::InvalidTransition { .. }
        )
    }
}

pub type Result<T, E = SchedulerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err = SchedulerError::validation("start_time", "expected HH:mm");
        assert_eq!(err.to_string(), "Invalid start_time: expected HH:mm");
    }

    #[test]
    fn test_not_found_message() {
        let err = SchedulerError::not_found("Batch", "b-1");
        assert_eq!(err.to_string(), "Batch 'b-1' not found");
    }

    #[test]
    fn test_precondition_classification() {
        assert!(SchedulerError::NoLessonsAvailable { batch_id: "b".into() }.is_precondition());
        assert!(!SchedulerError::external("zoom", "down").is_precondition());
        assert!(!SchedulerError::LockFailed.is_precondition());
    }
}
