//! Structured error types for store operations.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    ValueOutOfRange,

    // Not found errors
    ProjectNotFound,
    TaskNotFound,
    SprintNotFound,
    MilestoneNotFound,
    TimeEntryNotFound,
    CommentNotFound,
    StoryNotFound,

    // Internal errors
    DatabaseError,
    InternalError,
}

/// Structured error carried by every failing store operation.
///
/// Validation errors are raised before any statement runs; not-found errors
/// are raised by writes whose side effects need the row to exist. Plain gets
/// return `Ok(None)` instead.
#[derive(Debug, Serialize, Error)]
#[error("{message}")]
pub struct StoreError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl StoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn out_of_range(field: &str, min: i64, max: i64) -> Self {
        Self::new(
            ErrorCode::ValueOutOfRange,
            format!("{} must be between {} and {}", field, min, max),
        )
        .with_field(field)
    }

    pub fn project_not_found(project_id: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project not found: {}", project_id),
        )
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn sprint_not_found(sprint_id: &str) -> Self {
        Self::new(
            ErrorCode::SprintNotFound,
            format!("Sprint not found: {}", sprint_id),
        )
    }

    pub fn milestone_not_found(milestone_id: &str) -> Self {
        Self::new(
            ErrorCode::MilestoneNotFound,
            format!("Milestone not found: {}", milestone_id),
        )
    }

    pub fn time_entry_not_found(entry_id: &str) -> Self {
        Self::new(
            ErrorCode::TimeEntryNotFound,
            format!("Time entry not found: {}", entry_id),
        )
    }

    pub fn comment_not_found(comment_id: &str) -> Self {
        Self::new(
            ErrorCode::CommentNotFound,
            format!("Comment not found: {}", comment_id),
        )
    }

    pub fn story_not_found(story_id: &str) -> Self {
        Self::new(
            ErrorCode::StoryNotFound,
            format!("Story not found: {}", story_id),
        )
    }

    pub fn database(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::DatabaseError, err.to_string())
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        // Try to downcast to StoreError first
        match err.downcast::<StoreError>() {
            Ok(store_err) => store_err,
            Err(err) => StoreError::internal(err),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
