//! Error types for the background agent coordinator.

use crate::task::{TaskId, TaskStatus};

/// Top-level error type for the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transition error: {0}")]
    Transition(#[from] TransitionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Task {id} not found")]
    TaskNotFound { id: TaskId },
}

impl Error {
    /// Whether the error is a caller-side rejection (validation or precondition)
    /// rather than a collaborator failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Schedule(_) | Self::Validation(_) | Self::Transition(_) | Self::TaskNotFound { .. }
        )
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to load task file {path}: {reason}")]
    TaskFile { path: String, reason: String },
}

/// Schedule validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("Interval must be positive, got {interval_ms}ms")]
    NonPositiveInterval { interval_ms: i64 },

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Unknown timezone '{timezone}'")]
    InvalidTimezone { timezone: String },
}

/// Task field validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Task {id} already exists")]
    DuplicateId { id: TaskId },
}

/// Precondition failures of the task status state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Task {id} is {status}, cannot apply {event}")]
    InvalidTransition {
        id: TaskId,
        status: TaskStatus,
        event: &'static str,
    },

    #[error("Task {id} is running, {operation} is not allowed until it finishes")]
    TaskRunning { id: TaskId, operation: &'static str },
}

/// Persistence collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Execution engine collaborator errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Execution engine unavailable: {0}")]
    Unavailable(String),

    #[error("Engine request for task {task_id} failed: {reason}")]
    RequestFailed { task_id: TaskId, reason: String },

    #[error("Engine rejected task {task_id}: {reason}")]
    Rejected { task_id: TaskId, reason: String },
}

/// Failure reported by a stream observer callback.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Observer failed: {0}")]
pub struct ObserverError(pub String);

/// Result type alias for the coordinator.
pub type Result<T> = std::result::Result<T, Error>;
