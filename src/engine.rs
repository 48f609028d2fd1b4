//! Execution engine seam.
//!
//! The engine runs agents; the coordinator only asks it to start, cancel, or
//! steer, and learns about outcomes through the event stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::task::{TaskId, TaskRecord, TaskTransition};

/// Reply to a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartAck {
    /// A new execution was launched.
    Accepted,
    /// The engine already has an execution in flight for this task.
    AlreadyRunning,
}

/// Final result of one execution, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Succeeded {
        #[serde(default)]
        output: Option<String>,
    },
    Failed {
        error: String,
    },
    Cancelled {
        #[serde(default)]
        reason: Option<String>,
    },
}

impl ExecutionOutcome {
    /// The state machine event this outcome drives.
    pub fn transition(&self) -> TaskTransition {
        match self {
            Self::Succeeded { .. } => TaskTransition::ExecutionSucceeded,
            Self::Failed { error } => TaskTransition::ExecutionFailed {
                error: error.clone(),
            },
            Self::Cancelled { .. } => TaskTransition::Cancel,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Runs agent executions on behalf of the coordinator.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Launch an execution of `task`. `input` overrides the task's default
    /// input for this run.
    async fn start(&self, task: &TaskRecord, input: Option<&str>) -> Result<StartAck, EngineError>;

    /// Ask the engine to stop the in-flight execution of `task_id`.
    async fn cancel(&self, task_id: &TaskId) -> Result<(), EngineError>;

    /// Deliver an instruction to the in-flight execution. Returns whether it
    /// was delivered.
    async fn steer(&self, task_id: &TaskId, instruction: &str) -> Result<bool, EngineError>;
}

/// Engine used when no executor is attached. Every request fails with
/// `Unavailable`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedEngine;

#[async_trait]
impl ExecutionEngine for DetachedEngine {
    async fn start(&self, task: &TaskRecord, _input: Option<&str>) -> Result<StartAck, EngineError> {
        Err(EngineError::Unavailable(format!(
            "no execution engine attached, cannot start task {}",
            task.id
        )))
    }

    async fn cancel(&self, task_id: &TaskId) -> Result<(), EngineError> {
        Err(EngineError::Unavailable(format!(
            "no execution engine attached, cannot cancel task {task_id}"
        )))
    }

    async fn steer(&self, task_id: &TaskId, _instruction: &str) -> Result<bool, EngineError> {
        Err(EngineError::Unavailable(format!(
            "no execution engine attached, cannot steer task {task_id}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_transition() {
        assert_eq!(
            ExecutionOutcome::Succeeded { output: None }.transition(),
            TaskTransition::ExecutionSucceeded
        );
        assert_eq!(
            ExecutionOutcome::Failed {
                error: "x".to_string()
            }
            .transition(),
            TaskTransition::ExecutionFailed {
                error: "x".to_string()
            }
        );
        assert_eq!(
            ExecutionOutcome::Cancelled { reason: None }.transition(),
            TaskTransition::Cancel
        );
    }

    #[tokio::test]
    async fn detached_engine_is_unavailable() {
        let err = DetachedEngine
            .steer(&TaskId::from("t1"), "hurry")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unavailable(_)));
    }
}
