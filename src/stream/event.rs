//! Execution events streamed from the engine while an agent works on a task.

use serde::{Deserialize, Serialize};

use crate::engine::ExecutionOutcome;
use crate::schedule::Timestamp;
use crate::task::TaskId;

/// One event from a running execution. Routed by `task_id`; `kind` is
/// forwarded to observers as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub task_id: TaskId,
    pub timestamp: Timestamp,
    pub kind: EventKind,
}

/// What happened during an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Execution has started.
    Started {
        task_name: String,
        #[serde(default)]
        execution_mode: Option<String>,
    },
    /// The agent began another reasoning turn.
    Turn { iteration: u32 },
    ToolStarted { tool_name: String },
    ToolCompleted {
        tool_name: String,
        success: bool,
        #[serde(default)]
        summary: Option<String>,
    },
    /// Text emitted by the agent or a tool.
    Output {
        text: String,
        #[serde(default)]
        is_stderr: bool,
    },
    Progress {
        phase: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
    /// A steering instruction reached the execution.
    Steered { instruction: String },
    Heartbeat { elapsed_ms: u64 },
    Completed {
        #[serde(default)]
        result: Option<String>,
        duration_ms: u64,
    },
    Failed {
        error: String,
        duration_ms: u64,
        #[serde(default)]
        recoverable: bool,
    },
    Cancelled {
        #[serde(default)]
        reason: Option<String>,
        duration_ms: u64,
    },
}

impl ExecutionEvent {
    pub fn new(task_id: impl Into<TaskId>, timestamp: Timestamp, kind: EventKind) -> Self {
        Self {
            task_id: task_id.into(),
            timestamp,
            kind,
        }
    }

    pub fn completed(task_id: impl Into<TaskId>, timestamp: Timestamp, result: Option<String>) -> Self {
        Self::new(
            task_id,
            timestamp,
            EventKind::Completed {
                result,
                duration_ms: 0,
            },
        )
    }

    pub fn failed(task_id: impl Into<TaskId>, timestamp: Timestamp, error: impl Into<String>) -> Self {
        Self::new(
            task_id,
            timestamp,
            EventKind::Failed {
                error: error.into(),
                duration_ms: 0,
                recoverable: false,
            },
        )
    }

    pub fn cancelled(task_id: impl Into<TaskId>, timestamp: Timestamp, reason: Option<String>) -> Self {
        Self::new(
            task_id,
            timestamp,
            EventKind::Cancelled {
                reason,
                duration_ms: 0,
            },
        )
    }

    /// Whether this event ends the execution (completed, failed or cancelled).
    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Outcome carried by a terminal event.
    pub fn outcome(&self) -> Option<ExecutionOutcome> {
        match &self.kind {
            EventKind::Completed { result, .. } => Some(ExecutionOutcome::Succeeded {
                output: result.clone(),
            }),
            EventKind::Failed { error, .. } => Some(ExecutionOutcome::Failed {
                error: error.clone(),
            }),
            EventKind::Cancelled { reason, .. } => Some(ExecutionOutcome::Cancelled {
                reason: reason.clone(),
            }),
            _ => None,
        }
    }
}

impl EventKind {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// The serde tag of this kind ("started", "tool_completed", ...).
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Turn { .. } => "turn",
            Self::ToolStarted { .. } => "tool_started",
            Self::ToolCompleted { .. } => "tool_completed",
            Self::Output { .. } => "output",
            Self::Progress { .. } => "progress",
            Self::Steered { .. } => "steered",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
