//! Task record types.

use std::borrow::Borrow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, TransitionError, ValidationError};
use crate::schedule::{CronEvaluator, Schedule, Timestamp, is_due};

/// Opaque, immutable task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for its next scheduled run.
    #[default]
    Active,
    /// Will not run until resumed.
    Paused,
    /// An execution is in flight.
    Running,
    /// A non-recurring task finished successfully.
    Completed,
    /// A non-recurring task failed on its last execution.
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Active,
        TaskStatus::Paused,
        TaskStatus::Running,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Paused => "paused",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// No further runs without an explicit schedule update.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(TaskStatus::Active),
            "paused" => Ok(TaskStatus::Paused),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A scheduled background agent task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Agent the execution engine runs for this task.
    pub agent_id: String,
    /// Default input handed to the agent on each run.
    #[serde(default)]
    pub input: Option<String>,
    pub schedule: Schedule,
    #[serde(default)]
    pub status: TaskStatus,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub last_run_at: Option<Timestamp>,
    #[serde(default)]
    pub next_run_at: Option<Timestamp>,
    #[serde(default)]
    pub success_count: u32,
    #[serde(default)]
    pub failure_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl TaskRecord {
    /// Validate a creation request and build the record, active, with its
    /// first occurrence computed from the schedule.
    pub fn create(new: NewTask, now: Timestamp, cron: &dyn CronEvaluator) -> Result<Self, Error> {
        new.validate(cron)?;
        let schedule = new
            .schedule
            .ok_or(ValidationError::MissingField { field: "schedule" })?;

        let mut task = Self {
            id: new.id.unwrap_or_else(TaskId::generate),
            name: new.name.trim().to_string(),
            description: new.description,
            agent_id: new.agent_id.trim().to_string(),
            input: new.input,
            schedule,
            status: TaskStatus::Active,
            created_at: now,
            updated_at: now,
            last_run_at: None,
            next_run_at: None,
            success_count: 0,
            failure_count: 0,
            last_error: None,
        };
        task.next_run_at = task.schedule.first_occurrence(now, now, cron);
        Ok(task)
    }

    /// Next occurrence of this task's schedule strictly after `after`.
    pub fn next_occurrence(&self, after: Timestamp, cron: &dyn CronEvaluator) -> Option<Timestamp> {
        self.schedule.next_occurrence(after, self.created_at, cron)
    }

    /// Active and due at `now`.
    pub fn is_runnable(&self, now: Timestamp) -> bool {
        self.status == TaskStatus::Active && is_due(self.next_run_at, now)
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Apply a metadata and/or schedule update. Validation happens before any
    /// field changes; a running task rejects updates.
    pub fn apply_patch(
        &mut self,
        patch: TaskPatch,
        now: Timestamp,
        cron: &dyn CronEvaluator,
    ) -> Result<(), Error> {
        if self.is_running() {
            return Err(TransitionError::TaskRunning {
                id: self.id.clone(),
                operation: "update",
            }
            .into());
        }
        patch.validate(cron)?;

        if let Some(name) = patch.name {
            self.name = name.trim().to_string();
        }
        if let Some(agent_id) = patch.agent_id {
            self.agent_id = agent_id.trim().to_string();
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(input) = patch.input {
            self.input = Some(input);
        }
        if let Some(schedule) = patch.schedule {
            self.reschedule(schedule, now, cron);
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Request to create a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    /// Caller-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<TaskId>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl NewTask {
    pub fn new(name: impl Into<String>, agent_id: impl Into<String>, schedule: Schedule) -> Self {
        Self {
            name: name.into(),
            agent_id: agent_id.into(),
            schedule: Some(schedule),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self, cron: &dyn CronEvaluator) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        if self.agent_id.trim().is_empty() {
            return Err(ValidationError::MissingField { field: "agent_id" }.into());
        }
        if self.id.as_ref().is_some_and(|id| id.as_str().trim().is_empty()) {
            return Err(ValidationError::MissingField { field: "id" }.into());
        }
        match &self.schedule {
            Some(schedule) => schedule.validate(cron)?,
            None => return Err(ValidationError::MissingField { field: "schedule" }.into()),
        }
        Ok(())
    }
}

/// Partial update of a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl TaskPatch {
    pub fn schedule(schedule: Schedule) -> Self {
        Self {
            schedule: Some(schedule),
            ..Default::default()
        }
    }

    pub fn validate(&self, cron: &dyn CronEvaluator) -> Result<(), Error> {
        if self.name.as_ref().is_some_and(|n| n.trim().is_empty()) {
            return Err(ValidationError::MissingField { field: "name" }.into());
        }
        if self.agent_id.as_ref().is_some_and(|a| a.trim().is_empty()) {
            return Err(ValidationError::MissingField { field: "agent_id" }.into());
        }
        if let Some(schedule) = &self.schedule {
            schedule.validate(cron)?;
        }
        Ok(())
    }
}
