//! Task status state machine.
//!
//! Every transition has exactly one source status. Anything else is rejected
//! before the record is touched.
//!
//! ```text
//! active ──pause──▶ paused ──resume──▶ active
//! active ──begin_execution──▶ running
//! running ──succeeded──▶ active | completed
//! running ──failed─────▶ active | failed
//! running ──cancel─────▶ active | paused
//! ```

use crate::error::TransitionError;
use crate::schedule::{CronEvaluator, Schedule, Timestamp};
use crate::task::model::{TaskRecord, TaskStatus};

/// An event driving the task status state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskTransition {
    Pause,
    Resume,
    BeginExecution,
    ExecutionSucceeded,
    ExecutionFailed { error: String },
    Cancel,
}

impl TaskTransition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::BeginExecution => "begin_execution",
            Self::ExecutionSucceeded => "execution_succeeded",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::Cancel => "cancel",
        }
    }

    /// The only status this transition may be applied from.
    pub fn source_status(&self) -> TaskStatus {
        match self {
            Self::Pause | Self::BeginExecution => TaskStatus::Active,
            Self::Resume => TaskStatus::Paused,
            Self::ExecutionSucceeded | Self::ExecutionFailed { .. } | Self::Cancel => {
                TaskStatus::Running
            }
        }
    }
}

impl TaskStatus {
    pub fn permits(self, transition: &TaskTransition) -> bool {
        transition.source_status() == self
    }
}

impl TaskRecord {
    /// Apply a transition at `now`. Returns the new status.
    pub fn apply(
        &mut self,
        transition: TaskTransition,
        now: Timestamp,
        cron: &dyn CronEvaluator,
    ) -> Result<TaskStatus, TransitionError> {
        if !self.status.permits(&transition) {
            return Err(TransitionError::InvalidTransition {
                id: self.id.clone(),
                status: self.status,
                event: transition.name(),
            });
        }

        match transition {
            TaskTransition::Pause => {
                self.status = TaskStatus::Paused;
                self.next_run_at = None;
            }
            TaskTransition::Resume => {
                self.status = TaskStatus::Active;
                self.next_run_at = self.next_occurrence(now, cron);
            }
            TaskTransition::BeginExecution => {
                self.status = TaskStatus::Running;
                self.last_run_at = Some(now);
            }
            TaskTransition::ExecutionSucceeded => {
                let next = self.advance(now, cron);
                self.success_count = self.success_count.saturating_add(1);
                self.last_error = None;
                self.settle(next, TaskStatus::Completed);
            }
            TaskTransition::ExecutionFailed { error } => {
                let next = self.advance(now, cron);
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_error = Some(error);
                self.settle(next, TaskStatus::Failed);
            }
            TaskTransition::Cancel => {
                // Non-recurring tasks park as paused.
                let next = self.advance(now, cron);
                self.settle(next, TaskStatus::Paused);
            }
        }

        self.updated_at = now;
        Ok(self.status)
    }

    /// Replace the schedule. Re-activates finished tasks; paused tasks stay
    /// paused until resumed.
    pub(crate) fn reschedule(&mut self, schedule: Schedule, now: Timestamp, cron: &dyn CronEvaluator) {
        self.schedule = schedule;
        if self.status == TaskStatus::Paused {
            self.next_run_at = None;
        } else {
            self.status = TaskStatus::Active;
            self.next_run_at = self.schedule.first_occurrence(now, self.created_at, cron);
        }
        self.updated_at = now;
    }

    /// Return a task left running by a lost execution to active, scheduled
    /// from its next occurrence. Counters are untouched.
    pub(crate) fn recover_interrupted(&mut self, now: Timestamp, cron: &dyn CronEvaluator) {
        self.next_run_at = self.advance(now, cron);
        self.status = TaskStatus::Active;
        self.updated_at = now;
    }

    /// Next occurrence after the execution that just ended. Never earlier than
    /// the run's start, so a clock that jumped backwards cannot re-yield the
    /// slot that already fired.
    fn advance(&self, now: Timestamp, cron: &dyn CronEvaluator) -> Option<Timestamp> {
        let floor = self.last_run_at.map_or(now, |started| started.max(now));
        self.next_occurrence(floor, cron)
    }

    fn settle(&mut self, next: Option<Timestamp>, otherwise: TaskStatus) {
        self.next_run_at = next;
        self.status = if next.is_some() {
            TaskStatus::Active
        } else {
            otherwise
        };
    }
}
