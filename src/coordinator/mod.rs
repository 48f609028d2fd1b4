//! Execution control facade.
//!
//! `Coordinator` owns the in-memory task table and is the only writer of task
//! state. Every mutation for a task goes through that task's gate, is written
//! to the store, and only then committed to the table.
//!
//! - `ticker`: periodic scheduler loop starting runnable tasks
//! - `reconciler`: applies terminal stream events as execution outcomes

pub mod reconciler;
pub mod ticker;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::engine::{ExecutionEngine, ExecutionOutcome, StartAck};
use crate::error::{Error, Result, TransitionError, ValidationError};
use crate::schedule::{CronEvaluator, Timestamp};
use crate::store::TaskStore;
use crate::task::{NewTask, TaskId, TaskPatch, TaskRecord, TaskStatus, TaskTransition};

pub use reconciler::{OutcomeReconciler, spawn_outcome_reconciler};
pub use ticker::{dispatch_due, spawn_scheduler_ticker};

/// Result of a manual run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunNowOutcome {
    /// The engine accepted the start; the task is now running.
    Started(TaskRecord),
    /// An execution was already in flight; nothing new was started.
    AlreadyRunning,
}

/// Result of `steer_or_start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SteerOutcome {
    /// The instruction reached the in-flight execution.
    Steered,
    /// Nothing was running; a new execution was started with the instruction
    /// as its input.
    Started(TaskRecord),
    /// An execution is in flight but could not take the instruction.
    AlreadyRunning,
}

pub struct Coordinator {
    store: Arc<dyn TaskStore>,
    engine: Arc<dyn ExecutionEngine>,
    cron: Arc<dyn CronEvaluator>,
    clock: Arc<dyn Clock>,
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
    gates: std::sync::Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        engine: Arc<dyn ExecutionEngine>,
        cron: Arc<dyn CronEvaluator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            engine,
            cron,
            clock,
            tasks: RwLock::new(HashMap::new()),
            gates: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Hydrate the task table from the store. Returns the number of tasks.
    ///
    /// Tasks stored as running belong to executions from a previous process
    /// whose outcome will never arrive. They are returned to active with their
    /// next occurrence recomputed, and the repair is written back to the store.
    pub async fn load(&self) -> Result<usize> {
        let mut stored = self.store.list().await?;
        let now = self.now();
        for task in stored.iter_mut().filter(|t| t.is_running()) {
            task.recover_interrupted(now, self.cron.as_ref());
            self.store.update(task).await?;
            info!(
                task_id = %task.id,
                next_run_at = ?task.next_run_at,
                "Recovered task interrupted while running"
            );
        }

        let count = stored.len();
        let mut tasks = self.tasks.write().await;
        tasks.clear();
        tasks.extend(stored.into_iter().map(|t| (t.id.clone(), t)));
        info!(count, "Loaded tasks from store");
        Ok(count)
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now_ms()
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub async fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.tasks.read().await.get(id).cloned()
    }

    /// All tasks, oldest first.
    pub async fn list(&self) -> Vec<TaskRecord> {
        let mut tasks: Vec<TaskRecord> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    pub async fn list_by_status(&self, status: TaskStatus) -> Vec<TaskRecord> {
        let mut tasks = self.list().await;
        tasks.retain(|t| t.status == status);
        tasks
    }

    /// Active tasks due at `now`, soonest first.
    pub async fn runnable(&self, now: Timestamp) -> Vec<TaskRecord> {
        let tasks = self.list().await;
        crate::task::runnable(&tasks, now)
            .into_iter()
            .cloned()
            .collect()
    }

    // ── Mutations ───────────────────────────────────────────────────

    pub async fn create(&self, new: NewTask) -> Result<TaskRecord> {
        if let Some(id) = &new.id {
            if self.tasks.read().await.contains_key(id) {
                return Err(ValidationError::DuplicateId { id: id.clone() }.into());
            }
        }
        let task = TaskRecord::create(new, self.now(), self.cron.as_ref())?;

        let gate = self.gate(&task.id);
        let _guard = gate.lock().await;
        self.store.create(&task).await?;
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());

        info!(
            task_id = %task.id,
            name = %task.name,
            schedule = task.schedule.type_tag(),
            next_run_at = ?task.next_run_at,
            "Task created"
        );
        Ok(task)
    }

    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<TaskRecord> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;

        let mut task = self.snapshot(id).await?;
        task.apply_patch(patch, self.now(), self.cron.as_ref())?;
        let task = self.commit(task).await?;

        info!(task_id = %id, status = %task.status, next_run_at = ?task.next_run_at, "Task updated");
        Ok(task)
    }

    /// Delete a task. Returns `false` when it does not exist; a running task
    /// is rejected.
    pub async fn delete(&self, id: &TaskId) -> Result<bool> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;

        let Some(task) = self.get(id).await else {
            return Ok(false);
        };
        if task.is_running() {
            return Err(TransitionError::TaskRunning {
                id: id.clone(),
                operation: "delete",
            }
            .into());
        }

        self.store.delete(id).await?;
        self.tasks.write().await.remove(id);
        self.gates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);

        info!(task_id = %id, "Task deleted");
        Ok(true)
    }

    pub async fn pause(&self, id: &TaskId) -> Result<TaskRecord> {
        self.transition(id, TaskTransition::Pause).await
    }

    pub async fn resume(&self, id: &TaskId) -> Result<TaskRecord> {
        self.transition(id, TaskTransition::Resume).await
    }

    /// Start an execution now, outside the schedule.
    pub async fn run_now(&self, id: &TaskId) -> Result<RunNowOutcome> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let task = self.snapshot(id).await?;
        self.start_locked(task, None).await
    }

    /// Start a scheduled execution if the task is still runnable at `now`.
    /// Returns `None` when it was paused, started or advanced past `now` since
    /// the caller last looked.
    pub async fn run_if_due(&self, id: &TaskId, now: Timestamp) -> Result<Option<RunNowOutcome>> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let task = self.snapshot(id).await?;
        if !task.is_runnable(now) {
            debug!(
                task_id = %id,
                status = %task.status,
                next_run_at = ?task.next_run_at,
                "Run skipped, no longer due"
            );
            return Ok(None);
        }
        self.start_locked(task, None).await.map(Some)
    }

    /// Like `run_now`, overriding the task's input for this execution.
    pub async fn run_now_with_input(&self, id: &TaskId, input: &str) -> Result<RunNowOutcome> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;
        let task = self.snapshot(id).await?;
        self.start_locked(task, Some(input)).await
    }

    /// Ask the engine to stop the running execution. Returns `false` when the
    /// task is not running. The task stays running until the engine reports
    /// the cancellation.
    pub async fn cancel(&self, id: &TaskId) -> Result<bool> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;

        let task = self.snapshot(id).await?;
        if !task.is_running() {
            debug!(task_id = %id, status = %task.status, "Cancel ignored, task not running");
            return Ok(false);
        }
        self.engine.cancel(id).await?;
        info!(task_id = %id, "Cancellation requested");
        Ok(true)
    }

    /// Deliver an instruction to the running execution. Returns `false` when
    /// the task is not running or the engine could not deliver it.
    pub async fn steer(&self, id: &TaskId, instruction: &str) -> Result<bool> {
        let task = self.snapshot(id).await?;
        if !task.is_running() {
            return Ok(false);
        }
        let delivered = self.engine.steer(id, instruction).await?;
        info!(task_id = %id, delivered, "Steer requested");
        Ok(delivered)
    }

    /// Steer the running execution, or start one with `instruction` as input
    /// when nothing is running.
    pub async fn steer_or_start(&self, id: &TaskId, instruction: &str) -> Result<SteerOutcome> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;

        let task = self.snapshot(id).await?;
        if task.is_running() {
            if self.engine.steer(id, instruction).await? {
                info!(task_id = %id, "Instruction steered into running execution");
                return Ok(SteerOutcome::Steered);
            }
            warn!(task_id = %id, "Task running but engine could not take the instruction");
            return Ok(SteerOutcome::AlreadyRunning);
        }

        match self.start_locked(task, Some(instruction)).await? {
            RunNowOutcome::Started(task) => Ok(SteerOutcome::Started(task)),
            RunNowOutcome::AlreadyRunning => Ok(SteerOutcome::AlreadyRunning),
        }
    }

    /// Apply a terminal outcome reported by the engine.
    pub async fn complete_execution(
        &self,
        id: &TaskId,
        outcome: ExecutionOutcome,
    ) -> Result<TaskRecord> {
        let label = outcome.label();
        let task = self.transition(id, outcome.transition()).await?;
        info!(
            task_id = %id,
            outcome = label,
            status = %task.status,
            next_run_at = ?task.next_run_at,
            success_count = task.success_count,
            failure_count = task.failure_count,
            "Execution finished"
        );
        Ok(task)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn gate(&self, id: &TaskId) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates.entry(id.clone()).or_default().clone()
    }

    async fn snapshot(&self, id: &TaskId) -> Result<TaskRecord> {
        self.get(id)
            .await
            .ok_or_else(|| Error::TaskNotFound { id: id.clone() })
    }

    async fn commit(&self, task: TaskRecord) -> Result<TaskRecord> {
        self.store.update(&task).await?;
        self.tasks
            .write()
            .await
            .insert(task.id.clone(), task.clone());
        Ok(task)
    }

    async fn transition(&self, id: &TaskId, transition: TaskTransition) -> Result<TaskRecord> {
        let gate = self.gate(id);
        let _guard = gate.lock().await;

        let mut task = self.snapshot(id).await?;
        let event = transition.name();
        let from = task.status;
        task.apply(transition, self.now(), self.cron.as_ref())?;
        let task = self.commit(task).await?;

        debug!(task_id = %id, event, from = %from, to = %task.status, "Task transitioned");
        Ok(task)
    }

    /// Caller holds the task's gate.
    async fn start_locked(&self, task: TaskRecord, input: Option<&str>) -> Result<RunNowOutcome> {
        if task.is_running() {
            debug!(task_id = %task.id, "Run skipped, already running");
            return Ok(RunNowOutcome::AlreadyRunning);
        }

        let mut running = task;
        running.apply(TaskTransition::BeginExecution, self.now(), self.cron.as_ref())?;

        match self.engine.start(&running, input).await? {
            StartAck::Accepted => {
                let task = self.commit(running).await?;
                info!(task_id = %task.id, name = %task.name, "Execution started");
                Ok(RunNowOutcome::Started(task))
            }
            StartAck::AlreadyRunning => {
                warn!(task_id = %running.id, "Engine already running task, marking it running");
                self.commit(running).await?;
                Ok(RunNowOutcome::AlreadyRunning)
            }
        }
    }
}
