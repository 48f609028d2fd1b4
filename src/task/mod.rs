//! Task records: identity, schedule, lifecycle status and run statistics.
//!
//! - `model`: `TaskRecord`, `TaskStatus`, creation and patch payloads
//! - `state`: the status state machine (pause, resume, execution outcomes)
//! - `query`: the runnable filter used by the scheduler

pub mod model;
pub mod query;
pub mod state;

pub use model::{NewTask, TaskId, TaskPatch, TaskRecord, TaskStatus};
pub use query::{runnable, sort_by_next_run};
pub use state::TaskTransition;
