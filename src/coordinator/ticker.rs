//! Scheduler ticker: periodically starts runnable tasks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{Coordinator, RunNowOutcome};
use crate::task::TaskStatus;

/// Start every runnable task, soonest first, while fewer than
/// `max_concurrent` executions are in flight. Returns how many were started.
///
/// Each task is re-checked under its gate, so one that ran and advanced
/// after the scan is not started again.
pub async fn dispatch_due(coordinator: &Coordinator, max_concurrent: usize) -> usize {
    let now = coordinator.now();
    let due = coordinator.runnable(now).await;
    if due.is_empty() {
        return 0;
    }

    let in_flight = coordinator.list_by_status(TaskStatus::Running).await.len();
    let mut capacity = max_concurrent.saturating_sub(in_flight);
    let mut started = 0;

    for task in due {
        if capacity == 0 {
            warn!(task_id = %task.id, in_flight, max_concurrent, "Skipped: max concurrent runs reached");
            continue;
        }

        match coordinator.run_if_due(&task.id, now).await {
            Ok(Some(RunNowOutcome::Started(_))) => {
                started += 1;
                capacity -= 1;
            }
            Ok(Some(RunNowOutcome::AlreadyRunning)) => {
                debug!(task_id = %task.id, "Scheduled run skipped, already running");
            }
            Ok(None) => {}
            Err(e) if e.is_rejection() => {
                // Paused or removed between the scan and the start.
                debug!(task_id = %task.id, error = %e, "Scheduled run rejected");
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to start scheduled run");
            }
        }
    }

    if started > 0 {
        info!(started, "Started scheduled runs");
    }
    started
}

/// Spawn the periodic scheduler loop.
pub fn spawn_scheduler_ticker(
    coordinator: Arc<Coordinator>,
    interval: Duration,
    max_concurrent: usize,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            dispatch_due(&coordinator, max_concurrent).await;
        }
    })
}
