//! Outcome reconciler: turns terminal stream events into state transitions.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::Coordinator;
use crate::engine::ExecutionOutcome;
use crate::error::{Error, ObserverError};
use crate::stream::{StreamMultiplexer, SubscriptionHandle, SubscriptionScope};
use crate::task::TaskId;

/// Running reconciler: an all-tasks stream observer plus the worker applying
/// outcomes in arrival order.
pub struct OutcomeReconciler {
    subscription: SubscriptionHandle,
    worker: JoinHandle<()>,
}

impl OutcomeReconciler {
    pub fn is_active(&self) -> bool {
        self.subscription.is_active()
    }

    /// Stop observing the stream. Outcomes already queued are dropped.
    pub fn shutdown(self) {
        self.subscription.unsubscribe();
        self.worker.abort();
    }
}

/// Subscribe to all tasks on the multiplexer's default channel and apply every
/// terminal event through `Coordinator::complete_execution`.
///
/// A duplicate terminal event is rejected by the state machine and only logged,
/// so run counters move once per execution. Events carry no execution id: a
/// duplicate delivered after the task's next run has started is taken as that
/// run's outcome.
pub fn spawn_outcome_reconciler(
    coordinator: Arc<Coordinator>,
    multiplexer: &StreamMultiplexer,
) -> OutcomeReconciler {
    let (tx, mut rx) = mpsc::unbounded_channel::<(TaskId, ExecutionOutcome)>();

    let subscription = multiplexer.subscribe(SubscriptionScope::AllTasks, move |event| {
        let Some(outcome) = event.outcome() else {
            return Ok(());
        };
        tx.send((event.task_id.clone(), outcome))
            .map_err(|_| ObserverError("outcome reconciler stopped".to_string()))
    });

    let worker = tokio::spawn(async move {
        while let Some((task_id, outcome)) = rx.recv().await {
            match coordinator.complete_execution(&task_id, outcome).await {
                Ok(_) => {}
                Err(Error::Transition(e)) => {
                    debug!(task_id = %task_id, error = %e, "Ignored outcome for task not running");
                }
                Err(Error::TaskNotFound { .. }) => {
                    debug!(task_id = %task_id, "Ignored outcome for unknown task");
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Failed to apply execution outcome");
                }
            }
        }
        info!("Outcome reconciler stopped");
    });

    OutcomeReconciler {
        subscription,
        worker,
    }
}
