//! Stream multiplexer: fans one transport listener per channel out to many
//! scoped observers.
//!
//! The first observer of a channel opens the transport listener and spawns a
//! pump task; later observers share it. When the last observer of a channel
//! unsubscribes the pump is aborted and the listener dropped.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::event::ExecutionEvent;
use super::transport::EventTransport;
use crate::error::ObserverError;
use crate::task::TaskId;

/// Observer callback. Errors and panics are contained per observer.
pub type EventCallback = Arc<dyn Fn(&ExecutionEvent) -> Result<(), ObserverError> + Send + Sync>;

/// Which events an observer wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionScope {
    AllTasks,
    TaskId(TaskId),
}

impl SubscriptionScope {
    pub fn matches(&self, task_id: &TaskId) -> bool {
        match self {
            Self::AllTasks => true,
            Self::TaskId(id) => id == task_id,
        }
    }
}

struct Observer {
    id: u64,
    scope: SubscriptionScope,
    callback: EventCallback,
    active: AtomicBool,
}

#[derive(Default)]
struct ChannelState {
    observers: Vec<Arc<Observer>>,
    pump: Option<JoinHandle<()>>,
}

impl ChannelState {
    fn is_pumping(&self) -> bool {
        self.pump.as_ref().is_some_and(|pump| !pump.is_finished())
    }
}

struct Inner {
    transport: Arc<dyn EventTransport>,
    default_channel: String,
    channels: Mutex<HashMap<String, ChannelState>>,
    next_id: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let channels = self.channels.get_mut().unwrap_or_else(|e| e.into_inner());
        for state in channels.values() {
            if let Some(pump) = &state.pump {
                pump.abort();
            }
        }
    }
}

/// Demultiplexes execution events to per-task and all-task observers.
#[derive(Clone)]
pub struct StreamMultiplexer {
    inner: Arc<Inner>,
}

impl StreamMultiplexer {
    pub fn new(transport: Arc<dyn EventTransport>, default_channel: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                default_channel: default_channel.into(),
                channels: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn default_channel(&self) -> &str {
        &self.inner.default_channel
    }

    /// Subscribe on the default channel.
    pub fn subscribe<F>(&self, scope: SubscriptionScope, callback: F) -> SubscriptionHandle
    where
        F: Fn(&ExecutionEvent) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        let channel = self.inner.default_channel.clone();
        self.subscribe_channel(&channel, scope, callback)
    }

    /// Subscribe on `channel`.
    ///
    /// Always returns a handle. When the transport refuses the channel or no
    /// Tokio runtime is running, the handle is inert and its callback is never
    /// invoked.
    pub fn subscribe_channel<F>(
        &self,
        channel: &str,
        scope: SubscriptionScope,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(&ExecutionEvent) -> Result<(), ObserverError> + Send + Sync + 'static,
    {
        let observer = Arc::new(Observer {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            scope,
            callback: Arc::new(callback),
            active: AtomicBool::new(true),
        });

        let mut channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());

        let needs_pump = channels.get(channel).is_none_or(|state| !state.is_pumping());
        let pump = if needs_pump {
            match self.open(channel) {
                Some(pump) => Some(pump),
                None => {
                    observer.active.store(false, Ordering::SeqCst);
                    return SubscriptionHandle {
                        channel: channel.to_string(),
                        observer,
                        inner: Weak::new(),
                    };
                }
            }
        } else {
            None
        };

        let state = channels.entry(channel.to_string()).or_default();
        if let Some(pump) = pump {
            state.pump = Some(pump);
        }
        state.observers.push(observer.clone());

        debug!(
            channel = %channel,
            observer = observer.id,
            scope = ?observer.scope,
            observers = state.observers.len(),
            "Stream observer subscribed"
        );

        SubscriptionHandle {
            channel: channel.to_string(),
            observer,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered observers on `channel`.
    pub fn observer_count(&self, channel: &str) -> usize {
        let channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(channel).map_or(0, |state| state.observers.len())
    }

    /// Whether a transport listener is open on `channel`.
    pub fn is_listening(&self, channel: &str) -> bool {
        let channels = self.inner.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(channel).is_some_and(ChannelState::is_pumping)
    }

    fn open(&self, channel: &str) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(channel = %channel, "No async runtime, stream subscription is inactive");
                return None;
            }
        };
        let Some(rx) = self.inner.transport.listen(channel) else {
            warn!(channel = %channel, "Transport unavailable, stream subscription is inactive");
            return None;
        };

        info!(channel = %channel, "Opened stream listener");
        Some(runtime.spawn(pump(
            rx,
            Arc::downgrade(&self.inner),
            channel.to_string(),
        )))
    }
}

impl Inner {
    fn unsubscribe(&self, channel: &str, observer_id: u64) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        let Some(state) = channels.get_mut(channel) else {
            return;
        };
        state.observers.retain(|o| o.id != observer_id);
        debug!(
            channel = %channel,
            observer = observer_id,
            remaining = state.observers.len(),
            "Stream observer unsubscribed"
        );

        if state.observers.is_empty() {
            if let Some(pump) = state.pump.take() {
                pump.abort();
            }
            channels.remove(channel);
            info!(channel = %channel, "Closed stream listener");
        }
    }

    fn dispatch(&self, channel: &str, event: &ExecutionEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking.
        let observers: Vec<Arc<Observer>> = {
            let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            match channels.get(channel) {
                Some(state) => state.observers.clone(),
                None => return,
            }
        };

        for observer in observers {
            if !observer.active.load(Ordering::SeqCst) || !observer.scope.matches(&event.task_id) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (observer.callback)(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        channel = %channel,
                        observer = observer.id,
                        task_id = %event.task_id,
                        error = %e,
                        "Stream observer failed"
                    );
                }
                Err(_) => {
                    warn!(
                        channel = %channel,
                        observer = observer.id,
                        task_id = %event.task_id,
                        "Stream observer panicked"
                    );
                }
            }
        }
    }
}

/// Deliver every event on `channel` until the transport closes or the
/// multiplexer is dropped.
///
/// A receiver that falls more than the transport's capacity behind skips the
/// oldest events and carries on. Skipped events are gone for every observer,
/// terminal ones included, so a task whose completion was skipped stays
/// running until it is recovered on the next `Coordinator::load`.
async fn pump(
    mut rx: broadcast::Receiver<ExecutionEvent>,
    inner: Weak<Inner>,
    channel: String,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.dispatch(&channel, &event);
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(channel = %channel, missed, "Stream listener lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(channel = %channel, "Stream transport closed");
                break;
            }
        }
    }
}

/// Handle to one observer registration.
///
/// Dropping the handle does not unsubscribe; call [`unsubscribe`](Self::unsubscribe).
pub struct SubscriptionHandle {
    channel: String,
    observer: Arc<Observer>,
    inner: Weak<Inner>,
}

impl SubscriptionHandle {
    /// Stop delivering events to this observer. Idempotent; other observers
    /// are unaffected.
    pub fn unsubscribe(&self) {
        if !self.observer.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            inner.unsubscribe(&self.channel, self.observer.id);
        }
    }

    /// Whether the callback can still be invoked.
    pub fn is_active(&self) -> bool {
        self.observer.active.load(Ordering::SeqCst)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn scope(&self) -> &SubscriptionScope {
        &self.observer.scope
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("channel", &self.channel)
            .field("observer", &self.observer.id)
            .field("scope", &self.observer.scope)
            .field("active", &self.is_active())
            .finish()
    }
}
