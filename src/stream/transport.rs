//! Event transports: where the multiplexer gets its raw event stream from.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;
use tracing::debug;

use super::event::ExecutionEvent;

/// Source of raw execution events, one stream per named channel.
pub trait EventTransport: Send + Sync {
    /// Open a listener on `channel`. `None` when the transport cannot deliver
    /// events (no engine attached, channel refused).
    fn listen(&self, channel: &str) -> Option<broadcast::Receiver<ExecutionEvent>>;
}

/// In-process transport: one `broadcast` channel per name, created on demand.
pub struct BroadcastTransport {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<ExecutionEvent>>>,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<ExecutionEvent> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Publish an event on `channel`. Returns how many listeners received it;
    /// zero listeners is not an error.
    pub fn emit(&self, channel: &str, event: ExecutionEvent) -> usize {
        let sender = self.sender(channel);
        match sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(channel = %channel, "Event emitted with no listeners");
                0
            }
        }
    }

    /// Number of open listeners on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.get(channel).map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for BroadcastTransport {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BROADCAST_CAPACITY)
    }
}

impl EventTransport for BroadcastTransport {
    fn listen(&self, channel: &str) -> Option<broadcast::Receiver<ExecutionEvent>> {
        Some(self.sender(channel).subscribe())
    }
}

/// Transport with nothing behind it. Every `listen` returns `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedTransport;

impl EventTransport for DetachedTransport {
    fn listen(&self, _channel: &str) -> Option<broadcast::Receiver<ExecutionEvent>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::EventKind;

    #[tokio::test]
    async fn emit_reaches_listeners_on_the_same_channel_only() {
        let transport = BroadcastTransport::new(8);
        let mut a = transport.listen("a").unwrap();
        let mut b = transport.listen("b").unwrap();

        let event = ExecutionEvent::new("t1", 1, EventKind::Turn { iteration: 1 });
        assert_eq!(transport.emit("a", event.clone()), 1);
        assert_eq!(a.recv().await.unwrap(), event);
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn emit_without_listeners_is_fine() {
        let transport = BroadcastTransport::new(8);
        let event = ExecutionEvent::new("t1", 1, EventKind::Turn { iteration: 1 });
        assert_eq!(transport.emit("nobody", event), 0);
        assert_eq!(transport.listener_count("nobody"), 0);
    }

    #[test]
    fn detached_transport_never_listens() {
        assert!(DetachedTransport.listen("any").is_none());
    }
}
