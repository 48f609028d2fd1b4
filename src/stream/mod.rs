//! Execution event streaming.
//!
//! - `event`: `ExecutionEvent` and its tagged `EventKind`
//! - `transport`: the `EventTransport` seam plus broadcast/detached transports
//! - `multiplexer`: one listener per channel fanned out to scoped observers

pub mod event;
pub mod multiplexer;
pub mod transport;

pub use event::{EventKind, ExecutionEvent};
pub use multiplexer::{EventCallback, StreamMultiplexer, SubscriptionHandle, SubscriptionScope};
pub use transport::{BroadcastTransport, DetachedTransport, EventTransport};
