//! Event types for the request lifecycle
//!
//! The lifecycle emits these as it talks to the server so that callers can
//! show progress (e.g. "waiting for approval") without parsing log output.
//! Events are one-way notifications: the lifecycle awaits the callback but
//! never changes course because of it.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use unlocked_common::RequestState;

/// Events emitted by the lifecycle while a key request is processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The request moved to a new state.
    StateChanged {
        /// Server-assigned id, if already known
        id: Option<u64>,
        from: RequestState,
        to: RequestState,
    },

    /// The request is still pending; the next poll follows after `interval`.
    PollWaiting {
        id: u64,
        /// Number of state queries made so far
        attempt: u32,
        interval: Duration,
    },
}

/// Async callback for receiving lifecycle events
pub type EventCallback =
    Box<dyn Fn(LifecycleEvent) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
