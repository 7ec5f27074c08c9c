//! Event bus (spec §9 Design Notes: "consolidate into a single event bus
//! with cooperative and blocking subscribers declared"). Cooperative
//! listeners run inline on the firing task; blocking listeners are meant to
//! be dispatched to a worker pool by the caller (the bus itself only
//! enforces the declared shape — it does not own a thread pool).

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// The nine named signals from spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    ConsumerConnected,
    ConsumerClosed,
    IncomingWebsocketMessage,
    OutgoingWebsocketMessage,
    OutgoingWebsocketError,
    IncomingInternalMessage,
    ChannelSubscribed,
    ConnectionCreated,
    ConnectionClosed,
}

/// A listener must declare which tier it belongs to. Cooperative listeners
/// may only be attached to signals fired from a session task; blocking
/// listeners may only be attached to signals fired from a worker (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerShape {
    Cooperative,
    Blocking,
}

pub trait Listener<T>: Send + Sync {
    fn shape(&self) -> ListenerShape;
    fn call(&self, event: &T);
}

/// A typed fan-out point for one signal's payload type `T`. `EventBus`
/// below composes nine of these, one per `SignalKind`.
pub struct Channel<T> {
    listeners: RwLock<Vec<Arc<dyn Listener<T>>>>,
}

impl<T> Default for Channel<T> {
    fn default() -> Self {
        Channel { listeners: RwLock::new(Vec::new()) }
    }
}

impl<T> Channel<T> {
    pub fn connect(&self, listener: Arc<dyn Listener<T>>) {
        self.listeners.write().expect("signal listener lock poisoned").push(listener);
    }

    /// Fire the signal. `expected_shape` is the tier the caller is running
    /// on; a listener declared for the other tier is skipped with a
    /// `tracing` warning rather than silently run on the wrong tier.
    pub fn fire(&self, event: &T, expected_shape: ListenerShape) {
        let listeners = self.listeners.read().expect("signal listener lock poisoned");
        for listener in listeners.iter() {
            if listener.shape() != expected_shape {
                tracing::warn!(
                    "signal listener shape mismatch: expected {:?}, listener declares {:?} — skipped",
                    expected_shape,
                    listener.shape()
                );
                continue;
            }
            listener.call(event);
        }
    }
}
