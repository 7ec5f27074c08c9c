//! The five signals (spec §6) not already owned by `envelope_core::dispatch`
//! (which fires `incoming_websocket_message`/`incoming_internal_message`/
//! `outgoing_websocket_message`/`outgoing_websocket_error`). These are fired
//! by the consumer session and the job pipeline, so they live here rather
//! than in the core crate.

use std::sync::Mutex;

use envelope_core::app_state::AppStateCollector;
use envelope_core::signals::Channel;

pub struct ConsumerConnectedEvent {
    pub channel_name: String,
    pub user_pk: Option<i64>,
}

pub struct ConsumerClosedEvent {
    pub channel_name: String,
    pub user_pk: Option<i64>,
    pub close_code: Option<u16>,
}

/// Fired while a `channel.subscribe` job holds the group membership open;
/// listeners append bootstrap messages to `app_state` (spec §4.7). The
/// collector is behind a `Mutex` so listeners can push through a shared
/// `&ChannelSubscribedEvent` without the bus needing `&mut` events.
pub struct ChannelSubscribedEvent {
    pub channel_type: String,
    pub pk: i64,
    pub user_pk: Option<i64>,
    pub app_state: Mutex<AppStateCollector>,
}

pub struct ConnectionCreatedEvent {
    pub user_pk: i64,
    pub channel_name: String,
}

pub struct ConnectionClosedEvent {
    pub user_pk: i64,
    pub channel_name: String,
}

#[derive(Default)]
pub struct SignalBus {
    pub consumer_connected: Channel<ConsumerConnectedEvent>,
    pub consumer_closed: Channel<ConsumerClosedEvent>,
    pub channel_subscribed: Channel<ChannelSubscribedEvent>,
    pub connection_created: Channel<ConnectionCreatedEvent>,
    pub connection_closed: Channel<ConnectionClosedEvent>,
}
