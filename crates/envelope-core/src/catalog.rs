//! Built-in message payload shapes (spec §6's minimum catalog). The
//! behavioral handlers for the `channel.*` family live in
//! `services/server` since they need the pub/sub and job-pipeline
//! machinery; this module only carries the wire shapes and registers the
//! handler-free ones (ping/pong).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::EnvelopeKind;
use crate::error::EnvelopeError;
use crate::handler::{AsyncRunnable, SessionHandle};
use crate::message::MessageMeta;
use crate::registry::{CatalogBuilder, MessageDescriptor};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribeRequest {
    pub channel_type: String,
    pub pk: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscribedReply {
    pub channel_type: String,
    pub pk: i64,
    pub channel_name: String,
    pub app_state: Option<Vec<crate::app_state::AppStateEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeaveRequest {
    pub channel_type: String,
    pub pk: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeftReply {
    pub channel_type: String,
    pub pk: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionEntry {
    pub channel_type: String,
    pub pk: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubscriptionsReply {
    pub subscriptions: Vec<SubscriptionEntry>,
}

/// `s.batch` payload-list shape (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchPayloadList {
    pub t: String,
    pub payloads: Vec<Option<Value>>,
}

/// `s.batch` tabular shape (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchTabular {
    pub t: String,
    pub common: Value,
    pub keys: Vec<String>,
    pub values: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressNum {
    pub current: u64,
    pub total: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stat {
    pub name: String,
    pub value: f64,
}

/// `s.ping` / `s.pong` — the only built-in with zero moving parts: it just
/// echoes the correlation id back with `s=success` (spec §8 scenario 1).
pub struct PingHandler;

#[async_trait]
impl AsyncRunnable for PingHandler {
    async fn run(
        &self,
        _payload: Option<Value>,
        meta: &MessageMeta,
        session: &dyn SessionHandle,
    ) -> Result<(), EnvelopeError> {
        session.send_ws_message("s.pong", None, meta);
        Ok(())
    }
}

/// Marker handler for descriptors registered purely so their `allow_batch`
/// flag is discoverable on the outgoing side (spec §4.9); the dispatcher
/// never looks up `EnvelopeKind::Outgoing`, so `run` is unreachable.
struct OutgoingOnly;

#[async_trait]
impl AsyncRunnable for OutgoingOnly {
    async fn run(&self, _payload: Option<Value>, _meta: &MessageMeta, _session: &dyn SessionHandle) -> Result<(), EnvelopeError> {
        Err(EnvelopeError::Generic { message: "outgoing-only message type dispatched as incoming".to_owned() })
    }
}

/// Register the built-ins that need no application wiring, plus outgoing
/// descriptors carrying nothing but `allow_batch` metadata for the
/// transactional sender (§4.9). `channel.*` command handlers are
/// registered by the server binary alongside the pub/sub layer they
/// depend on.
pub fn register_builtins(builder: &mut CatalogBuilder) {
    builder.register(MessageDescriptor::runnable(
        "s.ping",
        vec![EnvelopeKind::Incoming, EnvelopeKind::Internal],
        std::sync::Arc::new(PingHandler),
    ));

    let outgoing = std::sync::Arc::new(OutgoingOnly);
    builder.register(MessageDescriptor::runnable("s.pong", vec![EnvelopeKind::Outgoing], outgoing.clone()));
    builder.register(MessageDescriptor::runnable("channel.subscribed", vec![EnvelopeKind::Outgoing], outgoing.clone()));
    builder.register(MessageDescriptor::runnable("channel.left", vec![EnvelopeKind::Outgoing], outgoing.clone()));
    builder.register(MessageDescriptor::runnable("channel.subscriptions", vec![EnvelopeKind::Outgoing], outgoing.clone()));
    builder.register(
        MessageDescriptor::runnable("progress.num", vec![EnvelopeKind::Outgoing], outgoing.clone()).allow_batch(true),
    );
    builder.register(MessageDescriptor::runnable("s.stat", vec![EnvelopeKind::Outgoing], outgoing).allow_batch(true));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_is_registered_for_incoming_and_internal() {
        let mut builder = CatalogBuilder::new();
        register_builtins(&mut builder);
        let catalog = builder.freeze();
        assert!(catalog.lookup(EnvelopeKind::Incoming, "s.ping").is_some());
        assert!(catalog.lookup(EnvelopeKind::Internal, "s.ping").is_some());
    }

    #[test]
    fn batchable_outgoing_types_are_discoverable_by_the_transactional_sender() {
        let mut builder = CatalogBuilder::new();
        register_builtins(&mut builder);
        let catalog = builder.freeze();
        assert!(catalog.lookup(EnvelopeKind::Outgoing, "progress.num").unwrap().allow_batch);
        assert!(catalog.lookup(EnvelopeKind::Outgoing, "s.stat").unwrap().allow_batch);
        assert!(!catalog.lookup(EnvelopeKind::Outgoing, "channel.subscribed").unwrap().allow_batch);
    }
}
