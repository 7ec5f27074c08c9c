//! Pub/Sub Channels (spec component F). `PubSubChannel` wraps the layer's
//! group primitives; `ContextChannel` adds the entity + permission-check
//! behavior that only subscribe/leave commands may target (spec §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use envelope_core::envelope::{self, Envelope, EnvelopeKind, EnvelopeState, Transport};
use envelope_core::error::EnvelopeError;
use envelope_core::layer::ChannelLayer;
use envelope_core::message::MessageMeta;
use serde_json::Value;

use crate::sender::{BufferedSend, SendTarget, TransactionSender};

/// A generic fan-out group over the layer, identified by a globally unique
/// `channel_name` (spec §4.6). Joined via server-side signals, never via
/// the wire-level subscribe commands.
pub struct PubSubChannel {
    pub channel_name: String,
    pub envelope_kind: EnvelopeKind,
}

impl PubSubChannel {
    pub fn new(channel_name: impl Into<String>) -> Self {
        PubSubChannel { channel_name: channel_name.into(), envelope_kind: EnvelopeKind::Outgoing }
    }

    pub async fn subscribe(&self, layer: &dyn ChannelLayer, member_channel_name: &str) -> Result<(), EnvelopeError> {
        layer.group_add(&self.channel_name, member_channel_name).await
    }

    pub async fn leave(&self, layer: &dyn ChannelLayer, member_channel_name: &str) -> Result<(), EnvelopeError> {
        layer.group_discard(&self.channel_name, member_channel_name).await
    }

    /// Pack `{tag, payload}` through the configured envelope kind and fan it
    /// out to every current group member (spec §4.6).
    pub async fn publish(&self, layer: &dyn ChannelLayer, tag: &str, payload: Option<Value>) -> Result<(), EnvelopeError> {
        let envelope = Envelope {
            kind: self.envelope_kind,
            t: tag.to_owned(),
            p: payload,
            i: None,
            s: Some(EnvelopeState::Success),
            l: None,
        };
        let layer_payload = envelope::to_layer_payload(&envelope, Transport::Text, envelope::routing_tag::WEBSOCKET_SEND)?;
        layer.group_send(&self.channel_name, layer_payload).await
    }

    /// As `publish`, but routed through a job's transactional sender rather
    /// than delivered immediately when `on_commit` is set — the group
    /// fan-out counterpart of `JobContext::send_to_origin` (spec §4.6:
    /// `sync_publish(msg, on_commit=true)`). The whole group is buffered
    /// under one `SendTarget::Group` key, so a group-wide batch is flushed
    /// as a single coalesced send on commit rather than per-member.
    pub async fn sync_publish(
        &self,
        layer: &dyn ChannelLayer,
        sender: &TransactionSender,
        tag: &str,
        payload: Option<Value>,
        meta: &MessageMeta,
        allow_batch: bool,
        on_commit: bool,
    ) -> Result<(), EnvelopeError> {
        let send = BufferedSend {
            tag: tag.to_owned(),
            payload,
            meta: meta.clone(),
            target: SendTarget::Group(self.channel_name.clone()),
            envelope_kind: self.envelope_kind,
            state: EnvelopeState::Success,
            allow_batch,
        };
        if on_commit {
            sender.buffer(send);
            Ok(())
        } else {
            TransactionSender::send_immediate(layer, &send).await
        }
    }
}

/// Deterministic channel name for a `(channel_type, pk)` context channel
/// (spec §4.6: `"<kind>_<pk>"`).
pub fn channel_name(channel_type: &str, pk: i64) -> String {
    format!("{channel_type}_{pk}")
}

/// Permission policy for a context channel type. Default: allow any
/// authenticated user (spec §4.6, §8 invariant: "with no permission
/// declared, `allow_subscribe(u)` is true iff `u` is non-null").
pub trait ContextChannelPolicy: Send + Sync {
    fn allow_subscribe(&self, pk: i64, user_pk: Option<i64>) -> bool {
        let _ = pk;
        user_pk.is_some()
    }
}

pub struct DefaultPolicy;
impl ContextChannelPolicy for DefaultPolicy {}

/// Only the channel's own pk may subscribe — the built-in policy for the
/// `user` channel type (spec §8 scenarios 4 & 5).
pub struct OwnPkPolicy;
impl ContextChannelPolicy for OwnPkPolicy {
    fn allow_subscribe(&self, pk: i64, user_pk: Option<i64>) -> bool {
        user_pk == Some(pk)
    }
}

/// Per-`channel_type` permission policies, built once at startup alongside
/// the message catalog (spec §9: explicit startup registration, no runtime
/// mutation).
pub struct ContextChannelRegistry {
    policies: HashMap<String, Arc<dyn ContextChannelPolicy>>,
}

impl Default for ContextChannelRegistry {
    fn default() -> Self {
        let mut policies: HashMap<String, Arc<dyn ContextChannelPolicy>> = HashMap::new();
        policies.insert("user".to_owned(), Arc::new(OwnPkPolicy));
        ContextChannelRegistry { policies }
    }
}

impl ContextChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, channel_type: impl Into<String>, policy: Arc<dyn ContextChannelPolicy>) {
        self.policies.insert(channel_type.into(), policy);
    }

    pub fn policy_for(&self, channel_type: &str) -> Arc<dyn ContextChannelPolicy> {
        self.policies.get(channel_type).cloned().unwrap_or_else(|| Arc::new(DefaultPolicy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use envelope_core::envelope::EnvelopeKind as EK;
    use envelope_test_support::InMemoryLayer;

    use crate::sender::PayloadListBatch;

    fn meta() -> MessageMeta {
        MessageMeta {
            id: None,
            user_pk: Some(7),
            consumer_name: "worker".to_owned(),
            language: None,
            state: None,
            envelope_kind: EK::Internal,
        }
    }

    #[tokio::test]
    async fn sync_publish_on_commit_buffers_rather_than_sends_immediately() {
        let layer = InMemoryLayer::new();
        let mut rx = layer.register("member-1");
        layer.group_add("room_1", "member-1").await.unwrap();
        let channel = PubSubChannel::new("room_1");
        let sender = TransactionSender::new();

        channel
            .sync_publish(&layer, &sender, "s.stat", None, &meta(), false, true)
            .await
            .unwrap();

        assert!(rx.try_recv().is_err(), "buffered send must not be delivered before flush");
        sender.flush(&layer, &PayloadListBatch).await.unwrap();
        assert!(rx.try_recv().is_ok(), "flush delivers the buffered group send");
    }

    #[tokio::test]
    async fn sync_publish_without_commit_delivers_immediately() {
        let layer = InMemoryLayer::new();
        let mut rx = layer.register("member-1");
        layer.group_add("room_1", "member-1").await.unwrap();
        let channel = PubSubChannel::new("room_1");
        let sender = TransactionSender::new();

        channel
            .sync_publish(&layer, &sender, "s.stat", None, &meta(), false, false)
            .await
            .unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(sender.is_empty());
    }

    #[test]
    fn channel_name_matches_kind_pk_convention() {
        assert_eq!(channel_name("user", 7), "user_7");
    }

    #[test]
    fn own_pk_policy_allows_only_the_channels_own_pk() {
        let policy = OwnPkPolicy;
        assert!(policy.allow_subscribe(7, Some(7)));
        assert!(!policy.allow_subscribe(8, Some(7)));
        assert!(!policy.allow_subscribe(7, None));
    }

    #[test]
    fn default_policy_allows_any_authenticated_user() {
        let policy = DefaultPolicy;
        assert!(policy.allow_subscribe(42, Some(1)));
        assert!(!policy.allow_subscribe(42, None));
    }

    #[test]
    fn registry_falls_back_to_default_policy_for_unknown_channel_types() {
        let registry = ContextChannelRegistry::new();
        assert!(registry.policy_for("room").allow_subscribe(99, Some(1)));
        assert!(!registry.policy_for("user").allow_subscribe(99, Some(1)));
    }
}
