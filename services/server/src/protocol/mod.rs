//! Subscription Protocol (spec component G, §4.7): the four `channel.*`
//! wire commands and their replies.

use std::sync::Arc;

use async_trait::async_trait;
use envelope_core::app_state::AppStateCollector;
use envelope_core::catalog::{LeftReply, SubscribeRequest, SubscribedReply, SubscriptionEntry, SubscriptionsReply};
use envelope_core::envelope::EnvelopeState;
use envelope_core::error::EnvelopeError;
use envelope_core::handler::{AsyncRunnable, DeferredJob, JobContext, SessionHandle};
use envelope_core::message::MessageMeta;
use serde_json::Value;

use crate::channels::{channel_name, ContextChannelRegistry};
use crate::signals::{ChannelSubscribedEvent, SignalBus};

/// `channel.subscribe` — deferred job. `pre_queue` sends the `s=queued`
/// acknowledgement; `run_job` checks the permission, joins the group,
/// collects app-state, and replies `s=success` or raises `error.subscribe`.
pub struct SubscribeJob {
    pub registry: Arc<ContextChannelRegistry>,
    pub layer: Arc<dyn envelope_core::layer::ChannelLayer>,
    pub signals: Arc<SignalBus>,
}

fn parse_subscribe_request(payload: &Option<Value>) -> Result<SubscribeRequest, EnvelopeError> {
    payload
        .clone()
        .and_then(|v| serde_json::from_value(v).ok())
        .ok_or_else(|| EnvelopeError::BadRequest { detail: "expected {channel_type, pk}".to_owned() })
}

#[async_trait]
impl DeferredJob for SubscribeJob {
    fn pre_queue(&self, payload: &Option<Value>, meta: &MessageMeta, session: &dyn SessionHandle) -> Result<Option<Value>, EnvelopeError> {
        let req = parse_subscribe_request(payload)?;
        let reply = SubscribedReply {
            channel_type: req.channel_type.clone(),
            pk: req.pk,
            channel_name: channel_name(&req.channel_type, req.pk),
            app_state: None,
        };
        let value = serde_json::to_value(&reply)
            .map_err(|e| EnvelopeError::Generic { message: format!("failed to serialize reply: {e}") })?;
        session.send_ws_message_state("channel.subscribed", Some(value), meta, EnvelopeState::Queued);
        Ok(None)
    }

    async fn run_job(&self, payload: Option<Value>, meta: MessageMeta, ctx: &dyn JobContext) -> Result<(), EnvelopeError> {
        let req = parse_subscribe_request(&payload)?;
        let policy = self.registry.policy_for(&req.channel_type);
        let channel_name = channel_name(&req.channel_type, req.pk);
        if !policy.allow_subscribe(req.pk, ctx.target_user_pk()) {
            return Err(EnvelopeError::Subscribe { channel_name });
        }

        self.layer.group_add(&channel_name, ctx.target_channel_name()).await?;

        let event = ChannelSubscribedEvent {
            channel_type: req.channel_type.clone(),
            pk: req.pk,
            user_pk: ctx.target_user_pk(),
            app_state: std::sync::Mutex::new(AppStateCollector::new()),
        };
        self.signals.channel_subscribed.fire(&event, envelope_core::signals::ListenerShape::Blocking);
        let app_state = event.app_state.into_inner().expect("app state lock poisoned").finish();

        let reply = SubscribedReply { channel_type: req.channel_type, pk: req.pk, channel_name, app_state };
        let value = serde_json::to_value(&reply)
            .map_err(|e| EnvelopeError::Generic { message: format!("failed to serialize reply: {e}") })?;
        ctx.send_to_origin("channel.subscribed", Some(value), &meta, true).await;
        Ok(())
    }
}

/// `channel.leave` — runnable, no permission check (spec §4.7: "users may
/// always leave their own session's subscriptions"). The session's local
/// subscription set is mutated when the `channel.left` reply is routed
/// outbound, not here.
pub struct LeaveHandler {
    pub layer: Arc<dyn envelope_core::layer::ChannelLayer>,
}

#[async_trait]
impl AsyncRunnable for LeaveHandler {
    async fn run(&self, payload: Option<Value>, meta: &MessageMeta, session: &dyn SessionHandle) -> Result<(), EnvelopeError> {
        let req: envelope_core::catalog::LeaveRequest = payload
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| EnvelopeError::BadRequest { detail: "expected {channel_type, pk}".to_owned() })?;
        let cn = channel_name(&req.channel_type, req.pk);
        self.layer.group_discard(&cn, session.channel_name()).await?;
        let reply = LeftReply { channel_type: req.channel_type, pk: req.pk };
        let value = serde_json::to_value(&reply)
            .map_err(|e| EnvelopeError::Generic { message: format!("failed to serialize reply: {e}") })?;
        session.send_ws_message("channel.left", Some(value), meta);
        Ok(())
    }
}

/// `channel.list_subscriptions` — runnable, returns the session's set.
pub struct ListSubscriptionsHandler;

#[async_trait]
impl AsyncRunnable for ListSubscriptionsHandler {
    async fn run(&self, _payload: Option<Value>, meta: &MessageMeta, session: &dyn SessionHandle) -> Result<(), EnvelopeError> {
        let subscriptions = session
            .subscriptions()
            .into_iter()
            .map(|(channel_type, pk)| SubscriptionEntry { channel_type, pk })
            .collect();
        let reply = SubscriptionsReply { subscriptions };
        let value = serde_json::to_value(&reply)
            .map_err(|e| EnvelopeError::Generic { message: format!("failed to serialize reply: {e}") })?;
        session.send_ws_message("channel.subscriptions", Some(value), meta);
        Ok(())
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct RecheckRequest {
    pub subscriptions: Vec<SubscriptionEntry>,
}

/// `channel.recheck` — internal-only deferred job fired when a user's
/// permissions change. Leaves every subscribed context channel whose
/// `allow_subscribe` now returns false (spec §4.7).
pub struct RecheckJob {
    pub registry: Arc<ContextChannelRegistry>,
    pub layer: Arc<dyn envelope_core::layer::ChannelLayer>,
}

#[async_trait]
impl DeferredJob for RecheckJob {
    /// The triggering caller sends an essentially empty internal message;
    /// the real subscription list to recheck is read here, off the
    /// receiving session's own live state, at the moment it is dispatched —
    /// not reconstructed later on a worker, which would only ever see
    /// whatever the caller happened to already know (spec §4.7).
    fn pre_queue(&self, _payload: &Option<Value>, _meta: &MessageMeta, session: &dyn SessionHandle) -> Result<Option<Value>, EnvelopeError> {
        let subscriptions = session
            .subscriptions()
            .into_iter()
            .map(|(channel_type, pk)| SubscriptionEntry { channel_type, pk })
            .collect();
        let req = RecheckRequest { subscriptions };
        let value = serde_json::to_value(&req)
            .map_err(|e| EnvelopeError::Generic { message: format!("failed to serialize recheck request: {e}") })?;
        Ok(Some(value))
    }

    async fn run_job(&self, payload: Option<Value>, meta: MessageMeta, ctx: &dyn JobContext) -> Result<(), EnvelopeError> {
        let req: RecheckRequest = payload
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| EnvelopeError::BadRequest { detail: "expected {subscriptions}".to_owned() })?;

        for sub in req.subscriptions {
            let policy = self.registry.policy_for(&sub.channel_type);
            if policy.allow_subscribe(sub.pk, ctx.target_user_pk()) {
                continue;
            }
            let cn = channel_name(&sub.channel_type, sub.pk);
            self.layer.group_discard(&cn, ctx.target_channel_name()).await?;
            let reply = LeftReply { channel_type: sub.channel_type, pk: sub.pk };
            let value = serde_json::to_value(&reply)
                .map_err(|e| EnvelopeError::Generic { message: format!("failed to serialize reply: {e}") })?;
            ctx.send_to_origin("channel.left", Some(value), &meta, true).await;
        }
        Ok(())
    }
}
