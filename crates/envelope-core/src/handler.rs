//! Handler contracts. The registry stores these as trait objects
//! (spec §9: "function pointers / interface values" instead of multiple
//! inheritance + `isinstance`).

use async_trait::async_trait;
use serde_json::Value;

use crate::envelope::EnvelopeState;
use crate::error::EnvelopeError;
use crate::message::MessageMeta;

/// What a registered message class offers back to the rest of the system
/// (spec §4.4's "session public API"). `ConsumerSession` implements this;
/// handlers only see the narrow view they need.
pub trait SessionHandle: Send + Sync {
    /// Stable id of the owning session (the layer's channel name).
    fn channel_name(&self) -> &str;
    /// Authenticated user, if any.
    fn user_pk(&self) -> Option<i64>;
    /// Pack and enqueue an outgoing message for delivery to this session,
    /// stamped `s=success`.
    fn send_ws_message(&self, tag: &str, payload: Option<Value>, meta: &MessageMeta);
    /// As `send_ws_message`, but with an explicit `s` state — needed by
    /// `pre_queue` to send the interim `s=queued` acknowledgement (spec
    /// §4.7, §5). Defaults to ignoring `state` and sending as `success`;
    /// implementors that need to surface non-success acks (namely
    /// `ConsumerSession`) override this directly.
    fn send_ws_message_state(&self, tag: &str, payload: Option<Value>, meta: &MessageMeta, state: EnvelopeState) {
        let _ = state;
        self.send_ws_message(tag, payload, meta);
    }
    /// Pack and enqueue an error reply, stamped with the error envelope kind.
    fn send_ws_error(&self, error: &EnvelopeError, meta: &MessageMeta);
    /// Read-only view of the session's subscription set (spec §4.4). Types
    /// that don't track subscriptions (test doubles) can rely on the empty
    /// default.
    fn subscriptions(&self) -> Vec<(String, i64)> {
        Vec::new()
    }
    /// Called when a message is about to be handed to the deferred-job
    /// pipeline, so implementations tracking a `last_job` timestamp (spec
    /// §3) can update it. Default no-op.
    fn note_job_dispatched(&self) {}
}

/// A message class whose `run` executes in-process on the owning session's
/// cooperative task (spec §4.3, §5). Must not block on I/O beyond the
/// session's layer and is expected to finish in bounded time.
#[async_trait]
pub trait AsyncRunnable: Send + Sync {
    async fn run(
        &self,
        payload: Option<Value>,
        meta: &MessageMeta,
        session: &dyn SessionHandle,
    ) -> Result<(), EnvelopeError>;
}

/// A message class handled by a worker (spec §4.3, §4.8). `pre_queue` may
/// send an interim `s=queued` reply, and may override the payload that
/// actually gets enqueued by returning `Some(value)` — used by jobs that
/// need to capture session-local state (e.g. the session's own
/// subscription set) at the moment of dispatch rather than at the moment
/// a worker eventually picks the job up. `run_job` executes on a worker
/// inside a transaction unless `atomic()` returns false.
#[async_trait]
pub trait DeferredJob: Send + Sync {
    fn pre_queue(
        &self,
        _payload: &Option<Value>,
        _meta: &MessageMeta,
        _session: &dyn SessionHandle,
    ) -> Result<Option<Value>, EnvelopeError> {
        Ok(None)
    }

    async fn run_job(
        &self,
        payload: Option<Value>,
        meta: MessageMeta,
        ctx: &dyn JobContext,
    ) -> Result<(), EnvelopeError>;

    /// Whether `run_job` should execute inside a DB transaction (spec §4.8).
    fn atomic(&self) -> bool {
        true
    }
}

/// What a worker offers to a running job: sending replies back to the
/// originating session (possibly batched through a transaction, §4.9) and
/// access to the persistence layer's transaction handle.
#[async_trait]
pub trait JobContext: Send + Sync {
    fn target_channel_name(&self) -> &str;
    fn target_user_pk(&self) -> Option<i64>;

    /// Send (or buffer, if `on_commit`) an outgoing message to the
    /// originating consumer. Mirrors `ConsumerSession.send_ws_message` but
    /// routed through the channel layer from a worker.
    async fn send_to_origin(&self, tag: &str, payload: Option<Value>, meta: &MessageMeta, on_commit: bool);

    async fn send_error_to_origin(&self, error: &EnvelopeError, meta: &MessageMeta);
}
