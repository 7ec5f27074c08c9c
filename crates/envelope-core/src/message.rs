//! Message + MessageMeta (spec §3). A `Message` is a decoded envelope:
//! class (identified by `t`) plus validated payload plus `MessageMeta`.

use serde_json::Value;

use crate::envelope::{Envelope, EnvelopeKind};

/// Internal context, never placed on the wire. Stamps replies and threads
/// context through workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMeta {
    /// Correlation id, mirrors the originating envelope's `i`.
    pub id: Option<String>,
    /// Owner of the originating session; absent for unauthenticated
    /// connections when `allow_unauthenticated` is set.
    pub user_pk: Option<i64>,
    /// Stable id of the owning `ConsumerSession` (the layer's channel name).
    pub consumer_name: String,
    pub language: Option<String>,
    pub state: Option<crate::envelope::EnvelopeState>,
    pub envelope_kind: EnvelopeKind,
}

impl MessageMeta {
    pub fn from_envelope(envelope: &Envelope, consumer_name: impl Into<String>, user_pk: Option<i64>) -> Self {
        MessageMeta {
            id: envelope.i.clone(),
            user_pk,
            consumer_name: consumer_name.into(),
            language: envelope.l.clone(),
            state: envelope.s,
            envelope_kind: envelope.kind,
        }
    }

    /// Backfill missing id/consumer_name from a source message's meta, used
    /// when an error is raised without its own meta (spec §7).
    pub fn backfill_from(mut self, source: &MessageMeta) -> Self {
        if self.id.is_none() {
            self.id = source.id.clone();
        }
        if self.consumer_name.is_empty() {
            self.consumer_name = source.consumer_name.clone();
        }
        if self.user_pk.is_none() {
            self.user_pk = source.user_pk;
        }
        self
    }
}

/// Whether a registered message class runs in-process or on a worker
/// (spec §3, §9 — replaces the source's multiple-inheritance `isinstance`
/// checks with a single tag carried on the descriptor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageHandlerKind {
    AsyncRunnable,
    DeferredJob,
}

/// A decoded envelope, ready for dispatch.
#[derive(Debug, Clone)]
pub struct Message {
    pub tag: String,
    pub payload: Option<Value>,
    pub meta: MessageMeta,
}

impl Message {
    pub fn from_envelope(envelope: Envelope, consumer_name: impl Into<String>, user_pk: Option<i64>) -> Self {
        let meta = MessageMeta::from_envelope(&envelope, consumer_name, user_pk);
        Message {
            tag: envelope.t,
            payload: envelope.p,
            meta,
        }
    }
}
