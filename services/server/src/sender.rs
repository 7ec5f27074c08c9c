//! Transactional Sender & Batching (spec component I, §4.9). Outgoing
//! sends made with `on_commit=true` are buffered here and flushed once the
//! owning job's unit of work completes; on flush, adjacent sends sharing a
//! group key are coalesced into a single batch message once the group
//! reaches 3 or more batchable entries.

use envelope_core::app_state::AppStateEntry;
use envelope_core::envelope::{self, Envelope, EnvelopeKind, EnvelopeState, Transport};
use envelope_core::error::EnvelopeError;
use envelope_core::layer::ChannelLayer;
use envelope_core::message::MessageMeta;
use serde_json::Value;
use std::sync::Mutex;

/// Where a buffered send is routed on flush (spec §4.6, §4.9): a single
/// originating consumer's mailbox, or a pub/sub group's fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SendTarget {
    Consumer(String),
    Group(String),
}

#[derive(Clone)]
pub struct BufferedSend {
    pub tag: String,
    pub payload: Option<Value>,
    pub meta: MessageMeta,
    pub target: SendTarget,
    pub envelope_kind: EnvelopeKind,
    pub state: EnvelopeState,
    pub allow_batch: bool,
}

/// `(tag, target, envelope_kind, state)` — the group key sends are
/// coalesced by (spec §4.9). Errors never enter this buffer at all, so no
/// `is_error` component is needed here.
type GroupKey = (String, SendTarget, EnvelopeKind, EnvelopeState);

fn group_key(send: &BufferedSend) -> GroupKey {
    (send.tag.clone(), send.target.clone(), send.envelope_kind, send.state)
}

/// Produces the shape of a coalesced batch message. Two shapes are
/// supported and pluggable by configuration (spec §4.9).
pub trait BatchFactory: Send + Sync {
    /// `sends` share one group key and have length ≥ 3. Returns the
    /// synthetic `s.batch` tag and its payload.
    fn build(&self, sends: &[BufferedSend]) -> (String, Value);
}

pub struct PayloadListBatch;

impl BatchFactory for PayloadListBatch {
    fn build(&self, sends: &[BufferedSend]) -> (String, Value) {
        let inner_tag = sends[0].tag.clone();
        let payloads: Vec<Value> = sends.iter().map(|s| s.payload.clone().unwrap_or(Value::Null)).collect();
        ("s.batch".to_owned(), serde_json::json!({ "t": inner_tag, "payloads": payloads }))
    }
}

/// Tabular shape: fields whose value is identical across every send become
/// `common`; the rest become `keys`/`values` rows. Falls back to an empty
/// `keys`/`values` pair if payloads aren't JSON objects.
pub struct TabularBatch;

impl BatchFactory for TabularBatch {
    fn build(&self, sends: &[BufferedSend]) -> (String, Value) {
        let inner_tag = sends[0].tag.clone();
        let objects: Vec<&serde_json::Map<String, Value>> =
            sends.iter().filter_map(|s| s.payload.as_ref().and_then(Value::as_object)).collect();

        if objects.len() != sends.len() {
            return ("s.batch".to_owned(), serde_json::json!({ "t": inner_tag, "common": {}, "keys": [], "values": [] }));
        }

        let mut common = serde_json::Map::new();
        let mut varying_keys: Vec<String> = Vec::new();
        if let Some(first) = objects.first() {
            for key in first.keys() {
                let all_equal = objects.iter().all(|o| o.get(key) == first.get(key));
                if all_equal {
                    common.insert(key.clone(), first[key].clone());
                } else {
                    varying_keys.push(key.clone());
                }
            }
        }
        varying_keys.sort();

        let values: Vec<Vec<Value>> = objects
            .iter()
            .map(|o| varying_keys.iter().map(|k| o.get(k).cloned().unwrap_or(Value::Null)).collect())
            .collect();

        (
            "s.batch".to_owned(),
            serde_json::json!({ "t": inner_tag, "common": Value::Object(common), "keys": varying_keys, "values": values }),
        )
    }
}

pub struct TransactionSender {
    buffer: Mutex<Vec<BufferedSend>>,
}

impl TransactionSender {
    pub fn new() -> Self {
        TransactionSender { buffer: Mutex::new(Vec::new()) }
    }

    pub fn buffer(&self, send: BufferedSend) {
        self.buffer.lock().expect("sender lock poisoned").push(send);
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().expect("sender lock poisoned").is_empty()
    }

    /// Send one buffered/unbuffered message straight to the layer, bypassing
    /// any batching — used for `on_commit=false` sends and for errors,
    /// which "always bypass batching" (spec §4.9).
    pub async fn send_immediate(layer: &dyn ChannelLayer, send: &BufferedSend) -> Result<(), EnvelopeError> {
        let envelope = Envelope {
            kind: send.envelope_kind,
            t: send.tag.clone(),
            p: send.payload.clone(),
            i: send.meta.id.clone(),
            s: Some(send.state),
            l: None,
        };
        let payload = envelope::to_layer_payload(&envelope, Transport::Text, envelope::routing_tag::WEBSOCKET_SEND)?;
        match &send.target {
            SendTarget::Consumer(channel_name) => layer.send(channel_name, payload).await,
            SendTarget::Group(channel_name) => layer.group_send(channel_name, payload).await,
        }
    }

    /// Commit-hook entry point: group buffered sends preserving insertion
    /// order, coalesce groups of ≥3 batchable sends into one `s.batch`
    /// message, and flush everything to the layer (spec §4.9).
    pub async fn flush(self, layer: &dyn ChannelLayer, factory: &dyn BatchFactory) -> Result<(), EnvelopeError> {
        let sends = self.buffer.into_inner().expect("sender lock poisoned");
        for group in group_adjacent(sends) {
            if group.len() >= 3 && group.iter().all(|s| s.allow_batch) {
                let (tag, payload) = factory.build(&group);
                let template = &group[0];
                let batched = BufferedSend {
                    tag,
                    payload: Some(payload),
                    meta: template.meta.clone(),
                    target: template.target.clone(),
                    envelope_kind: template.envelope_kind,
                    state: template.state,
                    allow_batch: false,
                };
                Self::send_immediate(layer, &batched).await?;
            } else {
                for send in &group {
                    Self::send_immediate(layer, send).await?;
                }
            }
        }
        Ok(())
    }
}

impl Default for TransactionSender {
    fn default() -> Self {
        Self::new()
    }
}

/// Groups adjacent sends sharing a group key, preserving insertion order —
/// batching only coalesces *consecutive* same-group sends (spec §5).
fn group_adjacent(sends: Vec<BufferedSend>) -> Vec<Vec<BufferedSend>> {
    let mut groups: Vec<Vec<BufferedSend>> = Vec::new();
    let mut current_key: Option<GroupKey> = None;
    for send in sends {
        let key = group_key(&send);
        if current_key.as_ref() == Some(&key) {
            groups.last_mut().expect("current_key implies a group exists").push(send);
        } else {
            current_key = Some(key);
            groups.push(vec![send]);
        }
    }
    groups
}

pub fn app_state_to_values(entries: &[AppStateEntry]) -> Value {
    serde_json::to_value(entries).unwrap_or(Value::Array(Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use envelope_core::envelope::EnvelopeKind;
    use envelope_test_support::InMemoryLayer;

    fn meta() -> MessageMeta {
        MessageMeta {
            id: None,
            user_pk: Some(7),
            consumer_name: "consumer-1".to_owned(),
            language: None,
            state: None,
            envelope_kind: EnvelopeKind::Incoming,
        }
    }

    fn send(tag: &str, n: i64, allow_batch: bool) -> BufferedSend {
        BufferedSend {
            tag: tag.to_owned(),
            payload: Some(serde_json::json!({ "n": n })),
            meta: meta(),
            target: SendTarget::Consumer("consumer-1".to_owned()),
            envelope_kind: EnvelopeKind::Outgoing,
            state: EnvelopeState::Success,
            allow_batch,
        }
    }

    #[tokio::test]
    async fn three_or_more_batchable_sends_become_one_batch_message() {
        let layer = InMemoryLayer::new();
        let mut rx = layer.register("consumer-1");
        let sender = TransactionSender::new();
        for n in 0..3 {
            sender.buffer(send("progress.num", n, true));
        }
        sender.flush(&layer, &PayloadListBatch).await.unwrap();

        let payload = rx.try_recv().expect("one batched frame");
        assert_eq!(payload["t"], Value::String("s.batch".to_owned()));
        assert!(rx.try_recv().is_err(), "no further frames after the batch");
    }

    #[tokio::test]
    async fn fewer_than_three_sends_are_not_batched() {
        let layer = InMemoryLayer::new();
        let mut rx = layer.register("consumer-1");
        let sender = TransactionSender::new();
        sender.buffer(send("progress.num", 0, true));
        sender.buffer(send("progress.num", 1, true));
        sender.flush(&layer, &PayloadListBatch).await.unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_batchable_sends_are_never_coalesced_even_at_group_size_three() {
        let layer = InMemoryLayer::new();
        let mut rx = layer.register("consumer-1");
        let sender = TransactionSender::new();
        for n in 0..3 {
            sender.buffer(send("channel.subscribed", n, false));
        }
        sender.flush(&layer, &PayloadListBatch).await.unwrap();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn tabular_batch_splits_common_from_varying_fields() {
        let sends = vec![
            BufferedSend { payload: Some(serde_json::json!({"kind": "x", "n": 1})), ..send("s.stat", 1, true) },
            BufferedSend { payload: Some(serde_json::json!({"kind": "x", "n": 2})), ..send("s.stat", 2, true) },
        ];
        let (tag, payload) = TabularBatch.build(&sends);
        assert_eq!(tag, "s.batch");
        assert_eq!(payload["common"]["kind"], "x");
        assert_eq!(payload["keys"], serde_json::json!(["n"]));
    }
}
