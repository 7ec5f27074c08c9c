//! The server binary's concrete `ChannelLayer` (spec component E). Spec
//! §4.5 describes only the abstract contract; this in-process
//! implementation — group membership and per-channel mailboxes behind a
//! `Mutex` — is this binary's single-node backend. A multi-node deployment
//! would swap this for a broker-backed implementation behind the same
//! trait without touching the rest of the fabric.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use envelope_core::envelope::LayerPayload;
use envelope_core::error::EnvelopeError;
use envelope_core::layer::ChannelLayer;
use tokio::sync::mpsc;

type Mailbox = mpsc::UnboundedSender<LayerPayload>;

#[derive(Default)]
struct Inner {
    mailboxes: HashMap<String, Mailbox>,
    groups: HashMap<String, HashSet<String>>,
}

#[derive(Default)]
pub struct InProcessLayer {
    inner: Mutex<Inner>,
}

impl InProcessLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session's mailbox; the caller drains the returned
    /// receiver on its own task.
    pub fn register(&self, channel_name: &str) -> mpsc::UnboundedReceiver<LayerPayload> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().expect("layer lock poisoned").mailboxes.insert(channel_name.to_owned(), tx);
        rx
    }

    pub fn unregister(&self, channel_name: &str) {
        let mut inner = self.inner.lock().expect("layer lock poisoned");
        inner.mailboxes.remove(channel_name);
        for members in inner.groups.values_mut() {
            members.remove(channel_name);
        }
    }

    pub fn group_members(&self, group_name: &str) -> Vec<String> {
        self.inner
            .lock()
            .expect("layer lock poisoned")
            .groups
            .get(group_name)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChannelLayer for InProcessLayer {
    async fn send(&self, channel_name: &str, payload: LayerPayload) -> Result<(), EnvelopeError> {
        let sender = {
            let inner = self.inner.lock().expect("layer lock poisoned");
            inner.mailboxes.get(channel_name).cloned()
        };
        // A channel with no live session is dropped silently (spec §5).
        if let Some(sender) = sender {
            let _ = sender.send(payload);
        }
        Ok(())
    }

    async fn group_send(&self, group_name: &str, payload: LayerPayload) -> Result<(), EnvelopeError> {
        let members = self.group_members(group_name);
        for member in members {
            self.send(&member, payload.clone()).await?;
        }
        Ok(())
    }

    async fn group_add(&self, group_name: &str, channel_name: &str) -> Result<(), EnvelopeError> {
        self.inner
            .lock()
            .expect("layer lock poisoned")
            .groups
            .entry(group_name.to_owned())
            .or_default()
            .insert(channel_name.to_owned());
        Ok(())
    }

    async fn group_discard(&self, group_name: &str, channel_name: &str) -> Result<(), EnvelopeError> {
        if let Some(members) = self.inner.lock().expect("layer lock poisoned").groups.get_mut(group_name) {
            members.remove(channel_name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn group_send_delivers_to_members_and_drops_for_absent_channels() {
        let layer = InProcessLayer::new();
        let mut rx = layer.register("consumer-1");
        layer.group_add("group-a", "consumer-1").await.unwrap();
        layer.group_add("group-a", "consumer-gone").await.unwrap();
        layer.unregister("consumer-gone");

        let mut payload = LayerPayload::new();
        payload.insert("type".to_owned(), serde_json::Value::String("websocket.send".to_owned()));
        layer.group_send("group-a", payload.clone()).await.unwrap();

        let received = rx.try_recv().expect("consumer-1 should receive");
        assert_eq!(received, payload);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn group_discard_removes_membership() {
        let layer = InProcessLayer::new();
        let _rx = layer.register("consumer-1");
        layer.group_add("group-a", "consumer-1").await.unwrap();
        layer.group_discard("group-a", "consumer-1").await.unwrap();

        assert!(layer.group_members("group-a").is_empty());
    }
}
