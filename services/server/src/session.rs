//! Consumer Session (spec component D, §4.4). One instance per accepted
//! WebSocket connection: owns the socket, the session's identity, its
//! local subscription set, and the read/write loop that bridges the wire
//! to the `Dispatcher`.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Instant;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use envelope_core::envelope::{self, Envelope, EnvelopeKind, EnvelopeState, LayerPayload, Transport};
use envelope_core::error::EnvelopeError;
use envelope_core::handler::SessionHandle;
use envelope_core::message::{Message as EnvelopeMessage, MessageMeta};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::auth::Principal;
use crate::jobs::housekeeping::{self, LastActionThrottle};
use crate::signals::{ConsumerClosedEvent, ConsumerConnectedEvent};
use crate::state::AppState;

/// Tracks the last time each of the four session-lifetime events in spec §3
/// happened, for diagnostics and for `ws.error.send` to update `last_error`
/// (spec §4.4). `None` until the first occurrence. Follows the same
/// `Mutex<Option<Instant>>` shape as `LastActionThrottle`.
#[derive(Default)]
struct SessionTimestamps {
    last_sent: Mutex<Option<Instant>>,
    last_received: Mutex<Option<Instant>>,
    last_error: Mutex<Option<Instant>>,
    last_job: Mutex<Option<Instant>>,
}

impl SessionTimestamps {
    fn touch(field: &Mutex<Option<Instant>>) {
        *field.lock().expect("session timestamp lock poisoned") = Some(Instant::now());
    }
}

/// START -> ACCEPTED -> CLOSED (spec §4.4). A session that fails auth when
/// `allow_unauthenticated` is unset never reaches `ConsumerSession::run` at
/// all — `ws.rs` denies it during the upgrade instead.
pub struct ConsumerSession {
    channel_name: String,
    user_pk: Option<i64>,
    own_tx: mpsc::UnboundedSender<LayerPayload>,
    subscriptions: Mutex<HashSet<(String, i64)>>,
    timestamps: SessionTimestamps,
    state: AppState,
}

impl ConsumerSession {
    pub fn new(state: AppState, principal: Principal) -> (Self, mpsc::UnboundedReceiver<LayerPayload>, mpsc::UnboundedReceiver<LayerPayload>) {
        let channel_name = Uuid::new_v4().to_string();
        let (own_tx, own_rx) = mpsc::unbounded_channel();
        let layer_rx = state.in_process_layer.register(&channel_name);
        let session = ConsumerSession {
            channel_name,
            user_pk: principal.user_pk,
            own_tx,
            subscriptions: Mutex::new(HashSet::new()),
            timestamps: SessionTimestamps::default(),
            state,
        };
        (session, own_rx, layer_rx)
    }

    /// Runs until the socket closes or errors. Consumes both the session's
    /// own send channel (direct replies) and its layer mailbox (pub/sub
    /// fan-out and worker-routed replies) — both were registered under the
    /// same `channel_name`, so a message sent to "this session" always
    /// lands on one of the two without the session needing to distinguish.
    pub async fn run(
        self,
        mut socket: WebSocket,
        mut own_rx: mpsc::UnboundedReceiver<LayerPayload>,
        mut layer_rx: mpsc::UnboundedReceiver<LayerPayload>,
    ) {
        self.state.signals.consumer_connected.fire(
            &ConsumerConnectedEvent { channel_name: self.channel_name.clone(), user_pk: self.user_pk },
            envelope_core::signals::ListenerShape::Blocking,
        );
        if let Some(user_pk) = self.user_pk {
            housekeeping::on_connected(&self.state.pool, &self.state.config, &self.state.signals, user_pk, &self.channel_name).await;
        }

        let throttle = LastActionThrottle::new();
        let mut close_code: Option<u16> = None;

        loop {
            tokio::select! {
                incoming = socket.recv() => {
                    match incoming {
                        Some(Ok(WsMessage::Text(text))) => {
                            self.handle_incoming_text(&text, &throttle).await;
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            if socket.send(WsMessage::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            close_code = frame.map(|f| f.code);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    }
                }
                outgoing = own_rx.recv() => {
                    let Some(payload) = outgoing else { break };
                    if !self.deliver(&mut socket, payload).await {
                        break;
                    }
                }
                outgoing = layer_rx.recv() => {
                    let Some(payload) = outgoing else { break };
                    if !self.deliver(&mut socket, payload).await {
                        break;
                    }
                }
            }
        }

        self.state.in_process_layer.unregister(&self.channel_name);
        self.state.signals.consumer_closed.fire(
            &ConsumerClosedEvent { channel_name: self.channel_name.clone(), user_pk: self.user_pk, close_code },
            envelope_core::signals::ListenerShape::Blocking,
        );
        if let Some(user_pk) = self.user_pk {
            housekeeping::on_closed(&self.state.pool, &self.state.config, &self.state.signals, user_pk, &self.channel_name, close_code).await;
        }
    }

    async fn handle_incoming_text(&self, text: &str, throttle: &LastActionThrottle) {
        SessionTimestamps::touch(&self.timestamps.last_received);
        if let Some(user_pk) = self.user_pk {
            throttle.maybe_touch(&self.state.pool, &self.state.config, user_pk, &self.channel_name).await;
        }

        let envelope = match envelope::parse(EnvelopeKind::Incoming, text) {
            Ok(envelope) => envelope,
            Err(err) => {
                let meta = MessageMeta {
                    id: None,
                    user_pk: self.user_pk,
                    consumer_name: self.channel_name.clone(),
                    language: None,
                    state: None,
                    envelope_kind: EnvelopeKind::Error,
                };
                self.send_ws_error(&err, &meta);
                return;
            }
        };
        let message = EnvelopeMessage::from_envelope(envelope, self.channel_name.clone(), self.user_pk);
        let _ = self.state.dispatcher.dispatch(message, self, self.state.jobs.as_ref()).await;
    }

    /// Route a frame pulled off either channel by its transport `type` tag
    /// (spec §4.1, §4.5): `websocket.send`/`ws.error.send` go to the socket,
    /// `internal.msg` is decoded and re-dispatched through the normal
    /// pipeline instead (it never reaches the client). Also applies the
    /// `channel.subscribed`/`channel.left` side effect on the outbound path,
    /// and stamps the `last_sent`/`last_error` timestamps and
    /// `outgoing_websocket_message`/`outgoing_websocket_error` signals once
    /// a frame has actually left for the socket.
    async fn deliver(&self, socket: &mut WebSocket, payload: LayerPayload) -> bool {
        match payload.get("type").and_then(Value::as_str) {
            Some(envelope::routing_tag::INTERNAL_MSG) => {
                self.redispatch_internal(&payload).await;
                true
            }
            Some(envelope::routing_tag::WS_ERROR_SEND) => self.deliver_to_socket(socket, &payload, true).await,
            _ => self.deliver_to_socket(socket, &payload, false).await,
        }
    }

    /// Write one `websocket.send`/`ws.error.send` frame to the socket,
    /// applying the subscription side effect and recording the
    /// outgoing/outgoing-error signal on success.
    async fn deliver_to_socket(&self, socket: &mut WebSocket, payload: &LayerPayload, is_error: bool) -> bool {
        if let Some(tag) = payload.get("t").and_then(Value::as_str) {
            if tag == "channel.subscribed" || tag == "channel.left" {
                self.apply_subscription_side_effect(tag, payload);
            }
        }
        let Some(text) = payload.get("text_data").and_then(Value::as_str) else { return true };
        let sent = socket.send(WsMessage::Text(text.to_owned().into())).await.is_ok();
        if sent {
            let kind = if is_error { EnvelopeKind::Error } else { EnvelopeKind::Outgoing };
            if is_error {
                SessionTimestamps::touch(&self.timestamps.last_error);
            } else {
                SessionTimestamps::touch(&self.timestamps.last_sent);
            }
            if let Some(message) = self.message_from_layer_payload(payload, kind) {
                if is_error {
                    self.state.dispatcher.record_outgoing_error(&message);
                } else {
                    self.state.dispatcher.record_outgoing(&message);
                }
            }
        }
        sent
    }

    /// Decode an `internal.msg` frame pulled off the layer and run it
    /// through the dispatcher as if it had just arrived (spec §4.5, §6) —
    /// the mechanism a `channel.recheck` trigger uses to reach a live
    /// session without the wire round trip.
    async fn redispatch_internal(&self, payload: &LayerPayload) {
        let Some(message) = self.message_from_layer_payload(payload, EnvelopeKind::Internal) else { return };
        let _ = self.state.dispatcher.dispatch(message, self, self.state.jobs.as_ref()).await;
    }

    fn message_from_layer_payload(&self, payload: &LayerPayload, kind: EnvelopeKind) -> Option<EnvelopeMessage> {
        let text = payload.get("text_data").and_then(Value::as_str)?;
        let envelope = envelope::parse(kind, text).ok()?;
        Some(EnvelopeMessage::from_envelope(envelope, self.channel_name.clone(), self.user_pk))
    }

    fn apply_subscription_side_effect(&self, tag: &str, payload: &LayerPayload) {
        let Some(text) = payload.get("text_data").and_then(Value::as_str) else { return };
        let Ok(envelope) = serde_json::from_str::<Value>(text) else { return };
        let Some(p) = envelope.get("p") else { return };
        let Some(channel_type) = p.get("channel_type").and_then(Value::as_str) else { return };
        let Some(pk) = p.get("pk").and_then(Value::as_i64) else { return };
        let mut subscriptions = self.subscriptions.lock().expect("subscription set lock poisoned");
        if tag == "channel.subscribed" {
            subscriptions.insert((channel_type.to_owned(), pk));
        } else {
            subscriptions.remove(&(channel_type.to_owned(), pk));
        }
    }
}

impl SessionHandle for ConsumerSession {
    fn channel_name(&self) -> &str {
        &self.channel_name
    }

    fn user_pk(&self) -> Option<i64> {
        self.user_pk
    }

    fn send_ws_message(&self, tag: &str, payload: Option<Value>, meta: &MessageMeta) {
        self.send_ws_message_state(tag, payload, meta, EnvelopeState::Success);
    }

    fn send_ws_message_state(&self, tag: &str, payload: Option<Value>, meta: &MessageMeta, state: EnvelopeState) {
        let envelope = Envelope { kind: EnvelopeKind::Outgoing, t: tag.to_owned(), p: payload, i: meta.id.clone(), s: Some(state), l: None };
        if let Ok(layer_payload) = envelope::to_layer_payload(&envelope, Transport::Text, envelope::routing_tag::WEBSOCKET_SEND) {
            let _ = self.own_tx.send(layer_payload);
        }
    }

    fn send_ws_error(&self, error: &EnvelopeError, meta: &MessageMeta) {
        let envelope = error.to_envelope(meta.id.clone());
        if let Ok(layer_payload) = envelope::to_layer_payload(&envelope, Transport::Text, envelope::routing_tag::WS_ERROR_SEND) {
            let _ = self.own_tx.send(layer_payload);
        }
    }

    fn subscriptions(&self) -> Vec<(String, i64)> {
        self.subscriptions.lock().expect("subscription set lock poisoned").iter().cloned().collect()
    }

    fn note_job_dispatched(&self) {
        SessionTimestamps::touch(&self.timestamps.last_job);
    }
}

