//! Spec §8: a `channel.recheck` against a permission set that has not
//! changed yields zero `channel.left` replies.

#[path = "common/mod.rs"]
mod common;

use std::sync::Arc;

use envelope_core::signals::{Listener, ListenerShape};
use envelope_test_support::TestClient;
use serde_json::json;
use server::signals::ConsumerConnectedEvent;

struct ChannelNameCapture(tokio::sync::mpsc::UnboundedSender<String>);

impl Listener<ConsumerConnectedEvent> for ChannelNameCapture {
    fn shape(&self) -> ListenerShape {
        ListenerShape::Blocking
    }

    fn call(&self, event: &ConsumerConnectedEvent) {
        let _ = self.0.send(event.channel_name.clone());
    }
}

#[tokio::test]
async fn recheck_with_unchanged_permissions_yields_no_channel_left() {
    let server = common::spawn_server().await;
    common::issue_token(&server.pool, 7, "token-7").await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    server.state.signals.consumer_connected.connect(Arc::new(ChannelNameCapture(tx)));

    let mut client = TestClient::connect_with_token(&server.ws_url, "token-7").await;
    let channel_name = rx.recv().await.expect("consumer_connected should fire on connect");

    client
        .send_json(&json!({"t": "channel.subscribe", "p": {"pk": 7, "channel_type": "user"}, "i": "sub1"}))
        .await;
    let _ack = client.recv_json().await;
    let _success = client.recv_json().await;

    server::admin::trigger_recheck(&server.state, &channel_name).await.expect("trigger recheck");

    client.send_json(&json!({"t": "s.ping"})).await;
    let reply = client.recv_json().await;
    assert_eq!(reply["t"], "s.pong", "recheck of an unchanged permission set must not emit channel.left before the next reply");

    client.send_json(&json!({"t": "channel.list_subscriptions", "i": "ls"})).await;
    let subs = client.recv_json().await;
    assert_eq!(
        subs,
        json!({
            "t": "channel.subscriptions",
            "p": {"subscriptions": [{"pk": 7, "channel_type": "user"}]},
            "i": "ls",
            "s": "s",
        })
    );

    client.close().await;
}
