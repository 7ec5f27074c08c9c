//! Spec §8 scenario 6: `channel.list_subscriptions` reflects what the
//! session has actually seen acknowledged so far.

#[path = "common/mod.rs"]
mod common;

use envelope_test_support::TestClient;
use serde_json::json;

#[tokio::test]
async fn list_subscriptions_reflects_prior_subscribe() {
    let server = common::spawn_server().await;
    common::issue_token(&server.pool, 7, "token-7").await;
    let mut client = TestClient::connect_with_token(&server.ws_url, "token-7").await;

    client
        .send_json(&json!({"t": "channel.subscribe", "p": {"pk": 7, "channel_type": "user"}, "i": "sub1"}))
        .await;
    let _ack = client.recv_json().await;
    let _success = client.recv_json().await;

    client.send_json(&json!({"t": "channel.list_subscriptions", "i": "ls"})).await;
    let reply = client.recv_json().await;

    assert_eq!(
        reply,
        json!({
            "t": "channel.subscriptions",
            "p": {"subscriptions": [{"pk": 7, "channel_type": "user"}]},
            "i": "ls",
            "s": "s",
        })
    );

    client.close().await;
}
