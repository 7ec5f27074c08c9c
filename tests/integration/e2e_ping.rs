//! Spec §8 scenario 1: a bare `s.ping` gets `s.pong` echoing its `i`.

#[path = "common/mod.rs"]
mod common;

use envelope_test_support::TestClient;
use serde_json::json;

#[tokio::test]
async fn ping_replies_with_pong() {
    let server = common::spawn_server().await;
    let mut client = TestClient::connect(&server.ws_url).await;

    client.send_json(&json!({"t": "s.ping", "i": "a"})).await;
    let reply = client.recv_json().await;

    assert_eq!(reply, json!({"t": "s.pong", "p": null, "i": "a", "s": "s"}));
    client.close().await;
}
