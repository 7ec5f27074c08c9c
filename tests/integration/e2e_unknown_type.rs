//! Spec §8 scenario 2: an unregistered tag yields `error.msg_type`.

#[path = "common/mod.rs"]
mod common;

use envelope_test_support::TestClient;
use serde_json::json;

#[tokio::test]
async fn unknown_type_replies_with_msg_type_error() {
    let server = common::spawn_server().await;
    let mut client = TestClient::connect(&server.ws_url).await;

    client.send_json(&json!({"t": "jeff"})).await;
    let reply = client.recv_json().await;

    assert_eq!(
        reply,
        json!({
            "t": "error.msg_type",
            "p": {"msg": null, "type_name": "jeff", "envelope": "ws_incoming"},
            "i": null,
            "s": "f",
        })
    );
    client.close().await;
}
