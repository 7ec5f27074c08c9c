//! Spec §8 scenario 3: a whitespace-only frame is a validation error, not a
//! parse panic or a closed connection.

#[path = "common/mod.rs"]
mod common;

use envelope_test_support::TestClient;

#[tokio::test]
async fn empty_frame_replies_with_validation_error() {
    let server = common::spawn_server().await;
    let mut client = TestClient::connect(&server.ws_url).await;

    client.send_text(" ").await;
    let reply = client.recv_json().await;

    assert_eq!(reply["t"], "error.validation");
    assert_eq!(reply["s"], "f");
    assert_eq!(reply["i"], serde_json::Value::Null);
    assert_eq!(reply["p"]["errors"][0]["loc"][0], "__root__");
    client.close().await;
}
