//! Spec §8 scenario 5: subscribing to another user's channel is queued,
//! then denied by `OwnPkPolicy`.

#[path = "common/mod.rs"]
mod common;

use envelope_test_support::TestClient;
use serde_json::json;

#[tokio::test]
async fn subscribe_to_another_users_channel_is_denied() {
    let server = common::spawn_server().await;
    common::issue_token(&server.pool, 7, "token-7").await;
    let mut client = TestClient::connect_with_token(&server.ws_url, "token-7").await;

    client
        .send_json(&json!({"t": "channel.subscribe", "p": {"pk": 8, "channel_type": "user"}, "i": "sub1"}))
        .await;

    let ack = client.recv_json().await;
    assert_eq!(ack["s"], "q");

    let denied = client.recv_json().await;
    assert_eq!(
        denied,
        json!({
            "t": "error.subscribe",
            "p": {"channel_name": "user_8"},
            "i": "sub1",
            "s": "f",
        })
    );

    client.close().await;
}
