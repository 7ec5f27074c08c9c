//! Spec §8 scenario 4: subscribing to one's own `user` channel yields a
//! queued ack followed by a success reply, in that order.

#[path = "common/mod.rs"]
mod common;

use envelope_test_support::TestClient;
use serde_json::json;

#[tokio::test]
async fn subscribe_to_own_user_channel_acks_then_succeeds() {
    let server = common::spawn_server().await;
    common::issue_token(&server.pool, 7, "token-7").await;
    let mut client = TestClient::connect_with_token(&server.ws_url, "token-7").await;

    client
        .send_json(&json!({"t": "channel.subscribe", "p": {"pk": 7, "channel_type": "user"}, "i": "sub1"}))
        .await;

    let ack = client.recv_json().await;
    assert_eq!(
        ack,
        json!({
            "t": "channel.subscribed",
            "p": {"pk": 7, "channel_type": "user", "channel_name": "user_7", "app_state": null},
            "i": "sub1",
            "s": "q",
        })
    );

    let success = client.recv_json().await;
    assert_eq!(
        success,
        json!({
            "t": "channel.subscribed",
            "p": {"pk": 7, "channel_type": "user", "channel_name": "user_7", "app_state": null},
            "i": "sub1",
            "s": "s",
        })
    );

    client.close().await;
}
