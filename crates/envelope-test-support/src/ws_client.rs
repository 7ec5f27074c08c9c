//! A thin `tokio-tungstenite` wrapper for end-to-end tests that speak the
//! envelope wire format against a real in-process axum server, mirroring
//! the teacher's integration-test pattern of driving a live socket rather
//! than calling handlers directly.

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (stream, _response) = connect_async(url).await.expect("failed to connect test client");
        TestClient { stream }
    }

    /// Connect with a bearer token set on the upgrade request's
    /// `Authorization` header, for scenarios that need an authenticated
    /// session.
    pub async fn connect_with_token(url: &str, token: &str) -> Self {
        let mut request = url.into_client_request().expect("valid websocket url");
        let header_value = format!("Bearer {token}").parse().expect("valid header value");
        request.headers_mut().insert("authorization", header_value);
        let (stream, _response) = connect_async(request).await.expect("failed to connect test client");
        TestClient { stream }
    }

    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(WsMessage::Text(text.to_owned().into()))
            .await
            .expect("failed to send test frame");
    }

    pub async fn send_json(&mut self, value: &serde_json::Value) {
        self.send_text(&value.to_string()).await;
    }

    /// Receive the next text frame as a parsed JSON value, skipping
    /// ping/pong control frames.
    pub async fn recv_json(&mut self) -> serde_json::Value {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return serde_json::from_str(&text).expect("server frame should be valid JSON")
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(other)) => panic!("unexpected frame: {other:?}"),
                Some(Err(e)) => panic!("websocket error: {e}"),
                None => panic!("connection closed before expected frame"),
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
