//! A recording `SessionHandle` for unit tests that exercise handlers or the
//! dispatcher without a real WebSocket.

use std::sync::Mutex;

use envelope_core::error::EnvelopeError;
use envelope_core::handler::SessionHandle;
use envelope_core::message::MessageMeta;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub tag: String,
    pub payload: Option<Value>,
}

pub struct MockSession {
    channel_name: String,
    user_pk: Option<i64>,
    pub sent: Mutex<Vec<SentMessage>>,
    pub errors: Mutex<Vec<EnvelopeError>>,
}

impl MockSession {
    pub fn new(channel_name: impl Into<String>, user_pk: Option<i64>) -> Self {
        MockSession {
            channel_name: channel_name.into(),
            user_pk,
            sent: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }
}

impl SessionHandle for MockSession {
    fn channel_name(&self) -> &str {
        &self.channel_name
    }

    fn user_pk(&self) -> Option<i64> {
        self.user_pk
    }

    fn send_ws_message(&self, tag: &str, payload: Option<Value>, _meta: &MessageMeta) {
        self.sent.lock().expect("mock session lock poisoned").push(SentMessage {
            tag: tag.to_owned(),
            payload,
        });
    }

    fn send_ws_error(&self, error: &EnvelopeError, _meta: &MessageMeta) {
        self.errors.lock().expect("mock session lock poisoned").push(error.clone());
    }
}
