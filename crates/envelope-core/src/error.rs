//! Error kinds (spec §7). These are data, not exceptions: a handler that
//! wants to produce an error reply returns `Err(EnvelopeError::…)` and the
//! dispatcher/worker boundary converts it to an `error` envelope. This
//! replaces the source's "raise a message as an exception" discipline
//! (spec §9 Design Notes).

use serde_json::Value;
use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeKind, EnvelopeState};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnvelopeError {
    #[error("validation error: {detail}")]
    Validation { detail: String },
    #[error("unknown message type: {type_name}")]
    MsgType { type_name: String, envelope: String },
    #[error("bad request: {detail}")]
    BadRequest { detail: String },
    #[error("not found: {detail}")]
    NotFound { detail: String },
    #[error("unauthorized: {detail}")]
    Unauthorized { detail: String },
    #[error("subscribe denied for channel {channel_name}")]
    Subscribe { channel_name: String },
    #[error("job failed: {reason}")]
    Job { reason: String },
    #[error("{message}")]
    Generic { message: String },
}

impl EnvelopeError {
    /// The stable wire tag clients branch on (spec §6, §7).
    pub fn tag(&self) -> &'static str {
        match self {
            EnvelopeError::Validation { .. } => "error.validation",
            EnvelopeError::MsgType { .. } => "error.msg_type",
            EnvelopeError::BadRequest { .. } => "error.bad_request",
            EnvelopeError::NotFound { .. } => "error.not_found",
            EnvelopeError::Unauthorized { .. } => "error.unauthorized",
            EnvelopeError::Subscribe { .. } => "error.subscribe",
            EnvelopeError::Job { .. } => "error.job",
            EnvelopeError::Generic { .. } => "error.generic",
        }
    }

    /// The error-specific payload shape for each built-in error tag.
    pub fn payload(&self) -> Value {
        match self {
            EnvelopeError::Validation { detail } => serde_json::json!({
                "msg": Value::Null,
                "errors": [{"loc": ["__root__"], "msg": detail, "type": "value_error"}],
            }),
            EnvelopeError::MsgType { type_name, envelope } => serde_json::json!({
                "msg": Value::Null,
                "type_name": type_name,
                "envelope": envelope,
            }),
            EnvelopeError::BadRequest { detail } => serde_json::json!({ "msg": detail }),
            EnvelopeError::NotFound { detail } => serde_json::json!({ "msg": detail }),
            EnvelopeError::Unauthorized { detail } => serde_json::json!({ "msg": detail }),
            EnvelopeError::Subscribe { channel_name } => serde_json::json!({
                "channel_name": channel_name,
            }),
            EnvelopeError::Job { reason } => serde_json::json!({ "msg": reason }),
            EnvelopeError::Generic { message } => serde_json::json!({ "msg": message }),
        }
    }

    /// Build the wire-level error envelope. `id` is backfilled from the
    /// source message's meta if the error carries no correlation id of its
    /// own (spec §7).
    pub fn to_envelope(&self, id: Option<String>) -> Envelope {
        Envelope {
            kind: EnvelopeKind::Error,
            t: self.tag().to_owned(),
            p: Some(self.payload()),
            i: id,
            s: Some(EnvelopeState::Failed),
            l: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msg_type_error_matches_wire_contract() {
        let err = EnvelopeError::MsgType {
            type_name: "jeff".to_owned(),
            envelope: "ws_incoming".to_owned(),
        };
        let envelope = err.to_envelope(None);
        assert_eq!(envelope.t, "error.msg_type");
        assert_eq!(envelope.s, Some(EnvelopeState::Failed));
        assert_eq!(envelope.p.unwrap()["type_name"], "jeff");
    }

    #[test]
    fn every_error_kind_has_a_stable_tag() {
        let kinds = [
            EnvelopeError::Validation { detail: String::new() }.tag(),
            EnvelopeError::MsgType { type_name: String::new(), envelope: String::new() }.tag(),
            EnvelopeError::BadRequest { detail: String::new() }.tag(),
            EnvelopeError::NotFound { detail: String::new() }.tag(),
            EnvelopeError::Unauthorized { detail: String::new() }.tag(),
            EnvelopeError::Subscribe { channel_name: String::new() }.tag(),
            EnvelopeError::Job { reason: String::new() }.tag(),
            EnvelopeError::Generic { message: String::new() }.tag(),
        ];
        assert_eq!(kinds.len(), 8);
        assert!(kinds.iter().all(|t| t.starts_with("error.")));
    }
}
