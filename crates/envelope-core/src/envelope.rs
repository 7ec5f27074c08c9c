//! Envelope & Schema (spec component A).
//!
//! The envelope is the wire unit: a small JSON object tagged by `t`, carrying
//! an optional payload `p`, an optional correlation id `i`, and kind-specific
//! restrictions on `s` (state) and `l` (language).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EnvelopeError;

/// Maximum length of a correlation id (`i`), per spec §3.
pub const MAX_CORRELATION_ID_LEN: usize = 20;
/// Maximum length of a message type tag (`t`), per spec §3.
pub const MAX_TAG_LEN: usize = 64;

/// The four envelope kinds sharing the wire shape, each with its own
/// legal-field restrictions (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    #[default]
    Incoming,
    Outgoing,
    Internal,
    Error,
}

impl EnvelopeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Incoming => "ws_incoming",
            EnvelopeKind::Outgoing => "ws_outgoing",
            EnvelopeKind::Internal => "internal",
            EnvelopeKind::Error => "ws_error",
        }
    }
}

/// The `s` field: acknowledged / queued / running / success / failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeState {
    #[serde(rename = "a")]
    Acknowledged,
    #[serde(rename = "q")]
    Queued,
    #[serde(rename = "r")]
    Running,
    #[serde(rename = "s")]
    Success,
    #[serde(rename = "f")]
    Failed,
}

/// The wire unit itself. `kind` is never serialized — it is carried
/// out-of-band by the transport routing tag (§4.1) — but is tracked here so
/// that in-process code can enforce kind-specific restrictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(skip)]
    pub kind: EnvelopeKind,
    pub t: String,
    #[serde(default)]
    pub p: Option<Value>,
    #[serde(default)]
    pub i: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<EnvelopeState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<String>,
}

impl Envelope {
    /// Validate the kind-specific restrictions from spec §3:
    /// incoming has no `s`, outgoing has no `l`, internal has no `s`,
    /// error forces `s = Failed`.
    pub fn validate_kind(&self) -> Result<(), EnvelopeError> {
        match self.kind {
            EnvelopeKind::Incoming | EnvelopeKind::Internal if self.s.is_some() => {
                Err(EnvelopeError::Validation {
                    detail: format!("{:?} envelope may not carry `s`", self.kind),
                })
            }
            EnvelopeKind::Outgoing if self.l.is_some() => Err(EnvelopeError::Validation {
                detail: "outgoing envelope may not carry `l`".to_owned(),
            }),
            EnvelopeKind::Error if !matches!(self.s, Some(EnvelopeState::Failed)) => {
                Err(EnvelopeError::Validation {
                    detail: "error envelope must set s=\"f\"".to_owned(),
                })
            }
            _ => Ok(()),
        }
    }

    fn validate_shape(&self) -> Result<(), EnvelopeError> {
        if self.t.is_empty() {
            return Err(EnvelopeError::Validation {
                detail: "t must be non-empty".to_owned(),
            });
        }
        if self.t.len() > MAX_TAG_LEN {
            return Err(EnvelopeError::Validation {
                detail: format!("t exceeds {MAX_TAG_LEN} chars"),
            });
        }
        if let Some(i) = &self.i {
            if i.len() > MAX_CORRELATION_ID_LEN {
                return Err(EnvelopeError::Validation {
                    detail: format!("i exceeds {MAX_CORRELATION_ID_LEN} chars"),
                });
            }
        }
        Ok(())
    }
}

/// Parse raw bytes received on the wire into an `Envelope` of the given
/// kind. Empty or non-JSON input is a validation failure carrying a
/// pointer to the offending location, matching spec §3/§8 scenario 3.
pub fn parse(kind: EnvelopeKind, bytes: &str) -> Result<Envelope, EnvelopeError> {
    let trimmed = bytes.trim();
    if trimmed.is_empty() {
        return Err(EnvelopeError::Validation {
            detail: "__root__: empty frame".to_owned(),
        });
    }
    let mut envelope: Envelope = serde_json::from_str(trimmed).map_err(|e| EnvelopeError::Validation {
        detail: format!("__root__: {e}"),
    })?;
    envelope.kind = kind;
    envelope.validate_shape()?;
    envelope.validate_kind()?;
    Ok(envelope)
}

/// Pack an outgoing/error/internal envelope to a JSON string. Packing is a
/// pure function and may be called from any task or worker thread.
pub fn pack(envelope: &Envelope) -> Result<String, EnvelopeError> {
    envelope.validate_kind()?;
    serde_json::to_string(envelope).map_err(|e| EnvelopeError::Generic {
        message: format!("failed to serialize envelope: {e}"),
    })
}

/// Round-trip check used by tests and by the transport layer: parse(pack(e))
/// must preserve the user-visible tuple `(t, p, i, s)`.
pub fn round_trips(envelope: &Envelope) -> bool {
    let Ok(packed) = pack(envelope) else {
        return false;
    };
    let Ok(reparsed) = parse(envelope.kind, &packed) else {
        return false;
    };
    reparsed.t == envelope.t
        && reparsed.p == envelope.p
        && reparsed.i == envelope.i
        && reparsed.s == envelope.s
}

/// The transport routing tags from spec §6 — determine which session-side
/// handler receives a layer payload. Must be preserved verbatim.
pub mod routing_tag {
    pub const WEBSOCKET_SEND: &str = "websocket.send";
    pub const WS_ERROR_SEND: &str = "ws.error.send";
    pub const INTERNAL_MSG: &str = "internal.msg";
}

/// Turn a packed envelope into a layer payload for the given envelope kind.
/// `text` transport wraps the JSON string in a `{text_data, type, i, t, s}`
/// map (spec §4.1); `dict` transport keeps the envelope fields as a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Text,
    Dict,
}

/// A layer payload: an arbitrary map carrying `type` (the routing tag) plus
/// envelope-shaped fields (spec §4.5).
pub type LayerPayload = serde_json::Map<String, Value>;

pub fn to_layer_payload(
    envelope: &Envelope,
    transport: Transport,
    routing_tag: &str,
) -> Result<LayerPayload, EnvelopeError> {
    let mut map = serde_json::Map::new();
    map.insert("type".to_owned(), Value::String(routing_tag.to_owned()));
    match transport {
        Transport::Text => {
            let text = pack(envelope)?;
            map.insert("text_data".to_owned(), Value::String(text));
        }
        Transport::Dict => {
            envelope.validate_kind()?;
            let value = serde_json::to_value(envelope).map_err(|e| EnvelopeError::Generic {
                message: format!("failed to serialize envelope: {e}"),
            })?;
            if let Value::Object(fields) = value {
                map.extend(fields);
            }
        }
    }
    map.insert("t".to_owned(), Value::String(envelope.t.clone()));
    if let Some(i) = &envelope.i {
        map.insert("i".to_owned(), Value::String(i.clone()));
    }
    if let Some(s) = envelope.s {
        let state = serde_json::to_value(s).map_err(|e| EnvelopeError::Generic {
            message: format!("failed to serialize state: {e}"),
        })?;
        map.insert("s".to_owned(), state);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_empty_frame() {
        let err = parse(EnvelopeKind::Incoming, " ").unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation { .. }));
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = parse(EnvelopeKind::Incoming, "{not-json").unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation { .. }));
    }

    #[test]
    fn incoming_envelope_rejects_s_field() {
        let raw = r#"{"t":"s.ping","s":"s"}"#;
        let err = parse(EnvelopeKind::Incoming, raw).unwrap_err();
        assert!(matches!(err, EnvelopeError::Validation { .. }));
    }

    #[test]
    fn error_envelope_requires_failed_state() {
        let envelope = Envelope {
            kind: EnvelopeKind::Error,
            t: "error.generic".to_owned(),
            p: None,
            i: None,
            s: Some(EnvelopeState::Success),
            l: None,
        };
        assert!(envelope.validate_kind().is_err());
    }

    #[test]
    fn pack_parse_round_trip_preserves_user_visible_fields() {
        let envelope = Envelope {
            kind: EnvelopeKind::Outgoing,
            t: "s.pong".to_owned(),
            p: None,
            i: Some("a".to_owned()),
            s: Some(EnvelopeState::Success),
            l: None,
        };
        assert!(round_trips(&envelope));
    }

    #[test]
    fn consumer_name_never_serialized() {
        // MessageMeta.consumer_name has no field on Envelope at all — this
        // test documents that invariant at the wire-shape level.
        let envelope = Envelope {
            kind: EnvelopeKind::Outgoing,
            t: "s.pong".to_owned(),
            p: None,
            i: None,
            s: Some(EnvelopeState::Success),
            l: None,
        };
        let packed = pack(&envelope).expect("pack");
        assert!(!packed.contains("consumer_name"));
    }

    #[test]
    fn to_layer_payload_text_transport_wraps_json_string() {
        let envelope = Envelope {
            kind: EnvelopeKind::Outgoing,
            t: "s.pong".to_owned(),
            p: None,
            i: Some("a".to_owned()),
            s: Some(EnvelopeState::Success),
            l: None,
        };
        let payload =
            to_layer_payload(&envelope, Transport::Text, routing_tag::WEBSOCKET_SEND).unwrap();
        assert_eq!(payload["type"], Value::String(routing_tag::WEBSOCKET_SEND.to_owned()));
        assert!(payload.contains_key("text_data"));
        assert_eq!(payload["t"], Value::String("s.pong".to_owned()));
    }
}
