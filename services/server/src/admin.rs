//! Localhost-style admin surface (spec §4.8 supplement): triggers a
//! `channel.recheck` against a live session from outside the normal wire
//! path. Gated by an intent header rather than full auth, mirroring the
//! teacher's `control_api.rs` admin endpoints — this is an operator/ops
//! tool, not something a client token should be able to reach.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use envelope_core::envelope::{self, Envelope, EnvelopeKind, Transport};
use envelope_core::error::EnvelopeError;
use serde::Deserialize;

use crate::state::AppState;

const ADMIN_INTENT_HEADER: &str = "x-envelope-admin-intent";
const ADMIN_RECHECK_INTENT: &str = "recheck-channel-subscriptions";

#[derive(Debug, Deserialize)]
pub struct TriggerRecheckRequest {
    pub channel_name: String,
}

/// Build a `channel.recheck` internal envelope and drop it into the target
/// session's mailbox. `ConsumerSession::deliver`'s `internal.msg` branch
/// picks it up and re-dispatches it through the normal pipeline, which runs
/// `RecheckJob::pre_queue` against the session's *current* live subscription
/// set (spec §8).
pub async fn trigger_recheck(state: &AppState, channel_name: &str) -> Result<(), EnvelopeError> {
    let envelope = Envelope { kind: EnvelopeKind::Internal, t: "channel.recheck".to_owned(), p: None, i: None, s: None, l: None };
    let payload = envelope::to_layer_payload(&envelope, Transport::Text, envelope::routing_tag::INTERNAL_MSG)?;
    state.layer.send(channel_name, payload).await
}

pub async fn post_recheck(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<TriggerRecheckRequest>,
) -> impl IntoResponse {
    let has_valid_intent = headers
        .get(ADMIN_INTENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == ADMIN_RECHECK_INTENT);
    if !has_valid_intent {
        return (StatusCode::FORBIDDEN, "missing or invalid admin intent").into_response();
    }

    match trigger_recheck(&state, &body.channel_name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
