//! WebSocket upgrade entry point (spec §4.4's START state): resolve the
//! connecting principal from the `Authorization` header, deny the upgrade
//! outright when authentication is required and missing, and otherwise
//! hand off to `ConsumerSession`.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::auth::{extract_bearer, resolve_principal, Principal};
use crate::session::ConsumerSession;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>, headers: HeaderMap) -> Response {
    let principal = match resolve_principal_from_headers(&state, &headers).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    ws.on_upgrade(move |socket| async move {
        let (session, own_rx, layer_rx) = ConsumerSession::new(state, principal);
        session.run(socket, own_rx, layer_rx).await;
    })
}

async fn resolve_principal_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Principal, StatusCode> {
    let raw_token = headers.get("authorization").and_then(|v| v.to_str().ok()).and_then(extract_bearer);

    match raw_token {
        Some(token) => resolve_principal(&state.pool, token).await.ok_or(StatusCode::UNAUTHORIZED),
        None if state.config.allow_unauthenticated => Ok(Principal::anonymous()),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
