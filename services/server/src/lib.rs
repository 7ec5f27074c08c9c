pub mod admin;
pub mod auth;
pub mod catalog;
pub mod channels;
pub mod config;
pub mod db;
pub mod jobs;
pub mod layer;
pub mod management;
pub mod protocol;
pub mod repo;
pub mod sender;
pub mod session;
pub mod signals;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/admin/channels/recheck", post(admin::post_recheck))
        .with_state(state)
}
