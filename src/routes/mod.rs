//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router serves the Socket.IO websocket endpoint (with and without
//! the trailing slash clients use) and a health probe. CORS is open since the
//! widget is embedded on arbitrary origins.

pub mod ws;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Path the Socket.IO client connects to by default.
pub const SOCKET_PATH: &str = "/socket.io/";

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(SOCKET_PATH, get(ws::handle_ws))
        .route("/socket.io", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "connections": state.registry.len().await }))
}
