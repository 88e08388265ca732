//! WebSocket-Endpunkte der beiden Raeume
//!
//! - `GET /ws/:username`    – Chat
//! - `GET /voice/:username` – Voice-Signaling
//!
//! Die Identitaet wird erst nach dem Upgrade geprueft, damit der Client eine
//! Ablehnung als Close-Frame (1008) statt als HTTP-Fehler sieht.

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use std::sync::Arc;

use crate::connection::ClientConnection;
use crate::registry::RaumArt;
use crate::server_state::SignalingState;

/// Router mit beiden WebSocket-Routen
pub fn ws_router(state: Arc<SignalingState>) -> Router {
    Router::new()
        .route("/ws/:username", get(chat_upgrade))
        .route("/voice/:username", get(voice_upgrade))
        .with_state(state)
}

async fn chat_upgrade(
    State(state): State<Arc<SignalingState>>,
    Path(username): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, RaumArt::Chat, username, ws)
}

async fn voice_upgrade(
    State(state): State<Arc<SignalingState>>,
    Path(username): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade(state, RaumArt::Voice, username, ws)
}

fn upgrade(
    state: Arc<SignalingState>,
    raum: RaumArt,
    username: String,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    tracing::debug!(raum = raum.as_str(), roh = %username, "WebSocket-Upgrade");
    let verbindung = ClientConnection::neu(Arc::clone(&state), raum, username);
    ws.on_upgrade(move |socket| state.verbindung_verfolgen(verbindung.verarbeiten(socket)))
}
