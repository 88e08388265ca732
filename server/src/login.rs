//! HTTP-Endpunkte rund um das Benutzerverzeichnis
//!
//! - `GET  /api/users`          – alle bekannten Identitaeten
//! - `GET  /login/:username`    – existiert die Identitaet?
//! - `POST /login/:username`    – Passwort pruefen (Formularfeld `password`)
//!
//! Alle Pfade kanonisieren den Namen genauso wie die WebSocket-Zulassung.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use serde_json::json;
use sprechstube_core::{kanonisieren, BenutzerVerzeichnis};
use std::sync::Arc;

type Verzeichnis = Arc<dyn BenutzerVerzeichnis>;

/// Router fuer Benutzerliste und Login
pub fn login_router(verzeichnis: Verzeichnis) -> Router {
    Router::new()
        .route("/api/users", get(benutzer_liste))
        .route("/login/:username", get(login_pruefen).post(login))
        .with_state(verzeichnis)
}

async fn benutzer_liste(State(verzeichnis): State<Verzeichnis>) -> Json<Vec<String>> {
    Json(
        verzeichnis
            .identitaeten()
            .into_iter()
            .map(String::from)
            .collect(),
    )
}

async fn login_pruefen(
    State(verzeichnis): State<Verzeichnis>,
    Path(username): Path<String>,
) -> Response {
    match kanonisieren(&username) {
        Ok(identitaet) if verzeichnis.existiert(&identitaet) => {
            Json(json!({ "success": true, "username": identitaet })).into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "user not found" })),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginFormular {
    pub password: String,
}

async fn login(
    State(verzeichnis): State<Verzeichnis>,
    Path(username): Path<String>,
    Form(formular): Form<LoginFormular>,
) -> Json<serde_json::Value> {
    match kanonisieren(&username) {
        Ok(identitaet) if verzeichnis.zugangsdaten_pruefen(&identitaet, &formular.password) => {
            tracing::info!(identitaet = %identitaet, "Login erfolgreich");
            Json(json!({ "success": true, "username": identitaet }))
        }
        _ => {
            tracing::info!(roh = %username, "Login fehlgeschlagen");
            Json(json!({ "success": false, "error": "wrong password" }))
        }
    }
}
