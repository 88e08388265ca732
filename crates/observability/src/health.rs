//! Health-Check-Endpunkt fuer Sprechstube
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und Verbindungen pro Raum

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    /// Registrierte Verbindungen je Raum
    pub connections: BTreeMap<String, usize>,
}

/// Liefert die aktuelle Verbindungsanzahl je Raum
pub type VerbindungsZaehler = Arc<dyn Fn() -> BTreeMap<String, usize> + Send + Sync>;

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub faehrt_herunter: Arc<AtomicBool>,
    zaehler: VerbindungsZaehler,
}

impl HealthState {
    pub fn neu(zaehler: VerbindungsZaehler) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            faehrt_herunter: Arc::new(AtomicBool::new(false)),
            zaehler,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Markiert den Server als herunterfahrend (Health liefert dann 503)
    pub fn herunterfahren_melden(&self) {
        self.faehrt_herunter.store(true, Ordering::Relaxed);
    }

    pub fn antwort(&self) -> HealthResponse {
        let status = if self.faehrt_herunter.load(Ordering::Relaxed) {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Healthy
        };

        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            connections: (self.zaehler)(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let response = state.antwort();

    let http_status = match response.status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (http_status, Json(response))
}
