//! Prometheus-kompatible Metriken fuer Sprechstube
//!
//! Registrierte Metriken (Label `room` = `chat` bzw. `voice`):
//! - `sprechstube_connected_clients` – Gauge: Aktuell registrierte Verbindungen
//! - `sprechstube_envelopes_delivered_total` – Counter: Eingereihte Nachrichten
//! - `sprechstube_evictions_total` – Counter: Wegen Sendefehler entfernte Verbindungen
//! - `sprechstube_displaced_connections_total` – Counter: Durch Reconnect ersetzte Verbindungen
//! - `sprechstube_relays_dropped_total` – Counter: Signaling-Nachrichten ohne erreichbares Ziel
//! - `sprechstube_http_requests_total` – Counter: HTTP-Anfragen (method, path, status)
//! - `sprechstube_http_request_duration_seconds` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

/// Alle Sprechstube-Prometheus-Metriken
#[derive(Clone)]
pub struct SprechstubeMetrics {
    pub registry: Arc<Registry>,

    // Raum-Metriken
    pub connected_clients: IntGaugeVec,
    pub envelopes_delivered_total: IntCounterVec,
    pub evictions_total: IntCounterVec,
    pub displaced_connections_total: IntCounterVec,
    pub relays_dropped_total: IntCounterVec,

    // HTTP-Metriken
    pub http_requests_total: IntCounterVec,
    pub http_request_duration_seconds: HistogramVec,
}

impl SprechstubeMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Raum-Metriken ---
        let connected_clients = IntGaugeVec::new(
            Opts::new(
                "sprechstube_connected_clients",
                "Anzahl aktuell registrierter Verbindungen",
            ),
            &["room"],
        )?;
        registry.register(Box::new(connected_clients.clone()))?;

        let envelopes_delivered_total = IntCounterVec::new(
            Opts::new(
                "sprechstube_envelopes_delivered_total",
                "Gesamtanzahl eingereihter Nachrichten",
            ),
            &["room"],
        )?;
        registry.register(Box::new(envelopes_delivered_total.clone()))?;

        let evictions_total = IntCounterVec::new(
            Opts::new(
                "sprechstube_evictions_total",
                "Wegen fehlgeschlagenem Senden entfernte Verbindungen",
            ),
            &["room"],
        )?;
        registry.register(Box::new(evictions_total.clone()))?;

        let displaced_connections_total = IntCounterVec::new(
            Opts::new(
                "sprechstube_displaced_connections_total",
                "Durch eine neue Verbindung derselben Identitaet ersetzte Verbindungen",
            ),
            &["room"],
        )?;
        registry.register(Box::new(displaced_connections_total.clone()))?;

        let relays_dropped_total = IntCounterVec::new(
            Opts::new(
                "sprechstube_relays_dropped_total",
                "Verworfene Direktnachrichten (Ziel nicht verbunden)",
            ),
            &["room"],
        )?;
        registry.register(Box::new(relays_dropped_total.clone()))?;

        // --- HTTP-Metriken ---
        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "sprechstube_http_requests_total",
                "Gesamtanzahl HTTP-Anfragen",
            ),
            &["method", "path", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "sprechstube_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
            ]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            envelopes_delivered_total,
            evictions_total,
            displaced_connections_total,
            relays_dropped_total,
            http_requests_total,
            http_request_duration_seconds,
        })
    }

    /// Liefert die vorgelabelten Metriken fuer einen Raum
    pub fn raum(&self, raum: &str) -> RaumMetriken {
        RaumMetriken {
            verbundene_clients: self.connected_clients.with_label_values(&[raum]),
            zugestellt: self.envelopes_delivered_total.with_label_values(&[raum]),
            entfernt: self.evictions_total.with_label_values(&[raum]),
            verdraengt: self.displaced_connections_total.with_label_values(&[raum]),
            relay_verworfen: self.relays_dropped_total.with_label_values(&[raum]),
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Metrik-Handles eines einzelnen Raums
#[derive(Clone)]
pub struct RaumMetriken {
    pub verbundene_clients: IntGauge,
    pub zugestellt: IntCounter,
    pub entfernt: IntCounter,
    pub verdraengt: IntCounter,
    pub relay_verworfen: IntCounter,
}

impl RaumMetriken {
    /// Nicht registrierte Handles (fuer Tests und eigenstaendige Raeume)
    pub fn lokal() -> Self {
        fn gauge() -> IntGauge {
            IntGauge::new("lokal_gauge", "lokal").expect("statischer Metrikname ungueltig")
        }
        fn counter() -> IntCounter {
            IntCounter::new("lokal_counter", "lokal").expect("statischer Metrikname ungueltig")
        }
        Self {
            verbundene_clients: gauge(),
            zugestellt: counter(),
            entfernt: counter(),
            verdraengt: counter(),
            relay_verworfen: counter(),
        }
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: SprechstubeMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<SprechstubeMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
