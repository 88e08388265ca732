//! Request-Timing Middleware fuer Axum
//!
//! Misst die Antwortzeit jeder HTTP-Anfrage, protokolliert sie als
//! strukturiertes Log-Event und traegt sie in die Prometheus-Histogramme ein.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, Response},
    middleware::Next,
};
use std::time::Instant;

use crate::metrics::SprechstubeMetrics;

/// Erstellt den Tracing-Layer fuer HTTP-Anfragen.
pub fn request_timing_layer() -> tower_http::trace::TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
> {
    use tower_http::trace::TraceLayer;
    TraceLayer::new_for_http()
}

/// Axum-Middleware-Funktion: misst Antwortzeit, loggt strukturiert und
/// aktualisiert die HTTP-Metriken.
///
/// Verwendung:
/// ```ignore
/// Router::new()
///     .route("/", get(handler))
///     .layer(axum::middleware::from_fn_with_state(metriken, timing_middleware))
/// ```
pub async fn timing_middleware(
    State(metriken): State<SprechstubeMetrics>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    let methode = req.method().to_string();
    // Routen-Muster statt konkretem Pfad, damit Benutzernamen keine Labels erzeugen
    let pfad = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unbekannt".to_string());
    let start = Instant::now();

    let response = next.run(req).await;

    let dauer = start.elapsed();
    let status = response.status().as_u16();

    metriken
        .http_requests_total
        .with_label_values(&[&methode, &pfad, &status.to_string()])
        .inc();
    metriken
        .http_request_duration_seconds
        .with_label_values(&[&methode, &pfad])
        .observe(dauer.as_secs_f64());

    tracing::debug!(
        method = %methode,
        path = %pfad,
        status = status,
        duration_ms = dauer.as_millis(),
        bucket = dauer_bucket(dauer.as_millis() as u64),
        "HTTP-Anfrage abgeschlossen"
    );

    response
}

/// Hilfsfunktion: Gibt den Bucket-Namen fuer eine Dauer (in ms) zurueck.
pub fn dauer_bucket(dauer_ms: u64) -> &'static str {
    match dauer_ms {
        0..=1 => "<=1ms",
        2..=5 => "<=5ms",
        6..=10 => "<=10ms",
        11..=25 => "<=25ms",
        26..=50 => "<=50ms",
        51..=100 => "<=100ms",
        101..=250 => "<=250ms",
        251..=500 => "<=500ms",
        501..=1000 => "<=1s",
        _ => ">1s",
    }
}
