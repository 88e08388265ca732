//! sprechstube-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;
pub mod login;

use anyhow::Result;
use axum::Router;
use config::ServerConfig;
use sprechstube_core::StatischesVerzeichnis;
use sprechstube_observability::{
    health_router, observability_server_starten, request_timing_layer, timing_middleware,
    HealthState, SprechstubeMetrics,
};
use sprechstube_signaling::{ws_router, SignalingConfig, SignalingState};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

/// Wie lange nach dem Shutdown-Signal auf offene WebSockets gewartet wird
const SHUTDOWN_FRIST: Duration = Duration::from_secs(5);

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Baut Zustand und Router aus der Konfiguration
    pub fn aufbauen(&self) -> Result<(Arc<SignalingState>, SprechstubeMetrics, HealthState, Router)> {
        let verzeichnis = StatischesVerzeichnis::neu(
            self.config
                .benutzer
                .iter()
                .map(|(name, passwort)| (name.as_str(), passwort.clone())),
        )?;
        if verzeichnis.anzahl() == 0 {
            tracing::warn!("Benutzerverzeichnis ist leer, jede Verbindung wird abgelehnt");
        }

        let metriken = SprechstubeMetrics::neu()?;
        let state = SignalingState::neu(
            SignalingConfig {
                send_queue_groesse: self.config.raeume.send_queue_groesse,
            },
            Arc::new(verzeichnis),
            &metriken,
        );

        let zaehler_state = Arc::clone(&state);
        let health = HealthState::neu(Arc::new(move || zaehler_state.verbindungen_je_raum()));

        let app = app_router(
            Arc::clone(&state),
            health.clone(),
            metriken.clone(),
            &self.config.statik.verzeichnis,
        );

        Ok((state, metriken, health, app))
    }

    /// Bindet den HTTP/WebSocket-Listener und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.http_bind_adresse()).await?;
        self.betreiben(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(fehler = %e, "Ctrl-C Handler konnte nicht installiert werden");
            }
            tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
        })
        .await
    }

    /// Betreibt alle Server-Subsysteme auf `listener` bis `signal` endet
    ///
    /// Reihenfolge:
    /// 1. Verzeichnis, Raeume und Metriken aufbauen
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. HTTP/WebSocket-Anfragen bedienen
    /// 4. Nach dem Signal alle Verbindungen mit 1001 trennen und auf ihr
    ///    Ende warten
    pub async fn betreiben<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (state, metriken, health, app) = self.aufbauen()?;
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        tracing::info!(
            server_name = %self.config.server.name,
            http = %self.config.http_bind_adresse(),
            benutzer = self.config.benutzer.len(),
            "Server startet"
        );

        if self.config.observability.aktiviert {
            let addr: SocketAddr = self.config.observability_bind_adresse().parse()?;
            let metriken = metriken.clone();
            let health = health.clone();
            tokio::spawn(async move {
                if let Err(e) = observability_server_starten(addr, metriken, health, shutdown_rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            });
        }

        tracing::info!(addr = %listener.local_addr()?, "HTTP/WebSocket-Server bereit");

        let shutdown_state = Arc::clone(&state);
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                health.herunterfahren_melden();
                shutdown_state.herunterfahren();
                let _ = shutdown_tx.send(true);
            })
            .await?;

        // WebSockets zaehlen nach dem Upgrade nicht mehr zu axums Verbindungen
        state.verbindungen_abwarten(SHUTDOWN_FRIST).await;

        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Haupt-Router: WebSockets, Login, Health und statische Dateien
pub fn app_router(
    state: Arc<SignalingState>,
    health: HealthState,
    metriken: SprechstubeMetrics,
    statik_verzeichnis: &str,
) -> Router {
    Router::new()
        .merge(ws_router(Arc::clone(&state)))
        .merge(login::login_router(Arc::clone(&state.verzeichnis)))
        .merge(health_router(health))
        .nest_service("/static", ServeDir::new(statik_verzeichnis))
        .layer(axum::middleware::from_fn_with_state(
            metriken,
            timing_middleware,
        ))
        .layer(request_timing_layer())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use futures_util::{SinkExt, StreamExt};
    use std::collections::BTreeMap;
    use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
    use tower::ServiceExt;

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    const WARTEZEIT: Duration = Duration::from_secs(5);

    async fn naechste(ws: &mut Client) -> Message {
        tokio::time::timeout(WARTEZEIT, ws.next())
            .await
            .expect("Timeout beim Lesen")
            .expect("Verbindung unerwartet beendet")
            .expect("Lesefehler")
    }

    async fn close_frame(ws: &mut Client) -> (u16, String) {
        loop {
            if let Message::Close(Some(frame)) = naechste(ws).await {
                return (u16::from(frame.code), frame.reason.into_owned());
            }
        }
    }

    /// Ping/Pong-Runde: danach ist die Sitzung sicher registriert
    async fn aktiv(ws: &mut Client) {
        ws.send(Message::Text(r#"{"type":"ping"}"#.into())).await.unwrap();
        loop {
            if let Message::Text(text) = naechste(ws).await {
                if text == r#"{"type":"pong"}"# {
                    return;
                }
            }
        }
    }

    fn server() -> Server {
        let mut config = ServerConfig::default();
        config.benutzer = BTreeMap::from([
            ("alice".to_string(), "a".to_string()),
            ("bob".to_string(), "b".to_string()),
        ]);
        Server::neu(config)
    }

    #[tokio::test]
    async fn health_meldet_raeume() {
        let (_state, _metriken, _health, app) = server().aufbauen().unwrap();

        let antwort = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);

        let bytes = to_bytes(antwort.into_body(), usize::MAX).await.unwrap();
        let wert: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(wert["connections"]["chat"], 0);
        assert_eq!(wert["connections"]["voice"], 0);
    }

    #[tokio::test]
    async fn anfragen_werden_gezaehlt() {
        let (_state, metriken, _health, app) = server().aufbauen().unwrap();

        app.oneshot(Request::get("/api/users").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let export = metriken.exportieren().unwrap();
        assert!(export.contains("/api/users"));
    }

    #[tokio::test]
    async fn shutdown_schliesst_websockets_mit_1001() {
        let mut server = server();
        server.config.observability.aktiviert = false;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
        let laeuft = tokio::spawn(server.betreiben(listener, async move {
            let _ = signal_rx.await;
        }));

        let (mut alice, _) = connect_async(format!("ws://{addr}/ws/alice")).await.unwrap();
        let (mut bob, _) = connect_async(format!("ws://{addr}/voice/bob")).await.unwrap();
        aktiv(&mut alice).await;
        // Voice kennt kein ping; users beim Beitritt zeigt die Registrierung
        assert!(matches!(naechste(&mut bob).await, Message::Text(_)));

        signal_tx.send(()).unwrap();

        let erwartet = (1001, "server shutting down".to_string());
        assert_eq!(close_frame(&mut alice).await, erwartet);
        assert_eq!(close_frame(&mut bob).await, erwartet);

        tokio::time::timeout(WARTEZEIT, laeuft)
            .await
            .expect("Server hat nach dem Shutdown nicht beendet")
            .unwrap()
            .unwrap();
    }

    #[test]
    fn ungueltiger_benutzername_in_config_ist_fehler() {
        let mut config = ServerConfig::default();
        config.benutzer.insert("!!!".into(), "x".into());
        assert!(Server::neu(config).aufbauen().is_err());
    }
}
