//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt beide Raeume und das Benutzerverzeichnis als Arc-Referenzen, die
//! sicher zwischen tokio-Tasks geteilt werden koennen. Jede Instanz besitzt
//! eigene Register, Tests teilen also keinen Zustand.
//!
//! Upgegradete WebSockets laufen ausserhalb von axums Graceful Shutdown.
//! Deshalb verfolgt der Zustand jede Verbindung selbst in einem `TaskTracker`,
//! damit der Server beim Herunterfahren auf die Close-Frames warten kann.

use sprechstube_core::{kanonisieren, BenutzerVerzeichnis, Identitaet, SprechstubeError};
use sprechstube_observability::SprechstubeMetrics;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::task_tracker::TrackedFuture;
use tokio_util::task::TaskTracker;

use crate::broadcast::EventBroadcaster;
use crate::connection::Trenngrund;
use crate::error::SignalingResult;
use crate::registry::{RaumArt, Verbindungsregister};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            send_queue_groesse: 64,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    /// Server-Konfiguration
    pub config: Arc<SignalingConfig>,
    /// Externes Benutzerverzeichnis (nur `existiert` wird bei Zulassung gefragt)
    pub verzeichnis: Arc<dyn BenutzerVerzeichnis>,
    /// Chat-Raum
    pub chat: EventBroadcaster,
    /// Voice-Raum
    pub voice: EventBroadcaster,
    /// Laufende Verbindungs-Tasks; geschlossen heisst "faehrt herunter"
    verbindungen: TaskTracker,
}

impl SignalingState {
    /// Erstellt einen neuen SignalingState mit leeren Raeumen
    pub fn neu(
        config: SignalingConfig,
        verzeichnis: Arc<dyn BenutzerVerzeichnis>,
        metriken: &SprechstubeMetrics,
    ) -> Arc<Self> {
        let raum = |art: RaumArt| {
            EventBroadcaster::neu(Verbindungsregister::neu(art, metriken.raum(art.as_str())))
        };

        Arc::new(Self {
            config: Arc::new(config),
            verzeichnis,
            chat: raum(RaumArt::Chat),
            voice: raum(RaumArt::Voice),
            verbindungen: TaskTracker::new(),
        })
    }

    /// Prueft eine rohe Identitaet bei der Zulassung einer Verbindung
    ///
    /// Kanonisiert und fragt dann das Verzeichnis. Schlaegt eins von beiden
    /// fehl, wird die Verbindung abgelehnt.
    pub fn zulassen(&self, roh: &str) -> SignalingResult<Identitaet> {
        let identitaet = kanonisieren(roh)?;
        if !self.verzeichnis.existiert(&identitaet) {
            return Err(SprechstubeError::UnbekannteIdentitaet(identitaet.to_string()).into());
        }
        Ok(identitaet)
    }

    pub fn raum(&self, art: RaumArt) -> &EventBroadcaster {
        match art {
            RaumArt::Chat => &self.chat,
            RaumArt::Voice => &self.voice,
        }
    }

    /// Anzahl Verbindungen pro Raum (fuer /health)
    pub fn verbindungen_je_raum(&self) -> BTreeMap<String, usize> {
        [RaumArt::Chat, RaumArt::Voice]
            .into_iter()
            .map(|art| (art.as_str().to_string(), self.raum(art).register().anzahl()))
            .collect()
    }

    /// Verfolgt den Task einer Verbindung bis zu ihrem Ende
    pub fn verbindung_verfolgen<F: Future<Output = ()>>(&self, verbindung: F) -> TrackedFuture<F> {
        self.verbindungen.track_future(verbindung)
    }

    pub fn faehrt_herunter(&self) -> bool {
        self.verbindungen.is_closed()
    }

    /// Wartet bis alle verfolgten Verbindungen beendet sind
    ///
    /// Gibt `false` zurueck, wenn die Frist vorher ablaeuft. Nur sinnvoll
    /// nach `herunterfahren`, vorher endet das Warten nie.
    pub async fn verbindungen_abwarten(&self, frist: Duration) -> bool {
        let fertig = tokio::time::timeout(frist, self.verbindungen.wait())
            .await
            .is_ok();
        if !fertig {
            tracing::warn!(
                offen = self.verbindungen.len(),
                "Verbindungen nicht rechtzeitig beendet"
            );
        }
        fertig
    }

    /// Trennt alle Verbindungen beider Raeume mit Close 1001
    ///
    /// Danach neu eintreffende Verbindungen werden sofort mit 1001 geschlossen.
    pub fn herunterfahren(&self) {
        self.verbindungen.close();
        for art in [RaumArt::Chat, RaumArt::Voice] {
            let sender = self.raum(art).register().sender_schnappschuss();
            tracing::info!(raum = art.as_str(), anzahl = sender.len(), "Trenne Verbindungen");
            for s in sender {
                s.trennen(Trenngrund::Herunterfahren);
            }
        }
    }
}
