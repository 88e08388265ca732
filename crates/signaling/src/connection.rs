//! Client-Connection – Verwaltet eine einzelne WebSocket-Verbindung
//!
//! Jede Verbindung bekommt zwei Tasks:
//! - einen Schreib-Task, der als einziger auf den Socket schreibt und die
//!   Send-Queue (`mpsc`) der Verbindung leert
//! - die Lese-Schleife, die eingehende Frames in Reihenfolge an die
//!   Raum-Sitzung uebergibt
//!
//! Broadcasts schreiben nie direkt auf den Socket, sondern nur in die Queue.
//!
//! ## State Machine
//! ```text
//! Verbindend --(Identitaet ok)--> Aktiv --(Close/Fehler/Trennsignal)--> Geschlossen
//!     |
//!     +--(Identitaet ungueltig/unbekannt)--> Close 1008 "invalid username"
//! ```

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use sprechstube_core::{Identitaet, VerbindungsId};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::handlers::{chat_handler::ChatSitzung, voice_handler::VoiceSitzung, RaumSitzung};
use crate::registry::RaumArt;
use crate::server_state::SignalingState;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Close-Code bei abgelehnter Identitaet (Policy Violation)
pub const CLOSE_UNGUELTIGE_IDENTITAET: u16 = 1008;
pub const GRUND_UNGUELTIGE_IDENTITAET: &str = "invalid username";

/// Wie lange nach Sitzungsende auf den Schreib-Task gewartet wird
const SCHREIBER_NACHLAUF: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Ausgehende Queue
// ---------------------------------------------------------------------------

/// Eintrag in der Send-Queue einer Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ausgehend {
    Text(String),
    Schliessen { code: u16, grund: &'static str },
}

/// Warum eine Verbindung von aussen beendet wird
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trenngrund {
    /// Neue Verbindung derselben Identitaet hat den Eintrag ersetzt
    Verdraengt,
    /// Senden ist fehlgeschlagen, Eintrag wurde entfernt
    Entfernt,
    /// Server faehrt herunter
    Herunterfahren,
}

impl Trenngrund {
    pub fn close_code(&self) -> u16 {
        match self {
            Self::Verdraengt => 1000,
            Self::Entfernt => 1011,
            Self::Herunterfahren => 1001,
        }
    }

    pub fn close_grund(&self) -> &'static str {
        match self {
            Self::Verdraengt => "replaced by new connection",
            Self::Entfernt => "delivery failed",
            Self::Herunterfahren => "server shutting down",
        }
    }
}

// ---------------------------------------------------------------------------
// ClientSender
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
///
/// Das Register haelt nur dieses Handle; der Socket gehoert dem Schreib-Task.
#[derive(Clone, Debug)]
pub struct ClientSender {
    pub identitaet: Identitaet,
    pub verbindungs_id: VerbindungsId,
    tx: mpsc::Sender<Ausgehend>,
    trennen_tx: Arc<watch::Sender<Option<Trenngrund>>>,
}

impl ClientSender {
    /// Reiht eine Nachricht nicht-blockierend ein
    ///
    /// Gibt `false` zurueck wenn die Queue voll oder geschlossen ist.
    pub fn senden(&self, text: String) -> bool {
        match self.tx.try_send(Ausgehend::Text(text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(identitaet = %self.identitaet, "Send-Queue voll, Nachricht verworfen");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(identitaet = %self.identitaet, "Send-Queue geschlossen (Client getrennt)");
                false
            }
        }
    }

    /// Signalisiert der Lese-Schleife, die Verbindung zu beenden
    pub fn trennen(&self, grund: Trenngrund) {
        self.trennen_tx.send_replace(Some(grund));
    }

    /// Grund, mit dem die Verbindung von aussen getrennt wurde, falls schon
    pub fn trenngrund(&self) -> Option<Trenngrund> {
        *self.trennen_tx.borrow()
    }

    /// Reiht einen Close-Frame ein (best effort)
    pub fn schliessen(&self, code: u16, grund: &'static str) {
        let _ = self.tx.try_send(Ausgehend::Schliessen { code, grund });
    }
}

/// Empfangsseite einer Verbindung (gehoert dem Verbindungs-Task)
#[derive(Debug)]
pub struct VerbindungsEmpfaenger {
    pub rx: mpsc::Receiver<Ausgehend>,
    pub trennen_rx: watch::Receiver<Option<Trenngrund>>,
}

/// Erstellt Send-Queue und Trennsignal fuer eine neue Verbindung
pub fn verbindung_erstellen(
    identitaet: Identitaet,
    queue_groesse: usize,
) -> (ClientSender, VerbindungsEmpfaenger) {
    let (tx, rx) = mpsc::channel(queue_groesse.max(1));
    let (trennen_tx, trennen_rx) = watch::channel(None);
    let sender = ClientSender {
        identitaet,
        verbindungs_id: VerbindungsId::new(),
        tx,
        trennen_tx: Arc::new(trennen_tx),
    };
    (sender, VerbindungsEmpfaenger { rx, trennen_rx })
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne WebSocket-Verbindung in einem Raum
pub struct ClientConnection {
    state: Arc<SignalingState>,
    raum: RaumArt,
    roher_name: String,
}

impl ClientConnection {
    pub fn neu(state: Arc<SignalingState>, raum: RaumArt, roher_name: String) -> Self {
        Self {
            state,
            raum,
            roher_name,
        }
    }

    /// Laeuft bis der Client trennt, die Verbindung ersetzt/entfernt wird
    /// oder der Server herunterfaehrt.
    pub async fn verarbeiten(self, mut socket: WebSocket) {
        if self.state.faehrt_herunter() {
            let grund = Trenngrund::Herunterfahren;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: grund.close_code(),
                    reason: Cow::Borrowed(grund.close_grund()),
                })))
                .await;
            return;
        }

        let identitaet = match self.state.zulassen(&self.roher_name) {
            Ok(identitaet) => identitaet,
            Err(e) => {
                tracing::warn!(
                    raum = self.raum.as_str(),
                    roh = %self.roher_name,
                    fehler = %e,
                    "Verbindung abgelehnt"
                );
                let _ = socket
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_UNGUELTIGE_IDENTITAET,
                        reason: Cow::Borrowed(GRUND_UNGUELTIGE_IDENTITAET),
                    })))
                    .await;
                return;
            }
        };

        let (sender, empfaenger) =
            verbindung_erstellen(identitaet, self.state.config.send_queue_groesse);

        tracing::info!(
            raum = self.raum.as_str(),
            identitaet = %sender.identitaet,
            verbindung = %sender.verbindungs_id,
            "Neue Verbindung"
        );

        match self.raum {
            RaumArt::Chat => {
                let sitzung = ChatSitzung::beitreten(self.state.chat.clone(), sender.clone());
                sitzung_betreiben(sitzung, socket, sender, empfaenger).await;
            }
            RaumArt::Voice => {
                let sitzung = VoiceSitzung::beitreten(self.state.voice.clone(), sender.clone());
                sitzung_betreiben(sitzung, socket, sender, empfaenger).await;
            }
        }
    }
}

/// Treibt eine zugelassene Sitzung: Schreib-Task + Lese-Schleife + Cleanup
async fn sitzung_betreiben<S: RaumSitzung>(
    mut sitzung: S,
    socket: WebSocket,
    sender: ClientSender,
    empfaenger: VerbindungsEmpfaenger,
) {
    let (mut sink, mut stream) = socket.split();
    let VerbindungsEmpfaenger { mut rx, mut trennen_rx } = empfaenger;

    // Einziger Schreiber auf den Socket
    let mut schreiber = tokio::spawn(async move {
        while let Some(ausgehend) = rx.recv().await {
            let (nachricht, ende) = match ausgehend {
                Ausgehend::Text(text) => (Message::Text(text), false),
                Ausgehend::Schliessen { code, grund } => (
                    Message::Close(Some(CloseFrame {
                        code,
                        reason: Cow::Borrowed(grund),
                    })),
                    true,
                ),
            };
            if let Err(e) = sink.send(nachricht).await {
                tracing::debug!(fehler = %e, "Schreiben auf Socket fehlgeschlagen");
                break;
            }
            if ende {
                break;
            }
        }
        // Restliche Queue verwerfen; spaetere try_send schlagen fehl
        rx.close();
    });

    let mut trenngrund = None;

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = sitzung.text_verarbeiten(&text) {
                            tracing::warn!(
                                identitaet = %sender.identitaet,
                                fehler = %e,
                                "Nachricht fuehrt zum Verbindungsabbruch"
                            );
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(identitaet = %sender.identitaet, "Verbindung vom Client getrennt");
                        break;
                    }
                    // Binary wird ignoriert, Ping/Pong beantwortet axum selbst
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(identitaet = %sender.identitaet, fehler = %e, "Lesefehler");
                        break;
                    }
                }
            }

            Ok(()) = trennen_rx.changed() => {
                let grund = *trennen_rx.borrow();
                if let Some(grund) = grund {
                    tracing::info!(
                        identitaet = %sender.identitaet,
                        grund = ?grund,
                        "Verbindung wird serverseitig getrennt"
                    );
                    trenngrund = Some(grund);
                    break;
                }
            }
        }
    }

    sitzung.beenden();

    if let Some(grund) = trenngrund {
        sender.schliessen(grund.close_code(), grund.close_grund());
    }
    drop(sender);

    if tokio::time::timeout(SCHREIBER_NACHLAUF, &mut schreiber)
        .await
        .is_err()
    {
        schreiber.abort();
    }

    tracing::debug!("Verbindungs-Task beendet");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
