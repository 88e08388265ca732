//! Chat-Raum – Nachrichtenumschlaege
//!
//! Ausgehend: `join`, `leave`, `typing`, `message`, `pong`.
//! Eingehend wird jeder Text-Frame in `ChatEingang` klassifiziert; alles
//! was kein Ping oder Tipp-Signal ist, wird als Chat-Text behandelt.

use serde::{Deserialize, Serialize};
use sprechstube_core::Identitaet;

/// Praefix eines Tipp-Signals so wie es die Web-Clients senden
pub const TIPP_PRAEFIX: &str = r#"{"type":"typing""#;

/// Vom Server versendete Chat-Nachrichten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChatNachricht {
    Join { username: Identitaet },
    Leave { username: Identitaet },
    Typing { username: Identitaet },
    Message { sender: Identitaet, text: String },
    Pong,
}

/// Klassifizierter eingehender Text-Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEingang {
    /// `{"type":"ping"}` – wird nur dem Absender mit `pong` beantwortet
    Ping,
    /// Gueltiges JSON-Objekt mit `type == "typing"`
    Tippen,
    /// Beginnt mit `TIPP_PRAEFIX`, ist aber kein gueltiges JSON.
    /// Wird wie normaler Text verteilt.
    MissgebildetesTippen(String),
    /// Beliebiger Text (unveraendert)
    Text(String),
}

impl ChatEingang {
    /// Ordnet einen rohen Text-Frame einer Variante zu
    pub fn klassifizieren(roh: &str) -> Self {
        let getrimmt = roh.trim();

        match typ_feld(getrimmt).as_deref() {
            Some("ping") => Self::Ping,
            Some("typing") => Self::Tippen,
            _ if getrimmt.starts_with(TIPP_PRAEFIX) => Self::MissgebildetesTippen(roh.to_string()),
            _ => Self::Text(roh.to_string()),
        }
    }
}

fn typ_feld(roh: &str) -> Option<String> {
    if !roh.starts_with('{') {
        return None;
    }
    let wert: serde_json::Value = serde_json::from_str(roh).ok()?;
    wert.get("type")?.as_str().map(str::to_owned)
}
