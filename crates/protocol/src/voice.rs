//! Voice-Raum – Signaling-Umschlaege
//!
//! Der Server vermittelt nur Presence (`users`, `new-user`) und leitet
//! `offer`/`answer`/`ice` unveraendert an das Ziel weiter. Die Medien selbst
//! laufen Peer-to-Peer ausserhalb des Servers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sprechstube_core::{kanonisieren, Identitaet};

use crate::error::ProtokollFehler;

/// Vom Server erzeugte Presence-Nachrichten
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalNachricht {
    /// Vollstaendige Liste der Identitaeten im Voice-Raum
    Users { users: Vec<Identitaet> },
    /// Ein anderer Teilnehmer ist (erneut) beigetreten
    NewUser { username: Identitaet },
}

/// Art einer weitergeleiteten Signaling-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayArt {
    Offer,
    Answer,
    Ice,
}

impl RelayArt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Ice => "ice",
        }
    }

    fn aus_typ(typ: &str) -> Option<Self> {
        match typ {
            "offer" => Some(Self::Offer),
            "answer" => Some(Self::Answer),
            "ice" => Some(Self::Ice),
            _ => None,
        }
    }
}

/// Klassifizierte eingehende Voice-Nachricht
#[derive(Debug, Clone, PartialEq)]
pub enum SignalEingang {
    /// Client meldet sich (erneut) an; alle anderen bekommen `new-user`
    Joined,
    /// Punkt-zu-Punkt-Weiterleitung an `ziel`
    Relay {
        art: RelayArt,
        ziel: Identitaet,
        umschlag: Map<String, Value>,
    },
    /// Relay-Typ ohne (gueltiges) `target`-Feld
    RelayOhneZiel(RelayArt),
    /// Unbekannter oder fehlender `type`
    Unbekannt(Option<String>),
}

impl SignalEingang {
    /// Parst einen Text-Frame. Ungueltiges JSON oder ein Nicht-Objekt ist ein Fehler.
    pub fn parsen(roh: &str) -> Result<Self, ProtokollFehler> {
        let wert: Value = serde_json::from_str(roh)?;
        let Value::Object(umschlag) = wert else {
            return Err(ProtokollFehler::KeinObjekt);
        };

        let typ = umschlag.get("type").and_then(Value::as_str).map(str::to_owned);

        let eingang = match typ.as_deref() {
            Some("joined") => Self::Joined,
            Some(t) => match RelayArt::aus_typ(t) {
                Some(art) => {
                    let ziel = umschlag
                        .get("target")
                        .and_then(Value::as_str)
                        .and_then(|t| kanonisieren(t).ok());
                    match ziel {
                        Some(ziel) => Self::Relay {
                            art,
                            ziel,
                            umschlag,
                        },
                        None => Self::RelayOhneZiel(art),
                    }
                }
                None => Self::Unbekannt(typ),
            },
            None => Self::Unbekannt(None),
        };

        Ok(eingang)
    }
}

/// Ergaenzt den Originalumschlag um `from` (ueberschreibt ein mitgesendetes `from`)
pub fn weiterleitung(mut umschlag: Map<String, Value>, von: &Identitaet) -> Value {
    umschlag.insert("from".to_string(), Value::String(von.to_string()));
    Value::Object(umschlag)
}
