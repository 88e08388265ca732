//! Identitaeten und Verbindungs-IDs
//!
//! Jede externe Eingabe eines Benutzernamens (Login-Seite, Passwortpruefung,
//! WebSocket-Upgrade) laeuft durch `kanonisieren`, damit alle Pfade sich auf
//! dieselbe Identitaet einigen.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use uuid::Uuid;

use crate::error::{Result, SprechstubeError};

/// Zusaetzlich erlaubte Zeichen: persisches Alphabet plus Leerzeichen
pub const ERLAUBTE_ZEICHEN: &str = "آابپتثجچحخدذرزژسشصضطظعغفقکگلمنوهیئ ";

fn zeichen_erlaubt(c: char) -> bool {
    c.is_alphanumeric() || ERLAUBTE_ZEICHEN.contains(c)
}

/// Bildet einen rohen Benutzernamen auf seine kanonische Form ab
///
/// Behaelt nur alphanumerische Zeichen und Zeichen aus `ERLAUBTE_ZEICHEN`,
/// entfernt Leerraum an Anfang und Ende. Ein leeres Ergebnis ist ungueltig.
pub fn kanonisieren(roh: &str) -> Result<Identitaet> {
    let gefiltert: String = roh.chars().filter(|c| zeichen_erlaubt(*c)).collect();
    let getrimmt = gefiltert.trim();

    if getrimmt.is_empty() {
        return Err(SprechstubeError::UngueltigeIdentitaet(roh.to_string()));
    }

    Ok(Identitaet(getrimmt.to_string()))
}

/// Kanonische Identitaet eines Benutzers
///
/// Kann nur ueber `kanonisieren` (bzw. `TryFrom`) erzeugt werden und ist
/// damit nie leer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identitaet(String);

impl Identitaet {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identitaet {
    type Error = SprechstubeError;

    fn try_from(roh: String) -> Result<Self> {
        kanonisieren(&roh)
    }
}

impl TryFrom<&str> for Identitaet {
    type Error = SprechstubeError;

    fn try_from(roh: &str) -> Result<Self> {
        kanonisieren(roh)
    }
}

impl From<Identitaet> for String {
    fn from(identitaet: Identitaet) -> Self {
        identitaet.0
    }
}

impl AsRef<str> for Identitaet {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Identitaet {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identitaet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Eindeutige ID einer einzelnen Transportverbindung
///
/// Unterscheidet zwei Verbindungen derselben Identitaet, z.B. nach einem
/// Reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerbindungsId(pub Uuid);

impl VerbindungsId {
    /// Erstellt eine neue zufaellige VerbindungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VerbindungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for VerbindungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}
