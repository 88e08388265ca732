//! Fehlertypen fuer Sprechstube
//!
//! Zentraler Fehler-Enum fuer die Basistypen. Die uebrigen Crates definieren
//! eigene Fehler und konvertieren via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Sprechstube
pub type Result<T> = std::result::Result<T, SprechstubeError>;

/// Fehler der Basisschicht
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SprechstubeError {
    /// Nach der Kanonisierung blieb nichts uebrig
    #[error("Ungueltige Identitaet: {0:?}")]
    UngueltigeIdentitaet(String),

    /// Identitaet ist gueltig, aber dem Verzeichnis nicht bekannt
    #[error("Unbekannte Identitaet: {0}")]
    UnbekannteIdentitaet(String),
}
