//! Fehlertypen fuer den Signaling-Service

use sprechstube_core::SprechstubeError;
use sprechstube_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Identitaet ungueltig oder unbekannt (Verbindung wird abgelehnt)
    #[error("Identitaet abgelehnt: {0}")]
    Identitaet(#[from] SprechstubeError),

    /// Eingehende Nachricht konnte nicht gelesen werden
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    /// Ausgehende Nachricht konnte nicht serialisiert werden
    #[error("Serialisierung fehlgeschlagen: {0}")]
    Serialisierung(#[from] serde_json::Error),
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
