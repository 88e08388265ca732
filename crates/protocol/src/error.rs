//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("Ungueltiges JSON: {0}")]
    UngueltigesJson(#[from] serde_json::Error),

    /// Gueltiges JSON, aber kein Objekt (z.B. Array oder Zahl)
    #[error("Nachricht ist kein JSON-Objekt")]
    KeinObjekt,
}
