//! sprechstube-signaling – Presence- und Relay-Schicht
//!
//! Dieser Crate implementiert die beiden Echtzeit-Raeume von Sprechstube:
//! einen Chat-Raum (Text, Tipp-Signale, Join/Leave) und einen Voice-Raum,
//! der nur Presence verteilt und WebRTC-Signaling Punkt-zu-Punkt weiterleitet.
//!
//! ## Architektur
//!
//! ```text
//! ws_router (axum, /ws/:username und /voice/:username)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task + Schreib-Task)
//!     |  State Machine: Verbindend -> Aktiv -> Geschlossen
//!     |
//!     +-- ChatSitzung   (join, typing, message, ping/pong, leave)
//!     +-- VoiceSitzung  (users, new-user, offer/answer/ice Relay)
//!
//! EventBroadcaster    – Broadcast mit Entfernen nach Sendefehler, Direktnachricht
//! Verbindungsregister – Identitaet -> Verbindung, eins pro Raum
//! ```

pub mod broadcast;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod server_state;
pub mod ws;

// Bequeme Re-Exporte
pub use broadcast::{BroadcastBericht, EventBroadcaster, Zustellung};
pub use connection::{
    verbindung_erstellen, Ausgehend, ClientConnection, ClientSender, Trenngrund,
    VerbindungsEmpfaenger,
};
pub use error::{SignalingError, SignalingResult};
pub use handlers::{chat_handler::ChatSitzung, voice_handler::VoiceSitzung, RaumSitzung};
pub use registry::{Abmeldung, RaumArt, Verbindungsregister};
pub use server_state::{SignalingConfig, SignalingState};
pub use ws::ws_router;
