//! sprechstube-protocol – Nachrichtenumschlaege
//!
//! Alle Nachrichten sind JSON-Objekte mit einem `type`-Diskriminator.
//! Ausgehende Nachrichten sind getaggte Enums, eingehende werden in
//! Varianten klassifiziert, damit jeder Fall explizit behandelt wird.

pub mod chat;
pub mod error;
pub mod voice;

pub use chat::{ChatEingang, ChatNachricht};
pub use error::ProtokollFehler;
pub use voice::{RelayArt, SignalEingang, SignalNachricht};
