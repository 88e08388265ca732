//! sprechstube-core – Gemeinsame Typen, Identitaeten und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Sprechstube-Crates gemeinsam genutzt werden:
//! - `Identitaet` und der Kanonisierer fuer rohe Benutzernamen
//! - `BenutzerVerzeichnis` als Schnittstelle zur externen Benutzerverwaltung

pub mod error;
pub mod types;
pub mod verzeichnis;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SprechstubeError};
pub use types::{kanonisieren, Identitaet, VerbindungsId};
pub use verzeichnis::{BenutzerVerzeichnis, StatischesVerzeichnis};
