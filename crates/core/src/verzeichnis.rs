//! Benutzerverzeichnis – Schnittstelle zur externen Benutzerverwaltung
//!
//! Der Kern fragt beim Verbindungsaufbau nur `existiert` ab. Die
//! Passwortpruefung wird ausschliesslich vom Login-Endpunkt benutzt.

use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{kanonisieren, Identitaet};

/// Externe Benutzer- und Zugangsdaten-Abfrage
pub trait BenutzerVerzeichnis: Send + Sync {
    /// Prueft ob die Identitaet bekannt ist
    fn existiert(&self, identitaet: &Identitaet) -> bool;

    /// Prueft ob das Geheimnis zur Identitaet passt
    fn zugangsdaten_pruefen(&self, identitaet: &Identitaet, geheimnis: &str) -> bool;

    /// Alle bekannten Identitaeten (sortiert)
    fn identitaeten(&self) -> Vec<Identitaet>;
}

/// In-Memory-Verzeichnis mit Klartext-Passwoertern (aus der Konfiguration)
#[derive(Debug, Clone, Default)]
pub struct StatischesVerzeichnis {
    benutzer: BTreeMap<Identitaet, String>,
}

impl StatischesVerzeichnis {
    /// Erstellt ein Verzeichnis aus (Benutzername, Passwort)-Paaren
    ///
    /// Die Namen werden kanonisiert; ein ungueltiger Name ist ein Fehler.
    pub fn neu<I, N, P>(eintraege: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, P)>,
        N: AsRef<str>,
        P: Into<String>,
    {
        let mut benutzer = BTreeMap::new();
        for (name, passwort) in eintraege {
            let identitaet = kanonisieren(name.as_ref())?;
            if identitaet.as_str() != name.as_ref() {
                tracing::warn!(
                    roh = name.as_ref(),
                    identitaet = %identitaet,
                    "Benutzername im Verzeichnis wurde kanonisiert"
                );
            }
            benutzer.insert(identitaet, passwort.into());
        }
        Ok(Self { benutzer })
    }

    pub fn anzahl(&self) -> usize {
        self.benutzer.len()
    }
}

impl BenutzerVerzeichnis for StatischesVerzeichnis {
    fn existiert(&self, identitaet: &Identitaet) -> bool {
        self.benutzer.contains_key(identitaet)
    }

    fn zugangsdaten_pruefen(&self, identitaet: &Identitaet, geheimnis: &str) -> bool {
        self.benutzer
            .get(identitaet)
            .is_some_and(|passwort| passwort == geheimnis)
    }

    fn identitaeten(&self) -> Vec<Identitaet> {
        self.benutzer.keys().cloned().collect()
    }
}
