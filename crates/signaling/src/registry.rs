//! Verbindungsregister – Identitaet -> Verbindung, ein Register pro Raum
//!
//! Das Register ist der einzige geteilte, veraenderliche Zustand eines Raums.
//! Alle Verbindungs-Tasks greifen gleichzeitig darauf zu (Connect, Disconnect,
//! Entfernen nach Sendefehler), daher liegt es in einer `DashMap`.

use dashmap::DashMap;
use sprechstube_core::{Identitaet, VerbindungsId};
use sprechstube_observability::RaumMetriken;
use std::sync::Arc;

use crate::connection::{ClientSender, Trenngrund};

/// Die beiden festen Raeume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RaumArt {
    Chat,
    Voice,
}

impl RaumArt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Voice => "voice",
        }
    }
}

/// Ergebnis von `abmelden_verbindung`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Abmeldung {
    /// Der Eintrag gehoerte dieser Verbindung und wurde entfernt
    Entfernt,
    /// Kein Eintrag fuer die Identitaet (z.B. schon wegen Sendefehler entfernt)
    NichtVorhanden,
    /// Eintrag gehoert inzwischen einer neueren Verbindung und bleibt bestehen
    Verdraengt,
}

/// Register aller Verbindungen eines Raums
///
/// Thread-safe via Arc + DashMap. Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct Verbindungsregister {
    inner: Arc<RegisterInner>,
}

struct RegisterInner {
    raum: RaumArt,
    eintraege: DashMap<Identitaet, ClientSender>,
    metriken: RaumMetriken,
}

impl Verbindungsregister {
    pub fn neu(raum: RaumArt, metriken: RaumMetriken) -> Self {
        Self {
            inner: Arc::new(RegisterInner {
                raum,
                eintraege: DashMap::new(),
                metriken,
            }),
        }
    }

    pub fn raum(&self) -> RaumArt {
        self.inner.raum
    }

    pub fn metriken(&self) -> &RaumMetriken {
        &self.inner.metriken
    }

    /// Traegt eine Verbindung ein und ersetzt einen bestehenden Eintrag
    ///
    /// Eine ersetzte Verbindung bekommt das Trennsignal `Verdraengt` und wird
    /// zurueckgegeben.
    pub fn registrieren(&self, sender: ClientSender) -> Option<ClientSender> {
        let identitaet = sender.identitaet.clone();
        let vorher = self.inner.eintraege.insert(identitaet.clone(), sender);
        self.anzahl_melden();

        if let Some(ref alt) = vorher {
            tracing::info!(
                raum = self.inner.raum.as_str(),
                identitaet = %identitaet,
                alte_verbindung = %alt.verbindungs_id,
                "Bestehende Verbindung ersetzt"
            );
            self.inner.metriken.verdraengt.inc();
            alt.trennen(Trenngrund::Verdraengt);
        } else {
            tracing::debug!(raum = self.inner.raum.as_str(), identitaet = %identitaet, "Verbindung registriert");
        }

        vorher
    }

    /// Entfernt den Eintrag einer Identitaet, falls vorhanden (idempotent)
    pub fn abmelden(&self, identitaet: &Identitaet) -> Option<ClientSender> {
        let entfernt = self.inner.eintraege.remove(identitaet).map(|(_, s)| s);
        if entfernt.is_some() {
            self.anzahl_melden();
            tracing::debug!(raum = self.inner.raum.as_str(), identitaet = %identitaet, "Verbindung abgemeldet");
        }
        entfernt
    }

    /// Entfernt den Eintrag nur, wenn er noch zu `verbindungs_id` gehoert
    pub fn abmelden_verbindung(
        &self,
        identitaet: &Identitaet,
        verbindungs_id: VerbindungsId,
    ) -> Abmeldung {
        let entfernt = self
            .inner
            .eintraege
            .remove_if(identitaet, |_, s| s.verbindungs_id == verbindungs_id);

        if entfernt.is_some() {
            self.anzahl_melden();
            tracing::debug!(raum = self.inner.raum.as_str(), identitaet = %identitaet, "Verbindung abgemeldet");
            Abmeldung::Entfernt
        } else if self.inner.eintraege.contains_key(identitaet) {
            Abmeldung::Verdraengt
        } else {
            Abmeldung::NichtVorhanden
        }
    }

    /// Momentaufnahme aller Identitaeten, sortiert
    pub fn schnappschuss(&self) -> Vec<Identitaet> {
        let mut identitaeten: Vec<Identitaet> = self
            .inner
            .eintraege
            .iter()
            .map(|e| e.key().clone())
            .collect();
        identitaeten.sort();
        identitaeten
    }

    /// Momentaufnahme aller Sender (fuer Broadcasts)
    ///
    /// Die Handles werden kopiert, damit waehrend des Sendens keine
    /// Shard-Locks gehalten werden.
    pub fn sender_schnappschuss(&self) -> Vec<ClientSender> {
        self.inner
            .eintraege
            .iter()
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn holen(&self, identitaet: &Identitaet) -> Option<ClientSender> {
        self.inner.eintraege.get(identitaet).map(|e| e.value().clone())
    }

    pub fn ist_registriert(&self, identitaet: &Identitaet) -> bool {
        self.inner.eintraege.contains_key(identitaet)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.eintraege.len()
    }

    fn anzahl_melden(&self) {
        self.inner
            .metriken
            .verbundene_clients
            .set(self.inner.eintraege.len() as i64);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
