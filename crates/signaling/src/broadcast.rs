//! Event-Broadcaster – Verteilt Nachrichten an die Verbindungen eines Raums
//!
//! ## Ablauf eines Broadcasts
//! 1. Momentaufnahme der Sender aus dem Register ziehen
//! 2. Nachricht einmal serialisieren und an jeden (ausser dem Ausgeschlossenen)
//!    nicht-blockierend einreihen
//! 3. Fehlgeschlagene Empfaenger sammeln und erst nach der Iteration aus dem
//!    Register entfernen
//!
//! Ein einzelner fehlerhafter Empfaenger bricht den Broadcast nie ab. Er
//! verliert nur seine Mitgliedschaft im Raum (kein Retry).

use serde::Serialize;
use sprechstube_core::Identitaet;

use crate::connection::{ClientSender, Trenngrund};
use crate::registry::{Abmeldung, RaumArt, Verbindungsregister};

/// Ergebnis eines Broadcasts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastBericht {
    /// Anzahl erfolgreich eingereihter Nachrichten
    pub zugestellt: usize,
    /// Wegen Sendefehler entfernte Identitaeten
    pub entfernt: Vec<Identitaet>,
}

/// Ergebnis einer Direktnachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zustellung {
    Zugestellt,
    /// Ziel ist nicht im Raum registriert, Nachricht wurde still verworfen
    NichtVerbunden,
    /// Senden schlug fehl, Ziel wurde entfernt
    Entfernt,
}

/// Broadcast- und Relay-Engine eines Raums
///
/// Clone teilt das Register.
#[derive(Clone)]
pub struct EventBroadcaster {
    register: Verbindungsregister,
}

impl EventBroadcaster {
    pub fn neu(register: Verbindungsregister) -> Self {
        Self { register }
    }

    pub fn register(&self) -> &Verbindungsregister {
        &self.register
    }

    pub fn raum(&self) -> RaumArt {
        self.register.raum()
    }

    /// Sendet eine Nachricht an alle Verbindungen des Raums
    pub fn an_alle_senden<T: Serialize>(&self, nachricht: &T) -> BroadcastBericht {
        self.verteilen(nachricht, None)
    }

    /// Sendet eine Nachricht an alle Verbindungen ausser `ausgeschlossen`
    pub fn an_alle_ausser_senden<T: Serialize>(
        &self,
        ausgeschlossen: &Identitaet,
        nachricht: &T,
    ) -> BroadcastBericht {
        self.verteilen(nachricht, Some(ausgeschlossen))
    }

    /// Sendet eine Nachricht an genau eine Identitaet
    ///
    /// Ist das Ziel nicht verbunden, wird die Nachricht still verworfen.
    pub fn an_user_senden<T: Serialize>(&self, ziel: &Identitaet, nachricht: &T) -> Zustellung {
        let Some(sender) = self.register.holen(ziel) else {
            tracing::debug!(raum = self.raum().as_str(), ziel = %ziel, "Senden an nicht verbundenes Ziel verworfen");
            return Zustellung::NichtVerbunden;
        };
        self.an_verbindung_senden(&sender, nachricht)
    }

    /// Sendet eine Nachricht an genau diese Verbindung
    ///
    /// Anders als `an_user_senden` wird nicht ueber die Identitaet
    /// aufgeloest, eine neuere Verbindung desselben Namens bekommt also
    /// nichts. Schlaegt das Senden fehl, wird die Verbindung entfernt.
    pub fn an_verbindung_senden<T: Serialize>(
        &self,
        sender: &ClientSender,
        nachricht: &T,
    ) -> Zustellung {
        let Some(text) = self.serialisieren(nachricht) else {
            return Zustellung::NichtVerbunden;
        };

        if sender.senden(text) {
            self.register.metriken().zugestellt.inc();
            Zustellung::Zugestellt
        } else if self.entfernen(sender) {
            Zustellung::Entfernt
        } else {
            Zustellung::NichtVerbunden
        }
    }

    fn verteilen<T: Serialize>(
        &self,
        nachricht: &T,
        ausgeschlossen: Option<&Identitaet>,
    ) -> BroadcastBericht {
        let Some(text) = self.serialisieren(nachricht) else {
            return BroadcastBericht::default();
        };

        let mut bericht = BroadcastBericht::default();
        let mut fehlgeschlagen: Vec<ClientSender> = Vec::new();

        for sender in self.register.sender_schnappschuss() {
            if Some(&sender.identitaet) == ausgeschlossen {
                continue;
            }
            if sender.senden(text.clone()) {
                bericht.zugestellt += 1;
            } else {
                fehlgeschlagen.push(sender);
            }
        }

        // Zweite Phase: Register erst nach der Iteration veraendern
        for sender in &fehlgeschlagen {
            if self.entfernen(sender) {
                bericht.entfernt.push(sender.identitaet.clone());
            }
        }

        self.register
            .metriken()
            .zugestellt
            .inc_by(bericht.zugestellt as u64);

        bericht
    }

    /// Entfernt einen Empfaenger nach Sendefehler und trennt seine Verbindung
    fn entfernen(&self, sender: &ClientSender) -> bool {
        match self
            .register
            .abmelden_verbindung(&sender.identitaet, sender.verbindungs_id)
        {
            Abmeldung::Entfernt => {
                tracing::info!(
                    raum = self.raum().as_str(),
                    identitaet = %sender.identitaet,
                    "Verbindung nach Sendefehler entfernt"
                );
                self.register.metriken().entfernt.inc();
                sender.trennen(Trenngrund::Entfernt);
                true
            }
            Abmeldung::NichtVorhanden | Abmeldung::Verdraengt => false,
        }
    }

    fn serialisieren<T: Serialize>(&self, nachricht: &T) -> Option<String> {
        match serde_json::to_string(nachricht) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::error!(raum = self.raum().as_str(), fehler = %e, "Nachricht nicht serialisierbar");
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{verbindung_erstellen, Ausgehend, VerbindungsEmpfaenger};
    use serde_json::json;
    use sprechstube_core::kanonisieren;
    use sprechstube_observability::RaumMetriken;

    fn id(name: &str) -> Identitaet {
        kanonisieren(name).unwrap()
    }

    fn broadcaster() -> EventBroadcaster {
        EventBroadcaster::neu(Verbindungsregister::neu(RaumArt::Chat, RaumMetriken::lokal()))
    }

    fn beitreten(b: &EventBroadcaster, name: &str, queue: usize) -> VerbindungsEmpfaenger {
        let (sender, empfaenger) = verbindung_erstellen(id(name), queue);
        b.register().registrieren(sender);
        empfaenger
    }

    fn text(e: &mut VerbindungsEmpfaenger) -> Option<serde_json::Value> {
        match e.rx.try_recv().ok()? {
            Ausgehend::Text(t) => Some(serde_json::from_str(&t).unwrap()),
            Ausgehend::Schliessen { .. } => None,
        }
    }

    #[tokio::test]
    async fn an_alle_senden() {
        let b = broadcaster();
        let mut empfaenger: Vec<_> = (0..5).map(|i| beitreten(&b, &format!("u{i}"), 8)).collect();

        let bericht = b.an_alle_senden(&json!({"type": "ping"}));
        assert_eq!(bericht.zugestellt, 5);
        assert!(bericht.entfernt.is_empty());

        for e in &mut empfaenger {
            assert_eq!(text(e), Some(json!({"type": "ping"})));
        }
        assert_eq!(b.register().metriken().zugestellt.get(), 5);
    }

    #[tokio::test]
    async fn ausgeschlossener_empfaengt_nichts() {
        let b = broadcaster();
        let mut alice = beitreten(&b, "alice", 8);
        let mut bob = beitreten(&b, "bob", 8);

        let bericht = b.an_alle_ausser_senden(&id("alice"), &json!({"type": "x"}));
        assert_eq!(bericht.zugestellt, 1);

        assert!(text(&mut alice).is_none(), "Ausgeschlossene darf nichts empfangen");
        assert_eq!(text(&mut bob), Some(json!({"type": "x"})));
    }

    #[tokio::test]
    async fn fehlgeschlagener_empfaenger_wird_entfernt() {
        let b = broadcaster();
        let mut alice = beitreten(&b, "alice", 8);
        let carol = beitreten(&b, "carol", 8);
        drop(carol); // Queue geschlossen, Senden schlaegt fehl

        let bericht = b.an_alle_senden(&json!({"type": "eins"}));
        assert_eq!(bericht.zugestellt, 1);
        assert_eq!(bericht.entfernt, vec![id("carol")]);
        assert_eq!(b.register().schnappschuss(), vec![id("alice")]);
        assert_eq!(b.register().metriken().entfernt.get(), 1);

        // Spaetere Broadcasts versuchen carol nicht mehr
        let bericht = b.an_alle_senden(&json!({"type": "zwei"}));
        assert_eq!(bericht.zugestellt, 1);
        assert!(bericht.entfernt.is_empty());

        assert_eq!(text(&mut alice), Some(json!({"type": "eins"})));
        assert_eq!(text(&mut alice), Some(json!({"type": "zwei"})));
    }

    #[tokio::test]
    async fn volle_queue_fuehrt_zum_entfernen_und_trennen() {
        let b = broadcaster();
        let mut langsam = beitreten(&b, "langsam", 1);

        assert_eq!(b.an_alle_senden(&json!({"n": 1})).zugestellt, 1);
        let bericht = b.an_alle_senden(&json!({"n": 2}));
        assert_eq!(bericht.entfernt, vec![id("langsam")]);

        langsam.trennen_rx.changed().await.unwrap();
        assert_eq!(*langsam.trennen_rx.borrow(), Some(Trenngrund::Entfernt));
    }

    #[tokio::test]
    async fn direkt_senden() {
        let b = broadcaster();
        let mut bob = beitreten(&b, "bob", 8);

        assert_eq!(
            b.an_user_senden(&id("bob"), &json!({"type": "offer"})),
            Zustellung::Zugestellt
        );
        assert_eq!(text(&mut bob), Some(json!({"type": "offer"})));

        assert_eq!(
            b.an_user_senden(&id("carol"), &json!({"type": "offer"})),
            Zustellung::NichtVerbunden
        );
    }

    #[tokio::test]
    async fn direkt_senden_fehler_entfernt_ziel() {
        let b = broadcaster();
        drop(beitreten(&b, "bob", 8));

        assert_eq!(
            b.an_user_senden(&id("bob"), &json!({"type": "ice"})),
            Zustellung::Entfernt
        );
        assert!(!b.register().ist_registriert(&id("bob")));
    }

    #[tokio::test]
    async fn an_verbindung_senden_fehler_entfernt_und_trennt() {
        let b = broadcaster();
        let (sender, VerbindungsEmpfaenger { rx, mut trennen_rx }) =
            verbindung_erstellen(id("alice"), 8);
        b.register().registrieren(sender.clone());
        drop(rx);

        assert_eq!(
            b.an_verbindung_senden(&sender, &json!({"type": "pong"})),
            Zustellung::Entfernt
        );
        assert!(!b.register().ist_registriert(&id("alice")));
        trennen_rx.changed().await.unwrap();
        assert_eq!(*trennen_rx.borrow(), Some(Trenngrund::Entfernt));
    }

    #[tokio::test]
    async fn entfernen_trifft_keine_neuere_verbindung() {
        let b = broadcaster();
        let (alt, alt_rx) = verbindung_erstellen(id("alice"), 8);
        drop(alt_rx);
        // Alter Sender laeuft in einen Fehler, waehrend schon ein neuer registriert ist
        let (neu, _neu_rx) = verbindung_erstellen(id("alice"), 8);
        let neu_id = neu.verbindungs_id;
        b.register().registrieren(neu);

        assert!(!b.entfernen(&alt));
        assert_eq!(b.register().holen(&id("alice")).unwrap().verbindungs_id, neu_id);
    }
}
