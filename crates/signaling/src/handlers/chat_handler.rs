//! Chat-Handler – Beitritt, Text, Tipp-Signale, Ping und Austritt
//!
//! Jeder Text-Frame wird in `ChatEingang` klassifiziert:
//! - `Ping` wird nur dem Absender mit `pong` beantwortet
//! - `Tippen` geht als `typing` an alle ausser dem Absender
//! - alles andere geht als `message` an alle, inklusive Absender

use sprechstube_protocol::{ChatEingang, ChatNachricht};

use crate::broadcast::EventBroadcaster;
use crate::connection::ClientSender;
use crate::error::SignalingResult;
use crate::handlers::{austritt_abmelden, RaumSitzung};

/// Sitzung einer Verbindung im Chat-Raum
pub struct ChatSitzung {
    raum: EventBroadcaster,
    sender: ClientSender,
}

impl ChatSitzung {
    /// Registriert die Verbindung und kuendigt sie den anderen mit `join` an
    pub fn beitreten(raum: EventBroadcaster, sender: ClientSender) -> Self {
        raum.register().registrieren(sender.clone());

        let join = ChatNachricht::Join {
            username: sender.identitaet.clone(),
        };
        raum.an_alle_ausser_senden(&sender.identitaet, &join);

        tracing::info!(identitaet = %sender.identitaet, "Chat beigetreten");

        Self { raum, sender }
    }
}

impl RaumSitzung for ChatSitzung {
    fn text_verarbeiten(&mut self, text: &str) -> SignalingResult<()> {
        match ChatEingang::klassifizieren(text) {
            ChatEingang::Ping => {
                self.raum.an_verbindung_senden(&self.sender, &ChatNachricht::Pong);
            }
            ChatEingang::Tippen => {
                let typing = ChatNachricht::Typing {
                    username: self.sender.identitaet.clone(),
                };
                self.raum.an_alle_ausser_senden(&self.sender.identitaet, &typing);
            }
            ChatEingang::MissgebildetesTippen(roh) => {
                tracing::debug!(
                    identitaet = %self.sender.identitaet,
                    "Tipp-Signal nicht parsebar, wird als Text verteilt"
                );
                self.nachricht_verteilen(roh);
            }
            ChatEingang::Text(roh) => self.nachricht_verteilen(roh),
        }
        Ok(())
    }

    fn beenden(self) {
        if !austritt_abmelden(&self.raum, &self.sender) {
            // Ersetzt: die neue Verbindung meldet ihren eigenen Austritt
            tracing::debug!(identitaet = %self.sender.identitaet, "Verdraengte Chat-Sitzung beendet");
            return;
        }
        let leave = ChatNachricht::Leave {
            username: self.sender.identitaet.clone(),
        };
        self.raum.an_alle_ausser_senden(&self.sender.identitaet, &leave);
        tracing::info!(identitaet = %self.sender.identitaet, "Chat verlassen");
    }
}

impl ChatSitzung {
    fn nachricht_verteilen(&self, text: String) {
        let nachricht = ChatNachricht::Message {
            sender: self.sender.identitaet.clone(),
            text,
        };
        self.raum.an_alle_senden(&nachricht);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{verbindung_erstellen, Ausgehend, VerbindungsEmpfaenger};
    use crate::registry::{RaumArt, Verbindungsregister};
    use serde_json::{json, Value};
    use sprechstube_core::kanonisieren;
    use sprechstube_observability::RaumMetriken;

    fn raum() -> EventBroadcaster {
        EventBroadcaster::neu(Verbindungsregister::neu(RaumArt::Chat, RaumMetriken::lokal()))
    }

    fn verbinden(raum: &EventBroadcaster, name: &str) -> (ChatSitzung, VerbindungsEmpfaenger) {
        let (sender, empfaenger) = verbindung_erstellen(kanonisieren(name).unwrap(), 16);
        (ChatSitzung::beitreten(raum.clone(), sender), empfaenger)
    }

    fn alle(e: &mut VerbindungsEmpfaenger) -> Vec<Value> {
        let mut werte = Vec::new();
        while let Ok(Ausgehend::Text(t)) = e.rx.try_recv() {
            werte.push(serde_json::from_str(&t).unwrap());
        }
        werte
    }

    #[tokio::test]
    async fn join_geht_nur_an_andere() {
        let raum = raum();
        let (_alice, mut alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");

        assert_eq!(alle(&mut alice_rx), vec![json!({"type": "join", "username": "bob"})]);
        assert!(alle(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn ping_wird_nur_dem_absender_beantwortet() {
        let raum = raum();
        let (mut alice, mut alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        alle(&mut alice_rx);

        alice.text_verarbeiten(r#"{"type":"ping"}"#).unwrap();

        assert_eq!(alle(&mut alice_rx), vec![json!({"type": "pong"})]);
        assert!(alle(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn tippen_traegt_eigene_identitaet() {
        let raum = raum();
        let (mut alice, mut alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        alle(&mut alice_rx);

        // Mitgesendeter username wird ignoriert
        alice
            .text_verarbeiten(r#"{"type":"typing","username":"mallory"}"#)
            .unwrap();

        assert!(alle(&mut alice_rx).is_empty());
        assert_eq!(alle(&mut bob_rx), vec![json!({"type": "typing", "username": "alice"})]);
    }

    #[tokio::test]
    async fn kaputtes_tippen_wird_als_text_verteilt() {
        let raum = raum();
        let (mut alice, mut alice_rx) = verbinden(&raum, "alice");
        let roh = r#"{"type":"typing" kaputt"#;

        alice.text_verarbeiten(roh).unwrap();

        assert_eq!(
            alle(&mut alice_rx),
            vec![json!({"type": "message", "sender": "alice", "text": roh})]
        );
    }

    #[tokio::test]
    async fn beenden_meldet_leave() {
        let raum = raum();
        let (alice, _alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");

        alice.beenden();

        assert_eq!(alle(&mut bob_rx), vec![json!({"type": "leave", "username": "alice"})]);
        assert_eq!(raum.register().schnappschuss(), vec![kanonisieren("bob").unwrap()]);
    }

    #[tokio::test]
    async fn verdraengte_sitzung_meldet_kein_leave() {
        let raum = raum();
        let (alt, _alt_rx) = verbinden(&raum, "alice");
        let (_neu, _neu_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");

        alt.beenden();

        assert!(alle(&mut bob_rx).is_empty());
        assert!(raum.register().ist_registriert(&kanonisieren("alice").unwrap()));
    }

    #[tokio::test]
    async fn verdraengte_sitzung_nach_neuer_meldet_kein_zweites_leave() {
        let raum = raum();
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        let (alt, _alt_rx) = verbinden(&raum, "alice");
        let (neu, _neu_rx) = verbinden(&raum, "alice");
        alle(&mut bob_rx);

        // Neue Verbindung geht zuerst, danach raeumt die alte auf
        neu.beenden();
        alt.beenden();

        assert_eq!(alle(&mut bob_rx), vec![json!({"type": "leave", "username": "alice"})]);
        assert_eq!(raum.register().schnappschuss(), vec![kanonisieren("bob").unwrap()]);
    }

    #[tokio::test]
    async fn pong_an_verdraengte_sitzung_erreicht_neue_nicht() {
        let raum = raum();
        let (mut alt, mut alt_rx) = verbinden(&raum, "alice");
        let (_neu, mut neu_rx) = verbinden(&raum, "alice");

        alt.text_verarbeiten(r#"{"type":"ping"}"#).unwrap();

        assert_eq!(alle(&mut alt_rx), vec![json!({"type": "pong"})]);
        assert!(alle(&mut neu_rx).is_empty());
    }

    #[tokio::test]
    async fn fehlgeschlagenes_pong_entfernt_absender() {
        let raum = raum();
        let (mut alice, VerbindungsEmpfaenger { rx, .. }) = verbinden(&raum, "alice");
        drop(rx);

        alice.text_verarbeiten(r#"{"type":"ping"}"#).unwrap();

        assert!(!raum.register().ist_registriert(&kanonisieren("alice").unwrap()));
        assert_eq!(raum.register().metriken().entfernt.get(), 1);
    }
}
