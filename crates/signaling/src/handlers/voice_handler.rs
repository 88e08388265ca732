//! Voice-Handler – Presence und Signaling-Relay
//!
//! Der Voice-Raum kennt keine Broadcast-Fallbacks: unbekannte Typen werden
//! verworfen, `offer`/`answer`/`ice` gehen nur an ihr Ziel.

use sprechstube_protocol::voice::weiterleitung;
use sprechstube_protocol::{SignalEingang, SignalNachricht};

use crate::broadcast::{EventBroadcaster, Zustellung};
use crate::connection::ClientSender;
use crate::error::SignalingResult;
use crate::handlers::{austritt_abmelden, RaumSitzung};

/// Sitzung einer Verbindung im Voice-Raum
pub struct VoiceSitzung {
    raum: EventBroadcaster,
    sender: ClientSender,
}

impl VoiceSitzung {
    /// Registriert die Verbindung, verteilt die neue Teilnehmerliste und
    /// kuendigt die Identitaet allen anderen mit `new-user` an
    pub fn beitreten(raum: EventBroadcaster, sender: ClientSender) -> Self {
        raum.register().registrieren(sender.clone());

        let sitzung = Self { raum, sender };
        sitzung.teilnehmer_verteilen();
        sitzung.ankuendigen();

        tracing::info!(identitaet = %sitzung.sender.identitaet, "Voice beigetreten");
        sitzung
    }

    fn teilnehmer_verteilen(&self) {
        let users = SignalNachricht::Users {
            users: self.raum.register().schnappschuss(),
        };
        self.raum.an_alle_senden(&users);
    }

    fn ankuendigen(&self) {
        let new_user = SignalNachricht::NewUser {
            username: self.sender.identitaet.clone(),
        };
        self.raum.an_alle_ausser_senden(&self.sender.identitaet, &new_user);
    }
}

impl RaumSitzung for VoiceSitzung {
    fn text_verarbeiten(&mut self, text: &str) -> SignalingResult<()> {
        match SignalEingang::parsen(text)? {
            SignalEingang::Joined => self.ankuendigen(),

            SignalEingang::Relay {
                art,
                ziel,
                umschlag,
            } => {
                let nachricht = weiterleitung(umschlag, &self.sender.identitaet);
                match self.raum.an_user_senden(&ziel, &nachricht) {
                    Zustellung::Zugestellt => {
                        tracing::trace!(
                            art = art.as_str(),
                            von = %self.sender.identitaet,
                            ziel = %ziel,
                            "Signaling weitergeleitet"
                        );
                    }
                    Zustellung::NichtVerbunden | Zustellung::Entfernt => {
                        self.raum.register().metriken().relay_verworfen.inc();
                    }
                }
            }

            SignalEingang::RelayOhneZiel(art) => {
                tracing::warn!(
                    art = art.as_str(),
                    von = %self.sender.identitaet,
                    "Signaling ohne gueltiges Ziel verworfen"
                );
                self.raum.register().metriken().relay_verworfen.inc();
            }

            SignalEingang::Unbekannt(typ) => {
                tracing::debug!(typ = ?typ, von = %self.sender.identitaet, "Unbekannter Typ ignoriert");
            }
        }
        Ok(())
    }

    fn beenden(self) {
        if !austritt_abmelden(&self.raum, &self.sender) {
            tracing::debug!(identitaet = %self.sender.identitaet, "Verdraengte Voice-Sitzung beendet");
            return;
        }
        self.teilnehmer_verteilen();
        tracing::info!(identitaet = %self.sender.identitaet, "Voice verlassen");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{verbindung_erstellen, Ausgehend, VerbindungsEmpfaenger};
    use crate::error::SignalingError;
    use crate::registry::{RaumArt, Verbindungsregister};
    use serde_json::{json, Value};
    use sprechstube_core::kanonisieren;
    use sprechstube_observability::RaumMetriken;

    fn raum() -> EventBroadcaster {
        EventBroadcaster::neu(Verbindungsregister::neu(RaumArt::Voice, RaumMetriken::lokal()))
    }

    fn verbinden(raum: &EventBroadcaster, name: &str) -> (VoiceSitzung, VerbindungsEmpfaenger) {
        let (sender, empfaenger) = verbindung_erstellen(kanonisieren(name).unwrap(), 16);
        (VoiceSitzung::beitreten(raum.clone(), sender), empfaenger)
    }

    fn alle(e: &mut VerbindungsEmpfaenger) -> Vec<Value> {
        let mut werte = Vec::new();
        while let Ok(Ausgehend::Text(t)) = e.rx.try_recv() {
            werte.push(serde_json::from_str(&t).unwrap());
        }
        werte
    }

    #[tokio::test]
    async fn beitritt_verteilt_users_und_new_user() {
        let raum = raum();
        let (_alice, mut alice_rx) = verbinden(&raum, "alice");
        assert_eq!(alle(&mut alice_rx), vec![json!({"type": "users", "users": ["alice"]})]);

        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        assert_eq!(
            alle(&mut alice_rx),
            vec![
                json!({"type": "users", "users": ["alice", "bob"]}),
                json!({"type": "new-user", "username": "bob"}),
            ]
        );
        assert_eq!(
            alle(&mut bob_rx),
            vec![json!({"type": "users", "users": ["alice", "bob"]})]
        );
    }

    #[tokio::test]
    async fn joined_kuendigt_erneut_an() {
        let raum = raum();
        let (mut alice, mut alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        alle(&mut alice_rx);
        alle(&mut bob_rx);

        alice.text_verarbeiten(r#"{"type":"joined"}"#).unwrap();

        assert!(alle(&mut alice_rx).is_empty());
        assert_eq!(alle(&mut bob_rx), vec![json!({"type": "new-user", "username": "alice"})]);
    }

    #[tokio::test]
    async fn relay_geht_nur_ans_ziel() {
        let raum = raum();
        let (mut alice, mut alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        let (_carol, mut carol_rx) = verbinden(&raum, "carol");
        alle(&mut alice_rx);
        alle(&mut bob_rx);
        alle(&mut carol_rx);

        alice
            .text_verarbeiten(r#"{"type":"answer","target":"bob","sdp":"v=0"}"#)
            .unwrap();

        assert_eq!(
            alle(&mut bob_rx),
            vec![json!({"type": "answer", "target": "bob", "sdp": "v=0", "from": "alice"})]
        );
        assert!(alle(&mut alice_rx).is_empty());
        assert!(alle(&mut carol_rx).is_empty());
    }

    #[tokio::test]
    async fn relay_an_abwesendes_ziel_wird_verworfen() {
        let raum = raum();
        let (mut alice, mut alice_rx) = verbinden(&raum, "alice");
        alle(&mut alice_rx);

        alice
            .text_verarbeiten(r#"{"type":"ice","target":"carol","candidate":{}}"#)
            .unwrap();
        alice.text_verarbeiten(r#"{"type":"offer"}"#).unwrap();

        assert!(alle(&mut alice_rx).is_empty());
        assert_eq!(raum.register().metriken().relay_verworfen.get(), 2);
    }

    #[tokio::test]
    async fn unbekannter_typ_wird_ignoriert() {
        let raum = raum();
        let (mut alice, mut alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        alle(&mut alice_rx);
        alle(&mut bob_rx);

        alice.text_verarbeiten(r#"{"type":"chat","text":"hi"}"#).unwrap();
        alice.text_verarbeiten(r#"{"kein":"typ"}"#).unwrap();

        assert!(alle(&mut alice_rx).is_empty());
        assert!(alle(&mut bob_rx).is_empty());
    }

    #[tokio::test]
    async fn kaputtes_json_ist_fatal() {
        let raum = raum();
        let (mut alice, _alice_rx) = verbinden(&raum, "alice");

        assert!(matches!(
            alice.text_verarbeiten("kein json"),
            Err(SignalingError::Protokoll(_))
        ));
        assert!(matches!(
            alice.text_verarbeiten("[1,2]"),
            Err(SignalingError::Protokoll(_))
        ));
    }

    #[tokio::test]
    async fn beenden_verteilt_neue_liste() {
        let raum = raum();
        let (alice, _alice_rx) = verbinden(&raum, "alice");
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        alle(&mut bob_rx);

        alice.beenden();

        assert_eq!(alle(&mut bob_rx), vec![json!({"type": "users", "users": ["bob"]})]);
    }

    #[tokio::test]
    async fn verdraengte_sitzung_nach_neuer_verteilt_keine_liste() {
        let raum = raum();
        let (_bob, mut bob_rx) = verbinden(&raum, "bob");
        let (alt, _alt_rx) = verbinden(&raum, "alice");
        let (neu, _neu_rx) = verbinden(&raum, "alice");
        alle(&mut bob_rx);

        neu.beenden();
        alt.beenden();

        assert_eq!(alle(&mut bob_rx), vec![json!({"type": "users", "users": ["bob"]})]);
    }
}
