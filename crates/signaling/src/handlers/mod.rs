//! Raum-Sitzungen
//!
//! Eine Sitzung lebt so lange wie die Lese-Schleife ihrer Verbindung. Sie
//! bekommt jeden eingehenden Text-Frame in Reihenfolge und raeumt beim Ende
//! ihren Registereintrag selbst wieder ab.

pub mod chat_handler;
pub mod voice_handler;

use crate::broadcast::EventBroadcaster;
use crate::connection::{ClientSender, Trenngrund};
use crate::error::SignalingResult;
use crate::registry::Abmeldung;

/// Protokoll eines Raums aus Sicht einer einzelnen Verbindung
pub trait RaumSitzung: Send {
    /// Verarbeitet einen Text-Frame. Ein Fehler beendet die Verbindung.
    fn text_verarbeiten(&mut self, text: &str) -> SignalingResult<()>;

    /// Wird genau einmal nach Ende der Lese-Schleife aufgerufen
    fn beenden(self)
    where
        Self: Sized;
}

/// Meldet die Verbindung im Raum ab
///
/// Gibt `true` zurueck, wenn der Austritt den anderen gemeldet werden soll.
/// Eine verdraengte Verbindung meldet nie einen Austritt, auch wenn die
/// neuere Verbindung den Raum schon wieder verlassen hat.
pub(crate) fn austritt_abmelden(raum: &EventBroadcaster, sender: &ClientSender) -> bool {
    let abmeldung = raum
        .register()
        .abmelden_verbindung(&sender.identitaet, sender.verbindungs_id);
    abmeldung != Abmeldung::Verdraengt && sender.trenngrund() != Some(Trenngrund::Verdraengt)
}
