//! Mitglieds-Zustand
//!
//! Jedes Feld, das nach dem Beitritt noch veraendert wird, hat genau einen
//! Schreiber und wird atomar gelesen:
//! - `stumm` – Member-Worker (uebernimmt Befehle der Steuerung)
//! - `aktivitaet`, `spricht` – Mischer
//! - `entfernt` – Registry beim Verlassen, sonst der Member-Worker beim
//!   eigenen Austritt
//! - `uebersprungen` – Member-Worker setzt, Mischer loescht
//!
//! Die Steuerung schreibt nie direkt, sondern schickt einen
//! [`MitgliedBefehl`] ueber den Befehlskanal des Mitglieds.

use crate::config::EngineConfig;
use crate::queue::FrameQueue;
use chrono::{DateTime, Utc};
use konferenz_core::MitgliedId;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Notify};

// ---------------------------------------------------------------------------
// Beschreibung & Befehle
// ---------------------------------------------------------------------------

/// Angaben eines beitretenden Mitglieds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MitgliedBeschreibung {
    /// Anzeigename (z.B. Kanalname oder Rufnummer)
    pub name: String,
    /// Tritt stummgeschaltet bei
    pub stumm: bool,
    /// Nur zuhoeren: Eingang wird gelesen, aber nie gemischt
    pub nur_hoeren: bool,
}

impl MitgliedBeschreibung {
    pub fn neu(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Befehle der Steuerung an den Member-Worker
#[derive(Debug)]
pub enum MitgliedBefehl {
    /// Stummschaltung setzen; der Worker bestaetigt nach der Uebernahme
    Stumm {
        stumm: bool,
        bestaetigung: oneshot::Sender<()>,
    },
    /// Auflegen und Konferenz verlassen
    Rauswerfen,
}

// ---------------------------------------------------------------------------
// Mitglied
// ---------------------------------------------------------------------------

/// Zustand eines Mitglieds, geteilt zwischen Registry, Mischer und Member-Worker
pub struct Mitglied {
    id: MitgliedId,
    name: String,
    beigetreten: DateTime<Utc>,
    nur_hoeren: bool,
    /// Call-Leg -> Mischer
    pub(crate) eingang: FrameQueue,
    /// Mischer -> Call-Leg
    pub(crate) ausgang: FrameQueue,
    stumm: AtomicBool,
    /// f32-Bits des Aktivitaets-Scores
    aktivitaet: AtomicU32,
    spricht: AtomicBool,
    entfernt: AtomicBool,
    /// Member-Worker hat Frames absichtlich nicht eingereiht (stumm)
    uebersprungen: AtomicBool,
    entfernt_signal: Notify,
    befehl_tx: mpsc::Sender<MitgliedBefehl>,
}

impl Mitglied {
    /// Erstellt ein Mitglied und gibt die Empfangsseite seines Befehlskanals zurueck
    pub(crate) fn neu(
        id: MitgliedId,
        beschreibung: &MitgliedBeschreibung,
        config: &EngineConfig,
        verworfen_gesamt: Arc<AtomicU64>,
    ) -> (Self, mpsc::Receiver<MitgliedBefehl>) {
        let (befehl_tx, befehl_rx) = mpsc::channel(config.befehl_queue_groesse);
        let mitglied = Self {
            id,
            name: beschreibung.name.clone(),
            beigetreten: Utc::now(),
            nur_hoeren: beschreibung.nur_hoeren,
            eingang: FrameQueue::mit_zaehler(
                config.queue_kapazitaet,
                config.ueberlauf,
                Arc::clone(&verworfen_gesamt),
            ),
            ausgang: FrameQueue::mit_zaehler(
                config.queue_kapazitaet,
                config.ueberlauf,
                verworfen_gesamt,
            ),
            stumm: AtomicBool::new(beschreibung.stumm),
            aktivitaet: AtomicU32::new(0f32.to_bits()),
            spricht: AtomicBool::new(false),
            entfernt: AtomicBool::new(false),
            uebersprungen: AtomicBool::new(false),
            entfernt_signal: Notify::new(),
            befehl_tx,
        };
        (mitglied, befehl_rx)
    }

    pub fn id(&self) -> MitgliedId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn beigetreten(&self) -> DateTime<Utc> {
        self.beigetreten
    }

    // --- Lesen (beliebige Threads) ---

    pub fn ist_stumm(&self) -> bool {
        self.stumm.load(Ordering::Acquire)
    }

    pub fn ist_nur_hoerer(&self) -> bool {
        self.nur_hoeren
    }

    /// True wenn der Eingang dieses Mitglieds gemischt werden darf
    pub fn darf_sprechen(&self) -> bool {
        !self.nur_hoeren && !self.ist_stumm()
    }

    pub fn aktivitaet(&self) -> f32 {
        f32::from_bits(self.aktivitaet.load(Ordering::Relaxed))
    }

    pub fn spricht(&self) -> bool {
        self.spricht.load(Ordering::Relaxed)
    }

    pub fn ist_entfernt(&self) -> bool {
        self.entfernt.load(Ordering::Acquire)
    }

    // --- Schreiben (je genau ein Schreiber) ---

    /// Nur vom Member-Worker aufgerufen
    pub(crate) fn stumm_uebernehmen(&self, stumm: bool) -> bool {
        self.stumm.swap(stumm, Ordering::AcqRel) != stumm
    }

    /// Nur vom Mischer aufgerufen
    pub(crate) fn vad_veroeffentlichen(&self, aktivitaet: f32, spricht: bool) {
        self.aktivitaet.store(aktivitaet.to_bits(), Ordering::Relaxed);
        self.spricht.store(spricht, Ordering::Relaxed);
    }

    /// Von der Registry (weckt den Member-Worker) und beim Aufraeumen des Workers
    pub(crate) fn als_entfernt_markieren(&self) {
        self.entfernt.store(true, Ordering::Release);
        self.entfernt_signal.notify_one();
    }

    /// Vom Member-Worker: Eingangs-Frames wurden wegen Stummschaltung verworfen
    pub(crate) fn uebersprungen_markieren(&self) {
        self.uebersprungen.store(true, Ordering::Release);
    }

    /// Vom Mischer: liest und loescht die Markierung
    pub(crate) fn uebersprungen_nehmen(&self) -> bool {
        self.uebersprungen.swap(false, Ordering::AcqRel)
    }

    /// Wartet bis das Mitglied entfernt wurde
    pub(crate) async fn entfernt_abwarten(&self) {
        while !self.ist_entfernt() {
            self.entfernt_signal.notified().await;
        }
    }

    /// Befehlskanal zum Member-Worker
    pub(crate) fn befehle(&self) -> &mpsc::Sender<MitgliedBefehl> {
        &self.befehl_tx
    }

    /// Gibt die Queues frei
    pub(crate) fn queues_leeren(&self) -> usize {
        self.eingang.leeren() + self.ausgang.leeren()
    }

    /// Momentaufnahme fuer Steuerung und Anzeige
    pub fn info(&self) -> MitgliedInfo {
        MitgliedInfo {
            id: self.id,
            name: self.name.clone(),
            stumm: self.ist_stumm(),
            nur_hoeren: self.nur_hoeren,
            spricht: self.spricht(),
            aktivitaet: self.aktivitaet(),
            beigetreten: self.beigetreten,
            verworfene_frames: self.eingang.verworfen() + self.ausgang.verworfen(),
        }
    }
}

impl std::fmt::Debug for Mitglied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mitglied")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("stumm", &self.ist_stumm())
            .field("spricht", &self.spricht())
            .field("entfernt", &self.ist_entfernt())
            .finish()
    }
}

/// Momentaufnahme eines Mitglieds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MitgliedInfo {
    pub id: MitgliedId,
    pub name: String,
    pub stumm: bool,
    pub nur_hoeren: bool,
    pub spricht: bool,
    pub aktivitaet: f32,
    pub beigetreten: DateTime<Utc>,
    pub verworfene_frames: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn mitglied(beschreibung: MitgliedBeschreibung) -> (Mitglied, mpsc::Receiver<MitgliedBefehl>) {
        Mitglied::neu(
            MitgliedId(1),
            &beschreibung,
            &EngineConfig::default(),
            Arc::new(AtomicU64::new(0)),
        )
    }

    #[test]
    fn neues_mitglied_aus_beschreibung() {
        let (m, _rx) = mitglied(MitgliedBeschreibung {
            name: "SIP/alice-0001".into(),
            stumm: true,
            nur_hoeren: false,
        });
        assert_eq!(m.id(), MitgliedId(1));
        assert_eq!(m.name(), "SIP/alice-0001");
        assert!(m.ist_stumm());
        assert!(!m.darf_sprechen());
        assert!(!m.spricht());
    }

    #[test]
    fn nur_hoerer_darf_nie_sprechen() {
        let (m, _rx) = mitglied(MitgliedBeschreibung {
            nur_hoeren: true,
            ..MitgliedBeschreibung::neu("zuhoerer")
        });
        m.stumm_uebernehmen(false);
        assert!(!m.darf_sprechen());
    }

    #[test]
    fn stumm_uebernehmen_meldet_aenderung() {
        let (m, _rx) = mitglied(MitgliedBeschreibung::neu("bob"));
        assert!(m.stumm_uebernehmen(true));
        assert!(!m.stumm_uebernehmen(true), "zweites Stummschalten aendert nichts");
        assert!(m.stumm_uebernehmen(false));
    }

    #[test]
    fn vad_wird_veroeffentlicht() {
        let (m, _rx) = mitglied(MitgliedBeschreibung::neu("carol"));
        m.vad_veroeffentlichen(0.25, true);
        let info = m.info();
        assert!(info.spricht);
        assert_eq!(info.aktivitaet, 0.25);
    }

    #[test]
    fn queues_leeren_gibt_frames_frei() {
        let (m, _rx) = mitglied(MitgliedBeschreibung::neu("dave"));
        m.eingang.push(Frame::stille(4, 1));
        m.ausgang.push(Frame::stille(4, 1));
        assert_eq!(m.queues_leeren(), 2);
    }

    #[test]
    fn uebersprungen_wird_einmal_gemeldet() {
        let (m, _rx) = mitglied(MitgliedBeschreibung::neu("fritz"));
        assert!(!m.uebersprungen_nehmen());
        m.uebersprungen_markieren();
        m.uebersprungen_markieren();
        assert!(m.uebersprungen_nehmen());
        assert!(!m.uebersprungen_nehmen());
    }

    #[tokio::test]
    async fn entfernt_abwarten_kehrt_zurueck() {
        let (m, _rx) = mitglied(MitgliedBeschreibung::neu("erin"));
        let m = Arc::new(m);
        let wartend = Arc::clone(&m);
        let warten = tokio::spawn(async move { wartend.entfernt_abwarten().await });
        m.als_entfernt_markieren();
        tokio::time::timeout(std::time::Duration::from_secs(1), warten)
            .await
            .expect("Worker muss geweckt werden")
            .unwrap();
        assert!(m.ist_entfernt());
    }
}
