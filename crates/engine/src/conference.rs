//! Konferenz-Zustand
//!
//! Eine Konferenz haelt ihre Mitglieder in einer nach Nummer sortierten Map
//! hinter einem eigenen parking_lot::Mutex. Verschiedene Konferenzen
//! konkurrieren daher nie um denselben Lock.
//!
//! ## Lebenszyklus
//! `Laeuft` -> `Auslaufend` (letztes Mitglied weg oder Engine-Stopp) ->
//! `Beendet` (Mischer hat seinen letzten Tick abgeschlossen). Der Wechsel
//! nach `Auslaufend` passiert unter demselben Lock wie die Leer-Pruefung,
//! ein Beitritt sieht also entweder eine laufende Konferenz mit Mitgliedern
//! oder eine auslaufende, die er ersetzen muss.

use crate::config::EngineConfig;
use crate::member::{Mitglied, MitgliedBefehl, MitgliedBeschreibung, MitgliedInfo};
use chrono::{DateTime, Utc};
use konferenz_core::{KonferenzId, MitgliedId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Lebenszyklus-Zustand einer Konferenz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KonferenzZustand {
    /// Normale Tick-Schleife
    Laeuft,
    /// Letzter Tick wird noch abgeschlossen
    Auslaufend,
    /// Mischer beendet
    Beendet,
}

struct MitgliederListe {
    mitglieder: BTreeMap<MitgliedId, Arc<Mitglied>>,
    naechste_id: u32,
    zustand: KonferenzZustand,
}

/// Eine Konferenz mit ihren Mitgliedern und Mischer-Kennzahlen
pub struct Konferenz {
    id: KonferenzId,
    erstellt: DateTime<Utc>,
    liste: Mutex<MitgliederListe>,
    /// Einziger Schreiber: Mischer
    aktive_quelle: Mutex<Option<MitgliedId>>,
    ticks: AtomicU64,
    ueberlaeufe: AtomicU64,
    auslaufen_tx: watch::Sender<bool>,
    mischer: Mutex<Option<JoinHandle<()>>>,
}

impl Konferenz {
    pub(crate) fn neu(id: KonferenzId) -> Self {
        let (auslaufen_tx, _) = watch::channel(false);
        Self {
            id,
            erstellt: Utc::now(),
            liste: Mutex::new(MitgliederListe {
                mitglieder: BTreeMap::new(),
                naechste_id: 1,
                zustand: KonferenzZustand::Laeuft,
            }),
            aktive_quelle: Mutex::new(None),
            ticks: AtomicU64::new(0),
            ueberlaeufe: AtomicU64::new(0),
            auslaufen_tx,
            mischer: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &KonferenzId {
        &self.id
    }

    pub fn zustand(&self) -> KonferenzZustand {
        self.liste.lock().zustand
    }

    pub fn ist_laufend(&self) -> bool {
        self.zustand() == KonferenzZustand::Laeuft
    }

    pub fn mitglieder_anzahl(&self) -> usize {
        self.liste.lock().mitglieder.len()
    }

    // -----------------------------------------------------------------------
    // Mitglieder
    // -----------------------------------------------------------------------

    /// Fuegt ein Mitglied hinzu und vergibt seine Nummer
    ///
    /// Gibt `None` zurueck, wenn die Konferenz bereits auslaeuft.
    pub(crate) fn mitglied_hinzufuegen(
        &self,
        beschreibung: &MitgliedBeschreibung,
        config: &EngineConfig,
        verworfen_gesamt: Arc<AtomicU64>,
    ) -> Option<(Arc<Mitglied>, mpsc::Receiver<MitgliedBefehl>)> {
        let mut liste = self.liste.lock();
        if liste.zustand != KonferenzZustand::Laeuft {
            return None;
        }

        let mut id = liste.naechste_id;
        while liste.mitglieder.contains_key(&MitgliedId(id)) || id == 0 {
            id = id.wrapping_add(1);
        }
        liste.naechste_id = id.wrapping_add(1);

        let (mitglied, befehl_rx) =
            Mitglied::neu(MitgliedId(id), beschreibung, config, verworfen_gesamt);
        let mitglied = Arc::new(mitglied);
        liste.mitglieder.insert(MitgliedId(id), Arc::clone(&mitglied));
        Some((mitglied, befehl_rx))
    }

    /// Entfernt ein Mitglied
    ///
    /// Gibt das Mitglied und `true` zurueck, wenn die Konferenz dadurch leer
    /// wurde. In diesem Fall ist sie bereits auf `Auslaufend` gesetzt und
    /// der Mischer benachrichtigt.
    pub(crate) fn mitglied_entfernen(&self, id: MitgliedId) -> Option<(Arc<Mitglied>, bool)> {
        let (mitglied, leer) = {
            let mut liste = self.liste.lock();
            let mitglied = liste.mitglieder.remove(&id)?;
            let leer = liste.mitglieder.is_empty() && liste.zustand == KonferenzZustand::Laeuft;
            if leer {
                liste.zustand = KonferenzZustand::Auslaufend;
            }
            (mitglied, leer)
        };
        if leer {
            self.auslaufen_tx.send_replace(true);
        }
        Some((mitglied, leer))
    }

    pub(crate) fn mitglied(&self, id: MitgliedId) -> Option<Arc<Mitglied>> {
        self.liste.lock().mitglieder.get(&id).cloned()
    }

    /// Aktuelle Mitglieder (Arc-Klone, Lock ist danach wieder frei)
    pub(crate) fn schnappschuss(&self) -> Vec<Arc<Mitglied>> {
        self.liste.lock().mitglieder.values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Lebenszyklus
    // -----------------------------------------------------------------------

    /// Setzt die Konferenz auf `Auslaufend` (Engine-Stopp); idempotent
    pub(crate) fn auslaufen(&self) -> bool {
        let gewechselt = {
            let mut liste = self.liste.lock();
            if liste.zustand == KonferenzZustand::Laeuft {
                liste.zustand = KonferenzZustand::Auslaufend;
                true
            } else {
                false
            }
        };
        self.auslaufen_tx.send_replace(true);
        gewechselt
    }

    pub(crate) fn beenden(&self) {
        self.liste.lock().zustand = KonferenzZustand::Beendet;
    }

    pub(crate) fn auslaufen_empfaenger(&self) -> watch::Receiver<bool> {
        self.auslaufen_tx.subscribe()
    }

    pub(crate) fn mischer_setzen(&self, handle: JoinHandle<()>) {
        *self.mischer.lock() = Some(handle);
    }

    pub(crate) fn mischer_nehmen(&self) -> Option<JoinHandle<()>> {
        self.mischer.lock().take()
    }

    // -----------------------------------------------------------------------
    // Mischer-Kennzahlen
    // -----------------------------------------------------------------------

    pub fn aktive_quelle(&self) -> Option<MitgliedId> {
        *self.aktive_quelle.lock()
    }

    pub(crate) fn quelle_setzen(&self, quelle: Option<MitgliedId>) {
        *self.aktive_quelle.lock() = quelle;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn tick_zaehlen(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ueberlaeufe(&self) -> u64 {
        self.ueberlaeufe.load(Ordering::Relaxed)
    }

    pub(crate) fn ueberlauf_zaehlen(&self) {
        self.ueberlaeufe.fetch_add(1, Ordering::Relaxed);
    }

    /// Momentaufnahme; `mit_mitgliedern` fuellt die Mitgliederliste
    pub fn info(&self, mit_mitgliedern: bool) -> KonferenzInfo {
        let (zustand, anzahl, mitglieder) = {
            let liste = self.liste.lock();
            let mitglieder = if mit_mitgliedern {
                liste.mitglieder.values().map(|m| m.info()).collect()
            } else {
                Vec::new()
            };
            (liste.zustand, liste.mitglieder.len(), mitglieder)
        };
        KonferenzInfo {
            id: self.id.clone(),
            zustand,
            mitglieder_anzahl: anzahl,
            aktive_quelle: self.aktive_quelle(),
            ticks: self.ticks(),
            ueberlaeufe: self.ueberlaeufe(),
            erstellt: self.erstellt,
            mitglieder,
        }
    }
}

impl std::fmt::Debug for Konferenz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Konferenz")
            .field("id", &self.id)
            .field("zustand", &self.zustand())
            .field("mitglieder", &self.mitglieder_anzahl())
            .finish()
    }
}

/// Zusammenfassung einer Konferenz fuer `auflisten`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KonferenzInfo {
    pub id: KonferenzId,
    pub zustand: KonferenzZustand,
    pub mitglieder_anzahl: usize,
    pub aktive_quelle: Option<MitgliedId>,
    pub ticks: u64,
    pub ueberlaeufe: u64,
    pub erstellt: DateTime<Utc>,
    /// Nur bei Detailabfrage gefuellt
    pub mitglieder: Vec<MitgliedInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn konferenz() -> Konferenz {
        Konferenz::neu(KonferenzId::parse("room1").unwrap())
    }

    fn hinzufuegen(k: &Konferenz, name: &str) -> Arc<Mitglied> {
        k.mitglied_hinzufuegen(
            &MitgliedBeschreibung::neu(name),
            &EngineConfig::default(),
            Arc::new(AtomicU64::new(0)),
        )
        .expect("Konferenz laeuft")
        .0
    }

    #[test]
    fn nummern_werden_fortlaufend_vergeben() {
        let k = konferenz();
        assert_eq!(hinzufuegen(&k, "a").id(), MitgliedId(1));
        assert_eq!(hinzufuegen(&k, "b").id(), MitgliedId(2));
        k.mitglied_entfernen(MitgliedId(1));
        // Nummern werden nicht wiederverwendet
        assert_eq!(hinzufuegen(&k, "c").id(), MitgliedId(3));
        assert_eq!(k.mitglieder_anzahl(), 2);
    }

    #[test]
    fn letztes_mitglied_laesst_auslaufen() {
        let k = konferenz();
        let mut rx = k.auslaufen_empfaenger();
        hinzufuegen(&k, "a");
        hinzufuegen(&k, "b");

        let (_, leer) = k.mitglied_entfernen(MitgliedId(1)).unwrap();
        assert!(!leer);
        assert!(k.ist_laufend());

        let (_, leer) = k.mitglied_entfernen(MitgliedId(2)).unwrap();
        assert!(leer);
        assert_eq!(k.zustand(), KonferenzZustand::Auslaufend);
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }

    #[test]
    fn auslaufende_konferenz_nimmt_niemanden_auf() {
        let k = konferenz();
        hinzufuegen(&k, "a");
        k.mitglied_entfernen(MitgliedId(1));
        assert!(k
            .mitglied_hinzufuegen(
                &MitgliedBeschreibung::neu("spaet"),
                &EngineConfig::default(),
                Arc::new(AtomicU64::new(0)),
            )
            .is_none());
    }

    #[test]
    fn unbekanntes_mitglied_entfernen() {
        let k = konferenz();
        assert!(k.mitglied_entfernen(MitgliedId(99)).is_none());
        assert!(k.ist_laufend(), "Entfernen eines Unbekannten aendert nichts");
    }

    #[test]
    fn auslaufen_ist_idempotent() {
        let k = konferenz();
        assert!(k.auslaufen());
        assert!(!k.auslaufen());
        k.beenden();
        assert_eq!(k.zustand(), KonferenzZustand::Beendet);
    }

    #[test]
    fn info_mit_und_ohne_mitglieder() {
        let k = konferenz();
        hinzufuegen(&k, "a");
        hinzufuegen(&k, "b");
        k.quelle_setzen(Some(MitgliedId(2)));

        let kurz = k.info(false);
        assert_eq!(kurz.mitglieder_anzahl, 2);
        assert!(kurz.mitglieder.is_empty());
        assert_eq!(kurz.aktive_quelle, Some(MitgliedId(2)));

        let detail = k.info(true);
        let namen: Vec<_> = detail.mitglieder.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(namen, vec!["a", "b"]);
    }
}
