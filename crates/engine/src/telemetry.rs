//! Engine-weite Zaehler
//!
//! Alle Worker schreiben lock-frei in dieselben Atomics. Die Registry
//! liefert daraus mit [`EngineStatistik`] eine Momentaufnahme, die der
//! Server in Prometheus-Metriken uebertraegt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Laufende Zaehler der Engine
#[derive(Debug, Default)]
pub struct EngineZaehler {
    pub(crate) ticks: AtomicU64,
    pub(crate) ueberlaeufe: AtomicU64,
    /// Wird an jede Frame-Queue weitergereicht
    pub(crate) verworfene_frames: Arc<AtomicU64>,
    /// Aus Sequenzluecken erkannte fehlende Frames
    pub(crate) verlorene_frames: AtomicU64,
    pub(crate) beitritte: AtomicU64,
    pub(crate) austritte: AtomicU64,
}

impl EngineZaehler {
    pub fn neu() -> Self {
        Self::default()
    }

    pub(crate) fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ueberlauf(&self) {
        self.ueberlaeufe.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn verloren(&self, anzahl: u64) {
        if anzahl > 0 {
            self.verlorene_frames.fetch_add(anzahl, Ordering::Relaxed);
        }
    }

    pub(crate) fn beitritt(&self) {
        self.beitritte.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn austritt(&self) {
        self.austritte.fetch_add(1, Ordering::Relaxed);
    }

    /// Zaehler fuer die Frame-Queues
    pub(crate) fn verworfen_zaehler(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.verworfene_frames)
    }

    /// Momentaufnahme mit den aktuellen Konferenz- und Mitgliederzahlen
    pub fn schnappschuss(&self, konferenzen: usize, mitglieder: usize) -> EngineStatistik {
        EngineStatistik {
            zeitstempel: Utc::now(),
            konferenzen_aktiv: konferenzen,
            mitglieder_verbunden: mitglieder,
            ticks_gesamt: self.ticks.load(Ordering::Relaxed),
            ueberlaeufe_gesamt: self.ueberlaeufe.load(Ordering::Relaxed),
            verworfene_frames_gesamt: self.verworfene_frames.load(Ordering::Relaxed),
            verlorene_frames_gesamt: self.verlorene_frames.load(Ordering::Relaxed),
            beitritte_gesamt: self.beitritte.load(Ordering::Relaxed),
            austritte_gesamt: self.austritte.load(Ordering::Relaxed),
        }
    }
}

/// Momentaufnahme der Engine-Zaehler
///
/// Alle `*_gesamt`-Felder sind monoton steigend seit Start der Registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistik {
    pub zeitstempel: DateTime<Utc>,
    pub konferenzen_aktiv: usize,
    pub mitglieder_verbunden: usize,
    pub ticks_gesamt: u64,
    pub ueberlaeufe_gesamt: u64,
    pub verworfene_frames_gesamt: u64,
    pub verlorene_frames_gesamt: u64,
    pub beitritte_gesamt: u64,
    pub austritte_gesamt: u64,
}

impl EngineStatistik {
    /// Differenz der monotonen Zaehler seit `vorher` (fuer Counter-Metriken)
    pub fn differenz(&self, vorher: &EngineStatistik) -> EngineStatistik {
        EngineStatistik {
            zeitstempel: self.zeitstempel,
            konferenzen_aktiv: self.konferenzen_aktiv,
            mitglieder_verbunden: self.mitglieder_verbunden,
            ticks_gesamt: self.ticks_gesamt.saturating_sub(vorher.ticks_gesamt),
            ueberlaeufe_gesamt: self.ueberlaeufe_gesamt.saturating_sub(vorher.ueberlaeufe_gesamt),
            verworfene_frames_gesamt: self
                .verworfene_frames_gesamt
                .saturating_sub(vorher.verworfene_frames_gesamt),
            verlorene_frames_gesamt: self
                .verlorene_frames_gesamt
                .saturating_sub(vorher.verlorene_frames_gesamt),
            beitritte_gesamt: self.beitritte_gesamt.saturating_sub(vorher.beitritte_gesamt),
            austritte_gesamt: self.austritte_gesamt.saturating_sub(vorher.austritte_gesamt),
        }
    }

    /// Leere Statistik als Ausgangspunkt fuer `differenz`
    pub fn leer() -> Self {
        EngineZaehler::neu().schnappschuss(0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zaehler_landen_im_schnappschuss() {
        let z = EngineZaehler::neu();
        z.tick();
        z.tick();
        z.ueberlauf();
        z.verloren(3);
        z.verloren(0);
        z.verworfen_zaehler().fetch_add(5, Ordering::Relaxed);

        let s = z.schnappschuss(1, 4);
        assert_eq!(s.ticks_gesamt, 2);
        assert_eq!(s.ueberlaeufe_gesamt, 1);
        assert_eq!(s.verlorene_frames_gesamt, 3);
        assert_eq!(s.verworfene_frames_gesamt, 5);
        assert_eq!(s.konferenzen_aktiv, 1);
        assert_eq!(s.mitglieder_verbunden, 4);
    }

    #[test]
    fn differenz_nur_fuer_zaehler() {
        let z = EngineZaehler::neu();
        z.tick();
        let vorher = z.schnappschuss(2, 3);
        z.tick();
        z.tick();
        z.beitritt();
        let nachher = z.schnappschuss(1, 1);

        let d = nachher.differenz(&vorher);
        assert_eq!(d.ticks_gesamt, 2);
        assert_eq!(d.beitritte_gesamt, 1);
        // Gauges werden uebernommen, nicht subtrahiert
        assert_eq!(d.konferenzen_aktiv, 1);
        assert_eq!(d.mitglieder_verbunden, 1);
    }

    #[test]
    fn statistik_serialisierbar() {
        let s = EngineStatistik::leer();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"ticks_gesamt\":0"));
    }
}
