//! Driftfreier Tick-Takt
//!
//! Die naechste Frist entsteht durch Addition der Periode auf die vorige
//! Frist, nie durch `jetzt + periode`. Verarbeitungsjitter eines Ticks
//! verschiebt den absoluten Zeitplan daher nicht.
//!
//! Liegt die Frist bereits mehr als eine volle Periode in der Vergangenheit,
//! wird ein Ueberlauf gemeldet und die Frist auf `jetzt` gesetzt. Verpasste
//! Ticks werden nicht nachgeholt.

use std::time::Duration;
use tokio::time::Instant;

/// Ergebnis eines Takt-Schritts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaktErgebnis {
    /// Frist liegt im Plan
    Puenktlich,
    /// Mehr als eine Periode Rueckstand; Frist wurde auf jetzt gesetzt
    Ueberlauf { rueckstand: Duration },
}

/// Absoluter Fristen-Takt eines Mischers
#[derive(Debug, Clone)]
pub struct TickTakt {
    periode: Duration,
    frist: Instant,
    ueberlaeufe: u64,
}

impl TickTakt {
    /// Startet den Takt; die erste Frist ist `start`
    pub fn neu(periode: Duration, start: Instant) -> Self {
        Self {
            periode,
            frist: start,
            ueberlaeufe: 0,
        }
    }

    /// Aktuelle Frist (bis hierhin schlaeft der Mischer)
    pub fn frist(&self) -> Instant {
        self.frist
    }

    pub fn periode(&self) -> Duration {
        self.periode
    }

    pub fn ueberlaeufe(&self) -> u64 {
        self.ueberlaeufe
    }

    /// Schaltet auf die naechste Frist weiter
    pub fn fortschreiten(&mut self, jetzt: Instant) -> TaktErgebnis {
        self.frist += self.periode;

        if jetzt > self.frist + self.periode {
            let rueckstand = jetzt - self.frist;
            self.frist = jetzt;
            self.ueberlaeufe += 1;
            return TaktErgebnis::Ueberlauf { rueckstand };
        }
        TaktErgebnis::Puenktlich
    }
}
