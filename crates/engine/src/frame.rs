//! Audio-Frames
//!
//! Ein Frame ist eine unveraenderliche Einheit von 16-Bit-PCM-Samples fuer
//! genau einen Tick, plus Aufnahmezeitpunkt und Sequenznummer. Die Samples
//! liegen in einem `Arc<[i16]>`, damit der Mischer dasselbe Ergebnis an
//! mehrere Zuhoerer verteilen kann, ohne zu kopieren.

use std::sync::Arc;
use std::time::Instant;

/// Unveraenderlicher Audio-Frame
#[derive(Debug, Clone)]
pub struct Frame {
    samples: Arc<[i16]>,
    zeitstempel: Instant,
    sequenz: u64,
}

impl Frame {
    /// Erstellt einen Frame mit dem aktuellen Zeitpunkt als Zeitstempel
    pub fn neu(samples: impl Into<Arc<[i16]>>, sequenz: u64) -> Self {
        Self::mit_zeitstempel(samples, sequenz, Instant::now())
    }

    /// Erstellt einen Frame mit explizitem Aufnahmezeitpunkt
    pub fn mit_zeitstempel(
        samples: impl Into<Arc<[i16]>>,
        sequenz: u64,
        zeitstempel: Instant,
    ) -> Self {
        Self {
            samples: samples.into(),
            zeitstempel,
            sequenz,
        }
    }

    /// Erstellt einen Stille-Frame mit `anzahl` Samples
    pub fn stille(anzahl: usize, sequenz: u64) -> Self {
        Self::neu(vec![0i16; anzahl], sequenz)
    }

    /// Gibt die Samples zurueck
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Gibt den geteilten Sample-Puffer zurueck (nur Arc-Klon)
    pub fn geteilte_samples(&self) -> Arc<[i16]> {
        Arc::clone(&self.samples)
    }

    /// Sequenznummer des Erzeugers
    pub fn sequenz(&self) -> u64 {
        self.sequenz
    }

    /// Aufnahmezeitpunkt
    pub fn zeitstempel(&self) -> Instant {
        self.zeitstempel
    }

    /// Anzahl Samples
    pub fn laenge(&self) -> usize {
        self.samples.len()
    }

    /// True wenn alle Samples 0 sind
    pub fn ist_stille(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }
}

// ---------------------------------------------------------------------------
// Sequenzpruefung
// ---------------------------------------------------------------------------

/// Erkennt Luecken in den Sequenznummern eines Erzeugers
///
/// Eine Luecke ist kein Fehler, sondern wird als verworfene Frames gezaehlt.
/// Sequenznummern, die nicht groesser als die letzte sind (Neustart des
/// Erzeugers, Duplikate), setzen die Pruefung zurueck ohne zu zaehlen.
#[derive(Debug, Default)]
pub struct SequenzPruefer {
    letzte: Option<u64>,
    verloren: u64,
}

impl SequenzPruefer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Prueft eine Sequenznummer und gibt die Anzahl fehlender Frames zurueck
    pub fn pruefen(&mut self, sequenz: u64) -> u64 {
        let luecke = match self.letzte {
            Some(letzte) if sequenz > letzte => sequenz - letzte - 1,
            _ => 0,
        };
        self.letzte = Some(sequenz);
        self.verloren += luecke;
        luecke
    }

    /// Vergisst die letzte Sequenznummer; der naechste Frame zaehlt keine Luecke
    pub fn zuruecksetzen(&mut self) {
        self.letzte = None;
    }

    /// Insgesamt erkannte fehlende Frames
    pub fn verloren(&self) -> u64 {
        self.verloren
    }
}
