//! Sprachaktivitaetserkennung (VAD) mit Hysterese
//!
//! Der Aktivitaets-Score ist die geglaettete RMS-Energie eines Frames,
//! normalisiert auf 0.0..1.0. Frames ohne Beitrag (Stille, stumm, kein
//! Frame) lassen den Score um `abklingfaktor` abklingen.
//!
//! Ein Mitglied wird aktiv, wenn der Score `aktivierung_schwelle`
//! ueberschreitet, und bleibt aktiv, bis er unter `halte_schwelle` faellt.
//! Da `halte_schwelle` kleiner ist, flattert der Zustand an der Grenze nicht.

use crate::frame::Frame;
use serde::{Deserialize, Serialize};

/// Konfiguration fuer die VAD
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Score, ab dem ein inaktives Mitglied aktiv wird
    pub aktivierung_schwelle: f32,
    /// Score, unter dem ein aktives Mitglied inaktiv wird
    pub halte_schwelle: f32,
    /// Glaettungsfaktor (0.0 = keine Glaettung, nahe 1.0 = starke Glaettung)
    pub glaettung: f32,
    /// Multiplikator pro Tick ohne Beitrag (0.0 = sofort still, 1.0 = kein Abklingen)
    pub abklingfaktor: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            aktivierung_schwelle: 0.02,
            halte_schwelle: 0.01,
            glaettung: 0.5,
            abklingfaktor: 0.7,
        }
    }
}

impl VadConfig {
    /// Prueft die Schwellen; gibt eine Fehlerbeschreibung zurueck
    pub fn pruefen(&self) -> Result<(), String> {
        let werte = [
            self.aktivierung_schwelle,
            self.halte_schwelle,
            self.glaettung,
            self.abklingfaktor,
        ];
        if werte.iter().any(|w| !w.is_finite()) {
            return Err("VAD-Werte muessen endliche Zahlen sein".into());
        }
        if !(0.0..=1.0).contains(&self.glaettung) || !(0.0..=1.0).contains(&self.abklingfaktor) {
            return Err("glaettung und abklingfaktor muessen zwischen 0.0 und 1.0 liegen".into());
        }
        if self.halte_schwelle < 0.0 || self.aktivierung_schwelle <= 0.0 {
            return Err("VAD-Schwellen muessen positiv sein".into());
        }
        if self.halte_schwelle > self.aktivierung_schwelle {
            return Err(format!(
                "halte_schwelle ({}) darf nicht ueber aktivierung_schwelle ({}) liegen",
                self.halte_schwelle, self.aktivierung_schwelle
            ));
        }
        Ok(())
    }
}

/// Aktivitaetsdetektor fuer ein einzelnes Mitglied
#[derive(Debug, Clone)]
pub struct AktivitaetsDetektor {
    config: VadConfig,
    score: f32,
    aktiv: bool,
}

impl AktivitaetsDetektor {
    pub fn neu(config: VadConfig) -> Self {
        Self {
            config,
            score: 0.0,
            aktiv: false,
        }
    }

    /// Bewertet einen Frame und gibt zurueck ob das Mitglied aktiv ist
    pub fn frame_bewerten(&mut self, frame: &Frame) -> bool {
        let energie = rms_energie(frame.samples());
        self.score = self.config.glaettung * self.score + (1.0 - self.config.glaettung) * energie;
        self.hysterese_anwenden()
    }

    /// Tick ohne Beitrag: Score klingt ab
    pub fn stille(&mut self) -> bool {
        self.score *= self.config.abklingfaktor;
        self.hysterese_anwenden()
    }

    /// Aktueller Score (0.0..1.0)
    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn ist_aktiv(&self) -> bool {
        self.aktiv
    }

    /// True wenn der Score die Aktivierungsschwelle ueberschreitet
    pub fn ueber_aktivierung(&self) -> bool {
        self.score > self.config.aktivierung_schwelle
    }

    pub fn reset(&mut self) {
        self.score = 0.0;
        self.aktiv = false;
    }

    fn hysterese_anwenden(&mut self) -> bool {
        if self.aktiv {
            if self.score < self.config.halte_schwelle {
                self.aktiv = false;
            }
        } else if self.score > self.config.aktivierung_schwelle {
            self.aktiv = true;
        }
        self.aktiv
    }
}

/// RMS-Energie eines Frames, normalisiert auf 0.0..1.0
pub fn rms_energie(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let summe_quadrate: f64 = samples
        .iter()
        .map(|&s| {
            let x = s as f64 / 32768.0;
            x * x
        })
        .sum();
    (summe_quadrate / samples.len() as f64).sqrt() as f32
}
