//! Engine-Konfiguration
//!
//! Alle Felder haben Standardwerte (8 kHz, 20-ms-Ticks), sodass die Engine
//! ohne Konfigurationsdatei lauffaehig ist. Der Server bettet diese Struktur
//! als `[engine]`-Abschnitt in seine TOML-Datei ein.

use crate::queue::UeberlaufStrategie;
use crate::vad::VadConfig;
use konferenz_core::KonferenzFehler;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Konfiguration der Misch-Engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick-Periode des Mischers in Millisekunden
    pub tick_ms: u64,
    /// Abtastrate in Hz (16-Bit-Mono-PCM)
    pub abtastrate: u32,
    /// Kapazitaet jeder Frame-Queue in Frames
    pub queue_kapazitaet: usize,
    /// Verhalten bei voller Queue
    pub ueberlauf: UeberlaufStrategie,
    /// Timeout fuer einen Lesevorgang auf dem Call-Leg
    pub lese_timeout_ms: u64,
    /// Wartezeit auf einen gemischten Frame, bevor Stille geschrieben wird
    pub schreib_timeout_ms: u64,
    /// Aktive Video-Quelle per VAD umschalten
    pub video_modus: bool,
    /// Groesse der Befehls-Queue pro Mitglied
    pub befehl_queue_groesse: usize,
    /// Wartezeit auf die Bestaetigung eines Befehls durch den Member-Worker
    pub bestaetigung_timeout_ms: u64,
    /// Puffer des Ereignis-Broadcasts
    pub event_kapazitaet: usize,
    /// Sprachaktivitaetserkennung
    pub vad: VadConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: 20,
            abtastrate: 8000,
            queue_kapazitaet: 3,
            ueberlauf: UeberlaufStrategie::NeuesteVerwerfen,
            lese_timeout_ms: 100,
            schreib_timeout_ms: 30,
            video_modus: false,
            befehl_queue_groesse: 16,
            bestaetigung_timeout_ms: 1000,
            event_kapazitaet: 256,
            vad: VadConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Tick-Periode
    pub fn tick_periode(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Samples pro Frame (ein Frame = ein Tick)
    pub fn samples_pro_frame(&self) -> usize {
        (self.abtastrate as u64 * self.tick_ms / 1000) as usize
    }

    pub fn lese_timeout(&self) -> Duration {
        Duration::from_millis(self.lese_timeout_ms)
    }

    pub fn schreib_timeout(&self) -> Duration {
        Duration::from_millis(self.schreib_timeout_ms)
    }

    pub fn bestaetigung_timeout(&self) -> Duration {
        Duration::from_millis(self.bestaetigung_timeout_ms)
    }

    /// Prueft die Konfiguration auf unsinnige Werte
    pub fn validieren(&self) -> Result<(), KonferenzFehler> {
        if self.tick_ms == 0 {
            return Err(KonferenzFehler::Konfiguration("tick_ms muss > 0 sein".into()));
        }
        if self.samples_pro_frame() == 0 {
            return Err(KonferenzFehler::Konfiguration(format!(
                "abtastrate {} ergibt bei {} ms keine Samples",
                self.abtastrate, self.tick_ms
            )));
        }
        if self.queue_kapazitaet == 0 {
            return Err(KonferenzFehler::Konfiguration(
                "queue_kapazitaet muss > 0 sein".into(),
            ));
        }
        if self.befehl_queue_groesse == 0 || self.event_kapazitaet == 0 {
            return Err(KonferenzFehler::Konfiguration(
                "befehl_queue_groesse und event_kapazitaet muessen > 0 sein".into(),
            ));
        }
        self.vad.pruefen().map_err(KonferenzFehler::Konfiguration)
    }
}
