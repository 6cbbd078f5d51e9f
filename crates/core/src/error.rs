//! Fehlertypen fuer die Konferenz-Engine
//!
//! Nur Fehler, die an einen Aufrufer der Steuerung zurueckgemeldet werden,
//! tauchen hier auf. Queue-Ueberlaeufe und Tick-Ueberlaeufe sind normaler
//! Betrieb und werden nur gezaehlt.

use thiserror::Error;

/// Globaler Result-Alias fuer die Konferenz-Engine
pub type Result<T> = std::result::Result<T, KonferenzFehler>;

/// Alle Fehler, die eine Steueroperation melden kann
#[derive(Debug, Error)]
pub enum KonferenzFehler {
    // --- Nicht gefunden ---
    #[error("Konferenz nicht gefunden: {0}")]
    KonferenzNichtGefunden(String),

    #[error("Mitglied {mitglied} in Konferenz {konferenz} nicht gefunden")]
    MitgliedNichtGefunden { konferenz: String, mitglied: u32 },

    // --- Anfrage ---
    #[error("Ungueltige Kennung: {0}")]
    UngueltigeKennung(String),

    // --- Lebenszyklus ---
    #[error("Engine wurde gestoppt")]
    EngineGestoppt,

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl KonferenzFehler {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Gibt true zurueck wenn der Fehler "nicht gefunden" bedeutet
    pub fn ist_nicht_gefunden(&self) -> bool {
        matches!(
            self,
            Self::KonferenzNichtGefunden(_) | Self::MitgliedNichtGefunden { .. }
        )
    }
}
