//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `KF_LOG_LEVEL`: Log-Level oder EnvFilter-Direktive, Standard: info
//! - `KF_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Umgebungsvariablen haben Vorrang vor dem `[logging]`-Abschnitt der
//! Konfigurationsdatei.

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

/// Fehler bei der Pruefung der Logging-Konfiguration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoggingFehler {
    #[error("Ungueltiges Log-Level: '{0}' (erlaubt: trace, debug, info, warn, error)")]
    UngueltigesLevel(String),

    #[error("Ungueltiges Log-Format: '{0}' (erlaubt: text, json)")]
    UngueltigesFormat(String),
}

/// Initialisiert das Logging-System.
///
/// Liest `KF_LOG_LEVEL` und `KF_LOG_FORMAT` aus der Umgebung.
/// Faellt auf die uebergebenen Werte und zuletzt auf `info` / `text` zurueck.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env("KF_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var("KF_LOG_FORMAT").unwrap_or_else(|_| format.to_string());

    // try_init: in Tests darf bereits ein Subscriber gesetzt sein
    let ergebnis = match format_env.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };
    if let Err(e) = ergebnis {
        tracing::debug!("Logging bereits initialisiert: {e}");
    }
}

/// Gibt den konfigurierten Log-Level aus der Umgebung zurueck.
/// Fallback: "info"
pub fn log_level_aus_env() -> String {
    std::env::var("KF_LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
}

/// Gibt das konfigurierte Log-Format aus der Umgebung zurueck.
/// Fallback: "text"
pub fn log_format_aus_env() -> String {
    std::env::var("KF_LOG_FORMAT").unwrap_or_else(|_| "text".to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

/// Prueft Level und Format einer Logging-Konfiguration
pub fn logging_pruefen(level: &str, format: &str) -> Result<(), LoggingFehler> {
    if !log_level_gueltig(level) {
        return Err(LoggingFehler::UngueltigesLevel(level.to_string()));
    }
    if !log_format_gueltig(format) {
        return Err(LoggingFehler::UngueltigesFormat(format.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level}");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON"));
    }

    #[test]
    fn logging_pruefen_meldet_feld() {
        assert!(logging_pruefen("info", "json").is_ok());
        assert_eq!(
            logging_pruefen("laut", "text"),
            Err(LoggingFehler::UngueltigesLevel("laut".into()))
        );
        let fehler = logging_pruefen("debug", "yaml").unwrap_err();
        assert!(fehler.to_string().contains("yaml"));
    }

    #[test]
    fn log_env_fallback_und_gesetzt() {
        // Ein Test fuer beide Variablen, damit parallele Tests sich nicht stoeren
        std::env::remove_var("KF_LOG_LEVEL");
        std::env::remove_var("KF_LOG_FORMAT");
        assert_eq!(log_level_aus_env(), "info");
        assert_eq!(log_format_aus_env(), "text");

        std::env::set_var("KF_LOG_LEVEL", "debug");
        std::env::set_var("KF_LOG_FORMAT", "json");
        assert_eq!(log_level_aus_env(), "debug");
        assert_eq!(log_format_aus_env(), "json");
        std::env::remove_var("KF_LOG_LEVEL");
        std::env::remove_var("KF_LOG_FORMAT");
    }

    #[test]
    fn doppelte_initialisierung_ist_harmlos() {
        logging_initialisieren("warn", "text");
        logging_initialisieren("warn", "json");
    }
}
