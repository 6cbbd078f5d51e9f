//! Prometheus-kompatible Metriken fuer die Konferenz-Engine
//!
//! Registrierte Metriken:
//! - `konferenz_conferences_active` – Gauge: Laufende Konferenzen
//! - `konferenz_members_connected` – Gauge: Verbundene Mitglieder
//! - `konferenz_ticks_total` – Counter: Misch-Ticks ueber alle Konferenzen
//! - `konferenz_tick_overruns_total` – Counter: Ticks mit mehr als einer Periode Rueckstand
//! - `konferenz_frames_dropped_total` – Counter: Wegen voller Queue verworfene Frames
//! - `konferenz_frame_gaps_total` – Counter: Aus Sequenzluecken erkannte fehlende Frames
//! - `konferenz_joins_total` / `konferenz_leaves_total` – Counter: Beitritte und Austritte

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Momentaufnahme, die in die Metriken uebertragen wird
///
/// Gauges werden gesetzt, Counter um die Differenz erhoeht.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetrikWerte {
    pub konferenzen: u64,
    pub mitglieder: u64,
    pub ticks: u64,
    pub ueberlaeufe: u64,
    pub verworfene_frames: u64,
    pub frame_luecken: u64,
    pub beitritte: u64,
    pub austritte: u64,
}

/// Alle Prometheus-Metriken der Konferenz-Engine
#[derive(Clone)]
pub struct KonferenzMetrics {
    pub registry: Arc<Registry>,

    pub conferences_active: IntGauge,
    pub members_connected: IntGauge,
    pub ticks_total: IntCounter,
    pub tick_overruns_total: IntCounter,
    pub frames_dropped_total: IntCounter,
    pub frame_gaps_total: IntCounter,
    pub joins_total: IntCounter,
    pub leaves_total: IntCounter,
}

impl KonferenzMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let conferences_active = IntGauge::with_opts(Opts::new(
            "konferenz_conferences_active",
            "Anzahl laufender Konferenzen",
        ))?;
        registry.register(Box::new(conferences_active.clone()))?;

        let members_connected = IntGauge::with_opts(Opts::new(
            "konferenz_members_connected",
            "Anzahl verbundener Mitglieder",
        ))?;
        registry.register(Box::new(members_connected.clone()))?;

        let ticks_total = zaehler(&registry, "konferenz_ticks_total", "Misch-Ticks aller Konferenzen")?;
        let tick_overruns_total = zaehler(
            &registry,
            "konferenz_tick_overruns_total",
            "Ticks mit mehr als einer Periode Rueckstand",
        )?;
        let frames_dropped_total = zaehler(
            &registry,
            "konferenz_frames_dropped_total",
            "Wegen voller Queue verworfene Frames",
        )?;
        let frame_gaps_total = zaehler(
            &registry,
            "konferenz_frame_gaps_total",
            "Aus Sequenzluecken erkannte fehlende Frames",
        )?;
        let joins_total = zaehler(&registry, "konferenz_joins_total", "Beitritte seit Start")?;
        let leaves_total = zaehler(&registry, "konferenz_leaves_total", "Austritte seit Start")?;

        Ok(Self {
            registry: Arc::new(registry),
            conferences_active,
            members_connected,
            ticks_total,
            tick_overruns_total,
            frames_dropped_total,
            frame_gaps_total,
            joins_total,
            leaves_total,
        })
    }

    /// Uebernimmt eine neue Momentaufnahme
    ///
    /// `vorher` ist die zuletzt uebernommene Momentaufnahme; Counter steigen
    /// nur um die Differenz.
    pub fn aktualisieren(&self, jetzt: &MetrikWerte, vorher: &MetrikWerte) {
        self.conferences_active.set(jetzt.konferenzen as i64);
        self.members_connected.set(jetzt.mitglieder as i64);

        self.ticks_total.inc_by(jetzt.ticks.saturating_sub(vorher.ticks));
        self.tick_overruns_total
            .inc_by(jetzt.ueberlaeufe.saturating_sub(vorher.ueberlaeufe));
        self.frames_dropped_total
            .inc_by(jetzt.verworfene_frames.saturating_sub(vorher.verworfene_frames));
        self.frame_gaps_total
            .inc_by(jetzt.frame_luecken.saturating_sub(vorher.frame_luecken));
        self.joins_total.inc_by(jetzt.beitritte.saturating_sub(vorher.beitritte));
        self.leaves_total.inc_by(jetzt.austritte.saturating_sub(vorher.austritte));
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: KonferenzMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<KonferenzMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = KonferenzMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn aktualisieren_setzt_gauges_und_addiert_differenzen() {
        let metriken = KonferenzMetrics::neu().unwrap();
        let erste = MetrikWerte {
            konferenzen: 2,
            mitglieder: 5,
            ticks: 100,
            verworfene_frames: 3,
            ..MetrikWerte::default()
        };
        metriken.aktualisieren(&erste, &MetrikWerte::default());
        assert_eq!(metriken.conferences_active.get(), 2);
        assert_eq!(metriken.ticks_total.get(), 100);

        let zweite = MetrikWerte {
            konferenzen: 1,
            mitglieder: 2,
            ticks: 150,
            verworfene_frames: 3,
            ..MetrikWerte::default()
        };
        metriken.aktualisieren(&zweite, &erste);
        assert_eq!(metriken.conferences_active.get(), 1);
        assert_eq!(metriken.members_connected.get(), 2);
        assert_eq!(metriken.ticks_total.get(), 150);
        assert_eq!(metriken.frames_dropped_total.get(), 3);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = KonferenzMetrics::neu().unwrap();
        metriken.conferences_active.set(1);
        metriken.tick_overruns_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("konferenz_conferences_active 1"));
        assert!(output.contains("konferenz_tick_overruns_total 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = KonferenzMetrics::neu().unwrap();
        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for name in [
            "konferenz_conferences_active",
            "konferenz_members_connected",
            "konferenz_ticks_total",
            "konferenz_tick_overruns_total",
            "konferenz_frames_dropped_total",
            "konferenz_frame_gaps_total",
            "konferenz_joins_total",
            "konferenz_leaves_total",
        ] {
            assert!(namen.contains(&name), "{name} fehlt");
        }
    }
}
