//! konferenz-server – Bibliotheks-Root
//!
//! Hostet eine [`ConferenceRegistry`] und verbindet sie mit der
//! Observability-Schicht. Call-Legs werden von der einbettenden
//! Host-Plattform ueber [`Server::steuerung`] angemeldet.

pub mod config;

use anyhow::Result;
use config::ServerConfig;
use konferenz_engine::{ConferenceRegistry, EngineStatistik, KonferenzEvent, Steuerung};
use konferenz_observability::{HealthState, KonferenzMetrics, MetrikWerte};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    registry: ConferenceRegistry,
    steuerung: Steuerung,
    metriken: KonferenzMetrics,
    health: HealthState,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Result<Self> {
        let registry = ConferenceRegistry::neu(config.engine.clone())?;
        let steuerung = Steuerung::neu(registry.clone());
        Ok(Self {
            config,
            registry,
            steuerung,
            metriken: KonferenzMetrics::neu()?,
            health: HealthState::neu(),
        })
    }

    /// Steueroperationen fuer Verwaltungsschicht und Host-Plattform
    pub fn steuerung(&self) -> &Steuerung {
        &self.steuerung
    }

    pub fn metriken(&self) -> &KonferenzMetrics {
        &self.metriken
    }

    pub fn health(&self) -> &HealthState {
        &self.health
    }

    /// Startet alle Server-Subsysteme und laeuft bis Ctrl-C
    pub async fn starten(self) -> Result<()> {
        self.ausfuehren(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Ctrl-C-Handler fehlgeschlagen: {e}");
            }
        })
        .await
    }

    /// Laeuft bis `stopp` abschliesst und faehrt dann die Engine herunter
    ///
    /// Reihenfolge:
    /// 1. Metriken-Bruecke und Ereignis-Protokoll starten
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. Auf `stopp` warten
    /// 4. Health auf unhealthy setzen, Registry stoppen
    pub async fn ausfuehren<F>(self, stopp: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            server_name = %self.config.server.name,
            tick_ms = self.config.engine.tick_ms,
            abtastrate = self.config.engine.abtastrate,
            video_modus = self.config.engine.video_modus,
            "Server startet"
        );

        let mut aufgaben: Vec<JoinHandle<()>> = vec![
            tokio::spawn(metriken_bruecke(
                self.registry.clone(),
                self.metriken.clone(),
                self.config.metriken_intervall(),
            )),
            tokio::spawn(ereignisse_protokollieren(
                self.registry.ereignisse_abonnieren(),
            )),
        ];

        if self.config.observability.aktiviert {
            let adresse = self.config.observability_bind_adresse()?;
            let metriken = self.metriken.clone();
            let health = self.health.clone();
            aufgaben.push(tokio::spawn(async move {
                if let Err(e) =
                    konferenz_observability::observability_server_starten(adresse, metriken, health)
                        .await
                {
                    tracing::error!(adresse = %adresse, "Observability-Server fehlgeschlagen: {e}");
                }
            }));
        }

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal...");
        stopp.await;
        tracing::info!("Shutdown-Signal empfangen, Engine wird gestoppt");

        self.health.engine_status_setzen(false);
        self.registry.stoppen().await;

        for aufgabe in aufgaben {
            aufgabe.abort();
        }
        tracing::info!("Server beendet");
        Ok(())
    }
}

/// Rechnet eine Engine-Statistik in Metrikwerte um
pub fn metrikwerte(statistik: &EngineStatistik) -> MetrikWerte {
    MetrikWerte {
        konferenzen: statistik.konferenzen_aktiv as u64,
        mitglieder: statistik.mitglieder_verbunden as u64,
        ticks: statistik.ticks_gesamt,
        ueberlaeufe: statistik.ueberlaeufe_gesamt,
        verworfene_frames: statistik.verworfene_frames_gesamt,
        frame_luecken: statistik.verlorene_frames_gesamt,
        beitritte: statistik.beitritte_gesamt,
        austritte: statistik.austritte_gesamt,
    }
}

/// Uebertraegt periodisch die Engine-Zaehler in die Prometheus-Metriken
async fn metriken_bruecke(
    registry: ConferenceRegistry,
    metriken: KonferenzMetrics,
    intervall: Duration,
) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut vorher = MetrikWerte::default();
    loop {
        takt.tick().await;
        let jetzt = metrikwerte(&registry.statistik());
        metriken.aktualisieren(&jetzt, &vorher);
        vorher = jetzt;
    }
}

/// Schreibt Engine-Ereignisse ins Log
async fn ereignisse_protokollieren(mut events: broadcast::Receiver<KonferenzEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => ereignis_loggen(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(verpasst = n, "Ereignis-Protokoll hinkt hinterher");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn ereignis_loggen(event: &KonferenzEvent) {
    let konferenz_id = event.konferenz_id();
    match event {
        KonferenzEvent::KonferenzErstellt { .. } => {
            tracing::info!(konferenz_id = %konferenz_id, "Konferenz erstellt");
        }
        KonferenzEvent::KonferenzBeendet { .. } => {
            tracing::info!(konferenz_id = %konferenz_id, "Konferenz beendet");
        }
        KonferenzEvent::MitgliedBeigetreten {
            mitglied_id, name, ..
        } => {
            tracing::debug!(
                konferenz_id = %konferenz_id,
                mitglied_id = %mitglied_id,
                name = %name,
                "Ereignis: Beitritt"
            );
        }
        KonferenzEvent::MitgliedVerlassen {
            mitglied_id, grund, ..
        } => {
            tracing::debug!(
                konferenz_id = %konferenz_id,
                mitglied_id = %mitglied_id,
                grund = ?grund,
                "Ereignis: Austritt"
            );
        }
        KonferenzEvent::StummGeaendert {
            mitglied_id, stumm, ..
        } => {
            tracing::debug!(
                konferenz_id = %konferenz_id,
                mitglied_id = %mitglied_id,
                stumm = stumm,
                "Ereignis: Stummschaltung"
            );
        }
        KonferenzEvent::SprechStatus {
            mitglied_id,
            spricht,
            ..
        } => {
            tracing::trace!(
                konferenz_id = %konferenz_id,
                mitglied_id = %mitglied_id,
                spricht = spricht,
                "Ereignis: Sprechstatus"
            );
        }
        KonferenzEvent::QuelleGewechselt { alt, neu, .. } => {
            tracing::debug!(
                konferenz_id = %konferenz_id,
                alt = ?alt,
                neu = ?neu,
                "Ereignis: Aktive Quelle gewechselt"
            );
        }
        KonferenzEvent::TickUeberlauf { rueckstand_ms, .. } => {
            tracing::trace!(
                konferenz_id = %konferenz_id,
                rueckstand_ms = rueckstand_ms,
                "Ereignis: Tick-Ueberlauf"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use konferenz_engine::{KanalLeitung, MitgliedBeschreibung};
    use tokio::sync::oneshot;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.observability.aktiviert = false;
        config.observability.metriken_intervall_ms = 10;
        config
    }

    #[test]
    fn statistik_wird_in_metrikwerte_uebersetzt() {
        let mut statistik = EngineStatistik::leer();
        statistik.konferenzen_aktiv = 2;
        statistik.mitglieder_verbunden = 5;
        statistik.ticks_gesamt = 40;
        statistik.verlorene_frames_gesamt = 3;
        let werte = metrikwerte(&statistik);
        assert_eq!(werte.konferenzen, 2);
        assert_eq!(werte.mitglieder, 5);
        assert_eq!(werte.ticks, 40);
        assert_eq!(werte.frame_luecken, 3);
        assert_eq!(werte.verworfene_frames, 0);
    }

    #[test]
    fn ungueltige_engine_config_scheitert_beim_erstellen() {
        let mut config = test_config();
        config.engine.tick_ms = 0;
        let fehler = Server::neu(config).err().expect("tick_ms = 0 ist ungueltig");
        assert!(fehler.to_string().contains("tick_ms"));
    }

    #[tokio::test]
    async fn starten_ueber_result_wie_im_hauptprogramm() -> Result<()> {
        let server = Server::neu(test_config())?;
        let health = server.health().clone();
        server.ausfuehren(async {}).await?;
        assert!(!health.engine_laeuft());
        Ok(())
    }

    #[tokio::test]
    async fn server_laeuft_bis_stopp_und_stoppt_engine() {
        let server = Server::neu(test_config()).unwrap();
        let steuerung = server.steuerung().clone();
        let metriken = server.metriken().clone();
        let health = server.health().clone();

        let (leitung, _gegenstelle) = KanalLeitung::paar(8);
        steuerung
            .beitreten("room1", MitgliedBeschreibung::neu("alice"), leitung)
            .unwrap();

        let (stopp_tx, stopp_rx) = oneshot::channel::<()>();
        let lauf = tokio::spawn(server.ausfuehren(async {
            let _ = stopp_rx.await;
        }));

        // Metriken-Bruecke uebernimmt den Beitritt
        let mut uebernommen = false;
        for _ in 0..200 {
            if metriken.joins_total.get() == 1 && metriken.conferences_active.get() == 1 {
                uebernommen = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(uebernommen, "Metriken wurden nicht aktualisiert");
        assert!(health.engine_laeuft());

        stopp_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), lauf)
            .await
            .expect("Server muss sich beenden")
            .unwrap()
            .unwrap();

        assert!(!health.engine_laeuft());
        assert!(steuerung.registry().ist_gestoppt());
        assert!(steuerung.auflisten().is_empty());
    }
}
