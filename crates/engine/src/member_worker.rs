//! Member-Worker – pumpt Frames zwischen Call-Leg und Queues
//!
//! Pro Mitglied laeuft ein Task mit drei Schleifen in einem `select!`:
//! - Lesen: Call-Leg -> Eingangs-Queue (stumme Mitglieder lesen weiter,
//!   reihen aber nichts ein)
//! - Schreiben: Ausgangs-Queue -> Call-Leg, bei leerer Queue ein Stille-Frame
//! - Befehle: Stummschalten, Rauswerfen, Entfernen, Engine-Stopp
//!
//! Endet eine Schleife, endet der ganze Worker. Jeder Ausstieg raeumt
//! gleich auf: Mitglied austragen, Queues leeren, Ereignis senden.

use crate::call_leg::{CallLeg, CallLegFehler, LeseErgebnis};
use crate::conference::Konferenz;
use crate::config::EngineConfig;
use crate::frame::{Frame, SequenzPruefer};
use crate::member::{Mitglied, MitgliedBefehl};
use crate::registry::{signal_abwarten, RegistryInner};
use crate::telemetry::EngineZaehler;
use konferenz_core::{AustrittsGrund, KonferenzEvent, KonferenzId, MitgliedId};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

// ---------------------------------------------------------------------------
// MitgliedHandle
// ---------------------------------------------------------------------------

/// Handle auf ein beigetretenes Mitglied
///
/// Wird das Handle verworfen, laeuft der Worker weiter.
#[derive(Debug)]
pub struct MitgliedHandle {
    konferenz_id: KonferenzId,
    mitglied_id: MitgliedId,
    task: JoinHandle<AustrittsGrund>,
}

impl MitgliedHandle {
    pub(crate) fn neu(
        konferenz_id: KonferenzId,
        mitglied_id: MitgliedId,
        task: JoinHandle<AustrittsGrund>,
    ) -> Self {
        Self {
            konferenz_id,
            mitglied_id,
            task,
        }
    }

    /// Nummer des Mitglieds innerhalb seiner Konferenz
    pub fn id(&self) -> MitgliedId {
        self.mitglied_id
    }

    pub fn konferenz(&self) -> &KonferenzId {
        &self.konferenz_id
    }

    /// True wenn der Worker bereits beendet ist
    pub fn ist_beendet(&self) -> bool {
        self.task.is_finished()
    }

    /// Wartet auf das Ende des Workers und liefert den Austrittsgrund
    pub async fn beendet(self) -> AustrittsGrund {
        match self.task.await {
            Ok(grund) => grund,
            Err(e) => AustrittsGrund::Fehler(format!("Member-Worker abgebrochen: {e}")),
        }
    }
}

// ---------------------------------------------------------------------------
// MemberWorker
// ---------------------------------------------------------------------------

pub(crate) struct MemberWorker {
    pub(crate) mitglied: Arc<Mitglied>,
    pub(crate) konferenz: Arc<Konferenz>,
    pub(crate) leg: Arc<dyn CallLeg>,
    pub(crate) befehle: mpsc::Receiver<MitgliedBefehl>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) registry: Weak<RegistryInner>,
    pub(crate) zaehler: Arc<EngineZaehler>,
    pub(crate) config: EngineConfig,
}

impl MemberWorker {
    pub(crate) async fn ausfuehren(self) -> AustrittsGrund {
        let MemberWorker {
            mitglied,
            konferenz,
            leg,
            mut befehle,
            mut shutdown,
            registry,
            zaehler,
            config,
        } = self;

        let kontext = Kontext {
            konferenz_id: konferenz.id().clone(),
            mitglied: &mitglied,
            leg: leg.as_ref(),
            registry: &registry,
        };

        let grund = tokio::select! {
            grund = lese_schleife(&kontext, config.lese_timeout()) => grund,
            grund = schreib_schleife(
                &kontext,
                &zaehler,
                config.schreib_timeout(),
                config.samples_pro_frame(),
            ) => grund,
            grund = befehl_schleife(&kontext, &mut befehle, &mut shutdown) => grund,
        };

        aufraeumen(&kontext, &konferenz, &zaehler, &grund);
        grund
    }
}

struct Kontext<'a> {
    konferenz_id: KonferenzId,
    mitglied: &'a Mitglied,
    leg: &'a dyn CallLeg,
    registry: &'a Weak<RegistryInner>,
}

impl Kontext<'_> {
    fn ereignis(&self, event: KonferenzEvent) {
        if let Some(registry) = self.registry.upgrade() {
            registry.ereignis(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Schleifen
// ---------------------------------------------------------------------------

async fn lese_schleife(k: &Kontext<'_>, timeout: Duration) -> AustrittsGrund {
    loop {
        match k.leg.frame_lesen(timeout).await {
            Ok(LeseErgebnis::Frame(frame)) => {
                // Stumm: Leitung wird weiter geleert, aber nichts eingereiht
                if k.mitglied.darf_sprechen() {
                    k.mitglied.eingang.push(frame);
                } else {
                    k.mitglied.uebersprungen_markieren();
                }
            }
            Ok(LeseErgebnis::KeineDaten) => {}
            Ok(LeseErgebnis::Geschlossen) | Err(CallLegFehler::Geschlossen) => {
                return AustrittsGrund::Aufgelegt;
            }
            Err(CallLegFehler::Io(e)) => {
                tracing::warn!(
                    konferenz_id = %k.konferenz_id,
                    mitglied_id = %k.mitglied.id(),
                    fehler = %e,
                    "Lesefehler auf Call-Leg"
                );
                return AustrittsGrund::Fehler(e);
            }
        }
    }
}

async fn schreib_schleife(
    k: &Kontext<'_>,
    zaehler: &EngineZaehler,
    timeout: Duration,
    samples_pro_frame: usize,
) -> AustrittsGrund {
    let mut pruefer = SequenzPruefer::neu();
    let mut letzte_sequenz = 0;

    loop {
        let frame = match k.mitglied.ausgang.pop(timeout).await {
            Some(frame) => {
                zaehler.verloren(pruefer.pruefen(frame.sequenz()));
                letzte_sequenz = frame.sequenz();
                frame
            }
            // Mischer liefert nicht rechtzeitig: Stille gleicher Dauer
            None => Frame::stille(samples_pro_frame, letzte_sequenz),
        };

        match k.leg.frame_schreiben(frame).await {
            Ok(()) => {}
            Err(CallLegFehler::Geschlossen) => return AustrittsGrund::Aufgelegt,
            Err(CallLegFehler::Io(e)) => {
                tracing::warn!(
                    konferenz_id = %k.konferenz_id,
                    mitglied_id = %k.mitglied.id(),
                    fehler = %e,
                    "Schreibfehler auf Call-Leg"
                );
                return AustrittsGrund::Fehler(e);
            }
        }
    }
}

async fn befehl_schleife(
    k: &Kontext<'_>,
    befehle: &mut mpsc::Receiver<MitgliedBefehl>,
    shutdown: &mut watch::Receiver<bool>,
) -> AustrittsGrund {
    loop {
        tokio::select! {
            befehl = befehle.recv() => match befehl {
                Some(MitgliedBefehl::Stumm { stumm, bestaetigung }) => {
                    if k.mitglied.stumm_uebernehmen(stumm) {
                        if stumm {
                            k.mitglied.eingang.leeren();
                            k.mitglied.uebersprungen_markieren();
                        }
                        tracing::info!(
                            konferenz_id = %k.konferenz_id,
                            mitglied_id = %k.mitglied.id(),
                            stumm,
                            "Stummschaltung geaendert"
                        );
                        k.ereignis(KonferenzEvent::StummGeaendert {
                            konferenz_id: k.konferenz_id.clone(),
                            mitglied_id: k.mitglied.id(),
                            stumm,
                        });
                    }
                    let _ = bestaetigung.send(());
                }
                Some(MitgliedBefehl::Rauswerfen) => {
                    k.leg.auflegen().await;
                    return AustrittsGrund::Gekickt;
                }
                // Sender lebt im Mitglied; tritt nur beim Abbau auf
                None => return AustrittsGrund::Entfernt,
            },
            _ = k.mitglied.entfernt_abwarten() => return AustrittsGrund::Entfernt,
            _ = signal_abwarten(shutdown) => return AustrittsGrund::Heruntergefahren,
        }
    }
}

// ---------------------------------------------------------------------------
// Aufraeumen
// ---------------------------------------------------------------------------

fn aufraeumen(
    k: &Kontext<'_>,
    konferenz: &Konferenz,
    zaehler: &EngineZaehler,
    grund: &AustrittsGrund,
) {
    let mitglied_id = k.mitglied.id();

    // Ein laufender Tick verwirft damit die Ausgabe fuer dieses Mitglied
    k.mitglied.als_entfernt_markieren();

    // Beim Entfernen durch die Steuerung ist das Mitglied schon ausgetragen
    if let Some((_, leer)) = konferenz.mitglied_entfernen(mitglied_id) {
        if leer {
            tracing::debug!(konferenz_id = %k.konferenz_id, "Letztes Mitglied weg, Konferenz laeuft aus");
        }
    }
    let freigegeben = k.mitglied.queues_leeren();
    zaehler.austritt();

    tracing::info!(
        konferenz_id = %k.konferenz_id,
        mitglied_id = %mitglied_id,
        grund = %grund,
        freigegeben,
        "Mitglied hat Konferenz verlassen"
    );
    k.ereignis(KonferenzEvent::MitgliedVerlassen {
        konferenz_id: k.konferenz_id.clone(),
        mitglied_id,
        grund: grund.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_leg::KanalLeitung;
    use crate::member::MitgliedBeschreibung;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU64;

    /// Call-Leg, dessen Lesen sofort mit einem I/O-Fehler scheitert
    struct KaputteLeitung;

    #[async_trait]
    impl CallLeg for KaputteLeitung {
        async fn frame_lesen(&self, _timeout: Duration) -> Result<LeseErgebnis, CallLegFehler> {
            Err(CallLegFehler::Io("Verbindung zurueckgesetzt".into()))
        }

        async fn frame_schreiben(&self, _frame: Frame) -> Result<(), CallLegFehler> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }

        async fn auflegen(&self) {}
    }

    struct Aufbau {
        konferenz: Arc<Konferenz>,
        mitglied: Arc<Mitglied>,
        shutdown_tx: watch::Sender<bool>,
        worker: MemberWorker,
    }

    fn aufbauen(leg: Arc<dyn CallLeg>) -> Aufbau {
        let config = EngineConfig::default();
        let konferenz = Arc::new(Konferenz::neu(KonferenzId::parse("room1").unwrap()));
        let (mitglied, befehle) = konferenz
            .mitglied_hinzufuegen(
                &MitgliedBeschreibung::neu("a"),
                &config,
                Arc::new(AtomicU64::new(0)),
            )
            .unwrap();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let worker = MemberWorker {
            mitglied: Arc::clone(&mitglied),
            konferenz: Arc::clone(&konferenz),
            leg,
            befehle,
            shutdown,
            registry: Weak::new(),
            zaehler: Arc::new(EngineZaehler::neu()),
            config,
        };
        Aufbau {
            konferenz,
            mitglied,
            shutdown_tx,
            worker,
        }
    }

    #[tokio::test]
    async fn lesefehler_beendet_nur_dieses_mitglied() {
        let aufbau = aufbauen(Arc::new(KaputteLeitung));
        let grund = aufbau.worker.ausfuehren().await;
        assert_eq!(grund, AustrittsGrund::Fehler("Verbindung zurueckgesetzt".into()));
        assert_eq!(aufbau.konferenz.mitglieder_anzahl(), 0);
    }

    #[tokio::test]
    async fn eigener_austritt_markiert_mitglied_als_entfernt() {
        let aufbau = aufbauen(Arc::new(KaputteLeitung));
        let mitglied = Arc::clone(&aufbau.mitglied);
        assert!(!mitglied.ist_entfernt());
        aufbau.worker.ausfuehren().await;
        assert!(mitglied.ist_entfernt());
    }

    #[tokio::test]
    async fn frames_werden_eingereiht_und_stille_geschrieben() {
        let (leitung, mut gegenstelle) = KanalLeitung::paar(8);
        let aufbau = aufbauen(Arc::new(leitung));
        let mitglied = Arc::clone(&aufbau.mitglied);
        let task = tokio::spawn(aufbau.worker.ausfuehren());

        assert!(gegenstelle.senden(Frame::neu(vec![100i16; 160], 1)).await);
        // Kein Mischer: der Worker schreibt Stille
        let stille = gegenstelle.empfangen(Duration::from_secs(1)).await.unwrap();
        assert!(stille.ist_stille());
        assert_eq!(stille.laenge(), 160);

        tokio::time::timeout(Duration::from_secs(1), async {
            while mitglied.eingang.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Frame muss eingereiht werden");

        gegenstelle.auflegen();
        let grund = task.await.unwrap();
        assert_eq!(grund, AustrittsGrund::Aufgelegt);
        assert!(mitglied.eingang.is_empty(), "Queues werden beim Austritt geleert");
    }

    #[tokio::test]
    async fn stummes_mitglied_reiht_nichts_ein() {
        let (leitung, gegenstelle) = KanalLeitung::paar(8);
        let aufbau = aufbauen(Arc::new(leitung));
        let mitglied = Arc::clone(&aufbau.mitglied);
        let befehle = mitglied.befehle().clone();
        let task = tokio::spawn(aufbau.worker.ausfuehren());

        let (tx, rx) = tokio::sync::oneshot::channel();
        befehle
            .send(MitgliedBefehl::Stumm { stumm: true, bestaetigung: tx })
            .await
            .unwrap();
        rx.await.unwrap();
        assert!(mitglied.ist_stumm());

        for seq in 1..=5 {
            assert!(gegenstelle.senden(Frame::neu(vec![500i16; 160], seq)).await);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(mitglied.eingang.is_empty());

        aufbau.shutdown_tx.send_replace(true);
        assert_eq!(task.await.unwrap(), AustrittsGrund::Heruntergefahren);
    }

    #[tokio::test]
    async fn rauswurf_legt_auf() {
        let (leitung, mut gegenstelle) = KanalLeitung::paar(8);
        let aufbau = aufbauen(Arc::new(leitung));
        let befehle = aufbau.mitglied.befehle().clone();
        let task = tokio::spawn(aufbau.worker.ausfuehren());

        befehle.send(MitgliedBefehl::Rauswerfen).await.unwrap();
        assert_eq!(task.await.unwrap(), AustrittsGrund::Gekickt);
        assert!(gegenstelle.auflegen_abwarten(Duration::from_millis(100)).await);
        assert_eq!(aufbau.konferenz.mitglieder_anzahl(), 0);
    }

    #[tokio::test]
    async fn geschlossener_shutdown_kanal_beendet_worker() {
        let (leitung, _gegenstelle) = KanalLeitung::paar(8);
        let aufbau = aufbauen(Arc::new(leitung));
        drop(aufbau.shutdown_tx);
        let grund = tokio::time::timeout(Duration::from_secs(1), aufbau.worker.ausfuehren())
            .await
            .unwrap();
        assert_eq!(grund, AustrittsGrund::Heruntergefahren);
    }
}
