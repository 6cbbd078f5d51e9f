//! Konferenz-Registry – Lebenszyklus und Steueroperationen
//!
//! Die `ConferenceRegistry` ist der Einstiegspunkt der Engine. Sie ist ein
//! gewoehnliches, vom Aufrufer besessenes Objekt (kein globaler Zustand),
//! sodass Tests beliebig viele unabhaengige Engines nebeneinander betreiben
//! koennen. Klone teilen sich denselben Zustand.
//!
//! ## Design-Entscheidungen
//! - DashMap fuer die Konferenz-Map; Lock-Reihenfolge immer
//!   Map-Shard -> Konferenz-Mutex
//! - Stummschalten und Rauswerfen laufen als Nachricht ueber den
//!   Befehlskanal des Member-Workers, die Registry schreibt keine Flags
//! - Worker halten nur eine `Weak`-Referenz auf die Registry; wird die
//!   letzte Registry-Instanz verworfen, schliesst der Shutdown-Kanal und
//!   alle Worker beenden sich

use crate::call_leg::CallLeg;
use crate::conference::{Konferenz, KonferenzInfo};
use crate::config::EngineConfig;
use crate::member::{Mitglied, MitgliedBefehl, MitgliedBeschreibung};
use crate::member_worker::{MemberWorker, MitgliedHandle};
use crate::mixing::Mischer;
use crate::telemetry::{EngineStatistik, EngineZaehler};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use konferenz_core::{KonferenzEvent, KonferenzFehler, KonferenzId, MitgliedId, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

// ---------------------------------------------------------------------------
// Innerer Zustand
// ---------------------------------------------------------------------------

pub(crate) struct RegistryInner {
    pub(crate) konferenzen: DashMap<KonferenzId, Arc<Konferenz>>,
    pub(crate) config: EngineConfig,
    shutdown_tx: watch::Sender<bool>,
    events: broadcast::Sender<KonferenzEvent>,
    gestoppt: AtomicBool,
    pub(crate) zaehler: Arc<EngineZaehler>,
}

impl RegistryInner {
    /// Veroeffentlicht ein Ereignis; ohne Abonnenten geht es verloren
    pub(crate) fn ereignis(&self, event: KonferenzEvent) {
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// ConferenceRegistry
// ---------------------------------------------------------------------------

/// Besitzer aller Konferenzen einer Engine-Instanz
#[derive(Clone)]
pub struct ConferenceRegistry {
    inner: Arc<RegistryInner>,
}

impl ConferenceRegistry {
    /// Erstellt eine leere Registry mit gepruefter Konfiguration
    pub fn neu(config: EngineConfig) -> Result<Self> {
        config.validieren()?;
        let (shutdown_tx, _) = watch::channel(false);
        let (events, _) = broadcast::channel(config.event_kapazitaet);
        Ok(Self {
            inner: Arc::new(RegistryInner {
                konferenzen: DashMap::new(),
                config,
                shutdown_tx,
                events,
                gestoppt: AtomicBool::new(false),
                zaehler: Arc::new(EngineZaehler::neu()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn ist_gestoppt(&self) -> bool {
        self.inner.gestoppt.load(Ordering::Acquire)
    }

    /// Abonniert alle Konferenz-Ereignisse
    pub fn ereignisse_abonnieren(&self) -> broadcast::Receiver<KonferenzEvent> {
        self.inner.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Beitreten / Verlassen
    // -----------------------------------------------------------------------

    /// Tritt einer Konferenz bei und erstellt sie bei Bedarf
    ///
    /// Eine neue Konferenz wird samt Mischer unter dem Eintrags-Lock der Map
    /// angelegt, bevor ein Member-Worker sie sehen kann. Trifft der Beitritt
    /// auf eine auslaufende Konferenz, wird sie durch eine neue ersetzt.
    ///
    /// Muss innerhalb einer Tokio-Laufzeit aufgerufen werden.
    pub fn beitreten<L: CallLeg>(
        &self,
        konferenz_id: KonferenzId,
        beschreibung: MitgliedBeschreibung,
        leg: L,
    ) -> Result<MitgliedHandle> {
        if self.ist_gestoppt() {
            return Err(KonferenzFehler::EngineGestoppt);
        }
        let laufzeit = tokio::runtime::Handle::try_current()
            .map_err(|_| KonferenzFehler::intern("keine Tokio-Laufzeit verfuegbar"))?;

        let verworfen = self.inner.zaehler.verworfen_zaehler();
        let (konferenz, mitglied, befehle, neu) =
            match self.inner.konferenzen.entry(konferenz_id.clone()) {
                Entry::Occupied(mut eintrag) => {
                    let hinzugefuegt = eintrag.get().mitglied_hinzufuegen(
                        &beschreibung,
                        &self.inner.config,
                        Arc::clone(&verworfen),
                    );
                    match hinzugefuegt {
                        Some((mitglied, befehle)) => {
                            (Arc::clone(eintrag.get()), mitglied, befehle, false)
                        }
                        None => {
                            tracing::debug!(konferenz_id = %konferenz_id, "Auslaufende Konferenz wird ersetzt");
                            let (konferenz, mitglied, befehle) =
                                self.konferenz_anlegen(&laufzeit, &konferenz_id, &beschreibung)?;
                            eintrag.insert(Arc::clone(&konferenz));
                            (konferenz, mitglied, befehle, true)
                        }
                    }
                }
                Entry::Vacant(eintrag) => {
                    let (konferenz, mitglied, befehle) =
                        self.konferenz_anlegen(&laufzeit, &konferenz_id, &beschreibung)?;
                    eintrag.insert(Arc::clone(&konferenz));
                    (konferenz, mitglied, befehle, true)
                }
            };

        if neu {
            tracing::info!(konferenz_id = %konferenz_id, "Konferenz erstellt");
            self.inner.ereignis(KonferenzEvent::KonferenzErstellt {
                konferenz_id: konferenz_id.clone(),
            });
        }

        let mitglied_id = mitglied.id();
        self.inner.zaehler.beitritt();
        tracing::info!(
            konferenz_id = %konferenz_id,
            mitglied_id = %mitglied_id,
            name = %mitglied.name(),
            stumm = mitglied.ist_stumm(),
            nur_hoeren = mitglied.ist_nur_hoerer(),
            "Mitglied beigetreten"
        );
        self.inner.ereignis(KonferenzEvent::MitgliedBeigetreten {
            konferenz_id: konferenz_id.clone(),
            mitglied_id,
            name: mitglied.name().to_string(),
        });

        let worker = MemberWorker {
            mitglied,
            konferenz,
            leg: Arc::new(leg),
            befehle,
            shutdown: self.inner.shutdown_tx.subscribe(),
            registry: Arc::downgrade(&self.inner),
            zaehler: Arc::clone(&self.inner.zaehler),
            config: self.inner.config.clone(),
        };
        let task = laufzeit.spawn(worker.ausfuehren());

        Ok(MitgliedHandle::neu(konferenz_id, mitglied_id, task))
    }

    /// Legt eine Konferenz mit ihrem ersten Mitglied an und startet den Mischer
    fn konferenz_anlegen(
        &self,
        laufzeit: &tokio::runtime::Handle,
        konferenz_id: &KonferenzId,
        beschreibung: &MitgliedBeschreibung,
    ) -> Result<(Arc<Konferenz>, Arc<Mitglied>, mpsc::Receiver<MitgliedBefehl>)> {
        let konferenz = Arc::new(Konferenz::neu(konferenz_id.clone()));
        let (mitglied, befehle) = konferenz
            .mitglied_hinzufuegen(
                beschreibung,
                &self.inner.config,
                self.inner.zaehler.verworfen_zaehler(),
            )
            .ok_or_else(|| KonferenzFehler::intern("neue Konferenz nimmt kein Mitglied auf"))?;

        let mischer = Mischer {
            konferenz: Arc::clone(&konferenz),
            registry: Arc::downgrade(&self.inner),
            shutdown: self.inner.shutdown_tx.subscribe(),
            zaehler: Arc::clone(&self.inner.zaehler),
            config: self.inner.config.clone(),
        };
        konferenz.mischer_setzen(laufzeit.spawn(mischer.ausfuehren()));
        Ok((konferenz, mitglied, befehle))
    }

    /// Entfernt ein Mitglied aus seiner Konferenz
    ///
    /// Das Call-Leg bleibt bestehen; der Member-Worker beendet sich mit
    /// `AustrittsGrund::Entfernt`. War es das letzte Mitglied, laeuft die
    /// Konferenz aus.
    pub fn verlassen(&self, konferenz_id: &KonferenzId, mitglied_id: MitgliedId) -> Result<()> {
        let konferenz = self.laufende_konferenz(konferenz_id)?;
        let (mitglied, leer) = konferenz
            .mitglied_entfernen(mitglied_id)
            .ok_or_else(|| mitglied_nicht_gefunden(konferenz_id, mitglied_id))?;

        mitglied.als_entfernt_markieren();
        let freigegeben = mitglied.queues_leeren();
        tracing::info!(
            konferenz_id = %konferenz_id,
            mitglied_id = %mitglied_id,
            freigegeben,
            konferenz_leer = leer,
            "Mitglied entfernt"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Steueroperationen
    // -----------------------------------------------------------------------

    /// Schaltet ein Mitglied stumm oder laut (idempotent)
    ///
    /// Kehrt zurueck, sobald der Member-Worker die Aenderung uebernommen hat.
    /// Ab dem naechsten Tick wird der Eingang nicht mehr gemischt.
    pub async fn stumm_schalten(
        &self,
        konferenz_id: &KonferenzId,
        mitglied_id: MitgliedId,
        stumm: bool,
    ) -> Result<()> {
        let mitglied = self.mitglied_finden(konferenz_id, mitglied_id)?;
        let (bestaetigung, bestaetigt) = oneshot::channel();

        let zustellung = async {
            mitglied
                .befehle()
                .send(MitgliedBefehl::Stumm { stumm, bestaetigung })
                .await
                .ok()?;
            bestaetigt.await.ok()
        };

        match tokio::time::timeout(self.inner.config.bestaetigung_timeout(), zustellung).await {
            Ok(Some(())) => {
                tracing::debug!(konferenz_id = %konferenz_id, mitglied_id = %mitglied_id, stumm, "Stummschaltung uebernommen");
                Ok(())
            }
            // Worker hat sich inzwischen beendet
            Ok(None) => Err(mitglied_nicht_gefunden(konferenz_id, mitglied_id)),
            Err(_) => Err(KonferenzFehler::Zeitlimit(format!(
                "Mitglied {mitglied_id} in {konferenz_id} bestaetigt Stummschaltung nicht"
            ))),
        }
    }

    /// Wirft ein Mitglied hinaus; der Member-Worker legt dessen Call-Leg auf
    pub async fn rauswerfen(&self, konferenz_id: &KonferenzId, mitglied_id: MitgliedId) -> Result<()> {
        let mitglied = self.mitglied_finden(konferenz_id, mitglied_id)?;

        match tokio::time::timeout(
            self.inner.config.bestaetigung_timeout(),
            mitglied.befehle().send(MitgliedBefehl::Rauswerfen),
        )
        .await
        {
            Ok(Ok(())) => {
                tracing::info!(konferenz_id = %konferenz_id, mitglied_id = %mitglied_id, "Mitglied wird rausgeworfen");
                Ok(())
            }
            Ok(Err(_)) => Err(mitglied_nicht_gefunden(konferenz_id, mitglied_id)),
            Err(_) => Err(KonferenzFehler::Zeitlimit(format!(
                "Befehlskanal von Mitglied {mitglied_id} in {konferenz_id} ist voll"
            ))),
        }
    }

    /// Anzahl der Mitglieder einer laufenden Konferenz
    pub fn mitglieder_anzahl(&self, konferenz_id: &KonferenzId) -> Result<usize> {
        Ok(self.laufende_konferenz(konferenz_id)?.mitglieder_anzahl())
    }

    /// Alle laufenden Konferenzen, sortiert nach Name
    pub fn konferenzen_auflisten(&self) -> Vec<KonferenzInfo> {
        let konferenzen: Vec<Arc<Konferenz>> = self
            .inner
            .konferenzen
            .iter()
            .map(|eintrag| Arc::clone(eintrag.value()))
            .collect();

        let mut liste: Vec<KonferenzInfo> = konferenzen
            .iter()
            .filter(|k| k.ist_laufend())
            .map(|k| k.info(false))
            .collect();
        liste.sort_by(|a, b| a.id.cmp(&b.id));
        liste
    }

    /// Details einer laufenden Konferenz inklusive Mitgliederliste
    pub fn konferenz_info(&self, konferenz_id: &KonferenzId) -> Result<KonferenzInfo> {
        Ok(self.laufende_konferenz(konferenz_id)?.info(true))
    }

    /// Momentaufnahme der Engine-Zaehler
    pub fn statistik(&self) -> EngineStatistik {
        let laufend = self.konferenzen_auflisten();
        let mitglieder = laufend.iter().map(|k| k.mitglieder_anzahl).sum();
        self.inner.zaehler.schnappschuss(laufend.len(), mitglieder)
    }

    // -----------------------------------------------------------------------
    // Herunterfahren
    // -----------------------------------------------------------------------

    /// Stoppt alle Konferenzen und Worker
    ///
    /// Call-Legs werden dabei nicht aufgelegt; die Member-Worker enden mit
    /// `AustrittsGrund::Heruntergefahren`. Wartet, bis alle Mischer beendet
    /// sind. Weitere Beitritte schlagen mit `EngineGestoppt` fehl.
    pub async fn stoppen(&self) {
        if self.inner.gestoppt.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown_tx.send_replace(true);

        let konferenzen: Vec<Arc<Konferenz>> = self
            .inner
            .konferenzen
            .iter()
            .map(|eintrag| Arc::clone(eintrag.value()))
            .collect();
        tracing::info!(konferenzen = konferenzen.len(), "Engine wird heruntergefahren");

        for konferenz in &konferenzen {
            konferenz.auslaufen();
        }
        for konferenz in konferenzen {
            if let Some(mischer) = konferenz.mischer_nehmen() {
                if let Err(e) = mischer.await {
                    tracing::warn!(konferenz_id = %konferenz.id(), fehler = %e, "Mischer-Task abgebrochen");
                }
            }
        }
        tracing::info!("Engine gestoppt");
    }

    // -----------------------------------------------------------------------
    // Hilfsfunktionen
    // -----------------------------------------------------------------------

    /// Sucht eine laufende Konferenz; auslaufende gelten als nicht vorhanden
    fn laufende_konferenz(&self, konferenz_id: &KonferenzId) -> Result<Arc<Konferenz>> {
        self.inner
            .konferenzen
            .get(konferenz_id)
            .map(|eintrag| Arc::clone(eintrag.value()))
            .filter(|k| k.ist_laufend())
            .ok_or_else(|| KonferenzFehler::KonferenzNichtGefunden(konferenz_id.to_string()))
    }

    fn mitglied_finden(
        &self,
        konferenz_id: &KonferenzId,
        mitglied_id: MitgliedId,
    ) -> Result<Arc<Mitglied>> {
        self.laufende_konferenz(konferenz_id)?
            .mitglied(mitglied_id)
            .ok_or_else(|| mitglied_nicht_gefunden(konferenz_id, mitglied_id))
    }
}

impl std::fmt::Debug for ConferenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConferenceRegistry")
            .field("konferenzen", &self.inner.konferenzen.len())
            .field("gestoppt", &self.ist_gestoppt())
            .finish()
    }
}

/// Wartet bis ein Stopp-Signal gesetzt ist oder sein Sender verschwindet
pub(crate) async fn signal_abwarten(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|gesetzt| *gesetzt).await;
}

fn mitglied_nicht_gefunden(konferenz_id: &KonferenzId, mitglied_id: MitgliedId) -> KonferenzFehler {
    KonferenzFehler::MitgliedNichtGefunden {
        konferenz: konferenz_id.to_string(),
        mitglied: mitglied_id.inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_leg::KanalLeitung;
    use std::time::Duration;

    fn registry() -> ConferenceRegistry {
        ConferenceRegistry::neu(EngineConfig::default()).unwrap()
    }

    fn room1() -> KonferenzId {
        KonferenzId::parse("room1").unwrap()
    }

    #[test]
    fn ungueltige_config_wird_abgelehnt() {
        let config = EngineConfig {
            queue_kapazitaet: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            ConferenceRegistry::neu(config),
            Err(KonferenzFehler::Konfiguration(_))
        ));
    }

    #[test]
    fn beitreten_ohne_laufzeit_schlaegt_fehl() {
        let (leitung, _g) = KanalLeitung::paar(4);
        let fehler = registry()
            .beitreten(room1(), MitgliedBeschreibung::neu("a"), leitung)
            .unwrap_err();
        assert!(matches!(fehler, KonferenzFehler::Intern(_)));
    }

    #[tokio::test]
    async fn beitritt_erstellt_konferenz() {
        let reg = registry();
        let mut events = reg.ereignisse_abonnieren();
        let (leitung, _g) = KanalLeitung::paar(4);
        let handle = reg
            .beitreten(room1(), MitgliedBeschreibung::neu("a"), leitung)
            .unwrap();

        assert_eq!(handle.id(), MitgliedId(1));
        assert_eq!(reg.mitglieder_anzahl(&room1()).unwrap(), 1);
        assert_eq!(
            events.recv().await.unwrap(),
            KonferenzEvent::KonferenzErstellt { konferenz_id: room1() }
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            KonferenzEvent::MitgliedBeigetreten { mitglied_id: MitgliedId(1), .. }
        ));
        reg.stoppen().await;
    }

    #[tokio::test]
    async fn unbekannte_konferenz_und_unbekanntes_mitglied() {
        let reg = registry();
        let andere = KonferenzId::parse("nirgends").unwrap();
        assert!(matches!(
            reg.mitglieder_anzahl(&andere),
            Err(KonferenzFehler::KonferenzNichtGefunden(_))
        ));
        assert!(matches!(
            reg.verlassen(&andere, MitgliedId(1)),
            Err(KonferenzFehler::KonferenzNichtGefunden(_))
        ));

        let (leitung, _g) = KanalLeitung::paar(4);
        let _handle = reg
            .beitreten(room1(), MitgliedBeschreibung::neu("a"), leitung)
            .unwrap();
        let fehler = reg.rauswerfen(&room1(), MitgliedId(42)).await.unwrap_err();
        assert!(matches!(
            fehler,
            KonferenzFehler::MitgliedNichtGefunden { mitglied: 42, .. }
        ));
        // Keine Seiteneffekte
        assert_eq!(reg.mitglieder_anzahl(&room1()).unwrap(), 1);
        reg.stoppen().await;
    }

    #[tokio::test]
    async fn stumm_schalten_ist_idempotent() {
        let reg = registry();
        let (leitung, _g) = KanalLeitung::paar(4);
        let handle = reg
            .beitreten(room1(), MitgliedBeschreibung::neu("a"), leitung)
            .unwrap();

        reg.stumm_schalten(&room1(), handle.id(), true).await.unwrap();
        reg.stumm_schalten(&room1(), handle.id(), true).await.unwrap();
        let info = reg.konferenz_info(&room1()).unwrap();
        assert!(info.mitglieder[0].stumm);

        reg.stumm_schalten(&room1(), handle.id(), false).await.unwrap();
        assert!(!reg.konferenz_info(&room1()).unwrap().mitglieder[0].stumm);
        reg.stoppen().await;
    }

    #[tokio::test]
    async fn verlassen_beendet_worker_ohne_auflegen() {
        let reg = registry();
        let (leitung, gegenstelle) = KanalLeitung::paar(4);
        let handle = reg
            .beitreten(room1(), MitgliedBeschreibung::neu("a"), leitung)
            .unwrap();

        reg.verlassen(&room1(), handle.id()).unwrap();
        let grund = tokio::time::timeout(Duration::from_secs(2), handle.beendet())
            .await
            .unwrap();
        assert_eq!(grund, konferenz_core::AustrittsGrund::Entfernt);
        assert!(!gegenstelle.wurde_aufgelegt());

        // Zweites Verlassen: Konferenz ist bereits weg bzw. auslaufend
        assert!(reg.verlassen(&room1(), MitgliedId(1)).unwrap_err().ist_nicht_gefunden());
    }

    #[tokio::test]
    async fn nach_stoppen_kein_beitritt() {
        let reg = registry();
        reg.stoppen().await;
        reg.stoppen().await;
        let (leitung, _g) = KanalLeitung::paar(4);
        assert!(matches!(
            reg.beitreten(room1(), MitgliedBeschreibung::neu("a"), leitung),
            Err(KonferenzFehler::EngineGestoppt)
        ));
    }

    #[tokio::test]
    async fn auflisten_sortiert() {
        let reg = registry();
        let mut handles = Vec::new();
        for name in ["zeta", "alpha", "mitte"] {
            let (leitung, g) = KanalLeitung::paar(4);
            let h = reg
                .beitreten(KonferenzId::parse(name).unwrap(), MitgliedBeschreibung::neu("x"), leitung)
                .unwrap();
            handles.push((h, g));
        }
        let namen: Vec<String> = reg
            .konferenzen_auflisten()
            .into_iter()
            .map(|k| k.id.to_string())
            .collect();
        assert_eq!(namen, vec!["alpha", "mitte", "zeta"]);

        let statistik = reg.statistik();
        assert_eq!(statistik.konferenzen_aktiv, 3);
        assert_eq!(statistik.mitglieder_verbunden, 3);
        assert_eq!(statistik.beitritte_gesamt, 3);
        reg.stoppen().await;
    }
}
