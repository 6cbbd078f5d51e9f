//! Tick-Kern und Mischer-Task
//!
//! [`TickKern`] enthaelt die gesamte Entscheidungslogik eines Ticks
//! (VAD, Mischung, Quellenwahl) synchron und ohne Zeitgeber. Der
//! [`Mischer`] ist der async Rahmen darum: er schlaeft bis zur naechsten
//! Frist, sammelt die Eingaenge, ruft den Kern auf und verteilt die
//! Ausgaben. Zwischen Sammeln und Verteilen gibt es kein `.await`, ein Tick
//! ist daher nie halb sichtbar.

use crate::config::EngineConfig;
use crate::conference::Konferenz;
use crate::frame::{Frame, SequenzPruefer};
use crate::mixer::{mischen, Beitrag};
use crate::registry::{signal_abwarten, RegistryInner};
use crate::telemetry::EngineZaehler;
use crate::timing::{TaktErgebnis, TickTakt};
use crate::vad::{AktivitaetsDetektor, VadConfig};
use konferenz_core::{KonferenzEvent, MitgliedId};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// TickKern
// ---------------------------------------------------------------------------

/// Eingang eines Mitglieds fuer einen Tick
///
/// `frame` ist `None`, wenn kein Frame vorlag oder das Mitglied stumm ist.
/// `unterdrueckt` heisst, dass seit dem letzten Tick Frames absichtlich
/// nicht gemischt wurden (stumm, nur zuhoeren). Die folgende Sequenzluecke
/// zaehlt dann nicht als Verlust.
#[derive(Debug, Clone)]
pub struct TickEingang {
    pub id: MitgliedId,
    pub frame: Option<Frame>,
    pub unterdrueckt: bool,
}

/// Ausgabe fuer ein Mitglied
#[derive(Debug, Clone)]
pub struct TickAusgabe {
    pub id: MitgliedId,
    pub frame: Frame,
    /// Aktivitaets-Score nach diesem Tick
    pub aktivitaet: f32,
    /// VAD-Zustand nach diesem Tick
    pub spricht: bool,
}

/// Ergebnis eines Ticks
#[derive(Debug, Clone, Default)]
pub struct TickErgebnis {
    /// Gleiche Reihenfolge wie die Eingaenge
    pub ausgaben: Vec<TickAusgabe>,
    pub aktive_quelle: Option<MitgliedId>,
    /// `Some((alt, neu))` wenn die aktive Quelle gewechselt hat
    pub quelle_gewechselt: Option<(Option<MitgliedId>, Option<MitgliedId>)>,
    /// Mitglieder, deren VAD-Zustand gewechselt hat
    pub sprecher_wechsel: Vec<(MitgliedId, bool)>,
    /// Aus Sequenzluecken erkannte fehlende Eingangs-Frames
    pub verlorene_frames: u64,
}

struct MitgliedSpur {
    detektor: AktivitaetsDetektor,
    eingang_sequenz: SequenzPruefer,
    ausgang_sequenz: u64,
}

/// Synchroner, deterministischer Kern eines Mischers
pub struct TickKern {
    laenge: usize,
    vad: VadConfig,
    video_modus: bool,
    stille: Arc<[i16]>,
    spuren: HashMap<MitgliedId, MitgliedSpur>,
    aktive_quelle: Option<MitgliedId>,
}

impl TickKern {
    pub fn neu(config: &EngineConfig) -> Self {
        let laenge = config.samples_pro_frame();
        Self {
            laenge,
            vad: config.vad,
            video_modus: config.video_modus,
            stille: vec![0i16; laenge].into(),
            spuren: HashMap::new(),
            aktive_quelle: None,
        }
    }

    pub fn aktive_quelle(&self) -> Option<MitgliedId> {
        self.aktive_quelle
    }

    /// Verarbeitet einen Tick
    ///
    /// Mitglieder, die nicht mehr unter den Eingaengen sind, verlieren ihren
    /// VAD-Zustand. War eines davon die aktive Quelle, ist danach keine
    /// Quelle gesetzt, bis jemand die Aktivierungsschwelle ueberschreitet.
    pub fn verarbeiten(&mut self, eingaenge: Vec<TickEingang>) -> TickErgebnis {
        let vorherige_quelle = self.aktive_quelle;
        self.spuren
            .retain(|id, _| eingaenge.iter().any(|e| e.id == *id));
        if let Some(quelle) = self.aktive_quelle {
            if !self.spuren.contains_key(&quelle) {
                self.aktive_quelle = None;
            }
        }

        // --- VAD ---
        let mut verlorene_frames = 0;
        let mut sprecher_wechsel = Vec::new();
        let mut zustaende = Vec::with_capacity(eingaenge.len());
        for eingang in &eingaenge {
            let vad = self.vad;
            let spur = self.spuren.entry(eingang.id).or_insert_with(|| MitgliedSpur {
                detektor: AktivitaetsDetektor::neu(vad),
                eingang_sequenz: SequenzPruefer::neu(),
                ausgang_sequenz: 0,
            });
            let vorher = spur.detektor.ist_aktiv();
            if eingang.unterdrueckt {
                spur.eingang_sequenz.zuruecksetzen();
            }
            let aktiv = match &eingang.frame {
                Some(frame) => {
                    verlorene_frames += spur.eingang_sequenz.pruefen(frame.sequenz());
                    spur.detektor.frame_bewerten(frame)
                }
                None => spur.detektor.stille(),
            };
            if aktiv != vorher {
                sprecher_wechsel.push((eingang.id, aktiv));
            }
            zustaende.push((aktiv, spur.detektor.score()));
        }

        // --- Mischen ---
        let beitraege: Vec<Beitrag<'_>> = eingaenge
            .iter()
            .zip(&zustaende)
            .map(|(e, &(aktiv, _))| Beitrag {
                samples: e.frame.as_ref().map(|f| f.samples()),
                aktiv,
            })
            .collect();
        let gemischt = mischen(&beitraege, self.laenge, &self.stille);

        let mut ausgaben = Vec::with_capacity(eingaenge.len());
        for ((eingang, samples), &(spricht, aktivitaet)) in
            eingaenge.iter().zip(gemischt).zip(&zustaende)
        {
            let sequenz = match self.spuren.get_mut(&eingang.id) {
                Some(spur) => {
                    spur.ausgang_sequenz += 1;
                    spur.ausgang_sequenz
                }
                None => 0,
            };
            ausgaben.push(TickAusgabe {
                id: eingang.id,
                frame: Frame::neu(samples, sequenz),
                aktivitaet,
                spricht,
            });
        }

        // --- Quellenwahl ---
        if self.video_modus {
            if let Some(gewinner) = self.quelle_waehlen(&eingaenge) {
                self.aktive_quelle = Some(gewinner);
            }
        }

        let quelle_gewechselt = (self.aktive_quelle != vorherige_quelle)
            .then_some((vorherige_quelle, self.aktive_quelle));

        TickErgebnis {
            ausgaben,
            aktive_quelle: self.aktive_quelle,
            quelle_gewechselt,
            sprecher_wechsel,
            verlorene_frames,
        }
    }

    /// Hoechster Score ueber der Aktivierungsschwelle; bei Gleichstand die kleinere Nummer
    fn quelle_waehlen(&self, eingaenge: &[TickEingang]) -> Option<MitgliedId> {
        let mut bester: Option<(MitgliedId, f32)> = None;
        for eingang in eingaenge {
            let Some(spur) = self.spuren.get(&eingang.id) else {
                continue;
            };
            if !spur.detektor.ueber_aktivierung() {
                continue;
            }
            let score = spur.detektor.score();
            bester = match bester {
                Some((id, besser)) if besser > score || (besser == score && id < eingang.id) => {
                    Some((id, besser))
                }
                _ => Some((eingang.id, score)),
            };
        }
        bester.map(|(id, _)| id)
    }
}

// ---------------------------------------------------------------------------
// Mischer-Task
// ---------------------------------------------------------------------------

/// Mischer einer Konferenz (ein Task pro Konferenz)
pub(crate) struct Mischer {
    pub(crate) konferenz: Arc<Konferenz>,
    pub(crate) registry: Weak<RegistryInner>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) zaehler: Arc<EngineZaehler>,
    pub(crate) config: EngineConfig,
}

impl Mischer {
    pub(crate) async fn ausfuehren(mut self) {
        let konferenz_id = self.konferenz.id().clone();
        let mut kern = TickKern::neu(&self.config);
        let mut takt = TickTakt::neu(self.config.tick_periode(), Instant::now());
        let mut auslaufen = self.konferenz.auslaufen_empfaenger();

        tracing::info!(
            konferenz_id = %konferenz_id,
            tick_ms = self.config.tick_ms,
            video_modus = self.config.video_modus,
            "Mischer gestartet"
        );

        loop {
            tokio::select! {
                biased;
                _ = signal_abwarten(&mut auslaufen) => break,
                _ = signal_abwarten(&mut self.shutdown) => break,
                _ = tokio::time::sleep_until(takt.frist()) => {}
            }

            self.tick(&mut kern);

            if let TaktErgebnis::Ueberlauf { rueckstand } = takt.fortschreiten(Instant::now()) {
                self.konferenz.ueberlauf_zaehlen();
                self.zaehler.ueberlauf();
                tracing::warn!(
                    konferenz_id = %konferenz_id,
                    rueckstand_ms = rueckstand.as_millis() as u64,
                    "Mischer hinter dem Zeitplan, Frist neu gesetzt"
                );
                self.ereignis(KonferenzEvent::TickUeberlauf {
                    konferenz_id: konferenz_id.clone(),
                    rueckstand_ms: rueckstand.as_millis() as u64,
                });
            }
        }

        self.konferenz.beenden();
        if let Some(registry) = self.registry.upgrade() {
            // Nur den eigenen Eintrag entfernen; eine neue Konferenz gleichen
            // Namens kann ihn bereits ersetzt haben
            registry
                .konferenzen
                .remove_if(&konferenz_id, |_, k| Arc::ptr_eq(k, &self.konferenz));
        }
        self.ereignis(KonferenzEvent::KonferenzBeendet {
            konferenz_id: konferenz_id.clone(),
        });
        tracing::info!(
            konferenz_id = %konferenz_id,
            ticks = self.konferenz.ticks(),
            ueberlaeufe = self.konferenz.ueberlaeufe(),
            "Konferenz beendet"
        );
    }

    /// Ein vollstaendiger Tick: sammeln, mischen, verteilen
    fn tick(&self, kern: &mut TickKern) {
        let mitglieder = self.konferenz.schnappschuss();

        let eingaenge = mitglieder
            .iter()
            .map(|m| {
                let frame = m.eingang.try_pop();
                let darf_sprechen = m.darf_sprechen();
                // Erst nach dem Entnehmen lesen, sonst geht eine Markierung vor
                // dem ersten Frame nach der Stummschaltung verloren
                let uebersprungen = m.uebersprungen_nehmen();
                TickEingang {
                    id: m.id(),
                    frame: frame.filter(|_| darf_sprechen),
                    unterdrueckt: uebersprungen || !darf_sprechen,
                }
            })
            .collect();

        let ergebnis = kern.verarbeiten(eingaenge);

        for (mitglied, ausgabe) in mitglieder.iter().zip(ergebnis.ausgaben) {
            mitglied.vad_veroeffentlichen(ausgabe.aktivitaet, ausgabe.spricht);
            if mitglied.ist_entfernt() {
                continue;
            }
            mitglied.ausgang.push(ausgabe.frame);
        }

        self.konferenz.quelle_setzen(ergebnis.aktive_quelle);
        self.konferenz.tick_zaehlen();
        self.zaehler.tick();
        self.zaehler.verloren(ergebnis.verlorene_frames);

        let konferenz_id = self.konferenz.id();
        for (mitglied_id, spricht) in ergebnis.sprecher_wechsel {
            tracing::debug!(konferenz_id = %konferenz_id, mitglied_id = %mitglied_id, spricht, "Sprechstatus");
            self.ereignis(KonferenzEvent::SprechStatus {
                konferenz_id: konferenz_id.clone(),
                mitglied_id,
                spricht,
            });
        }
        if let Some((alt, neu)) = ergebnis.quelle_gewechselt {
            tracing::debug!(konferenz_id = %konferenz_id, ?alt, ?neu, "Aktive Quelle gewechselt");
            self.ereignis(KonferenzEvent::QuelleGewechselt {
                konferenz_id: konferenz_id.clone(),
                alt,
                neu,
            });
        }
    }

    fn ereignis(&self, event: KonferenzEvent) {
        if let Some(registry) = self.registry.upgrade() {
            registry.ereignis(event);
        }
    }
}
