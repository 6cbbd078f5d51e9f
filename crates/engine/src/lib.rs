//! konferenz-engine – Misch-Engine fuer Mehrparteien-Konferenzen
//!
//! Jedes Mitglied hat einen Member-Worker, der Frames zwischen seinem
//! Call-Leg und zwei Queues hin- und herschiebt. Pro Konferenz laeuft ein
//! Mischer, der im festen Takt alle Eingangs-Queues leert, mischt und die
//! Ergebnisse auf die Ausgangs-Queues verteilt.
//!
//! ```text
//! Call-Leg -> Member-Worker -> Eingangs-Queue -> Mischer
//!                                                  |
//! Call-Leg <- Member-Worker <- Ausgangs-Queue <----+
//! ```
//!
//! ## Module
//! - [`frame`] – Unveraenderliche Audio-Frames und Sequenzpruefung
//! - [`queue`] – Begrenzte Frame-Queue mit Verwerf-Strategie
//! - [`config`] – Engine-Konfiguration
//! - [`vad`] – Sprachaktivitaetserkennung mit Hysterese
//! - [`mixer`] – Saettigende Summenmischung mit Selbstausschluss
//! - [`timing`] – Driftfreier Tick-Takt
//! - [`call_leg`] – Schnittstelle zum Call-Leg der Host-Plattform
//! - [`member`] – Mitglieds-Zustand
//! - [`member_worker`] – Pumpt Frames zwischen Call-Leg und Queues
//! - [`conference`] – Konferenz-Zustand
//! - [`mixing`] – Tick-Kern und Mischer-Task
//! - [`registry`] – Konferenz-Registry (Lebenszyklus, Steueroperationen)
//! - [`control`] – Steuerung mit Kennungspruefung fuer Verwaltungsschichten
//! - [`telemetry`] – Engine-weite Zaehler

pub mod call_leg;
pub mod conference;
pub mod config;
pub mod control;
pub mod frame;
pub mod member;
pub mod member_worker;
pub mod mixer;
pub mod mixing;
pub mod queue;
pub mod registry;
pub mod telemetry;
pub mod timing;
pub mod vad;

pub use call_leg::{CallLeg, CallLegFehler, KanalLeitung, LeitungsGegenstelle, LeseErgebnis};
pub use conference::{KonferenzInfo, KonferenzZustand};
pub use config::EngineConfig;
pub use control::Steuerung;
pub use frame::Frame;
pub use member::{MitgliedBeschreibung, MitgliedInfo};
pub use member_worker::MitgliedHandle;
pub use queue::{FrameQueue, PushErgebnis, UeberlaufStrategie};
pub use registry::ConferenceRegistry;
pub use telemetry::EngineStatistik;

pub use konferenz_core::{AustrittsGrund, KonferenzEvent, KonferenzFehler, KonferenzId, MitgliedId};
pub use mixing::{TickEingang, TickErgebnis, TickKern};
