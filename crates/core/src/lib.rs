//! konferenz-core – Gemeinsame Typen, Fehler und Ereignisse
//!
//! Dieses Crate stellt die Bausteine bereit, die Engine, Observability
//! und Server gemeinsam nutzen.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{KonferenzFehler, Result};
pub use event::KonferenzEvent;
pub use types::{AustrittsGrund, KonferenzId, MitgliedId};
