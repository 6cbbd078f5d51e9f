//! Konferenz-Ereignisse
//!
//! Werden von der Registry ueber einen tokio-broadcast-Kanal verteilt, damit
//! eine Verwaltungsschicht (Manager-Protokoll, Metriken) sie abonnieren kann.
//! Es gibt keine Zustellgarantie: langsame Abonnenten verpassen Ereignisse.

use crate::types::{AustrittsGrund, KonferenzId, MitgliedId};
use serde::{Deserialize, Serialize};

/// Alle Ereignisse, die die Engine veroeffentlicht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KonferenzEvent {
    /// Eine Konferenz wurde beim ersten Beitritt erstellt
    KonferenzErstellt { konferenz_id: KonferenzId },
    /// Der Mischer einer Konferenz ist beendet
    KonferenzBeendet { konferenz_id: KonferenzId },
    /// Ein Mitglied ist beigetreten
    MitgliedBeigetreten {
        konferenz_id: KonferenzId,
        mitglied_id: MitgliedId,
        name: String,
    },
    /// Ein Mitglied hat die Konferenz verlassen
    MitgliedVerlassen {
        konferenz_id: KonferenzId,
        mitglied_id: MitgliedId,
        grund: AustrittsGrund,
    },
    /// Stummschaltung wurde vom Member-Worker uebernommen
    StummGeaendert {
        konferenz_id: KonferenzId,
        mitglied_id: MitgliedId,
        stumm: bool,
    },
    /// Sprachaktivitaet eines Mitglieds hat gewechselt
    SprechStatus {
        konferenz_id: KonferenzId,
        mitglied_id: MitgliedId,
        spricht: bool,
    },
    /// Neue aktive (Video-)Quelle
    QuelleGewechselt {
        konferenz_id: KonferenzId,
        alt: Option<MitgliedId>,
        neu: Option<MitgliedId>,
    },
    /// Der Mischer lag mehr als eine Periode hinter dem Zeitplan
    TickUeberlauf {
        konferenz_id: KonferenzId,
        rueckstand_ms: u64,
    },
}

impl KonferenzEvent {
    /// Gibt die Konferenz zurueck, auf die sich das Ereignis bezieht
    pub fn konferenz_id(&self) -> &KonferenzId {
        match self {
            Self::KonferenzErstellt { konferenz_id }
            | Self::KonferenzBeendet { konferenz_id }
            | Self::MitgliedBeigetreten { konferenz_id, .. }
            | Self::MitgliedVerlassen { konferenz_id, .. }
            | Self::StummGeaendert { konferenz_id, .. }
            | Self::SprechStatus { konferenz_id, .. }
            | Self::QuelleGewechselt { konferenz_id, .. }
            | Self::TickUeberlauf { konferenz_id, .. } => konferenz_id,
        }
    }
}
