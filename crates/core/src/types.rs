//! Gemeinsame Identifikationstypen fuer die Konferenz-Engine
//!
//! Konferenzen werden ueber einen frei waehlbaren Namen adressiert,
//! Mitglieder ueber eine Nummer, die innerhalb ihrer Konferenz eindeutig ist.
//! Beide verwenden das Newtype-Pattern, damit sie sich zur Compilezeit
//! nicht verwechseln lassen.

use crate::error::KonferenzFehler;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Name einer Konferenz (z.B. "room1")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KonferenzId(String);

impl KonferenzId {
    /// Prueft und uebernimmt einen Konferenznamen
    ///
    /// Fuehrende und abschliessende Leerzeichen werden entfernt, ein leerer
    /// Name ist ungueltig.
    pub fn parse(roh: &str) -> Result<Self, KonferenzFehler> {
        let name = roh.trim();
        if name.is_empty() {
            return Err(KonferenzFehler::UngueltigeKennung(
                "Konferenz nicht angegeben".into(),
            ));
        }
        Ok(Self(name.to_string()))
    }

    /// Gibt den Namen als &str zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for KonferenzId {
    type Err = KonferenzFehler;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for KonferenzId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Nummer eines Mitglieds, eindeutig innerhalb seiner Konferenz
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MitgliedId(pub u32);

impl MitgliedId {
    /// Gibt die innere Nummer zurueck
    pub fn inner(&self) -> u32 {
        self.0
    }
}

impl FromStr for MitgliedId {
    type Err = KonferenzFehler;

    /// Parst eine Mitgliedsnummer aus einer Steueranfrage
    ///
    /// Unterscheidet zwischen fehlender und nicht-numerischer Angabe.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let roh = s.trim();
        if roh.is_empty() {
            return Err(KonferenzFehler::UngueltigeKennung(
                "Mitgliedsnummer nicht angegeben".into(),
            ));
        }
        roh.parse::<u32>().map(Self).map_err(|_| {
            KonferenzFehler::UngueltigeKennung(format!("Ungueltige Mitgliedsnummer: '{roh}'"))
        })
    }
}

impl std::fmt::Display for MitgliedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Grund, aus dem ein Mitglied seine Konferenz verlassen hat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AustrittsGrund {
    /// Die Gegenstelle hat aufgelegt
    Aufgelegt,
    /// Von der Steuerung hinausgeworfen
    Gekickt,
    /// Von der Steuerung aus der Konferenz entfernt (ohne Auflegen)
    Entfernt,
    /// Die Engine wurde gestoppt
    Heruntergefahren,
    /// Lese- oder Schreibfehler auf dem Call-Leg
    Fehler(String),
}

impl std::fmt::Display for AustrittsGrund {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aufgelegt => f.write_str("aufgelegt"),
            Self::Gekickt => f.write_str("gekickt"),
            Self::Entfernt => f.write_str("entfernt"),
            Self::Heruntergefahren => f.write_str("heruntergefahren"),
            Self::Fehler(grund) => write!(f, "fehler: {grund}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn konferenz_id_wird_getrimmt() {
        let id = KonferenzId::parse("  room1 ").unwrap();
        assert_eq!(id.as_str(), "room1");
        assert_eq!(id.to_string(), "room1");
    }

    #[test]
    fn leere_konferenz_id_ungueltig() {
        let fehler = KonferenzId::parse("   ").unwrap_err();
        assert!(matches!(fehler, KonferenzFehler::UngueltigeKennung(_)));
        assert!(fehler.to_string().contains("Konferenz nicht angegeben"));
    }

    #[test]
    fn mitglied_id_parsen() {
        let id: MitgliedId = "42".parse().unwrap();
        assert_eq!(id, MitgliedId(42));
        assert_eq!(id.inner(), 42);
    }

    #[test]
    fn mitglied_id_fehlt_und_ungueltig_unterscheidbar() {
        let fehlt = "".parse::<MitgliedId>().unwrap_err();
        assert!(fehlt.to_string().contains("nicht angegeben"));

        let ungueltig = "12abc".parse::<MitgliedId>().unwrap_err();
        assert!(ungueltig.to_string().contains("Ungueltige Mitgliedsnummer"));

        // Negative Nummern sind ebenfalls ungueltig
        assert!("-1".parse::<MitgliedId>().is_err());
    }

    #[test]
    fn mitglied_ids_sortierbar() {
        let mut ids = vec![MitgliedId(3), MitgliedId(1), MitgliedId(2)];
        ids.sort();
        assert_eq!(ids, vec![MitgliedId(1), MitgliedId(2), MitgliedId(3)]);
    }

    #[test]
    fn austrittsgrund_serde_kompatibel() {
        let grund = AustrittsGrund::Fehler("EPIPE".into());
        let json = serde_json::to_string(&grund).unwrap();
        let zurueck: AustrittsGrund = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, grund);
        assert_eq!(grund.to_string(), "fehler: EPIPE");
    }
}
