//! Steuerung fuer Verwaltungsschichten
//!
//! Nimmt Kennungen als rohe Zeichenketten entgegen, wie sie eine
//! Manager-Aktion oder ein Konsolenbefehl liefert, prueft sie und ruft die
//! Registry auf. Fehlerhafte Kennungen werden mit eigener Meldung als
//! `UngueltigeKennung` abgelehnt, bevor irgendein Zustand angefasst wird.

use crate::call_leg::CallLeg;
use crate::conference::KonferenzInfo;
use crate::member::MitgliedBeschreibung;
use crate::member_worker::MitgliedHandle;
use crate::registry::ConferenceRegistry;
use konferenz_core::{KonferenzId, MitgliedId, Result};

/// Steuer-Fassade ueber einer [`ConferenceRegistry`]
#[derive(Debug, Clone)]
pub struct Steuerung {
    registry: ConferenceRegistry,
}

impl Steuerung {
    pub fn neu(registry: ConferenceRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConferenceRegistry {
        &self.registry
    }

    /// Tritt einer Konferenz bei; liefert das Handle mit der Mitgliedsnummer
    pub fn beitreten<L: CallLeg>(
        &self,
        konferenz: &str,
        beschreibung: MitgliedBeschreibung,
        leg: L,
    ) -> Result<MitgliedHandle> {
        let konferenz_id = KonferenzId::parse(konferenz)?;
        self.registry.beitreten(konferenz_id, beschreibung, leg)
    }

    pub fn verlassen(&self, konferenz: &str, mitglied: &str) -> Result<()> {
        let (konferenz_id, mitglied_id) = kennungen(konferenz, mitglied)?;
        self.registry.verlassen(&konferenz_id, mitglied_id)
    }

    pub async fn stumm(&self, konferenz: &str, mitglied: &str) -> Result<()> {
        let (konferenz_id, mitglied_id) = kennungen(konferenz, mitglied)?;
        self.registry.stumm_schalten(&konferenz_id, mitglied_id, true).await
    }

    pub async fn laut(&self, konferenz: &str, mitglied: &str) -> Result<()> {
        let (konferenz_id, mitglied_id) = kennungen(konferenz, mitglied)?;
        self.registry.stumm_schalten(&konferenz_id, mitglied_id, false).await
    }

    pub async fn rauswerfen(&self, konferenz: &str, mitglied: &str) -> Result<()> {
        let (konferenz_id, mitglied_id) = kennungen(konferenz, mitglied)?;
        self.registry.rauswerfen(&konferenz_id, mitglied_id).await
    }

    pub fn auflisten(&self) -> Vec<KonferenzInfo> {
        self.registry.konferenzen_auflisten()
    }

    pub fn anzahl(&self, konferenz: &str) -> Result<usize> {
        self.registry.mitglieder_anzahl(&KonferenzId::parse(konferenz)?)
    }

    /// Konferenz mit Mitgliederliste
    pub fn details(&self, konferenz: &str) -> Result<KonferenzInfo> {
        self.registry.konferenz_info(&KonferenzId::parse(konferenz)?)
    }
}

fn kennungen(konferenz: &str, mitglied: &str) -> Result<(KonferenzId, MitgliedId)> {
    Ok((KonferenzId::parse(konferenz)?, mitglied.parse()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_leg::KanalLeitung;
    use crate::config::EngineConfig;
    use konferenz_core::KonferenzFehler;

    fn steuerung() -> Steuerung {
        Steuerung::neu(ConferenceRegistry::neu(EngineConfig::default()).unwrap())
    }

    fn meldung(fehler: KonferenzFehler) -> String {
        match fehler {
            KonferenzFehler::UngueltigeKennung(m) => m,
            andere => panic!("UngueltigeKennung erwartet: {andere:?}"),
        }
    }

    #[tokio::test]
    async fn kennungsfehler_haben_eigene_meldungen() {
        let s = steuerung();
        let leer_konferenz = meldung(s.stumm("", "1").await.unwrap_err());
        let leer_mitglied = meldung(s.stumm("room1", " ").await.unwrap_err());
        let keine_zahl = meldung(s.stumm("room1", "abc").await.unwrap_err());

        assert_ne!(leer_konferenz, leer_mitglied);
        assert_ne!(leer_mitglied, keine_zahl);
        assert!(keine_zahl.contains("abc"));
    }

    #[tokio::test]
    async fn unbekannt_wird_unterschieden() {
        let s = steuerung();
        assert!(matches!(
            s.laut("room1", "1").await,
            Err(KonferenzFehler::KonferenzNichtGefunden(_))
        ));

        let (leitung, _g) = KanalLeitung::paar(4);
        let handle = s
            .beitreten("room1", MitgliedBeschreibung::neu("a"), leitung)
            .unwrap();
        assert!(matches!(
            s.laut("room1", "7").await,
            Err(KonferenzFehler::MitgliedNichtGefunden { .. })
        ));

        s.stumm("room1", &handle.id().to_string()).await.unwrap();
        s.laut("room1", &handle.id().to_string()).await.unwrap();
        assert_eq!(s.anzahl("room1").unwrap(), 1);
        assert_eq!(s.auflisten().len(), 1);
        assert_eq!(s.details("room1").unwrap().mitglieder.len(), 1);
        s.registry().stoppen().await;
    }

    #[tokio::test]
    async fn beitreten_mit_leerem_namen_abgelehnt() {
        let s = steuerung();
        let (leitung, _g) = KanalLeitung::paar(4);
        assert!(matches!(
            s.beitreten("  ", MitgliedBeschreibung::neu("a"), leitung),
            Err(KonferenzFehler::UngueltigeKennung(_))
        ));
        assert!(s.auflisten().is_empty());
    }
}
