//! Call-Leg-Schnittstelle
//!
//! Das Call-Leg ist die Verbindung der Host-Plattform zu einem Teilnehmer
//! (z.B. ein Telefonkanal). Die Engine liest daraus Frames, schreibt
//! gemischte Frames hinein und legt nur bei einem Rauswurf selbst auf.
//!
//! [`KanalLeitung`] ist ein Call-Leg im Speicher auf Basis von
//! tokio-Kanaelen. Die [`LeitungsGegenstelle`] spielt das entfernte Ende.

use crate::frame::Frame;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};

/// Ergebnis eines Lesevorgangs
#[derive(Debug, Clone)]
pub enum LeseErgebnis {
    /// Ein Frame wurde gelesen
    Frame(Frame),
    /// Innerhalb des Timeouts kam kein Frame
    KeineDaten,
    /// Die Gegenstelle hat aufgelegt
    Geschlossen,
}

/// Fehler eines Call-Legs
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallLegFehler {
    #[error("Call-Leg geschlossen")]
    Geschlossen,

    #[error("Call-Leg-Fehler: {0}")]
    Io(String),
}

/// Verbindung zu einem Teilnehmer, bereitgestellt von der Host-Plattform
///
/// Lesen und Schreiben koennen gleichzeitig aus verschiedenen Schleifen
/// aufgerufen werden.
#[async_trait]
pub trait CallLeg: Send + Sync + 'static {
    /// Liest den naechsten Frame, wartet hoechstens `timeout`
    async fn frame_lesen(&self, timeout: Duration) -> Result<LeseErgebnis, CallLegFehler>;

    /// Schreibt einen Frame zur Gegenstelle
    async fn frame_schreiben(&self, frame: Frame) -> Result<(), CallLegFehler>;

    /// Legt auf (nur nach einem Rauswurf aufgerufen)
    async fn auflegen(&self);
}

// ---------------------------------------------------------------------------
// KanalLeitung
// ---------------------------------------------------------------------------

/// Call-Leg im Speicher
///
/// Schreiben blockiert nie: ist der Empfangspuffer der Gegenstelle voll,
/// wird der Frame verworfen, wie es ein echter Kanal bei Ueberlast taete.
pub struct KanalLeitung {
    von_gegenstelle: Mutex<mpsc::Receiver<Frame>>,
    zur_gegenstelle: mpsc::Sender<Frame>,
    aufgelegt: watch::Sender<bool>,
}

/// Entferntes Ende einer [`KanalLeitung`]
pub struct LeitungsGegenstelle {
    zur_engine: Option<mpsc::Sender<Frame>>,
    von_engine: mpsc::Receiver<Frame>,
    aufgelegt: watch::Receiver<bool>,
}

impl KanalLeitung {
    /// Erstellt eine Leitung samt Gegenstelle; `puffer` Frames pro Richtung
    pub fn paar(puffer: usize) -> (Self, LeitungsGegenstelle) {
        let (zur_engine_tx, zur_engine_rx) = mpsc::channel(puffer.max(1));
        let (zur_gegenstelle_tx, zur_gegenstelle_rx) = mpsc::channel(puffer.max(1));
        let (aufgelegt_tx, aufgelegt_rx) = watch::channel(false);

        let leitung = Self {
            von_gegenstelle: Mutex::new(zur_engine_rx),
            zur_gegenstelle: zur_gegenstelle_tx,
            aufgelegt: aufgelegt_tx,
        };
        let gegenstelle = LeitungsGegenstelle {
            zur_engine: Some(zur_engine_tx),
            von_engine: zur_gegenstelle_rx,
            aufgelegt: aufgelegt_rx,
        };
        (leitung, gegenstelle)
    }

    fn ist_aufgelegt(&self) -> bool {
        *self.aufgelegt.borrow()
    }
}

#[async_trait]
impl CallLeg for KanalLeitung {
    async fn frame_lesen(&self, timeout: Duration) -> Result<LeseErgebnis, CallLegFehler> {
        if self.ist_aufgelegt() {
            return Ok(LeseErgebnis::Geschlossen);
        }
        let mut rx = self.von_gegenstelle.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(frame)) => Ok(LeseErgebnis::Frame(frame)),
            Ok(None) => Ok(LeseErgebnis::Geschlossen),
            Err(_) => Ok(LeseErgebnis::KeineDaten),
        }
    }

    async fn frame_schreiben(&self, frame: Frame) -> Result<(), CallLegFehler> {
        if self.ist_aufgelegt() {
            return Err(CallLegFehler::Geschlossen);
        }
        match self.zur_gegenstelle.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!("Gegenstelle liest nicht mit, Frame verworfen");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(CallLegFehler::Geschlossen),
        }
    }

    async fn auflegen(&self) {
        self.aufgelegt.send_replace(true);
    }
}

impl LeitungsGegenstelle {
    /// Sendet einen Frame in Richtung Engine (false wenn die Leitung weg ist)
    pub async fn senden(&self, frame: Frame) -> bool {
        match &self.zur_engine {
            Some(tx) => tx.send(frame).await.is_ok(),
            None => false,
        }
    }

    /// Empfaengt den naechsten Frame von der Engine
    pub async fn empfangen(&mut self, timeout: Duration) -> Option<Frame> {
        tokio::time::timeout(timeout, self.von_engine.recv())
            .await
            .ok()
            .flatten()
    }

    /// Verwirft alle bereits empfangenen Frames
    pub fn verwerfen(&mut self) -> usize {
        let mut anzahl = 0;
        while self.von_engine.try_recv().is_ok() {
            anzahl += 1;
        }
        anzahl
    }

    /// Die Gegenstelle legt auf
    pub fn auflegen(&mut self) {
        self.zur_engine = None;
        self.von_engine.close();
    }

    /// True wenn die Engine aufgelegt hat
    pub fn wurde_aufgelegt(&self) -> bool {
        *self.aufgelegt.borrow()
    }

    /// Wartet bis die Engine auflegt; false bei Timeout
    pub async fn auflegen_abwarten(&mut self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.aufgelegt.wait_for(|aufgelegt| *aufgelegt))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_in_beide_richtungen() {
        let (leitung, mut gegenstelle) = KanalLeitung::paar(8);

        assert!(gegenstelle.senden(Frame::neu(vec![1i16; 4], 1)).await);
        match leitung.frame_lesen(Duration::from_millis(50)).await.unwrap() {
            LeseErgebnis::Frame(f) => assert_eq!(f.sequenz(), 1),
            andere => panic!("Frame erwartet: {andere:?}"),
        }

        leitung.frame_schreiben(Frame::stille(4, 2)).await.unwrap();
        let f = gegenstelle.empfangen(Duration::from_millis(50)).await.unwrap();
        assert_eq!(f.sequenz(), 2);
    }

    #[tokio::test]
    async fn keine_daten_nach_timeout() {
        let (leitung, _gegenstelle) = KanalLeitung::paar(8);
        let ergebnis = leitung.frame_lesen(Duration::from_millis(10)).await.unwrap();
        assert!(matches!(ergebnis, LeseErgebnis::KeineDaten));
    }

    #[tokio::test]
    async fn gegenstelle_legt_auf() {
        let (leitung, mut gegenstelle) = KanalLeitung::paar(8);
        gegenstelle.auflegen();

        let ergebnis = leitung.frame_lesen(Duration::from_millis(10)).await.unwrap();
        assert!(matches!(ergebnis, LeseErgebnis::Geschlossen));
        assert_eq!(
            leitung.frame_schreiben(Frame::stille(4, 1)).await,
            Err(CallLegFehler::Geschlossen)
        );
    }

    #[tokio::test]
    async fn engine_legt_auf() {
        let (leitung, mut gegenstelle) = KanalLeitung::paar(8);
        assert!(!gegenstelle.wurde_aufgelegt());
        leitung.auflegen().await;
        assert!(gegenstelle.auflegen_abwarten(Duration::from_millis(50)).await);
        assert!(matches!(
            leitung.frame_lesen(Duration::from_millis(10)).await.unwrap(),
            LeseErgebnis::Geschlossen
        ));
    }

    #[tokio::test]
    async fn volle_gegenstelle_blockiert_nicht() {
        let (leitung, mut gegenstelle) = KanalLeitung::paar(1);
        leitung.frame_schreiben(Frame::stille(4, 1)).await.unwrap();
        leitung.frame_schreiben(Frame::stille(4, 2)).await.unwrap();
        assert_eq!(gegenstelle.verwerfen(), 1);
    }
}
