//! Begrenzte Frame-Queue zwischen genau einem Erzeuger und einem Verbraucher
//!
//! Die Queue haelt hoechstens `kapazitaet` Frames. Ist sie voll, entscheidet
//! die `UeberlaufStrategie`, welcher Frame verworfen wird. Ueberlauf ist
//! normaler Betrieb und wird nur gezaehlt. `pop` auf eine leere Queue wartet
//! hoechstens bis zum Timeout und liefert dann `None`.
//!
//! ## Design-Entscheidungen
//! - parking_lot::Mutex um eine VecDeque: bei einem Erzeuger und einem
//!   Verbraucher ist der Lock praktisch nie umkaempft
//! - tokio::sync::Notify weckt einen wartenden Verbraucher; `notify_one`
//!   speichert ein Permit, daher geht kein Wecksignal verloren

use crate::frame::Frame;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Welcher Frame bei voller Queue verworfen wird
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UeberlaufStrategie {
    /// Der neue Frame wird verworfen (begrenzt die Latenz)
    #[default]
    NeuesteVerwerfen,
    /// Der aelteste Frame wird verdraengt, der neue eingereiht
    AeltesteVerwerfen,
}

/// Ergebnis eines `push`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushErgebnis {
    /// Frame wurde eingereiht (bei `AeltesteVerwerfen` ggf. unter Verdraengung)
    Eingereiht,
    /// Frame wurde verworfen
    Verworfen,
}

// ---------------------------------------------------------------------------
// FrameQueue
// ---------------------------------------------------------------------------

/// Begrenzte FIFO-Queue fuer Audio-Frames
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    kapazitaet: usize,
    strategie: UeberlaufStrategie,
    /// Verworfene Frames dieser Queue
    verworfen: AtomicU64,
    /// Optionaler engine-weiter Zaehler fuer verworfene Frames
    gesamt_verworfen: Option<Arc<AtomicU64>>,
    neuer_frame: Notify,
}

impl FrameQueue {
    /// Erstellt eine Queue; eine Kapazitaet von 0 wird auf 1 angehoben
    pub fn neu(kapazitaet: usize, strategie: UeberlaufStrategie) -> Self {
        let kapazitaet = kapazitaet.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(kapazitaet)),
            kapazitaet,
            strategie,
            verworfen: AtomicU64::new(0),
            gesamt_verworfen: None,
            neuer_frame: Notify::new(),
        }
    }

    /// Wie `neu`, zaehlt Verwerfungen zusaetzlich in `gesamt`
    pub fn mit_zaehler(
        kapazitaet: usize,
        strategie: UeberlaufStrategie,
        gesamt: Arc<AtomicU64>,
    ) -> Self {
        Self {
            gesamt_verworfen: Some(gesamt),
            ..Self::neu(kapazitaet, strategie)
        }
    }

    /// Reiht einen Frame ein (blockiert nie)
    pub fn push(&self, frame: Frame) -> PushErgebnis {
        let ergebnis = {
            let mut frames = self.frames.lock();
            if frames.len() < self.kapazitaet {
                frames.push_back(frame);
                PushErgebnis::Eingereiht
            } else {
                match self.strategie {
                    UeberlaufStrategie::NeuesteVerwerfen => PushErgebnis::Verworfen,
                    UeberlaufStrategie::AeltesteVerwerfen => {
                        frames.pop_front();
                        frames.push_back(frame);
                        self.verwerfung_zaehlen();
                        PushErgebnis::Eingereiht
                    }
                }
            }
        };

        match ergebnis {
            PushErgebnis::Eingereiht => self.neuer_frame.notify_one(),
            PushErgebnis::Verworfen => {
                self.verwerfung_zaehlen();
                tracing::trace!(kapazitaet = self.kapazitaet, "Queue voll, Frame verworfen");
            }
        }
        ergebnis
    }

    /// Entnimmt den aeltesten Frame ohne zu warten
    pub fn try_pop(&self) -> Option<Frame> {
        self.frames.lock().pop_front()
    }

    /// Entnimmt den aeltesten Frame, wartet hoechstens `timeout`
    pub async fn pop(&self, timeout: Duration) -> Option<Frame> {
        let frist = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }
            if tokio::time::timeout_at(frist, self.neuer_frame.notified())
                .await
                .is_err()
            {
                return self.try_pop();
            }
        }
    }

    /// Verwirft alle gepufferten Frames und gibt deren Anzahl zurueck
    pub fn leeren(&self) -> usize {
        let mut frames = self.frames.lock();
        let anzahl = frames.len();
        frames.clear();
        anzahl
    }

    /// Aktueller Fuellstand
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }

    pub fn strategie(&self) -> UeberlaufStrategie {
        self.strategie
    }

    /// Anzahl der in dieser Queue verworfenen Frames
    pub fn verworfen(&self) -> u64 {
        self.verworfen.load(Ordering::Relaxed)
    }

    fn verwerfung_zaehlen(&self) {
        self.verworfen.fetch_add(1, Ordering::Relaxed);
        if let Some(gesamt) = &self.gesamt_verworfen {
            gesamt.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("fuellstand", &self.len())
            .field("kapazitaet", &self.kapazitaet)
            .field("strategie", &self.strategie)
            .field("verworfen", &self.verworfen())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
