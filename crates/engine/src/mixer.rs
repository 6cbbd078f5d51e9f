//! Summenmischung mit Selbstausschluss
//!
//! Jedes Mitglied hoert die Summe aller aktiven Sprecher ausser sich selbst.
//! Summiert wird in i32, danach wird auf den i16-Bereich gesaettigt (nicht
//! umgebrochen).
//!
//! Statt fuer N Mitglieder N Summen zu bilden, wird einmal die Gesamtsumme
//! gebildet und fuer jeden aktiven Sprecher sein eigener Beitrag abgezogen.
//! Alle Nicht-Sprecher hoeren dasselbe Ergebnis und teilen sich einen Puffer.

use std::sync::Arc;

/// Beitrag eines Mitglieds zu einem Tick
#[derive(Debug, Clone, Copy)]
pub struct Beitrag<'a> {
    /// Samples des Mitglieds (None = Stille)
    pub samples: Option<&'a [i16]>,
    /// Von der VAD als aktiv eingestuft
    pub aktiv: bool,
}

impl Beitrag<'_> {
    fn sprecher_samples(&self) -> Option<&[i16]> {
        if self.aktiv {
            self.samples
        } else {
            None
        }
    }
}

/// Mischt einen Tick
///
/// Gibt fuer jeden Beitrag (gleiche Reihenfolge) den Ausgabepuffer zurueck.
/// `stille` wird unveraendert geteilt, wenn ein Mitglied niemanden hoert.
pub fn mischen(beitraege: &[Beitrag<'_>], laenge: usize, stille: &Arc<[i16]>) -> Vec<Arc<[i16]>> {
    let sprecher: Vec<&[i16]> = beitraege.iter().filter_map(|b| b.sprecher_samples()).collect();

    match sprecher.len() {
        0 => vec![Arc::clone(stille); beitraege.len()],
        1 => {
            // Der einzige Sprecher hoert Stille, alle anderen hoeren ihn unveraendert
            let einzeln: Arc<[i16]> = auf_laenge(sprecher[0], laenge);
            beitraege
                .iter()
                .map(|b| {
                    if b.sprecher_samples().is_some() {
                        Arc::clone(stille)
                    } else {
                        Arc::clone(&einzeln)
                    }
                })
                .collect()
        }
        _ => {
            let summe = summe_bilden(&sprecher, laenge);
            let fuer_zuhoerer: Arc<[i16]> = saettigen(&summe).into();
            beitraege
                .iter()
                .map(|b| match b.sprecher_samples() {
                    Some(eigene) => ohne_eigenen_beitrag(&summe, eigene).into(),
                    None => Arc::clone(&fuer_zuhoerer),
                })
                .collect()
        }
    }
}

/// Summiert alle Puffer in i32; kuerzere Puffer werden mit Stille aufgefuellt
pub fn summe_bilden(puffer: &[&[i16]], laenge: usize) -> Vec<i32> {
    let mut summe = vec![0i32; laenge];
    for samples in puffer {
        for (ziel, &s) in summe.iter_mut().zip(samples.iter()) {
            *ziel += s as i32;
        }
    }
    summe
}

/// Saettigt eine i32-Summe auf den i16-Bereich
pub fn saettigen(summe: &[i32]) -> Vec<i16> {
    summe
        .iter()
        .map(|&s| s.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect()
}

fn ohne_eigenen_beitrag(summe: &[i32], eigene: &[i16]) -> Vec<i16> {
    summe
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let eigen = eigene.get(i).copied().unwrap_or(0) as i32;
            (s - eigen).clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect()
}

fn auf_laenge(samples: &[i16], laenge: usize) -> Arc<[i16]> {
    let mut puffer = vec![0i16; laenge];
    let n = laenge.min(samples.len());
    puffer[..n].copy_from_slice(&samples[..n]);
    puffer.into()
}
