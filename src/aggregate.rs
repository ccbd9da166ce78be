//! Per-speaker aggregates broadcast back onto every row of the speaker.

use crate::pipeline::{Stage, StageContext, UtteranceTable, WarningKind};
use std::collections::BTreeMap;

/// Formant dispersion over a speaker's complete (f1, f2, f3) triples.
///
/// Returns `(Σ(f2 - f1), Σ(f3 - f2))` divided by `n - 1`, or `None` with
/// fewer than two triples.
pub fn dispersion(triples: &[(f64, f64, f64)]) -> Option<(f64, f64)> {
    let n = triples.len();
    if n < 2 {
        return None;
    }
    let divisor = (n - 1) as f64;
    let f1_f2: f64 = triples.iter().map(|(f1, f2, _)| f2 - f1).sum();
    let f2_f3: f64 = triples.iter().map(|(_, f2, f3)| f3 - f2).sum();
    Some((f1_f2 / divisor, f2_f3 / divisor))
}

/// Fill `f1_f2_dispersion` and `f2_f3_dispersion` for every speaker.
pub fn formant_dispersion(table: &mut UtteranceTable, ctx: &mut StageContext<'_>) {
    const STAGE: Stage = Stage::FormantDispersion;

    let mut by_speaker: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        by_speaker.entry(row.speaker.clone()).or_default().push(i);
    }

    for (speaker, indices) in by_speaker {
        let rows: Vec<_> = indices.iter().map(|&i| &table.rows()[i].measures).collect();
        let count = |get: fn(&crate::pipeline::Measures) -> Option<f64>| {
            rows.iter().filter(|m| get(m).is_some()).count()
        };
        let (n1, n2, n3) = (count(|m| m.f1), count(|m| m.f2), count(|m| m.f3));
        if n1 != n2 || n2 != n3 {
            ctx.report_speaker(
                STAGE,
                &speaker,
                WarningKind::UnequalFormantCounts {
                    f1: n1,
                    f2: n2,
                    f3: n3,
                },
            );
        }

        let triples: Vec<(f64, f64, f64)> = rows
            .iter()
            .filter_map(|m| Some((m.f1?, m.f2?, m.f3?)))
            .collect();
        if triples.len() < rows.len() {
            ctx.report_speaker(
                STAGE,
                &speaker,
                WarningKind::IncompleteFormants {
                    utterances: rows.len(),
                    triples: triples.len(),
                },
            );
        }

        let value = dispersion(&triples);
        if value.is_none() {
            ctx.report_speaker(
                STAGE,
                &speaker,
                WarningKind::TooFewFormantTriples {
                    triples: triples.len(),
                },
            );
        }
        log::debug!("{speaker}: formant dispersion {value:?} from {} triples", triples.len());

        for &i in &indices {
            let m = &mut table.rows_mut()[i].measures;
            m.f1_f2_dispersion = value.map(|(d, _)| d);
            m.f2_f3_dispersion = value.map(|(_, d)| d);
        }
    }
}
