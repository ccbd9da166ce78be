use super::{lookup_intervals, interval_ms, load_grid, PipelineError, Stage, StageContext, UtteranceTable};
use indicatif::ProgressBar;

pub const VOWEL_TIER: &str = "Vowel";

/// silence, vowel, silence
const VOWEL_INTERVALS: usize = 3;

const VOWEL_POSITION: usize = 2;

/// Fill `v1_start`, `v1_end` and `v1_duration_ms` from the middle interval
/// of each row's "Vowel" tier.
pub fn measure_vowel_duration(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    for row in table.rows_mut() {
        let grid = load_grid(row)?;
        let span = lookup_intervals(&grid, VOWEL_TIER, VOWEL_INTERVALS).and_then(|intervals| {
            let duration = interval_ms(intervals, VOWEL_TIER, VOWEL_POSITION)?;
            let v1 = &intervals[VOWEL_POSITION - 1];
            Ok((v1.xmin, v1.xmax, duration))
        });

        let m = &mut row.measures;
        match span {
            Ok((start, end, duration)) => {
                m.v1_start = Some(start);
                m.v1_end = Some(end);
                m.v1_duration_ms = Some(duration);
            }
            Err(kind) => {
                m.v1_start = None;
                m.v1_end = None;
                m.v1_duration_ms = None;
                row.working.v1_sound = None;
                ctx.report(Stage::VowelDuration, row, kind);
            }
        }
        pb.inc(1);
    }
    Ok(())
}
