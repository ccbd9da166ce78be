use super::{interval_ms, load_grid, lookup_intervals, PipelineError, Stage, StageContext, UtteranceTable, WarningKind};
use indicatif::ProgressBar;

pub const WORD_TIER: &str = "Word";

const WORD_INTERVALS: usize = 5;
const TOOL_POSITION: usize = 2;
const TARGET_POSITION: usize = 4;

/// Tool-word and target-word durations from the "Word" tier, and their ratio.
pub fn measure_word_durations(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    const STAGE: Stage = Stage::WordDuration;

    for row in table.rows_mut() {
        pb.inc(1);
        let m = &mut row.measures;
        m.tool_duration_ms = None;
        m.target_duration_ms = None;
        m.ratio_word_duration = None;

        let grid = load_grid(row)?;
        let durations = lookup_intervals(&grid, WORD_TIER, WORD_INTERVALS).and_then(|intervals| {
            Ok((
                interval_ms(intervals, WORD_TIER, TOOL_POSITION)?,
                interval_ms(intervals, WORD_TIER, TARGET_POSITION)?,
            ))
        });
        let (tool, target) = match durations {
            Ok(d) => d,
            Err(kind) => {
                ctx.report(STAGE, row, kind);
                continue;
            }
        };

        row.measures.tool_duration_ms = Some(tool);
        row.measures.target_duration_ms = Some(target);
        if target > 0.0 {
            row.measures.ratio_word_duration = Some(tool / target);
        } else {
            ctx.report(
                STAGE,
                row,
                WarningKind::Undefined {
                    measure: "ratio_word_duration",
                },
            );
        }
    }
    Ok(())
}
