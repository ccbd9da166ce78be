use super::{
    measurement_error, v1_segment, PipelineError, Sex, Stage, StageContext, UtteranceTable, WarningKind,
};
use indicatif::ProgressBar;

pub const MALE_MAX_FORMANT: f64 = 4500.0;
pub const FEMALE_MAX_FORMANT: f64 = 5500.0;

/// Formant ceiling for a speaker; unknown sex uses the female ceiling.
pub fn max_formant_for(sex: Option<Sex>) -> f64 {
    match sex {
        Some(Sex::Male) => MALE_MAX_FORMANT,
        Some(Sex::Female) | None => FEMALE_MAX_FORMANT,
    }
}

/// Mean F1, F2 and F3 over each row's V1 span.
pub fn measure_formants(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    const STAGE: Stage = Stage::FormantAverages;

    for row in table.rows_mut() {
        pb.inc(1);
        row.measures.f1 = None;
        row.measures.f2 = None;
        row.measures.f3 = None;

        let Some((start, end)) = row.v1_span() else {
            ctx.report(STAGE, row, WarningKind::SpanMissing);
            continue;
        };
        let segment = v1_segment(STAGE, row, ctx.analyzer, (start, end))?;
        let max_formant = max_formant_for(row.sex);
        let track = ctx
            .analyzer
            .formants(&segment, max_formant)
            .map_err(measurement_error(STAGE, row))?;
        log::trace!(
            "{}/{}: {} formant frames, ceiling {max_formant} Hz",
            row.speaker,
            row.utterance_id,
            track.frames().len()
        );

        let means = [1, 2, 3].map(|n| track.mean(n, start, end));
        for (name, value) in ["f1", "f2", "f3"].into_iter().zip(means) {
            if value.is_none() {
                ctx.report(STAGE, row, WarningKind::Undefined { measure: name });
            }
        }
        let [f1, f2, f3] = means;
        row.measures.f1 = f1;
        row.measures.f2 = f2;
        row.measures.f3 = f3;
    }
    Ok(())
}
