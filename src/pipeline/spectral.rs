use super::{
    measurement_error, v1_segment, PipelineError, Stage, StageContext, UtteranceTable, WarningKind,
};
use indicatif::ProgressBar;

/// Exponent on spectral magnitudes when weighting the centre of gravity.
const COG_POWER: f64 = 2.0;

/// Mean first mel-cepstral coefficient of each row's V1 segment.
pub fn measure_spectral_tilt(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    const STAGE: Stage = Stage::SpectralTilt;

    for row in table.rows_mut() {
        pb.inc(1);
        row.measures.v1_tilt = None;
        let Some(span) = row.v1_span() else {
            ctx.report(STAGE, row, WarningKind::SpanMissing);
            continue;
        };
        let segment = v1_segment(STAGE, row, ctx.analyzer, span)?;
        let cepstrum = ctx
            .analyzer
            .mel_cepstrum(&segment, 1)
            .map_err(measurement_error(STAGE, row))?;
        match cepstrum.mean_coefficient(1) {
            Some(c1) => row.measures.v1_tilt = Some(c1),
            None => ctx.report(STAGE, row, WarningKind::Undefined { measure: "v1_tilt" }),
        }
    }
    Ok(())
}

/// Spectral centre of gravity of each row's V1 segment.
pub fn measure_center_of_gravity(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    const STAGE: Stage = Stage::CenterOfGravity;

    for row in table.rows_mut() {
        pb.inc(1);
        row.measures.v1_cog = None;
        let Some(span) = row.v1_span() else {
            ctx.report(STAGE, row, WarningKind::SpanMissing);
            continue;
        };
        let segment = v1_segment(STAGE, row, ctx.analyzer, span)?;
        let spectrum = ctx
            .analyzer
            .spectrum(&segment)
            .map_err(measurement_error(STAGE, row))?;
        match spectrum.centre_of_gravity(COG_POWER) {
            Some(cog) => row.measures.v1_cog = Some(cog),
            None => ctx.report(STAGE, row, WarningKind::Undefined { measure: "v1_cog" }),
        }
    }
    Ok(())
}
