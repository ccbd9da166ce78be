//! Pitch-based measures: relative heights of the f0 targets and H1-H2.

use super::{
    load_grid, load_sound, lookup_points, measurement_error, v1_segment, PipelineError, Stage,
    StageContext, Utterance, UtteranceTable, WarningKind,
};
use crate::acoustics::{AcousticsError, Analyzer, HarmonicsParams, PitchTrack, Sound};
use indicatif::ProgressBar;

pub const F0_TIER: &str = "f0";
pub const PEAK_LABEL: &str = "H";
const LOW_END_LABEL: &str = "L%";

/// target, peak, low end
const F0_POINTS: usize = 3;
const TARGET_POSITION: usize = 1;
const LOW_END_POSITION: usize = 3;

pub const PITCH_FLOOR: f64 = 50.0;
pub const PITCH_CEILING: f64 = 500.0;

/// Adaptive range for H1-H2: floor from the 25th, ceiling from the 75th
/// percentile of the utterance pitch over the vowel.
const H1H2_FLOOR_FACTOR: f64 = 0.75;
const H1H2_CEILING_FACTOR: f64 = 2.5;

pub fn semitones(from: f64, to: f64) -> f64 {
    12.0 * (from / to).log2()
}

/// Excursions of the target and the "H" peak above the low end, in
/// semitones.
pub fn measure_relative_heights(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    const STAGE: Stage = Stage::RelativeHeights;

    for row in table.rows_mut() {
        pb.inc(1);
        row.measures.exc_target_low_end = None;
        row.measures.exc_peak_low_end = None;

        let grid = load_grid(row)?;
        let points = match lookup_points(&grid, F0_TIER, F0_POINTS) {
            Ok(points) => points,
            Err(kind) => {
                ctx.report(STAGE, row, kind);
                continue;
            }
        };
        let Some(peak) = points.iter().position(|p| p.mark.trim() == PEAK_LABEL) else {
            ctx.report_always(
                STAGE,
                row,
                WarningKind::LabelMissing {
                    tier: F0_TIER,
                    label: PEAK_LABEL,
                },
            );
            continue;
        };
        let low_end = &points[LOW_END_POSITION - 1];
        if low_end.mark.trim() != LOW_END_LABEL {
            log::debug!(
                "{}/{}: low end labelled {:?}, expected {LOW_END_LABEL:?}",
                row.speaker,
                row.utterance_id,
                low_end.mark
            );
        }
        let times = [points[TARGET_POSITION - 1].time, points[peak].time, low_end.time];

        let pitch = match row.working.pitch.take() {
            Some(p) => p,
            None => {
                let sound = load_sound(row, ctx.analyzer)?;
                ctx.analyzer
                    .pitch(&sound, PITCH_FLOOR, PITCH_CEILING)
                    .map_err(measurement_error(STAGE, row))?
            }
        };
        let values = times.map(|t| pitch.value_at_time(t));
        row.working.pitch = Some(pitch);

        let [Some(target_hz), Some(peak_hz), Some(low_hz)] = values else {
            for (time, value) in times.iter().zip(values) {
                if value.is_none() {
                    ctx.report_always(STAGE, row, WarningKind::PitchUndefined { time: *time });
                }
            }
            continue;
        };
        row.measures.exc_target_low_end = Some(semitones(target_hz, low_hz));
        row.measures.exc_peak_low_end = Some(semitones(peak_hz, low_hz));
    }
    Ok(())
}

/// Level difference between the first two harmonics over each row's V1
/// segment. Analysis failures leave the row empty instead of stopping the
/// run.
pub fn measure_h1_h2(
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
    pb: &ProgressBar,
) -> Result<(), PipelineError> {
    const STAGE: Stage = Stage::H1H2;

    for row in table.rows_mut() {
        pb.inc(1);
        row.measures.h1_h2 = None;
        let Some(span) = row.v1_span() else {
            ctx.report(STAGE, row, WarningKind::SpanMissing);
            continue;
        };

        match h1_h2_for_row(row, ctx.analyzer, span) {
            Ok(Some(value)) => row.measures.h1_h2 = Some(value),
            Ok(None) => ctx.report(STAGE, row, WarningKind::Undefined { measure: "h1_h2" }),
            Err(PipelineError::Measurement { source, .. }) => ctx.report(
                STAGE,
                row,
                WarningKind::ComputationFailed {
                    message: source.to_string(),
                },
            ),
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn h1_h2_for_row(
    row: &mut Utterance,
    analyzer: &dyn Analyzer,
    span: (f64, f64),
) -> Result<Option<f64>, PipelineError> {
    const STAGE: Stage = Stage::H1H2;

    let segment = v1_segment(STAGE, row, analyzer, span)?;
    let pitch = match row.working.pitch.take() {
        Some(p) => p,
        None => {
            let sound = load_sound(row, analyzer)?;
            analyzer
                .pitch(&sound, PITCH_FLOOR, PITCH_CEILING)
                .map_err(measurement_error(STAGE, row))?
        }
    };
    let result = harmonic_difference(analyzer, &pitch, &segment, span);
    row.working.pitch = Some(pitch);
    result.map_err(measurement_error(STAGE, row))
}

fn harmonic_difference(
    analyzer: &dyn Analyzer,
    utterance_pitch: &PitchTrack,
    segment: &Sound,
    (start, end): (f64, f64),
) -> Result<Option<f64>, AcousticsError> {
    let q25 = utterance_pitch
        .quantile(start, end, 0.25)
        .ok_or(AcousticsError::NoVoicedFrames)?;
    let q75 = utterance_pitch
        .quantile(start, end, 0.75)
        .ok_or(AcousticsError::NoVoicedFrames)?;
    let floor = H1H2_FLOOR_FACTOR * q25;
    let ceiling = H1H2_CEILING_FACTOR * q75;

    let segment_pitch = analyzer.pitch(segment, floor, ceiling)?;
    let ltas = analyzer.harmonics_ltas(segment, &segment_pitch, &HarmonicsParams::default())?;
    Ok(ltas
        .value_in_bin(1)
        .zip(ltas.value_in_bin(2))
        .map(|(h1, h2)| h1 - h2))
}
