pub mod energy;
pub mod events;
pub mod formants;
pub mod pitch;
pub mod spectral;
pub mod table;
pub mod vowel;
pub mod words;

pub use events::{CollectingSink, EventSink, LogSink, MissingPolicy, OnMissing, Warning, WarningKind};
pub use table::{Measures, Sex, Utterance, UtteranceTable};

use crate::acoustics::{AcousticsError, Analyzer, Sound};
use crate::textgrid::{Interval, Point, TextGrid, TextGridError};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The measurement stages, declared in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    VowelDuration,
    FormantAverages,
    FormantDispersion,
    Rms,
    SpectralTilt,
    CenterOfGravity,
    WordDuration,
    RelativeHeights,
    H1H2,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::VowelDuration,
        Stage::FormantAverages,
        Stage::FormantDispersion,
        Stage::Rms,
        Stage::SpectralTilt,
        Stage::CenterOfGravity,
        Stage::WordDuration,
        Stage::RelativeHeights,
        Stage::H1H2,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::VowelDuration => "vowel_duration",
            Stage::FormantAverages => "formant_averages",
            Stage::FormantDispersion => "formant_dispersion",
            Stage::Rms => "rms",
            Stage::SpectralTilt => "spectral_tilt",
            Stage::CenterOfGravity => "center_of_gravity",
            Stage::WordDuration => "word_duration",
            Stage::RelativeHeights => "relative_heights",
            Stage::H1H2 => "h1_h2",
        }
    }

    /// Stages whose columns this stage reads.
    pub fn requires(&self) -> &'static [Stage] {
        match self {
            Stage::FormantAverages
            | Stage::Rms
            | Stage::SpectralTilt
            | Stage::CenterOfGravity
            | Stage::H1H2 => &[Stage::VowelDuration],
            Stage::FormantDispersion => &[Stage::FormantAverages],
            Stage::VowelDuration | Stage::WordDuration | Stage::RelativeHeights => &[],
        }
    }

    /// Output columns, in output order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Stage::VowelDuration => &["v1_start", "v1_end", "v1_duration_ms"],
            Stage::FormantAverages => &["f1", "f2", "f3"],
            Stage::FormantDispersion => &["f1_f2_dispersion", "f2_f3_dispersion"],
            Stage::Rms => &["v1_rms"],
            Stage::SpectralTilt => &["v1_tilt"],
            Stage::CenterOfGravity => &["v1_cog"],
            Stage::WordDuration => &["tool_duration_ms", "target_duration_ms", "ratio_word_duration"],
            Stage::RelativeHeights => &["exc_target_low_end", "exc_peak_low_end"],
            Stage::H1H2 => &["h1_h2"],
        }
    }

    /// Values of [`Stage::columns`] for one row.
    pub fn values(&self, m: &Measures) -> Vec<Option<f64>> {
        match self {
            Stage::VowelDuration => vec![m.v1_start, m.v1_end, m.v1_duration_ms],
            Stage::FormantAverages => vec![m.f1, m.f2, m.f3],
            Stage::FormantDispersion => vec![m.f1_f2_dispersion, m.f2_f3_dispersion],
            Stage::Rms => vec![m.v1_rms],
            Stage::SpectralTilt => vec![m.v1_tilt],
            Stage::CenterOfGravity => vec![m.v1_cog],
            Stage::WordDuration => vec![
                m.tool_duration_ms,
                m.target_duration_ms,
                m.ratio_word_duration,
            ],
            Stage::RelativeHeights => vec![m.exc_target_low_end, m.exc_peak_low_end],
            Stage::H1H2 => vec![m.h1_h2],
        }
    }

    pub fn default_on_missing(&self) -> OnMissing {
        match self {
            Stage::RelativeHeights | Stage::H1H2 => OnMissing::Silent,
            _ => OnMissing::Warn,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{stage} needs the {missing} columns, which have not been computed")]
    MissingColumns { stage: Stage, missing: Stage },
    #[error("Duplicate utterance {speaker}/{utterance_id}")]
    DuplicateKey {
        speaker: String,
        utterance_id: String,
    },
    #[error("Failed to read annotation {path}: {source}")]
    Annotation {
        path: PathBuf,
        #[source]
        source: TextGridError,
    },
    #[error("Failed to load audio {path}: {source}")]
    Audio {
        path: PathBuf,
        #[source]
        source: AcousticsError,
    },
    #[error("{stage} failed for {speaker}/{utterance_id}: {source}")]
    Measurement {
        stage: Stage,
        speaker: String,
        utterance_id: String,
        #[source]
        source: AcousticsError,
    },
}

/// Everything a stage needs besides the table itself.
pub struct StageContext<'a> {
    pub analyzer: &'a dyn Analyzer,
    pub sink: &'a mut dyn EventSink,
    pub policy: &'a MissingPolicy,
    pub show_progress: bool,
}

impl<'a> StageContext<'a> {
    pub fn new(analyzer: &'a dyn Analyzer, sink: &'a mut dyn EventSink, policy: &'a MissingPolicy) -> Self {
        Self {
            analyzer,
            sink,
            policy,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Report a per-row defect according to the stage's policy. A missing
    /// tier is always reported.
    pub fn report(&mut self, stage: Stage, row: &Utterance, kind: WarningKind) {
        let always = matches!(kind, WarningKind::TierMissing { .. });
        if always || self.policy.for_stage(stage) == OnMissing::Warn {
            self.report_always(stage, row, kind);
        } else {
            log::debug!(
                "[{stage}] {}/{}: {kind} (not reported)",
                row.speaker,
                row.utterance_id
            );
        }
    }

    pub fn report_always(&mut self, stage: Stage, row: &Utterance, kind: WarningKind) {
        self.sink.warn(Warning {
            stage,
            speaker: row.speaker.clone(),
            utterance_id: Some(row.utterance_id.clone()),
            kind,
        });
    }

    /// Report a defect that belongs to a speaker rather than one utterance.
    pub fn report_speaker(&mut self, stage: Stage, speaker: &str, kind: WarningKind) {
        if self.policy.for_stage(stage) == OnMissing::Warn {
            self.sink.warn(Warning {
                stage,
                speaker: speaker.to_string(),
                utterance_id: None,
                kind,
            });
        } else {
            log::debug!("[{stage}] {speaker}: {kind} (not reported)");
        }
    }

    fn progress(&self, stage: Stage, len: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_message(stage.name());
        pb
    }
}

/// Run one stage over every row. Fails before touching any row if the
/// stage's input columns are absent.
pub fn run_stage(
    stage: Stage,
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
) -> Result<(), PipelineError> {
    table.check_requirements(stage)?;
    log::info!("Running {stage} over {} utterances", table.len());

    let pb = ctx.progress(stage, table.len());
    match stage {
        Stage::VowelDuration => vowel::measure_vowel_duration(table, ctx, &pb)?,
        Stage::FormantAverages => formants::measure_formants(table, ctx, &pb)?,
        Stage::FormantDispersion => crate::aggregate::formant_dispersion(table, ctx),
        Stage::Rms => energy::measure_rms(table, ctx, &pb)?,
        Stage::SpectralTilt => spectral::measure_spectral_tilt(table, ctx, &pb)?,
        Stage::CenterOfGravity => spectral::measure_center_of_gravity(table, ctx, &pb)?,
        Stage::WordDuration => words::measure_word_durations(table, ctx, &pb)?,
        Stage::RelativeHeights => pitch::measure_relative_heights(table, ctx, &pb)?,
        Stage::H1H2 => pitch::measure_h1_h2(table, ctx, &pb)?,
    }
    pb.finish_and_clear();

    table.mark_complete(stage);
    Ok(())
}

/// Check that `stages` can run in order on `table`, without running them.
pub fn check_plan(stages: &[Stage], table: &UtteranceTable) -> Result<(), PipelineError> {
    let mut available: Vec<Stage> = table.completed().collect();
    for &stage in stages {
        if let Some(&missing) = stage.requires().iter().find(|r| !available.contains(r)) {
            return Err(PipelineError::MissingColumns { stage, missing });
        }
        available.push(stage);
    }
    Ok(())
}

/// Run the selected stages in execution order. The whole plan is checked
/// before the first row is processed.
pub fn run_pipeline(
    stages: &[Stage],
    table: &mut UtteranceTable,
    ctx: &mut StageContext<'_>,
) -> Result<(), PipelineError> {
    let mut ordered = stages.to_vec();
    ordered.sort();
    ordered.dedup();
    check_plan(&ordered, table)?;

    for stage in ordered {
        run_stage(stage, table, ctx)?;
    }
    table.clear_working();
    Ok(())
}

fn load_grid(row: &Utterance) -> Result<TextGrid, PipelineError> {
    TextGrid::from_file(&row.annotation_path).map_err(|source| PipelineError::Annotation {
        path: row.annotation_path.clone(),
        source,
    })
}

fn load_sound(row: &Utterance, analyzer: &dyn Analyzer) -> Result<Sound, PipelineError> {
    analyzer
        .load_sound(&row.audio_path)
        .map_err(|source| PipelineError::Audio {
            path: row.audio_path.clone(),
            source,
        })
}

fn measurement_error(stage: Stage, row: &Utterance) -> impl FnOnce(AcousticsError) -> PipelineError + '_ {
    move |source| PipelineError::Measurement {
        stage,
        speaker: row.speaker.clone(),
        utterance_id: row.utterance_id.clone(),
        source,
    }
}

/// The row's V1 segment, extracted once and kept for later stages.
fn v1_segment(
    stage: Stage,
    row: &mut Utterance,
    analyzer: &dyn Analyzer,
    (start, end): (f64, f64),
) -> Result<Sound, PipelineError> {
    if let Some(segment) = &row.working.v1_sound {
        return Ok(segment.clone());
    }
    let sound = load_sound(row, analyzer)?;
    let segment = sound
        .extract_part(start, end)
        .map_err(measurement_error(stage, row))?;
    row.working.v1_sound = Some(segment.clone());
    Ok(segment)
}

fn log_duplicates(grid: &TextGrid, name: &str) {
    let count = grid.tiers_named(name).count();
    if count > 1 {
        log::debug!("{count} tiers named \"{name}\"; using the last");
    }
}

/// The intervals of tier `name`, provided it is an interval tier with
/// exactly `expected` intervals.
fn lookup_intervals<'g>(
    grid: &'g TextGrid,
    name: &'static str,
    expected: usize,
) -> Result<&'g [Interval], WarningKind> {
    log_duplicates(grid, name);
    let tier = grid
        .find_tier(name)
        .ok_or(WarningKind::TierMissing { tier: name })?;
    let intervals = tier.intervals().ok_or(WarningKind::WrongTierClass {
        tier: name,
        expected: "IntervalTier",
    })?;
    if intervals.len() != expected {
        return Err(WarningKind::ItemCount {
            tier: name,
            expected,
            found: intervals.len(),
        });
    }
    Ok(intervals)
}

/// The points of tier `name`, provided it is a point tier with exactly
/// `expected` points.
fn lookup_points<'g>(
    grid: &'g TextGrid,
    name: &'static str,
    expected: usize,
) -> Result<&'g [Point], WarningKind> {
    log_duplicates(grid, name);
    let tier = grid
        .find_tier(name)
        .ok_or(WarningKind::TierMissing { tier: name })?;
    let points = tier.points().ok_or(WarningKind::WrongTierClass {
        tier: name,
        expected: "TextTier",
    })?;
    if points.len() != expected {
        return Err(WarningKind::ItemCount {
            tier: name,
            expected,
            found: points.len(),
        });
    }
    Ok(points)
}

/// Duration in milliseconds of the 1-based interval `position`.
fn interval_ms(intervals: &[Interval], tier: &'static str, position: usize) -> Result<f64, WarningKind> {
    let iv = &intervals[position - 1];
    if iv.xmax < iv.xmin {
        return Err(WarningKind::InvalidInterval { tier, position });
    }
    Ok(iv.duration() * 1000.0)
}
