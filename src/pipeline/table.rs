use super::{PipelineError, Stage};
use crate::acoustics::{PitchTrack, Sound};
use crate::scanner::UtteranceFiles;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "m")]
    Male,
    #[serde(rename = "f")]
    Female,
}

impl Sex {
    /// Accepts `m`/`f` and the spelled-out words, case-insensitively.
    pub fn parse(s: &str) -> Option<Sex> {
        match s.trim().to_lowercase().as_str() {
            "m" | "male" => Some(Sex::Male),
            "f" | "female" => Some(Sex::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "m",
            Sex::Female => "f",
        }
    }
}

/// Derived scalars for one utterance. Durations are in milliseconds,
/// frequencies and dispersions in Hz, excursions in semitones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Measures {
    pub v1_start: Option<f64>,
    pub v1_end: Option<f64>,
    pub v1_duration_ms: Option<f64>,
    pub f1: Option<f64>,
    pub f2: Option<f64>,
    pub f3: Option<f64>,
    pub f1_f2_dispersion: Option<f64>,
    pub f2_f3_dispersion: Option<f64>,
    pub v1_rms: Option<f64>,
    pub v1_tilt: Option<f64>,
    pub v1_cog: Option<f64>,
    pub tool_duration_ms: Option<f64>,
    pub target_duration_ms: Option<f64>,
    pub ratio_word_duration: Option<f64>,
    pub exc_target_low_end: Option<f64>,
    pub exc_peak_low_end: Option<f64>,
    pub h1_h2: Option<f64>,
}

/// Intermediate objects shared between stages; never written out.
#[derive(Debug, Clone, Default)]
pub(crate) struct Working {
    pub v1_sound: Option<Sound>,
    pub pitch: Option<PitchTrack>,
}

#[derive(Debug, Clone)]
pub struct Utterance {
    pub speaker: String,
    pub utterance_id: String,
    pub annotation_path: PathBuf,
    pub audio_path: PathBuf,
    pub sex: Option<Sex>,
    pub measures: Measures,
    pub(crate) working: Working,
}

impl Utterance {
    pub fn new(files: UtteranceFiles) -> Self {
        Self {
            speaker: files.speaker,
            utterance_id: files.utterance_id,
            annotation_path: files.annotation_path,
            audio_path: files.audio_path,
            sex: None,
            measures: Measures::default(),
            working: Working::default(),
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.speaker, &self.utterance_id)
    }

    /// The measured vowel interval, when the vowel stage found one.
    pub fn v1_span(&self) -> Option<(f64, f64)> {
        Some((self.measures.v1_start?, self.measures.v1_end?))
    }
}

/// All utterances of a run plus the record of which stages have filled
/// their columns.
#[derive(Debug, Clone, Default)]
pub struct UtteranceTable {
    rows: Vec<Utterance>,
    completed: BTreeSet<Stage>,
    has_metadata: bool,
}

impl UtteranceTable {
    pub fn from_files(files: Vec<UtteranceFiles>) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(files.len());
        for f in files {
            if !seen.insert((f.speaker.clone(), f.utterance_id.clone())) {
                return Err(PipelineError::DuplicateKey {
                    speaker: f.speaker,
                    utterance_id: f.utterance_id,
                });
            }
            rows.push(Utterance::new(f));
        }
        Ok(Self {
            rows,
            ..Self::default()
        })
    }

    pub fn rows(&self) -> &[Utterance] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Utterance] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_run(&self, stage: Stage) -> bool {
        self.completed.contains(&stage)
    }

    pub fn completed(&self) -> impl Iterator<Item = Stage> + '_ {
        self.completed.iter().copied()
    }

    pub(crate) fn mark_complete(&mut self, stage: Stage) {
        self.completed.insert(stage);
    }

    /// Stage-entry schema check: every column `stage` reads must exist.
    pub fn check_requirements(&self, stage: Stage) -> Result<(), PipelineError> {
        match stage.requires().iter().find(|r| !self.has_run(**r)) {
            Some(&missing) => Err(PipelineError::MissingColumns { stage, missing }),
            None => Ok(()),
        }
    }

    /// Left join of per-speaker sex onto every row.
    pub fn attach_sex(&mut self, sexes: &HashMap<String, Option<Sex>>) {
        for row in &mut self.rows {
            row.sex = sexes.get(&row.speaker).copied().flatten();
        }
        self.has_metadata = true;
    }

    pub fn has_metadata(&self) -> bool {
        self.has_metadata
    }

    /// Drop sounds and pitch tracks held between stages.
    pub fn clear_working(&mut self) {
        for row in &mut self.rows {
            row.working = Working::default();
        }
    }
}
