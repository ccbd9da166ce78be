use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::{MissingPolicy, OnMissing, Stage};
use crate::scanner::FilePairing;

pub const DEFAULT_OUTPUT: &str = "acoustic_measures.csv";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{stage} requires {requires} to be enabled")]
    MissingPrerequisite { stage: Stage, requires: Stage },
    #[error("No input directory. Pass one as an argument or set input_dir in config.")]
    NoInputDir,
}

/// Application configuration loaded from TOML config file.
/// All fields have defaults; the config file is optional.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Root directory with one subdirectory per speaker.
    pub input_dir: Option<PathBuf>,
    /// Output CSV; merged with an existing file at the same path.
    pub output: PathBuf,
    /// CSV with `speaker` and `sex` columns.
    pub speaker_metadata: Option<PathBuf>,
    pub annotation_extension: String,
    pub audio_extension: String,
    pub measurements: MeasurementSelection,
    /// Per-stage reporting of recoverable defects.
    pub on_missing: BTreeMap<Stage, OnMissing>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            output: PathBuf::from(DEFAULT_OUTPUT),
            speaker_metadata: None,
            annotation_extension: crate::ANNOTATION_EXTENSION.to_string(),
            audio_extension: crate::AUDIO_EXTENSION.to_string(),
            measurements: MeasurementSelection::default(),
            on_missing: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/vowelscan/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => match Self::load_from(&path) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("{e}. Using defaults.");
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load an explicitly named config file; failures are errors.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// `explicit` if given, otherwise the default location.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => Ok(Self::load()),
        }
    }

    pub fn missing_policy(&self) -> MissingPolicy {
        MissingPolicy::new(self.on_missing.clone())
    }

    pub fn pairing(&self) -> FilePairing {
        FilePairing {
            annotation_extension: self.annotation_extension.clone(),
            audio_extension: self.audio_extension.clone(),
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Which measurements to run. Dependent measurements need their
/// prerequisite enabled as well; see [`MeasurementSelection::validate`].
#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct MeasurementSelection {
    pub vowel_duration: bool,
    pub formant_averages: bool,
    pub formant_dispersion: bool,
    pub rms: bool,
    pub spectral_tilt: bool,
    pub center_of_gravity: bool,
    pub word_duration: bool,
    pub relative_heights: bool,
    pub h1_h2: bool,
}

impl MeasurementSelection {
    pub fn all() -> Self {
        let mut s = Self::default();
        for stage in Stage::ALL {
            s.enable(stage);
        }
        s
    }

    fn flag(&mut self, stage: Stage) -> &mut bool {
        match stage {
            Stage::VowelDuration => &mut self.vowel_duration,
            Stage::FormantAverages => &mut self.formant_averages,
            Stage::FormantDispersion => &mut self.formant_dispersion,
            Stage::Rms => &mut self.rms,
            Stage::SpectralTilt => &mut self.spectral_tilt,
            Stage::CenterOfGravity => &mut self.center_of_gravity,
            Stage::WordDuration => &mut self.word_duration,
            Stage::RelativeHeights => &mut self.relative_heights,
            Stage::H1H2 => &mut self.h1_h2,
        }
    }

    pub fn enable(&mut self, stage: Stage) {
        *self.flag(stage) = true;
    }

    pub fn is_enabled(&self, stage: Stage) -> bool {
        match stage {
            Stage::VowelDuration => self.vowel_duration,
            Stage::FormantAverages => self.formant_averages,
            Stage::FormantDispersion => self.formant_dispersion,
            Stage::Rms => self.rms,
            Stage::SpectralTilt => self.spectral_tilt,
            Stage::CenterOfGravity => self.center_of_gravity,
            Stage::WordDuration => self.word_duration,
            Stage::RelativeHeights => self.relative_heights,
            Stage::H1H2 => self.h1_h2,
        }
    }

    /// Enable everything `other` enables.
    pub fn merge(&mut self, other: &MeasurementSelection) {
        for stage in other.stages() {
            self.enable(stage);
        }
    }

    /// Enabled stages in execution order.
    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL.into_iter().filter(|s| self.is_enabled(*s)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages().is_empty()
    }

    /// Formant dispersion needs formant averages. RMS, spectral tilt,
    /// centre of gravity and word duration need vowel duration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const PREREQUISITES: [(Stage, Stage); 5] = [
            (Stage::FormantDispersion, Stage::FormantAverages),
            (Stage::Rms, Stage::VowelDuration),
            (Stage::SpectralTilt, Stage::VowelDuration),
            (Stage::CenterOfGravity, Stage::VowelDuration),
            (Stage::WordDuration, Stage::VowelDuration),
        ];
        for (stage, requires) in PREREQUISITES {
            if self.is_enabled(stage) && !self.is_enabled(requires) {
                return Err(ConfigError::MissingPrerequisite { stage, requires });
            }
        }
        Ok(())
    }
}
