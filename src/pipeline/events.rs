//! Data-quality warnings raised while measuring.
//!
//! A stage that cannot compute a value for one row records null and reports a
//! [`Warning`] to the run's [`EventSink`]. Whether a class of defect is
//! reported or only logged at debug level is governed by [`MissingPolicy`].

use super::Stage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum WarningKind {
    TierMissing {
        tier: &'static str,
    },
    WrongTierClass {
        tier: &'static str,
        expected: &'static str,
    },
    ItemCount {
        tier: &'static str,
        expected: usize,
        found: usize,
    },
    InvalidInterval {
        tier: &'static str,
        position: usize,
    },
    LabelMissing {
        tier: &'static str,
        label: &'static str,
    },
    SpanMissing,
    Undefined {
        measure: &'static str,
    },
    PitchUndefined {
        time: f64,
    },
    UnequalFormantCounts {
        f1: usize,
        f2: usize,
        f3: usize,
    },
    IncompleteFormants {
        utterances: usize,
        triples: usize,
    },
    TooFewFormantTriples {
        triples: usize,
    },
    ComputationFailed {
        message: String,
    },
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TierMissing { tier } => write!(f, "no tier named \"{tier}\""),
            Self::WrongTierClass { tier, expected } => {
                write!(f, "tier \"{tier}\" is not an {expected}")
            }
            Self::ItemCount {
                tier,
                expected,
                found,
            } => write!(f, "tier \"{tier}\" has {found} items, expected {expected}"),
            Self::InvalidInterval { tier, position } => {
                write!(f, "interval {position} of tier \"{tier}\" ends before it starts")
            }
            Self::LabelMissing { tier, label } => {
                write!(f, "no item labelled \"{label}\" on tier \"{tier}\"")
            }
            Self::SpanMissing => write!(f, "no vowel span"),
            Self::Undefined { measure } => write!(f, "{measure} is undefined"),
            Self::PitchUndefined { time } => write!(f, "pitch undefined at {time:.3}s"),
            Self::UnequalFormantCounts { f1, f2, f3 } => {
                write!(f, "unequal formant counts (f1={f1}, f2={f2}, f3={f3})")
            }
            Self::IncompleteFormants {
                utterances,
                triples,
            } => write!(
                f,
                "only {triples} of {utterances} utterances have all three formants"
            ),
            Self::TooFewFormantTriples { triples } => {
                write!(f, "{triples} complete formant triples; dispersion needs at least 2")
            }
            Self::ComputationFailed { message } => write!(f, "computation failed: {message}"),
        }
    }
}

/// A recoverable defect tied to a speaker and, usually, one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub stage: Stage,
    pub speaker: String,
    pub utterance_id: Option<String>,
    pub kind: WarningKind,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.utterance_id {
            Some(id) => write!(f, "[{}] {}/{}: {}", self.stage, self.speaker, id, self.kind),
            None => write!(f, "[{}] {}: {}", self.stage, self.speaker, self.kind),
        }
    }
}

pub trait EventSink {
    fn warn(&mut self, warning: Warning);

    fn warning_count(&self) -> usize;
}

/// Forwards warnings to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink {
    count: usize,
}

impl EventSink for LogSink {
    fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.count += 1;
    }

    fn warning_count(&self) -> usize {
        self.count
    }
}

/// Keeps every warning in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub warnings: Vec<Warning>,
}

impl CollectingSink {
    pub fn for_stage(&self, stage: Stage) -> Vec<&Warning> {
        self.warnings.iter().filter(|w| w.stage == stage).collect()
    }
}

impl EventSink for CollectingSink {
    fn warn(&mut self, warning: Warning) {
        log::debug!("{warning}");
        self.warnings.push(warning);
    }

    fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnMissing {
    #[default]
    Warn,
    Silent,
}

/// Per-stage reporting of recoverable defects. Stages without an override
/// use [`Stage::default_on_missing`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingPolicy {
    overrides: BTreeMap<Stage, OnMissing>,
}

impl MissingPolicy {
    pub fn new(overrides: BTreeMap<Stage, OnMissing>) -> Self {
        Self { overrides }
    }

    pub fn set(&mut self, stage: Stage, on_missing: OnMissing) {
        self.overrides.insert(stage, on_missing);
    }

    pub fn for_stage(&self, stage: Stage) -> OnMissing {
        self.overrides
            .get(&stage)
            .copied()
            .unwrap_or_else(|| stage.default_on_missing())
    }
}
