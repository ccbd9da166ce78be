//! Acoustic analysis primitives consumed by the measurement stages.
//!
//! The stages talk to an [`Analyzer`]; [`NativeAnalyzer`] implements it on
//! top of `hound`, `rustfft` and `pitch-detection`. The data objects it
//! returns (pitch and formant tracks, spectra) are plain values, so other
//! analyzers can build them directly.

pub mod decode;
pub mod formant;
pub mod pitch;
pub mod sound;
pub mod spectrum;

pub use formant::{Formant, FormantFrame, FormantTrack};
pub use pitch::{PitchFrame, PitchTrack};
pub use sound::Sound;
pub use spectrum::{Cepstrum, HarmonicsParams, Ltas, Spectrum};

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcousticsError {
    #[error("Decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("No samples between {from:.4}s and {to:.4}s")]
    EmptyRange { from: f64, to: f64 },
    #[error("Sound too short: needs {needed:.4}s, has {available:.4}s")]
    TooShort { needed: f64, available: f64 },
    #[error("No usable voiced frames")]
    NoVoicedFrames,
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// The acoustic-analysis operations the pipeline needs.
pub trait Analyzer {
    fn load_sound(&self, path: &Path) -> Result<Sound, AcousticsError>;

    fn pitch(&self, sound: &Sound, floor: f64, ceiling: f64) -> Result<PitchTrack, AcousticsError>;

    fn formants(&self, sound: &Sound, max_formant: f64) -> Result<FormantTrack, AcousticsError>;

    fn mel_cepstrum(&self, sound: &Sound, coefficients: usize) -> Result<Cepstrum, AcousticsError>;

    fn spectrum(&self, sound: &Sound) -> Result<Spectrum, AcousticsError>;

    fn harmonics_ltas(
        &self,
        sound: &Sound,
        pitch: &PitchTrack,
        params: &HarmonicsParams,
    ) -> Result<Ltas, AcousticsError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NativeAnalyzer;

impl Analyzer for NativeAnalyzer {
    fn load_sound(&self, path: &Path) -> Result<Sound, AcousticsError> {
        Ok(decode::load_audio(path)?)
    }

    fn pitch(&self, sound: &Sound, floor: f64, ceiling: f64) -> Result<PitchTrack, AcousticsError> {
        PitchTrack::from_sound(sound, floor, ceiling)
    }

    fn formants(&self, sound: &Sound, max_formant: f64) -> Result<FormantTrack, AcousticsError> {
        FormantTrack::from_sound(sound, max_formant)
    }

    fn mel_cepstrum(&self, sound: &Sound, coefficients: usize) -> Result<Cepstrum, AcousticsError> {
        Cepstrum::from_sound(sound, coefficients)
    }

    fn spectrum(&self, sound: &Sound) -> Result<Spectrum, AcousticsError> {
        Spectrum::from_sound(sound)
    }

    fn harmonics_ltas(
        &self,
        sound: &Sound,
        pitch: &PitchTrack,
        params: &HarmonicsParams,
    ) -> Result<Ltas, AcousticsError> {
        Ltas::harmonics_only(sound, pitch, params)
    }
}
