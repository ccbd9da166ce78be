pub mod acoustics;
pub mod aggregate;
pub mod config;
pub mod dataset;
pub mod measure;
pub mod pipeline;
pub mod scanner;
pub mod textgrid;

/// Suffix of annotation files
pub const ANNOTATION_EXTENSION: &str = "TextGrid";

/// Suffix of the audio file paired with each annotation
pub const AUDIO_EXTENSION: &str = "wav";

/// Application name for XDG paths
pub const APP_NAME: &str = "vowelscan";
