//! One measurement run: collect utterances, attach speaker metadata, run the
//! selected stages, then write (or merge into) the output table.

use crate::acoustics::Analyzer;
use crate::config::{AppConfig, ConfigError, MeasurementSelection};
use crate::dataset::metadata::load_speaker_sexes;
use crate::dataset::{Dataset, DatasetError};
use crate::pipeline::{run_pipeline, EventSink, MissingPolicy, PipelineError, Stage, StageContext, UtteranceTable};
use crate::scanner::{collect_from_directory, FilePairing, ScanError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),
}

#[derive(Debug, Clone)]
pub struct MeasureOptions {
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub speaker_metadata: Option<PathBuf>,
    pub selection: MeasurementSelection,
    pub pairing: FilePairing,
    pub policy: MissingPolicy,
    pub show_progress: bool,
}

impl MeasureOptions {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            input_dir: config.input_dir.clone().ok_or(ConfigError::NoInputDir)?,
            output: config.output.clone(),
            speaker_metadata: config.speaker_metadata.clone(),
            selection: config.measurements,
            pairing: config.pairing(),
            policy: config.missing_policy(),
            show_progress: false,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub utterances: usize,
    pub stages: Vec<Stage>,
    pub warnings: usize,
    pub rows_written: usize,
    /// An earlier output file was joined with this run's results.
    pub merged: bool,
}

/// Run every selected measurement and write the output table.
///
/// Returns `Ok(None)` without touching the file system when nothing is
/// selected. The selection is validated before any file is read.
pub fn run_measurements(
    options: &MeasureOptions,
    analyzer: &dyn Analyzer,
    sink: &mut dyn EventSink,
) -> Result<Option<RunSummary>, MeasureError> {
    options.selection.validate()?;
    let stages = options.selection.stages();
    if stages.is_empty() {
        return Ok(None);
    }

    let files = collect_from_directory(&options.input_dir, &options.pairing)?;
    let mut table = UtteranceTable::from_files(files)?;
    if let Some(path) = &options.speaker_metadata {
        let sexes = load_speaker_sexes(path)?;
        table.attach_sex(&sexes);
    }

    let warnings_before = sink.warning_count();
    {
        let mut ctx =
            StageContext::new(analyzer, &mut *sink, &options.policy).with_progress(options.show_progress);
        run_pipeline(&stages, &mut table, &mut ctx)?;
    }

    let mut dataset = Dataset::from_table(&table);
    let merged = options.output.exists();
    if merged {
        log::info!("Merging with existing {}", options.output.display());
        let earlier = Dataset::read(&options.output)?;
        dataset = earlier.inner_join(&dataset)?;
    }
    dataset.write(&options.output)?;
    log::info!("Wrote {} rows to {}", dataset.len(), options.output.display());

    Ok(Some(RunSummary {
        utterances: table.len(),
        stages,
        warnings: sink.warning_count() - warnings_before,
        rows_written: dataset.len(),
        merged,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acoustics::NativeAnalyzer;
    use crate::acoustics::decode::tests::write_wav;
    use crate::acoustics::formant::tests::synthetic_vowel;
    use crate::pipeline::CollectingSink;
    use crate::textgrid::tests::long_format;
    use std::path::Path;

    fn write_utterance(root: &Path, speaker: &str, id: &str) {
        let dir = root.join(speaker);
        std::fs::create_dir_all(&dir).unwrap();
        let vowel = [(0.0, 0.3, ""), (0.3, 0.6, "a"), (0.6, 1.0, "")];
        let word = [
            (0.0, 0.1, ""),
            (0.1, 0.3, "the"),
            (0.3, 0.35, ""),
            (0.35, 0.75, "bat"),
            (0.75, 1.0, ""),
        ];
        let f0 = [(0.2, "T"), (0.5, "H"), (0.8, "L%")];
        let grid = long_format(
            &[("Vowel", &vowel[..]), ("Word", &word[..])],
            &[("f0", &f0[..])],
        );
        std::fs::write(dir.join(format!("{id}.TextGrid")), grid).unwrap();

        let sound = synthetic_vowel(120.0, &[(700.0, 80.0), (1200.0, 90.0), (2600.0, 120.0)], 16000.0, 1.0);
        write_wav(&dir.join(format!("{id}.wav")), sound.samples(), 16000);
    }

    fn options(root: &Path, selection: MeasurementSelection) -> MeasureOptions {
        MeasureOptions {
            input_dir: root.join("corpus"),
            output: root.join("acoustic_measures.csv"),
            speaker_metadata: None,
            selection,
            pairing: FilePairing::default(),
            policy: MissingPolicy::default(),
            show_progress: false,
        }
    }

    #[test]
    fn test_end_to_end_with_native_analysis() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus");
        write_utterance(&corpus, "AH_95", "0018");
        write_utterance(&corpus, "AH_95", "0019");
        write_utterance(&corpus, "BK_02", "0001");
        let metadata = dir.path().join("speakers.csv");
        std::fs::write(&metadata, "speaker,sex\nAH_95,m\nBK_02,f\n").unwrap();

        let mut opts = options(dir.path(), MeasurementSelection::all());
        opts.speaker_metadata = Some(metadata);
        let mut sink = CollectingSink::default();
        let summary = run_measurements(&opts, &NativeAnalyzer, &mut sink)
            .unwrap()
            .unwrap();

        assert_eq!(summary.utterances, 3);
        assert_eq!(summary.rows_written, 3);
        assert_eq!(summary.stages, Stage::ALL.to_vec());
        assert!(!summary.merged);

        let ds = Dataset::read(&opts.output).unwrap();
        assert_eq!(&ds.headers()[..3], &["speaker", "utterance_id", "sex"]);
        assert_eq!(ds.get(0, "speaker"), Some("AH_95"));
        assert_eq!(ds.get(2, "sex"), Some("f"));

        let num = |row: usize, col: &str| -> f64 { ds.get(row, col).unwrap().parse().unwrap() };
        assert!((num(0, "v1_duration_ms") - 300.0).abs() < 1e-6);
        assert!((num(0, "f1") - 700.0).abs() < 150.0, "f1 = {}", num(0, "f1"));
        assert!((num(0, "ratio_word_duration") - 0.5).abs() < 1e-9);
        assert!(num(0, "v1_rms") > 0.0);
        assert!(num(0, "exc_peak_low_end").abs() < 1.0);
        assert_eq!(ds.get(0, "f1_f2_dispersion"), ds.get(1, "f1_f2_dispersion"));
        assert!(ds.column_index("annotation_path").is_none());
    }

    #[test]
    fn test_rerun_merges_with_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("corpus");
        write_utterance(&corpus, "AH_95", "0018");
        write_utterance(&corpus, "AH_95", "0019");

        let first = MeasurementSelection {
            word_duration: true,
            vowel_duration: true,
            ..Default::default()
        };
        let mut sink = CollectingSink::default();
        run_measurements(&options(dir.path(), first), &NativeAnalyzer, &mut sink).unwrap();

        std::fs::remove_file(corpus.join("AH_95/0019.TextGrid")).unwrap();
        let second = MeasurementSelection {
            vowel_duration: true,
            rms: true,
            ..Default::default()
        };
        let summary = run_measurements(&options(dir.path(), second), &NativeAnalyzer, &mut sink)
            .unwrap()
            .unwrap();
        assert!(summary.merged);
        assert_eq!(summary.rows_written, 1);

        let ds = Dataset::read(&dir.path().join("acoustic_measures.csv")).unwrap();
        assert_eq!(ds.len(), 1);
        assert!(ds.column_index("tool_duration_ms").is_some());
        assert!(ds.column_index("v1_rms").is_some());
    }

    #[test]
    fn test_repeated_rows_in_existing_output_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_utterance(&dir.path().join("corpus"), "AH_95", "0018");
        let output = dir.path().join("acoustic_measures.csv");
        std::fs::write(&output, "speaker,utterance_id,f1\nAH_95,0018,500\nAH_95,0018,510\n").unwrap();

        let selection = MeasurementSelection {
            vowel_duration: true,
            ..Default::default()
        };
        let mut sink = CollectingSink::default();
        let result = run_measurements(&options(dir.path(), selection), &NativeAnalyzer, &mut sink);
        assert!(matches!(
            result,
            Err(MeasureError::Dataset(DatasetError::DuplicateKey { .. }))
        ));
        // The earlier file is left as it was.
        assert!(std::fs::read_to_string(&output).unwrap().contains("510"));
    }

    #[test]
    fn test_empty_selection_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CollectingSink::default();
        let opts = options(dir.path(), MeasurementSelection::default());
        assert_eq!(run_measurements(&opts, &NativeAnalyzer, &mut sink).unwrap(), None);
        assert!(!opts.output.exists());
    }

    #[test]
    fn test_prerequisites_checked_before_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CollectingSink::default();
        let selection = MeasurementSelection {
            formant_dispersion: true,
            ..Default::default()
        };
        // The corpus directory does not exist either; configuration wins.
        let result = run_measurements(&options(dir.path(), selection), &NativeAnalyzer, &mut sink);
        assert!(matches!(
            result,
            Err(MeasureError::Config(ConfigError::MissingPrerequisite { .. }))
        ));
    }

    #[test]
    fn test_missing_input_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CollectingSink::default();
        let selection = MeasurementSelection {
            vowel_duration: true,
            ..Default::default()
        };
        let result = run_measurements(&options(dir.path(), selection), &NativeAnalyzer, &mut sink);
        assert!(matches!(result, Err(MeasureError::Scan(ScanError::NotFound(_)))));
    }

    #[test]
    fn test_options_require_input_dir() {
        assert!(matches!(
            MeasureOptions::from_config(&AppConfig::default()),
            Err(ConfigError::NoInputDir)
        ));
    }
}
