use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use vowelscan::config::{AppConfig, MeasurementSelection};
use vowelscan::measure::{run_measurements, MeasureOptions};
use vowelscan::pipeline::{LogSink, Stage};
use vowelscan::textgrid::TextGrid;

#[derive(Parser)]
#[command(name = "vowelscan", version, about = "Acoustic measurements from TextGrid-annotated recordings")]
struct Cli {
    /// Config file (defaults to the XDG config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Hide progress bars
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Measurement switches; OR-ed onto the config file's `[measurements]`.
#[derive(Args)]
struct MeasureFlags {
    /// Enable every measurement
    #[arg(long)]
    all: bool,
    /// Vowel duration from the "Vowel" tier
    #[arg(long)]
    vowel_duration: bool,
    /// Mean F1-F3 over the vowel
    #[arg(long)]
    formant_averages: bool,
    /// Per-speaker formant dispersion (needs --formant-averages)
    #[arg(long)]
    formant_dispersion: bool,
    /// RMS energy of the vowel (needs --vowel-duration)
    #[arg(long)]
    rms: bool,
    /// First mel-cepstral coefficient of the vowel (needs --vowel-duration)
    #[arg(long)]
    spectral_tilt: bool,
    /// Spectral centre of gravity of the vowel (needs --vowel-duration)
    #[arg(long)]
    center_of_gravity: bool,
    /// Tool/target word durations from the "Word" tier (needs --vowel-duration)
    #[arg(long)]
    word_duration: bool,
    /// Pitch excursions of the "f0" points
    #[arg(long)]
    relative_heights: bool,
    /// H1-H2 over the vowel
    #[arg(long)]
    h1_h2: bool,
}

impl MeasureFlags {
    fn selection(&self) -> MeasurementSelection {
        if self.all {
            return MeasurementSelection::all();
        }
        MeasurementSelection {
            vowel_duration: self.vowel_duration,
            formant_averages: self.formant_averages,
            formant_dispersion: self.formant_dispersion,
            rms: self.rms,
            spectral_tilt: self.spectral_tilt,
            center_of_gravity: self.center_of_gravity,
            word_duration: self.word_duration,
            relative_heights: self.relative_heights,
            h1_h2: self.h1_h2,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the selected measurements and write the output table
    Measure {
        /// Directory with one subdirectory per speaker (defaults to config input_dir)
        input: Option<PathBuf>,

        /// Output CSV; merged with an existing file at the same path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// CSV with speaker and sex columns
        #[arg(long)]
        speaker_metadata: Option<PathBuf>,

        #[command(flatten)]
        flags: MeasureFlags,
    },

    /// List the utterances found under a directory
    Collect {
        /// Directory with one subdirectory per speaker (defaults to config input_dir)
        input: Option<PathBuf>,
    },

    /// Show the tiers of a TextGrid
    Tiers {
        file: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Serialize)]
struct TierSummary<'a> {
    index: usize,
    name: &'a str,
    class: &'static str,
    items: usize,
    xmin: f64,
    xmax: f64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Explicit --config must load; the default location is optional
    let mut config = AppConfig::resolve(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Measure {
            input,
            output,
            speaker_metadata,
            flags,
        } => {
            config.measurements.merge(&flags.selection());
            if input.is_some() {
                config.input_dir = input;
            }
            if let Some(output) = output {
                config.output = output;
            }
            if speaker_metadata.is_some() {
                config.speaker_metadata = speaker_metadata;
            }

            config
                .measurements
                .validate()
                .context("Invalid measurement selection")?;
            if config.measurements.is_empty() {
                println!("No measurements selected; nothing to do.");
                println!("Pass --all or individual flags (see --help), or set [measurements] in config.");
                return Ok(());
            }

            let mut options = MeasureOptions::from_config(&config)?;
            options.show_progress = !cli.quiet;
            log::info!("Input: {}", options.input_dir.display());

            let mut sink = LogSink::default();
            let summary = run_measurements(&options, &vowelscan::acoustics::NativeAnalyzer, &mut sink)
                .context("Measurement failed")?;
            match summary {
                Some(s) => {
                    let stages: Vec<&str> = s.stages.iter().map(Stage::name).collect();
                    println!(
                        "Measurement complete: {} utterances, {} warnings, {} rows written to {}{}",
                        s.utterances,
                        s.warnings,
                        s.rows_written,
                        options.output.display(),
                        if s.merged { " (merged)" } else { "" }
                    );
                    println!("Stages: {}", stages.join(", "));
                }
                None => println!("No measurements selected; nothing to do."),
            }
        }

        Commands::Collect { input } => {
            let root = input
                .or(config.input_dir.clone())
                .context("No input directory. Pass one as an argument or set input_dir in config.")?;
            let files = vowelscan::scanner::collect_from_directory(&root, &config.pairing())
                .context("Collection failed")?;

            if files.is_empty() {
                println!("No annotation files found under {}.", root.display());
                return Ok(());
            }

            println!("{:<12} {:<16} {:<6} Annotation", "Speaker", "Utterance", "Audio");
            println!("{}", "-".repeat(72));
            for f in &files {
                println!(
                    "{:<12} {:<16} {:<6} {}",
                    f.speaker,
                    f.utterance_id,
                    if f.audio_path.exists() { "yes" } else { "MISSING" },
                    f.annotation_path.display()
                );
            }
            let speakers: std::collections::BTreeSet<&str> =
                files.iter().map(|f| f.speaker.as_str()).collect();
            println!();
            println!("{} utterances from {} speakers", files.len(), speakers.len());
        }

        Commands::Tiers { file, json } => {
            let grid = TextGrid::from_file(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let tiers: Vec<TierSummary> = grid
                .tiers
                .iter()
                .enumerate()
                .map(|(i, t)| TierSummary {
                    index: i + 1,
                    name: &t.name,
                    class: t.class_name(),
                    items: t.item_count(),
                    xmin: t.xmin,
                    xmax: t.xmax,
                })
                .collect();

            if json {
                println!("{}", serde_json::to_string_pretty(&tiers)?);
                return Ok(());
            }

            println!("{} ({:.3}s - {:.3}s)", file.display(), grid.xmin, grid.xmax);
            println!();
            println!("{:>3}  {:<20} {:<13} {:>6}", "#", "Name", "Class", "Items");
            println!("{}", "-".repeat(46));
            for t in &tiers {
                println!("{:>3}  {:<20} {:<13} {:>6}", t.index, t.name, t.class, t.items);
            }
        }
    }

    Ok(())
}
