//! vsplit - voice separation for MIDI files
//!
//! Subcommands:
//! - `vsplit run <paths>` - Split and score, printing P/R/F1 per song
//! - `vsplit extract <paths>` - Print the split notes, one per line
//! - `vsplit write --out <dir> <paths>` - Write each split to a MIDI file
//! - `vsplit tune <paths>` - Grid search for the best parameters
//! - `vsplit config` - Print the effective configuration

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use midi_notes::{write_voices, ExportOptions, LabelSource, Song};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voice_split::{aggregate, EvaluationReport, ModelParameters, SearchLimits};
use voiceconf::VsplitConfig;
use vsplit::inputs::collect_midi_files;
use vsplit::report::{extract_lines, song_line, summary_line, voice_lines};
use vsplit::runner::{decode, Decoded};
use vsplit::tune::{tune, TuneGrid};

#[derive(Parser)]
#[command(name = "vsplit")]
#[command(about = "Split polyphonic MIDI into monophonic voices")]
#[command(version)]
struct Cli {
    /// Config file to use in place of ./vsplit.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split each file and score it against its channels or tracks
    Run {
        #[command(flatten)]
        input: InputArgs,

        /// Print per-voice consistency
        #[arg(short, long)]
        verbose: bool,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print `songID voiceID onset offset pitch velocity` for every note
    Extract {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Write each split as a MIDI file with one track per voice
    Write {
        /// Output directory
        #[arg(short, long)]
        out: PathBuf,

        #[command(flatten)]
        input: InputArgs,
    },

    /// Search the parameter grid for the best F1
    Tune {
        /// Values tried per parameter
        #[arg(long, default_value = "5")]
        steps: usize,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        input: InputArgs,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// MIDI files, or directories of them
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,
}

/// Per-field overrides of the configured model.
#[derive(Args, Debug, Default)]
struct ModelArgs {
    /// Beam width
    #[arg(short = 'b', long)]
    beam_width: Option<usize>,

    /// New voice probability
    #[arg(short = 'n', long)]
    new_voice_prior: Option<f64>,

    /// Pitch history length
    #[arg(short = 'H', long)]
    pitch_history: Option<usize>,

    /// Gap standard deviation in microseconds
    #[arg(short = 'g', long)]
    gap_std: Option<f64>,

    /// Pitch standard deviation in semitones
    #[arg(short = 'p', long)]
    pitch_std: Option<f64>,

    /// Minimum gap score
    #[arg(short = 'm', long)]
    min_gap: Option<f64>,

    /// Take gold labels from tracks rather than channels
    #[arg(long)]
    tracks: bool,
}

impl ModelArgs {
    fn apply(&self, config: &mut VsplitConfig) {
        let model = &mut config.model;
        if let Some(v) = self.beam_width {
            model.beam_width = v;
        }
        if let Some(v) = self.new_voice_prior {
            model.new_voice_prior = v;
        }
        if let Some(v) = self.pitch_history {
            model.pitch_history_length = v;
        }
        if let Some(v) = self.gap_std {
            model.gap_std_micros = v;
        }
        if let Some(v) = self.pitch_std {
            model.pitch_std = v;
        }
        if let Some(v) = self.min_gap {
            model.min_gap_score = v;
        }
        if self.tracks {
            config.input.gold_from = LabelSource::Track;
        }
    }
}

#[derive(Serialize)]
struct RunOutput<'a> {
    params: &'a ModelParameters,
    songs: Vec<Decoded>,
    report: EvaluationReport,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (mut config, sources) = VsplitConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    match &cli.command {
        Commands::Run { input, .. }
        | Commands::Extract { input }
        | Commands::Write { input, .. }
        | Commands::Tune { input, .. } => input.model.apply(&mut config),
        Commands::Config { model } => model.apply(&mut config),
    }
    config.model.validate().context("Invalid model parameters")?;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    info!(files = ?sources.files, env = ?sources.env_overrides, "configuration loaded");

    let limits = config.search.limits();
    let labels = config.input.gold_from;

    let failures = match cli.command {
        Commands::Run {
            input,
            verbose,
            json,
        } => {
            let (songs, failed) = read_songs(&input.paths, labels)?;
            failed + run(&songs, &config.model, &limits, verbose, json)?
        }
        Commands::Extract { input } => {
            let (songs, failed) = read_songs(&input.paths, labels)?;
            failed + extract(&songs, &config.model, &limits)
        }
        Commands::Write { out, input } => {
            let (songs, failed) = read_songs(&input.paths, labels)?;
            failed + write(&songs, &out, &config.model, &limits)?
        }
        Commands::Tune { steps, json, input } => {
            let (songs, failed) = read_songs(&input.paths, labels)?;
            if failed > 0 {
                bail!("{} file(s) could not be read; not tuning on a partial corpus", failed);
            }
            let best = tune(&songs, &TuneGrid::default(), steps, &limits)
                .context("No parameter set could split every song")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&best)?);
            } else {
                println!("{}", summary_line(&best.params, &best.report));
            }
            0
        }
        Commands::Config { .. } => {
            print!("{}", config.to_toml());
            0
        }
    };

    if failures > 0 {
        bail!("{} file(s) failed", failures);
    }
    Ok(())
}

/// Read every file in parallel, in path order. Unreadable files are
/// reported and counted rather than aborting the run.
fn read_songs(paths: &[PathBuf], labels: LabelSource) -> Result<(Vec<Song>, usize)> {
    let files = collect_midi_files(paths)?;
    info!(count = files.len(), "reading MIDI files");

    let results: Vec<Result<Song>> = files
        .par_iter()
        .map(|path| {
            Song::read(path, labels).with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect();

    let mut songs = Vec::with_capacity(results.len());
    let mut failed = 0;
    for result in results {
        match result {
            Ok(song) => songs.push(song),
            Err(e) => {
                eprintln!("Error: {:#}", e);
                failed += 1;
            }
        }
    }
    Ok((songs, failed))
}

fn report_failure(song: &Song, e: &voice_split::Error) {
    error!(song = %song.name, error = %e, "split failed");
    eprintln!("Error: {}: {}", song.name, e);
}

fn run(
    songs: &[Song],
    params: &ModelParameters,
    limits: &SearchLimits,
    verbose: bool,
    json: bool,
) -> Result<usize> {
    let mut decoded = Vec::with_capacity(songs.len());
    let mut failed = 0;
    for song in songs {
        match decode(song, params, limits) {
            Ok(result) => {
                if !json {
                    println!("{}", song_line(&result));
                    if verbose {
                        for line in voice_lines(&result) {
                            println!("{}", line);
                        }
                    }
                }
                decoded.push(result);
            }
            Err(e) => {
                report_failure(song, &e);
                failed += 1;
            }
        }
    }

    let scores: Vec<_> = decoded.iter().map(|d| d.score.clone()).collect();
    let report = aggregate(&scores);
    if json {
        let output = RunOutput {
            params,
            songs: decoded,
            report,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", summary_line(params, &report));
    }
    Ok(failed)
}

fn extract(songs: &[Song], params: &ModelParameters, limits: &SearchLimits) -> usize {
    let mut failed = 0;
    for (index, song) in songs.iter().enumerate() {
        match decode(song, params, limits) {
            Ok(result) => {
                for line in extract_lines(index, &result.voices) {
                    println!("{}", line);
                }
            }
            Err(e) => {
                report_failure(song, &e);
                failed += 1;
            }
        }
    }
    failed
}

fn write(
    songs: &[Song],
    out: &Path,
    params: &ModelParameters,
    limits: &SearchLimits,
) -> Result<usize> {
    std::fs::create_dir_all(out)
        .with_context(|| format!("Failed to create output directory {}", out.display()))?;

    let options = ExportOptions::default();
    let mut failed = 0;
    for song in songs {
        let result = match decode(song, params, limits) {
            Ok(result) => result,
            Err(e) => {
                report_failure(song, &e);
                failed += 1;
                continue;
            }
        };
        let path = out.join(format!("{}.mid", song.name));
        if let Err(e) = write_voices(&path, &result.voices, &song.context, &options) {
            error!(song = %song.name, error = %e, "write failed");
            eprintln!("Error: {}", e);
            failed += 1;
            continue;
        }
        info!(
            song = %song.name,
            voices = result.voices.len(),
            path = %path.display(),
            "wrote voices"
        );
    }
    Ok(failed)
}
