//! Command line front end for the rate engine.
//!
//! ```text
//! cargo run --example rate_cli -- rate "map.osu" 1.5
//! cargo run --example rate_cli -- bulk "map.osu" --min 1.1 --max 1.5 --step 0.1 --collection ~/osu/collection.db
//! cargo run --example rate_cli -- summary "map.osu"
//! ```

use std::{
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
};

use clap::{Parser, Subcommand};
use mania_rate::{
    atomic,
    diagnostics::emit_line_warnings,
    engine::{EngineConfig, PresetStore, Progress, RateEngine, RateRange, RateRequest},
    prelude::*,
    timing::beat::{self, BeatTrack},
    transform::{apply_offset_to_document, normalize_scroll_velocity},
};

/// osu!mania rate changer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration as JSON
    #[arg(short, long, value_name = "CONFIG_PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create one rate-changed copy
    Rate {
        beatmap: PathBuf,
        rate: f64,
        /// Let the pitch follow the speed
        #[arg(long)]
        no_pitch: bool,
        #[arg(long)]
        od: Option<f64>,
        #[arg(long)]
        hp: Option<f64>,
        #[arg(long)]
        template: Option<String>,
    },
    /// Create a range of rates, or the rates of a saved preset
    Bulk {
        beatmap: PathBuf,
        #[arg(long, default_value_t = 1.1)]
        min: f64,
        #[arg(long, default_value_t = 1.5)]
        max: f64,
        #[arg(long, default_value_t = 0.1)]
        step: f64,
        /// Preset file and name, e.g. `presets.json:Practice`
        #[arg(long, value_name = "FILE:NAME")]
        preset: Option<String>,
        /// Add the outputs to this collection.db
        #[arg(long)]
        collection: Option<PathBuf>,
        #[arg(long, default_value = "Rates")]
        collection_name: String,
    },
    /// Shift timing points (and notes with --notes) in place
    Offset {
        beatmap: PathBuf,
        #[arg(allow_hyphen_values = true)]
        offset_ms: i32,
        #[arg(long)]
        notes: bool,
    },
    /// Equalize scroll speed across tempo changes in place
    Normalize {
        beatmap: PathBuf,
        /// Overwrite existing scroll-velocity changes instead of scaling them
        #[arg(long)]
        flatten: bool,
    },
    /// Replace the tempo points with beat-tracker output in place
    Beats {
        beatmap: PathBuf,
        track: PathBuf,
        #[arg(long, default_value_t = beat::DEFAULT_TOLERANCE_BPM)]
        tolerance: f64,
    },
    /// Print an overview as JSON
    Summary { beatmap: PathBuf },
    /// List the collections of a collection.db
    Collections { database: PathBuf },
}

type CliResult<T = ()> = std::result::Result<T, Box<dyn std::error::Error>>;

fn open(path: &Path) -> CliResult<BeatmapFile> {
    let file = BeatmapFile::open(path)?;
    let source = std::fs::read_to_string(path)?;
    emit_line_warnings(&path.display().to_string(), &source, &file.warnings);
    Ok(file)
}

/// Rewrites the beatmap in place, keeping the previous version as `<name>.bak`.
fn save(file: &BeatmapFile) -> CliResult {
    atomic::replace_with_backup(&file.path, file.document.to_osu_string().as_bytes())?;
    log::info!(
        "updated {} (previous version in {})",
        file.path.display(),
        atomic::backup_path(&file.path).display()
    );
    Ok(())
}

fn print_progress(receiver: mpsc::Receiver<Progress>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in receiver {
            match event {
                Progress::Started { rate } => println!("{rate}x: started"),
                Progress::AudioReady { rate, reused, .. } => {
                    println!("{rate}x: audio {}", if reused { "reused" } else { "ready" });
                }
                Progress::Finished { rate, path } => println!("{rate}x: wrote {}", path.display()),
                Progress::Failed { rate, message } => println!("{rate}x: failed: {message}"),
            }
        }
    })
}

fn main() -> CliResult {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => EngineConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Rate {
            beatmap,
            rate,
            no_pitch,
            od,
            hp,
            template,
        } => {
            let engine = RateEngine::with_command(config);
            let request = RateRequest {
                preserve_pitch: !no_pitch,
                od_override: od,
                hp_override: hp,
                template,
                ..RateRequest::new(rate)
            };
            let (sender, receiver) = mpsc::channel();
            let printer = print_progress(receiver);
            let output = engine.apply_rate(&beatmap, &request, Some(&sender));
            drop(sender);
            let _ = printer.join();
            let output = output?;
            println!("{} ({})", output.display_name, output.hash);
        }
        Command::Bulk {
            beatmap,
            min,
            max,
            step,
            preset,
            collection,
            collection_name,
        } => {
            let (range, request) = match preset.as_deref().and_then(|p| p.rsplit_once(':')) {
                Some((file, name)) => {
                    let store = PresetStore::load(file)?;
                    let preset = store
                        .get(name)
                        .ok_or_else(|| format!("no preset named `{name}` in {file}"))?;
                    (preset.range, preset.request(preset.range.min_rate))
                }
                None => (RateRange::new(min, max, step), RateRequest::new(min)),
            };
            let engine = RateEngine::with_command(config);
            let (sender, receiver) = mpsc::channel();
            let printer = print_progress(receiver);
            let report = engine.apply_range(&beatmap, &range, &request, Some(&sender));
            drop(sender);
            let _ = printer.join();
            let report = report?;
            for (rate, err) in report.failed() {
                eprintln!("{rate}x failed: {err}");
            }
            if let Some(database) = collection {
                let added = CollectionStore::open(database)
                    .add_hashes(&collection_name, report.hashes())?;
                println!("added {added} beatmap(s) to `{collection_name}`");
            }
        }
        Command::Offset {
            beatmap,
            offset_ms,
            notes,
        } => {
            let mut file = open(&beatmap)?;
            let scope = if notes {
                OffsetScope::TimingAndNotes
            } else {
                OffsetScope::TimingOnly
            };
            apply_offset_to_document(&mut file.document, offset_ms, scope);
            save(&file)?;
        }
        Command::Normalize { beatmap, flatten } => {
            let mut file = open(&beatmap)?;
            let summary = BeatmapSummary::of_document(&file.document);
            let output = normalize_scroll_velocity(
                &file.document.timing_points().points,
                summary.objects.last_end_time.map(f64::from),
                NormalizeOptions {
                    preserve_relative_sv: !flatten,
                },
            );
            file.document.set_timing_points(&output.points);
            println!(
                "normalized to {:?} BPM, replaced {} point(s)",
                output.dominant_bpm, output.removed_inherited
            );
            save(&file)?;
        }
        Command::Beats {
            beatmap,
            track,
            tolerance,
        } => {
            let mut file = open(&beatmap)?;
            let track = BeatTrack::from_json(&std::fs::read_to_string(track)?)?;
            let samples = beat::stabilize_samples(&track.samples(), tolerance);
            let tempo = beat::beats_to_timing_points(&samples);
            let merged =
                beat::merge_timing_points(&file.document.timing_points().points, &tempo);
            file.document.set_timing_points(&merged);
            println!("{} tempo point(s) from {} beat(s)", tempo.len(), track.beats.len());
            save(&file)?;
        }
        Command::Summary { beatmap } => {
            let file = open(&beatmap)?;
            let summary = BeatmapSummary::of_document(&file.document);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Collections { database } => {
            let db = CollectionDb::read_from_path(database)?;
            for record in &db.collections {
                println!("{} ({} beatmaps)", record.name(), record.hashes.len());
            }
        }
    }
    Ok(())
}
