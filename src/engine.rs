//! The rate transform engine.
//!
//! Turning a beatmap into a faster or slower copy takes four steps:
//!
//! 1. scale every temporal field of the document ([`crate::transform::rate`]),
//! 2. apply difficulty overrides and compute the new difficulty name ([`template`]),
//! 3. stretch the audio with an external program ([`stretch`]),
//! 4. write the new `.osu` file next to the stretched audio.
//!
//! Everything that can be checked without side effects (rate, document, stretcher
//! availability) is checked before the first file is written. The beatmap is written only
//! after its audio exists, and stretched audio is removed again when the beatmap cannot be
//! written. [`bulk`] runs the same pipeline for a whole [`RateRange`].

pub mod bulk;
pub mod preset;
pub mod stretch;
pub mod template;

use std::{
    path::{Path, PathBuf},
    sync::mpsc::Sender,
    time::Duration,
};

use thiserror::Error;

use crate::{
    atomic::{canonical_target, write_atomic},
    document::{BeatmapDocument, BeatmapFile, DocumentError, LineWarning},
    hash::ContentHash,
    summary::BeatmapSummary,
    transform::rate::{InvalidRate, ScaledDocument, scale_document, validate_rate},
};

pub use self::{
    bulk::{BulkReport, RateResult},
    preset::{ConfigError, PresetStore, RangeError, RatePreset, RateRange},
    stretch::{AudioStretcher, CommandStretcher, StretchError, StretchRequest},
    template::{DEFAULT_TEMPLATE, TemplateValues},
};

/// Longest file name, in characters, written by the engine.
pub const MAX_FILE_NAME_CHARS: usize = 200;

/// Failure of the rate transform engine.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested rate is unsupported.
    #[error(transparent)]
    InvalidRate(#[from] InvalidRate),
    /// The requested range of rates is unusable.
    #[error(transparent)]
    InvalidRange(#[from] RangeError),
    /// The source beatmap could not be parsed.
    #[error("malformed source beatmap: {0}")]
    MalformedDocument(#[from] DocumentError),
    /// The audio stretcher cannot run.
    #[error("`{program}` is unavailable: {reason}")]
    DependencyUnavailable {
        /// Program that was probed.
        program: String,
        /// Why it could not be used.
        reason: String,
    },
    /// The source names no audio file, or the file does not exist.
    #[error("source audio `{}` not found", .0.display())]
    MissingAudio(PathBuf),
    /// The output would replace the source beatmap.
    #[error("output `{}` would overwrite the source beatmap", .0.display())]
    WouldOverwriteSource(PathBuf),
    /// The audio stretcher ran and failed.
    #[error("audio stretch failed (exit status {status:?}): {stderr}")]
    StretchFailed {
        /// Exit code, when the process exited normally.
        status: Option<i32>,
        /// Tail of the program's error output.
        stderr: String,
    },
    /// The audio stretcher exceeded its time limit.
    #[error("audio stretch timed out after {0:?}")]
    StretchTimeout(Duration),
    /// A file could not be read or written.
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The worker pool for bulk processing could not be built.
    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),
}

impl EngineError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn from_stretch(err: StretchError, output: &Path) -> Self {
        match err {
            StretchError::Unavailable { program, reason } => {
                Self::DependencyUnavailable { program, reason }
            }
            StretchError::Failed { status, stderr } => Self::StretchFailed { status, stderr },
            StretchError::Timeout(limit) => Self::StretchTimeout(limit),
            StretchError::Io(source) => Self::Io {
                path: output.to_path_buf(),
                source,
            },
        }
    }
}

#[cfg(feature = "serde")]
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct EngineConfig {
    /// ffmpeg-compatible program used by [`CommandStretcher`].
    pub stretcher_program: PathBuf,
    /// Time limit of one audio stretch, in seconds when serialized.
    #[cfg_attr(feature = "serde", serde(with = "duration_secs"))]
    pub stretch_timeout: Duration,
    /// Sample rate assumed when the pitch follows the speed.
    pub sample_rate: u32,
    /// Parallel workers in bulk mode; `0` uses one per CPU.
    pub workers: usize,
    /// Difficulty-name template.
    pub template: String,
    /// Where outputs go; next to the source when absent. Only the beatmap and its audio are
    /// written there.
    pub output_dir: Option<PathBuf>,
    /// Keep an existing stretched audio file instead of producing it again, so difficulties
    /// of one set share the audio of a rate.
    pub reuse_existing_audio: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stretcher_program: PathBuf::from(stretch::DEFAULT_PROGRAM),
            stretch_timeout: stretch::DEFAULT_TIMEOUT,
            sample_rate: stretch::DEFAULT_SAMPLE_RATE,
            workers: 0,
            template: DEFAULT_TEMPLATE.to_string(),
            output_dir: None,
            reuse_existing_audio: true,
        }
    }
}

#[cfg(feature = "serde")]
impl EngineConfig {
    /// Reads a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Json`] naming the offending path.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        preset::from_json(json)
    }
}

impl EngineConfig {
    /// A [`CommandStretcher`] following this configuration.
    #[must_use]
    pub fn command_stretcher(&self) -> CommandStretcher {
        CommandStretcher::new(&self.stretcher_program)
            .with_timeout(self.stretch_timeout)
            .with_sample_rate(self.sample_rate)
    }
}

/// One rate change to perform.
#[derive(Debug, Clone, PartialEq)]
pub struct RateRequest {
    /// Speed factor.
    pub rate: f64,
    /// Keep the audio pitch.
    pub preserve_pitch: bool,
    /// Overall difficulty of the output, else the source's.
    pub od_override: Option<f64>,
    /// HP drain of the output, else the source's.
    pub hp_override: Option<f64>,
    /// Difficulty-name template, else the engine's.
    pub template: Option<String>,
}

impl RateRequest {
    /// A pitch-preserving request without overrides.
    #[must_use]
    pub const fn new(rate: f64) -> Self {
        Self {
            rate,
            preserve_pitch: true,
            od_override: None,
            hp_override: None,
            template: None,
        }
    }
}

/// Events sent while the engine works.
#[derive(Debug, Clone, PartialEq)]
pub enum Progress {
    /// Work on a rate began.
    Started {
        /// The rate.
        rate: f64,
    },
    /// The stretched audio is in place.
    AudioReady {
        /// The rate.
        rate: f64,
        /// The audio file.
        path: PathBuf,
        /// Whether an existing file was reused.
        reused: bool,
    },
    /// The beatmap was written.
    Finished {
        /// The rate.
        rate: f64,
        /// The beatmap file.
        path: PathBuf,
    },
    /// The rate failed.
    Failed {
        /// The rate.
        rate: f64,
        /// The error, rendered.
        message: String,
    },
}

fn notify(progress: Option<&Sender<Progress>>, event: Progress) {
    if let Some(sender) = progress {
        // A caller that dropped its receiver no longer wants events; the run goes on.
        let _ = sender.send(event);
    }
}

/// A rate-changed document that has not been written anywhere yet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct RatedDocument {
    /// The new document.
    pub document: BeatmapDocument,
    /// Its difficulty name.
    pub display_name: String,
    /// Lines of the source that were dropped.
    pub warnings: Vec<LineWarning>,
}

fn clamp_difficulty(name: &str, value: f64) -> f64 {
    let clamped = value.clamp(0.0, 10.0);
    if (clamped - value).abs() > f64::EPSILON {
        log::warn!("{name} override {value} clamped to {clamped}");
    }
    clamped
}

/// Appends `<rate>x`, and `NC` for pitch-shifted audio, unless the name already carries them
/// as words. Output file names derive from the difficulty name, so every rate and pitch mode
/// gets its own file whatever the template.
fn distinct_name(name: String, rate: f64, preserve_pitch: bool) -> String {
    let has_word = |name: &str, marker: &str| {
        name.split_whitespace()
            .any(|word| word.trim_matches(|c: char| matches!(c, '(' | ')' | '[' | ']' | ',')) == marker)
    };
    let mut name = name;
    let rate_marker = format!("{}x", template::format_rate(rate));
    if !has_word(&name, &rate_marker) {
        name = format!("{name} {rate_marker}").trim().to_string();
    }
    if !preserve_pitch && !has_word(&name, "NC") {
        name.push_str(" NC");
    }
    name
}

/// Scales `document` by `request.rate`, applies the overrides and renames the difficulty.
///
/// The difficulty name always names the rate, and `NC` when the pitch is not preserved.
/// The output has `BeatmapID` 0 and the rate appended to its tags, so the game treats it as a
/// new local map.
///
/// # Errors
///
/// [`InvalidRate`] when the rate is out of range.
pub fn rate_document(
    document: &BeatmapDocument,
    request: &RateRequest,
    template: &str,
) -> Result<RatedDocument, InvalidRate> {
    let ScaledDocument {
        document: mut rated,
        warnings,
    } = scale_document(document, request.rate)?;

    if let Some(od) = request.od_override {
        let od = clamp_difficulty("OverallDifficulty", od);
        rated.set("Difficulty", "OverallDifficulty", template::format_number(od));
    }
    if let Some(hp) = request.hp_override {
        let hp = clamp_difficulty("HPDrainRate", hp);
        rated.set("Difficulty", "HPDrainRate", template::format_number(hp));
    }

    let summary = BeatmapSummary::of_document(&rated);
    let values = TemplateValues {
        name: document.version().unwrap_or_default().to_string(),
        rate: Some(request.rate),
        bpm: summary.bpm_display(),
        od: rated.overall_difficulty(),
        hp: rated.hp_drain(),
        cs: rated.circle_size(),
        ar: rated.approach_rate(),
    };
    let display_name = distinct_name(
        template::render(template, &values),
        request.rate,
        request.preserve_pitch,
    );

    let rate_tag = format!("{}x", template::format_rate(request.rate));
    let tags = rated.get("Metadata", "Tags").unwrap_or_default();
    if !tags.split_whitespace().any(|tag| tag == rate_tag) {
        let tags = format!("{tags} {rate_tag}").trim().to_string();
        rated.set("Metadata", "Tags", tags);
    }
    rated.set("Metadata", "Version", display_name.clone());
    rated.set("Metadata", "BeatmapID", "0");

    Ok(RatedDocument {
        document: rated,
        display_name,
        warnings,
    })
}

/// Removes characters that file systems reject and trims the result.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .take(MAX_FILE_NAME_CHARS)
        .collect();
    cleaned.trim().trim_end_matches('.').to_string()
}

/// `Artist - Title (Creator) [Version].osu`, sanitized.
#[must_use]
pub fn beatmap_file_name(document: &BeatmapDocument) -> String {
    let stem = format!(
        "{} - {} ({}) [{}]",
        document.artist().unwrap_or_default(),
        document.title().unwrap_or_default(),
        document.creator().unwrap_or_default(),
        document.version().unwrap_or_default(),
    );
    format!("{}.osu", sanitize_file_name(&stem))
}

/// `<stem>_<rate>x.<ext>`; pitch-shifted audio gets an extra `_nc` so it never shares a
/// file with time-stretched audio of the same rate.
#[must_use]
pub fn rated_audio_name(audio: &str, rate: f64, preserve_pitch: bool) -> String {
    let path = Path::new(audio);
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let suffix = if preserve_pitch { "" } else { "_nc" };
    let name = match path.extension() {
        Some(ext) => format!(
            "{stem}_{}x{suffix}.{}",
            template::format_rate(rate),
            ext.to_string_lossy()
        ),
        None => format!("{stem}_{}x{suffix}", template::format_rate(rate)),
    };
    path.with_file_name(name).to_string_lossy().into_owned()
}

/// What [`RateEngine::apply_rate`] produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateOutput {
    /// The written beatmap.
    pub beatmap_path: PathBuf,
    /// The audio it plays.
    pub audio_path: PathBuf,
    /// Whether the audio already existed and was reused.
    pub audio_reused: bool,
    /// The new difficulty name.
    pub display_name: String,
    /// Content hash of the written beatmap, for adding it to a collection.
    pub hash: ContentHash,
    /// Lines of the source that were dropped.
    pub warnings: Vec<LineWarning>,
}

/// Runs rate changes with an [`AudioStretcher`].
#[derive(Debug, Clone)]
pub struct RateEngine<S> {
    stretcher: S,
    config: EngineConfig,
}

impl RateEngine<CommandStretcher> {
    /// An engine running the configured external program.
    #[must_use]
    pub fn with_command(config: EngineConfig) -> Self {
        Self::new(config.command_stretcher(), config)
    }
}

impl<S: AudioStretcher> RateEngine<S> {
    /// An engine using `stretcher`.
    #[must_use]
    pub const fn new(stretcher: S, config: EngineConfig) -> Self {
        Self { stretcher, config }
    }

    /// The settings.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The stretcher.
    #[must_use]
    pub const fn stretcher(&self) -> &S {
        &self.stretcher
    }

    fn load(source: &Path) -> Result<BeatmapFile, EngineError> {
        let bytes = std::fs::read(source).map_err(EngineError::io(source))?;
        Ok(BeatmapFile::from_bytes(source, &bytes)?)
    }

    fn probe(&self) -> Result<(), EngineError> {
        self.stretcher.probe().map_err(|err| match err {
            StretchError::Unavailable { program, reason } => {
                EngineError::DependencyUnavailable { program, reason }
            }
            other => EngineError::DependencyUnavailable {
                program: "audio stretcher".to_string(),
                reason: other.to_string(),
            },
        })
    }

    /// Creates a rate-changed copy of the beatmap at `source`.
    ///
    /// # Errors
    ///
    /// In the order they are checked:
    /// - [`EngineError::InvalidRate`] for rates outside `0.1..=5.0`,
    /// - [`EngineError::Io`] / [`EngineError::MalformedDocument`] when the source cannot be
    ///   read,
    /// - [`EngineError::DependencyUnavailable`] when the stretcher cannot run,
    /// - [`EngineError::MissingAudio`] / [`EngineError::WouldOverwriteSource`],
    /// - stretch failures, then beatmap write failures.
    ///
    /// No file is written before the stretcher runs.
    pub fn apply_rate(
        &self,
        source: impl AsRef<Path>,
        request: &RateRequest,
        progress: Option<&Sender<Progress>>,
    ) -> Result<RateOutput, EngineError> {
        validate_rate(request.rate)?;
        let file = Self::load(source.as_ref())?;
        self.probe()?;
        self.produce(&file, request, progress)
    }

    fn produce(
        &self,
        source: &BeatmapFile,
        request: &RateRequest,
        progress: Option<&Sender<Progress>>,
    ) -> Result<RateOutput, EngineError> {
        let rate = request.rate;
        notify(progress, Progress::Started { rate });
        let result = self.produce_inner(source, request, progress);
        if let Err(err) = &result {
            log::warn!("rate {rate} of {} failed: {err}", source.path.display());
            notify(
                progress,
                Progress::Failed {
                    rate,
                    message: err.to_string(),
                },
            );
        }
        result
    }

    fn produce_inner(
        &self,
        source: &BeatmapFile,
        request: &RateRequest,
        progress: Option<&Sender<Progress>>,
    ) -> Result<RateOutput, EngineError> {
        let rate = validate_rate(request.rate)?;
        let template = request.template.as_deref().unwrap_or(&self.config.template);
        let RatedDocument {
            mut document,
            display_name,
            warnings,
        } = rate_document(&source.document, request, template)?;

        let source_dir = source.directory();
        let audio_name = source
            .document
            .audio_filename()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| EngineError::MissingAudio(source_dir.to_path_buf()))?;
        let input_audio = source_dir.join(audio_name);
        if !input_audio.is_file() {
            return Err(EngineError::MissingAudio(input_audio));
        }

        let output_dir = self.config.output_dir.as_deref().unwrap_or(source_dir);
        let beatmap_path = output_dir.join(beatmap_file_name(&document));
        if canonical_target(&beatmap_path) == canonical_target(&source.path) {
            return Err(EngineError::WouldOverwriteSource(beatmap_path));
        }
        let output_audio_name = rated_audio_name(audio_name, rate, request.preserve_pitch);
        let audio_path = output_dir.join(&output_audio_name);
        document.set("General", "AudioFilename", output_audio_name);
        std::fs::create_dir_all(output_dir).map_err(EngineError::io(output_dir))?;

        let audio_reused = self.config.reuse_existing_audio && audio_path.is_file();
        if audio_reused {
            log::info!("reusing {}", audio_path.display());
        } else {
            self.stretcher
                .stretch(&StretchRequest {
                    input: &input_audio,
                    output: &audio_path,
                    rate,
                    preserve_pitch: request.preserve_pitch,
                })
                .map_err(|err| EngineError::from_stretch(err, &audio_path))?;
        }
        notify(
            progress,
            Progress::AudioReady {
                rate,
                path: audio_path.clone(),
                reused: audio_reused,
            },
        );

        let text = document.to_osu_string();
        if beatmap_path.exists() {
            log::info!("replacing earlier output {}", beatmap_path.display());
        }
        if let Err(source) = write_atomic(&beatmap_path, text.as_bytes()) {
            if !audio_reused {
                let _ = std::fs::remove_file(&audio_path);
            }
            return Err(EngineError::Io {
                path: beatmap_path,
                source,
            });
        }
        log::info!("wrote {}", beatmap_path.display());
        notify(
            progress,
            Progress::Finished {
                rate,
                path: beatmap_path.clone(),
            },
        );

        Ok(RateOutput {
            beatmap_path,
            audio_path,
            audio_reused,
            display_name,
            hash: ContentHash::of_bytes(text.as_bytes()),
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(
            sanitize_file_name("a/b: c? \"d\" <e> |f|."),
            "ab c d e f"
        );
        assert_eq!(rated_audio_name("audio.mp3", 1.5, true), "audio_1.5x.mp3");
        assert_eq!(rated_audio_name("audio.ogg", 1.0, false), "audio_1.0x_nc.ogg");
    }

    #[test]
    fn names_always_carry_rate_and_pitch_mode() {
        assert_eq!(distinct_name("Hard".into(), 1.5, true), "Hard 1.5x");
        assert_eq!(distinct_name("Hard 1.5x (180bpm)".into(), 1.5, true), "Hard 1.5x (180bpm)");
        assert_eq!(distinct_name("Hard (1.5x)".into(), 1.5, false), "Hard (1.5x) NC");
        assert_eq!(distinct_name("Hard 11.5x".into(), 1.5, true), "Hard 11.5x 1.5x");
        assert_eq!(distinct_name("NC Hard 1.2x".into(), 1.2, false), "NC Hard 1.2x");
        assert_eq!(distinct_name(String::new(), 2.0, true), "2.0x");
    }

    #[test]
    fn request_defaults() {
        let request = RateRequest::new(1.2);
        assert!(request.preserve_pitch);
        assert_eq!(request.template, None);
    }
}
