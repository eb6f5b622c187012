//! Audio time-stretching through an external program.
//!
//! DSP is not done in this crate. [`AudioStretcher`] is the seam: the default
//! [`CommandStretcher`] runs an ffmpeg-compatible command line, tests substitute their own.

use std::{
    io::Read,
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use itertools::Itertools;
use thiserror::Error;

/// Default program name, resolved through `PATH`.
pub const DEFAULT_PROGRAM: &str = "ffmpeg";

/// Default time limit of one stretch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Sample rate assumed by the pitch-shifting filter.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// `atempo` accepts factors in this range per instance.
const ATEMPO_RANGE: (f64, f64) = (0.5, 2.0);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

const STDERR_TAIL_LINES: usize = 5;

fn tail(text: &str, lines: usize) -> String {
    let all = text.trim().lines().collect_vec();
    all.iter().skip(all.len().saturating_sub(lines)).join("\n")
}

/// What a stretcher should produce.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchRequest<'a> {
    /// Source audio.
    pub input: &'a Path,
    /// Destination audio. Must not exist after a failure.
    pub output: &'a Path,
    /// Speed factor; `1.5` plays one and a half times as fast.
    pub rate: f64,
    /// Keep the pitch (time-stretch) instead of resampling (pitch follows speed).
    pub preserve_pitch: bool,
}

/// Failure of an [`AudioStretcher`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StretchError {
    /// The external program cannot be run.
    #[error("`{program}` is unavailable: {reason}")]
    Unavailable {
        /// Program that was probed.
        program: String,
        /// Why it could not be used.
        reason: String,
    },
    /// The program ran and reported failure.
    #[error("audio stretch failed (exit status {status:?}): {stderr}")]
    Failed {
        /// Exit code, when the process exited normally.
        status: Option<i32>,
        /// Tail of the program's error output.
        stderr: String,
    },
    /// The program exceeded its time limit and was killed.
    #[error("audio stretch timed out after {0:?}")]
    Timeout(Duration),
    /// Spawning the program or handling its files failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Produces rate-changed audio.
pub trait AudioStretcher: Send + Sync {
    /// Checks that the stretcher can run at all. Called before any output is written.
    ///
    /// # Errors
    ///
    /// [`StretchError::Unavailable`] when the backend is missing.
    fn probe(&self) -> Result<(), StretchError>;

    /// Writes `request.output`, leaving no file behind on failure.
    ///
    /// # Errors
    ///
    /// Any [`StretchError`].
    fn stretch(&self, request: &StretchRequest<'_>) -> Result<(), StretchError>;
}

/// Splits `rate` into `atempo` factors that each stay within the filter's accepted range.
#[must_use]
pub fn atempo_chain(rate: f64) -> Vec<f64> {
    let (min, max) = ATEMPO_RANGE;
    let mut factors = Vec::new();
    let mut remaining = rate;
    while remaining > max {
        factors.push(max);
        remaining /= max;
    }
    while remaining < min {
        factors.push(min);
        remaining /= min;
    }
    factors.push(remaining);
    factors
}

/// The `-filter:a` argument for a request.
#[must_use]
pub fn filter_graph(rate: f64, preserve_pitch: bool, sample_rate: u32) -> String {
    if preserve_pitch {
        atempo_chain(rate)
            .into_iter()
            .map(|factor| format!("atempo={factor}"))
            .join(",")
    } else {
        let shifted = (f64::from(sample_rate) * rate).round() as u64;
        format!("asetrate={shifted},aresample={sample_rate}")
    }
}

/// Runs an ffmpeg-compatible program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandStretcher {
    program: PathBuf,
    timeout: Duration,
    sample_rate: u32,
}

impl Default for CommandStretcher {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl CommandStretcher {
    /// Uses `program` with the default timeout and sample rate.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Sets the time limit of one stretch.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the sample rate assumed by pitch-shifting.
    #[must_use]
    pub const fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// The program that is run.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn unavailable(&self, reason: impl ToString) -> StretchError {
        StretchError::Unavailable {
            program: self.program.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn wait(&self, child: &mut Child) -> Result<std::process::ExitStatus, StretchError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(StretchError::Timeout(self.timeout));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// `name.partial.ext` next to `output`, so the program still infers the format from the
/// extension.
fn partial_path(output: &Path) -> PathBuf {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    let name = match output.extension() {
        Some(ext) => format!("{stem}.partial.{}", ext.to_string_lossy()),
        None => format!("{stem}.partial"),
    };
    output.with_file_name(name)
}

impl AudioStretcher for CommandStretcher {
    fn probe(&self) -> Result<(), StretchError> {
        let status = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|err| self.unavailable(err))?;
        if status.success() {
            Ok(())
        } else {
            Err(self.unavailable(format!("`-version` exited with {status}")))
        }
    }

    fn stretch(&self, request: &StretchRequest<'_>) -> Result<(), StretchError> {
        let partial = partial_path(request.output);
        let filter = filter_graph(request.rate, request.preserve_pitch, self.sample_rate);
        log::info!(
            "stretching {} -> {} ({filter})",
            request.input.display(),
            request.output.display()
        );
        let mut child = Command::new(&self.program)
            .args(["-y", "-hide_banner", "-loglevel", "error", "-i"])
            .arg(request.input)
            .args(["-vn", "-filter:a", filter.as_str()])
            .arg(&partial)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| self.unavailable(err))?;
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut text = String::new();
                let _ = stderr.read_to_string(&mut text);
                text
            })
        });

        let outcome = self.wait(&mut child).and_then(|status| {
            if status.success() {
                return Ok(());
            }
            let stderr = stderr_reader
                .and_then(|reader| reader.join().ok())
                .unwrap_or_default();
            Err(StretchError::Failed {
                status: status.code(),
                stderr: tail(&stderr, STDERR_TAIL_LINES),
            })
        });
        let outcome = outcome.and_then(|()| std::fs::rename(&partial, request.output).map_err(Into::into));
        if outcome.is_err() {
            let _ = std::fs::remove_file(&partial);
        }
        outcome
    }
}
