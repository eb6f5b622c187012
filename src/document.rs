//! Lossless model of the line-oriented `.osu` text format.
//!
//! Raw [`str`] == [`BeatmapDocument::parse`] ==> [`BeatmapDocument`] (in [`DocumentOutput`])
//! == [`BeatmapDocument::to_osu_string`] ==> [`String`]
//!
//! Only the `General`, `Metadata`, `Difficulty` and `Editor` sections are split into
//! `key:value` entries. Every other section is kept as raw lines, and typed views such as
//! [`BeatmapDocument::hit_objects`] are layered on top without touching lines they do not
//! understand. Re-serializing an unmodified document reproduces the input byte for byte, except
//! that `\r\n` becomes `\n` and the text always ends with a single newline.

pub mod parse;
pub mod unparse;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::{
    hash::ContentHash,
    hit_object::{self, HitObject, HitObjectError, HitObjectsOutput},
    timing::{self, TimingPoint, TimingPointError, TimingPointsOutput},
};

/// Sections whose body is a list of `key:value` entries.
pub const KEY_VALUE_SECTIONS: [&str; 4] = ["General", "Metadata", "Difficulty", "Editor"];

/// Sections a document must have to be accepted.
pub const REQUIRED_SECTIONS: [&str; 3] = ["General", "Metadata", "Difficulty"];

/// Key count assumed when the `CircleSize` field is missing or out of range.
pub const FALLBACK_KEY_COUNT: u8 = 4;

/// Why a document was rejected.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MalformedReason {
    /// A non-blank line that is not the format header appeared before the first section.
    #[error("content before the first section header")]
    ContentBeforeSection,
    /// The text has no `[Section]` header at all.
    #[error("no section header found")]
    NoSections,
    /// One of [`REQUIRED_SECTIONS`] is absent.
    #[error("required section [{0}] is missing")]
    MissingSection(String),
}

/// Fatal error of [`BeatmapDocument::parse`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DocumentError {
    /// The text is not a beatmap document.
    #[error("line {line}: {reason}")]
    Malformed {
        /// 1-based line where the problem was noticed. Document-wide problems point one past
        /// the last line.
        line: usize,
        /// What was wrong.
        reason: MalformedReason,
    },
}

/// What went wrong with a single line.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum LineWarningKind {
    /// A line inside a key/value section has no colon. It is kept as layout.
    #[error("expected a `key:value` entry")]
    NotKeyValue,
    /// A `[HitObjects]` line could not be read and was skipped.
    #[error("unparseable hit object: {0}")]
    UnparseableHitObject(#[from] HitObjectError),
    /// A `[TimingPoints]` line could not be read and was skipped.
    #[error("unparseable timing point: {0}")]
    UnparseableTimingPoint(#[from] TimingPointError),
}

/// A recoverable problem tied to one line of the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[error("[{section}] line {line}: {kind}")]
pub struct LineWarning {
    /// Section the line belongs to.
    pub section: String,
    /// 1-based line number. Relative to the section when the lines were parsed on their own,
    /// absolute when they came through a [`BeatmapDocument`].
    pub line: usize,
    /// The offending line, verbatim.
    pub content: String,
    /// What went wrong.
    pub kind: LineWarningKind,
}

/// A `key:value` entry, keeping the exact separator so that it can be written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyValueEntry {
    /// Key, without the whitespace before the colon.
    pub key: String,
    /// Whitespace around the colon together with the colon itself, e.g. `": "` or `":"`.
    pub separator: String,
    /// Value as written, after the separator.
    pub value: String,
}

impl KeyValueEntry {
    /// Splits `line` at its first colon. Returns `None` when there is no colon or the key is
    /// empty.
    #[must_use]
    pub fn split(line: &str) -> Option<Self> {
        let (raw_key, rest) = line.split_once(':')?;
        let key = raw_key.trim_end();
        if key.trim_start().is_empty() {
            return None;
        }
        let value = rest.trim_start();
        let separator = format!(
            "{}:{}",
            &raw_key[key.len()..],
            &rest[..rest.len() - value.len()]
        );
        Some(Self {
            key: key.to_string(),
            separator,
            value: value.to_string(),
        })
    }

    /// The value with surrounding whitespace removed.
    #[must_use]
    pub fn trimmed_value(&self) -> &str {
        self.value.trim()
    }
}

/// One line of a key/value section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyValueLine {
    /// A `key:value` entry.
    Entry(KeyValueEntry),
    /// A blank line, comment, or any other line kept only for layout.
    Layout(String),
}

/// Body of a section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SectionBody {
    /// Ordered `key:value` entries with layout lines in between.
    KeyValue(Vec<KeyValueLine>),
    /// Unparsed lines.
    RawLines(Vec<String>),
}

/// A named `[Section]` and its body.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Section {
    /// Name between the brackets.
    pub name: String,
    /// The header line as written.
    pub header: String,
    /// 1-based line number of the header in the parsed source, or `0` for sections created
    /// afterwards.
    pub line: usize,
    /// The section body.
    pub body: SectionBody,
}

impl Section {
    /// Creates an empty section, choosing the body kind from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let header = format!("[{name}]");
        let body = if KEY_VALUE_SECTIONS.contains(&name.as_str()) {
            SectionBody::KeyValue(Vec::new())
        } else {
            SectionBody::RawLines(Vec::new())
        };
        Self {
            name,
            header,
            line: 0,
            body,
        }
    }

    /// Whether the body ends with a blank line.
    #[must_use]
    pub fn ends_with_blank(&self) -> bool {
        match &self.body {
            SectionBody::KeyValue(lines) => {
                matches!(lines.last(), Some(KeyValueLine::Layout(line)) if line.trim().is_empty())
            }
            SectionBody::RawLines(lines) => lines.last().is_some_and(|l| l.trim().is_empty()),
        }
    }

    fn push_blank(&mut self) {
        match &mut self.body {
            SectionBody::KeyValue(lines) => lines.push(KeyValueLine::Layout(String::new())),
            SectionBody::RawLines(lines) => lines.push(String::new()),
        }
    }
}

/// A parsed beatmap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BeatmapDocument {
    /// Whether the source started with a UTF-8 byte order mark.
    pub bom: bool,
    /// Version number from the `osu file format vN` header, if present.
    pub format_version: Option<u32>,
    /// Lines before the first section: the format header, blanks and comments.
    pub preamble: Vec<String>,
    /// Sections in source order.
    pub sections: Vec<Section>,
}

/// Output of [`BeatmapDocument::parse`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[must_use]
pub struct DocumentOutput {
    /// The parsed document.
    pub document: BeatmapDocument,
    /// Lines that were kept but not understood.
    pub warnings: Vec<LineWarning>,
}

fn is_layout(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty() || trimmed.starts_with("//")
}

fn insertion_index(len: usize, is_blank: impl Fn(usize) -> bool) -> usize {
    let mut index = len;
    while index > 0 && is_blank(index - 1) {
        index -= 1;
    }
    index
}

impl BeatmapDocument {
    /// First section with the given name.
    #[must_use]
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|section| section.name == name)
    }

    /// First section with the given name, mutably.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|section| section.name == name)
    }

    /// Returns the section, appending an empty one at the end when absent.
    pub fn section_or_insert(&mut self, name: &str) -> &mut Section {
        let position = match self.sections.iter().position(|s| s.name == name) {
            Some(position) => position,
            None => {
                if let Some(last) = self.sections.last_mut()
                    && !last.ends_with_blank()
                {
                    last.push_blank();
                }
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[position]
    }

    fn entries(&self, section: &str) -> impl Iterator<Item = &KeyValueEntry> {
        let lines = match self.section(section).map(|s| &s.body) {
            Some(SectionBody::KeyValue(lines)) => lines.as_slice(),
            _ => &[],
        };
        lines.iter().filter_map(|line| match line {
            KeyValueLine::Entry(entry) => Some(entry),
            KeyValueLine::Layout(_) => None,
        })
    }

    /// Trimmed value of the first `key` entry in a key/value section.
    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.entries(section)
            .find(|entry| entry.key == key)
            .map(KeyValueEntry::trimmed_value)
    }

    /// Parses the value of `key` with [`str::parse`].
    #[must_use]
    pub fn get_parsed<T: std::str::FromStr>(&self, section: &str, key: &str) -> Option<T> {
        self.get(section, key)?.parse().ok()
    }

    /// Sets `key` in a key/value section.
    ///
    /// The first existing entry is overwritten in place. Otherwise a new entry is appended
    /// before the section's trailing blank lines, using the separator style of the section's
    /// first entry. A missing section is created. Sections holding raw lines are left alone.
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let default_separator = if matches!(section, "General" | "Editor") {
            ": "
        } else {
            ":"
        };
        let SectionBody::KeyValue(lines) = &mut self.section_or_insert(section).body else {
            log::warn!("[{section}] holds raw lines; `{key}` was not set");
            return;
        };
        if let Some(entry) = lines.iter_mut().find_map(|line| match line {
            KeyValueLine::Entry(entry) if entry.key == key => Some(entry),
            _ => None,
        }) {
            entry.value = value;
            return;
        }
        let separator = lines
            .iter()
            .find_map(|line| match line {
                KeyValueLine::Entry(entry) => Some(entry.separator.clone()),
                KeyValueLine::Layout(_) => None,
            })
            .unwrap_or_else(|| default_separator.to_string());
        let index = insertion_index(lines.len(), |i| {
            matches!(&lines[i], KeyValueLine::Layout(l) if l.trim().is_empty())
        });
        lines.insert(
            index,
            KeyValueLine::Entry(KeyValueEntry {
                key: key.to_string(),
                separator,
                value,
            }),
        );
    }

    /// Removes every `key` entry from a key/value section, returning the first value.
    pub fn remove(&mut self, section: &str, key: &str) -> Option<String> {
        let Some(SectionBody::KeyValue(lines)) = self.section_mut(section).map(|s| &mut s.body)
        else {
            return None;
        };
        let mut removed = None;
        lines.retain(|line| match line {
            KeyValueLine::Entry(entry) if entry.key == key => {
                if removed.is_none() {
                    removed = Some(entry.value.clone());
                }
                false
            }
            _ => true,
        });
        removed
    }

    /// Lines of a raw section.
    #[must_use]
    pub fn raw_lines(&self, section: &str) -> Option<&[String]> {
        match &self.section(section)?.body {
            SectionBody::RawLines(lines) => Some(lines),
            SectionBody::KeyValue(_) => None,
        }
    }

    /// Replaces the content of a raw section, keeping its trailing blank lines so the layout
    /// between sections survives. A missing section is created.
    pub fn set_raw_lines(&mut self, section: &str, content: Vec<String>) {
        let target = self.section_or_insert(section);
        let SectionBody::RawLines(lines) = &mut target.body else {
            log::warn!("[{section}] holds key/value entries; raw lines were not set");
            return;
        };
        let keep_from = insertion_index(lines.len(), |i| lines[i].trim().is_empty());
        let trailing = lines.split_off(keep_from);
        *lines = content;
        lines.extend(trailing);
    }

    /// `CircleSize`, which is the key count in osu!mania.
    #[must_use]
    pub fn circle_size(&self) -> Option<f64> {
        self.get_parsed("Difficulty", "CircleSize")
    }

    /// Number of columns, when `CircleSize` is a whole number in `1..=18`.
    #[must_use]
    pub fn key_count(&self) -> Option<u8> {
        let size = self.circle_size()?.round();
        (1.0..=f64::from(hit_object::MAX_KEY_COUNT))
            .contains(&size)
            .then_some(size as u8)
    }

    /// `OverallDifficulty`.
    #[must_use]
    pub fn overall_difficulty(&self) -> Option<f64> {
        self.get_parsed("Difficulty", "OverallDifficulty")
    }

    /// `HPDrainRate`.
    #[must_use]
    pub fn hp_drain(&self) -> Option<f64> {
        self.get_parsed("Difficulty", "HPDrainRate")
    }

    /// `ApproachRate`. Mania maps often omit it.
    #[must_use]
    pub fn approach_rate(&self) -> Option<f64> {
        self.get_parsed("Difficulty", "ApproachRate")
    }

    /// `AudioFilename`.
    #[must_use]
    pub fn audio_filename(&self) -> Option<&str> {
        self.get("General", "AudioFilename")
    }

    /// `PreviewTime` in milliseconds; `-1` means unset.
    #[must_use]
    pub fn preview_time(&self) -> Option<i32> {
        self.get_parsed("General", "PreviewTime")
    }

    /// Game mode, `3` for osu!mania.
    #[must_use]
    pub fn mode(&self) -> Option<u8> {
        self.get_parsed("General", "Mode")
    }

    /// `Title`.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.get("Metadata", "Title")
    }

    /// `Artist`.
    #[must_use]
    pub fn artist(&self) -> Option<&str> {
        self.get("Metadata", "Artist")
    }

    /// `Creator`.
    #[must_use]
    pub fn creator(&self) -> Option<&str> {
        self.get("Metadata", "Creator")
    }

    /// `Version`, the difficulty name.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.get("Metadata", "Version")
    }

    /// `BeatmapID`; `0` for unsubmitted maps.
    #[must_use]
    pub fn beatmap_id(&self) -> Option<i64> {
        self.get_parsed("Metadata", "BeatmapID")
    }

    /// Key count used to place hit objects, falling back to [`FALLBACK_KEY_COUNT`].
    #[must_use]
    pub fn effective_key_count(&self) -> u8 {
        self.key_count().unwrap_or_else(|| {
            log::debug!("no usable CircleSize, assuming {FALLBACK_KEY_COUNT} keys");
            FALLBACK_KEY_COUNT
        })
    }

    /// Parses `[HitObjects]`. Warning line numbers are absolute.
    pub fn hit_objects(&self) -> HitObjectsOutput {
        let Some(section) = self.section("HitObjects") else {
            return HitObjectsOutput::default();
        };
        let lines = self.raw_lines("HitObjects").unwrap_or_default();
        let mut output = hit_object::parse_hit_objects(lines, self.effective_key_count());
        for warning in &mut output.warnings {
            warning.line += section.line;
        }
        output
    }

    /// Replaces `[HitObjects]` with the serialized objects.
    pub fn set_hit_objects(&mut self, objects: &[HitObject]) {
        let key_count = self.effective_key_count();
        let lines = objects
            .iter()
            .map(|object| object.to_osu_line(key_count))
            .collect();
        self.set_raw_lines("HitObjects", lines);
    }

    /// Parses `[TimingPoints]`. Warning line numbers are absolute.
    pub fn timing_points(&self) -> TimingPointsOutput {
        let Some(section) = self.section("TimingPoints") else {
            return TimingPointsOutput::default();
        };
        let lines = self.raw_lines("TimingPoints").unwrap_or_default();
        let mut output = timing::parse_timing_points(lines);
        for warning in &mut output.warnings {
            warning.line += section.line;
        }
        output
    }

    /// Replaces `[TimingPoints]` with the serialized points.
    pub fn set_timing_points(&mut self, points: &[TimingPoint]) {
        let lines = points.iter().map(TimingPoint::to_osu_line).collect();
        self.set_raw_lines("TimingPoints", lines);
    }
}

/// A document together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeatmapFile {
    /// Path the document was read from.
    pub path: PathBuf,
    /// Hash of the raw file bytes, the identity osu! uses for the map.
    pub hash: ContentHash,
    /// The parsed document.
    pub document: BeatmapDocument,
    /// Recoverable problems met while parsing.
    pub warnings: Vec<LineWarning>,
}

impl BeatmapFile {
    /// Reads and parses a `.osu` file.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Io`] when the file cannot be read.
    /// - [`crate::Error::MalformedDocument`] when the text is not a beatmap.
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| crate::Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(path, &bytes)?)
    }

    /// Parses already loaded bytes. Invalid UTF-8 is replaced rather than rejected.
    ///
    /// # Errors
    ///
    /// [`DocumentError`] when the text is not a beatmap.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self, DocumentError> {
        let text = String::from_utf8_lossy(bytes);
        let DocumentOutput { document, warnings } = BeatmapDocument::parse(&text)?;
        for warning in &warnings {
            log::warn!("{warning}");
        }
        Ok(Self {
            path: path.into(),
            hash: ContentHash::of_bytes(bytes),
            document,
            warnings,
        })
    }

    /// Directory holding the beatmap and its audio.
    #[must_use]
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }
}
