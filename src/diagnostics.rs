//! Fancy diagnostics support using `ariadne`.
//!
//! Warnings and errors of this crate carry 1-based line numbers. This module turns them into
//! byte ranges of the source text and renders them as `ariadne::Report`s.
//!
//! # Usage Example
//!
//! ```rust
//! # #[cfg(feature = "diagnostics")]
//! # {
//! use mania_rate::{diagnostics::emit_line_warnings, document::BeatmapDocument};
//!
//! let source = "osu file format v14\n\n[General]\nMode: 3\n[Metadata]\nTitle:Song\n\
//!               [Difficulty]\nCircleSize:4\n[HitObjects]\n64,192,oops,1,0,0:0:0:0:\n";
//! let output = BeatmapDocument::parse(source).unwrap();
//!
//! emit_line_warnings("song.osu", source, &output.warnings);
//! # }
//! ```

use std::ops::Range;

use ariadne::{Color, Label, Report, ReportKind, Source};

use crate::document::{DocumentError, LineWarning, LineWarningKind};

/// Simple source container that holds the filename and source text.
pub struct SimpleSource<'a> {
    name: &'a str,
    text: &'a str,
}

impl<'a> SimpleSource<'a> {
    /// Create a new source container instance.
    #[must_use]
    pub const fn new(name: &'a str, text: &'a str) -> Self {
        Self { name, text }
    }

    /// Get source text content.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// Get source file name.
    #[must_use]
    pub const fn name(&self) -> &'a str {
        self.name
    }

    /// Byte range of the 1-based `line`, without its line terminator. Lines past the end map
    /// to an empty range at the end of the text.
    #[must_use]
    pub fn line_range(&self, line: usize) -> Range<usize> {
        let mut start = 0;
        for (index, text) in self.text.split_inclusive('\n').enumerate() {
            if index + 1 == line {
                let content = text.trim_end_matches(['\n', '\r']);
                return start..start + content.len();
            }
            start += text.len();
        }
        self.text.len()..self.text.len()
    }
}

/// Trait for converting line-tagged errors to `ariadne::Report`.
pub trait ToAriadne {
    /// Convert error to ariadne Report.
    fn to_report<'a>(&self, src: &SimpleSource<'a>) -> Report<'a, (String, Range<usize>)>;
}

/// Helper to build a styled ariadne `Report` consistently.
#[must_use]
pub fn build_report<'a>(
    src: &SimpleSource<'a>,
    kind: ReportKind<'a>,
    range: Range<usize>,
    title: &str,
    label_message: impl ToString,
    color: Color,
) -> Report<'a, (String, Range<usize>)> {
    let filename = src.name().to_string();
    Report::build(kind, (filename.clone(), range.clone()))
        .with_message(title)
        .with_label(
            Label::new((filename, range))
                .with_message(label_message.to_string())
                .with_color(color),
        )
        .finish()
}

impl ToAriadne for LineWarning {
    fn to_report<'a>(&self, src: &SimpleSource<'a>) -> Report<'a, (String, Range<usize>)> {
        let title = match self.kind {
            LineWarningKind::NotKeyValue => "Stray line",
            LineWarningKind::UnparseableHitObject(_) => "Skipped hit object",
            LineWarningKind::UnparseableTimingPoint(_) => "Skipped timing point",
        };
        build_report(
            src,
            ReportKind::Warning,
            src.line_range(self.line),
            title,
            &self.kind,
            Color::Yellow,
        )
    }
}

impl ToAriadne for DocumentError {
    fn to_report<'a>(&self, src: &SimpleSource<'a>) -> Report<'a, (String, Range<usize>)> {
        let Self::Malformed { line, reason } = self;
        build_report(
            src,
            ReportKind::Error,
            src.line_range(*line),
            "Not a beatmap",
            reason,
            Color::Red,
        )
    }
}

/// Renders every warning to stderr.
pub fn emit_line_warnings<'a>(
    name: &'a str,
    source: &'a str,
    warnings: impl IntoIterator<Item = &'a LineWarning>,
) {
    let simple = SimpleSource::new(name, source);
    let ariadne_source = Source::from(source);
    for warning in warnings {
        let report = warning.to_report(&simple);
        let _ = report.eprint((name.to_string(), ariadne_source.clone()));
    }
}

/// Builds the reports for `warnings` without printing them.
#[must_use]
pub fn collect_line_reports<'a>(
    name: &'a str,
    source: &'a str,
    warnings: impl IntoIterator<Item = &'a LineWarning>,
) -> Vec<Report<'a, (String, Range<usize>)>> {
    let simple = SimpleSource::new(name, source);
    warnings
        .into_iter()
        .map(|warning| warning.to_report(&simple))
        .collect()
}
