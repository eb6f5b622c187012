//! Derived figures of a beatmap: note counts, tempo range, dominant tempo and length.

use crate::{
    document::{BeatmapDocument, LineWarning},
    engine::template::BpmDisplay,
    hit_object::{self, HitObjectSummary},
    timing::{self, TimingPoint},
};

/// A break period from `[Events]`, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakPeriod {
    /// Start time.
    pub start: i32,
    /// End time.
    pub end: i32,
}

/// Reads `2,start,end` and `Break,start,end` lines.
#[must_use]
pub fn break_periods(document: &BeatmapDocument) -> Vec<BreakPeriod> {
    document
        .raw_lines("Events")
        .unwrap_or_default()
        .iter()
        .filter_map(|line| {
            let mut fields = line.split(',').map(str::trim);
            if !matches!(fields.next(), Some("2" | "Break")) {
                return None;
            }
            let start = fields.next()?.parse::<f64>().ok()? as i32;
            let end = fields.next()?.parse::<f64>().ok()? as i32;
            (end > start).then_some(BreakPeriod { start, end })
        })
        .collect()
}

/// Overview of one beatmap.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct BeatmapSummary {
    /// Number of columns.
    pub key_count: Option<u8>,
    /// Note counts and extents.
    pub objects: HitObjectSummary,
    /// Lowest and highest tempo.
    pub bpm_range: Option<(f64, f64)>,
    /// Tempo covering the most time, rounded to one decimal.
    pub dominant_bpm: Option<f64>,
    /// Tempo points.
    pub uninherited_points: usize,
    /// Scroll-velocity points.
    pub inherited_points: usize,
    /// From the first note to the last note end, in milliseconds.
    pub length_ms: Option<i32>,
    /// [`Self::length_ms`] minus break periods.
    pub drain_ms: Option<i32>,
    /// Lines skipped while reading notes and timing points.
    pub warnings: Vec<LineWarning>,
}

impl BeatmapSummary {
    /// Summarizes a document.
    #[must_use]
    pub fn of_document(document: &BeatmapDocument) -> Self {
        let objects = document.hit_objects();
        let timing = document.timing_points();
        let mut summary = Self::of_parts(&objects.objects, &timing.points);
        summary.key_count = document.key_count();
        summary.drain_ms = summary.length_ms.map(|length| {
            let breaks: i32 = break_periods(document)
                .iter()
                .map(|period| period.end - period.start)
                .sum();
            (length - breaks).max(0)
        });
        summary.warnings = objects.warnings;
        summary.warnings.extend(timing.warnings);
        summary
    }

    /// Summarizes already parsed notes and points.
    #[must_use]
    pub fn of_parts(objects: &[hit_object::HitObject], points: &[TimingPoint]) -> Self {
        let objects = hit_object::summary(objects);
        let map_end = objects.last_end_time.map(f64::from);
        let segments = timing::tempo_segments(points, map_end);
        let length_ms = objects
            .first_time
            .zip(objects.last_end_time)
            .map(|(first, last)| last - first);
        Self {
            key_count: None,
            bpm_range: timing::bpm_range(points),
            dominant_bpm: timing::dominant_bpm(&segments),
            uninherited_points: points.iter().filter(|p| p.uninherited).count(),
            inherited_points: points.iter().filter(|p| !p.uninherited).count(),
            length_ms,
            drain_ms: length_ms,
            warnings: Vec::new(),
            objects,
        }
    }

    /// What `[[bpm]]` shows: the dominant tempo, else the tempo range.
    #[must_use]
    pub fn bpm_display(&self) -> Option<BpmDisplay> {
        self.dominant_bpm
            .map(BpmDisplay::Dominant)
            .or_else(|| self.bpm_range.map(|(min, max)| BpmDisplay::Range(min, max)))
    }
}
