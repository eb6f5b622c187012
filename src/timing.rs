//! Timing points and the tempo segments they define.
//!
//! A `[TimingPoints]` line reads
//! `time,beatLength,meter,sampleSet,sampleIndex,volume,uninherited,effects`.
//! Uninherited points set the tempo; inherited points (negative beat length) set a
//! scroll-velocity multiplier until the next point.

pub mod beat;

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::document::{LineWarning, LineWarningKind};

/// Milliseconds in a minute, relating beat length and BPM.
pub const MS_PER_MINUTE: f64 = 60_000.0;

/// Duration given to the last tempo segment when the map has no notes after it.
pub const FALLBACK_SEGMENT_MS: f64 = 60_000.0;

/// Effect bits of a timing point. Unknown bits are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Effects(pub u32);

impl Effects {
    /// Kiai time.
    pub const KIAI: u32 = 1;
    /// Omit the first bar line (taiko and mania).
    pub const OMIT_FIRST_BARLINE: u32 = 1 << 3;

    /// Whether kiai time is on.
    #[must_use]
    pub const fn kiai(self) -> bool {
        self.0 & Self::KIAI != 0
    }

    /// Whether the first bar line is omitted.
    #[must_use]
    pub const fn omit_first_barline(self) -> bool {
        self.0 & Self::OMIT_FIRST_BARLINE != 0
    }
}

/// Why a timing-point line was rejected.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TimingPointError {
    /// Fewer than the two required fields.
    #[error("expected at least 2 fields, found {0}")]
    TooFewFields(usize),
    /// A field is not a finite number.
    #[error("field `{field}` is not a number: `{value}`")]
    InvalidNumber {
        /// Name of the field.
        field: &'static str,
        /// Its text.
        value: String,
    },
    /// A zero beat length, which defines neither a tempo nor a velocity.
    #[error("beat length is zero")]
    ZeroBeatLength,
}

/// A line of `[TimingPoints]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingPoint {
    /// Start time in milliseconds.
    pub time: f64,
    /// Beat duration in milliseconds when uninherited; `-100 / multiplier` when inherited.
    pub beat_length: f64,
    /// Beats per measure.
    pub meter: i32,
    /// Default sample set.
    pub sample_set: i32,
    /// Custom sample index.
    pub sample_index: i32,
    /// Volume percentage.
    pub volume: i32,
    /// Whether this point sets the tempo.
    pub uninherited: bool,
    /// Effect bits.
    pub effects: Effects,
}

impl TimingPoint {
    /// A tempo point with the default meter 4, sample set 0 and volume 100.
    #[must_use]
    pub const fn uninherited(time: f64, beat_length: f64) -> Self {
        Self {
            time,
            beat_length,
            meter: 4,
            sample_set: 0,
            sample_index: 0,
            volume: 100,
            uninherited: true,
            effects: Effects(0),
        }
    }

    /// A scroll-velocity point.
    #[must_use]
    pub fn inherited(time: f64, multiplier: f64) -> Self {
        Self {
            beat_length: sv_to_beat_length(multiplier),
            uninherited: false,
            ..Self::uninherited(time, 0.0)
        }
    }

    /// A tempo point at `bpm`.
    #[must_use]
    pub fn from_bpm(time: f64, bpm: f64) -> Self {
        Self::uninherited(time, MS_PER_MINUTE / bpm)
    }

    /// Tempo of an uninherited point.
    #[must_use]
    pub fn bpm(&self) -> Option<f64> {
        (self.uninherited && self.beat_length > 0.0).then(|| MS_PER_MINUTE / self.beat_length)
    }

    /// Scroll-velocity multiplier of an inherited point.
    #[must_use]
    pub fn sv_multiplier(&self) -> Option<f64> {
        (!self.uninherited && self.beat_length < 0.0).then(|| -100.0 / self.beat_length)
    }

    /// Parses one line. Missing trailing fields take the defaults of old format versions.
    ///
    /// # Errors
    ///
    /// Returns [`TimingPointError`] when a field is not numeric, fewer than two fields are
    /// present, or the beat length is zero.
    pub fn try_parse(line: &str) -> Result<Self, TimingPointError> {
        let fields = line.trim().split(',').map(str::trim).collect_vec();
        if fields.len() < 2 {
            return Err(TimingPointError::TooFewFields(fields.len()));
        }
        let float = |index: usize, field: &'static str| -> Result<Option<f64>, TimingPointError> {
            fields
                .get(index)
                .map(|value| {
                    value
                        .parse::<f64>()
                        .ok()
                        .filter(|v| v.is_finite())
                        .ok_or_else(|| TimingPointError::InvalidNumber {
                            field,
                            value: (*value).to_string(),
                        })
                })
                .transpose()
        };
        let int = |index: usize, field: &'static str, default: i32| {
            float(index, field).map(|v| v.map_or(default, |v| v as i32))
        };

        let time = float(0, "time")?.unwrap_or_default();
        let beat_length = float(1, "beatLength")?.unwrap_or_default();
        if beat_length == 0.0 {
            return Err(TimingPointError::ZeroBeatLength);
        }
        Ok(Self {
            time,
            beat_length,
            meter: int(2, "meter", 4)?,
            sample_set: int(3, "sampleSet", 0)?,
            sample_index: int(4, "sampleIndex", 0)?,
            volume: int(5, "volume", 100)?,
            uninherited: int(6, "uninherited", i32::from(beat_length > 0.0))? != 0,
            effects: Effects(int(7, "effects", 0)? as u32),
        })
    }

    /// Serializes to a full eight-field `[TimingPoints]` line.
    #[must_use]
    pub fn to_osu_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TimingPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{}",
            self.time,
            self.beat_length,
            self.meter,
            self.sample_set,
            self.sample_index,
            self.volume,
            u8::from(self.uninherited),
            self.effects.0
        )
    }
}

/// Beat length that encodes a scroll-velocity multiplier.
#[must_use]
pub fn sv_to_beat_length(multiplier: f64) -> f64 {
    -100.0 / multiplier
}

/// Rounds a BPM to one decimal.
#[must_use]
pub fn round_bpm(bpm: f64) -> f64 {
    (bpm * 10.0).round() / 10.0
}

/// Output of [`parse_timing_points`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[must_use]
pub struct TimingPointsOutput {
    /// Parsed points, stably sorted by [`sort_timing_points`].
    pub points: Vec<TimingPoint>,
    /// Lines that were skipped. Line numbers count from 1 at the first given line.
    pub warnings: Vec<LineWarning>,
}

/// Parses the lines of a `[TimingPoints]` section.
pub fn parse_timing_points<S: AsRef<str>>(lines: &[S]) -> TimingPointsOutput {
    let mut output = TimingPointsOutput::default();
    for (index, line) in lines.iter().map(AsRef::as_ref).enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        match TimingPoint::try_parse(line) {
            Ok(point) => output.points.push(point),
            Err(err) => {
                let warning = LineWarning {
                    section: "TimingPoints".to_string(),
                    line: index + 1,
                    content: line.to_string(),
                    kind: LineWarningKind::UnparseableTimingPoint(err),
                };
                log::warn!("{warning}");
                output.warnings.push(warning);
            }
        }
    }
    sort_timing_points(&mut output.points);
    output
}

/// Stable sort by time, uninherited before inherited at equal times.
pub fn sort_timing_points(points: &mut [TimingPoint]) {
    points.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then_with(|| b.uninherited.cmp(&a.uninherited))
    });
}

/// A stretch of the map played at one tempo.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TempoSegment {
    /// Start time in milliseconds.
    pub start: f64,
    /// End time in milliseconds.
    pub end: f64,
    /// Tempo of the segment.
    pub bpm: f64,
}

impl TempoSegment {
    /// Length in milliseconds, never negative.
    #[must_use]
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Splits the map into tempo segments.
///
/// Each uninherited point starts a segment that lasts until the next one. The final segment
/// ends at `map_end` (usually the last hit-object end time), or after
/// [`FALLBACK_SEGMENT_MS`] when `map_end` is absent or not after the final start.
#[must_use]
pub fn tempo_segments(points: &[TimingPoint], map_end: Option<f64>) -> Vec<TempoSegment> {
    let mut tempo_points = points
        .iter()
        .filter_map(|point| Some((point.time, point.bpm()?)))
        .collect_vec();
    tempo_points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut segments = tempo_points
        .iter()
        .tuple_windows()
        .map(|(&(start, bpm), &(end, _))| TempoSegment { start, end, bpm })
        .collect_vec();
    if let Some(&(start, bpm)) = tempo_points.last() {
        let end = map_end
            .filter(|&end| end > start)
            .unwrap_or(start + FALLBACK_SEGMENT_MS);
        segments.push(TempoSegment { start, end, bpm });
    }
    segments
}

/// The rounded BPM covering the most time. Ties go to the tempo met first.
#[must_use]
pub fn dominant_bpm(segments: &[TempoSegment]) -> Option<f64> {
    let mut totals: Vec<(f64, f64)> = Vec::new();
    for segment in segments {
        let bpm = round_bpm(segment.bpm);
        match totals.iter_mut().find(|(known, _)| (*known - bpm).abs() < 1e-9) {
            Some((_, total)) => *total += segment.duration(),
            None => totals.push((bpm, segment.duration())),
        }
    }
    totals
        .into_iter()
        .fold(None, |best: Option<(f64, f64)>, (bpm, total)| match best {
            Some((_, best_total)) if best_total >= total => best,
            _ => Some((bpm, total)),
        })
        .map(|(bpm, _)| bpm)
}

/// Lowest and highest tempo among uninherited points.
#[must_use]
pub fn bpm_range(points: &[TimingPoint]) -> Option<(f64, f64)> {
    points
        .iter()
        .filter_map(TimingPoint::bpm)
        .fold(None, |range, bpm| match range {
            None => Some((bpm, bpm)),
            Some((min, max)) => Some((f64::min(min, bpm), f64::max(max, bpm))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_line() {
        let point = TimingPoint::try_parse("1000.5,-50,4,2,1,60,0,1").unwrap();
        assert_eq!(point.time, 1000.5);
        assert_eq!(point.sv_multiplier(), Some(2.0));
        assert_eq!(point.bpm(), None);
        assert!(point.effects.kiai());
        assert_eq!(point.to_osu_line(), "1000.5,-50,4,2,1,60,0,1");
    }

    #[test]
    fn legacy_two_field_line() {
        let point = TimingPoint::try_parse("0,500").unwrap();
        assert!(point.uninherited);
        assert_eq!(point.bpm(), Some(120.0));
        assert_eq!(point.volume, 100);
    }

    #[test]
    fn dominant_prefers_longest() {
        let points = [TimingPoint::from_bpm(0.0, 120.0), TimingPoint::from_bpm(1000.0, 150.0)];
        let segments = tempo_segments(&points, Some(10_000.0));
        assert_eq!(dominant_bpm(&segments), Some(150.0));
        assert_eq!(bpm_range(&points), Some((120.0, 150.0)));
    }

    #[test]
    fn final_segment_falls_back() {
        let points = [TimingPoint::from_bpm(5000.0, 120.0)];
        let segments = tempo_segments(&points, Some(1000.0));
        assert_eq!(segments[0].end, 5000.0 + FALLBACK_SEGMENT_MS);
    }
}
