//! Scroll-velocity normalization.
//!
//! In osu!mania the scroll speed follows the tempo, so a map with tempo changes scrolls faster
//! or slower in places. Normalizing inserts an inherited point at every tempo change whose
//! multiplier brings the visual speed back to that of the dominant tempo.

use crate::timing::{
    TempoSegment, TimingPoint, dominant_bpm, round_bpm, sort_timing_points, sv_to_beat_length,
    tempo_segments,
};

/// Times closer than this are treated as equal.
const SAME_TIME_MS: f64 = 1e-6;

/// Options of [`normalize_scroll_velocity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalizeOptions {
    /// Scale existing scroll-velocity changes by their segment's correction so that relative
    /// speed changes survive. When `false` they are kept as written.
    pub preserve_relative_sv: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            preserve_relative_sv: true,
        }
    }
}

/// Output of [`normalize_scroll_velocity`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct NormalizeOutput {
    /// The new point set, sorted.
    pub points: Vec<TimingPoint>,
    /// Inherited points replaced by a corrective point at the same time.
    pub removed_inherited: usize,
    /// Tempo every segment was normalized to, rounded to one decimal.
    pub dominant_bpm: Option<f64>,
}

fn same_time(a: f64, b: f64) -> bool {
    (a - b).abs() < SAME_TIME_MS
}

fn segment_at(segments: &[TempoSegment], time: f64) -> Option<&TempoSegment> {
    segments
        .iter()
        .rev()
        .find(|segment| segment.start <= time + SAME_TIME_MS)
        .or_else(|| segments.first())
}

/// Equalizes scroll speed across tempo changes.
///
/// `map_end` is the last hit-object end time, which bounds the final tempo segment.
///
/// Segment durations weigh each rounded tempo; the one covering the most time is dominant.
/// Every segment then gets an inherited point at its start with multiplier
/// `dominant / segment_bpm`, replacing inherited points already at that time. Maps with at most
/// one tempo point are returned unchanged.
pub fn normalize_scroll_velocity(
    points: &[TimingPoint],
    map_end: Option<f64>,
    options: NormalizeOptions,
) -> NormalizeOutput {
    let mut sorted = points.to_vec();
    sort_timing_points(&mut sorted);
    let segments = tempo_segments(&sorted, map_end);

    let dominant = match (segments.len(), dominant_bpm(&segments)) {
        (2.., Some(dominant)) => dominant,
        _ => {
            return NormalizeOutput {
                points: points.to_vec(),
                removed_inherited: 0,
                dominant_bpm: segments.first().map(|segment| round_bpm(segment.bpm)),
            };
        }
    };

    let mut output = Vec::with_capacity(sorted.len() + segments.len());
    for point in &sorted {
        if point.uninherited {
            output.push(*point);
            continue;
        }
        if segments.iter().any(|s| same_time(s.start, point.time)) {
            continue;
        }
        let mut kept = *point;
        if options.preserve_relative_sv
            && let (Some(sv), Some(segment)) = (point.sv_multiplier(), segment_at(&segments, point.time))
        {
            kept.beat_length = sv_to_beat_length(sv * dominant / segment.bpm);
        }
        output.push(kept);
    }

    let mut removed_inherited = 0;
    for segment in &segments {
        let superseded = sorted
            .iter()
            .filter(|p| !p.uninherited && same_time(p.time, segment.start))
            .collect::<Vec<_>>();
        removed_inherited += superseded.len();
        let effective = superseded.last().copied();

        let correction = dominant / segment.bpm;
        let multiplier = match effective.and_then(TimingPoint::sv_multiplier) {
            Some(sv) if options.preserve_relative_sv => sv * correction,
            _ => correction,
        };
        let template = effective.or_else(|| {
            sorted
                .iter()
                .find(|p| p.uninherited && same_time(p.time, segment.start))
        });
        let corrective = match template {
            Some(template) => TimingPoint {
                time: segment.start,
                beat_length: sv_to_beat_length(multiplier),
                uninherited: false,
                ..*template
            },
            None => TimingPoint::inherited(segment.start, multiplier),
        };
        output.push(corrective);
    }
    sort_timing_points(&mut output);
    log::debug!(
        "normalized {} tempo segment(s) to {dominant} BPM, replaced {removed_inherited} inherited point(s)",
        segments.len()
    );

    NormalizeOutput {
        points: output,
        removed_inherited,
        dominant_bpm: Some(dominant),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slows_down_the_faster_segment() {
        let points = [
            TimingPoint::from_bpm(0.0, 120.0),
            TimingPoint::from_bpm(10_000.0, 240.0),
        ];
        let output = normalize_scroll_velocity(&points, Some(12_000.0), NormalizeOptions::default());
        assert_eq!(output.dominant_bpm, Some(120.0));
        let inherited: Vec<_> = output
            .points
            .iter()
            .filter_map(|p| Some((p.time, p.sv_multiplier()?)))
            .collect();
        assert_eq!(inherited, vec![(0.0, 1.0), (10_000.0, 0.5)]);
    }

    #[test]
    fn supersedes_existing_point() {
        let points = [
            TimingPoint::from_bpm(0.0, 150.0),
            TimingPoint::from_bpm(1000.0, 300.0),
            TimingPoint::inherited(1000.0, 2.0),
            TimingPoint::inherited(1500.0, 2.0),
        ];
        let output = normalize_scroll_velocity(&points, Some(2000.0), NormalizeOptions::default());
        assert_eq!(output.removed_inherited, 1);
        assert_eq!(output.dominant_bpm, Some(150.0));
        let inherited: Vec<_> = output
            .points
            .iter()
            .filter_map(|p| Some((p.time, p.sv_multiplier()?)))
            .collect();
        assert_eq!(inherited, vec![(0.0, 1.0), (1000.0, 1.0), (1500.0, 1.0)]);
    }
}
