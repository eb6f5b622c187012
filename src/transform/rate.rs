//! Speed change of a map's timeline by a rate factor.
//!
//! Playing at rate `r` divides every time by `r`. Scaled times are floored to whole
//! milliseconds; a tiny guard keeps values such as `4500 / 1.5` from landing one millisecond
//! low because of binary representation.

use itertools::Itertools;
use thiserror::Error;

use crate::{
    document::{BeatmapDocument, LineWarning, SectionBody},
    hit_object::{HitObject, HitObjectKind},
    timing::TimingPoint,
};

/// Slowest supported rate.
pub const MIN_RATE: f64 = 0.1;
/// Fastest supported rate.
pub const MAX_RATE: f64 = 5.0;

const FLOOR_GUARD: f64 = 1e-6;

/// A rate outside `MIN_RATE..=MAX_RATE`.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("rate {0} is outside {MIN_RATE}..={MAX_RATE}")]
pub struct InvalidRate(pub f64);

/// Checks that `rate` is finite and within [`MIN_RATE`]`..=`[`MAX_RATE`].
///
/// # Errors
///
/// [`InvalidRate`] otherwise.
pub fn validate_rate(rate: f64) -> Result<f64, InvalidRate> {
    if rate.is_finite() && (MIN_RATE..=MAX_RATE).contains(&rate) {
        Ok(rate)
    } else {
        Err(InvalidRate(rate))
    }
}

/// `floor(time / rate)`, guarded against representation error.
#[must_use]
pub fn scale_time(time: f64, rate: f64) -> f64 {
    (time / rate + FLOOR_GUARD).floor()
}

/// [`scale_time`] on integer milliseconds.
#[must_use]
pub fn scale_ms(time: i32, rate: f64) -> i32 {
    scale_time(f64::from(time), rate) as i32
}

/// Scales point times and uninherited beat lengths. Inherited beat lengths are kept, because
/// scroll velocity is relative to the (already scaled) tempo.
#[must_use]
pub fn scale_timing_points(points: &[TimingPoint], rate: f64) -> Vec<TimingPoint> {
    points
        .iter()
        .map(|point| TimingPoint {
            time: scale_time(point.time, rate),
            beat_length: if point.uninherited {
                point.beat_length / rate
            } else {
                point.beat_length
            },
            ..*point
        })
        .collect()
}

/// Scales start and end times. A hold that collapses onto its start keeps one millisecond of
/// length.
#[must_use]
pub fn scale_hit_objects(objects: &[HitObject], rate: f64) -> Vec<HitObject> {
    objects
        .iter()
        .map(|object| {
            let time = scale_ms(object.time, rate);
            let kind = match object.kind {
                HitObjectKind::Circle => HitObjectKind::Circle,
                HitObjectKind::Hold { end_time } => HitObjectKind::Hold {
                    end_time: scale_ms(end_time, rate).max(time + 1),
                },
            };
            HitObject {
                time,
                kind,
                ..object.clone()
            }
        })
        .collect()
}

fn scale_field(field: &str, rate: f64) -> Option<String> {
    let value = field.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(format!("{}", scale_time(value, rate)))
}

/// Scales the times inside one `[Events]` line.
///
/// Handles break periods (`2`/`Break`, start and end), videos and backgrounds (`1`/`Video`,
/// `0`, start offset) and audio samples (`5`/`Sample`, time). Other lines, including storyboard
/// commands, are returned unchanged.
#[must_use]
pub fn scale_event_line(line: &str, rate: f64) -> String {
    let mut fields = line.split(',').map(str::to_string).collect_vec();
    let scaled_fields: &[usize] = match fields.first().map(|f| f.trim()) {
        Some("2" | "Break") => &[1, 2],
        Some("0" | "1" | "Video" | "5" | "Sample") => &[1],
        _ => &[],
    };
    for &index in scaled_fields {
        if let Some(field) = fields.get_mut(index)
            && let Some(scaled) = scale_field(field, rate)
        {
            *field = scaled;
        }
    }
    fields.join(",")
}

/// Scales a comma-separated `Bookmarks` value. Unparseable entries are kept.
#[must_use]
pub fn scale_bookmarks(value: &str, rate: f64) -> String {
    value
        .split(',')
        .map(|entry| scale_field(entry, rate).unwrap_or_else(|| entry.to_string()))
        .join(",")
}

/// A document with its timeline scaled.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct ScaledDocument {
    /// The scaled copy.
    pub document: BeatmapDocument,
    /// Timing-point and hit-object lines that could not be parsed and were dropped.
    pub warnings: Vec<LineWarning>,
}

/// Returns a copy of `document` with every temporal field divided by `rate`.
///
/// Scales timing points, hit objects, `PreviewTime` (unless unset), editor `Bookmarks` and
/// the times in `[Events]`. Non-temporal fields are untouched.
///
/// # Errors
///
/// [`InvalidRate`] when `rate` is outside [`MIN_RATE`]`..=`[`MAX_RATE`].
pub fn scale_document(document: &BeatmapDocument, rate: f64) -> Result<ScaledDocument, InvalidRate> {
    let rate = validate_rate(rate)?;
    let mut scaled = document.clone();

    let timing = document.timing_points();
    let objects = document.hit_objects();
    let mut warnings = timing.warnings;
    warnings.extend(objects.warnings);
    scaled.set_timing_points(&scale_timing_points(&timing.points, rate));
    scaled.set_hit_objects(&scale_hit_objects(&objects.objects, rate));

    if let Some(preview) = document.preview_time().filter(|&t| t >= 0) {
        scaled.set("General", "PreviewTime", scale_ms(preview, rate).to_string());
    }
    if let Some(bookmarks) = document.get("Editor", "Bookmarks") {
        scaled.set("Editor", "Bookmarks", scale_bookmarks(bookmarks, rate));
    }
    if let Some(events) = document.raw_lines("Events") {
        let events = events
            .iter()
            .map(|line| scale_event_line(line, rate))
            .collect_vec();
        if let Some(section) = scaled.section_mut("Events") {
            section.body = SectionBody::RawLines(events);
        }
    }
    Ok(ScaledDocument {
        document: scaled,
        warnings,
    })
}
