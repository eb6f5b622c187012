//! Shifting a map in time.

use crate::{
    document::{BeatmapDocument, LineWarning},
    hit_object::{HitObject, HitObjectKind},
    timing::TimingPoint,
};

/// What [`apply_offset_to_document`] moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OffsetScope {
    /// Only timing points move, re-aligning the beat grid under the existing notes.
    #[default]
    TimingOnly,
    /// Timing points and hit objects move together, as when the audio gained leading silence.
    TimingAndNotes,
}

/// Adds `offset_ms` to the time of every timing point.
///
/// Integer offsets are exact on `f64` times, so applying `-offset_ms` afterwards restores the
/// input.
#[must_use]
pub fn apply_offset(points: &[TimingPoint], offset_ms: i32) -> Vec<TimingPoint> {
    let offset = f64::from(offset_ms);
    points
        .iter()
        .map(|point| TimingPoint {
            time: point.time + offset,
            ..*point
        })
        .collect()
}

/// Adds `offset_ms` to the start and end times of every hit object.
#[must_use]
pub fn shift_hit_objects(objects: &[HitObject], offset_ms: i32) -> Vec<HitObject> {
    objects
        .iter()
        .map(|object| HitObject {
            time: object.time.saturating_add(offset_ms),
            kind: match object.kind {
                HitObjectKind::Circle => HitObjectKind::Circle,
                HitObjectKind::Hold { end_time } => HitObjectKind::Hold {
                    end_time: end_time.saturating_add(offset_ms),
                },
            },
            ..object.clone()
        })
        .collect()
}

/// Shifts a document's timing points, and its hit objects when `scope` says so.
///
/// The rewritten sections are regenerated from the parsed values; lines that could not be
/// parsed are dropped and returned as warnings.
pub fn apply_offset_to_document(
    document: &mut BeatmapDocument,
    offset_ms: i32,
    scope: OffsetScope,
) -> Vec<LineWarning> {
    let timing = document.timing_points();
    let mut warnings = timing.warnings;
    document.set_timing_points(&apply_offset(&timing.points, offset_ms));

    if scope == OffsetScope::TimingAndNotes {
        let objects = document.hit_objects();
        warnings.extend(objects.warnings);
        document.set_hit_objects(&shift_hit_objects(&objects.objects, offset_ms));
    }
    log::info!("applied {offset_ms} ms offset ({scope:?})");
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_move_with_their_start() {
        let objects = [HitObject::hold(1000, 1500, 2), HitObject::circle(2000, 0)];
        let shifted = shift_hit_objects(&objects, -25);
        assert_eq!(shifted[0].time, 975);
        assert_eq!(shifted[0].end_time(), Some(1475));
        assert_eq!(shifted[1].time, 1975);
    }
}
