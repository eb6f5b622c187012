//! osu!mania hit objects: single notes and holds.
//!
//! A `[HitObjects]` line reads `x,y,time,type,hitSound,objectParams`. In mania only `x` (the
//! column), `time` and, for holds, the end time matter for gameplay; the remaining fields are
//! retained so that a parsed line serializes back to the same line.

use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use crate::document::{LineWarning, LineWarningKind};

/// Width of the osu! playfield in osu!pixels.
pub const PLAYFIELD_WIDTH: i32 = 512;

/// Largest supported key count.
pub const MAX_KEY_COUNT: u8 = 18;

/// Type bit of a single note.
pub const TYPE_CIRCLE: u32 = 1;
/// Type bit of a slider, which mania maps do not contain.
pub const TYPE_SLIDER: u32 = 1 << 1;
/// Type bit of a spinner, which mania maps do not contain.
pub const TYPE_SPINNER: u32 = 1 << 3;
/// Type bit of a hold note.
pub const TYPE_HOLD: u32 = 1 << 7;

/// Hit sample written for holds that had none.
const DEFAULT_HOLD_SAMPLE: &str = "0:0:0:0:";

/// Number of colon-separated parts in a plain hit sample.
const HIT_SAMPLE_PARTS: usize = 5;

/// Column for an x position, `floor(x * key_count / 512)` clamped to `0..key_count`.
#[must_use]
pub fn column_of(x: i32, key_count: u8) -> u8 {
    let keys = i64::from(key_count.max(1));
    (i64::from(x) * keys)
        .div_euclid(i64::from(PLAYFIELD_WIDTH))
        .clamp(0, keys - 1) as u8
}

/// Center x of a column, `floor((column + 0.5) * 512 / key_count)`.
///
/// `column_of(x_of(c, k), k) == c` for every `c < k`.
#[must_use]
pub fn x_of(column: u8, key_count: u8) -> i32 {
    let keys = i32::from(key_count.max(1));
    (2 * i32::from(column) + 1) * (PLAYFIELD_WIDTH / 2) / keys
}

/// Why a hit-object line was rejected.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum HitObjectError {
    /// Fewer than the five required fields.
    #[error("expected at least 5 fields, found {0}")]
    TooFewFields(usize),
    /// A required field is not a number.
    #[error("field `{field}` is not a number: `{value}`")]
    InvalidNumber {
        /// Name of the field.
        field: &'static str,
        /// Its text.
        value: String,
    },
    /// Slider or spinner, which have no mania meaning.
    #[error("unsupported object type {0}")]
    UnsupportedType(u32),
    /// A hold without `endTime:` parameters.
    #[error("hold note without an end time")]
    MissingEndTime,
    /// A hold ending at or before its start.
    #[error("hold ends at {end_time} which is not after its start {time}")]
    NonPositiveHold {
        /// Start time.
        time: i32,
        /// End time.
        end_time: i32,
    },
}

/// Gameplay kind of a hit object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HitObjectKind {
    /// A single tap.
    Circle,
    /// A note held until `end_time`.
    Hold {
        /// Release time in milliseconds, after the start time.
        end_time: i32,
    },
}

/// A note in the `[HitObjects]` section.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HitObject {
    /// Start time in milliseconds.
    pub time: i32,
    /// Zero-based column.
    pub column: u8,
    /// Single note or hold.
    pub kind: HitObjectKind,
    /// The unused `y` field.
    pub y: i32,
    /// Type bits other than the circle/hold bits, such as new combo and colour skip.
    pub type_extra: u32,
    /// Hit sound bit set.
    pub hit_sound: i32,
    /// The `hitSample` field as written, without the hold end time.
    pub hit_sample: Option<String>,
}

fn parse_number(field: &'static str, value: &str) -> Result<i32, HitObjectError> {
    let value = value.trim();
    value
        .parse::<i32>()
        .ok()
        .or_else(|| {
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.floor() as i32)
        })
        .ok_or_else(|| HitObjectError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

impl HitObject {
    /// A single note.
    #[must_use]
    pub const fn circle(time: i32, column: u8) -> Self {
        Self {
            time,
            column,
            kind: HitObjectKind::Circle,
            y: 192,
            type_extra: 0,
            hit_sound: 0,
            hit_sample: None,
        }
    }

    /// A hold note.
    #[must_use]
    pub fn hold(time: i32, end_time: i32, column: u8) -> Self {
        Self {
            kind: HitObjectKind::Hold { end_time },
            ..Self::circle(time, column)
        }
    }

    /// Release time of a hold.
    #[must_use]
    pub const fn end_time(&self) -> Option<i32> {
        match self.kind {
            HitObjectKind::Circle => None,
            HitObjectKind::Hold { end_time } => Some(end_time),
        }
    }

    /// The time the object stops needing input: the end time of a hold, else the start.
    #[must_use]
    pub const fn last_time(&self) -> i32 {
        match self.kind {
            HitObjectKind::Circle => self.time,
            HitObjectKind::Hold { end_time } => end_time,
        }
    }

    /// Whether this is a hold.
    #[must_use]
    pub const fn is_hold(&self) -> bool {
        matches!(self.kind, HitObjectKind::Hold { .. })
    }

    /// Parses one line.
    ///
    /// # Errors
    ///
    /// Returns [`HitObjectError`] when the line has fewer than five fields, a required field
    /// is not numeric, the type is a slider or spinner, or a hold lacks a valid end time.
    pub fn try_parse(line: &str, key_count: u8) -> Result<Self, HitObjectError> {
        let fields = line.trim().split(',').collect_vec();
        let [x, y, time, object_type, hit_sound, params @ ..] = fields.as_slice() else {
            return Err(HitObjectError::TooFewFields(fields.len()));
        };
        let x = parse_number("x", x)?;
        let y = parse_number("y", y)?;
        let time = parse_number("time", time)?;
        let object_type = object_type
            .trim()
            .parse::<u32>()
            .map_err(|_| HitObjectError::InvalidNumber {
                field: "type",
                value: (*object_type).to_string(),
            })?;
        let hit_sound = parse_number("hitSound", hit_sound)?;
        if object_type & (TYPE_SLIDER | TYPE_SPINNER) != 0 {
            return Err(HitObjectError::UnsupportedType(object_type));
        }

        let params = (!params.is_empty()).then(|| params.join(","));
        let hold_params = params.as_deref().and_then(|p| {
            let (end, sample) = p.split_once(':')?;
            (object_type & TYPE_HOLD != 0 || p.split(':').count() > HIT_SAMPLE_PARTS)
                .then_some((end, sample))
        });

        let (kind, hit_sample) = match hold_params {
            Some((end, sample)) => {
                let end_time = parse_number("endTime", end)?;
                if end_time <= time {
                    return Err(HitObjectError::NonPositiveHold { time, end_time });
                }
                (HitObjectKind::Hold { end_time }, Some(sample.to_string()))
            }
            None if object_type & TYPE_HOLD != 0 => return Err(HitObjectError::MissingEndTime),
            None => (HitObjectKind::Circle, params),
        };

        Ok(Self {
            time,
            column: column_of(x, key_count),
            kind,
            y,
            type_extra: object_type & !(TYPE_CIRCLE | TYPE_HOLD),
            hit_sound,
            hit_sample,
        })
    }

    /// Parses one line, logging and returning `None` when it is not a valid hit object.
    #[must_use]
    pub fn parse(line: &str, key_count: u8) -> Option<Self> {
        Self::try_parse(line, key_count)
            .inspect_err(|err| log::warn!("skipping hit object `{line}`: {err}"))
            .ok()
    }

    /// Serializes to a `[HitObjects]` line, placing the note at its column's center.
    #[must_use]
    pub fn to_osu_line(&self, key_count: u8) -> String {
        OsuLine {
            object: self,
            key_count,
        }
        .to_string()
    }
}

struct OsuLine<'a> {
    object: &'a HitObject,
    key_count: u8,
}

impl fmt::Display for OsuLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let object = self.object;
        let type_bits = object.type_extra
            | match object.kind {
                HitObjectKind::Circle => TYPE_CIRCLE,
                HitObjectKind::Hold { .. } => TYPE_HOLD,
            };
        write!(
            f,
            "{},{},{},{},{}",
            x_of(object.column, self.key_count),
            object.y,
            object.time,
            type_bits,
            object.hit_sound
        )?;
        match (object.kind, object.hit_sample.as_deref()) {
            (HitObjectKind::Circle, None) => Ok(()),
            (HitObjectKind::Circle, Some(sample)) => write!(f, ",{sample}"),
            (HitObjectKind::Hold { end_time }, sample) => {
                write!(f, ",{end_time}:{}", sample.unwrap_or(DEFAULT_HOLD_SAMPLE))
            }
        }
    }
}

/// Output of [`parse_hit_objects`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[must_use]
pub struct HitObjectsOutput {
    /// Parsed objects sorted by time, then column.
    pub objects: Vec<HitObject>,
    /// Lines that were skipped. Line numbers count from 1 at the first given line.
    pub warnings: Vec<LineWarning>,
}

/// Parses the lines of a `[HitObjects]` section.
///
/// Blank and `//` comment lines are ignored; invalid lines are skipped with a warning.
pub fn parse_hit_objects<S: AsRef<str>>(lines: &[S], key_count: u8) -> HitObjectsOutput {
    let mut output = HitObjectsOutput::default();
    for (index, line) in lines.iter().map(AsRef::as_ref).enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") {
            continue;
        }
        match HitObject::try_parse(line, key_count) {
            Ok(object) => output.objects.push(object),
            Err(err) => {
                let warning = LineWarning {
                    section: "HitObjects".to_string(),
                    line: index + 1,
                    content: line.to_string(),
                    kind: LineWarningKind::UnparseableHitObject(err),
                };
                log::warn!("{warning}");
                output.warnings.push(warning);
            }
        }
    }
    sort_hit_objects(&mut output.objects);
    output
}

/// Stable sort by time, then column.
pub fn sort_hit_objects(objects: &mut [HitObject]) {
    objects.sort_by_key(|object| (object.time, object.column));
}

/// Counts and extents of a set of hit objects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HitObjectSummary {
    /// Number of single notes.
    pub circles: usize,
    /// Number of holds.
    pub holds: usize,
    /// Objects per column, indexed by column.
    pub per_column: Vec<usize>,
    /// Earliest start time.
    pub first_time: Option<i32>,
    /// Latest start time.
    pub last_time: Option<i32>,
    /// Latest time any object ends, counting hold ends.
    pub last_end_time: Option<i32>,
}

impl HitObjectSummary {
    /// All objects.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.circles + self.holds
    }
}

/// Summarizes hit objects in any order.
#[must_use]
pub fn summary(objects: &[HitObject]) -> HitObjectSummary {
    let mut summary = HitObjectSummary::default();
    for object in objects {
        if object.is_hold() {
            summary.holds += 1;
        } else {
            summary.circles += 1;
        }
        let column = usize::from(object.column);
        if summary.per_column.len() <= column {
            summary.per_column.resize(column + 1, 0);
        }
        if let Some(count) = summary.per_column.get_mut(column) {
            *count += 1;
        }
    }
    summary.first_time = objects.iter().map(|o| o.time).min();
    summary.last_time = objects.iter().map(|o| o.time).max();
    summary.last_end_time = objects.iter().map(HitObject::last_time).max();
    summary
}

/// Result of [`validate_round_trip`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RoundTripReport {
    /// The first parse, when the line was valid.
    pub parsed: Option<HitObject>,
    /// The line written back from `parsed`.
    pub serialized: Option<String>,
    /// Whether parsing `serialized` yields `parsed` again.
    pub consistent: bool,
    /// Why the first parse failed.
    pub error: Option<HitObjectError>,
}

/// Parses `line`, writes it back and parses the result again, reporting whether both parses
/// agree.
#[must_use]
pub fn validate_round_trip(line: &str, key_count: u8) -> RoundTripReport {
    match HitObject::try_parse(line, key_count) {
        Ok(parsed) => {
            let serialized = parsed.to_osu_line(key_count);
            let consistent =
                HitObject::try_parse(&serialized, key_count).is_ok_and(|again| again == parsed);
            RoundTripReport {
                parsed: Some(parsed),
                serialized: Some(serialized),
                consistent,
                error: None,
            }
        }
        Err(err) => RoundTripReport {
            parsed: None,
            serialized: None,
            consistent: false,
            error: Some(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_key_centers() {
        assert_eq!(
            (0..4).map(|c| x_of(c, 4)).collect_vec(),
            vec![64, 192, 320, 448]
        );
        assert_eq!(column_of(0, 4), 0);
        assert_eq!(column_of(511, 4), 3);
        assert_eq!(column_of(512, 4), 3);
        assert_eq!(column_of(-10, 4), 0);
    }

    #[test]
    fn circle_sample_is_not_a_hold() {
        let object = HitObject::try_parse("64,192,1000,1,0,0:0:0:0:", 4).unwrap();
        assert_eq!(object.kind, HitObjectKind::Circle);
        assert_eq!(object.hit_sample.as_deref(), Some("0:0:0:0:"));
    }

    #[test]
    fn hold_without_type_bit() {
        let object = HitObject::try_parse("192,192,1000,1,0,1500:0:0:0:0:", 4).unwrap();
        assert_eq!(object.kind, HitObjectKind::Hold { end_time: 1500 });
        assert_eq!(object.column, 1);
    }

    #[test]
    fn rejects_reversed_hold() {
        assert_eq!(
            HitObject::try_parse("64,192,1000,128,0,900:0:0:0:0:", 4),
            Err(HitObjectError::NonPositiveHold {
                time: 1000,
                end_time: 900,
            })
        );
    }
}
