//! Turning beat-tracker output into uninherited timing points.
//!
//! A beat tracker reports one instantaneous BPM per detected beat. Those samples are noisy, so
//! they are first folded into runs of equal (rounded) tempo, each run becoming one timing point.
//! [`stabilize_samples`] can be applied beforehand to swallow small tempo jitter.

use crate::timing::{TimingPoint, round_bpm, sort_timing_points};

/// Default tolerance of [`stabilize_samples`] in BPM.
pub const DEFAULT_TOLERANCE_BPM: f64 = 2.0;

/// Instantaneous tempo at a detected beat.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BeatSample {
    /// Beat time in milliseconds.
    pub time_ms: f64,
    /// Tempo measured at this beat.
    pub bpm: f64,
}

impl BeatSample {
    /// Creates a sample.
    #[must_use]
    pub const fn new(time_ms: f64, bpm: f64) -> Self {
        Self { time_ms, bpm }
    }
}

fn is_usable(sample: &BeatSample) -> bool {
    sample.bpm.is_finite() && sample.bpm > 0.0 && sample.time_ms.is_finite()
}

/// Emits one uninherited point per run of samples sharing the same BPM rounded to one decimal.
///
/// Each point sits at the first sample of its run with `beat_length = 60000 / rounded_bpm` and
/// default meter 4, sample set 0 and volume 100. Samples with a non-finite or non-positive BPM
/// are skipped.
#[must_use]
pub fn beats_to_timing_points(samples: &[BeatSample]) -> Vec<TimingPoint> {
    let mut points: Vec<TimingPoint> = Vec::new();
    let mut last_bpm = None;
    for sample in samples.iter().filter(|s| is_usable(s)) {
        let bpm = round_bpm(sample.bpm);
        if last_bpm.is_some_and(|last: f64| (last - bpm).abs() < 1e-9) {
            continue;
        }
        last_bpm = Some(bpm);
        points.push(TimingPoint::from_bpm(sample.time_ms, bpm));
    }
    points
}

/// Replaces the tempo of a map while keeping its scroll-velocity points.
///
/// Inherited points of `existing` survive, its uninherited points are discarded, and the result
/// is stably sorted with tempo points first at equal times.
#[must_use]
pub fn merge_timing_points(
    existing: &[TimingPoint],
    new_uninherited: &[TimingPoint],
) -> Vec<TimingPoint> {
    let mut merged: Vec<TimingPoint> = new_uninherited
        .iter()
        .chain(existing.iter().filter(|point| !point.uninherited))
        .copied()
        .collect();
    sort_timing_points(&mut merged);
    merged
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    match (sorted.get(mid.wrapping_sub(1)), sorted.get(mid)) {
        (Some(low), Some(high)) if sorted.len() % 2 == 0 => (low + high) / 2.0,
        (_, Some(middle)) => *middle,
        _ => 0.0,
    }
}

struct StableSection {
    time_ms: f64,
    bpm: f64,
    count: usize,
}

/// Folds tempo jitter into stable sections, one sample per section.
///
/// Consecutive samples join the current section while they stay within `tolerance_bpm` of the
/// section's median. Adjacent sections whose tempos then differ by at most `tolerance_bpm` are
/// merged, the merged tempo being the average weighted by sample count. Fewer than two usable
/// samples are returned as they are.
#[must_use]
pub fn stabilize_samples(samples: &[BeatSample], tolerance_bpm: f64) -> Vec<BeatSample> {
    let usable: Vec<BeatSample> = samples.iter().copied().filter(is_usable).collect();
    let [first, rest @ ..] = usable.as_slice() else {
        return usable;
    };
    if rest.is_empty() {
        return usable;
    }

    let mut sections = Vec::new();
    let mut start = first.time_ms;
    let mut current = vec![first.bpm];
    for sample in rest {
        if (sample.bpm - median(&current)).abs() <= tolerance_bpm {
            current.push(sample.bpm);
            continue;
        }
        sections.push(StableSection {
            time_ms: start,
            bpm: median(&current),
            count: current.len(),
        });
        start = sample.time_ms;
        current = vec![sample.bpm];
    }
    sections.push(StableSection {
        time_ms: start,
        bpm: median(&current),
        count: current.len(),
    });

    let mut merged: Vec<StableSection> = Vec::with_capacity(sections.len());
    for section in sections {
        match merged.last_mut() {
            Some(last) if (section.bpm - last.bpm).abs() <= tolerance_bpm => {
                let total = last.count + section.count;
                last.bpm = (last.bpm * last.count as f64 + section.bpm * section.count as f64)
                    / total as f64;
                last.count = total;
            }
            _ => merged.push(section),
        }
    }
    log::debug!(
        "stabilized {} beat samples into {} sections",
        usable.len(),
        merged.len()
    );
    merged
        .into_iter()
        .map(|section| BeatSample::new(section.time_ms, section.bpm))
        .collect()
}

/// Why beat-tracker JSON could not be read.
#[cfg(feature = "serde")]
#[derive(Debug, thiserror::Error)]
#[error("invalid beat track at `{path}`: {message}")]
pub struct BeatTrackError {
    /// Path inside the JSON document where reading failed.
    pub path: String,
    /// What went wrong.
    pub message: String,
}

/// One beat as reported by the beat tracker.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TrackedBeat {
    /// Beat time in seconds.
    pub time: f64,
    /// Instantaneous tempo.
    pub bpm: f64,
}

/// JSON output of the external beat tracker.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct BeatTrack {
    /// Detected beats in order.
    pub beats: Vec<TrackedBeat>,
    /// Mean of all instantaneous tempos, when requested from the tracker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_bpm: Option<f64>,
    /// Global tempo estimate, when requested from the tracker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tempo: Option<f64>,
}

#[cfg(feature = "serde")]
impl BeatTrack {
    /// Reads the tracker's JSON.
    ///
    /// # Errors
    ///
    /// [`BeatTrackError`] naming the JSON path that failed to deserialize.
    pub fn from_json(json: &str) -> Result<Self, BeatTrackError> {
        let deserializer = &mut serde_json::Deserializer::from_str(json);
        serde_path_to_error::deserialize(deserializer).map_err(|err| BeatTrackError {
            path: err.path().to_string(),
            message: err.inner().to_string(),
        })
    }

    /// Beats as samples in milliseconds.
    #[must_use]
    pub fn samples(&self) -> Vec<BeatSample> {
        self.beats
            .iter()
            .map(|beat| BeatSample::new(beat.time * 1000.0, beat.bpm))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }

    #[test]
    fn jitter_folds_into_one_section() {
        let samples = [
            BeatSample::new(0.0, 120.0),
            BeatSample::new(500.0, 121.0),
            BeatSample::new(1000.0, 119.5),
            BeatSample::new(1500.0, 160.0),
            BeatSample::new(1875.0, 160.4),
        ];
        let stable = stabilize_samples(&samples, DEFAULT_TOLERANCE_BPM);
        assert_eq!(stable.len(), 2);
        assert_eq!(stable[0].time_ms, 0.0);
        assert_eq!(stable[0].bpm, 120.0);
        assert_eq!(stable[1].time_ms, 1500.0);
        assert!((stable[1].bpm - 160.2).abs() < 1e-9);
    }
}
