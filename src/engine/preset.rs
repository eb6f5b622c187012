//! Rate ranges, named presets and their JSON storage.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use thiserror::Error;

use crate::transform::rate::{MAX_RATE, MIN_RATE};

use super::RateRequest;

/// Slack when counting steps, so `(1.5 - 1.0) / 0.1` yields six candidates rather than five.
const STEP_EPSILON: f64 = 1e-9;

/// Most rates one range may ask for. Rates are kept to two decimals, so no valid range has
/// more distinct values than this.
pub const MAX_RATE_COUNT: usize = 491;

/// Why a [`RateRange`] cannot produce rates.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum RangeError {
    /// `step` is not a positive finite number.
    #[error("step {0} must be positive")]
    NonPositiveStep(f64),
    /// `max_rate` is below `min_rate`.
    #[error("maximum rate {max} is below minimum rate {min}")]
    Inverted {
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// A bound lies outside the supported rates.
    #[error("rate bound {0} is outside {MIN_RATE}..={MAX_RATE}")]
    OutOfBounds(f64),
    /// The step would produce more than [`MAX_RATE_COUNT`] candidates.
    #[error("step {step} asks for {count} rates, more than {MAX_RATE_COUNT}")]
    TooManyRates {
        /// The offending step.
        step: f64,
        /// Candidates it would produce.
        count: f64,
    },
}

/// An arithmetic series of rates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RateRange {
    /// First rate.
    pub min_rate: f64,
    /// Last rate, included when the step lands on it.
    pub max_rate: f64,
    /// Distance between rates.
    pub step: f64,
    /// Skip rate `1.0`, which would reproduce the source map.
    #[cfg_attr(feature = "serde", serde(default))]
    pub exclude_base_rate: bool,
}

impl RateRange {
    /// A range without exclusion.
    #[must_use]
    pub const fn new(min_rate: f64, max_rate: f64, step: f64) -> Self {
        Self {
            min_rate,
            max_rate,
            step,
            exclude_base_rate: false,
        }
    }

    /// Checks bounds and step.
    ///
    /// # Errors
    ///
    /// [`RangeError`] describing the first problem found.
    pub fn validate(&self) -> Result<(), RangeError> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(RangeError::NonPositiveStep(self.step));
        }
        for bound in [self.min_rate, self.max_rate] {
            if !(bound.is_finite() && (MIN_RATE..=MAX_RATE).contains(&bound)) {
                return Err(RangeError::OutOfBounds(bound));
            }
        }
        if self.max_rate < self.min_rate {
            return Err(RangeError::Inverted {
                min: self.min_rate,
                max: self.max_rate,
            });
        }
        let count = self.candidate_count();
        if count > MAX_RATE_COUNT as f64 {
            return Err(RangeError::TooManyRates {
                step: self.step,
                count,
            });
        }
        Ok(())
    }

    fn candidate_count(&self) -> f64 {
        ((self.max_rate - self.min_rate) / self.step + STEP_EPSILON).floor() + 1.0
    }

    /// The candidate rates: `floor((max - min) / step + ε) + 1` values starting at `min`,
    /// rounded to two decimals, without `1.0` when [`Self::exclude_base_rate`] is set. Rates
    /// that round to the same value appear once, so every rate maps to its own output files.
    /// Invalid ranges yield nothing.
    #[must_use]
    pub fn rates(&self) -> Vec<f64> {
        if self.validate().is_err() {
            return Vec::new();
        }
        let count = self.candidate_count() as usize;
        (0..count)
            .map(|index| {
                let rate = self.min_rate + self.step * index as f64;
                (rate * 100.0).round() / 100.0
            })
            .filter(|rate| !(self.exclude_base_rate && (rate - 1.0).abs() < STEP_EPSILON))
            .dedup_by(|a, b| (a - b).abs() < STEP_EPSILON)
            .collect()
    }
}

/// A named, reusable rate configuration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatePreset {
    /// Name shown to the user.
    pub name: String,
    /// Rates to generate.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub range: RateRange,
    /// Overall difficulty written into every output.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub od_override: Option<f64>,
    /// HP drain written into every output.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub hp_override: Option<f64>,
    /// Keep the audio pitch.
    #[cfg_attr(feature = "serde", serde(default = "default_pitch"))]
    pub preserve_pitch: bool,
    /// Difficulty-name template; the engine's default when absent.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub template: Option<String>,
}

#[cfg(feature = "serde")]
const fn default_pitch() -> bool {
    true
}

impl RatePreset {
    /// A preset with no overrides that keeps the pitch.
    #[must_use]
    pub fn new(name: impl Into<String>, range: RateRange) -> Self {
        Self {
            name: name.into(),
            range,
            od_override: None,
            hp_override: None,
            preserve_pitch: true,
            template: None,
        }
    }

    /// The request for one rate of this preset.
    #[must_use]
    pub fn request(&self, rate: f64) -> RateRequest {
        RateRequest {
            rate,
            preserve_pitch: self.preserve_pitch,
            od_override: self.od_override,
            hp_override: self.hp_override,
            template: self.template.clone(),
        }
    }
}

/// Failure loading or saving JSON configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or written.
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The JSON does not match the expected shape.
    #[error("invalid configuration at `{path}`: {message}")]
    Json {
        /// Path inside the JSON document.
        path: String,
        /// What went wrong.
        message: String,
    },
}

/// Deserializes JSON, reporting the path of the offending value.
#[cfg(feature = "serde")]
pub(crate) fn from_json<T: serde::de::DeserializeOwned>(json: &str) -> Result<T, ConfigError> {
    let deserializer = &mut serde_json::Deserializer::from_str(json);
    serde_path_to_error::deserialize(deserializer).map_err(|err| ConfigError::Json {
        path: err.path().to_string(),
        message: err.inner().to_string(),
    })
}

/// A named list of presets kept in a JSON file.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PresetStore {
    /// Presets in display order.
    pub presets: Vec<RatePreset>,
}

impl PresetStore {
    /// The preset named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RatePreset> {
        self.presets.iter().find(|preset| preset.name == name)
    }

    /// Adds `preset`, replacing one with the same name in place.
    pub fn upsert(&mut self, preset: RatePreset) {
        match self.presets.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
    }

    /// Removes the preset named `name`, returning it.
    pub fn remove(&mut self, name: &str) -> Option<RatePreset> {
        let index = self.presets.iter().position(|p| p.name == name)?;
        Some(self.presets.remove(index))
    }
}

#[cfg(feature = "serde")]
impl PresetStore {
    /// Parses a store from JSON.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Json`] naming the offending path.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        from_json(json)
    }

    /// Reads a store, or returns an empty one when the file does not exist.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when an existing file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Writes the store as pretty JSON.
    ///
    /// # Errors
    ///
    /// [`ConfigError`] when serializing or writing fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).map_err(|err| ConfigError::Json {
            path: String::new(),
            message: err.to_string(),
        })?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_inclusive_steps() {
        assert_eq!(
            RateRange::new(1.0, 1.5, 0.1).rates(),
            vec![1.0, 1.1, 1.2, 1.3, 1.4, 1.5]
        );
        let range = RateRange {
            exclude_base_rate: true,
            ..RateRange::new(0.8, 1.2, 0.1)
        };
        assert_eq!(range.rates(), vec![0.8, 0.9, 1.1, 1.2]);
    }

    #[test]
    fn invalid_ranges_are_empty() {
        assert!(RateRange::new(1.5, 1.0, 0.1).rates().is_empty());
        assert!(RateRange::new(1.0, 1.5, 0.0).rates().is_empty());
        assert_eq!(
            RateRange::new(0.05, 1.0, 0.1).validate(),
            Err(RangeError::OutOfBounds(0.05))
        );
    }

    #[test]
    fn fine_steps_do_not_repeat_rates() {
        assert_eq!(RateRange::new(1.0, 1.02, 0.005).rates(), vec![1.0, 1.01, 1.02]);
        let rates = RateRange::new(0.9, 1.1, 0.003).rates();
        assert!(rates.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(rates.first(), Some(&0.9));
    }

    #[test]
    fn tiny_steps_are_rejected() {
        let range = RateRange::new(0.5, 1.5, 1e-9);
        assert!(matches!(
            range.validate(),
            Err(RangeError::TooManyRates { .. })
        ));
        assert!(range.rates().is_empty());
        assert_eq!(RateRange::new(0.1, 5.0, 0.01).rates().len(), MAX_RATE_COUNT);
    }
}
