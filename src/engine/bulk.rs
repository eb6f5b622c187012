//! Many rates of one beatmap in a single run.

use std::{path::Path, sync::mpsc::Sender};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::hash::ContentHash;

use super::{
    AudioStretcher, EngineError, Progress, RateEngine, RateOutput, RateRange, RateRequest,
};

/// Outcome of one rate of a bulk run.
#[derive(Debug)]
pub struct RateResult {
    /// The rate.
    pub rate: f64,
    /// What it produced, or why it failed.
    pub outcome: Result<RateOutput, EngineError>,
}

/// Outcomes of a bulk run, in rate order.
#[derive(Debug, Default)]
pub struct BulkReport {
    /// One entry per rate.
    pub results: Vec<RateResult>,
}

impl BulkReport {
    /// Outputs of the rates that succeeded.
    pub fn succeeded(&self) -> impl Iterator<Item = &RateOutput> {
        self.results
            .iter()
            .filter_map(|result| result.outcome.as_ref().ok())
    }

    /// Rates that failed with their errors.
    pub fn failed(&self) -> impl Iterator<Item = (f64, &EngineError)> {
        self.results
            .iter()
            .filter_map(|result| result.outcome.as_ref().err().map(|err| (result.rate, err)))
    }

    /// Whether every rate succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed().next().is_none()
    }

    /// Hashes of the written beatmaps, ready for a collection.
    #[must_use]
    pub fn hashes(&self) -> Vec<ContentHash> {
        self.succeeded().map(|output| output.hash).collect()
    }
}

impl<S: AudioStretcher> RateEngine<S> {
    /// Runs [`RateEngine::apply_rate`] for every rate of `range`, using `request` for
    /// everything but the rate.
    ///
    /// The range, the source and the stretcher are checked once up front; after that a
    /// failing rate is recorded in the report and the others continue. With the `parallel`
    /// feature rates run on [`super::EngineConfig::workers`] threads.
    ///
    /// # Errors
    ///
    /// Only the up-front checks fail the whole run: [`EngineError::InvalidRange`], source
    /// read and parse errors, [`EngineError::DependencyUnavailable`] and
    /// [`EngineError::WorkerPool`].
    pub fn apply_range(
        &self,
        source: impl AsRef<Path>,
        range: &RateRange,
        request: &RateRequest,
        progress: Option<&Sender<Progress>>,
    ) -> Result<BulkReport, EngineError> {
        range.validate()?;
        let file = Self::load(source.as_ref())?;
        self.probe()?;

        let rates = range.rates();
        log::info!(
            "generating {} rates of {}",
            rates.len(),
            file.path.display()
        );
        let run = |rate: &f64| {
            let request = RateRequest {
                rate: *rate,
                ..request.clone()
            };
            RateResult {
                rate: *rate,
                outcome: self.produce(&file, &request, progress),
            }
        };

        #[cfg(feature = "parallel")]
        let results = {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.config.workers)
                .build()
                .map_err(|err| EngineError::WorkerPool(err.to_string()))?;
            pool.install(|| rates.par_iter().map(run).collect())
        };
        #[cfg(not(feature = "parallel"))]
        let results = rates.iter().map(run).collect();

        Ok(BulkReport { results })
    }
}
