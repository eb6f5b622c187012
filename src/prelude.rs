//! Prelude module for the crate.
//!
//! Re-exports the types most programs need.

pub use crate::{
    collection::{CollectionDb, CollectionRecord, CollectionStore, HashEntry},
    document::{BeatmapDocument, BeatmapFile, DocumentOutput, LineWarning},
    engine::{
        EngineConfig, Progress, RateEngine, RateOutput, RatePreset, RateRange, RateRequest,
        bulk::BulkReport,
    },
    error::{Error, Result},
    hash::ContentHash,
    hit_object::{HitObject, HitObjectKind},
    summary::BeatmapSummary,
    timing::{TimingPoint, beat::BeatSample},
    transform::{NormalizeOptions, OffsetScope},
};
