//! Pure transformations of timing points, hit objects and whole documents.
//!
//! None of these functions perform I/O; [`crate::engine`] combines them with audio processing
//! and file output.

pub mod normalize;
pub mod offset;
pub mod rate;

pub use self::{
    normalize::{NormalizeOptions, NormalizeOutput, normalize_scroll_velocity},
    offset::{OffsetScope, apply_offset, apply_offset_to_document},
    rate::{MAX_RATE, MIN_RATE, ScaledDocument, scale_document, validate_rate},
};
