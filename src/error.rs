//! Crate-wide error type.
//!
//! Each layer owns its error enum ([`DocumentError`], [`EngineError`],
//! [`CollectionError`]); [`Error`] aggregates them for callers that drive
//! several layers at once.

use std::path::PathBuf;

use thiserror::Error;

use crate::{collection::CollectionError, document::DocumentError, engine::EngineError};

/// Any failure surfaced by this crate.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The beatmap text could not be understood as an `.osu` document.
    #[error("malformed document: {0}")]
    MalformedDocument(#[from] DocumentError),
    /// The rate transform engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Reading or writing a collection database failed.
    #[error(transparent)]
    Collection(#[from] CollectionError),
    /// A file could not be read or written.
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Type alias of `core::result::Result<T, Error>`
pub type Result<T> = core::result::Result<T, Error>;
