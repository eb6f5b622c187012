//! osu!mania beatmap tooling: a lossless `.osu` codec, timing transforms, a rate-change engine
//! and `collection.db` support.
//!
//! - [`document`] reads and writes `.osu` text without losing anything it does not understand.
//! - [`hit_object`] and [`timing`] give typed views of the `[HitObjects]` and `[TimingPoints]`
//!   sections; [`timing::beat`] turns detected beats into timing points.
//! - [`transform`] shifts, normalizes and rescales a document in time.
//! - [`engine`] produces rate-changed copies of a beatmap together with stretched audio.
//! - [`collection`] edits the game's `collection.db`.
//!
//! In detail, our policies are:
//!
//! - Keep unknown sections, keys and malformed lines as written.
//! - Skip what cannot be parsed with a warning, and reject only text that is not a beatmap.
//! - Never overwrite the source beatmap or leave half-written outputs behind.
//!
//! # Example
//!
//! ```rust
//! use mania_rate::{document::BeatmapDocument, transform::scale_document};
//!
//! let source = "osu file format v14\n\n[General]\nAudioFilename: audio.mp3\n\n[Metadata]\n\
//!               Version:Hard\n\n[Difficulty]\nCircleSize:4\n\n[TimingPoints]\n\
//!               0,500,4,2,0,100,1,0\n\n[HitObjects]\n64,192,1500,1,0,0:0:0:0:\n";
//! let output = BeatmapDocument::parse(source).unwrap();
//! assert_eq!(output.document.to_osu_string(), source);
//!
//! let scaled = scale_document(&output.document, 1.5).unwrap();
//! let notes = scaled.document.hit_objects().objects;
//! assert_eq!(notes[0].time, 1000);
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod atomic;
pub mod collection;
#[cfg(feature = "diagnostics")]
pub mod diagnostics;
pub mod document;
pub mod engine;
pub mod error;
pub mod hash;
pub mod hit_object;
pub mod prelude;
pub mod summary;
pub mod timing;
pub mod transform;

pub use self::error::{Error, Result};
