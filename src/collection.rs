//! The osu! `collection.db` database: named lists of beatmap content hashes.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! i32 version
//! i32 collection count
//! repeated:
//!     osu-string name
//!     i32 beatmap count
//!     repeated: osu-string hash (32 hex digits)
//! ```
//!
//! An osu-string is `0x00` when absent, otherwise `0x0b`, a ULEB128 byte length and UTF-8 bytes.
//! Names and hash entries are kept as the file spells them, absent strings and letter case
//! included, so editing one collection leaves every other record byte-identical. Hashes added
//! through this module are written in lowercase.

pub mod reader;
pub mod uleb128;
pub mod writer;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock, PoisonError},
};

use thiserror::Error;

use crate::{
    atomic::{canonical_target, replace_with_backup},
    hash::ContentHash,
};

pub use self::{reader::CollectionReader, writer::CollectionWriter};
pub use crate::atomic::backup_path;

/// Version written for databases created from scratch.
pub const DEFAULT_VERSION: i32 = 20150203;

/// Why bytes are not a valid collection database.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Error)]
pub enum FormatError {
    /// The data ended early.
    #[error("unexpected end of data at byte {offset}, {needed} more byte(s) needed")]
    UnexpectedEof {
        /// Where reading stopped.
        offset: usize,
        /// How many bytes were missing.
        needed: usize,
    },
    /// A string flag other than `0x00` or `0x0b`.
    #[error("invalid string flag {flag:#04x} at byte {offset}")]
    InvalidStringFlag {
        /// Position of the flag.
        offset: usize,
        /// The flag found.
        flag: u8,
    },
    /// A ULEB128 length that does not fit in 32 bits.
    #[error("ULEB128 value at byte {offset} overflows 32 bits")]
    Uleb128Overflow {
        /// Start of the number.
        offset: usize,
    },
    /// String bytes that are not UTF-8.
    #[error("string at byte {offset} is not valid UTF-8")]
    InvalidUtf8 {
        /// Start of the string bytes.
        offset: usize,
    },
    /// A negative element count.
    #[error("negative count {count} at byte {offset}")]
    NegativeCount {
        /// Position of the count.
        offset: usize,
        /// The value found.
        count: i32,
    },
    /// Bytes left over after the last collection.
    #[error("{0} unexpected trailing byte(s)")]
    TrailingBytes(usize),
}

/// Failure of a collection database operation.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CollectionError {
    /// The file is not a collection database. Nothing was returned from it.
    #[error("invalid collection database: {0}")]
    InvalidFormat(#[from] FormatError),
    /// The file could not be read or written.
    #[error("i/o error on `{}`: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// A value with an osu! binary representation.
pub trait OsuBinary: Sized {
    /// Reads the value.
    ///
    /// # Errors
    ///
    /// [`FormatError`] when the bytes do not hold a valid value.
    fn read(reader: &mut CollectionReader<'_>) -> Result<Self, FormatError>;

    /// Writes the value.
    fn write(&self, writer: &mut CollectionWriter);
}

impl OsuBinary for i32 {
    fn read(reader: &mut CollectionReader<'_>) -> Result<Self, FormatError> {
        reader.read_i32()
    }

    fn write(&self, writer: &mut CollectionWriter) {
        writer.write_i32(*self);
    }
}

impl OsuBinary for Option<String> {
    fn read(reader: &mut CollectionReader<'_>) -> Result<Self, FormatError> {
        reader.read_osu_string()
    }

    fn write(&self, writer: &mut CollectionWriter) {
        writer.write_osu_string(self.as_deref());
    }
}

/// A beatmap entry of a collection, spelled as in the file.
///
/// The game writes lowercase MD5 digests, but other tools may not, and an entry may even be
/// an absent string. Entries compare against [`ContentHash`] ignoring case.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HashEntry(pub Option<String>);

impl HashEntry {
    /// The text as written.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// The digest, when the entry is one.
    #[must_use]
    pub fn content_hash(&self) -> Option<ContentHash> {
        self.as_str()?.parse().ok()
    }
}

impl From<ContentHash> for HashEntry {
    fn from(hash: ContentHash) -> Self {
        Self(Some(hash.to_string()))
    }
}

impl PartialEq<ContentHash> for HashEntry {
    fn eq(&self, other: &ContentHash) -> bool {
        self.content_hash() == Some(*other)
    }
}

impl OsuBinary for HashEntry {
    fn read(reader: &mut CollectionReader<'_>) -> Result<Self, FormatError> {
        reader.read().map(Self)
    }

    fn write(&self, writer: &mut CollectionWriter) {
        writer.write(&self.0);
    }
}

/// A named collection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionRecord {
    /// Display name, `None` when the file stores an absent string.
    pub name: Option<String>,
    /// Beatmaps in insertion order.
    pub hashes: Vec<HashEntry>,
}

impl CollectionRecord {
    /// An empty collection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            hashes: Vec::new(),
        }
    }

    /// Display name, empty when absent.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Digests of the entries that are digests, in order.
    pub fn content_hashes(&self) -> impl Iterator<Item = ContentHash> + '_ {
        self.hashes.iter().filter_map(HashEntry::content_hash)
    }

    /// Whether the collection holds `hash`, in any letter case.
    #[must_use]
    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.hashes.iter().any(|entry| entry == hash)
    }

    /// Appends `hash` unless already present. Returns whether it was added.
    pub fn insert(&mut self, hash: ContentHash) -> bool {
        if self.contains(&hash) {
            return false;
        }
        self.hashes.push(hash.into());
        true
    }
}

impl OsuBinary for CollectionRecord {
    fn read(reader: &mut CollectionReader<'_>) -> Result<Self, FormatError> {
        let name = reader.read()?;
        let count = reader.read_count()?;
        let mut hashes = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            hashes.push(reader.read()?);
        }
        Ok(Self { name, hashes })
    }

    fn write(&self, writer: &mut CollectionWriter) {
        writer.write(&self.name);
        writer.write_count(self.hashes.len());
        for hash in &self.hashes {
            writer.write(hash);
        }
    }
}

/// The whole database.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionDb {
    /// Client version that wrote the file.
    pub version: i32,
    /// Collections in file order.
    pub collections: Vec<CollectionRecord>,
}

impl Default for CollectionDb {
    fn default() -> Self {
        Self {
            version: DEFAULT_VERSION,
            collections: Vec::new(),
        }
    }
}

impl OsuBinary for CollectionDb {
    fn read(reader: &mut CollectionReader<'_>) -> Result<Self, FormatError> {
        let version = reader.read_i32()?;
        let count = reader.read_count()?;
        let mut collections = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            collections.push(reader.read()?);
        }
        Ok(Self {
            version,
            collections,
        })
    }

    fn write(&self, writer: &mut CollectionWriter) {
        writer.write_i32(self.version);
        writer.write_count(self.collections.len());
        for collection in &self.collections {
            writer.write(collection);
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CollectionError + '_ {
    move |source| CollectionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl CollectionDb {
    /// Decodes a whole database.
    ///
    /// # Errors
    ///
    /// [`FormatError`] on any malformed or truncated content, including trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = CollectionReader::new(bytes);
        let db = reader.read()?;
        if reader.can_read() {
            return Err(FormatError::TrailingBytes(reader.remaining()));
        }
        Ok(db)
    }

    /// Encodes the database.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = CollectionWriter::new();
        writer.write(self);
        writer.data()
    }

    /// Reads a database file.
    ///
    /// # Errors
    ///
    /// [`CollectionError::Io`] when the file cannot be read, [`CollectionError::InvalidFormat`]
    /// when it is not a collection database.
    pub fn read_from_path(path: impl AsRef<Path>) -> Result<Self, CollectionError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(io_error(path))?;
        let db = Self::from_bytes(&bytes)?;
        log::debug!(
            "read {} collection(s) from {}",
            db.collections.len(),
            path.display()
        );
        Ok(db)
    }

    /// Reads a database file, or returns an empty database when the file does not exist.
    ///
    /// # Errors
    ///
    /// As [`Self::read_from_path`] for files that exist.
    pub fn read_or_default(path: impl AsRef<Path>) -> Result<Self, CollectionError> {
        let path = path.as_ref();
        if path.exists() {
            Self::read_from_path(path)
        } else {
            log::info!("{} does not exist yet, starting empty", path.display());
            Ok(Self::default())
        }
    }

    /// Replaces the file at `path` with this database.
    ///
    /// An existing file is first copied to [`backup_path`]. A failed backup is logged and the
    /// write goes ahead. The new content is written to a sibling temporary file and renamed over
    /// the target.
    ///
    /// # Errors
    ///
    /// [`CollectionError::Io`] when the new content cannot be written.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), CollectionError> {
        let path = path.as_ref();
        replace_with_backup(path, &self.to_bytes()).map_err(io_error(path))?;
        log::info!(
            "wrote {} collection(s) to {}",
            self.collections.len(),
            path.display()
        );
        Ok(())
    }

    /// The first collection named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CollectionRecord> {
        self.collections.iter().find(|c| c.name() == name)
    }

    fn find_or_create(&mut self, name: &str) -> &mut CollectionRecord {
        let index = match self.collections.iter().position(|c| c.name() == name) {
            Some(index) => index,
            None => {
                self.collections.push(CollectionRecord::new(name));
                self.collections.len() - 1
            }
        };
        &mut self.collections[index]
    }

    /// Sets the content of collection `name`, creating it at the end when absent. Duplicate
    /// hashes are dropped, keeping the first occurrence.
    pub fn set_collection(&mut self, name: &str, hashes: impl IntoIterator<Item = ContentHash>) {
        let record = self.find_or_create(name);
        record.hashes.clear();
        for hash in hashes {
            record.insert(hash);
        }
    }

    /// Appends hashes that collection `name` does not hold yet, creating it when absent.
    /// Returns how many were added.
    pub fn add_hashes(
        &mut self,
        name: &str,
        hashes: impl IntoIterator<Item = ContentHash>,
    ) -> usize {
        let record = self.find_or_create(name);
        hashes.into_iter().filter(|hash| record.insert(*hash)).count()
    }

    /// Removes every collection named `name`. Returns whether any was removed.
    pub fn remove_collection(&mut self, name: &str) -> bool {
        let before = self.collections.len();
        self.collections.retain(|c| c.name() != name);
        self.collections.len() != before
    }
}

fn path_locks() -> &'static Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(Mutex::default)
}

/// Serializes read-modify-write cycles on one database file.
///
/// Every store opened for the same path shares one lock, so concurrent updates from different
/// call sites in the process never interleave.
#[derive(Debug, Clone)]
pub struct CollectionStore {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl CollectionStore {
    /// A store for the database at `path`.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let key = canonical_target(&path);
        let lock = path_locks()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .clone();
        Self { path, lock }
    }

    /// The database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the current content, or an empty database when the file does not exist.
    ///
    /// # Errors
    ///
    /// See [`CollectionDb::read_or_default`].
    pub fn read(&self) -> Result<CollectionDb, CollectionError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        CollectionDb::read_or_default(&self.path)
    }

    /// Reads the database, applies `edit` and writes the result back while holding the lock.
    ///
    /// # Errors
    ///
    /// Reading or writing errors. `edit` is not called when reading fails.
    pub fn update<T>(
        &self,
        edit: impl FnOnce(&mut CollectionDb) -> T,
    ) -> Result<T, CollectionError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut db = CollectionDb::read_or_default(&self.path)?;
        let output = edit(&mut db);
        db.write_to_path(&self.path)?;
        Ok(output)
    }

    /// [`CollectionDb::set_collection`] on the stored database.
    ///
    /// # Errors
    ///
    /// See [`Self::update`].
    pub fn set_collection(
        &self,
        name: &str,
        hashes: impl IntoIterator<Item = ContentHash>,
    ) -> Result<(), CollectionError> {
        self.update(|db| db.set_collection(name, hashes))
    }

    /// [`CollectionDb::add_hashes`] on the stored database.
    ///
    /// # Errors
    ///
    /// See [`Self::update`].
    pub fn add_hashes(
        &self,
        name: &str,
        hashes: impl IntoIterator<Item = ContentHash>,
    ) -> Result<usize, CollectionError> {
        self.update(|db| db.add_hashes(name, hashes))
    }
}
