//! Storage boundary for grouped batches.
//!
//! The grouping core never touches storage. This module holds the caller
//! side of the boundary: the [`BucketStore`] trait that persists bucket
//! objects, an in-memory backend, a file-backed backend, and a reader that
//! walks a simple bucket and follows pointer records into the extended store.

pub mod file;
pub mod reader;

use std::collections::HashMap;
use std::fmt;

use crate::error::Result;
use crate::point::{Location, Time};

pub use file::{FileStore, FileStoreConfig, SyncMode};
pub use reader::{BucketReader, StoredPoint, StoredValue};

/// Which of the two stores a bucket object lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreKind {
    /// 24-byte records: simple points and pointer records.
    Simple,
    /// Length-prefixed extended payload frames.
    Extended,
}

impl StoreKind {
    /// Short name used in file names and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Extended => "extended",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted bucket objects, one append-only byte sequence per kind and
/// location, plus a latest-write marker per kind.
///
/// Callers must serialize batches against one store so that persisted
/// lengths observed before pointer resolution stay valid until the batch is
/// appended.
pub trait BucketStore {
    /// Current byte length of the object at `location`. Zero if absent.
    fn persisted_len(&self, kind: StoreKind, location: Location) -> Result<u64>;

    /// Appends `bytes` to the object at `location`, creating it if needed.
    fn append(&mut self, kind: StoreKind, location: Location, bytes: &[u8]) -> Result<()>;

    /// Reads the whole object at `location`. Empty if absent.
    fn fetch(&self, kind: StoreKind, location: Location) -> Result<Vec<u8>>;

    /// Raises the latest-write marker of `kind` to `time` if it is newer.
    fn mark_latest(&mut self, kind: StoreKind, time: Time) -> Result<()>;

    /// Returns the latest-write marker of `kind`. Zero if never marked.
    fn latest(&self, kind: StoreKind) -> Result<Time>;
}

/// Bucket store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    objects: HashMap<(StoreKind, Location), Vec<u8>>,
    latest: HashMap<StoreKind, Time>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects of `kind`.
    pub fn object_count(&self, kind: StoreKind) -> usize {
        self.objects.keys().filter(|(k, _)| *k == kind).count()
    }

    /// Borrows the object at `location` without copying.
    pub fn object(&self, kind: StoreKind, location: Location) -> Option<&[u8]> {
        self.objects.get(&(kind, location)).map(Vec::as_slice)
    }
}

impl BucketStore for MemoryStore {
    fn persisted_len(&self, kind: StoreKind, location: Location) -> Result<u64> {
        Ok(self
            .objects
            .get(&(kind, location))
            .map_or(0, |bytes| bytes.len() as u64))
    }

    fn append(&mut self, kind: StoreKind, location: Location, bytes: &[u8]) -> Result<()> {
        self.objects
            .entry((kind, location))
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn fetch(&self, kind: StoreKind, location: Location) -> Result<Vec<u8>> {
        Ok(self.object(kind, location).map(<[u8]>::to_vec).unwrap_or_default())
    }

    fn mark_latest(&mut self, kind: StoreKind, time: Time) -> Result<()> {
        let latest = self.latest.entry(kind).or_insert(0);
        *latest = (*latest).max(time);
        Ok(())
    }

    fn latest(&self, kind: StoreKind) -> Result<Time> {
        Ok(self.latest.get(&kind).copied().unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_append_and_len() {
        let mut store = MemoryStore::new();
        let loc = Location::new(0, 1);
        assert_eq!(store.persisted_len(StoreKind::Extended, loc).unwrap(), 0);
        store.append(StoreKind::Extended, loc, b"abc").unwrap();
        store.append(StoreKind::Extended, loc, b"de").unwrap();
        assert_eq!(store.persisted_len(StoreKind::Extended, loc).unwrap(), 5);
        assert_eq!(store.fetch(StoreKind::Extended, loc).unwrap(), b"abcde");
        assert!(store.fetch(StoreKind::Simple, loc).unwrap().is_empty());
        assert_eq!(store.object_count(StoreKind::Extended), 1);
        assert_eq!(store.object_count(StoreKind::Simple), 0);
    }

    #[test]
    fn test_latest_marker_is_monotone() {
        let mut store = MemoryStore::new();
        assert_eq!(store.latest(StoreKind::Simple).unwrap(), 0);
        store.mark_latest(StoreKind::Simple, 10).unwrap();
        store.mark_latest(StoreKind::Simple, 4).unwrap();
        assert_eq!(store.latest(StoreKind::Simple).unwrap(), 10);
        assert_eq!(store.latest(StoreKind::Extended).unwrap(), 0);
    }
}
