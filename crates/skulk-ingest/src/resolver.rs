//! Location resolution: mapping a point to its destination bucket.
//!
//! The grouping driver treats resolution as a black box behind
//! [`LocationResolver`]. Any `Fn(Time, Address, &I) -> Location` closure is a
//! resolver, so callers with their own index structures can plug in directly.
//! [`EpochResolver`] over an [`EpochIndex`] covers the common layout where
//! buckets are grouped into time epochs.

use std::collections::BTreeMap;

use crate::point::{Address, Bucket, Epoch, Location, Time};

/// Maps a point to a [`Location`] using an index snapshot.
///
/// Implementations must be deterministic for a fixed snapshot.
pub trait LocationResolver<I: ?Sized> {
    /// Resolves the location of a point.
    fn resolve(&self, time: Time, address: Address, index: &I) -> Location;
}

impl<I: ?Sized, F> LocationResolver<I> for F
where
    F: Fn(Time, Address, &I) -> Location,
{
    fn resolve(&self, time: Time, address: Address, index: &I) -> Location {
        self(time, address, index)
    }
}

/// Snapshot of the epochs of one index (simple or extended).
///
/// Each epoch starts at a time and carries a fixed bucket count.
///
/// # Examples
/// ```rust
/// use alopex_skulk_ingest::resolver::EpochIndex;
///
/// let index = EpochIndex::new().with_epoch(0, 4).with_epoch(6, 10);
/// assert_eq!(index.epoch_count(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpochIndex {
    /// Epoch start time -> bucket count.
    epochs: BTreeMap<Epoch, u64>,
}

impl EpochIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an epoch starting at `start` with `buckets` buckets.
    ///
    /// A bucket count of zero is stored as one.
    pub fn with_epoch(mut self, start: Epoch, buckets: u64) -> Self {
        self.insert_epoch(start, buckets);
        self
    }

    /// Adds or replaces an epoch in place.
    pub fn insert_epoch(&mut self, start: Epoch, buckets: u64) {
        self.epochs.insert(start, buckets.max(1));
    }

    /// Returns the number of epochs.
    pub fn epoch_count(&self) -> usize {
        self.epochs.len()
    }

    /// Returns the epoch covering `time` and its bucket count.
    ///
    /// Times before the first epoch fall into the first epoch.
    pub fn epoch_for(&self, time: Time) -> Option<(Epoch, u64)> {
        self.epochs
            .range(..=time)
            .next_back()
            .or_else(|| self.epochs.iter().next())
            .map(|(&start, &buckets)| (start, buckets))
    }

    /// Returns the bucket count of the latest epoch.
    pub fn latest_bucket_count(&self) -> Option<u64> {
        self.epochs.values().next_back().copied()
    }
}

/// Resolver placing a point in the epoch covering its time and the bucket
/// `address % bucket_count`.
///
/// An empty index resolves everything to `(0, 0)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EpochResolver;

impl LocationResolver<EpochIndex> for EpochResolver {
    fn resolve(&self, time: Time, address: Address, index: &EpochIndex) -> Location {
        match index.epoch_for(time) {
            Some((epoch, buckets)) => Location::new(epoch, bucket_of(address, buckets)),
            None => Location::default(),
        }
    }
}

fn bucket_of(address: Address, buckets: u64) -> Bucket {
    address % buckets.max(1)
}
