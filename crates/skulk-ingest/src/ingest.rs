//! Applying grouped batches to a bucket store.
//!
//! ```text
//! raw buffer → group → persisted_len(extended) → resolve pointers
//!            → append simple + pointers → append extended → latest markers
//! ```
//!
//! Pointer resolution runs before the first append, so a resolution failure
//! leaves the store untouched.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::group::{BatchGrouper, ExtendedMaxTime, GroupedBatch, GroupingConfig, SimpleMaxTime};
use crate::point::{Location, RECORD_SIZE};
use crate::resolver::LocationResolver;
use crate::store::{BucketReader, BucketStore, StoreKind};

/// What a call to [`ingest_batch`] wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Simple locations appended to.
    pub simple_locations: usize,
    /// Extended locations appended to.
    pub extended_locations: usize,
    /// Bytes appended to the simple store, pointer records included.
    pub simple_bytes: usize,
    /// Pointer records appended to the simple store.
    pub pointer_records: usize,
    /// Bytes appended to the extended store.
    pub extended_bytes: usize,
    /// Latest simple time of the batch.
    pub simple_max: SimpleMaxTime,
    /// Latest extended time of the batch.
    pub extended_max: ExtendedMaxTime,
}

/// Persists a grouped batch.
///
/// For every simple location the simple records are appended followed by
/// the resolved pointer records; extended frames go to the extended store
/// afterwards, and the latest-write markers last.
///
/// # Errors
///
/// Returns an error from the store, or
/// [`IngestError::InternalInvariantViolation`](crate::IngestError::InternalInvariantViolation)
/// if pointer resolution fails. In the latter case nothing is written.
pub fn ingest_batch<S>(store: &mut S, batch: &GroupedBatch) -> Result<IngestSummary>
where
    S: BucketStore + ?Sized,
{
    let mut lengths = BTreeMap::new();
    for location in batch.referenced_extended_locations() {
        lengths.insert(location, store.persisted_len(StoreKind::Extended, location)?);
    }
    let resolved = batch.resolve_pointers(&lengths)?;

    let mut summary = IngestSummary {
        simple_max: batch.simple_max,
        extended_max: batch.extended_max,
        ..IngestSummary::default()
    };

    let simple_locations = batch.simple_locations();
    for location in &simple_locations {
        let records = batch.simple.get(location).unwrap_or_default();
        let pointers = resolved.get(location).map(Vec::as_slice).unwrap_or_default();

        let mut bytes = Vec::with_capacity(records.len() + pointers.len());
        bytes.extend_from_slice(records);
        bytes.extend_from_slice(pointers);
        store.append(StoreKind::Simple, *location, &bytes)?;

        summary.simple_bytes += bytes.len();
        summary.pointer_records += pointers.len() / RECORD_SIZE;
    }
    summary.simple_locations = simple_locations.len();

    for (location, frames) in batch.extended.iter() {
        store.append(StoreKind::Extended, *location, frames)?;
        summary.extended_bytes += frames.len();
    }
    summary.extended_locations = batch.extended.len();

    if !simple_locations.is_empty() {
        store.mark_latest(StoreKind::Simple, batch.simple_max.0)?;
    }
    if !batch.extended.is_empty() {
        store.mark_latest(StoreKind::Extended, batch.extended_max.0)?;
    }

    debug!(
        simple_locations = summary.simple_locations,
        extended_locations = summary.extended_locations,
        simple_bytes = summary.simple_bytes,
        extended_bytes = summary.extended_bytes,
        pointer_records = summary.pointer_records,
        "ingested batch"
    );
    Ok(summary)
}

/// Groups raw buffers and persists them with a fixed resolver and index
/// snapshots.
///
/// # Examples
/// ```rust
/// use alopex_skulk_ingest::ingest::BatchIngestor;
/// use alopex_skulk_ingest::point::{encode_points, Point};
/// use alopex_skulk_ingest::resolver::{EpochIndex, EpochResolver};
/// use alopex_skulk_ingest::store::MemoryStore;
///
/// let index = EpochIndex::new().with_epoch(0, 4);
/// let ingestor = BatchIngestor::new(EpochResolver, index.clone(), index);
/// let mut store = MemoryStore::new();
///
/// let buf = encode_points(&[Point::simple(2, 1, 7), Point::extended(3, 2, b"pony")]);
/// let summary = ingestor.ingest(&mut store, &buf).unwrap();
/// assert_eq!(summary.pointer_records, 1);
/// ```
#[derive(Debug, Clone)]
pub struct BatchIngestor<R, I> {
    resolver: R,
    simple_index: I,
    extended_index: I,
    grouper: BatchGrouper,
}

impl<R, I> BatchIngestor<R, I>
where
    R: LocationResolver<I>,
{
    /// Creates an ingestor with the default grouping configuration.
    pub fn new(resolver: R, simple_index: I, extended_index: I) -> Self {
        Self {
            resolver,
            simple_index,
            extended_index,
            grouper: BatchGrouper::default(),
        }
    }

    /// Replaces the grouping configuration.
    pub fn with_config(mut self, config: GroupingConfig) -> Self {
        self.grouper = BatchGrouper::new(config);
        self
    }

    /// Replaces the simple index snapshot, e.g. after an epoch rollover.
    pub fn set_simple_index(&mut self, index: I) {
        self.simple_index = index;
    }

    /// Replaces the extended index snapshot.
    pub fn set_extended_index(&mut self, index: I) {
        self.extended_index = index;
    }

    /// Groups `buf` without persisting it.
    pub fn group(&self, buf: &[u8]) -> Result<GroupedBatch> {
        self.grouper
            .group(buf, &self.resolver, &self.simple_index, &self.extended_index)
    }

    /// Groups `buf` and persists it to `store`.
    ///
    /// A malformed buffer is rejected before anything is written.
    pub fn ingest<S>(&self, store: &mut S, buf: &[u8]) -> Result<IngestSummary>
    where
        S: BucketStore + ?Sized,
    {
        let batch = self.group(buf)?;
        ingest_batch(store, &batch)
    }

    /// Returns a reader over `store` using this ingestor's extended index.
    pub fn reader<'a, S>(&'a self, store: &'a S) -> BucketReader<'a, S, R, I>
    where
        S: BucketStore + ?Sized,
    {
        BucketReader::new(store, &self.resolver, &self.extended_index)
    }

    /// Resolves the simple location of a point, for locating it on read.
    pub fn simple_location(&self, time: u64, address: u64) -> Location {
        self.resolver.resolve(time, address, &self.simple_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;
    use crate::group::{PointerBuilder, PointerContribution};
    use crate::point::{encode_points, Point};
    use crate::resolver::{EpochIndex, EpochResolver};
    use crate::store::{MemoryStore, StoredValue};

    fn ingestor() -> BatchIngestor<EpochResolver, EpochIndex> {
        let index = EpochIndex::new().with_epoch(0, 4).with_epoch(6, 10);
        BatchIngestor::new(EpochResolver, index.clone(), index)
    }

    #[test]
    fn test_pointers_follow_simple_records() {
        let ingestor = ingestor();
        let mut store = MemoryStore::new();
        let buf = encode_points(&[
            Point::extended(1, 1, b"hai"),
            Point::simple(0, 1, 5),
            Point::simple(4, 2, 6),
        ]);
        let summary = ingestor.ingest(&mut store, &buf).unwrap();
        assert_eq!(summary.pointer_records, 1);
        assert_eq!(summary.simple_bytes, 24 * 3);
        assert_eq!(summary.extended_bytes, 11);

        let object = store.object(StoreKind::Simple, Location::new(0, 0)).unwrap();
        assert_eq!(object.len(), 48);
        assert_eq!(&object[0..8], &0u64.to_le_bytes());
        assert_eq!(&object[24..32], &4u64.to_le_bytes());

        let pointer_object = store.object(StoreKind::Simple, Location::new(0, 1)).unwrap();
        assert_eq!(&pointer_object[0..8], &1u64.to_le_bytes());
        assert_eq!(&pointer_object[16..24], &0u64.to_le_bytes());
    }

    #[test]
    fn test_second_batch_offsets_after_persisted_bytes() {
        let ingestor = ingestor();
        let mut store = MemoryStore::new();
        ingestor
            .ingest(&mut store, &encode_points(&[Point::extended(1, 1, b"hai")]))
            .unwrap();
        ingestor
            .ingest(
                &mut store,
                &encode_points(&[Point::extended(1, 2, b"there"), Point::extended(5, 3, b"!")]),
            )
            .unwrap();

        let points = ingestor
            .reader(&store)
            .read_bucket(Location::new(0, 1))
            .unwrap();
        let payloads: Vec<_> = points
            .into_iter()
            .map(|p| match p.value {
                StoredValue::Payload(bytes) => bytes,
                StoredValue::Inline(_) => panic!("expected payload"),
            })
            .collect();
        assert_eq!(payloads, vec![b"hai".to_vec(), b"there".to_vec(), b"!".to_vec()]);
        assert_eq!(store.latest(StoreKind::Simple).unwrap(), 3);
        assert_eq!(store.latest(StoreKind::Extended).unwrap(), 3);
    }

    /// Store whose extended lengths cannot be read.
    struct UnreadableLengths(MemoryStore);

    impl BucketStore for UnreadableLengths {
        fn persisted_len(&self, kind: StoreKind, location: Location) -> Result<u64> {
            match kind {
                StoreKind::Extended => Err(IngestError::IoError(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "stat failed",
                ))),
                StoreKind::Simple => self.0.persisted_len(kind, location),
            }
        }

        fn append(&mut self, kind: StoreKind, location: Location, bytes: &[u8]) -> Result<()> {
            self.0.append(kind, location, bytes)
        }

        fn fetch(&self, kind: StoreKind, location: Location) -> Result<Vec<u8>> {
            self.0.fetch(kind, location)
        }

        fn mark_latest(&mut self, kind: StoreKind, time: u64) -> Result<()> {
            self.0.mark_latest(kind, time)
        }

        fn latest(&self, kind: StoreKind) -> Result<u64> {
            self.0.latest(kind)
        }
    }

    #[test]
    fn test_length_lookup_failure_writes_nothing() {
        let ingestor = ingestor();
        let mut store = UnreadableLengths(MemoryStore::new());
        let buf = encode_points(&[Point::simple(0, 1, 0), Point::extended(1, 2, b"abc")]);

        let err = ingestor.ingest(&mut store, &buf).unwrap_err();
        assert!(matches!(err, IngestError::IoError(_)));
        assert_eq!(store.0.object_count(StoreKind::Simple), 0);
        assert_eq!(store.0.object_count(StoreKind::Extended), 0);
    }

    #[test]
    fn test_batch_without_pointers_needs_no_lengths() {
        let mut batch = GroupedBatch::default();
        batch.simple.append(Location::new(0, 0), &[0u8; 24]);
        let mut store = UnreadableLengths(MemoryStore::new());
        let summary = ingest_batch(&mut store, &batch).unwrap();
        assert_eq!(summary.simple_bytes, 24);
        assert_eq!(summary.pointer_records, 0);
    }

    #[test]
    fn test_manual_chain_against_store() {
        let ext = Location::new(0, 1);
        let mut store = MemoryStore::new();
        store.append(StoreKind::Extended, ext, &[0u8; 16]).unwrap();

        let mut batch = GroupedBatch::default();
        batch.extended.append(ext, &[3, 0, 0, 0, 0, 0, 0, 0, b'a', b'b', b'c']);
        batch.pointers.insert(
            Location::new(0, 0),
            PointerBuilder::single(PointerContribution::new(1, 1, ext, 3)),
        );
        ingest_batch(&mut store, &batch).unwrap();

        let object = store.object(StoreKind::Simple, Location::new(0, 0)).unwrap();
        assert_eq!(&object[16..24], &16u64.to_le_bytes());
    }

    #[test]
    fn test_corrupt_input_writes_nothing() {
        let ingestor = ingestor();
        let mut store = MemoryStore::new();
        let mut buf = encode_points(&[Point::simple(0, 1, 0), Point::extended(1, 2, b"abc")]);
        buf.truncate(buf.len() - 2);

        let err = ingestor.ingest(&mut store, &buf).unwrap_err();
        assert!(matches!(err, IngestError::TruncatedRecord { .. }));
        assert_eq!(store.object_count(StoreKind::Simple), 0);
        assert_eq!(store.latest(StoreKind::Simple).unwrap(), 0);
    }

    #[test]
    fn test_empty_buffer_writes_nothing() {
        let ingestor = ingestor();
        let mut store = MemoryStore::new();
        let summary = ingestor.ingest(&mut store, &[]).unwrap();
        assert_eq!(summary, IngestSummary::default());
        assert_eq!(store.object_count(StoreKind::Simple), 0);
    }
}
