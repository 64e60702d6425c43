//! Single-pass grouping of a raw point buffer into per-bucket writes.
//!
//! # Architecture
//!
//! ```text
//! raw buffer ─► decode ─► resolve simple location ─┬─► simple buffer   (simple point)
//!                                                  └─► extended frame  (extended point)
//!                                                      + pointer chain at the simple location
//! ```
//!
//! Grouping is pure: it reads the input buffer and the index snapshots, and
//! returns a [`GroupedBatch`]. Pointer chains stay deferred until the caller
//! has looked up persisted extended lengths (see [`pointer`]).

pub mod accumulator;
pub mod pointer;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::error::{IngestError, Result};
use crate::point::{decode_record, Location, PointBody, Time, FRAME_PREFIX_SIZE, RECORD_SIZE};
use crate::resolver::LocationResolver;

pub use accumulator::LocationWrites;
pub use pointer::{PersistedLengths, PointerBuilder, PointerContribution};

/// Configuration for [`BatchGrouper`].
#[derive(Debug, Clone)]
pub struct GroupingConfig {
    /// Largest extended payload accepted, in bytes.
    ///
    /// Default: `u64::MAX`, i.e. only the buffer bounds apply.
    pub max_payload_len: u64,

    /// Records to preallocate for each new simple location.
    ///
    /// Default: 0.
    pub simple_capacity_hint: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            max_payload_len: u64::MAX,
            simple_capacity_hint: 0,
        }
    }
}

impl GroupingConfig {
    /// Sets the maximum extended payload length.
    pub fn with_max_payload_len(mut self, max: u64) -> Self {
        self.max_payload_len = max;
        self
    }

    /// Sets the per-location preallocation hint, in records.
    pub fn with_simple_capacity_hint(mut self, records: usize) -> Self {
        self.simple_capacity_hint = records;
        self
    }
}

/// Latest time written to the simple store by a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimpleMaxTime(pub Time);

/// Latest time written to the extended store by a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExtendedMaxTime(pub Time);

/// Output of one grouping pass.
#[derive(Debug, Clone, Default)]
pub struct GroupedBatch {
    /// Simple records per simple location.
    pub simple: LocationWrites,
    /// Extended frames per extended location.
    pub extended: LocationWrites,
    /// Deferred pointer records per simple location.
    pub pointers: BTreeMap<Location, PointerBuilder>,
    /// Max time over every point in the batch.
    pub simple_max: SimpleMaxTime,
    /// Max time over extended points only.
    pub extended_max: ExtendedMaxTime,
}

impl GroupedBatch {
    /// Returns true if the batch holds no writes.
    pub fn is_empty(&self) -> bool {
        self.simple.is_empty() && self.extended.is_empty() && self.pointers.is_empty()
    }

    /// Extended locations that pointer resolution will need lengths for.
    pub fn referenced_extended_locations(&self) -> BTreeSet<Location> {
        self.pointers
            .values()
            .flat_map(PointerBuilder::contributions)
            .map(|c| c.extended_location)
            .collect()
    }

    /// Simple locations touched by the batch, through records or pointers.
    pub fn simple_locations(&self) -> BTreeSet<Location> {
        self.simple
            .locations()
            .chain(self.pointers.keys())
            .copied()
            .collect()
    }

    /// Resolves every pointer chain.
    ///
    /// # Errors
    ///
    /// Fails with [`IngestError::InternalInvariantViolation`] when `lengths`
    /// misses a referenced extended location. No partial result is returned.
    pub fn resolve_pointers<L>(&self, lengths: &L) -> Result<BTreeMap<Location, Vec<u8>>>
    where
        L: PersistedLengths + ?Sized,
    {
        let mut resolved = BTreeMap::new();
        for (location, builder) in &self.pointers {
            if builder.spans_multiple_extended_locations() {
                debug!(%location, "pointer chain spans several extended locations");
            }
            resolved.insert(*location, builder.resolve(lengths)?);
        }
        Ok(resolved)
    }

    /// Appends a later batch after this one.
    pub fn merge(&mut self, other: GroupedBatch) {
        self.simple.merge(other.simple);
        self.extended.merge(other.extended);
        for (location, builder) in other.pointers {
            self.pointers.entry(location).or_default().append(builder);
        }
        self.simple_max = self.simple_max.max(other.simple_max);
        self.extended_max = self.extended_max.max(other.extended_max);
    }
}

/// Groups raw buffers into per-location writes.
#[derive(Debug, Clone, Default)]
pub struct BatchGrouper {
    config: GroupingConfig,
}

impl BatchGrouper {
    /// Creates a grouper with the given configuration.
    pub fn new(config: GroupingConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GroupingConfig {
        &self.config
    }

    /// Scans `buf` once and groups every point by location.
    ///
    /// The simple location is resolved for every point against
    /// `simple_index`; extended points are additionally resolved against
    /// `extended_index`.
    ///
    /// # Errors
    ///
    /// Any decoding failure aborts the scan. No partial batch is returned.
    pub fn group<R, I>(
        &self,
        buf: &[u8],
        resolver: &R,
        simple_index: &I,
        extended_index: &I,
    ) -> Result<GroupedBatch>
    where
        R: LocationResolver<I> + ?Sized,
        I: ?Sized,
    {
        let mut batch = GroupedBatch::default();
        let simple_capacity = self.config.simple_capacity_hint.saturating_mul(RECORD_SIZE);
        let mut cursor = 0;
        let mut simple_points = 0usize;
        let mut extended_points = 0usize;

        while cursor < buf.len() {
            let (point, next) = decode_record(buf, cursor)?;
            let simple_location = resolver.resolve(point.time, point.address, simple_index);
            batch.simple_max = batch.simple_max.max(SimpleMaxTime(point.time));

            match point.body {
                PointBody::Simple { .. } => {
                    batch
                        .simple
                        .buffer_mut(simple_location, simple_capacity)
                        .extend_from_slice(&buf[cursor..next]);
                    simple_points += 1;
                }
                PointBody::Extended { payload } => {
                    let len = payload.len() as u64;
                    if len > self.config.max_payload_len {
                        return Err(IngestError::PayloadTooLarge {
                            offset: cursor,
                            len,
                            limit: self.config.max_payload_len,
                        });
                    }

                    let extended_location =
                        resolver.resolve(point.time, point.address, extended_index);
                    batch.extended_max = batch.extended_max.max(ExtendedMaxTime(point.time));

                    let frame = batch
                        .extended
                        .buffer_mut(extended_location, FRAME_PREFIX_SIZE + payload.len());
                    frame.extend_from_slice(&len.to_le_bytes());
                    frame.extend_from_slice(payload);

                    batch
                        .pointers
                        .entry(simple_location)
                        .or_default()
                        .push(PointerContribution::new(
                            point.address,
                            point.time,
                            extended_location,
                            len,
                        ));
                    extended_points += 1;
                }
            }

            cursor = next;
        }

        debug!(
            bytes = buf.len(),
            simple_points,
            extended_points,
            simple_locations = batch.simple.len(),
            extended_locations = batch.extended.len(),
            "grouped batch"
        );
        Ok(batch)
    }
}

/// Groups `buf` with the default configuration.
///
/// See [`BatchGrouper::group`].
pub fn group_points<R, I>(
    buf: &[u8],
    resolver: &R,
    simple_index: &I,
    extended_index: &I,
) -> Result<GroupedBatch>
where
    R: LocationResolver<I> + ?Sized,
    I: ?Sized,
{
    BatchGrouper::default().group(buf, resolver, simple_index, extended_index)
}
