//! Reading simple buckets back, following pointer records.

use std::collections::BTreeMap;

use tracing::warn;

use crate::error::{IngestError, Result};
use crate::point::{
    is_extended_address, Address, Location, Time, FRAME_PREFIX_SIZE, RECORD_SIZE,
};
use crate::resolver::LocationResolver;
use crate::store::{BucketStore, StoreKind};

/// Value of a point read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    /// Inline data of a simple point.
    Inline(u64),
    /// Payload of an extended point, fetched through its pointer record.
    Payload(Vec<u8>),
}

/// A point read back from a simple bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPoint {
    /// Point address.
    pub address: Address,
    /// Point time.
    pub time: Time,
    /// Inline data or dereferenced payload.
    pub value: StoredValue,
}

/// Reads simple bucket objects and dereferences pointer records.
///
/// Pointer records do not carry their extended location, so the reader
/// resolves it again from the record's time and address against the
/// extended index snapshot used at write time.
pub struct BucketReader<'a, S: ?Sized, R: ?Sized, I: ?Sized> {
    store: &'a S,
    resolver: &'a R,
    extended_index: &'a I,
}

impl<'a, S, R, I> BucketReader<'a, S, R, I>
where
    S: BucketStore + ?Sized,
    R: LocationResolver<I> + ?Sized,
    I: ?Sized,
{
    /// Creates a reader over `store`.
    pub fn new(store: &'a S, resolver: &'a R, extended_index: &'a I) -> Self {
        Self {
            store,
            resolver,
            extended_index,
        }
    }

    /// Reads every point of the simple bucket at `location`, in stored order.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::CorruptStore`] if the object is not a whole
    /// number of records or a pointer does not land on a complete frame.
    pub fn read_bucket(&self, location: Location) -> Result<Vec<StoredPoint>> {
        let records = self.store.fetch(StoreKind::Simple, location)?;
        if records.len() % RECORD_SIZE != 0 {
            return Err(IngestError::CorruptStore(format!(
                "simple object {} has {} bytes, not a multiple of {}",
                location,
                records.len(),
                RECORD_SIZE
            )));
        }

        let mut extended_objects: BTreeMap<Location, Vec<u8>> = BTreeMap::new();
        let mut points = Vec::with_capacity(records.len() / RECORD_SIZE);
        for record in records.chunks_exact(RECORD_SIZE) {
            let address = read_u64(record, 0);
            let time = read_u64(record, 8);
            let third = read_u64(record, 16);

            let value = if is_extended_address(address) {
                let extended_location =
                    self.resolver.resolve(time, address, self.extended_index);
                if !extended_objects.contains_key(&extended_location) {
                    let object = self.store.fetch(StoreKind::Extended, extended_location)?;
                    extended_objects.insert(extended_location, object);
                }
                let object = extended_objects
                    .get(&extended_location)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                StoredValue::Payload(read_frame(object, third, extended_location)?.to_vec())
            } else {
                StoredValue::Inline(third)
            };

            points.push(StoredPoint {
                address,
                time,
                value,
            });
        }
        Ok(points)
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

/// Returns the payload of the frame starting at `offset` in `object`.
fn read_frame(object: &[u8], offset: u64, location: Location) -> Result<&[u8]> {
    let corrupt = |what: &str| {
        warn!(%location, offset, object_len = object.len(), "{}", what);
        IngestError::CorruptStore(format!(
            "extended object {} at offset {}: {}",
            location, offset, what
        ))
    };

    let start = usize::try_from(offset).map_err(|_| corrupt("offset out of range"))?;
    let payload_start = start
        .checked_add(FRAME_PREFIX_SIZE)
        .filter(|&end| end <= object.len())
        .ok_or_else(|| corrupt("frame prefix past end of object"))?;
    let len = usize::try_from(read_u64(object, start))
        .map_err(|_| corrupt("frame length out of range"))?;
    let payload_end = payload_start
        .checked_add(len)
        .filter(|&end| end <= object.len())
        .ok_or_else(|| corrupt("frame payload past end of object"))?;
    Ok(&object[payload_start..payload_end])
}
