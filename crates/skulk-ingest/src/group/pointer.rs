//! Deferred pointer records.
//!
//! Each extended point leaves a 24-byte pointer record in the simple store
//! whose third field is the absolute offset of the point's frame in the
//! extended store object. That offset depends on how many bytes the extended
//! object already holds, which is only known after an I/O round-trip the
//! grouping pass never performs. [`PointerBuilder`] therefore records what
//! each pointer needs and emits bytes only in [`PointerBuilder::resolve`],
//! once the caller supplies the persisted lengths.
//!
//! # Offset rule
//!
//! Pointers are chained per *simple* location. Every chain member captures
//! `chain_base`, the sum of frame lengths (prefix included) of the members
//! before it in the same chain. Resolution computes
//!
//! ```text
//! offset = persisted_len[extended_location] + chain_base
//! ```
//!
//! This is exact when every member of a chain targets the same extended
//! location. When one simple location's chain mixes extended locations, the
//! base counts bytes written to other extended locations as well, so the
//! resulting offsets do not line up with the extended buffers. Keep this
//! rule as-is: stored pointer records were written with it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::BuildHasher;

use tracing::error;

use crate::error::{IngestError, Result};
use crate::point::{record_bytes, Address, Location, Time, FRAME_PREFIX_SIZE, RECORD_SIZE};

/// Source of persisted extended-store lengths, keyed by extended location.
pub trait PersistedLengths {
    /// Returns the persisted byte length at `location`, if known.
    fn persisted_len(&self, location: &Location) -> Option<u64>;
}

impl PersistedLengths for BTreeMap<Location, u64> {
    fn persisted_len(&self, location: &Location) -> Option<u64> {
        self.get(location).copied()
    }
}

impl<S: BuildHasher> PersistedLengths for HashMap<Location, u64, S> {
    fn persisted_len(&self, location: &Location) -> Option<u64> {
        self.get(location).copied()
    }
}

/// A single extended point's contribution to a pointer chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerContribution {
    /// Address of the extended point (bit 0 set).
    pub address: Address,
    /// Time of the extended point.
    pub time: Time,
    /// Location of the point's frame in the extended store.
    pub extended_location: Location,
    /// Length of the point's frame, prefix included.
    pub frame_len: u64,
}

impl PointerContribution {
    /// Creates a contribution for a payload of `payload_len` bytes.
    pub fn new(
        address: Address,
        time: Time,
        extended_location: Location,
        payload_len: u64,
    ) -> Self {
        Self {
            address,
            time,
            extended_location,
            frame_len: payload_len.saturating_add(FRAME_PREFIX_SIZE as u64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ChainedPointer {
    contribution: PointerContribution,
    chain_base: u64,
}

/// Pointer chain for one simple location.
///
/// Composition is ordered: appending a builder shifts every member of the
/// appended chain by the total frame length already in this chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerBuilder {
    chain: Vec<ChainedPointer>,
    total_len: u64,
}

impl PointerBuilder {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a chain holding a single contribution.
    pub fn single(contribution: PointerContribution) -> Self {
        let mut builder = Self::new();
        builder.push(contribution);
        builder
    }

    /// Appends a contribution at the end of the chain.
    pub fn push(&mut self, contribution: PointerContribution) {
        self.chain.push(ChainedPointer {
            contribution,
            chain_base: self.total_len,
        });
        self.total_len = self.total_len.saturating_add(contribution.frame_len);
    }

    /// Appends `other` after this chain.
    pub fn append(&mut self, other: PointerBuilder) {
        let shift = self.total_len;
        self.chain
            .extend(other.chain.into_iter().map(|pointer| ChainedPointer {
                contribution: pointer.contribution,
                chain_base: pointer.chain_base.saturating_add(shift),
            }));
        self.total_len = self.total_len.saturating_add(other.total_len);
    }

    /// Total frame bytes contributed so far, prefixes included.
    pub fn total_len(&self) -> u64 {
        self.total_len
    }

    /// Number of pointer records in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Returns true if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Size in bytes of the resolved output.
    pub fn resolved_len(&self) -> usize {
        self.chain.len() * RECORD_SIZE
    }

    /// Iterates the contributions in chain order.
    pub fn contributions(&self) -> impl Iterator<Item = &PointerContribution> {
        self.chain.iter().map(|pointer| &pointer.contribution)
    }

    /// Extended locations referenced by this chain.
    pub fn extended_locations(&self) -> BTreeSet<Location> {
        self.contributions()
            .map(|contribution| contribution.extended_location)
            .collect()
    }

    /// Returns true if members of this chain target more than one extended
    /// location, in which case resolved offsets are not exact.
    pub fn spans_multiple_extended_locations(&self) -> bool {
        let mut locations = self.contributions().map(|c| c.extended_location);
        match locations.next() {
            Some(first) => locations.any(|loc| loc != first),
            None => false,
        }
    }

    /// Serializes the chain into pointer records.
    ///
    /// Every referenced extended location is checked against `lengths`
    /// before any byte is produced. The call is pure: resolving twice with
    /// the same map yields identical bytes.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::InternalInvariantViolation`] if `lengths` has
    /// no entry for a referenced extended location, or if an offset does not
    /// fit in 64 bits.
    pub fn resolve<L>(&self, lengths: &L) -> Result<Vec<u8>>
    where
        L: PersistedLengths + ?Sized,
    {
        let mut bases = Vec::with_capacity(self.chain.len());
        for pointer in &self.chain {
            let location = pointer.contribution.extended_location;
            let Some(persisted) = lengths.persisted_len(&location) else {
                error!(%location, "pointer resolution missing persisted length");
                return Err(IngestError::InternalInvariantViolation {
                    location,
                    reason: "no persisted length supplied for referenced extended location"
                        .to_string(),
                });
            };
            let offset = persisted.checked_add(pointer.chain_base).ok_or_else(|| {
                IngestError::InternalInvariantViolation {
                    location,
                    reason: format!(
                        "offset overflow: persisted {} + chain base {}",
                        persisted, pointer.chain_base
                    ),
                }
            })?;
            bases.push(offset);
        }

        let mut out = Vec::with_capacity(self.resolved_len());
        for (pointer, offset) in self.chain.iter().zip(bases) {
            let c = &pointer.contribution;
            out.extend_from_slice(&record_bytes(c.address, c.time, offset));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn offsets(bytes: &[u8]) -> Vec<u64> {
        bytes
            .chunks_exact(RECORD_SIZE)
            .map(|record| u64::from_le_bytes(record[16..24].try_into().unwrap()))
            .collect()
    }

    #[test]
    fn test_single_pointer_uses_persisted_length() {
        let ext = Location::new(0, 0);
        let builder = PointerBuilder::single(PointerContribution::new(1, 7, ext, 3));
        let lengths = BTreeMap::from([(ext, 100)]);
        let bytes = builder.resolve(&lengths).unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &7u64.to_le_bytes());
        assert_eq!(offsets(&bytes), vec![100]);
    }

    #[test]
    fn test_chain_threads_frame_lengths() {
        let ext = Location::new(0, 0);
        let mut builder = PointerBuilder::new();
        builder.push(PointerContribution::new(1, 1, ext, 3));
        builder.push(PointerContribution::new(1, 2, ext, 5));
        builder.push(PointerContribution::new(1, 3, ext, 0));
        assert_eq!(builder.total_len(), 11 + 13 + 8);

        let lengths = HashMap::from([(ext, 40)]);
        let bytes = builder.resolve(&lengths).unwrap();
        assert_eq!(offsets(&bytes), vec![40, 51, 64]);
    }

    #[test]
    fn test_append_shifts_by_running_total() {
        let ext = Location::new(0, 0);
        let mut left = PointerBuilder::single(PointerContribution::new(1, 1, ext, 3));
        let mut right = PointerBuilder::single(PointerContribution::new(1, 2, ext, 5));
        right.push(PointerContribution::new(1, 3, ext, 1));
        left.append(right);

        let lengths = BTreeMap::from([(ext, 0)]);
        assert_eq!(offsets(&left.resolve(&lengths).unwrap()), vec![0, 11, 24]);
        assert_eq!(left.total_len(), 11 + 13 + 9);
    }

    #[test]
    fn test_append_is_associative() {
        let ext = Location::new(2, 2);
        let a = PointerBuilder::single(PointerContribution::new(1, 1, ext, 2));
        let b = PointerBuilder::single(PointerContribution::new(3, 1, ext, 4));
        let c = PointerBuilder::single(PointerContribution::new(5, 1, ext, 6));

        let mut left = a.clone();
        left.append(b.clone());
        left.append(c.clone());

        let mut bc = b;
        bc.append(c);
        let mut right = a;
        right.append(bc);

        assert_eq!(left, right);
    }

    #[test]
    fn test_mixed_extended_locations_share_one_base() {
        let x = Location::new(0, 0);
        let y = Location::new(0, 2);
        let mut builder = PointerBuilder::new();
        builder.push(PointerContribution::new(1, 1, x, 3));
        builder.push(PointerContribution::new(3, 1, y, 4));
        builder.push(PointerContribution::new(1, 2, x, 5));
        assert!(builder.spans_multiple_extended_locations());
        assert_eq!(builder.extended_locations(), BTreeSet::from([x, y]));

        let lengths = BTreeMap::from([(x, 0), (y, 0)]);
        // The base keeps counting across extended locations.
        assert_eq!(offsets(&builder.resolve(&lengths).unwrap()), vec![0, 11, 23]);
    }

    #[test]
    fn test_missing_location_is_invariant_violation() {
        let x = Location::new(0, 0);
        let y = Location::new(0, 2);
        let mut builder = PointerBuilder::single(PointerContribution::new(1, 1, x, 3));
        builder.push(PointerContribution::new(3, 1, y, 4));

        let lengths = BTreeMap::from([(x, 0)]);
        let err = builder.resolve(&lengths).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InternalInvariant);
        match err {
            IngestError::InternalInvariantViolation { location, .. } => assert_eq!(location, y),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_offset_overflow_is_invariant_violation() {
        let x = Location::new(0, 0);
        let mut builder = PointerBuilder::single(PointerContribution::new(1, 1, x, 3));
        builder.push(PointerContribution::new(1, 2, x, 3));
        let lengths = BTreeMap::from([(x, u64::MAX)]);
        assert!(builder.resolve(&lengths).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_resolve_is_repeatable() {
        let x = Location::new(0, 0);
        let builder = PointerBuilder::single(PointerContribution::new(1, 1, x, 3));
        let lengths = BTreeMap::from([(x, 9)]);
        assert_eq!(
            builder.resolve(&lengths).unwrap(),
            builder.resolve(&lengths).unwrap()
        );
    }

    #[test]
    fn test_empty_builder_resolves_to_nothing() {
        let builder = PointerBuilder::new();
        let lengths: BTreeMap<Location, u64> = BTreeMap::new();
        assert!(builder.resolve(&lengths).unwrap().is_empty());
        assert!(!builder.spans_multiple_extended_locations());
    }
}
