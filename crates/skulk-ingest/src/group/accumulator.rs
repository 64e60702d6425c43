//! Per-location append-only write buffers.

use std::collections::btree_map::{self, BTreeMap};

use crate::point::Location;

/// Ordered byte buffers keyed by [`Location`].
///
/// Bytes for one location are kept in append order. Merging concatenates
/// per location and unions disjoint locations. A location that never
/// received bytes has no entry at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationWrites {
    buffers: BTreeMap<Location, Vec<u8>>,
}

impl LocationWrites {
    /// Creates an empty set of buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` to the buffer at `location`.
    ///
    /// Appending nothing leaves the map unchanged.
    pub fn append(&mut self, location: Location, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.buffer_mut(location, 0).extend_from_slice(bytes);
    }

    /// Returns the buffer at `location`, creating it with `capacity` reserved.
    pub(crate) fn buffer_mut(&mut self, location: Location, capacity: usize) -> &mut Vec<u8> {
        self.buffers
            .entry(location)
            .or_insert_with(|| Vec::with_capacity(capacity))
    }

    /// Appends every buffer of `other` after the matching buffer of `self`.
    pub fn merge(&mut self, other: LocationWrites) {
        for (location, bytes) in other.buffers {
            match self.buffers.entry(location) {
                btree_map::Entry::Vacant(slot) => {
                    slot.insert(bytes);
                }
                btree_map::Entry::Occupied(mut slot) => slot.get_mut().extend_from_slice(&bytes),
            }
        }
    }

    /// Returns the bytes accumulated at `location`.
    pub fn get(&self, location: &Location) -> Option<&[u8]> {
        self.buffers.get(location).map(Vec::as_slice)
    }

    /// Iterates locations in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (&Location, &[u8])> {
        self.buffers.iter().map(|(loc, bytes)| (loc, bytes.as_slice()))
    }

    /// Iterates the locations holding bytes.
    pub fn locations(&self) -> impl Iterator<Item = &Location> {
        self.buffers.keys()
    }

    /// Returns the number of locations holding bytes.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if no bytes were accumulated.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Total bytes across all locations.
    pub fn total_bytes(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }

    /// Consumes the buffers.
    pub fn into_inner(self) -> BTreeMap<Location, Vec<u8>> {
        self.buffers
    }
}

impl IntoIterator for LocationWrites {
    type Item = (Location, Vec<u8>);
    type IntoIter = btree_map::IntoIter<Location, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.buffers.into_iter()
    }
}
