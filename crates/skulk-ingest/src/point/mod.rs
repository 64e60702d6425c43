//! Point data model and the raw record decoder.
//!
//! A point is a fixed 24-byte header of three little-endian `u64` fields:
//!
//! ```text
//! +----------+----------+-------------------------------+
//! | address  |   time   | data (simple) / len (extended) |
//! +----------+----------+-------------------------------+
//!      8          8                    8
//! ```
//!
//! Bit 0 of the address selects the kind. A simple point keeps its third
//! field as inline data. An extended point uses it as the length of a payload
//! that immediately follows the header.

pub mod decoder;

use std::fmt;

pub use decoder::{decode_record, encode_points, RecordIter};

/// Point address. Bit 0 is the simple/extended discriminator.
pub type Address = u64;

/// Point time, used for ordering and bucket resolution only.
pub type Time = u64;

/// Epoch component of a [`Location`].
pub type Epoch = u64;

/// Bucket component of a [`Location`].
pub type Bucket = u64;

/// Size of a point header (and of every record in a simple bucket).
pub const RECORD_SIZE: usize = 24;

/// Size of the length prefix of an extended frame.
pub const FRAME_PREFIX_SIZE: usize = 8;

/// Returns true if `address` denotes an extended point.
#[inline]
pub fn is_extended_address(address: Address) -> bool {
    address & 1 == 1
}

/// Destination bucket key produced by a location resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Location {
    /// Epoch the bucket belongs to.
    pub epoch: Epoch,
    /// Bucket within the epoch.
    pub bucket: Bucket,
}

impl Location {
    /// Creates a new location.
    pub const fn new(epoch: Epoch, bucket: Bucket) -> Self {
        Self { epoch, bucket }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.epoch, self.bucket)
    }
}

/// Body of a decoded point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointBody<'a> {
    /// Opaque inline data stored verbatim in the third header field.
    Simple {
        /// Inline data.
        data: u64,
    },
    /// Variable-length payload borrowed from the input buffer.
    Extended {
        /// Payload bytes (possibly empty).
        payload: &'a [u8],
    },
}

/// A single decoded point, borrowing its payload from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point<'a> {
    /// Point address.
    pub address: Address,
    /// Point time.
    pub time: Time,
    /// Inline data or extended payload.
    pub body: PointBody<'a>,
}

impl<'a> Point<'a> {
    /// Creates a simple point. The address should have bit 0 clear.
    pub fn simple(address: Address, time: Time, data: u64) -> Self {
        debug_assert!(!is_extended_address(address));
        Self {
            address,
            time,
            body: PointBody::Simple { data },
        }
    }

    /// Creates an extended point. The address should have bit 0 set.
    pub fn extended(address: Address, time: Time, payload: &'a [u8]) -> Self {
        debug_assert!(is_extended_address(address));
        Self {
            address,
            time,
            body: PointBody::Extended { payload },
        }
    }

    /// Returns true for an extended point.
    pub fn is_extended(&self) -> bool {
        matches!(self.body, PointBody::Extended { .. })
    }

    /// Returns the extended payload, if any.
    pub fn payload(&self) -> Option<&'a [u8]> {
        match self.body {
            PointBody::Extended { payload } => Some(payload),
            PointBody::Simple { .. } => None,
        }
    }

    /// Size of this point on the wire: header plus payload.
    pub fn encoded_len(&self) -> usize {
        match self.body {
            PointBody::Simple { .. } => RECORD_SIZE,
            PointBody::Extended { payload } => RECORD_SIZE + payload.len(),
        }
    }

    /// Appends the wire representation of this point to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.extend_from_slice(&self.address.to_le_bytes());
        out.extend_from_slice(&self.time.to_le_bytes());
        match self.body {
            PointBody::Simple { data } => out.extend_from_slice(&data.to_le_bytes()),
            PointBody::Extended { payload } => {
                out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
                out.extend_from_slice(payload);
            }
        }
    }
}

/// Serializes a 24-byte record from its three fields.
pub(crate) fn record_bytes(address: Address, time: Time, third: u64) -> [u8; RECORD_SIZE] {
    let mut bytes = [0u8; RECORD_SIZE];
    bytes[0..8].copy_from_slice(&address.to_le_bytes());
    bytes[8..16].copy_from_slice(&time.to_le_bytes());
    bytes[16..24].copy_from_slice(&third.to_le_bytes());
    bytes
}
