//! Record decoder for the raw ingestion wire format.
//!
//! The input is a bare concatenation of records with no length or count
//! prefix. Record boundaries come only from cumulative consumed byte counts.

use crate::error::{IngestError, Result};
use crate::point::{is_extended_address, Point, PointBody, RECORD_SIZE};

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(word)
}

/// Decodes the record starting at `offset`.
///
/// Returns the point and the offset of the next record.
///
/// # Errors
///
/// Returns [`IngestError::TruncatedRecord`] when fewer than 24 bytes remain,
/// or when an extended payload length would run past the end of `buf`.
pub fn decode_record(buf: &[u8], offset: usize) -> Result<(Point<'_>, usize)> {
    let available = buf.len().saturating_sub(offset);
    if available < RECORD_SIZE {
        return Err(IngestError::TruncatedRecord {
            offset,
            needed: RECORD_SIZE as u64,
            available,
        });
    }

    let address = read_u64(buf, offset);
    let time = read_u64(buf, offset + 8);
    let third = read_u64(buf, offset + 16);
    let header_end = offset + RECORD_SIZE;

    if !is_extended_address(address) {
        let point = Point {
            address,
            time,
            body: PointBody::Simple { data: third },
        };
        return Ok((point, header_end));
    }

    let truncated = || IngestError::TruncatedRecord {
        offset,
        needed: (RECORD_SIZE as u64).saturating_add(third),
        available,
    };
    let len = usize::try_from(third).map_err(|_| truncated())?;
    let payload_end = header_end.checked_add(len).ok_or_else(truncated)?;
    if payload_end > buf.len() {
        return Err(truncated());
    }

    // Zero-length payloads never touch the buffer.
    let payload: &[u8] = if len == 0 {
        &[]
    } else {
        &buf[header_end..payload_end]
    };

    let point = Point {
        address,
        time,
        body: PointBody::Extended { payload },
    };
    Ok((point, payload_end))
}

/// Iterator over every record of a raw buffer.
///
/// Yields `Err` at most once and then stops.
#[derive(Debug, Clone)]
pub struct RecordIter<'a> {
    buf: &'a [u8],
    cursor: usize,
    failed: bool,
}

impl<'a> RecordIter<'a> {
    /// Creates an iterator starting at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            cursor: 0,
            failed: false,
        }
    }

    /// Offset of the next record to decode.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<Point<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.buf.len() {
            return None;
        }
        match decode_record(self.buf, self.cursor) {
            Ok((point, next)) => {
                self.cursor = next;
                Some(Ok(point))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Serializes points into the raw ingestion wire format.
pub fn encode_points(points: &[Point<'_>]) -> Vec<u8> {
    let size = points.iter().map(Point::encoded_len).sum();
    let mut out = Vec::with_capacity(size);
    for point in points {
        point.encode_into(&mut out);
    }
    out
}
