//! Skulk Ingest - write-path encoding for the Alopex Skulk point store
//!
//! This crate turns a raw stream of point records into per-bucket write
//! buffers for a bucketed on-disk store.
//!
//! # Components
//!
//! - [`point`]: point model and the raw record decoder
//! - [`group`]: single-pass grouping into simple buffers, extended frames,
//!   and deferred pointer chains
//! - [`resolver`]: the location resolver seam and an epoch/bucket resolver
//! - [`store`]: storage boundary, in-memory and file-backed stores, reader
//! - [`ingest`]: persisting grouped batches in the required order
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_skulk_ingest::group::group_points;
//! use alopex_skulk_ingest::resolver::{EpochIndex, EpochResolver};
//!
//! let index = EpochIndex::new().with_epoch(0, 4);
//! let batch = group_points(&raw, &EpochResolver, &index, &index)?;
//!
//! // Look up persisted extended lengths, then resolve pointer records.
//! let lengths = fetch_lengths(batch.referenced_extended_locations())?;
//! let pointers = batch.resolve_pointers(&lengths)?;
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod group;
pub mod ingest;
pub mod point;
pub mod resolver;
pub mod store;

pub use error::{ErrorKind, IngestError, Result};
pub use group::{
    group_points, BatchGrouper, ExtendedMaxTime, GroupedBatch, GroupingConfig, LocationWrites,
    PointerBuilder, SimpleMaxTime,
};
pub use ingest::{ingest_batch, BatchIngestor, IngestSummary};
pub use point::{Address, Location, Point, PointBody, Time};
pub use resolver::{EpochIndex, EpochResolver, LocationResolver};
pub use store::{BucketStore, FileStore, MemoryStore, StoreKind};
