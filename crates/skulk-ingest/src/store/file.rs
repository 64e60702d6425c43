//! File-backed bucket store.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   simple_{epoch:016x}_{bucket:016x}.bucket
//!   extended_{epoch:016x}_{bucket:016x}.bucket
//!   simple.latest      (time u64 LE + CRC32 u32 LE)
//!   extended.latest
//! ```
//!
//! Bucket objects are plain append-only files. Their length on disk is the
//! persisted length used for pointer resolution.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::point::{Location, Time};
use crate::store::{BucketStore, StoreKind};

/// Bucket object file extension.
const BUCKET_EXTENSION: &str = "bucket";

/// Latest-write marker file extension.
const LATEST_EXTENSION: &str = "latest";

/// Size of a latest-write marker file: time + CRC32.
const LATEST_MARKER_SIZE: usize = 12;

/// Sync mode for bucket appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Fsync after each append (default, highest durability).
    #[default]
    Fsync,
    /// Use fdatasync (skip metadata update, faster).
    Fdatasync,
    /// No sync (fastest, lowest durability - for testing only).
    None,
}

/// Configuration for [`FileStore`].
#[derive(Debug, Clone, Default)]
pub struct FileStoreConfig {
    /// Sync mode for durability guarantees.
    pub sync_mode: SyncMode,
}

impl FileStoreConfig {
    /// Sets the sync mode.
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }
}

/// Bucket store backed by one file per bucket object.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    config: FileStoreConfig,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: impl AsRef<Path>, config: FileStoreConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root, config })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds a file name using `{kind}_{epoch:016x}_{bucket:016x}.bucket`.
    pub fn file_name(kind: StoreKind, location: Location) -> String {
        format!(
            "{}_{:016x}_{:016x}.{}",
            kind.as_str(),
            location.epoch,
            location.bucket,
            BUCKET_EXTENSION
        )
    }

    /// Parses a bucket file name into its kind and location.
    pub fn parse_file_name(name: &str) -> Option<(StoreKind, Location)> {
        let name = name.strip_suffix(&format!(".{}", BUCKET_EXTENSION))?;
        let mut parts = name.split('_');
        let kind = match parts.next()? {
            "simple" => StoreKind::Simple,
            "extended" => StoreKind::Extended,
            _ => return None,
        };
        let epoch_hex = parts.next()?;
        let bucket_hex = parts.next()?;
        if parts.next().is_some() || epoch_hex.len() != 16 || bucket_hex.len() != 16 {
            return None;
        }
        let epoch = u64::from_str_radix(epoch_hex, 16).ok()?;
        let bucket = u64::from_str_radix(bucket_hex, 16).ok()?;
        Some((kind, Location::new(epoch, bucket)))
    }

    /// Path of the object at `location`.
    pub fn bucket_path(&self, kind: StoreKind, location: Location) -> PathBuf {
        self.root.join(Self::file_name(kind, location))
    }

    fn latest_path(&self, kind: StoreKind) -> PathBuf {
        self.root
            .join(format!("{}.{}", kind.as_str(), LATEST_EXTENSION))
    }

    /// Lists the locations holding an object of `kind`, in ascending order.
    pub fn locations(&self, kind: StoreKind) -> Result<Vec<Location>> {
        let mut locations: Vec<Location> = fs::read_dir(&self.root)?
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name();
                Self::parse_file_name(name.to_str()?)
            })
            .filter(|(k, _)| *k == kind)
            .map(|(_, location)| location)
            .collect();
        locations.sort_unstable();
        Ok(locations)
    }

    fn sync(&self, file: &File) -> io::Result<()> {
        match self.config.sync_mode {
            SyncMode::Fsync => file.sync_all(),
            SyncMode::Fdatasync => file.sync_data(),
            SyncMode::None => Ok(()),
        }
    }
}

fn not_found_as<T>(result: io::Result<T>, default: T) -> io::Result<T> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(default),
        other => other,
    }
}

impl BucketStore for FileStore {
    fn persisted_len(&self, kind: StoreKind, location: Location) -> Result<u64> {
        let path = self.bucket_path(kind, location);
        let len = not_found_as(fs::metadata(&path).map(|meta| meta.len()), 0)?;
        Ok(len)
    }

    fn append(&mut self, kind: StoreKind, location: Location, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let path = self.bucket_path(kind, location);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(bytes)?;
        self.sync(&file)?;
        debug!(%kind, %location, bytes = bytes.len(), "appended bucket object");
        Ok(())
    }

    fn fetch(&self, kind: StoreKind, location: Location) -> Result<Vec<u8>> {
        let path = self.bucket_path(kind, location);
        Ok(not_found_as(fs::read(&path), Vec::new())?)
    }

    fn mark_latest(&mut self, kind: StoreKind, time: Time) -> Result<()> {
        if time <= self.latest(kind)? {
            return Ok(());
        }

        let mut marker = Vec::with_capacity(LATEST_MARKER_SIZE);
        marker.extend_from_slice(&time.to_le_bytes());
        marker.extend_from_slice(&crc32fast::hash(&time.to_le_bytes()).to_le_bytes());

        // Replaced atomically via temp file + rename.
        let path = self.latest_path(kind);
        let tmp_path = path.with_extension(format!("{}.tmp", LATEST_EXTENSION));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&marker)?;
            self.sync(&file)?;
        }
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn latest(&self, kind: StoreKind) -> Result<Time> {
        let path = self.latest_path(kind);
        let marker = not_found_as(fs::read(&path), Vec::new())?;
        if marker.is_empty() {
            return Ok(0);
        }
        if marker.len() != LATEST_MARKER_SIZE {
            warn!(path = %path.display(), len = marker.len(), "malformed latest marker");
            return Err(IngestError::CorruptStore(format!(
                "latest marker {} has {} bytes, expected {}",
                path.display(),
                marker.len(),
                LATEST_MARKER_SIZE
            )));
        }

        let mut time_bytes = [0u8; 8];
        time_bytes.copy_from_slice(&marker[0..8]);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&marker[8..12]);

        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32fast::hash(&time_bytes);
        if expected != actual {
            warn!(path = %path.display(), expected, actual, "latest marker checksum mismatch");
            return Err(IngestError::CorruptStore(format!(
                "latest marker {} checksum mismatch: expected {}, got {}",
                path.display(),
                expected,
                actual
            )));
        }
        Ok(u64::from_le_bytes(time_bytes))
    }
}
