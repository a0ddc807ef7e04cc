//! Metadata synthesis and store error translation.
//!
//! Flat stores know objects, sizes and modification times, nothing more.
//! Directories get a fabricated record without asking the store, files get
//! the result of a metadata-only probe. Store failures are turned into the
//! [`StorageError`] vocabulary here and nowhere else.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::contract::{FileKind, StatRecord};
use crate::error::{StorageError, StoreError};
use crate::store::ObjectMeta;

/// Inode reported for objects of a flat store, which has no such concept.
pub const SENTINEL_INO: u64 = 0;

pub const FILE_MODE: u32 = 0o100644;
pub const DIRECTORY_MODE: u32 = 0o040755;
pub const SYMLINK_MODE: u32 = 0o120777;

/// How store failures other than plain absence reach the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Every failure is reported as `NotFound`. Clients treat that as "not
    /// created yet", which is what a version-control client expects from a
    /// fresh repository. The raw failure stays attached as the cause.
    #[default]
    Collapse,
    /// Only true absence is `NotFound`; everything else is
    /// [`StorageError::Store`].
    Preserve,
}

pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub fn mode_for(kind: FileKind) -> u32 {
    match kind {
        FileKind::File => FILE_MODE,
        FileKind::Directory => DIRECTORY_MODE,
        FileKind::Symlink => SYMLINK_MODE,
    }
}

/// Record for a directory-shaped path; no store round trip.
pub fn directory_stat() -> StatRecord {
    StatRecord {
        kind: FileKind::Directory,
        mode: DIRECTORY_MODE,
        size: 0,
        ino: SENTINEL_INO,
        mtime_ms: unix_millis(SystemTime::now()),
    }
}

/// Record for a file, from the result of a metadata probe.
pub fn file_stat(meta: &ObjectMeta) -> StatRecord {
    StatRecord {
        kind: FileKind::File,
        mode: FILE_MODE,
        size: meta.size,
        ino: SENTINEL_INO,
        mtime_ms: meta.last_modified_ms,
    }
}

/// Converts a store failure at `path` into the contract's vocabulary.
pub fn translate(policy: ErrorPolicy, path: &str, err: StoreError) -> StorageError {
    if err.is_absence() {
        debug!(path, "object absent");
        return StorageError::NotFound {
            path: path.to_owned(),
            cause: Some(err),
        };
    }
    match policy {
        ErrorPolicy::Collapse => {
            warn!(path, error = %err, "store failure reported as not found");
            StorageError::NotFound {
                path: path.to_owned(),
                cause: Some(err),
            }
        }
        ErrorPolicy::Preserve => StorageError::Store {
            path: path.to_owned(),
            source: err,
        },
    }
}
