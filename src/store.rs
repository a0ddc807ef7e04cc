//! The flat key-value store a backend persists into.
//!
//! A flat store has no notion of directories. Keys are plain strings, and a
//! hierarchy only exists by convention: `/` separates levels and a key ending
//! in `/` is a zero-length directory marker. Listing with a prefix and a
//! delimiter groups keys continuing past the delimiter into "common
//! prefixes", which is how directories are recovered.
//!
//! [`FlatStore`] is the seam between the filesystem emulation and a concrete
//! store client. [`memory::MemoryStore`] keeps everything in process and is
//! what the tests run against; [`objectstore::ObjectStoreClient`] talks to
//! anything the `object_store` crate supports, S3 in particular.

pub mod memory;
pub mod objectstore;

use std::future::Future;

use bytes::Bytes;

use crate::error::StoreError;

/// The level separator of store keys.
pub const DELIMITER: char = '/';

/// Metadata of one stored object, as returned by a metadata-only probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    /// Payload length in bytes.
    pub size: u64,
    /// Milliseconds since the UNIX epoch.
    pub last_modified_ms: u64,
}

/// One request of a paginated prefix+delimiter listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest<'a> {
    pub prefix: &'a str,
    pub delimiter: char,
    /// Token returned by the previous page, `None` for the first page.
    pub continuation: Option<String>,
}

/// One page of a listing, both channels in the store's key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Full prefixes (including the delimiter) of keys continuing past the
    /// delimiter.
    pub common_prefixes: Vec<String>,
    /// Full keys directly under the prefix.
    pub keys: Vec<String>,
    /// Present when more pages follow.
    pub continuation: Option<String>,
}

/// A flat key-value object store.
///
/// Writes are whole-object overwrites and last writer wins. Implementations
/// must be safe to share between tasks.
pub trait FlatStore: Send + Sync {
    /// Metadata-only probe, no content transfer.
    fn head(&self, key: &str) -> impl Future<Output = Result<ObjectMeta, StoreError>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = Result<Bytes, StoreError>> + Send;

    fn put(&self, key: &str, payload: Bytes)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Deletes a key. Deleting a missing key may or may not be an error,
    /// depending on the store.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list_page(
        &self,
        request: ListRequest<'_>,
    ) -> impl Future<Output = Result<ListPage, StoreError>> + Send;
}

/// Whether a key names a directory marker.
pub fn is_directory_key(key: &str) -> bool {
    key.ends_with(DELIMITER)
}

/// The marker key of the directory at `path`.
pub fn directory_key(path: &str) -> String {
    if path.is_empty() || is_directory_key(path) {
        path.to_owned()
    } else {
        format!("{path}{DELIMITER}")
    }
}
