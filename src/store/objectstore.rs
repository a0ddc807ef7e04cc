use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::{Path, PathPart};
use object_store::{parse_url, ObjectStore};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::StoreError;
use crate::store::{is_directory_key, FlatStore, ListPage, ListRequest, ObjectMeta, DELIMITER};

/// File name that stands in for a directory marker.
///
/// `object_store` paths cannot end in a separator, so the marker key `a/b/`
/// is stored at `a/b/.dir` and translated back when listing.
pub const DIRECTORY_MARKER: &str = ".dir";

/// Encoded form a user segment named like the marker is stored under.
/// `PathPart::from` always encodes `%`, so no other segment produces it.
const ESCAPED_MARKER: &str = "%2Edir";

/// Path part for one `/`-separated segment of a key.
fn segment(part: &str) -> PathPart<'_> {
    if part == DIRECTORY_MARKER {
        PathPart::parse(ESCAPED_MARKER).unwrap_or_else(|_| PathPart::from(part))
    } else {
        PathPart::from(part)
    }
}

/// [`FlatStore`] backed by an [`object_store`] compatible storage service
/// (e.g. S3, local filesystem, memory).
#[derive(Clone)]
pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    prefix: Path,
}

impl fmt::Debug for ObjectStoreClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreClient")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ObjectStoreClient {
    /// Wraps an existing store, keys starting at its root.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_prefix(store, Path::default())
    }

    /// Wraps an existing store, all keys nested below `prefix`.
    pub fn with_prefix(store: Arc<dyn ObjectStore>, prefix: Path) -> Self {
        Self { store, prefix }
    }

    /// Creates a client for the store described by `url`, e.g.
    /// `s3://bucket/prefix`, `file:///tmp/repo` or `memory:///`.
    pub fn with_url(url: &Url) -> Result<Self, object_store::Error> {
        let (store, prefix) = parse_url(url)?;
        Ok(Self::with_prefix(Arc::from(store), prefix))
    }

    /// Creates a client for an S3 bucket. Credentials are taken from the
    /// usual `AWS_*` environment variables.
    pub fn s3(bucket: &str, region: &str) -> Result<Self, object_store::Error> {
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(region)
            .build()?;
        Ok(Self::new(Arc::new(store)))
    }

    fn directory_location(&self, key: &str) -> Path {
        let parts = key
            .split(DELIMITER)
            .filter(|part| !part.is_empty())
            .map(segment);
        self.prefix.parts().chain(parts).collect()
    }

    fn location(&self, key: &str) -> Path {
        let path = self.directory_location(key);
        if is_directory_key(key) {
            path.child(DIRECTORY_MARKER)
        } else {
            path
        }
    }

    /// Maps a store location back to its key; `None` if it lies outside the
    /// client's prefix. Segments are percent-decoded.
    fn key_of(&self, location: &Path) -> Option<String> {
        let parts: Vec<PathPart<'_>> = location.prefix_match(&self.prefix)?.collect();
        let is_marker = parts
            .last()
            .is_some_and(|part| part.as_ref() == DIRECTORY_MARKER);
        let mut key = parts
            .iter()
            .map(|part| percent_decode_str(part.as_ref()).decode_utf8_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if is_marker {
            key.truncate(key.len() - DIRECTORY_MARKER.len());
        }
        Some(key)
    }
}

impl FlatStore for ObjectStoreClient {
    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        let meta = self.store.head(&self.location(key)).await?;
        Ok(ObjectMeta {
            key: key.to_owned(),
            size: meta.size as u64,
            last_modified_ms: u64::try_from(meta.last_modified.timestamp_millis()).unwrap_or(0),
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let object = self.store.get(&self.location(key)).await?;
        Ok(object.bytes().await?)
    }

    async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        self.store.put(&self.location(key), payload.into()).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&self.location(key)).await?;
        Ok(())
    }

    /// `object_store` pages internally, so every listing is returned as a
    /// single page. Prefixes not ending in the delimiter are served by
    /// listing the enclosing directory and filtering.
    async fn list_page(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError> {
        if request.delimiter != DELIMITER {
            return Err(StoreError::Backend(
                format!("unsupported listing delimiter `{}`", request.delimiter).into(),
            ));
        }
        let directory = match request.prefix.rfind(DELIMITER) {
            Some(idx) => &request.prefix[..=idx],
            None => "",
        };
        let location = self.directory_location(directory);
        let scope = (!location.as_ref().is_empty()).then_some(&location);
        let listing = self.store.list_with_delimiter(scope).await?;

        let mut keys: Vec<String> = listing
            .objects
            .iter()
            .filter_map(|meta| self.key_of(&meta.location))
            .filter(|key| key.starts_with(request.prefix))
            .collect();
        // Local filesystem listings come back unordered.
        keys.sort();
        let mut common_prefixes: Vec<String> = listing
            .common_prefixes
            .iter()
            .filter_map(|location| self.key_of(location))
            .map(|key| format!("{key}{DELIMITER}"))
            .filter(|key| key.starts_with(request.prefix))
            .collect();
        common_prefixes.sort();

        Ok(ListPage {
            common_prefixes,
            keys,
            continuation: None,
        })
    }
}
