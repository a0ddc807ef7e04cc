use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::StoreError;
use crate::store::{FlatStore, ListPage, ListRequest, ObjectMeta};
use crate::translate::unix_millis;

/// Page size S3 uses for `ListObjectsV2`.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    payload: Bytes,
    last_modified_ms: u64,
}

/// Simple in-memory implementation of [`FlatStore`].
///
/// Keys are kept ordered, listings group by delimiter and paginate like S3
/// does, so the store doubles as a faithful stand-in for a bucket in tests.
/// Every request is counted, see [`MemoryStore::request_count`].
#[derive(Debug)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
    requests: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates a store returning at most `page_size` entries per listing page.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: page_size.max(1),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of requests served so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// All stored keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, StoredObject>> {
        self.objects.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn count_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    fn not_found(key: &str) -> StoreError {
        StoreError::NotFound {
            key: key.to_owned(),
        }
    }

    fn list(&self, request: &ListRequest<'_>) -> ListPage {
        let objects = self.read();
        let prefix = request.prefix;
        let delimiter = request.delimiter;

        // A token whose remainder contains the delimiter was a common prefix:
        // every key below it has been reported already.
        let skip_below = request
            .continuation
            .as_deref()
            .filter(|token| {
                token
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.contains(delimiter))
            });
        let start = match &request.continuation {
            Some(token) => Bound::Excluded(token.clone()),
            None => Bound::Included(prefix.to_owned()),
        };

        let mut page = ListPage::default();
        let mut emitted = 0;
        let mut last = None;
        for key in objects.range((start, Bound::Unbounded)).map(|(key, _)| key) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            if skip_below.is_some_and(|token| key.starts_with(token)) {
                continue;
            }
            let grouped = rest
                .find(delimiter)
                .map(|idx| key[..prefix.len() + idx + delimiter.len_utf8()].to_owned());
            if let Some(common) = &grouped {
                if page.common_prefixes.last() == Some(common) {
                    continue;
                }
            }
            if emitted == self.page_size {
                page.continuation = last;
                break;
            }
            emitted += 1;
            match grouped {
                Some(common) => {
                    last = Some(common.clone());
                    page.common_prefixes.push(common);
                }
                None => {
                    last = Some(key.clone());
                    page.keys.push(key.clone());
                }
            }
        }
        page
    }
}

impl FlatStore for MemoryStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        self.count_request();
        let objects = self.read();
        let object = objects.get(key).ok_or_else(|| Self::not_found(key))?;
        Ok(ObjectMeta {
            key: key.to_owned(),
            size: object.payload.len() as u64,
            last_modified_ms: object.last_modified_ms,
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.count_request();
        let objects = self.read();
        objects
            .get(key)
            .map(|object| object.payload.clone())
            .ok_or_else(|| Self::not_found(key))
    }

    async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        self.count_request();
        let object = StoredObject {
            payload,
            last_modified_ms: unix_millis(SystemTime::now()),
        };
        self.write().insert(key.to_owned(), object);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.count_request();
        // Like S3, deleting a missing key succeeds.
        self.write().remove(key);
        Ok(())
    }

    async fn list_page(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError> {
        self.count_request();
        Ok(self.list(&request))
    }
}
