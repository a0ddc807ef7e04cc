use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;

use bucketfs::error::StoreError;
use bucketfs::prelude::*;
use bucketfs::store::memory::MemoryStore;
use bucketfs::store::{ListPage, ListRequest, ObjectMeta};

/// Store that answers every request with an access-denied failure while
/// `denied` is set.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    denied: AtomicBool,
}

impl FlakyStore {
    fn deny(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.denied.load(Ordering::SeqCst) {
            Err(StoreError::Backend("AccessDenied: bucket policy".into()))
        } else {
            Ok(())
        }
    }
}

impl FlatStore for FlakyStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta, StoreError> {
        self.check()?;
        self.inner.head(key).await
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, payload: Bytes) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(key, payload).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn list_page(&self, request: ListRequest<'_>) -> Result<ListPage, StoreError> {
        self.check()?;
        self.inner.list_page(request).await
    }
}

#[tokio::test]
async fn failures_collapse_to_not_found_by_default() {
    let backend = ObjectStoreBackend::new(FlakyStore::default());
    backend
        .write_file("repo/.git/HEAD", "ref: refs/heads/main\n".into(), WriteOptions::default())
        .await
        .unwrap();
    backend.store().deny(true);

    let err = backend
        .read_file("repo/.git/HEAD", ReadOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    let cause = err.store_cause().expect("cause kept for diagnostics");
    assert!(!cause.is_absence());
    assert!(cause.to_string().contains("AccessDenied"));

    assert!(backend.stat("repo/.git/HEAD").await.unwrap_err().is_not_found());
    assert!(backend.readdir("repo/.git").await.unwrap_err().is_not_found());
    assert!(backend.unlink("repo/.git/HEAD").await.unwrap_err().is_not_found());
    let err = backend
        .write_file("repo/.git/ORIG_HEAD", "x".into(), WriteOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ENOENT");
}

#[tokio::test]
async fn preserve_policy_reports_store_failures() {
    let backend =
        ObjectStoreBackend::new(FlakyStore::default()).with_error_policy(ErrorPolicy::Preserve);
    backend.store().deny(true);

    let err = backend
        .read_file("repo/.git/HEAD", ReadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Store { .. }));
    assert_eq!(err.code(), "EIO");
    let err = backend.mkdir("repo/.git").await.unwrap_err();
    assert_eq!(err.code(), "EIO");

    backend.store().deny(false);
    let err = backend
        .read_file("repo/.git/HEAD", ReadOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(err.store_cause().unwrap().is_absence());
}

#[tokio::test]
async fn directory_stat_needs_no_store() {
    let backend = ObjectStoreBackend::new(FlakyStore::default());
    backend.store().deny(true);
    assert!(backend.stat("repo/.git/").await.unwrap().is_directory());
}
