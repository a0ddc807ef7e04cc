use bytes::Bytes;
use tracing::debug;

use crate::backend::DirectoryPolicy;
use crate::contract::{Encoding, FileData, ReadOptions, StatRecord, StorageBackend, WriteOptions};
use crate::error::{StorageError, StoreError};
use crate::listing::{read_directory, DirectoryView};
use crate::normalize::{PathNormalizer, RefDisambiguator};
use crate::store::{directory_key, is_directory_key, FlatStore, ListRequest, ObjectMeta, DELIMITER};
use crate::translate::{directory_stat, file_stat, translate, ErrorPolicy};

/// Storage backend over a flat object store.
///
/// Directories are emulated: `mkdir` writes a zero-length marker object
/// whose key ends in `/`, listings are derived from prefix enumeration, and
/// a directory also exists implicitly as soon as any key lives below it.
/// Every path goes through the normalizer `N` before it becomes a key.
#[derive(Debug)]
pub struct ObjectStoreBackend<S, N = RefDisambiguator> {
    store: S,
    normalizer: N,
    directory_policy: DirectoryPolicy,
    error_policy: ErrorPolicy,
}

impl<S> ObjectStoreBackend<S>
where
    S: FlatStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            normalizer: RefDisambiguator::default(),
            directory_policy: DirectoryPolicy::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl<S, N> ObjectStoreBackend<S, N> {
    /// Replaces the path normalization strategy.
    pub fn with_normalizer<M>(self, normalizer: M) -> ObjectStoreBackend<S, M> {
        ObjectStoreBackend {
            store: self.store,
            normalizer,
            directory_policy: self.directory_policy,
            error_policy: self.error_policy,
        }
    }

    pub fn with_directory_policy(mut self, policy: DirectoryPolicy) -> Self {
        self.directory_policy = policy;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn normalizer(&self) -> &N {
        &self.normalizer
    }

    pub fn directory_policy(&self) -> DirectoryPolicy {
        self.directory_policy
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }
}

impl<S, N> ObjectStoreBackend<S, N>
where
    S: FlatStore,
    N: PathNormalizer,
{
    /// The store key a logical path is kept under.
    pub fn key(&self, path: &str) -> String {
        self.normalizer.normalize(path).into_owned()
    }

    fn fail(&self, path: &str, err: StoreError) -> StorageError {
        translate(self.error_policy, path, err)
    }

    async fn head(&self, path: &str, key: &str) -> Result<ObjectMeta, StorageError> {
        self.store.head(key).await.map_err(|err| self.fail(path, err))
    }

    /// Whether anything besides the marker itself lives below `prefix`.
    /// Costs a single listing request.
    async fn has_children(&self, path: &str, prefix: &str) -> Result<bool, StorageError> {
        let page = self
            .store
            .list_page(ListRequest {
                prefix,
                delimiter: DELIMITER,
                continuation: None,
            })
            .await
            .map_err(|err| self.fail(path, err))?;
        Ok(!page.common_prefixes.is_empty()
            || page.keys.iter().any(|key| key != prefix)
            || page.continuation.is_some())
    }

    /// Lists the children of a directory together with their kinds.
    pub async fn read_directory(&self, path: &str) -> Result<DirectoryView, StorageError> {
        let prefix = directory_key(&self.key(path));
        read_directory(&self.store, &prefix)
            .await
            .map_err(|err| self.fail(path, err))
    }
}

impl<S, N> StorageBackend for ObjectStoreBackend<S, N>
where
    S: FlatStore,
    N: PathNormalizer,
{
    async fn read_file(&self, path: &str, options: ReadOptions) -> Result<FileData, StorageError> {
        let encoding = Encoding::parse(options.encoding.as_deref())?;
        let key = self.key(path);
        let bytes = self
            .store
            .get(&key)
            .await
            .map_err(|err| self.fail(path, err))?;
        debug!(path, key = %key, size = bytes.len(), "read file");
        Ok(FileData::decode(bytes, encoding))
    }

    async fn write_file(
        &self,
        path: &str,
        data: FileData,
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        // Text is already UTF-8; the label is only checked.
        Encoding::parse(options.encoding.as_deref())?;
        let key = self.key(path);
        let payload: Bytes = data.into_bytes();
        let size = payload.len();
        self.store
            .put(&key, payload)
            .await
            .map_err(|err| self.fail(path, err))?;
        debug!(path, key = %key, size, "wrote file");
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), StorageError> {
        let key = self.key(path);
        // Deletes of missing keys succeed on most stores, so probe first.
        self.head(path, &key).await?;
        self.store
            .delete(&key)
            .await
            .map_err(|err| self.fail(path, err))?;
        debug!(path, key = %key, "unlinked file");
        Ok(())
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let prefix = directory_key(&self.key(path));
        let view = read_directory(&self.store, &prefix)
            .await
            .map_err(|err| self.fail(path, err))?;
        if !view.is_empty() || prefix.is_empty() {
            return Ok(view.into_names());
        }

        // Nothing below the prefix: an empty directory, a file, or nothing.
        match self.head(path, &prefix).await {
            Ok(_) => return Ok(Vec::new()),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        let file_key = prefix.trim_end_matches(DELIMITER);
        match self.head(path, file_key).await {
            Ok(_) => Err(StorageError::NotADirectory {
                path: path.to_owned(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        let marker = directory_key(&self.key(path));
        let exists = || StorageError::AlreadyExists {
            path: path.to_owned(),
        };
        if marker.is_empty() {
            return Err(exists());
        }
        match self.head(path, &marker).await {
            Ok(_) => return Err(exists()),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }
        if self.directory_policy == DirectoryPolicy::Strict
            && self.has_children(path, &marker).await?
        {
            return Err(exists());
        }
        self.store
            .put(&marker, Bytes::new())
            .await
            .map_err(|err| self.fail(path, err))?;
        debug!(path, key = %marker, "created directory marker");
        Ok(())
    }

    async fn rmdir(&self, path: &str) -> Result<(), StorageError> {
        let marker = directory_key(&self.key(path));
        if marker.is_empty() {
            return Err(StorageError::Configuration(
                "the root directory cannot be removed".to_owned(),
            ));
        }
        self.head(path, &marker).await?;
        if self.directory_policy == DirectoryPolicy::Strict
            && self.has_children(path, &marker).await?
        {
            return Err(StorageError::NotEmpty {
                path: path.to_owned(),
            });
        }
        self.store
            .delete(&marker)
            .await
            .map_err(|err| self.fail(path, err))?;
        debug!(path, key = %marker, "removed directory marker");
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<StatRecord, StorageError> {
        if is_directory_key(path) {
            return Ok(directory_stat());
        }
        let key = self.key(path);
        if key.is_empty() {
            return Ok(directory_stat());
        }
        let meta = self.head(path, &key).await?;
        Ok(file_stat(&meta))
    }

    /// Flat stores have no links, so this is [`stat`](Self::stat).
    async fn lstat(&self, path: &str) -> Result<StatRecord, StorageError> {
        self.stat(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::FileKind;
    use crate::normalize::Verbatim;
    use crate::store::memory::MemoryStore;

    fn backend() -> ObjectStoreBackend<MemoryStore> {
        ObjectStoreBackend::new(MemoryStore::new())
    }

    #[test]
    fn builders_replace_policies_and_normalizer() {
        let backend = backend();
        assert_eq!(backend.directory_policy(), DirectoryPolicy::Lenient);
        assert_eq!(backend.error_policy(), ErrorPolicy::Collapse);
        assert_eq!(
            backend.normalizer().normalize("refs/heads/1234-5678-9abc-def0-1"),
            ".git/refs/heads/1234-5678-9abc-def0-1"
        );

        let backend = backend
            .with_error_policy(ErrorPolicy::Preserve)
            .with_normalizer(Verbatim);
        assert_eq!(backend.error_policy(), ErrorPolicy::Preserve);
        assert_eq!(
            backend.normalizer().normalize("/refs/heads/1234-5678-9abc-def0-1"),
            "refs/heads/1234-5678-9abc-def0-1"
        );
        assert_eq!(backend.key("/refs/heads/x"), "refs/heads/x");
    }

    #[tokio::test]
    async fn stat_of_directory_path_skips_the_store() {
        let backend = backend();
        let stat = backend.stat("repo/.git/refs/").await.unwrap();
        assert_eq!(stat.kind, FileKind::Directory);
        assert_eq!(backend.store().request_count(), 0);
    }

    #[tokio::test]
    async fn stat_of_file_path_costs_one_probe() {
        let backend = backend();
        assert!(backend.stat("repo/.git/HEAD").await.unwrap_err().is_not_found());
        assert_eq!(backend.store().request_count(), 1);
    }

    #[tokio::test]
    async fn readdir_distinguishes_files_from_missing_directories() {
        let backend = backend();
        backend
            .write_file("repo/.git/HEAD", "ref: refs/heads/main\n".into(), WriteOptions::default())
            .await
            .unwrap();
        let err = backend.readdir("repo/.git/HEAD").await.unwrap_err();
        assert!(matches!(err, StorageError::NotADirectory { .. }));
        let err = backend.readdir("repo/.git/hooks").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn readdir_of_empty_marked_directory_is_empty() {
        let backend = backend();
        backend.mkdir("repo/.git/hooks").await.unwrap();
        assert!(backend.readdir("repo/.git/hooks").await.unwrap().is_empty());
        assert!(backend.store().contains("repo/.git/hooks/"));
    }

    #[tokio::test]
    async fn read_directory_reports_kinds() {
        let backend = backend();
        for path in ["r/.git/HEAD", "r/.git/refs/heads/main"] {
            backend
                .write_file(path, "x".into(), WriteOptions::default())
                .await
                .unwrap();
        }
        let view = backend.read_directory("r/.git").await.unwrap();
        let kinds: Vec<_> = view.entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![("HEAD", FileKind::File), ("refs", FileKind::Directory)]
        );
    }

    #[tokio::test]
    async fn strict_policy_guards_non_empty_directories() {
        let backend = backend().with_directory_policy(DirectoryPolicy::Strict);
        backend.mkdir("d").await.unwrap();
        backend
            .write_file("d/file", "x".into(), WriteOptions::default())
            .await
            .unwrap();
        let err = backend.rmdir("d").await.unwrap_err();
        assert_eq!(err.code(), "ENOTEMPTY");

        backend
            .write_file("implied/file", "x".into(), WriteOptions::default())
            .await
            .unwrap();
        let err = backend.mkdir("implied").await.unwrap_err();
        assert_eq!(err.code(), "EEXIST");
    }

    #[tokio::test]
    async fn lenient_policy_ignores_children() {
        let backend = backend();
        backend.mkdir("d/").await.unwrap();
        backend
            .write_file("d/file", "x".into(), WriteOptions::default())
            .await
            .unwrap();
        backend.rmdir("d/").await.unwrap();
        assert_eq!(backend.store().keys(), vec!["d/file"]);
    }

    #[tokio::test]
    async fn root_cannot_be_created_or_removed() {
        let backend = backend();
        assert_eq!(backend.mkdir("/").await.unwrap_err().code(), "EEXIST");
        assert_eq!(backend.rmdir("").await.unwrap_err().code(), "EINVAL");
        assert!(backend.stat("").await.unwrap().is_directory());
    }

    #[tokio::test]
    async fn verbatim_normalizer_keeps_hex_refs_in_place() {
        let backend = backend().with_normalizer(Verbatim);
        let path = "refs/heads/1234-5678-9abc-def0-1234567890ab";
        backend
            .write_file(path, "abc".into(), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(backend.store().keys(), vec![path]);
    }
}
