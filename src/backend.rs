//! Concrete storage backends and the selector choosing between them.
//!
//! [`objectstore::ObjectStoreBackend`] emulates a filesystem on top of any
//! [`FlatStore`](crate::store::FlatStore); [`localdisk::LocalDiskBackend`]
//! passes straight through to a local directory. [`Backend`] holds either
//! one, built from a [`StorageConfig`], and forwards the contract.

pub mod localdisk;
pub mod objectstore;

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::config::{BackendKind, StorageConfig};
use crate::contract::{FileData, ReadOptions, StatRecord, StorageBackend, WriteOptions};
use crate::error::StorageError;
use crate::store::objectstore::ObjectStoreClient;

use self::localdisk::LocalDiskBackend;
use self::objectstore::ObjectStoreBackend;

/// Whether `mkdir`/`rmdir` look at a directory's children.
///
/// A flat store has no real directories, so "exists" and "is empty" can only
/// be answered by listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectoryPolicy {
    /// Only the marker object counts: `mkdir` fails if the marker exists,
    /// `rmdir` deletes the marker regardless of children.
    #[default]
    Lenient,
    /// `mkdir` also fails when keys exist below the path and `rmdir` fails
    /// with `NotEmpty` when it has children. Costs one listing request.
    Strict,
}

/// A backend selected by configuration.
#[derive(Debug)]
pub enum Backend {
    LocalDisk(LocalDiskBackend),
    ObjectStore(ObjectStoreBackend<ObjectStoreClient>),
}

impl Backend {
    /// Builds the backend `config` asks for.
    ///
    /// # Errors
    /// `Configuration` if the settings are incomplete or the store client
    /// cannot be constructed.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        config.validate()?;
        let backend = match config.backend {
            BackendKind::LocalDisk => {
                let root = config.root.clone().ok_or_else(|| {
                    StorageError::Configuration("local-disk backend needs a root".to_owned())
                })?;
                Backend::LocalDisk(LocalDiskBackend::new(root))
            }
            BackendKind::ObjectStore => {
                let client = object_store_client(config)?;
                Backend::ObjectStore(
                    ObjectStoreBackend::new(client)
                        .with_directory_policy(config.directory_policy)
                        .with_error_policy(config.error_policy),
                )
            }
        };
        info!(backend = %config.backend, "storage backend selected");
        Ok(backend)
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::LocalDisk(_) => BackendKind::LocalDisk,
            Backend::ObjectStore(_) => BackendKind::ObjectStore,
        }
    }
}

fn object_store_client(config: &StorageConfig) -> Result<ObjectStoreClient, StorageError> {
    let invalid = |err: object_store::Error| {
        StorageError::Configuration(format!("cannot create object store client: {err}"))
    };
    if let Some(url) = &config.url {
        let url = Url::parse(url)
            .map_err(|err| StorageError::Configuration(format!("invalid store url `{url}`: {err}")))?;
        return ObjectStoreClient::with_url(&url).map_err(invalid);
    }
    match (&config.bucket, &config.region) {
        (Some(bucket), Some(region)) => ObjectStoreClient::s3(bucket, region).map_err(invalid),
        _ => Err(StorageError::Configuration(
            "object-store backend needs a bucket and a region".to_owned(),
        )),
    }
}

impl StorageBackend for Backend {
    async fn read_file(&self, path: &str, options: ReadOptions) -> Result<FileData, StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.read_file(path, options).await,
            Backend::ObjectStore(backend) => backend.read_file(path, options).await,
        }
    }

    async fn write_file(
        &self,
        path: &str,
        data: FileData,
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.write_file(path, data, options).await,
            Backend::ObjectStore(backend) => backend.write_file(path, data, options).await,
        }
    }

    async fn unlink(&self, path: &str) -> Result<(), StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.unlink(path).await,
            Backend::ObjectStore(backend) => backend.unlink(path).await,
        }
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.readdir(path).await,
            Backend::ObjectStore(backend) => backend.readdir(path).await,
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.mkdir(path).await,
            Backend::ObjectStore(backend) => backend.mkdir(path).await,
        }
    }

    async fn rmdir(&self, path: &str) -> Result<(), StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.rmdir(path).await,
            Backend::ObjectStore(backend) => backend.rmdir(path).await,
        }
    }

    async fn stat(&self, path: &str) -> Result<StatRecord, StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.stat(path).await,
            Backend::ObjectStore(backend) => backend.stat(path).await,
        }
    }

    async fn lstat(&self, path: &str) -> Result<StatRecord, StorageError> {
        match self {
            Backend::LocalDisk(backend) => backend.lstat(path).await,
            Backend::ObjectStore(backend) => backend.lstat(path).await,
        }
    }
}
