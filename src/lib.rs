//! Filesystem-shaped storage for version-control clients, persisted in flat
//! object stores.
//!
//! A git client expects `readFile`, `writeFile`, `readdir`, `mkdir` and
//! `stat` to behave like a local disk. An object store offers whole-object
//! `get`/`put`/`delete`/`head` and prefix listings over a flat key space.
//! This crate bridges the two:
//!
//! - [`contract::StorageBackend`] is the operation set a client programs
//!   against.
//! - [`backend::objectstore::ObjectStoreBackend`] implements it over any
//!   [`store::FlatStore`], emulating directories with marker objects and
//!   prefix listings ([`listing`]), synthesizing metadata and translating
//!   failures ([`translate`]), and rewriting ambiguous ref paths before every
//!   access ([`normalize`]).
//! - [`backend::localdisk::LocalDiskBackend`] implements it over a local
//!   directory.
//! - [`backend::Backend`] picks one of them from a [`config::StorageConfig`].
//!
//! ## Basic usage
//!
//! ```rust,ignore
//! use bucketfs::prelude::*;
//! use bucketfs::store::memory::MemoryStore;
//!
//! let backend = ObjectStoreBackend::new(MemoryStore::new());
//! backend
//!     .write_file("repo/.git/HEAD", "ref: refs/heads/main\n".into(), WriteOptions::default())
//!     .await?;
//! let head = backend
//!     .read_file("repo/.git/HEAD", ReadOptions::encoding("utf8"))
//!     .await?;
//! assert_eq!(backend.readdir("repo/.git").await?, vec!["HEAD"]);
//! ```
//!
//! Against S3 the store is an [`store::objectstore::ObjectStoreClient`]:
//!
//! ```rust,ignore
//! let client = ObjectStoreClient::s3("git-data", "eu-central-1")?;
//! let backend = ObjectStoreBackend::new(client);
//! ```
//!
//! No operation caches anything. Directory listings and stat records are
//! recomputed from the store on every call, and concurrent writers resolve by
//! the store's last-writer-wins behavior.

pub mod backend;
pub mod config;
pub mod contract;
pub mod error;
pub mod listing;
pub mod normalize;
pub mod store;
pub mod translate;

pub mod prelude {
    pub use crate::backend::localdisk::LocalDiskBackend;
    pub use crate::backend::objectstore::ObjectStoreBackend;
    pub use crate::backend::{Backend, DirectoryPolicy};
    pub use crate::config::{BackendKind, StorageConfig};
    pub use crate::contract::{
        Encoding, FileData, FileKind, ReadOptions, StatRecord, StorageBackend, WriteOptions,
    };
    pub use crate::error::{StorageError, StoreError};
    pub use crate::normalize::{PathNormalizer, RefDisambiguator, Verbatim};
    pub use crate::store::objectstore::ObjectStoreClient;
    pub use crate::store::FlatStore;
    pub use crate::translate::ErrorPolicy;
}
