//! Error vocabulary shared by all backends.
//!
//! Two layers exist. [`StoreError`] is what a [`FlatStore`](crate::store::FlatStore)
//! reports about a single key. [`StorageError`] is what the filesystem-shaped
//! contract reports to its caller; the translator in [`crate::translate`] is
//! the only place that turns the former into the latter.

use std::error::Error as StdError;

use thiserror::Error;

/// Failure of a single request against a flat object store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {key}")]
    NotFound { key: String },
    #[error("object already exists: {key}")]
    AlreadyExists { key: String },
    #[error("store request failed: {0}")]
    Backend(#[source] Box<dyn StdError + Send + Sync + 'static>),
}

impl StoreError {
    /// Whether the store positively reported that the key does not exist.
    pub fn is_absence(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Self::NotFound { key: path },
            object_store::Error::AlreadyExists { path, .. } => Self::AlreadyExists { key: path },
            e => Self::Backend(Box::new(e)),
        }
    }
}

/// Errors surfaced by [`StorageBackend`](crate::contract::StorageBackend)
/// operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The path does not exist, or the store failed in a way that was
    /// collapsed into absence. The raw store failure, if any, is kept as the
    /// error source.
    #[error("no such file or directory: {path}")]
    NotFound {
        path: String,
        #[source]
        cause: Option<StoreError>,
    },
    #[error("not a directory: {path}")]
    NotADirectory { path: String },
    #[error("directory not empty: {path}")]
    NotEmpty { path: String },
    #[error("file already exists: {path}")]
    AlreadyExists { path: String },
    /// Unsupported encoding, unknown backend name or incomplete settings.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A store failure passed through uncollapsed.
    #[error("store failure at {path}: {source}")]
    Store {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.into(),
            cause: None,
        }
    }

    /// POSIX-style error code, the way a filesystem client inspects failures.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "ENOENT",
            Self::NotADirectory { .. } => "ENOTDIR",
            Self::NotEmpty { .. } => "ENOTEMPTY",
            Self::AlreadyExists { .. } => "EEXIST",
            Self::Configuration(_) => "EINVAL",
            Self::Store { .. } | Self::Io(_) => "EIO",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The store failure that produced this error, if any.
    ///
    /// For a collapsed `NotFound` this is how callers tell a genuinely
    /// missing object apart from e.g. a permission failure.
    pub fn store_cause(&self) -> Option<&StoreError> {
        match self {
            Self::NotFound { cause, .. } => cause.as_ref(),
            Self::Store { source, .. } => Some(source),
            _ => None,
        }
    }
}
