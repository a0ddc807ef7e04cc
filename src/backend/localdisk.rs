use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::contract::{
    Encoding, FileData, FileKind, ReadOptions, StatRecord, StorageBackend, WriteOptions,
};
use crate::error::StorageError;
use crate::store::DELIMITER;
use crate::translate::unix_millis;

/// Storage backend over a directory of the local filesystem.
///
/// Paths are resolved below `root`. Directories are real, so emptiness is
/// enforced by the operating system and no path normalization happens.
#[derive(Debug, Clone)]
pub struct LocalDiskBackend {
    root: PathBuf,
}

impl LocalDiskBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `path` onto the root. Parent components are refused so no path
    /// reaches outside of it.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches(DELIMITER));
        let escapes = relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(StorageError::Configuration(format!(
                "path leaves the backend root: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, err: io::Error) -> StorageError {
    let path = path.to_owned();
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound { path, cause: None },
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists { path },
        io::ErrorKind::NotADirectory => StorageError::NotADirectory { path },
        io::ErrorKind::DirectoryNotEmpty => StorageError::NotEmpty { path },
        _ => StorageError::Io(err),
    }
}

fn stat_record(metadata: &Metadata) -> StatRecord {
    let file_type = metadata.file_type();
    let kind = if file_type.is_symlink() {
        FileKind::Symlink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else {
        FileKind::File
    };
    let mtime_ms = metadata.modified().map(unix_millis).unwrap_or(0);

    #[cfg(unix)]
    let (mode, ino) = {
        use std::os::unix::fs::MetadataExt;
        (metadata.mode(), metadata.ino())
    };
    #[cfg(not(unix))]
    let (mode, ino) = (
        crate::translate::mode_for(kind),
        crate::translate::SENTINEL_INO,
    );

    StatRecord {
        kind,
        mode,
        size: metadata.len(),
        ino,
        mtime_ms,
    }
}

impl StorageBackend for LocalDiskBackend {
    async fn read_file(&self, path: &str, options: ReadOptions) -> Result<FileData, StorageError> {
        let encoding = Encoding::parse(options.encoding.as_deref())?;
        let bytes = tokio::fs::read(self.resolve(path)?)
            .await
            .map_err(|err| io_error(path, err))?;
        Ok(FileData::decode(bytes.into(), encoding))
    }

    async fn write_file(
        &self,
        path: &str,
        data: FileData,
        options: WriteOptions,
    ) -> Result<(), StorageError> {
        Encoding::parse(options.encoding.as_deref())?;
        tokio::fs::write(self.resolve(path)?, data.as_bytes())
            .await
            .map_err(|err| io_error(path, err))?;
        debug!(path, size = data.len(), "wrote file");
        Ok(())
    }

    async fn unlink(&self, path: &str) -> Result<(), StorageError> {
        tokio::fs::remove_file(self.resolve(path)?)
            .await
            .map_err(|err| io_error(path, err))
    }

    async fn readdir(&self, path: &str) -> Result<Vec<String>, StorageError> {
        let mut entries = tokio::fs::read_dir(self.resolve(path)?)
            .await
            .map_err(|err| io_error(path, err))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| io_error(path, err))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn mkdir(&self, path: &str) -> Result<(), StorageError> {
        tokio::fs::create_dir(self.resolve(path)?)
            .await
            .map_err(|err| io_error(path, err))
    }

    async fn rmdir(&self, path: &str) -> Result<(), StorageError> {
        tokio::fs::remove_dir(self.resolve(path)?)
            .await
            .map_err(|err| io_error(path, err))
    }

    async fn stat(&self, path: &str) -> Result<StatRecord, StorageError> {
        let metadata = tokio::fs::metadata(self.resolve(path)?)
            .await
            .map_err(|err| io_error(path, err))?;
        Ok(stat_record(&metadata))
    }

    async fn lstat(&self, path: &str) -> Result<StatRecord, StorageError> {
        let metadata = tokio::fs::symlink_metadata(self.resolve(path)?)
            .await
            .map_err(|err| io_error(path, err))?;
        Ok(stat_record(&metadata))
    }
}
