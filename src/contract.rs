//! The operation set every storage backend provides.
//!
//! The contract is shaped after the filesystem calls a version-control client
//! makes (`readFile`, `writeFile`, `readdir`, ...), so a client written
//! against a local disk can be pointed at any [`StorageBackend`] instead.
//! Every operation is an async call that may suspend while awaiting the
//! network. Backends hold no process-wide state; all side effects land in
//! the underlying store.

use std::future::Future;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::StorageError;

/// Textual encodings understood by [`StorageBackend::read_file`] and
/// [`StorageBackend::write_file`].
///
/// Only UTF-8 is supported. Asking for any other label is a configuration
/// error rather than a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
}

impl FromStr for Encoding {
    type Err = StorageError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            other => Err(StorageError::Configuration(format!(
                "unsupported encoding `{other}`, only utf8 is available"
            ))),
        }
    }
}

impl Encoding {
    /// Parses an optional encoding label, `None` meaning raw bytes.
    pub fn parse(label: Option<&str>) -> Result<Option<Self>, StorageError> {
        label.map(str::parse).transpose()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub encoding: Option<String>,
}

impl ReadOptions {
    pub fn encoding(label: impl Into<String>) -> Self {
        Self {
            encoding: Some(label.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub encoding: Option<String>,
}

impl WriteOptions {
    pub fn encoding(label: impl Into<String>) -> Self {
        Self {
            encoding: Some(label.into()),
        }
    }
}

/// File contents as handed to or returned from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileData {
    Bytes(Bytes),
    Text(String),
}

impl FileData {
    /// Decodes stored bytes, producing text when an encoding was requested.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected.
    pub fn decode(bytes: Bytes, encoding: Option<Encoding>) -> Self {
        match encoding {
            None => FileData::Bytes(bytes),
            Some(Encoding::Utf8) => FileData::Text(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }

    /// The payload to store.
    pub fn into_bytes(self) -> Bytes {
        match self {
            FileData::Bytes(bytes) => bytes,
            FileData::Text(text) => Bytes::from(text),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            FileData::Bytes(bytes) => bytes,
            FileData::Text(text) => text.as_bytes(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FileData::Text(text) => Some(text),
            FileData::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Bytes> for FileData {
    fn from(bytes: Bytes) -> Self {
        FileData::Bytes(bytes)
    }
}

impl From<Vec<u8>> for FileData {
    fn from(bytes: Vec<u8>) -> Self {
        FileData::Bytes(bytes.into())
    }
}

impl From<&'static [u8]> for FileData {
    fn from(bytes: &'static [u8]) -> Self {
        FileData::Bytes(Bytes::from_static(bytes))
    }
}

impl<const N: usize> From<&'static [u8; N]> for FileData {
    fn from(bytes: &'static [u8; N]) -> Self {
        FileData::Bytes(Bytes::from_static(bytes))
    }
}

impl From<String> for FileData {
    fn from(text: String) -> Self {
        FileData::Text(text)
    }
}

impl From<&str> for FileData {
    fn from(text: &str) -> Self {
        FileData::Text(text.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

/// POSIX-like metadata synthesized for a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    pub kind: FileKind,
    pub mode: u32,
    pub size: u64,
    /// Inode number. Flat stores have none and report a fixed sentinel.
    pub ino: u64,
    /// Modification time in milliseconds since the UNIX epoch.
    pub mtime_ms: u64,
}

impl StatRecord {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

/// Filesystem-shaped operations a storage backend provides.
pub trait StorageBackend: Send + Sync {
    /// Reads a whole file.
    ///
    /// # Errors
    /// `NotFound` if no object exists at `path`; `Configuration` for an
    /// unsupported encoding.
    fn read_file(
        &self,
        path: &str,
        options: ReadOptions,
    ) -> impl Future<Output = Result<FileData, StorageError>> + Send;

    /// Creates or replaces a whole file.
    fn write_file(
        &self,
        path: &str,
        data: FileData,
        options: WriteOptions,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Removes a file. Fails with `NotFound` if it does not exist.
    fn unlink(&self, path: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Lists the immediate children of a directory, in order and without
    /// duplicates.
    fn readdir(&self, path: &str) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send;

    fn mkdir(&self, path: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn rmdir(&self, path: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn stat(&self, path: &str) -> impl Future<Output = Result<StatRecord, StorageError>> + Send;

    /// Like [`stat`](Self::stat) but does not follow symbolic links.
    fn lstat(&self, path: &str) -> impl Future<Output = Result<StatRecord, StorageError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_labels_parse() {
        assert_eq!("utf8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!(Encoding::parse(None).unwrap(), None);
    }

    #[test]
    fn other_encodings_are_configuration_errors() {
        for label in ["latin1", "base64", "hex", "utf16le"] {
            let err = label.parse::<Encoding>().unwrap_err();
            assert!(matches!(err, StorageError::Configuration(_)), "{label}");
        }
    }

    #[test]
    fn decode_respects_encoding() {
        let raw = Bytes::from_static(b"ref: refs/heads/main\n");
        assert_eq!(
            FileData::decode(raw.clone(), None),
            FileData::Bytes(raw.clone())
        );
        let text = FileData::decode(raw, Some(Encoding::Utf8));
        assert_eq!(text.as_text(), Some("ref: refs/heads/main\n"));
    }
}
