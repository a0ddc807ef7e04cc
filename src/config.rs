//! Backend selection settings.
//!
//! Settings come from a serialized document (JSON) or from the environment:
//!
//! - `BUCKETFS_BACKEND`: `local-disk` or `object-store` - **required**
//! - `BUCKETFS_ROOT`: directory for `local-disk`
//! - `BUCKETFS_BUCKET`, `BUCKETFS_REGION`: target of `object-store`
//! - `BUCKETFS_URL`: alternative `object-store` target, e.g. `memory:///`
//! - `BUCKETFS_DIRECTORY_POLICY`: `lenient` (default) or `strict`
//! - `BUCKETFS_ERROR_POLICY`: `collapse` (default) or `preserve`
//!
//! Store credentials are not part of this configuration; the S3 client reads
//! the usual `AWS_*` variables itself.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backend::DirectoryPolicy;
use crate::error::StorageError;
use crate::translate::ErrorPolicy;

pub const ENV_BACKEND: &str = "BUCKETFS_BACKEND";
pub const ENV_ROOT: &str = "BUCKETFS_ROOT";
pub const ENV_BUCKET: &str = "BUCKETFS_BUCKET";
pub const ENV_REGION: &str = "BUCKETFS_REGION";
pub const ENV_URL: &str = "BUCKETFS_URL";
pub const ENV_DIRECTORY_POLICY: &str = "BUCKETFS_DIRECTORY_POLICY";
pub const ENV_ERROR_POLICY: &str = "BUCKETFS_ERROR_POLICY";

/// The storage medium a backend targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    LocalDisk,
    ObjectStore,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::LocalDisk => "local-disk",
            BackendKind::ObjectStore => "object-store",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local-disk" => Ok(BackendKind::LocalDisk),
            "object-store" => Ok(BackendKind::ObjectStore),
            other => Err(StorageError::Configuration(format!(
                "unknown backend `{other}`, expected local-disk or object-store"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: BackendKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// `object_store` URL used instead of bucket and region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub directory_policy: DirectoryPolicy,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl StorageConfig {
    pub fn local_disk(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::empty(BackendKind::LocalDisk)
        }
    }

    pub fn object_store(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            region: Some(region.into()),
            ..Self::empty(BackendKind::ObjectStore)
        }
    }

    pub fn object_store_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::empty(BackendKind::ObjectStore)
        }
    }

    fn empty(backend: BackendKind) -> Self {
        Self {
            backend,
            root: None,
            bucket: None,
            region: None,
            url: None,
            directory_policy: DirectoryPolicy::default(),
            error_policy: ErrorPolicy::default(),
        }
    }

    /// Loads the configuration from `BUCKETFS_*` environment variables.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, which maps a variable name
    /// to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let backend = lookup(ENV_BACKEND)
            .ok_or_else(|| StorageError::Configuration(format!("{ENV_BACKEND} is not set")))?
            .parse()?;
        let mut config = Self::empty(backend);
        config.root = lookup(ENV_ROOT).map(PathBuf::from);
        config.bucket = lookup(ENV_BUCKET);
        config.region = lookup(ENV_REGION);
        config.url = lookup(ENV_URL);
        if let Some(value) = lookup(ENV_DIRECTORY_POLICY) {
            config.directory_policy = parse_setting(ENV_DIRECTORY_POLICY, &value)?;
        }
        if let Some(value) = lookup(ENV_ERROR_POLICY) {
            config.error_policy = parse_setting(ENV_ERROR_POLICY, &value)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(document: &str) -> Result<Self, StorageError> {
        let config: Self = serde_json::from_str(document)
            .map_err(|err| StorageError::Configuration(format!("invalid storage config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the selected backend has what it needs.
    pub fn validate(&self) -> Result<(), StorageError> {
        match self.backend {
            BackendKind::LocalDisk if self.root.is_none() => Err(StorageError::Configuration(
                "local-disk backend needs a root".to_owned(),
            )),
            BackendKind::ObjectStore
                if self.url.is_none() && (self.bucket.is_none() || self.region.is_none()) =>
            {
                Err(StorageError::Configuration(
                    "object-store backend needs a bucket and a region".to_owned(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Parses a kebab-case enum setting the same way the serialized form does.
fn parse_setting<T: DeserializeOwned>(name: &str, value: &str) -> Result<T, StorageError> {
    let normalized = value.trim().to_ascii_lowercase();
    serde_json::from_value(serde_json::Value::String(normalized))
        .map_err(|err| StorageError::Configuration(format!("invalid {name} `{value}`: {err}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("local-disk".parse::<BackendKind>().unwrap(), BackendKind::LocalDisk);
        assert_eq!("Object-Store".parse::<BackendKind>().unwrap(), BackendKind::ObjectStore);
        let err = "ftp".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[test]
    fn env_selects_object_store() {
        let config = StorageConfig::from_lookup(lookup(&[
            (ENV_BACKEND, "object-store"),
            (ENV_BUCKET, "git-data"),
            (ENV_REGION, "eu-central-1"),
            (ENV_DIRECTORY_POLICY, "Strict"),
        ]))
        .unwrap();
        assert_eq!(config.backend, BackendKind::ObjectStore);
        assert_eq!(config.bucket.as_deref(), Some("git-data"));
        assert_eq!(config.directory_policy, DirectoryPolicy::Strict);
        assert_eq!(config.error_policy, ErrorPolicy::Collapse);
    }

    #[test]
    fn env_requires_a_backend_and_its_settings() {
        assert!(StorageConfig::from_lookup(lookup(&[])).is_err());
        assert!(StorageConfig::from_lookup(lookup(&[(ENV_BACKEND, "object-store")])).is_err());
        assert!(StorageConfig::from_lookup(lookup(&[(ENV_BACKEND, "local-disk")])).is_err());
        let err = StorageConfig::from_lookup(lookup(&[
            (ENV_BACKEND, "local-disk"),
            (ENV_ROOT, "/srv/git"),
            (ENV_ERROR_POLICY, "retry"),
        ]))
        .unwrap_err();
        assert_eq!(err.code(), "EINVAL");
    }

    #[test]
    fn json_round_trips_kebab_case() {
        let config = StorageConfig::from_json(
            r#"{"backend":"object-store","bucket":"b","region":"us-east-1","error-policy":"preserve"}"#,
        )
        .unwrap();
        assert_eq!(config.error_policy, ErrorPolicy::Preserve);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(StorageConfig::from_json(&json).unwrap(), config);
        assert!(StorageConfig::from_json(r#"{"backend":"object-store","bucket":"b"}"#).is_err());
    }
}
