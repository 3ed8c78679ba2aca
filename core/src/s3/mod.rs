//! Object-store seam.
//!
//! The core never talks to an S3 SDK directly. It consumes the
//! [`ObjectStore`] trait, which the `aws` feature implements on top of
//! `aws-sdk-s3` and [`InMemoryObjectStore`] implements for tests and
//! offline use. A [`ClientFactory`] turns a [`Connection`] into a store
//! client; the directory repository caches the result per connection.

#[cfg(feature = "aws")]
pub mod aws;
pub mod content;
pub mod memory;

pub use content::{Content, ObjectContent, SharedContent};
pub use memory::{InMemoryClientFactory, InMemoryObjectStore};

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::deck::Connection;
use crate::errors::CoreError;

/// Largest page the listing API returns.
pub const MAX_KEYS_PER_PAGE: i32 = 1000;

/// One `ListObjectsV2` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    pub delimiter: String,
    pub max_keys: i32,
    pub continuation_token: Option<String>,
}

/// Metadata of one listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// One page of a `ListObjectsV2` response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub contents: Vec<ObjectSummary>,
    /// Present when more pages follow.
    pub next_continuation_token: Option<String>,
}

/// Failures reported by an [`ObjectStore`], classified the way the S3 API
/// reports them.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no such key {key} in bucket {bucket}")]
    NoSuchKey { bucket: String, key: String },

    #[error("no such bucket {0}")]
    NoSuchBucket(String),

    #[error("object {key} in bucket {bucket} is in an invalid state (archived?)")]
    InvalidObjectState { bucket: String, key: String },

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoSuchKey { .. } | StoreError::NoSuchBucket(_) => {
                CoreError::NotFound(err.to_string())
            }
            StoreError::InvalidObjectState { .. } => CoreError::Technical(err.to_string()),
            StoreError::Io(_) | StoreError::Other(_) => CoreError::Technical(err.to_string()),
        }
    }
}

/// The operations the core needs from an S3-compatible store.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of a delimiter-aware listing.
    async fn list_objects_v2(&self, request: ListRequest) -> Result<ListPage, StoreError>;

    /// Download a whole object into memory.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or replace an object.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), StoreError>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    /// Download an object into `local_path`, returning bytes written.
    async fn download_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        let data = self.get_object(bucket, key).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, &data).await?;
        Ok(data.len() as u64)
    }

    /// Upload `local_path` as an object, returning bytes sent.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<u64, StoreError> {
        let data = tokio::fs::read(local_path).await?;
        let len = data.len() as u64;
        self.put_object(bucket, key, data).await?;
        Ok(len)
    }
}

/// Builds store clients for connections.
pub trait ClientFactory: Send + Sync {
    fn client(&self, connection: &Connection) -> Result<Arc<dyn ObjectStore>, CoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn store_errors_map_to_domain_kinds() {
        let err: CoreError = StoreError::NoSuchKey {
            bucket: "b1".into(),
            key: "k".into(),
        }
        .into();
        assert!(err.is(ErrorKind::NotFound));
        assert!(err.to_string().contains("b1"));
        assert!(err.to_string().contains("k"));

        let err: CoreError = StoreError::NoSuchBucket("b2".into()).into();
        assert!(err.is(ErrorKind::NotFound));

        let err: CoreError = StoreError::InvalidObjectState {
            bucket: "b".into(),
            key: "glacier.bin".into(),
        }
        .into();
        assert!(err.is(ErrorKind::Technical));
        assert!(err.to_string().contains("glacier.bin"));

        let err: CoreError = StoreError::Other("boom".into()).into();
        assert!(err.is(ErrorKind::Technical));
    }

    fn _assert_object_safe(_: &dyn ObjectStore) {}
    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn object_store_is_send_sync() {
        _assert_send_sync::<Arc<dyn ObjectStore>>();
    }
}
