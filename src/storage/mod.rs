//! Object store adapter
//!
//! Abstraction over an S3-compatible backend: presigned-URL issuance,
//! existence checks, byte read/write, prefix listing, deletion. The local
//! filesystem implementation is the reference backend; production deploys
//! substitute a real S3 adapter behind the same trait.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub mod keys;
pub mod local;

pub use local::LocalObjectStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Time-limited URL granting direct access to one object-store key
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUrl {
    pub key: String,
    pub url: Url,
    pub expires_at: DateTime<Utc>,
}

impl PresignedUrl {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Bytes, StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Keys under `prefix`, in unspecified order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Delete everything under `prefix`; returns the number of objects
    /// removed. Idempotent: an empty prefix removes nothing.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let keys = self.list(prefix).await?;
        let count = keys.len();
        for key in keys {
            self.delete(&key).await?;
        }
        Ok(count)
    }

    /// Time-limited write URL for one key
    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError>;

    /// Time-limited read URL for one key
    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError>;
}
