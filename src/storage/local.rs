//! Local filesystem object store
//!
//! Reference backend for development and single-node deploys. Keys map to
//! paths under a root directory; presigned URLs point at the engine's own
//! `/objects/` routes with an expiry timestamp. The local backend does not
//! sign URLs — that trust boundary belongs to the S3 adapter in production.

use super::{keys, ObjectStore, PresignedUrl, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    public_base: Url,
}

impl LocalObjectStore {
    /// `root` is the directory objects live under; `public_base` is the
    /// externally reachable base URL presigned URLs are issued against.
    pub fn new(root: impl Into<PathBuf>, public_base: Url) -> Self {
        Self {
            root: root.into(),
            public_base,
        }
    }

    /// Create the root directory if needed
    pub async fn init(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to create storage root: {e}")))?;
        info!(root = %self.root.display(), "Initialized local object store");
        Ok(())
    }

    /// Resolve a key to a filesystem path, rejecting traversal segments
    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn presign(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        validate_key(key)?;
        let expires_at = Utc::now() + ttl;
        let mut url = self.public_base.clone();
        url.set_path(&format!("objects/{key}"));
        url.query_pairs_mut()
            .append_pair("expires", &expires_at.timestamp().to_string());
        Ok(PresignedUrl {
            key: key.to_string(),
            url,
            expires_at,
        })
    }
}

/// Keys are slash-separated names; every segment must be a valid name
fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('/') || key.ends_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "key '{key}' must be a relative slash-separated path"
        )));
    }
    for segment in key.split('/') {
        keys::validate_name(segment)?;
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Backend(format!("mkdir failed for '{key}': {e}")))?;
        }
        fs::write(&path, &bytes)
            .await
            .map_err(|e| StorageError::Backend(format!("write failed for '{key}': {e}")))?;
        debug!(key, size = bytes.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::Backend(format!(
                "read failed for '{key}': {e}"
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::Backend(format!("stat failed for '{key}': {e}")))?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_key(prefix.trim_end_matches('/'))?;
        let dir = self.root.join(prefix.trim_end_matches('/'));
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        collect_files(&dir, &self.root, &mut found)
            .await
            .map_err(|e| StorageError::Backend(format!("list failed for '{prefix}': {e}")))?;
        Ok(found)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted object");
                Ok(())
            }
            // Deleting an absent object is a no-op, matching S3 semantics
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Backend(format!(
                "delete failed for '{key}': {e}"
            ))),
        }
    }

    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        self.presign(key, ttl)
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        self.presign(key, ttl)
    }
}

/// Walk `dir` recursively, pushing root-relative keys
async fn collect_files(
    dir: &Path,
    root: &Path,
    found: &mut Vec<String>,
) -> Result<(), std::io::Error> {
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                found.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalObjectStore {
        LocalObjectStore::new(
            dir.path(),
            Url::parse("http://localhost:8080").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init().await.unwrap();

        store
            .put("users/u1/tasks/t1/inputs/primary", Bytes::from("a,b\n1,2\n"))
            .await
            .unwrap();
        let data = store.get("users/u1/tasks/t1/inputs/primary").await.unwrap();
        assert_eq!(&data[..], b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let result = store.get("users/u1/tasks/t1/inputs/absent").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_exists() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(!store.exists("users/u/tasks/t/inputs/x").await.unwrap());
        store
            .put("users/u/tasks/t/inputs/x", Bytes::from_static(b"data"))
            .await
            .unwrap();
        assert!(store.exists("users/u/tasks/t/inputs/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_returns_keys_under_prefix() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put("users/u/tasks/t/outputs/report.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        store
            .put("users/u/tasks/t/outputs/cleaned.csv", Bytes::from_static(b"a"))
            .await
            .unwrap();
        store
            .put("users/u/tasks/other/outputs/report.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();

        let mut keys = store.list("users/u/tasks/t/outputs/").await.unwrap();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "users/u/tasks/t/outputs/cleaned.csv".to_string(),
                "users/u/tasks/t/outputs/report.json".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_task_artifacts() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .put("users/u/tasks/t/inputs/primary", Bytes::from_static(b"a"))
            .await
            .unwrap();
        store
            .put("users/u/tasks/t/outputs/report.json", Bytes::from_static(b"b"))
            .await
            .unwrap();

        let removed = store.delete_prefix("users/u/tasks/t/").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.list("users/u/tasks/t/").await.unwrap().is_empty());

        // Idempotent
        assert_eq!(store.delete_prefix("users/u/tasks/t/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let result = store.get("users/../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        let result = store.put("/absolute", Bytes::new()).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_presign_put_embeds_key_and_expiry() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let presigned = store
            .presign_put("users/u/tasks/t/inputs/primary", Duration::minutes(15))
            .await
            .unwrap();
        assert!(presigned
            .url
            .path()
            .ends_with("objects/users/u/tasks/t/inputs/primary"));
        assert!(presigned.url.query().unwrap().contains("expires="));
        assert!(!presigned.is_expired_at(Utc::now()));
    }
}
