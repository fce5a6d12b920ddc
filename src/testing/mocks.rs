//! Mock implementations for testing
//!
//! Provides an in-memory ObjectStore and scripted AgentExecutor
//! implementations to enable comprehensive testing without external
//! dependencies.

use crate::agents::{
    AgentExecError, AgentExecutor, AgentInvocation, AgentOutput, NamedArtifact, TransformedFile,
};
use crate::catalog::AgentKind;
use crate::storage::{ObjectStore, PresignedUrl, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// In-memory object store with switchable failure modes
#[derive(Debug, Default)]
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, Bytes>>,
    /// Every put refused with a backend error
    pub fail_puts: AtomicBool,
    /// Puts whose key contains this substring are refused
    fail_puts_containing: std::sync::Mutex<Option<String>>,
    /// Every call refused as unavailable
    pub unavailable: AtomicBool,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that refuses every call, as if the backend were down
    pub fn unavailable() -> Self {
        let store = Self::default();
        store.unavailable.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Refuse only puts whose key contains `fragment`
    pub fn set_fail_puts_containing(&self, fragment: Option<&str>) {
        *self.fail_puts_containing.lock().unwrap() = fragment.map(str::to_string);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("mock backend down".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StorageError> {
        self.check_available()?;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("mock put failure".to_string()));
        }
        if let Some(fragment) = self.fail_puts_containing.lock().unwrap().as_deref() {
            if key.contains(fragment) {
                return Err(StorageError::Backend(format!(
                    "mock put failure for '{key}'"
                )));
            }
        }
        self.objects.lock().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        self.check_available()?;
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.check_available()?;
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check_available()?;
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn presign_put(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        self.check_available()?;
        Ok(PresignedUrl {
            key: key.to_string(),
            url: Url::parse(&format!("http://mock.local/objects/{key}")).unwrap(),
            expires_at: Utc::now() + ttl,
        })
    }

    async fn presign_get(&self, key: &str, ttl: Duration) -> Result<PresignedUrl, StorageError> {
        self.presign_put(key, ttl).await
    }
}

/// What a scripted executor does when invoked
#[derive(Debug, Clone)]
pub enum ScriptedBehavior {
    /// Succeed with fixed findings
    Succeed(Value),
    /// Fail with a fixed message
    Fail(String),
    /// Succeed and replace `logical_name` with `replacement`
    Transform {
        findings: Value,
        logical_name: String,
        replacement: Bytes,
    },
    /// Succeed and also produce a named artifact
    Artifact {
        findings: Value,
        name: String,
        bytes: Bytes,
    },
}

/// Agent executor driven by a fixed script, recording every invocation
pub struct ScriptedExecutor {
    kind: AgentKind,
    behavior: ScriptedBehavior,
    pub invocations: Arc<Mutex<Vec<AgentInvocation>>>,
}

impl ScriptedExecutor {
    pub fn new(kind: AgentKind, behavior: ScriptedBehavior) -> Self {
        Self {
            kind,
            behavior,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn succeeding(kind: AgentKind) -> Self {
        Self::new(kind, ScriptedBehavior::Succeed(json!({"agent": kind.as_str()})))
    }

    pub fn failing(kind: AgentKind, message: impl Into<String>) -> Self {
        Self::new(kind, ScriptedBehavior::Fail(message.into()))
    }

    pub fn transforming(kind: AgentKind, logical_name: &str, replacement: &'static [u8]) -> Self {
        Self::new(
            kind,
            ScriptedBehavior::Transform {
                findings: json!({"agent": kind.as_str()}),
                logical_name: logical_name.to_string(),
                replacement: Bytes::from_static(replacement),
            },
        )
    }

    pub async fn invocation_count(&self) -> usize {
        self.invocations.lock().await.len()
    }

    /// The bytes of `name` as seen by the most recent invocation
    pub async fn last_seen_file(&self, name: &str) -> Option<Bytes> {
        self.invocations
            .lock()
            .await
            .last()
            .and_then(|invocation| invocation.files.get(name).cloned())
    }
}

#[async_trait]
impl AgentExecutor for ScriptedExecutor {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn execute(&self, invocation: &AgentInvocation) -> Result<AgentOutput, AgentExecError> {
        self.invocations.lock().await.push(invocation.clone());
        match &self.behavior {
            ScriptedBehavior::Succeed(findings) => Ok(AgentOutput {
                findings: findings.clone(),
                ..Default::default()
            }),
            ScriptedBehavior::Fail(message) => {
                Err(AgentExecError::ExecutionFailed(message.clone()))
            }
            ScriptedBehavior::Transform {
                findings,
                logical_name,
                replacement,
            } => Ok(AgentOutput {
                findings: findings.clone(),
                transformed: Some(TransformedFile {
                    logical_name: logical_name.clone(),
                    bytes: replacement.clone(),
                }),
                artifact: None,
            }),
            ScriptedBehavior::Artifact {
                findings,
                name,
                bytes,
            } => Ok(AgentOutput {
                findings: findings.clone(),
                transformed: None,
                artifact: Some(NamedArtifact {
                    name: name.clone(),
                    bytes: bytes.clone(),
                }),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_store_round_trip() {
        let store = MockObjectStore::new();
        store
            .put("users/u/tasks/t/inputs/primary", Bytes::from_static(b"data"))
            .await
            .unwrap();
        assert!(store.exists("users/u/tasks/t/inputs/primary").await.unwrap());
        assert_eq!(
            &store.get("users/u/tasks/t/inputs/primary").await.unwrap()[..],
            b"data"
        );
    }

    #[tokio::test]
    async fn test_mock_store_unavailable() {
        let store = MockObjectStore::unavailable();
        assert!(matches!(
            store.get("anything").await,
            Err(StorageError::Unavailable(_))
        ));
        assert!(matches!(
            store.presign_put("k", Duration::minutes(1)).await,
            Err(StorageError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_mock_store_fail_puts_only() {
        let store = MockObjectStore::new();
        store
            .put("k", Bytes::from_static(b"v"))
            .await
            .unwrap();
        store.set_fail_puts(true);
        assert!(matches!(
            store.put("k2", Bytes::new()).await,
            Err(StorageError::Backend(_))
        ));
        // Reads still work
        assert_eq!(&store.get("k").await.unwrap()[..], b"v");
    }

    #[tokio::test]
    async fn test_scripted_executor_records_invocations() {
        let executor = ScriptedExecutor::succeeding(AgentKind::NullAuditor);
        let invocation = AgentInvocation {
            files: HashMap::from([("primary".to_string(), Bytes::from_static(b"x"))]),
            parameters: Value::Null,
        };
        executor.execute(&invocation).await.unwrap();
        assert_eq!(executor.invocation_count().await, 1);
        assert_eq!(
            &executor.last_seen_file("primary").await.unwrap()[..],
            b"x"
        );
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let executor = ScriptedExecutor::failing(AgentKind::PiiScanner, "scripted break");
        let invocation = AgentInvocation {
            files: HashMap::new(),
            parameters: Value::Null,
        };
        let result = executor.execute(&invocation).await;
        assert!(matches!(result, Err(AgentExecError::ExecutionFailed(_))));
        assert_eq!(executor.invocation_count().await, 1);
    }
}
