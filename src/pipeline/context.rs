//! Transient pipeline context
//!
//! The live map of logical file names to byte content threaded through one
//! orchestration run. Never persisted; chaining happens here and only here.

use crate::agents::{AgentInvocation, TransformedFile};
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PipelineContext {
    files: HashMap<String, Bytes>,
    parameters: Value,
}

impl PipelineContext {
    pub fn new(files: HashMap<String, Bytes>, parameters: Value) -> Self {
        Self { files, parameters }
    }

    pub fn file(&self, name: &str) -> Option<&Bytes> {
        self.files.get(name)
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.files.keys().map(String::as_str).collect()
    }

    /// Snapshot handed to one agent execution. `Bytes` clones are
    /// reference-counted, so this does not copy file contents.
    pub fn invocation(&self) -> AgentInvocation {
        AgentInvocation {
            files: self.files.clone(),
            parameters: self.parameters.clone(),
        }
    }

    /// Merge a transforming agent's output back under the same logical key,
    /// so every downstream agent sees the transformed data
    pub fn apply_transform(&mut self, transform: &TransformedFile) {
        self.files
            .insert(transform.logical_name.clone(), transform.bytes.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_transform_replaces_input() {
        let mut context = PipelineContext::new(
            HashMap::from([("primary".to_string(), Bytes::from_static(b"raw"))]),
            Value::Null,
        );
        context.apply_transform(&TransformedFile {
            logical_name: "primary".to_string(),
            bytes: Bytes::from_static(b"cleaned"),
        });
        assert_eq!(&context.file("primary").unwrap()[..], b"cleaned");
    }

    #[test]
    fn test_invocation_sees_current_state() {
        let mut context = PipelineContext::new(
            HashMap::from([("primary".to_string(), Bytes::from_static(b"v1"))]),
            Value::Null,
        );
        let before = context.invocation();
        context.apply_transform(&TransformedFile {
            logical_name: "primary".to_string(),
            bytes: Bytes::from_static(b"v2"),
        });
        let after = context.invocation();

        // Earlier snapshots are unaffected by later transforms
        assert_eq!(&before.files["primary"][..], b"v1");
        assert_eq!(&after.files["primary"][..], b"v2");
    }
}
