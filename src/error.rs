//! Failure taxonomy for the orchestration engine
//!
//! Task-level failures are values persisted on the task record, never
//! exceptions surfaced to pollers. Maps internal errors to the
//! machine-readable failure codes the status API exposes.

use serde::{Deserialize, Serialize};

/// Machine-readable failure codes persisted on a FAILED task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// A required input artifact was absent when processing started
    MissingInput,
    /// Credit reservation was rejected; zero agents executed
    InsufficientCredits,
    /// An agent in the resolved list has no declared cost
    UnknownAgentCost,
    /// Object storage was unreachable at a point the pipeline cannot survive
    StorageUnavailable,
    /// The tool's success policy was not met by the executed agents
    NoAgentsSucceeded,
    /// Anything that should not happen in a healthy deployment
    Internal,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::MissingInput => "missing_input",
            FailureCode::InsufficientCredits => "insufficient_credits",
            FailureCode::UnknownAgentCost => "unknown_agent_cost",
            FailureCode::StorageUnavailable => "storage_unavailable",
            FailureCode::NoAgentsSucceeded => "no_agents_succeeded",
            FailureCode::Internal => "internal",
        }
    }
}

/// Structured failure reason stored on a task in a failed terminal state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub code: FailureCode,
    pub message: String,
}

impl TaskFailure {
    /// Build a failure with the message passed through the sanitizer
    pub fn new<S: Into<String>>(code: FailureCode, message: S) -> Self {
        Self {
            code,
            message: sanitize_failure_message(&message.into()),
        }
    }

    pub fn missing_input<S: Into<String>>(message: S) -> Self {
        Self::new(FailureCode::MissingInput, message)
    }

    pub fn insufficient_credits<S: Into<String>>(message: S) -> Self {
        Self::new(FailureCode::InsufficientCredits, message)
    }

    pub fn unknown_agent_cost<S: Into<String>>(message: S) -> Self {
        Self::new(FailureCode::UnknownAgentCost, message)
    }

    pub fn storage_unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(FailureCode::StorageUnavailable, message)
    }

    pub fn no_agents_succeeded<S: Into<String>>(message: S) -> Self {
        Self::new(FailureCode::NoAgentsSucceeded, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(FailureCode::Internal, message)
    }
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

/// Sanitize failure messages before they are persisted or served to pollers
///
/// Redacts credential-looking patterns and sensitive filesystem paths, and
/// truncates so a single failure cannot bloat the task record.
pub fn sanitize_failure_message(message: &str) -> String {
    let mut sanitized = message.to_string();

    sanitized = regex::Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+")
        .unwrap()
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    sanitized =
        regex::Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
            .unwrap()
            .replace_all(&sanitized, "/***REDACTED***/")
            .to_string();

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let max_content_len = 500 - truncate_suffix.len();
        sanitized = format!("{}{}", &sanitized[..max_content_len], truncate_suffix);
    }

    sanitized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_constructors_set_codes() {
        assert_eq!(
            TaskFailure::missing_input("no baseline").code,
            FailureCode::MissingInput
        );
        assert_eq!(
            TaskFailure::insufficient_credits("need 30").code,
            FailureCode::InsufficientCredits
        );
        assert_eq!(
            TaskFailure::unknown_agent_cost("pii-scanner").code,
            FailureCode::UnknownAgentCost
        );
        assert_eq!(
            TaskFailure::storage_unavailable("timeout").code,
            FailureCode::StorageUnavailable
        );
        assert_eq!(
            TaskFailure::no_agents_succeeded("0/3").code,
            FailureCode::NoAgentsSucceeded
        );
        assert_eq!(TaskFailure::internal("bug").code, FailureCode::Internal);
    }

    #[test]
    fn test_failure_display_includes_code() {
        let failure = TaskFailure::missing_input("inputs/baseline absent");
        assert_eq!(failure.to_string(), "missing_input: inputs/baseline absent");
    }

    #[test]
    fn test_sanitize_redacts_secrets() {
        let failure = TaskFailure::internal("storage auth failed: token=abc456 password=hunter2");
        assert!(!failure.message.contains("abc456"));
        assert!(!failure.message.contains("hunter2"));
        assert!(failure.message.contains("token=***"));
        assert!(failure.message.contains("password=***"));
    }

    #[test]
    fn test_sanitize_redacts_sensitive_paths() {
        let sanitized =
            sanitize_failure_message("could not read /home/svc/.aws/credentials for backend");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains(".aws/credentials"));
    }

    #[test]
    fn test_sanitize_truncates_long_messages() {
        let sanitized = sanitize_failure_message(&"x".repeat(600));
        assert!(sanitized.len() <= 500);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_sanitize_leaves_exact_limit_alone() {
        let sanitized = sanitize_failure_message(&"x".repeat(500));
        assert_eq!(sanitized.len(), 500);
        assert!(!sanitized.contains("truncated"));
    }

    #[test]
    fn test_failure_code_serde_snake_case() {
        let json = serde_json::to_string(&FailureCode::InsufficientCredits).unwrap();
        assert_eq!(json, "\"insufficient_credits\"");
    }
}
