//! Deterministic storage key convention
//!
//! `(user_id, task_id)` is sufficient to reconstruct a task's full artifact
//! set, which is what makes runs resumable across process restarts. No
//! component ever persists a storage key.

use super::StorageError;
use uuid::Uuid;

pub const INPUTS_PREFIX: &str = "inputs";
pub const OUTPUTS_PREFIX: &str = "outputs";

/// Prefix owning every artifact of one task: `users/{user}/tasks/{task}/`
pub fn task_prefix(user_id: &str, task_id: Uuid) -> String {
    format!("users/{user_id}/tasks/{task_id}/")
}

/// `users/{user}/tasks/{task}/inputs/` — written once, before processing,
/// by the caller through presigned URLs
pub fn inputs_prefix(user_id: &str, task_id: Uuid) -> String {
    format!("users/{user_id}/tasks/{task_id}/{INPUTS_PREFIX}/")
}

/// `users/{user}/tasks/{task}/outputs/` — written only by the orchestrator
pub fn outputs_prefix(user_id: &str, task_id: Uuid) -> String {
    format!("users/{user_id}/tasks/{task_id}/{OUTPUTS_PREFIX}/")
}

pub fn input_key(user_id: &str, task_id: Uuid, logical_name: &str) -> String {
    format!("{}{logical_name}", inputs_prefix(user_id, task_id))
}

pub fn output_key(user_id: &str, task_id: Uuid, artifact_name: &str) -> String {
    format!("{}{artifact_name}", outputs_prefix(user_id, task_id))
}

/// Validate a logical file or artifact name: one path segment, no traversal
pub fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        && name != "."
        && name != "..";
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(format!(
            "name '{name}' must match [a-zA-Z0-9._-]+ and be a single path segment"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let task_id = Uuid::new_v4();
        let key = input_key("alice", task_id, "primary");
        assert_eq!(key, format!("users/alice/tasks/{task_id}/inputs/primary"));

        let out = output_key("alice", task_id, "report.json");
        assert_eq!(
            out,
            format!("users/alice/tasks/{task_id}/outputs/report.json")
        );
    }

    #[test]
    fn test_prefixes_nest_under_task() {
        let task_id = Uuid::new_v4();
        let prefix = task_prefix("bob", task_id);
        assert!(inputs_prefix("bob", task_id).starts_with(&prefix));
        assert!(outputs_prefix("bob", task_id).starts_with(&prefix));
    }

    #[test]
    fn test_validate_name_accepts_sane_names() {
        assert!(validate_name("primary").is_ok());
        assert!(validate_name("report.json").is_ok());
        assert!(validate_name("cleaned_v2-final").is_ok());
    }

    #[test]
    fn test_validate_name_rejects_traversal() {
        assert!(validate_name("..").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("sp ace").is_err());
    }

    proptest::proptest! {
        #[test]
        fn valid_names_always_accepted(name in "[a-zA-Z0-9_-][a-zA-Z0-9._-]{0,63}") {
            // Names from the allowed alphabet that are not pure dots pass
            proptest::prop_assert!(validate_name(&name).is_ok());
        }

        #[test]
        fn names_with_invalid_chars_rejected(name in "[a-z]{0,8}[^a-zA-Z0-9._-][a-z]{0,8}") {
            proptest::prop_assert!(validate_name(&name).is_err());
        }
    }
}
