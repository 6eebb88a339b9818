//! Engine error taxonomy and the JSON error payloads returned to callers

use serde_json::{json, Value as JsonValue};
use thiserror::Error;

/// Errors surfaced by the engine. Transient failures may be retried by the
/// caller; permanent ones will not succeed without intervention.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("repository not found: {name}")]
    RepositoryNotFound {
        name: String,
        available: Vec<String>,
    },

    #[error("branch not found: {branch} in repository {repository}")]
    BranchNotFound {
        repository: String,
        branch: String,
        available: Vec<String>,
    },

    #[error("unknown retrieval profile: {profile}")]
    UnknownProfile {
        profile: String,
        allowed: Vec<String>,
    },

    #[error("transient failure ({code}): {message}")]
    Transient { code: String, message: String },

    #[error("permanent failure ({code}): {message}")]
    Permanent { code: String, message: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn permanent(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Serialize into the `{error, ...context}` JSON object callers see.
    /// No stack traces leave the engine on this path.
    pub fn to_payload(&self) -> JsonValue {
        match self {
            Self::Config(message) => json!({ "error": message }),
            Self::RepositoryNotFound { name, available } => json!({
                "error": format!("repository not found: {name}"),
                "availableRepositories": available,
            }),
            Self::BranchNotFound {
                repository,
                branch,
                available,
            } => json!({
                "error": format!("branch not found: {branch} in repository {repository}"),
                "availableBranches": available,
            }),
            Self::UnknownProfile { profile, allowed } => json!({
                "error": format!("unknown retrieval profile: {profile}"),
                "allowedProfiles": allowed,
            }),
            Self::Transient { code, message } => json!({
                "error": message,
                "code": code,
                "transient": true,
            }),
            Self::Permanent { code, message } => json!({
                "error": message,
                "code": code,
                "transient": false,
            }),
            Self::Cancelled => json!({ "error": "operation cancelled" }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_not_found_payload_lists_alternatives() {
        let err = EngineError::BranchNotFound {
            repository: "demo".to_string(),
            branch: "nope".to_string(),
            available: vec!["main".to_string(), "develop".to_string()],
        };
        let payload = err.to_payload();
        assert!(payload["error"].as_str().unwrap().contains("nope"));
        assert_eq!(payload["availableBranches"][0], "main");
    }

    #[test]
    fn transient_payload_carries_code() {
        let err = EngineError::transient("embedder_timeout", "request timed out");
        let payload = err.to_payload();
        assert_eq!(payload["transient"], true);
        assert_eq!(payload["code"], "embedder_timeout");
    }
}
