//! Error types for fixture provisioning, dispatch and verification.
//!
//! Every failure a test can observe is a [`HarnessError`]. The type is `Clone`
//! so that one failed fixture creation can be handed to every task that was
//! waiting on it.

use crate::cache::ResourceKey;
use std::fmt;
use std::time::Duration;

/// Main error type for harness operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HarnessError {
    /// A fixture provider failed to create its fixture
    #[error("Failed to create fixture '{key}': {message}")]
    ResourceCreation { key: ResourceKey, message: String },

    /// A provider asked for a key that is already being resolved further up its chain
    #[error("Cyclic fixture dependency on '{key}' (resolution chain: {chain})")]
    CyclicDependency { key: ResourceKey, chain: String },

    /// No provider is registered for the key's category
    #[error("No fixture provider registered for category '{category}'")]
    ProviderNotRegistered { category: String },

    /// The fixture exists but was requested as a different type
    #[error("Fixture '{key}' holds a {actual}, requested as {requested}")]
    FixtureTypeMismatch {
        key: ResourceKey,
        requested: &'static str,
        actual: &'static str,
    },

    /// Response body did not match the requested shape
    #[error("Failed to decode response body as {target}: {message}")]
    Decode { target: String, message: String },

    /// A polled condition never held within its budget
    #[error(
        "Condition not met after {elapsed:?} ({attempts} attempts); last observed: {last_observation}"
    )]
    Timeout {
        elapsed: Duration,
        attempts: u32,
        last_observation: String,
    },

    /// A verification did not hold
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// A recycle action failed
    #[error(transparent)]
    Recycle(#[from] RecycleError),

    /// Transport-level failure, including client timeouts
    #[error("Network error calling {url}: {message}")]
    Network { url: String, message: String },

    /// The request description could not be turned into an HTTP call
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Configuration could not be loaded or is inconsistent
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The remote service answered with a status the caller did not accept
    #[error("Unexpected status {status} from {method} {url}: {body}")]
    UnexpectedStatus {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    /// A test body panicked instead of returning
    #[error("Test body panicked: {message}")]
    Panicked { message: String },
}

/// Result alias used throughout the crate.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// A failed verification.
///
/// Carries the optional label the check was created with and the rendered
/// expected and actual values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    pub label: Option<String>,
    pub check: &'static str,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "Verification '{}' failed ({})", label, self.check)?,
            None => write!(f, "Verification failed ({})", self.check)?,
        }
        write!(f, "\n  expected: {}\n    actual: {}", self.expected, self.actual)
    }
}

impl std::error::Error for AssertionFailure {}

/// A cleanup action that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Recycle of '{key}' failed: {message}")]
pub struct RecycleError {
    pub key: ResourceKey,
    pub message: String,
}

/// Errors raised while loading or validating [`crate::config::HarnessConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}: {message}")]
    Io { path: String, message: String },

    /// Configuration document is not valid JSON or has the wrong shape
    #[error("Failed to parse configuration: {message}")]
    Parse { message: String },

    /// Configuration parsed but is inconsistent
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    /// Named credentials were requested but are not configured
    #[error("No credentials configured under '{name}'")]
    MissingCredentials { name: String },
}

// Convenience constructors
impl HarnessError {
    /// Create a fixture creation error
    pub fn creation(key: &ResourceKey, message: impl Into<String>) -> Self {
        Self::ResourceCreation {
            key: key.clone(),
            message: message.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create a decode error for the given target type
    pub fn decode<T: ?Sized>(message: impl fmt::Display) -> Self {
        Self::Decode {
            target: std::any::type_name::<T>().to_string(),
            message: message.to_string(),
        }
    }

    /// Whether this error came from a fixture failing to materialize.
    pub fn is_creation_failure(&self) -> bool {
        matches!(
            self,
            Self::ResourceCreation { .. } | Self::CyclicDependency { .. }
        )
    }
}

impl ConfigurationError {
    /// Create a validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ConfigurationError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse {
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assertion_failure_message_includes_label_expected_and_actual() {
        let failure = AssertionFailure {
            label: Some("Share contains added recipient".to_string()),
            check: "is",
            expected: "true".to_string(),
            actual: "false".to_string(),
        };

        let message = failure.to_string();
        assert!(message.contains("Share contains added recipient"));
        assert!(message.contains("expected: true"));
        assert!(message.contains("actual: false"));
    }

    #[test]
    fn creation_errors_are_cloneable_and_comparable() {
        let key = ResourceKey::new("org", "blacklist-x");
        let error = HarnessError::creation(&key, "status 400");
        assert_eq!(error.clone(), error);
        assert!(error.is_creation_failure());
        assert_eq!(
            error.to_string(),
            "Failed to create fixture 'org:blacklist-x': status 400"
        );
    }

    #[test]
    fn decode_error_names_target_type() {
        let error = HarnessError::decode::<Vec<u32>>("expected a sequence");
        match error {
            HarnessError::Decode { target, .. } => assert!(target.contains("Vec<u32>")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
