//! Harness configuration.
//!
//! Configuration arrives already resolved: environment placeholders in file
//! names are substituted before the files reach this module. Several JSON
//! documents can be layered, later documents overriding earlier ones key by
//! key, so that environment, user and token files can be kept apart.
//!
//! ```rust
//! use api_harness::config::HarnessConfig;
//!
//! let config = HarnessConfig::from_json_str(r#"{
//!     "base_url": "https://api.example.com",
//!     "api_version": "v1",
//!     "credentials": {
//!         "admin": { "username": "admin@example.com", "password": "secret" }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.max_parallelism, 8);
//! assert!(config.credentials("admin").is_ok());
//! ```

use crate::dispatcher::PollPolicy;
use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Base URL of the service under test, without a trailing path
    pub base_url: String,
    /// Version segment inserted for requests that require one, e.g. `v1`
    pub api_version: Option<String>,
    /// Client-side timeout for a single request
    pub request_timeout_ms: u64,
    /// Maximum number of tests running at once
    pub max_parallelism: usize,
    /// Default budget for polling waits
    pub poll_timeout_ms: u64,
    /// Default delay between polling attempts
    pub poll_interval_ms: u64,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    /// Named credentials used by token fixtures
    pub credentials: BTreeMap<String, Credentials>,
    /// Endpoint paths used by the bundled fixture providers
    pub endpoints: Endpoints,
}

/// Credentials for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Paths of the endpoints the bundled providers call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub token: String,
    pub token_revocation: String,
    pub shares: String,
    pub personal_shares: String,
    pub blacklist: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: "/connect/token".to_string(),
            token_revocation: "/connect/revocation".to_string(),
            shares: "/gl-share/api/share".to_string(),
            personal_shares: "/gl-share/api/share/personal".to_string(),
            blacklist: "/gl-share/api/Admin/blacklist".to_string(),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            api_version: None,
            request_timeout_ms: 30_000,
            max_parallelism: 8,
            poll_timeout_ms: 60_000,
            poll_interval_ms: 1_000,
            default_headers: BTreeMap::new(),
            credentials: BTreeMap::new(),
            endpoints: Endpoints::default(),
        }
    }
}

impl HarnessConfig {
    /// Parse and validate a single JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a single JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        Self::load_layered([path])
    }

    /// Load several JSON files and merge them in order.
    ///
    /// Objects are merged key by key; any other value in a later file replaces
    /// the earlier one.
    pub fn load_layered<I, P>(paths: I) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut documents = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Io {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            documents.push(serde_json::from_str::<Value>(&text)?);
        }
        Self::from_documents(documents)
    }

    /// Merge already-parsed JSON documents in order.
    pub fn from_documents(
        documents: impl IntoIterator<Item = Value>,
    ) -> Result<Self, ConfigurationError> {
        let mut merged = Value::Object(Default::default());
        for document in documents {
            merge_json(&mut merged, document);
        }
        let config: Self = serde_json::from_value(merged)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values that would make every test fail.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(ConfigurationError::invalid("base_url cannot be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ConfigurationError::invalid(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.max_parallelism == 0 {
            return Err(ConfigurationError::invalid(
                "max_parallelism must be greater than 0",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid(
                "poll_interval_ms must be greater than 0",
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigurationError::invalid(
                "request_timeout_ms must be greater than 0",
            ));
        }
        if let Some(version) = &self.api_version {
            if version.trim_matches('/').is_empty() {
                return Err(ConfigurationError::invalid("api_version cannot be empty"));
            }
        }
        Ok(())
    }

    /// Look up named credentials.
    pub fn credentials(&self, name: &str) -> Result<&Credentials, ConfigurationError> {
        self.credentials
            .get(name)
            .ok_or_else(|| ConfigurationError::MissingCredentials {
                name: name.to_string(),
            })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Default polling budget and interval.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.poll_timeout_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_credentials(mut self, name: impl Into<String>, credentials: Credentials) -> Self {
        self.credentials.insert(name.into(), credentials);
        self
    }

    pub fn with_max_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }

    pub fn with_poll(mut self, timeout: Duration, interval: Duration) -> Self {
        self.poll_timeout_ms = timeout.as_millis() as u64;
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }
}

impl Credentials {
    /// Username/password credentials.
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            client_id: None,
            client_secret: None,
            scope: None,
        }
    }

    /// Attach an OAuth client.
    pub fn with_client(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }
}

fn merge_json(target: &mut Value, overlay: Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, overlay) => *target = overlay,
    }
}
