//! Access tokens for configured accounts.
//!
//! The key name selects the credentials: `token:admin` logs in with
//! `credentials.admin`. Recycling a token revokes it.

use super::models::{Token, User};
use super::require_success;
use crate::cache::{FixtureContext, FixtureProvider, Provisioned, RecycleAction, ResourceKey};
use crate::config::{Credentials, HarnessConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{HarnessError, HarnessResult};
use crate::request::RequestSpec;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::debug;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// `Basic` authorization for the OAuth client, if one is configured.
pub fn client_authorization(credentials: &Credentials) -> Option<String> {
    let client_id = credentials.client_id.as_deref()?;
    let secret = credentials.client_secret.as_deref().unwrap_or_default();
    Some(format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", client_id, secret))
    ))
}

/// Logs in with named credentials.
#[derive(Clone)]
pub struct TokenProvider {
    dispatcher: Dispatcher,
    config: Arc<HarnessConfig>,
}

impl TokenProvider {
    pub fn new(dispatcher: Dispatcher, config: Arc<HarnessConfig>) -> Self {
        Self { dispatcher, config }
    }

    fn login_request(&self, credentials: &Credentials) -> HarnessResult<RequestSpec> {
        let mut body = json!({
            "grant_type": "password",
            "username": credentials.username,
            "password": credentials.password,
        });
        if let Some(scope) = &credentials.scope {
            body["scope"] = json!(scope);
        }
        let spec = RequestSpec::post(&self.config.endpoints.token).json(&body)?;
        Ok(match client_authorization(credentials) {
            Some(authorization) => spec.header("Authorization", authorization),
            None => spec,
        })
    }

    fn revoke_request(&self, credentials: &Credentials, token: &str) -> HarnessResult<RequestSpec> {
        let spec = RequestSpec::post(&self.config.endpoints.token_revocation).json(&json!({
            "token": token,
            "token_type_hint": "access_token",
        }))?;
        Ok(match client_authorization(credentials) {
            Some(authorization) => spec.header("Authorization", authorization),
            None => spec,
        })
    }
}

impl FixtureProvider for TokenProvider {
    type Fixture = Token;

    fn create(
        &self,
        _ctx: FixtureContext,
        key: ResourceKey,
    ) -> impl Future<Output = HarnessResult<Provisioned<Token>>> + Send {
        let provider = self.clone();
        async move {
            let credentials = provider
                .config
                .credentials(key.name())
                .map_err(|e| HarnessError::creation(&key, e.to_string()))?
                .clone();
            let dispatcher = provider.dispatcher.session();

            debug!("Requesting token for '{}'", credentials.username);
            let login = provider.login_request(&credentials)?;
            let pending = require_success(&key, dispatcher.send(&login).await?)?;
            let issued: TokenResponse = pending.take()?;

            let token = Token {
                access_token: issued.access_token,
                token_type: issued.token_type,
                expires_in: issued.expires_in,
                user: User {
                    email: credentials.username.clone(),
                },
            };

            let revoke = provider.revoke_request(&credentials, &token.access_token)?;
            let action = RecycleAction::new(format!("revoke token '{}'", key), move || async move {
                dispatcher.send(&revoke).await?.ensure_success()?;
                Ok(())
            });
            Ok(Provisioned::new(token).recycle_with(action))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_authorization_is_basic_base64() {
        let credentials = Credentials::password("admin@example.com", "pw").with_client("harness", "s3cret");
        assert_eq!(
            client_authorization(&credentials).as_deref(),
            Some("Basic aGFybmVzczpzM2NyZXQ=")
        );
        assert!(client_authorization(&Credentials::password("a", "b")).is_none());
    }
}
