//! Shared utilities for harness integration tests.
//!
//! Every test gets its own wiremock server standing in for the service under
//! test, a configuration pointing at it, and a cache with the bundled
//! providers registered.

#![allow(dead_code)]

use api_harness::providers;
use api_harness::{Credentials, Dispatcher, HarnessConfig, ResourceCache};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const BASIC_EMAIL: &str = "basic@example.com";
pub const ADMIN_TOKEN: &str = "admin-access-token";
pub const BASIC_TOKEN: &str = "basic-access-token";

/// Route log output through the test harness. Safe to call repeatedly.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn config_for(server: &MockServer) -> HarnessConfig {
    HarnessConfig::default()
        .with_base_url(server.uri())
        .with_credentials(
            "admin",
            Credentials::password(ADMIN_EMAIL, "admin-pw").with_client("harness", "s3cret"),
        )
        .with_credentials("basic", Credentials::password(BASIC_EMAIL, "basic-pw"))
        .with_poll(Duration::from_secs(2), Duration::from_millis(20))
}

/// A mock service plus everything needed to provision fixtures against it.
pub struct Harness {
    pub server: MockServer,
    pub config: Arc<HarnessConfig>,
    pub dispatcher: Dispatcher,
    pub cache: ResourceCache,
}

pub async fn harness() -> Harness {
    harness_with(|config| config).await
}

pub async fn harness_with(adjust: impl FnOnce(HarnessConfig) -> HarnessConfig) -> Harness {
    init_logging();
    let server = MockServer::start().await;
    let config = Arc::new(adjust(config_for(&server)));
    let dispatcher = Dispatcher::http(&config).expect("HTTP client");
    let cache = ResourceCache::new();
    providers::register_defaults(&cache, &dispatcher, Arc::clone(&config));
    Harness {
        server,
        config,
        dispatcher,
        cache,
    }
}

/// Token endpoint answering for one account, expected `times` times.
pub async fn mount_token(server: &MockServer, username: &str, access_token: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .and(body_partial_json(json!({ "username": username })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "access_token": access_token,
                    "token_type": "Bearer",
                    "expires_in": 3600,
                }))
                .set_delay(Duration::from_millis(30)),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// Revocation endpoint, expected `times` times.
pub async fn mount_revocation(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/connect/revocation"))
        .respond_with(ResponseTemplate::new(200))
        .expect(times)
        .mount(server)
        .await;
}

/// Share creation for the admin token, answering with `id`.
pub async fn mount_share(server: &MockServer, name: &str, id: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/gl-share/api/share"))
        .and(header("authorization", format!("Bearer {}", ADMIN_TOKEN).as_str()))
        .and(body_partial_json(json!({ "name": name })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": id, "name": name, "recipients": [] }))
                .set_delay(Duration::from_millis(30)),
        )
        .expect(times)
        .mount(server)
        .await;
}

/// Share deletion, expected `times` times.
pub async fn mount_share_delete(server: &MockServer, id: &str, times: u64) {
    Mock::given(method("DELETE"))
        .and(path(format!("/gl-share/api/share/{}", id)))
        .respond_with(ResponseTemplate::new(204))
        .expect(times)
        .mount(server)
        .await;
}
