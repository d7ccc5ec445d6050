//! Per-test view of the harness.

use crate::cache::{RecycleAction, ResourceCache, ResourceKey};
use crate::config::HarnessConfig;
use crate::dispatcher::{Dispatcher, PendingResponse};
use crate::error::HarnessResult;
use crate::request::RequestSpec;
use crate::response::ResponseView;
use crate::verify::{AssertionLog, Check};
use std::sync::Arc;

/// Handed to a test body.
///
/// Holds a dispatcher session of its own, so [`TestContext::response`] is
/// always the response to this test's last request.
#[derive(Clone)]
pub struct TestContext {
    name: Arc<str>,
    cache: ResourceCache,
    dispatcher: Dispatcher,
    config: Arc<HarnessConfig>,
    log: Arc<AssertionLog>,
}

impl TestContext {
    pub(crate) fn new(
        name: &str,
        cache: ResourceCache,
        dispatcher: Dispatcher,
        config: Arc<HarnessConfig>,
    ) -> Self {
        Self {
            name: Arc::from(name),
            cache,
            dispatcher,
            config,
            log: Arc::new(AssertionLog::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fetch a fixture, creating it if no other test has.
    pub async fn get<T>(&self, key: &ResourceKey) -> HarnessResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.cache.get(key).await
    }

    /// Register cleanup for something this test created on a fixture.
    pub fn on_recycle(&self, key: &ResourceKey, action: RecycleAction) -> HarnessResult<()> {
        self.cache.on_recycle(key, action)
    }

    /// Execute a request on this test's session.
    pub async fn send(&self, spec: &RequestSpec) -> HarnessResult<PendingResponse> {
        self.dispatcher.send(spec).await
    }

    /// The last response this test received.
    pub fn response(&self) -> HarnessResult<Arc<ResponseView>> {
        self.dispatcher.last_response()
    }

    /// Record a verification without stopping the test.
    ///
    /// Failures are reported together once the body returns.
    pub fn check(&self, outcome: Check) -> bool {
        self.log.check(outcome)
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Failures collected by [`TestContext::check`], as one result.
    pub(crate) fn soft_failures(&self) -> HarnessResult<()> {
        self.log.result()
    }
}
