//! Test scheduling.
//!
//! A [`TestCase`] declares the fixtures it needs and the fixtures it is
//! responsible for recycling. [`TestRunner`] resolves the requirements, runs
//! the body on its own task, and recycles afterwards whatever the outcome.
//!
//! ```rust,no_run
//! use api_harness::cache::ResourceKey;
//! use api_harness::providers::Token;
//! use api_harness::request::RequestSpec;
//! use api_harness::runner::{TestCase, TestRunner};
//! use api_harness::verify::verify;
//!
//! # async fn example(runner: TestRunner) {
//! let admin = ResourceKey::new("token", "admin");
//! let case = TestCase::new("get_blacklist_as_admin")
//!     .requires([admin.clone()])
//!     .recycles([admin.clone()])
//!     .body(move |ctx| async move {
//!         let token: Token = ctx.get(&admin).await?;
//!         let pending = ctx
//!             .send(&RequestSpec::get("/gl-share/api/Admin/blacklist").with_bearer(&token.access_token))
//!             .await?;
//!         verify(pending.status()).is(200)?;
//!         Ok(())
//!     });
//!
//! let report = runner.run(case).await;
//! assert!(report.passed());
//! # }
//! ```

mod context;

#[cfg(test)]
mod tests;

pub use context::TestContext;

use crate::cache::{RecycleReport, ResourceCache, ResourceKey};
use crate::config::HarnessConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{HarnessError, HarnessResult, RecycleError};
use log::{debug, info, warn};
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, Semaphore};

type TestFuture = Pin<Box<dyn Future<Output = HarnessResult<()>> + Send>>;
type TestBody = Box<dyn FnOnce(TestContext) -> TestFuture + Send>;

/// One test: its fixture declarations and body.
pub struct TestCase {
    name: String,
    requires: Vec<ResourceKey>,
    recycles: Vec<ResourceKey>,
    serial: bool,
    body: Option<TestBody>,
}

impl TestCase {
    /// Create a parallel test with no fixtures and no body yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            recycles: Vec::new(),
            serial: false,
            body: None,
        }
    }

    /// Fixtures created before the body runs.
    pub fn requires(mut self, keys: impl IntoIterator<Item = ResourceKey>) -> Self {
        self.requires.extend(keys);
        self
    }

    /// Fixtures recycled after the body, pass or fail.
    pub fn recycles(mut self, keys: impl IntoIterator<Item = ResourceKey>) -> Self {
        self.recycles.extend(keys);
        self
    }

    /// Run with no other test in flight.
    pub fn serial(mut self) -> Self {
        self.serial = true;
        self
    }

    /// The test itself. It receives a [`TestContext`] for fixtures,
    /// requests and soft checks; returning an error fails the test.
    pub fn body<F, Fut>(mut self, body: F) -> Self
    where
        F: FnOnce(TestContext) -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        self.body = Some(Box::new(move |ctx| Box::pin(body(ctx))));
        self
    }

    /// Name used in logs and in the report.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the test must run alone.
    pub fn is_serial(&self) -> bool {
        self.serial
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("recycles", &self.recycles)
            .field("serial", &self.serial)
            .finish_non_exhaustive()
    }
}

/// Result of one test.
#[derive(Debug, Clone, PartialEq)]
pub struct TestReport {
    pub name: String,
    /// Failure of setup, body or soft verifications; never of recycling
    pub outcome: HarnessResult<()>,
    pub recycle_errors: Vec<RecycleError>,
    pub duration: Duration,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Runs tests against a shared cache.
///
/// At most `max_parallelism` tests run at once. Serial tests wait until every
/// running test has finished and keep new ones out until they are done.
#[derive(Clone)]
pub struct TestRunner {
    cache: ResourceCache,
    dispatcher: Dispatcher,
    config: Arc<HarnessConfig>,
    permits: Arc<Semaphore>,
    barrier: Arc<RwLock<()>>,
}

impl TestRunner {
    /// Create a runner over a cache with its providers registered.
    ///
    /// The parallelism cap comes from `config.max_parallelism`.
    pub fn new(cache: ResourceCache, dispatcher: Dispatcher, config: Arc<HarnessConfig>) -> Self {
        let permits = config.max_parallelism.max(1);
        Self {
            cache,
            dispatcher,
            config,
            permits: Arc::new(Semaphore::new(permits)),
            barrier: Arc::new(RwLock::new(())),
        }
    }

    /// The shared fixture cache.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Run one test to completion, including its recycling.
    pub async fn run(&self, case: TestCase) -> TestReport {
        let TestCase {
            name,
            requires,
            recycles,
            serial,
            body,
        } = case;

        let (_shared, _exclusive) = if serial {
            (None, Some(self.barrier.write().await))
        } else {
            (Some(self.barrier.read().await), None)
        };
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return TestReport {
                    name,
                    outcome: Err(HarnessError::invalid_request("test runner is closed")),
                    recycle_errors: Vec::new(),
                    duration: Duration::ZERO,
                };
            }
        };

        let started = Instant::now();
        debug!("Starting test '{}'", name);
        let ctx = TestContext::new(
            &name,
            self.cache.clone(),
            self.dispatcher.session(),
            Arc::clone(&self.config),
        );

        let mut outcome = self.setup(&requires).await;
        if outcome.is_ok() {
            for key in &requires {
                self.cache.acquire(key);
            }
            outcome = match body {
                Some(body) => run_body(body, ctx.clone()).await,
                None => Err(HarnessError::invalid_request(format!(
                    "test '{}' has no body",
                    name
                ))),
            };
            for key in &requires {
                self.cache.release(key);
            }
        }
        if outcome.is_ok() {
            outcome = ctx.soft_failures();
        }

        let recycled = self.cache.recycle(&recycles).await;
        let duration = started.elapsed();
        match &outcome {
            Ok(()) => info!("Test '{}' passed in {:?}", name, duration),
            Err(error) => warn!("Test '{}' failed in {:?}: {}", name, duration, error),
        }

        TestReport {
            name,
            outcome,
            recycle_errors: recycled.errors,
            duration,
        }
    }

    /// Run every test concurrently, subject to the parallelism cap and the
    /// serial barrier. Reports are returned in input order.
    pub async fn run_all(&self, cases: Vec<TestCase>) -> Vec<TestReport> {
        let mut handles = Vec::with_capacity(cases.len());
        for case in cases {
            let runner = self.clone();
            let name = case.name.clone();
            handles.push((name, tokio::spawn(async move { runner.run(case).await })));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            reports.push(match handle.await {
                Ok(report) => report,
                Err(error) => TestReport {
                    name,
                    outcome: Err(HarnessError::Panicked {
                        message: error.to_string(),
                    }),
                    recycle_errors: Vec::new(),
                    duration: Duration::ZERO,
                },
            });
        }
        reports
    }

    /// Recycle every fixture still resident.
    pub async fn shutdown(&self) -> RecycleReport {
        self.cache.recycle_all().await
    }

    async fn setup(&self, requires: &[ResourceKey]) -> HarnessResult<()> {
        for key in requires {
            self.cache.ensure(key).await?;
        }
        Ok(())
    }
}

/// Run the body on its own task so a panic becomes a failed outcome.
async fn run_body(body: TestBody, ctx: TestContext) -> HarnessResult<()> {
    match tokio::spawn(body(ctx)).await {
        Ok(outcome) => outcome,
        Err(error) if error.is_panic() => Err(HarnessError::Panicked {
            message: panic_message(error.into_panic()),
        }),
        Err(error) => Err(HarnessError::Panicked {
            message: error.to_string(),
        }),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
