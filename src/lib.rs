//! Fixture provisioning and request DSL for end-to-end API tests.
//!
//! Provides a concurrency-safe fixture cache with exactly-once creation and
//! deterministic recycling, an immutable request description with
//! non-destructive overrides, and fluent verification of responses.
//!
//! # Core Components
//!
//! - [`ResourceCache`] - Single-flight store of shared fixtures
//! - [`RequestSpec`] - Immutable description of one HTTP call
//! - [`Dispatcher`] - Executes requests and keeps the last response
//! - [`verify()`] - Fluent assertions with descriptive failures
//! - [`TestRunner`] - Resolves fixtures, runs test bodies, recycles afterwards
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use api_harness::{Dispatcher, HarnessConfig, RequestSpec, ResourceCache, ResourceKey, verify};
//! use api_harness::providers::{self, Token};
//! use std::sync::Arc;
//!
//! # async fn example() -> api_harness::HarnessResult<()> {
//! let config = Arc::new(HarnessConfig::load_layered(["qaenv.json", "tokens/qa.json"])?);
//! let dispatcher = Dispatcher::http(&config)?;
//! let cache = ResourceCache::new();
//! providers::register_defaults(&cache, &dispatcher, Arc::clone(&config));
//!
//! let token: Token = cache.get(&ResourceKey::new("token", "admin")).await?;
//! let blacklist = RequestSpec::get(&config.endpoints.blacklist);
//!
//! let session = dispatcher.session();
//! session.send(&blacklist.with_bearer(&token.access_token)).await?;
//! verify(session.last_response()?.status()).is(200)?;
//!
//! cache.recycle_all().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod providers;
pub mod request;
pub mod response;
pub mod runner;
pub mod verify;

// Re-export commonly used types for convenience
pub use cache::{
    EntryState, FixtureContext, FixtureProvider, Provisioned, RecycleAction, RecycleReport,
    ResourceCache, ResourceKey, provider_fn,
};
pub use config::{Credentials, Endpoints, HarnessConfig};
pub use dispatcher::{
    Dispatcher, HttpTransport, Observation, PendingResponse, PollPolicy, PreparedRequest, Transport,
    poll_until, wait_for,
};
pub use error::{AssertionFailure, ConfigurationError, HarnessError, HarnessResult, RecycleError};
pub use request::{Method, Override, RequestSpec, SerializationFormat, bearer};
pub use response::ResponseView;
pub use runner::{TestCase, TestContext, TestReport, TestRunner};
pub use verify::{AssertionLog, Verification, verify, verify_labeled};
