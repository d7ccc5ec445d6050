//! Deferred cleanup actions and the report produced when they run.

use crate::cache::ResourceKey;
use crate::error::{HarnessResult, RecycleError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by a recycle action.
pub type RecycleFuture = Pin<Box<dyn Future<Output = HarnessResult<()>> + Send>>;

/// A cleanup step attached to a fixture, run once when the fixture is recycled.
pub struct RecycleAction {
    description: String,
    run: Box<dyn FnOnce() -> RecycleFuture + Send>,
}

impl RecycleAction {
    /// Create a recycle action from an async closure.
    pub fn new<F, Fut>(description: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = HarnessResult<()>> + Send + 'static,
    {
        Self {
            description: description.into(),
            run: Box::new(move || Box::pin(action())),
        }
    }

    /// Human readable description used in logs.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) async fn run(self) -> HarnessResult<()> {
        (self.run)().await
    }
}

impl fmt::Debug for RecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecycleAction")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Outcome of a recycle pass.
///
/// Failures are collected rather than raised so that they never replace the
/// outcome of the test that owned the fixtures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecycleReport {
    /// Keys that were reset, in the order they were torn down
    pub recycled: Vec<ResourceKey>,
    /// Number of actions executed, successful or not
    pub actions_run: usize,
    /// Failed actions
    pub errors: Vec<RecycleError>,
}

impl RecycleReport {
    /// Whether every action succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: RecycleReport) {
        self.recycled.extend(other.recycled);
        self.actions_run += other.actions_run;
        self.errors.extend(other.errors);
    }
}
