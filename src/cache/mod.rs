//! Shared fixture cache.
//!
//! [`ResourceCache`] memoizes fixtures by [`ResourceKey`]. The first caller of
//! [`ResourceCache::get`] for a key runs the provider registered for the key's
//! category; every concurrent caller for the same key waits for that single
//! creation and receives the same value, or the same error. Different keys are
//! created in parallel.
//!
//! Fixtures stay resident until recycled. Recycling runs the cleanup actions
//! the provider (or a test) registered, last created first, and returns the
//! entry to [`EntryState::NotStarted`] so a later test gets a fresh fixture.
//! Fixtures created from a recycled one are recycled with it.
//!
//! # Example
//!
//! ```rust
//! use api_harness::cache::{Provisioned, ResourceCache, ResourceKey, provider_fn};
//!
//! # async fn example() -> api_harness::HarnessResult<()> {
//! let cache = ResourceCache::new();
//! cache.register("token", provider_fn(|_ctx, key: ResourceKey| async move {
//!     Ok(Provisioned::new(format!("token-for-{}", key.name())))
//! }));
//!
//! let token: String = cache.get(&ResourceKey::new("token", "admin")).await?;
//! assert_eq!(token, "token-for-admin");
//! # Ok(())
//! # }
//! ```

mod entry;
mod key;
mod provider;
mod recycle;


pub use entry::{EntrySnapshot, EntryState};
pub use key::ResourceKey;
pub use provider::{FixtureContext, FixtureProvider, FnProvider, Provisioned, provider_fn};
pub use recycle::{RecycleAction, RecycleFuture, RecycleReport};

use crate::error::{HarnessError, HarnessResult, RecycleError};
use entry::{ResourceEntry, StoredFixture};
use log::{debug, info, trace, warn};
use provider::{Erased, ErasedProvider};
use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

tokio::task_local! {
    /// Keys being created by the current task, outermost first.
    static RESOLVING: Arc<Vec<ResourceKey>>;
}

/// Resolution chain of the task we are running on, if it is a provider.
fn current_chain() -> Arc<Vec<ResourceKey>> {
    RESOLVING.try_with(Arc::clone).unwrap_or_default()
}

/// Counts of entries per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub ready: usize,
    pub in_progress: usize,
    pub failed: usize,
}

/// Concurrency-safe memoizing store of shared fixtures.
///
/// Cloning is cheap; clones share the same entries and providers.
#[derive(Clone, Default)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    providers: RwLock<HashMap<String, Arc<dyn ErasedProvider>>>,
    entries: Mutex<HashMap<ResourceKey, Arc<ResourceEntry>>>,
    sequence: AtomicU64,
    /// Creations blocked on another key's gate: (waiting key, awaited key).
    waits: Mutex<Vec<(ResourceKey, ResourceKey)>>,
}

impl ResourceCache {
    /// Create an empty cache with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the provider for a category, replacing any previous one.
    pub fn register<P: FixtureProvider>(&self, category: impl Into<String>, provider: P) -> &Self {
        let category = category.into();
        let mut providers = self
            .inner
            .providers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if providers
            .insert(category.clone(), Arc::new(Erased(Arc::new(provider))))
            .is_some()
        {
            warn!("Replaced fixture provider for category '{}'", category);
        } else {
            debug!(
                "Registered fixture provider for category '{}' ({})",
                category,
                type_name::<P::Fixture>()
            );
        }
        self
    }

    /// Whether a provider is registered for `category`.
    pub fn has_provider(&self, category: &str) -> bool {
        self.inner
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(category)
    }

    /// Get the fixture for `key`, creating it on first access.
    ///
    /// # Errors
    ///
    /// * [`HarnessError::ResourceCreation`] if the provider failed, now or in
    ///   an earlier attempt that has not been reset
    /// * [`HarnessError::ProviderNotRegistered`] if no provider handles the category
    /// * [`HarnessError::FixtureTypeMismatch`] if the fixture is not a `T`
    pub async fn get<T>(&self, key: &ResourceKey) -> HarnessResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let chain = current_chain();
        self.resolve(key, &chain).await
    }

    /// Create the fixture for `key` if needed, whatever its type.
    ///
    /// Used to set up declared requirements before a test body asks for
    /// them by type.
    pub async fn ensure(&self, key: &ResourceKey) -> HarnessResult<()> {
        let chain = current_chain();
        self.materialize(key, &chain, None).await.map(|_| ())
    }

    pub(crate) async fn resolve<T>(&self, key: &ResourceKey, chain: &[ResourceKey]) -> HarnessResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.materialize(key, chain, Some((TypeId::of::<T>(), type_name::<T>())))
            .await?
            .downcast(key)
    }

    async fn materialize(
        &self,
        key: &ResourceKey,
        chain: &[ResourceKey],
        expected: Option<(TypeId, &'static str)>,
    ) -> HarnessResult<StoredFixture> {
        let outcome = self.create_or_wait(key, chain, expected).await;
        if let (Ok(_), Some(dependent)) = (&outcome, chain.last()) {
            self.entry(key).add_dependent(dependent);
        }
        outcome
    }

    async fn create_or_wait(
        &self,
        key: &ResourceKey,
        chain: &[ResourceKey],
        expected: Option<(TypeId, &'static str)>,
    ) -> HarnessResult<StoredFixture> {
        if chain.contains(key) {
            return Err(cyclic(chain, key));
        }

        let entry = self.entry(key);
        if let Some(outcome) = entry.settled() {
            trace!("Fixture '{}' served from cache", key);
            return outcome;
        }

        let waiting = match chain.last() {
            Some(waiter) => Some(self.begin_wait(waiter, key, chain)?),
            None => None,
        };
        let _gate = entry.gate.lock().await;
        drop(waiting);
        // Someone else may have finished creating while we waited on the gate.
        if let Some(outcome) = entry.settled() {
            return outcome;
        }

        let provider = self.provider_for(key)?;
        if let Some((type_id, requested)) = expected {
            if provider.fixture_type_id() != type_id {
                return Err(HarnessError::FixtureTypeMismatch {
                    key: key.clone(),
                    requested,
                    actual: provider.fixture_type_name(),
                });
            }
        }

        let guard = entry.begin();
        let mut next_chain = chain.to_vec();
        next_chain.push(key.clone());
        let next_chain = Arc::new(next_chain);
        let ctx = FixtureContext::new(self.clone(), Arc::clone(&next_chain));

        debug!("Creating fixture '{}'", key);
        let started = Instant::now();
        match RESOLVING.scope(next_chain, provider.create(ctx, key.clone())).await {
            Ok((fixture, recycle)) => {
                let seq = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
                info!(
                    "Created fixture '{}' in {:?} ({} recycle action(s))",
                    key,
                    started.elapsed(),
                    recycle.len()
                );
                guard.ready(fixture.clone(), recycle, seq);
                Ok(fixture)
            }
            Err(error) => {
                let error = if error_names(&error, key) {
                    error
                } else {
                    HarnessError::creation(key, error.to_string())
                };
                warn!("Fixture '{}' failed after {:?}: {}", key, started.elapsed(), error);
                guard.failed(error.clone());
                Err(error)
            }
        }
    }

    /// Record that the creation of `waiter` is about to block on `awaited`.
    ///
    /// Fails instead if whoever holds `awaited` is itself blocked, directly
    /// or through other creations, on a key in `chain`.
    fn begin_wait(
        &self,
        waiter: &ResourceKey,
        awaited: &ResourceKey,
        chain: &[ResourceKey],
    ) -> HarnessResult<WaitGuard> {
        let mut waits = self.inner.waits.lock().unwrap_or_else(PoisonError::into_inner);
        let mut frontier = vec![awaited.clone()];
        let mut visited: Vec<ResourceKey> = Vec::new();
        while let Some(current) = frontier.pop() {
            if chain.contains(&current) {
                warn!(
                    "Creation of '{}' would wait on '{}', which is waiting on it",
                    waiter, awaited
                );
                return Err(cyclic(chain, awaited));
            }
            if visited.contains(&current) {
                continue;
            }
            frontier.extend(
                waits
                    .iter()
                    .filter(|(from, _)| from == &current)
                    .map(|(_, to)| to.clone()),
            );
            visited.push(current);
        }
        let edge = (waiter.clone(), awaited.clone());
        waits.push(edge.clone());
        Ok(WaitGuard {
            inner: Arc::clone(&self.inner),
            edge,
        })
    }

    /// Register an extra cleanup action on a created fixture.
    ///
    /// Fails with [`HarnessError::InvalidRequest`] if the fixture is not ready.
    pub fn on_recycle(&self, key: &ResourceKey, action: RecycleAction) -> HarnessResult<()> {
        match self.existing(key) {
            Some(entry) => entry.push_recycle(action),
            None => Err(HarnessError::invalid_request(format!(
                "cannot register recycle action on '{}': fixture was never created",
                key
            ))),
        }
    }

    /// Recycle the given fixtures.
    ///
    /// Resident fixtures that were created from one of `keys` are recycled
    /// too. Entries are torn down last created first; each entry's actions
    /// run in reverse registration order. Keys that were never created, or whose
    /// creation failed, are skipped. Failures are collected in the report.
    pub async fn recycle(&self, keys: &[ResourceKey]) -> RecycleReport {
        let mut targets: Vec<(u64, ResourceKey, Arc<ResourceEntry>)> = Vec::new();
        let mut pending: Vec<ResourceKey> = keys.iter().rev().cloned().collect();
        while let Some(key) = pending.pop() {
            if targets.iter().any(|(_, existing, _)| existing == &key) {
                continue;
            }
            if let Some(entry) = self.existing(&key) {
                if let Some(seq) = entry.created_seq() {
                    let dependents = entry.dependents();
                    if !dependents.is_empty() {
                        debug!("Recycling '{}' also recycles its dependents {:?}", key, dependents);
                    }
                    pending.extend(dependents);
                    targets.push((seq, key, entry));
                }
            }
        }
        // Dependents always finish creating after what they depend on.
        targets.sort_by(|a, b| b.0.cmp(&a.0));

        let mut report = RecycleReport::default();
        for (_, key, entry) in targets {
            // Hold the gate so nobody recreates the key while it is torn down.
            let _gate = entry.gate.lock().await;
            let Some(mut actions) = entry.take_for_recycle() else {
                continue;
            };
            debug!("Recycling '{}' ({} action(s))", key, actions.len());
            while let Some(action) = actions.pop() {
                let description = action.description().to_string();
                report.actions_run += 1;
                if let Err(error) = action.run().await {
                    warn!("Recycle action '{}' for '{}' failed: {}", description, key, error);
                    report.errors.push(RecycleError {
                        key: key.clone(),
                        message: format!("{}: {}", description, error),
                    });
                }
            }
            report.recycled.push(key);
        }
        report
    }

    /// Recycle every resident fixture.
    pub async fn recycle_all(&self) -> RecycleReport {
        let keys: Vec<ResourceKey> = self.entries().keys().cloned().collect();
        let report = self.recycle(&keys).await;
        info!(
            "Recycled {} fixture(s), {} failure(s)",
            report.recycled.len(),
            report.errors.len()
        );
        report
    }

    /// Forget the outcome for `key` without running its recycle actions.
    ///
    /// This is how a failed fixture becomes eligible for another attempt.
    /// Returns `false` if the key was never requested.
    pub async fn reset(&self, key: &ResourceKey) -> bool {
        let Some(entry) = self.existing(key) else {
            return false;
        };
        let _gate = entry.gate.lock().await;
        let dropped = entry.reset();
        if dropped > 0 {
            warn!("Reset of '{}' dropped {} recycle action(s)", key, dropped);
        }
        true
    }

    /// Current state of `key`.
    pub fn state(&self, key: &ResourceKey) -> EntryState {
        self.existing(key)
            .map(|entry| entry.state())
            .unwrap_or(EntryState::NotStarted)
    }

    /// Diagnostic snapshot of `key`, if it was ever requested.
    pub fn snapshot(&self, key: &ResourceKey) -> Option<EntrySnapshot> {
        self.existing(key).map(|entry| entry.snapshot())
    }

    /// Record an active consumer of `key` within the current test.
    pub fn acquire(&self, key: &ResourceKey) {
        if let Some(entry) = self.existing(key) {
            entry.acquire();
        }
    }

    /// Drop an active consumer of `key`.
    pub fn release(&self, key: &ResourceKey) {
        if let Some(entry) = self.existing(key) {
            entry.release();
        }
    }

    /// Entry counts per state.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries();
        let mut stats = CacheStats {
            entries: entries.len(),
            ..CacheStats::default()
        };
        for entry in entries.values() {
            match entry.state() {
                EntryState::Ready => stats.ready += 1,
                EntryState::InProgress => stats.in_progress += 1,
                EntryState::Failed => stats.failed += 1,
                EntryState::NotStarted => {}
            }
        }
        stats
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ResourceKey, Arc<ResourceEntry>>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn entry(&self, key: &ResourceKey) -> Arc<ResourceEntry> {
        Arc::clone(
            self.entries()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(ResourceEntry::new(key.clone()))),
        )
    }

    fn existing(&self, key: &ResourceKey) -> Option<Arc<ResourceEntry>> {
        self.entries().get(key).cloned()
    }

    fn provider_for(&self, key: &ResourceKey) -> HarnessResult<Arc<dyn ErasedProvider>> {
        self.inner
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key.category())
            .cloned()
            .ok_or_else(|| HarnessError::ProviderNotRegistered {
                category: key.category().to_string(),
            })
    }
}

/// Removes a wait edge once the waiter holds the gate or gives up.
struct WaitGuard {
    inner: Arc<CacheInner>,
    edge: (ResourceKey, ResourceKey),
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        let mut waits = self.inner.waits.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(position) = waits.iter().position(|edge| edge == &self.edge) {
            waits.swap_remove(position);
        }
    }
}

fn cyclic(chain: &[ResourceKey], key: &ResourceKey) -> HarnessError {
    let rendered = chain
        .iter()
        .chain(std::iter::once(key))
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ");
    HarnessError::CyclicDependency {
        key: key.clone(),
        chain: rendered,
    }
}

/// Whether a creation error already describes `key` itself.
fn error_names(error: &HarnessError, key: &ResourceKey) -> bool {
    match error {
        HarnessError::ResourceCreation { key: failed, .. } => failed == key,
        HarnessError::CyclicDependency { .. } => true,
        _ => false,
    }
}
