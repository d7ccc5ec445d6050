//! Per-key cache entries.
//!
//! Each entry is guarded on its own: a short-lived std mutex protects the
//! metadata and is never held across an await, while an async mutex (the
//! creation gate) is held by the single task running the provider.

use crate::cache::{RecycleAction, ResourceKey};
use crate::error::{HarnessError, HarnessResult};
use std::any::{Any, type_name};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Creation state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Never created, or recycled/reset since the last creation
    NotStarted,
    /// A provider is currently creating the fixture
    InProgress,
    /// The fixture is available
    Ready,
    /// The provider failed; a retry requires an explicit reset
    Failed,
}

/// Point-in-time view of an entry, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub key: ResourceKey,
    pub state: EntryState,
    pub consumers: usize,
    pub pending_recycle_actions: usize,
    pub fixture_type: Option<&'static str>,
}

/// Type-erased fixture value.
#[derive(Clone)]
pub(crate) struct StoredFixture {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl StoredFixture {
    pub(crate) fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    pub(crate) fn downcast<T: Clone + 'static>(&self, key: &ResourceKey) -> HarnessResult<T> {
        self.value
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| HarnessError::FixtureTypeMismatch {
                key: key.clone(),
                requested: type_name::<T>(),
                actual: self.type_name,
            })
    }
}

#[derive(Default)]
struct EntryMeta {
    state: Option<Settled>,
    in_progress: bool,
    recycle: Vec<RecycleAction>,
    consumers: usize,
    created_seq: Option<u64>,
    dependents: Vec<ResourceKey>,
}

enum Settled {
    Ready(StoredFixture),
    Failed(HarnessError),
}

pub(crate) struct ResourceEntry {
    key: ResourceKey,
    meta: Mutex<EntryMeta>,
    pub(crate) gate: tokio::sync::Mutex<()>,
}

impl ResourceEntry {
    pub(crate) fn new(key: ResourceKey) -> Self {
        Self {
            key,
            meta: Mutex::new(EntryMeta::default()),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    fn meta(&self) -> MutexGuard<'_, EntryMeta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> EntryState {
        let meta = self.meta();
        match (&meta.state, meta.in_progress) {
            (_, true) => EntryState::InProgress,
            (Some(Settled::Ready(_)), false) => EntryState::Ready,
            (Some(Settled::Failed(_)), false) => EntryState::Failed,
            (None, false) => EntryState::NotStarted,
        }
    }

    /// The settled outcome, if creation already finished.
    pub(crate) fn settled(&self) -> Option<HarnessResult<StoredFixture>> {
        match &self.meta().state {
            Some(Settled::Ready(fixture)) => Some(Ok(fixture.clone())),
            Some(Settled::Failed(error)) => Some(Err(error.clone())),
            None => None,
        }
    }

    pub(crate) fn created_seq(&self) -> Option<u64> {
        self.meta().created_seq
    }

    /// Mark the entry as being created. The caller must hold the gate.
    pub(crate) fn begin(self: &Arc<Self>) -> CreationGuard {
        self.meta().in_progress = true;
        CreationGuard {
            entry: Arc::clone(self),
            finished: false,
        }
    }

    /// Note that `dependent` was created from this fixture.
    pub(crate) fn add_dependent(&self, dependent: &ResourceKey) {
        let mut meta = self.meta();
        if !meta.dependents.contains(dependent) {
            meta.dependents.push(dependent.clone());
        }
    }

    pub(crate) fn dependents(&self) -> Vec<ResourceKey> {
        self.meta().dependents.clone()
    }

    pub(crate) fn push_recycle(&self, action: RecycleAction) -> HarnessResult<()> {
        let mut meta = self.meta();
        match meta.state {
            Some(Settled::Ready(_)) => {
                meta.recycle.push(action);
                Ok(())
            }
            _ => Err(HarnessError::invalid_request(format!(
                "cannot register recycle action '{}' on '{}': fixture is not ready",
                action.description(),
                self.key
            ))),
        }
    }

    /// Take the recycle actions and return the entry to `NotStarted`.
    /// The caller must hold the gate. Only ready entries are recycled.
    pub(crate) fn take_for_recycle(&self) -> Option<Vec<RecycleAction>> {
        let mut meta = self.meta();
        if !matches!(meta.state, Some(Settled::Ready(_))) {
            return None;
        }
        meta.state = None;
        meta.created_seq = None;
        meta.consumers = 0;
        meta.dependents.clear();
        Some(std::mem::take(&mut meta.recycle))
    }

    /// Forget any outcome without running recycle actions. Returns how many
    /// actions were dropped.
    pub(crate) fn reset(&self) -> usize {
        let mut meta = self.meta();
        meta.state = None;
        meta.created_seq = None;
        meta.consumers = 0;
        meta.dependents.clear();
        std::mem::take(&mut meta.recycle).len()
    }

    pub(crate) fn acquire(&self) {
        self.meta().consumers += 1;
    }

    pub(crate) fn release(&self) {
        let mut meta = self.meta();
        meta.consumers = meta.consumers.saturating_sub(1);
    }

    pub(crate) fn snapshot(&self) -> EntrySnapshot {
        let state = self.state();
        let meta = self.meta();
        EntrySnapshot {
            key: self.key.clone(),
            state,
            consumers: meta.consumers,
            pending_recycle_actions: meta.recycle.len(),
            fixture_type: match &meta.state {
                Some(Settled::Ready(fixture)) => Some(fixture.type_name),
                _ => None,
            },
        }
    }
}

/// Holds an entry in `InProgress` until creation settles.
///
/// If the creating task is dropped before settling, the entry returns to
/// `NotStarted` so a later caller can try again.
pub(crate) struct CreationGuard {
    entry: Arc<ResourceEntry>,
    finished: bool,
}

impl CreationGuard {
    pub(crate) fn ready(mut self, fixture: StoredFixture, recycle: Vec<RecycleAction>, seq: u64) {
        let mut meta = self.entry.meta();
        meta.state = Some(Settled::Ready(fixture));
        meta.recycle = recycle;
        meta.created_seq = Some(seq);
        meta.in_progress = false;
        drop(meta);
        self.finished = true;
    }

    pub(crate) fn failed(mut self, error: HarnessError) {
        let mut meta = self.entry.meta();
        meta.state = Some(Settled::Failed(error));
        meta.in_progress = false;
        drop(meta);
        self.finished = true;
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        if !self.finished {
            log::warn!(
                "Creation of '{}' was abandoned; entry returns to NotStarted",
                self.entry.key
            );
            self.entry.meta().in_progress = false;
        }
    }
}
