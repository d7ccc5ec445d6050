//! Fixture provider trait and registry plumbing.
//!
//! A provider knows how to create one category of fixture. It receives a
//! [`FixtureContext`] through which it resolves the fixtures it depends on,
//! and returns the value together with the actions that undo it.

use crate::cache::entry::StoredFixture;
use crate::cache::{RecycleAction, ResourceCache, ResourceKey};
use crate::error::HarnessResult;
use std::any::{TypeId, type_name};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A created fixture and its cleanup.
#[derive(Debug)]
pub struct Provisioned<T> {
    pub value: T,
    pub recycle: Vec<RecycleAction>,
}

impl<T> Provisioned<T> {
    /// Wrap a value that needs no cleanup.
    pub fn new(value: T) -> Self {
        Self {
            value,
            recycle: Vec::new(),
        }
    }

    /// Attach a recycle action.
    pub fn recycle_with(mut self, action: RecycleAction) -> Self {
        self.recycle.push(action);
        self
    }
}

/// Creates fixtures of one category.
///
/// # Example
///
/// ```rust,no_run
/// use api_harness::cache::{FixtureContext, FixtureProvider, Provisioned, ResourceKey};
/// use api_harness::HarnessResult;
/// use std::future::Future;
///
/// struct Counter;
///
/// impl FixtureProvider for Counter {
///     type Fixture = u64;
///
///     fn create(
///         &self,
///         _ctx: FixtureContext,
///         _key: ResourceKey,
///     ) -> impl Future<Output = HarnessResult<Provisioned<u64>>> + Send {
///         async move { Ok(Provisioned::new(42)) }
///     }
/// }
/// ```
pub trait FixtureProvider: Send + Sync + 'static {
    /// The fixture type handed to tests.
    type Fixture: Clone + Send + Sync + 'static;

    /// Create the fixture identified by `key`.
    ///
    /// Dependencies are resolved through `ctx`; requesting `key` itself, or
    /// any key already on the resolution chain, fails with
    /// [`crate::HarnessError::CyclicDependency`].
    fn create(
        &self,
        ctx: FixtureContext,
        key: ResourceKey,
    ) -> impl Future<Output = HarnessResult<Provisioned<Self::Fixture>>> + Send;
}

/// Provider backed by an async closure. Created with [`provider_fn`].
pub struct FnProvider<F>(F);

/// Build a provider from an async closure.
pub fn provider_fn<F, Fut, T>(create: F) -> FnProvider<F>
where
    F: Fn(FixtureContext, ResourceKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HarnessResult<Provisioned<T>>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    FnProvider(create)
}

impl<F, Fut, T> FixtureProvider for FnProvider<F>
where
    F: Fn(FixtureContext, ResourceKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HarnessResult<Provisioned<T>>> + Send + 'static,
    T: Clone + Send + Sync + 'static,
{
    type Fixture = T;

    fn create(
        &self,
        ctx: FixtureContext,
        key: ResourceKey,
    ) -> impl Future<Output = HarnessResult<Provisioned<T>>> + Send {
        (self.0)(ctx, key)
    }
}

/// Handle given to providers for resolving their dependencies.
#[derive(Clone)]
pub struct FixtureContext {
    cache: ResourceCache,
    chain: Arc<Vec<ResourceKey>>,
}

impl FixtureContext {
    pub(crate) fn new(cache: ResourceCache, chain: Arc<Vec<ResourceKey>>) -> Self {
        Self { cache, chain }
    }

    /// Resolve a dependency.
    pub async fn get<T>(&self, key: &ResourceKey) -> HarnessResult<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.cache.resolve(key, &self.chain).await
    }

    /// Keys currently being resolved, outermost first.
    pub fn chain(&self) -> &[ResourceKey] {
        &self.chain
    }

    /// The cache this context resolves against.
    ///
    /// Lookups made through it on the provider's task still see the
    /// resolution chain, so cycles fail rather than wait forever.
    pub fn cache(&self) -> &ResourceCache {
        &self.cache
    }
}

pub(crate) type CreateFuture =
    Pin<Box<dyn Future<Output = HarnessResult<(StoredFixture, Vec<RecycleAction>)>> + Send>>;

/// Object-safe view of a [`FixtureProvider`].
pub(crate) trait ErasedProvider: Send + Sync {
    fn create(&self, ctx: FixtureContext, key: ResourceKey) -> CreateFuture;
    fn fixture_type_id(&self) -> TypeId;
    fn fixture_type_name(&self) -> &'static str;
}

pub(crate) struct Erased<P>(pub(crate) Arc<P>);

impl<P: FixtureProvider> ErasedProvider for Erased<P> {
    fn create(&self, ctx: FixtureContext, key: ResourceKey) -> CreateFuture {
        let provider = Arc::clone(&self.0);
        Box::pin(async move {
            let provisioned = provider.create(ctx, key).await?;
            Ok((StoredFixture::new(provisioned.value), provisioned.recycle))
        })
    }

    fn fixture_type_id(&self) -> TypeId {
        TypeId::of::<P::Fixture>()
    }

    fn fixture_type_name(&self) -> &'static str {
        type_name::<P::Fixture>()
    }
}
