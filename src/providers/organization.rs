//! Organizations on the admin blacklist.
//!
//! `org:acme` adds `acme` to the blacklist with the admin token; recycling
//! the key posts the same organization with `isDelete` set.

use super::models::{BlacklistRequest, BlacklistedOrganization, Token};
use super::{require_success, token_key};
use crate::cache::{FixtureContext, FixtureProvider, Provisioned, RecycleAction, ResourceKey};
use crate::config::HarnessConfig;
use crate::dispatcher::Dispatcher;
use crate::error::HarnessResult;
use crate::request::RequestSpec;
use log::info;
use std::future::Future;
use std::sync::Arc;

#[derive(Clone)]
pub struct BlacklistProvider {
    dispatcher: Dispatcher,
    config: Arc<HarnessConfig>,
    admin: String,
}

impl BlacklistProvider {
    pub fn new(dispatcher: Dispatcher, config: Arc<HarnessConfig>) -> Self {
        Self {
            dispatcher,
            config,
            admin: "admin".to_string(),
        }
    }

    /// Use other credentials to manage the blacklist.
    pub fn managed_by(mut self, credentials: impl Into<String>) -> Self {
        self.admin = credentials.into();
        self
    }

    fn request(&self, token: &Token, organization: &str, is_delete: bool) -> HarnessResult<RequestSpec> {
        Ok(RequestSpec::post(self.config.endpoints.blacklist.as_str())
            .json(&BlacklistRequest {
                organization_name: organization.to_string(),
                is_delete,
            })?
            .with_bearer(&token.access_token))
    }
}

impl FixtureProvider for BlacklistProvider {
    type Fixture = BlacklistedOrganization;

    fn create(
        &self,
        ctx: FixtureContext,
        key: ResourceKey,
    ) -> impl Future<Output = HarnessResult<Provisioned<BlacklistedOrganization>>> + Send {
        let provider = self.clone();
        async move {
            let token: Token = ctx.get(&token_key(&provider.admin)).await?;
            let dispatcher = provider.dispatcher.session();

            let add = provider.request(&token, key.name(), false)?;
            let organization: BlacklistedOrganization =
                require_success(&key, dispatcher.send(&add).await?)?.take()?;
            info!("Blacklisted organization '{}'", organization.organization);

            let remove = provider.request(&token, key.name(), true)?;
            let cleanup = RecycleAction::new(
                format!("remove '{}' from blacklist", key.name()),
                move || async move {
                    dispatcher.send(&remove).await?.ensure_success()?;
                    Ok(())
                },
            );
            Ok(Provisioned::new(organization).recycle_with(cleanup))
        }
    }
}
