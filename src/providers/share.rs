//! Shares and personal shares.

use super::models::{PersonalShare, Share, ShareGroup, Token};
use super::{require_success, token_key};
use crate::cache::{FixtureContext, FixtureProvider, Provisioned, RecycleAction, ResourceKey};
use crate::config::HarnessConfig;
use crate::dispatcher::Dispatcher;
use crate::error::HarnessResult;
use crate::request::RequestSpec;
use crate::response::status;
use log::debug;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

/// Action that deletes a share with its owner's token. A share that is
/// already gone counts as deleted.
fn delete_share(dispatcher: Dispatcher, url: String, owner: &Token) -> RecycleAction {
    let spec = RequestSpec::delete(url.as_str()).with_bearer(&owner.access_token);
    RecycleAction::new(format!("delete share {}", url), move || async move {
        let pending = dispatcher.send(&spec).await?;
        if pending.status() != status::NOT_FOUND {
            pending.ensure_success()?;
        }
        Ok(())
    })
}

/// Creates a share named after the key, owned by one account.
#[derive(Clone)]
pub struct ShareProvider {
    dispatcher: Dispatcher,
    config: Arc<HarnessConfig>,
    owner: String,
}

impl ShareProvider {
    pub fn new(dispatcher: Dispatcher, config: Arc<HarnessConfig>) -> Self {
        Self {
            dispatcher,
            config,
            owner: "admin".to_string(),
        }
    }

    /// Use the token of other credentials as the owner.
    pub fn owned_by(mut self, credentials: impl Into<String>) -> Self {
        self.owner = credentials.into();
        self
    }
}

impl FixtureProvider for ShareProvider {
    type Fixture = ShareGroup;

    fn create(
        &self,
        ctx: FixtureContext,
        key: ResourceKey,
    ) -> impl Future<Output = HarnessResult<Provisioned<ShareGroup>>> + Send {
        let provider = self.clone();
        async move {
            let owner: Token = ctx.get(&token_key(&provider.owner)).await?;
            let dispatcher = provider.dispatcher.session();
            let endpoint = &provider.config.endpoints.shares;

            let create = RequestSpec::post(endpoint.as_str())
                .json(&json!({
                    "name": key.name(),
                    "recipients": [],
                    "sendEmail": false,
                }))?
                .with_bearer(&owner.access_token);
            let share: Share = require_success(&key, dispatcher.send(&create).await?)?.take()?;
            debug!("Created share '{}' with id {}", key.name(), share.id);

            let cleanup = delete_share(dispatcher, format!("{}/{}", endpoint, share.id), &owner);
            Ok(Provisioned::new(ShareGroup { share, owner }).recycle_with(cleanup))
        }
    }
}

/// Creates a personal share from one account to another.
#[derive(Clone)]
pub struct PersonalShareProvider {
    dispatcher: Dispatcher,
    config: Arc<HarnessConfig>,
    owner: String,
    recipient: String,
}

impl PersonalShareProvider {
    pub fn new(dispatcher: Dispatcher, config: Arc<HarnessConfig>) -> Self {
        Self {
            dispatcher,
            config,
            owner: "admin".to_string(),
            recipient: "basic".to_string(),
        }
    }

    /// Choose the credentials of both sides.
    pub fn between(mut self, owner: impl Into<String>, recipient: impl Into<String>) -> Self {
        self.owner = owner.into();
        self.recipient = recipient.into();
        self
    }
}

impl FixtureProvider for PersonalShareProvider {
    type Fixture = PersonalShare;

    fn create(
        &self,
        ctx: FixtureContext,
        key: ResourceKey,
    ) -> impl Future<Output = HarnessResult<Provisioned<PersonalShare>>> + Send {
        let provider = self.clone();
        async move {
            let owner: Token = ctx.get(&token_key(&provider.owner)).await?;
            let recipient: Token = ctx.get(&token_key(&provider.recipient)).await?;
            let dispatcher = provider.dispatcher.session();
            let endpoints = &provider.config.endpoints;

            let create = RequestSpec::post(endpoints.personal_shares.as_str())
                .json(&json!({
                    "name": key.name(),
                    "recipientEmail": recipient.user.email,
                }))?
                .with_bearer(&owner.access_token);
            let share: Share = require_success(&key, dispatcher.send(&create).await?)?.take()?;
            debug!(
                "Created personal share '{}' from {} to {}",
                key.name(),
                owner.user.email,
                recipient.user.email
            );

            let cleanup = delete_share(dispatcher, format!("{}/{}", endpoints.shares, share.id), &owner);
            Ok(Provisioned::new(PersonalShare {
                share,
                owner,
                recipient,
            })
            .recycle_with(cleanup))
        }
    }
}
