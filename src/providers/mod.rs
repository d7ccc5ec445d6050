//! Fixture providers for the service under test.
//!
//! Each provider handles one key category and creates its fixture by calling
//! the service through a [`Dispatcher`]. Dependencies are resolved through the
//! cache, so a share pulls in its owner's token on demand.
//!
//! | Category          | Fixture                     | Key name                 |
//! |-------------------|-----------------------------|--------------------------|
//! | `token`           | [`Token`]                   | credentials name         |
//! | `share`           | [`ShareGroup`]              | share name               |
//! | `personal-share`  | [`PersonalShare`]           | share name               |
//! | `org`             | [`BlacklistedOrganization`] | organization name        |
//!
//! All of them are registered at once with [`register_defaults`].

pub mod models;
pub mod organization;
pub mod share;
pub mod token;

pub use models::{
    BlacklistRequest, BlacklistedOrganization, PersonalShare, Recipient, Share, ShareGroup, Token,
    User,
};
pub use organization::BlacklistProvider;
pub use share::{PersonalShareProvider, ShareProvider};
pub use token::{TokenProvider, client_authorization};

use crate::cache::{ResourceCache, ResourceKey};
use crate::config::HarnessConfig;
use crate::dispatcher::{Dispatcher, PendingResponse};
use crate::error::{HarnessError, HarnessResult};
use std::sync::Arc;

/// Category of [`Token`] fixtures.
pub const TOKEN: &str = "token";
/// Category of [`ShareGroup`] fixtures.
pub const SHARE: &str = "share";
/// Category of [`PersonalShare`] fixtures.
pub const PERSONAL_SHARE: &str = "personal-share";
/// Category of [`BlacklistedOrganization`] fixtures.
pub const ORGANIZATION: &str = "org";

/// Register every bundled provider on `cache`.
///
/// Shares and blacklist entries are created with the `admin` credentials;
/// personal shares go from `admin` to `basic`.
pub fn register_defaults(cache: &ResourceCache, dispatcher: &Dispatcher, config: Arc<HarnessConfig>) {
    cache
        .register(TOKEN, TokenProvider::new(dispatcher.clone(), Arc::clone(&config)))
        .register(SHARE, ShareProvider::new(dispatcher.clone(), Arc::clone(&config)))
        .register(
            PERSONAL_SHARE,
            PersonalShareProvider::new(dispatcher.clone(), Arc::clone(&config)),
        )
        .register(ORGANIZATION, BlacklistProvider::new(dispatcher.clone(), config));
}

/// Key of the token for the named credentials.
pub fn token_key(credentials: &str) -> ResourceKey {
    ResourceKey::new(TOKEN, credentials)
}

/// Turn a non-2xx answer into a creation failure of `key`.
pub(crate) fn require_success(key: &ResourceKey, pending: PendingResponse) -> HarnessResult<PendingResponse> {
    let response = pending.response();
    if response.is_success() {
        return Ok(pending);
    }
    Err(HarnessError::creation(
        key,
        format!(
            "{} {} returned {} {}: {}",
            response.method(),
            response.url(),
            response.status(),
            response.reason_phrase(),
            crate::verify::truncate(&response.content(), 200)
        ),
    ))
}
