//! Fixture types handed to tests by the bundled providers.

use crate::config::Endpoints;
use crate::dispatcher::Dispatcher;
use crate::error::HarnessResult;
use crate::request::RequestSpec;
use serde::{Deserialize, Serialize};

/// Identity a token was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
}

/// Access token for one configured account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: Option<u64>,
    pub user: User,
}

impl Token {
    /// `Authorization` header value for this token.
    pub fn bearer(&self) -> String {
        crate::request::bearer(&self.access_token)
    }
}

/// Recipient of a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_who_added_recipient: Option<String>,
    #[serde(default)]
    pub send_email: bool,
}

impl Recipient {
    pub fn new(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            user_who_added_recipient: None,
            send_email: false,
        }
    }
}

/// A share as returned by the share service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
}

/// A share together with the token of the account that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareGroup {
    pub share: Share,
    pub owner: Token,
}

impl ShareGroup {
    /// Fetch the current state of the share from the service.
    pub async fn fetch(&self, dispatcher: &Dispatcher, endpoints: &Endpoints) -> HarnessResult<Share> {
        let spec = RequestSpec::get(format!("{}/{}", endpoints.shares, self.share.id))
            .with_bearer(&self.owner.access_token);
        dispatcher.send(&spec).await?.ensure_success()?.take()
    }
}

/// A personal share between two configured accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonalShare {
    pub share: Share,
    pub owner: Token,
    pub recipient: Token,
}

/// Body of the blacklist endpoint. `is_delete` removes the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistRequest {
    pub organization_name: String,
    pub is_delete: bool,
}

/// An organization on the admin blacklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlacklistedOrganization {
    pub organization: String,
}
