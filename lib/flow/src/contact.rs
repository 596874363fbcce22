//! Contacts and per-workspace sending settings.

use crate::error::StoreError;
use async_trait::async_trait;
use encore_core::{FanId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// A contact of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fan {
    pub id: FanId,
    pub workspace_id: WorkspaceId,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// Marketing email and audience sync require this consent.
    pub email_marketing_opt_in: bool,
}

/// How a workspace's email is addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderProfile {
    pub from_address: String,
    pub from_name: Option<String>,
    /// Base of the per-fan unsubscribe link added to marketing email.
    pub unsubscribe_base_url: String,
}

impl SenderProfile {
    /// Formats the `From` header value.
    #[must_use]
    pub fn from_header(&self) -> String {
        match &self.from_name {
            Some(name) if !name.is_empty() => format!("{name} <{}>", self.from_address),
            _ => self.from_address.clone(),
        }
    }

    /// Returns the unsubscribe link for a fan.
    #[must_use]
    pub fn unsubscribe_url(&self, fan_id: FanId) -> String {
        format!(
            "{}/{fan_id}",
            self.unsubscribe_base_url.trim_end_matches('/')
        )
    }
}

/// A workspace's connected Mailchimp account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceAccount {
    pub api_key: String,
    /// Data-center prefix, e.g. `us21`.
    pub server_prefix: String,
}

impl std::fmt::Debug for AudienceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudienceAccount")
            .field("api_key", &"[redacted]")
            .field("server_prefix", &self.server_prefix)
            .finish()
    }
}

/// Read access to contacts and sending settings.
#[async_trait]
pub trait ContactStore: Send + Sync {
    /// Loads a fan.
    async fn get_fan(&self, fan_id: FanId) -> Result<Option<Fan>, StoreError>;

    /// Loads the workspace's sender profile.
    async fn sender_profile(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<SenderProfile>, StoreError>;

    /// Loads the workspace's connected Mailchimp account, if any.
    async fn audience_account(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<AudienceAccount>, StoreError>;
}
