//! External side-effect providers.
//!
//! The engine talks to the outside world only through these traits. HTTP
//! implementations live in `encore-integration`; tests use in-memory fakes.

use crate::contact::AudienceAccount;
use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A rendered email ready to hand to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html_body: String,
    /// Set for marketing email.
    pub list_unsubscribe_url: Option<String>,
}

/// Acknowledgement of an accepted email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub message_id: String,
}

/// Email transport.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError>;
}

/// The kind of trackable asset an email can link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetKind {
    Link,
    Funnel,
    PressKit,
    LandingPage,
}

impl AssetKind {
    /// Returns the name used in asset references and tracked URLs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Link => "link",
            Self::Funnel => "funnel",
            Self::PressKit => "presskit",
            Self::LandingPage => "landing",
        }
    }

    /// Parses a reference name.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "link" => Some(Self::Link),
            "funnel" => Some(Self::Funnel),
            "presskit" => Some(Self::PressKit),
            "landing" => Some(Self::LandingPage),
            _ => None,
        }
    }
}

/// An asset referenced from email markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub kind: AssetKind,
    pub id: String,
    /// Where the tracked link ultimately redirects.
    pub url: String,
    /// The literal reference in the markup, e.g. `{{link:abc}}`.
    pub placeholder: String,
}

/// Looks up the assets referenced by email markup.
#[async_trait]
pub trait AssetResolver: Send + Sync {
    /// Returns the referenced assets that exist. Unknown references are omitted.
    async fn resolve(&self, markup: &str) -> Result<Vec<Asset>, ProviderError>;
}

/// A contact to add to an external audience.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudienceContact {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// External audience (mailing list) membership.
#[async_trait]
pub trait AudienceSync: Send + Sync {
    /// Adds a contact to a list. Adding an existing member succeeds.
    async fn add_contact(
        &self,
        account: &AudienceAccount,
        list_id: &str,
        contact: &AudienceContact,
    ) -> Result<(), ProviderError>;
}
