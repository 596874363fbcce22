//! Mailchimp audience membership.
//!
//! Contacts are added with `POST /3.0/lists/{list_id}/members` on the
//! account's data center. Mailchimp answers `400 Member Exists` for an
//! address already on the list, which counts as success.

use crate::error::{ClientError, http_client, transport_error};
use async_trait::async_trait;
use encore_flow::ProviderError;
use encore_flow::contact::AudienceAccount;
use encore_flow::provider::{AudienceContact, AudienceSync};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Mailchimp API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailchimpConfig {
    /// Overrides the per-account `https://{server_prefix}.api.mailchimp.com`.
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for MailchimpConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
struct MemberRequest<'a> {
    email_address: &'a str,
    status: &'static str,
    merge_fields: MergeFields<'a>,
}

#[derive(Debug, Serialize)]
struct MergeFields<'a> {
    #[serde(rename = "FNAME", skip_serializing_if = "Option::is_none")]
    first_name: Option<&'a str>,
    #[serde(rename = "LNAME", skip_serializing_if = "Option::is_none")]
    last_name: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ProblemResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    detail: String,
}

fn member_request(contact: &AudienceContact) -> MemberRequest<'_> {
    MemberRequest {
        email_address: &contact.email,
        status: "subscribed",
        merge_fields: MergeFields {
            first_name: contact.first_name.as_deref(),
            last_name: contact.last_name.as_deref(),
        },
    }
}

fn interpret(status: u16, body: &str) -> Result<(), ProviderError> {
    if (200..300).contains(&status) {
        return Ok(());
    }
    let problem: ProblemResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse {
            message: e.to_string(),
        })?;
    if status == 400 && problem.title == "Member Exists" {
        return Ok(());
    }
    let message = if problem.detail.is_empty() {
        problem.title
    } else {
        format!("{}: {}", problem.title, problem.detail)
    };
    Err(ProviderError::Rejected { status, message })
}

/// [`AudienceSync`] backed by the Mailchimp Marketing API.
#[derive(Clone)]
pub struct MailchimpAudienceSync {
    client: reqwest::Client,
    api_base_url: Option<String>,
}

impl MailchimpAudienceSync {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &MailchimpConfig) -> Result<Self, ClientError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_base_url: config
                .api_base_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    fn members_url(&self, account: &AudienceAccount, list_id: &str) -> String {
        let base = match &self.api_base_url {
            Some(base) => base.clone(),
            None => format!("https://{}.api.mailchimp.com", account.server_prefix),
        };
        format!("{base}/3.0/lists/{list_id}/members")
    }
}

#[async_trait]
impl AudienceSync for MailchimpAudienceSync {
    #[instrument(skip(self, account, contact))]
    async fn add_contact(
        &self,
        account: &AudienceAccount,
        list_id: &str,
        contact: &AudienceContact,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .post(self.members_url(account, list_id))
            .basic_auth("anystring", Some(&account.api_key))
            .json(&member_request(contact))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| transport_error(&e))?;
        interpret(status, &body)?;
        debug!(status, "contact added to audience");
        Ok(())
    }
}
