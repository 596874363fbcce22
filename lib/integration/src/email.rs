//! Transactional email over a Postmark-style HTTP API.
//!
//! One `POST {api_url}/email` per message, authenticated with the
//! `X-Postmark-Server-Token` header. Marketing email carries a
//! `List-Unsubscribe` header.

use crate::error::{ClientError, http_client, transport_error};
use async_trait::async_trait;
use encore_flow::ProviderError;
use encore_flow::provider::{EmailSender, OutboundEmail, SendReceipt};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

const TOKEN_HEADER: &str = "X-Postmark-Server-Token";

/// Email API settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub server_token: Option<String>,
    /// Message stream for flow email.
    #[serde(default = "default_message_stream")]
    pub message_stream: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_url() -> String {
    "https://api.postmarkapp.com".to_string()
}

fn default_message_stream() -> String {
    "broadcast".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            server_token: None,
            message_stream: default_message_stream(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MessageRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    message_stream: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct MessageHeader {
    name: &'static str,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MessageResponse {
    #[serde(rename = "MessageID")]
    message_id: Option<String>,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: String,
}

fn message_request<'a>(email: &'a OutboundEmail, message_stream: &'a str) -> MessageRequest<'a> {
    let headers = email
        .list_unsubscribe_url
        .iter()
        .map(|url| MessageHeader {
            name: "List-Unsubscribe",
            value: format!("<{url}>"),
        })
        .collect();
    MessageRequest {
        from: &email.from,
        to: &email.to,
        subject: &email.subject,
        html_body: &email.html_body,
        message_stream,
        headers,
    }
}

fn receipt(status: u16, body: &str) -> Result<SendReceipt, ProviderError> {
    let response: MessageResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse {
            message: e.to_string(),
        })?;
    if !(200..300).contains(&status) || response.error_code != 0 {
        return Err(ProviderError::Rejected {
            status,
            message: response.message,
        });
    }
    response
        .message_id
        .map(|message_id| SendReceipt { message_id })
        .ok_or_else(|| ProviderError::InvalidResponse {
            message: "response has no MessageID".to_string(),
        })
}

/// [`EmailSender`] backed by the HTTP email API.
#[derive(Clone)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    server_token: String,
    message_stream: String,
}

impl HttpEmailSender {
    /// # Errors
    ///
    /// Returns an error if no server token is configured or the HTTP client
    /// cannot be built.
    pub fn new(config: &EmailConfig) -> Result<Self, ClientError> {
        let server_token = config
            .server_token
            .clone()
            .ok_or(ClientError::NotConfigured {
                setting: "email.server_token",
            })?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: format!("{}/email", config.api_url.trim_end_matches('/')),
            server_token,
            message_stream: config.message_stream.clone(),
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    #[instrument(skip_all)]
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(TOKEN_HEADER, &self.server_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&message_request(email, &self.message_stream))
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| transport_error(&e))?;
        match receipt(status, &body) {
            Ok(receipt) => {
                debug!(message_id = %receipt.message_id, "email accepted");
                Ok(receipt)
            }
            Err(error) => {
                warn!(status, %error, "email rejected");
                Err(error)
            }
        }
    }
}
