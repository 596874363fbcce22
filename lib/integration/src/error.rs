//! Error types for the integration crate.
//!
//! - `ClientError`: a provider client could not be constructed
//!
//! Request failures are reported as `encore_flow::ProviderError` so the
//! engine can record them on the failing attempt.

use encore_flow::ProviderError;
use std::fmt;

/// Errors building a provider client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A required setting is absent.
    NotConfigured { setting: &'static str },
    /// The HTTP client could not be built.
    Build { reason: String },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured { setting } => write!(f, "missing setting: {setting}"),
            Self::Build { reason } => write!(f, "failed to build HTTP client: {reason}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Maps a failed request to a provider error.
pub(crate) fn transport_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Transport {
            message: "request timed out".to_string(),
        }
    } else {
        ProviderError::Transport {
            message: e.to_string(),
        }
    }
}

/// Builds an HTTP client with a request timeout.
pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ClientError::Build {
            reason: e.to_string(),
        })
}
