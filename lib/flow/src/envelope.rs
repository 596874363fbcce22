//! Versioned envelope for messages on the trigger bus.
//!
//! Every trigger event is published as `{"version": N, "payload": {...}}` so
//! producers and workers can be upgraded independently. A worker rejects
//! envelopes from a newer version instead of guessing at their payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The envelope version this build writes.
pub const CURRENT_VERSION: u32 = 1;

/// A versioned wrapper around a serialized payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u32,
    pub payload: T,
}

/// Errors decoding an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The bytes are not an envelope, or the payload has the wrong shape.
    Malformed { message: String },
    /// The envelope was written by a newer producer.
    UnsupportedVersion { version: u32 },
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { message } => write!(f, "malformed envelope: {message}"),
            Self::UnsupportedVersion { version } => write!(
                f,
                "unsupported envelope version {version} (current is {CURRENT_VERSION})"
            ),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl<T> Envelope<T> {
    #[must_use]
    pub fn new(payload: T) -> Self {
        Self {
            version: CURRENT_VERSION,
            payload,
        }
    }

    #[must_use]
    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Serialize> Envelope<T> {
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Malformed {
            message: e.to_string(),
        })
    }
}

/// The version header alone, read before committing to a payload type.
#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decodes an envelope, checking its version before the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not an envelope, the version is newer
    /// than [`CURRENT_VERSION`], or the payload does not decode as `T`.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let header: VersionHeader =
            serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed {
                message: e.to_string(),
            })?;
        if header.version > CURRENT_VERSION {
            return Err(EnvelopeError::UnsupportedVersion {
                version: header.version,
            });
        }
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerEvent;
    use encore_core::{FanId, WorkspaceId};

    #[test]
    fn trigger_event_json_shape() {
        let workspace_id = WorkspaceId::new();
        let fan_id = FanId::new();
        let envelope = Envelope::new(TriggerEvent::NewFan {
            workspace_id,
            fan_id,
        });
        let json: serde_json::Value =
            serde_json::from_slice(&envelope.to_json_bytes().unwrap()).unwrap();

        assert_eq!(json["version"], CURRENT_VERSION);
        assert_eq!(json["payload"]["type"], "newFan");
        assert_eq!(json["payload"]["fanId"], fan_id.as_ulid().to_string());
    }

    #[test]
    fn decodes_producer_json() {
        let workspace_id = WorkspaceId::new();
        let fan_id = FanId::new();
        let bytes = format!(
            r#"{{"version":1,"payload":{{"type":"newFan","workspaceId":"{}","fanId":"{}"}}}}"#,
            workspace_id.as_ulid(),
            fan_id.as_ulid()
        );
        let envelope = Envelope::<TriggerEvent>::from_json_bytes(bytes.as_bytes()).unwrap();
        assert_eq!(
            envelope.into_payload(),
            TriggerEvent::NewFan {
                workspace_id,
                fan_id
            }
        );
    }

    #[test]
    fn newer_version_is_rejected() {
        let bytes = br#"{"version":2,"payload":{"type":"somethingNew"}}"#;
        assert_eq!(
            Envelope::<TriggerEvent>::from_json_bytes(bytes).unwrap_err(),
            EnvelopeError::UnsupportedVersion { version: 2 }
        );
    }

    #[test]
    fn unknown_payload_is_malformed() {
        let bytes = br#"{"version":1,"payload":{"type":"newInvoice"}}"#;
        assert!(matches!(
            Envelope::<TriggerEvent>::from_json_bytes(bytes),
            Err(EnvelopeError::Malformed { .. })
        ));
        assert!(matches!(
            Envelope::<TriggerEvent>::from_json_bytes(b"not json"),
            Err(EnvelopeError::Malformed { .. })
        ));
    }
}
