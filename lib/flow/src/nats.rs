//! Trigger intake over NATS JetStream.
//!
//! Trigger events are published to `encore.trigger.<kind>` wrapped in an
//! [`Envelope`]. A work-queue stream holds them until a worker acknowledges
//! them, so every event is delivered at least once. Workers share one durable
//! pull consumer; each message goes to a single worker.

use crate::envelope::{Envelope, EnvelopeError};
use crate::trigger::TriggerEvent;
use async_nats::jetstream;
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Subject prefix for trigger events.
pub const TRIGGER_SUBJECT_PREFIX: &str = "encore.trigger";

const TRIGGER_STREAM_NAME: &str = "ENCORE_TRIGGERS";

const CONSUMER_NAME: &str = "encore-worker";

/// Connection settings for the trigger bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    /// Stream name (defaults to `ENCORE_TRIGGERS`).
    #[serde(default)]
    pub stream_name: Option<String>,
    /// Durable consumer name (defaults to `encore-worker`).
    #[serde(default)]
    pub consumer_name: Option<String>,
    /// How long a delivered event may stay unacknowledged before redelivery.
    #[serde(default = "default_ack_wait_secs")]
    pub ack_wait_secs: u64,
}

fn default_ack_wait_secs() -> u64 {
    60
}

impl NatsConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream_name: None,
            consumer_name: None,
            ack_wait_secs: default_ack_wait_secs(),
        }
    }

    fn stream(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(TRIGGER_STREAM_NAME)
    }

    fn consumer(&self) -> &str {
        self.consumer_name.as_deref().unwrap_or(CONSUMER_NAME)
    }
}

/// Errors talking to the trigger bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Connecting or creating the stream or consumer failed.
    Setup { message: String },
    /// The event could not be published.
    Publish { message: String },
    /// Reading from the consumer failed.
    Receive { message: String },
    /// An acknowledgement could not be sent.
    Ack { message: String },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Setup { message } => write!(f, "trigger bus setup failed: {message}"),
            Self::Publish { message } => write!(f, "failed to publish trigger: {message}"),
            Self::Receive { message } => write!(f, "failed to receive trigger: {message}"),
            Self::Ack { message } => write!(f, "failed to acknowledge trigger: {message}"),
        }
    }
}

impl std::error::Error for BusError {}

/// Returns the subject an event is published on.
#[must_use]
pub fn trigger_subject(event: &TriggerEvent) -> String {
    format!("{TRIGGER_SUBJECT_PREFIX}.{}", event.subject_suffix())
}

/// The JetStream trigger stream.
#[derive(Clone)]
pub struct NatsTriggerBus {
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsTriggerBus {
    /// Connects and ensures the trigger stream exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn connect(config: NatsConfig) -> Result<Self, BusError> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| BusError::Setup {
                message: e.to_string(),
            })?;
        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream().to_string(),
            subjects: vec![format!("{TRIGGER_SUBJECT_PREFIX}.>")],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| BusError::Setup {
                message: format!("failed to create trigger stream: {e}"),
            })?;
        info!(stream = config.stream(), "trigger stream ready");

        Ok(Self { jetstream, config })
    }

    /// Publishes an event and waits for the stream to store it.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized or stored.
    pub async fn publish(&self, event: &TriggerEvent) -> Result<(), BusError> {
        let bytes = Envelope::new(event)
            .to_json_bytes()
            .map_err(|e| BusError::Publish {
                message: e.to_string(),
            })?;

        self.jetstream
            .publish(trigger_subject(event), bytes.into())
            .await
            .map_err(|e| BusError::Publish {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| BusError::Publish {
                message: e.to_string(),
            })?;

        debug!(kind = %event.kind(), "trigger published");
        Ok(())
    }

    /// Attaches to the shared durable consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be created or read.
    pub async fn subscribe(&self) -> Result<TriggerSubscription, BusError> {
        let stream = self
            .jetstream
            .get_stream(self.config.stream())
            .await
            .map_err(|e| BusError::Setup {
                message: format!("failed to get trigger stream: {e}"),
            })?;

        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(self.config.consumer().to_string()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            ack_wait: Duration::from_secs(self.config.ack_wait_secs),
            ..Default::default()
        };
        let consumer = stream
            .get_or_create_consumer(self.config.consumer(), consumer_config)
            .await
            .map_err(|e| BusError::Setup {
                message: format!("failed to create consumer: {e}"),
            })?;

        let messages = consumer.messages().await.map_err(|e| BusError::Receive {
            message: e.to_string(),
        })?;
        info!(consumer = self.config.consumer(), "subscribed to triggers");

        Ok(TriggerSubscription { messages })
    }
}

/// A stream of trigger deliveries from the durable consumer.
pub struct TriggerSubscription {
    messages: jetstream::consumer::pull::Stream,
}

impl TriggerSubscription {
    /// Waits for the next delivery. Returns `None` when the stream closes.
    pub async fn next(&mut self) -> Option<Result<TriggerDelivery, BusError>> {
        let message = match self.messages.next().await? {
            Ok(message) => message,
            Err(e) => {
                return Some(Err(BusError::Receive {
                    message: e.to_string(),
                }));
            }
        };
        let event = Envelope::<TriggerEvent>::from_json_bytes(&message.payload)
            .map(Envelope::into_payload);
        Some(Ok(TriggerDelivery { message, event }))
    }
}

/// One delivered trigger message, acknowledged once handled.
pub struct TriggerDelivery {
    message: jetstream::Message,
    /// The decoded event, or why the message could not be decoded.
    pub event: Result<TriggerEvent, EnvelopeError>,
}

impl TriggerDelivery {
    /// Marks the event handled; it will not be delivered again.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgement cannot be sent.
    pub async fn ack(&self) -> Result<(), BusError> {
        self.message.ack().await.map_err(|e| BusError::Ack {
            message: e.to_string(),
        })
    }

    /// Requests redelivery after `delay`.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgement cannot be sent.
    pub async fn nak(&self, delay: Duration) -> Result<(), BusError> {
        self.message
            .ack_with(AckKind::Nak(Some(delay)))
            .await
            .map_err(|e| BusError::Ack {
                message: e.to_string(),
            })
    }

    /// Drops a message that can never be handled.
    ///
    /// # Errors
    ///
    /// Returns an error if the acknowledgement cannot be sent.
    pub async fn term(&self) -> Result<(), BusError> {
        self.message
            .ack_with(AckKind::Term)
            .await
            .map_err(|e| BusError::Ack {
                message: e.to_string(),
            })
    }
}
