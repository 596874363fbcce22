//! Trigger types for flow initiation.
//!
//! Every flow has exactly one trigger node. The trigger decides which
//! events start a run of the flow; the event itself carries the recipient
//! the run executes for.

use crate::node::NodeId;
use encore_core::{CartFunnelId, CartId, FanId, FlowId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// The kind of event a trigger listens for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerKind {
    /// Started explicitly by a caller.
    CallFlow,
    /// Fires once per new fan in the workspace.
    NewFan,
    /// Fires once per qualifying completed order through a cart funnel.
    NewCartOrder,
}

impl TriggerKind {
    /// Returns the wire name of the trigger kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallFlow => "callFlow",
            Self::NewFan => "newFan",
            Self::NewCartOrder => "newCartOrder",
        }
    }

    /// Parses a wire name, returning `None` for unknown kinds.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "callFlow" => Some(Self::CallFlow),
            "newFan" => Some(Self::NewFan),
            "newCartOrder" => Some(Self::NewCartOrder),
            _ => None,
        }
    }

    /// Whether a completed run for a recipient blocks further runs.
    #[must_use]
    pub fn deduplicates(&self) -> bool {
        matches!(self, Self::NewFan | Self::NewCartOrder)
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific trigger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TriggerConfig {
    CallFlow,
    NewFan,
    NewCartOrder { cart_funnel_id: CartFunnelId },
}

impl TriggerConfig {
    /// Returns the kind of this configuration.
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::CallFlow => TriggerKind::CallFlow,
            Self::NewFan => TriggerKind::NewFan,
            Self::NewCartOrder { .. } => TriggerKind::NewCartOrder,
        }
    }
}

/// The trigger node of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Node id, stable for the lifetime of the flow.
    pub id: NodeId,
    /// A disabled trigger starts no new runs.
    pub enabled: bool,
    #[serde(flatten)]
    pub config: TriggerConfig,
}

impl Trigger {
    /// Creates a new enabled trigger.
    #[must_use]
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            id: NodeId::new(),
            enabled: true,
            config,
        }
    }

    /// Returns the trigger's kind.
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        self.config.kind()
    }

    /// Whether this trigger starts a run for the given event.
    #[must_use]
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match (&self.config, event) {
            (TriggerConfig::CallFlow, TriggerEvent::CallFlow { .. }) => true,
            (TriggerConfig::NewFan, TriggerEvent::NewFan { .. }) => true,
            (
                TriggerConfig::NewCartOrder { cart_funnel_id },
                TriggerEvent::NewCartOrder {
                    cart_funnel_id: event_funnel,
                    ..
                },
            ) => cart_funnel_id == event_funnel,
            _ => false,
        }
    }
}

/// Who a run executes for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    #[serde(default)]
    pub fan_id: Option<FanId>,
    #[serde(default)]
    pub cart_id: Option<CartId>,
}

impl Recipient {
    /// A recipient identified by a fan.
    #[must_use]
    pub fn fan(fan_id: FanId) -> Self {
        Self {
            fan_id: Some(fan_id),
            cart_id: None,
        }
    }

    /// A recipient identified by an order, optionally linked to a fan.
    #[must_use]
    pub fn cart(cart_id: CartId, fan_id: Option<FanId>) -> Self {
        Self {
            fan_id,
            cart_id: Some(cart_id),
        }
    }

    /// The key runs are deduplicated on.
    ///
    /// An order-scoped run is keyed by its cart so that a fan with two
    /// orders gets one run per order.
    #[must_use]
    pub fn dedup_key(&self) -> Option<RecipientKey> {
        match (self.cart_id, self.fan_id) {
            (Some(cart_id), _) => Some(RecipientKey::Cart(cart_id)),
            (None, Some(fan_id)) => Some(RecipientKey::Fan(fan_id)),
            (None, None) => None,
        }
    }
}

/// Identity of a recipient for run lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientKey {
    Fan(FanId),
    Cart(CartId),
}

/// An event that may start runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TriggerEvent {
    /// Explicitly start one flow for a recipient.
    CallFlow {
        flow_id: FlowId,
        #[serde(flatten)]
        recipient: Recipient,
    },
    /// A fan joined the workspace.
    NewFan {
        workspace_id: WorkspaceId,
        fan_id: FanId,
    },
    /// An order completed through a cart funnel.
    NewCartOrder {
        workspace_id: WorkspaceId,
        cart_id: CartId,
        #[serde(default)]
        fan_id: Option<FanId>,
        cart_funnel_id: CartFunnelId,
    },
}

impl TriggerEvent {
    /// Returns the trigger kind this event is addressed to.
    #[must_use]
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::CallFlow { .. } => TriggerKind::CallFlow,
            Self::NewFan { .. } => TriggerKind::NewFan,
            Self::NewCartOrder { .. } => TriggerKind::NewCartOrder,
        }
    }

    /// Returns the recipient runs started by this event execute for.
    #[must_use]
    pub fn recipient(&self) -> Recipient {
        match self {
            Self::CallFlow { recipient, .. } => *recipient,
            Self::NewFan { fan_id, .. } => Recipient::fan(*fan_id),
            Self::NewCartOrder {
                cart_id, fan_id, ..
            } => Recipient::cart(*cart_id, *fan_id),
        }
    }

    /// Returns the NATS subject suffix for this event.
    #[must_use]
    pub fn subject_suffix(&self) -> &'static str {
        self.kind().as_str()
    }
}
