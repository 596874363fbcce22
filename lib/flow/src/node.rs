//! Flow node types.
//!
//! Every node in a flow graph is either the flow's trigger or an action.
//! Actions are a sum type: each variant carries only the fields its kind
//! needs, so dispatch over them is checked for exhaustiveness.

use chrono::Duration;
use encore_core::{CartFunnelId, EmailTemplateGroupId, EmailTemplateId, ParseIdError, ProductId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

/// A unique identifier for a node within a flow.
///
/// Trigger and action nodes share this id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("node_").unwrap_or(s);
        Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
            id_type: "NodeId",
            reason: e.to_string(),
        })
    }
}

/// Unit for a wait action's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WaitUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl WaitUnit {
    /// Converts an amount of this unit into a duration.
    #[must_use]
    pub fn duration(self, amount: u32) -> Duration {
        let amount = i64::from(amount);
        match self {
            Self::Minutes => Duration::minutes(amount),
            Self::Hours => Duration::hours(amount),
            Self::Days => Duration::days(amount),
            Self::Weeks => Duration::weeks(amount),
        }
    }
}

/// The runtime condition a boolean action branches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "booleanCondition",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum BooleanCondition {
    /// The recipient has a completed order containing the product.
    ///
    /// With no product, any completed order satisfies the condition.
    HasOrderedProduct {
        #[serde(default)]
        product_id: Option<ProductId>,
    },
    /// The recipient has a completed order through the funnel (any funnel if unset).
    HasOrderedCart {
        #[serde(default)]
        cart_funnel_id: Option<CartFunnelId>,
    },
    /// The recipient's completed orders sum to at least the threshold.
    HasOrderedAmount {
        /// Threshold in minor currency units. Required at evaluation time.
        #[serde(default)]
        total_order_amount: Option<i64>,
    },
}

impl BooleanCondition {
    /// Returns the wire name of the condition.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HasOrderedProduct { .. } => "hasOrderedProduct",
            Self::HasOrderedCart { .. } => "hasOrderedCart",
            Self::HasOrderedAmount { .. } => "hasOrderedAmount",
        }
    }
}

/// The kind-specific configuration of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ActionKind {
    /// Placeholder with no effect.
    Empty,
    /// Suspend the run for a duration.
    Wait {
        wait_for: u32,
        wait_for_units: WaitUnit,
    },
    /// Send one email template to the recipient.
    SendEmail { email_template_id: EmailTemplateId },
    /// Send the next template of the group the recipient has not received.
    SendEmailFromTemplateGroup {
        email_template_group_id: EmailTemplateGroupId,
    },
    /// Branch on a runtime condition.
    Boolean {
        #[serde(flatten)]
        condition: BooleanCondition,
    },
    /// Add the recipient to a Mailchimp audience.
    AddToMailchimpAudience { mailchimp_audience_id: String },
}

impl ActionKind {
    /// Returns the discriminant of this configuration.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Empty => ActionType::Empty,
            Self::Wait { .. } => ActionType::Wait,
            Self::SendEmail { .. } => ActionType::SendEmail,
            Self::SendEmailFromTemplateGroup { .. } => ActionType::SendEmailFromTemplateGroup,
            Self::Boolean { .. } => ActionType::Boolean,
            Self::AddToMailchimpAudience { .. } => ActionType::AddToMailchimpAudience,
        }
    }
}

/// Discriminant of [`ActionKind`], stored alongside run records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Empty,
    Wait,
    SendEmail,
    SendEmailFromTemplateGroup,
    Boolean,
    AddToMailchimpAudience,
}

impl ActionType {
    /// Returns the wire name of the action type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Wait => "wait",
            Self::SendEmail => "sendEmail",
            Self::SendEmailFromTemplateGroup => "sendEmailFromTemplateGroup",
            Self::Boolean => "boolean",
            Self::AddToMailchimpAudience => "addToMailchimpAudience",
        }
    }

    /// Parses a wire name, returning `None` for unknown types.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(Self::Empty),
            "wait" => Some(Self::Wait),
            "sendEmail" => Some(Self::SendEmail),
            "sendEmailFromTemplateGroup" => Some(Self::SendEmailFromTemplateGroup),
            "boolean" => Some(Self::Boolean),
            "addToMailchimpAudience" => Some(Self::AddToMailchimpAudience),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Unique identifier for this node within the flow.
    pub id: NodeId,
    /// Human-readable name.
    pub name: String,
    /// Disabled actions are recorded as skipped and never dispatched.
    pub enabled: bool,
    /// Kind-specific configuration.
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    /// Creates a new enabled action.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ActionKind) -> Self {
        Self::with_id(NodeId::new(), name, kind)
    }

    /// Creates a new enabled action with a specific ID.
    #[must_use]
    pub fn with_id(id: NodeId, name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            kind,
        }
    }

    /// Returns this action disabled.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns the action's discriminant.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        self.kind.action_type()
    }
}
