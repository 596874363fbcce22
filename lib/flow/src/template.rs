//! Email templates and the record of what each fan has been sent.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use encore_core::{
    EmailDeliveryId, EmailTemplateGroupId, EmailTemplateId, FanId, FlowRunId, WorkspaceId,
};
use serde::{Deserialize, Serialize};

/// Whether a template needs marketing consent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateKind {
    /// Requires opt-in and carries an unsubscribe link.
    Marketing,
    /// Sent regardless of opt-in.
    Transactional,
}

impl TemplateKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Marketing => "marketing",
            Self::Transactional => "transactional",
        }
    }

    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "marketing" => Some(Self::Marketing),
            "transactional" => Some(Self::Transactional),
            _ => None,
        }
    }
}

/// An email template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub id: EmailTemplateId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub subject: String,
    /// HTML body with merge tags and asset references.
    pub body: String,
    pub kind: TemplateKind,
}

/// A sent email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDelivery {
    pub id: EmailDeliveryId,
    pub fan_id: FanId,
    pub template_id: EmailTemplateId,
    pub run_id: Option<FlowRunId>,
    pub provider_message_id: String,
    pub sent_at: DateTime<Utc>,
}

/// Templates, template groups and deliveries.
#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Loads a template.
    async fn get_template(
        &self,
        template_id: EmailTemplateId,
    ) -> Result<Option<EmailTemplate>, StoreError>;

    /// Returns the group's template ids in send order.
    async fn group_template_ids(
        &self,
        group_id: EmailTemplateGroupId,
    ) -> Result<Vec<EmailTemplateId>, StoreError>;

    /// Returns which of `template_ids` the fan has already been sent.
    async fn delivered_template_ids(
        &self,
        fan_id: FanId,
        template_ids: &[EmailTemplateId],
    ) -> Result<Vec<EmailTemplateId>, StoreError>;

    /// Appends a delivery record.
    async fn record_delivery(&self, delivery: &EmailDelivery) -> Result<(), StoreError>;
}
