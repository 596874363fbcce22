//! Action dispatch.
//!
//! The dispatcher executes one enabled action for one run and reports what
//! happened. It does not touch the run ledger; recording the result and
//! walking the graph is the engine's job.

use crate::condition::ConditionEvaluator;
use crate::contact::{ContactStore, Fan};
use crate::error::ActionError;
use crate::node::{Action, ActionKind};
use crate::order::OrderLedger;
use crate::provider::{AssetResolver, AudienceContact, AudienceSync, EmailSender, OutboundEmail};
use crate::render::{render_body, render_subject};
use crate::run::FlowRun;
use crate::template::{EmailDelivery, TemplateKind, TemplateStore};
use chrono::{DateTime, Utc};
use encore_core::{EmailDeliveryId, EmailTemplateGroupId, EmailTemplateId, FanId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Skip reason recorded when a fan has not consented to marketing.
pub const NOT_OPTED_IN: &str = "recipient has not opted in to marketing email";

/// Result of dispatching an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    /// The action finished. `outcome` is set by boolean actions.
    Completed { outcome: Option<bool> },
    /// The action deliberately did nothing.
    Skipped { reason: String },
    /// The run must sleep until `resume_at`.
    Suspend { resume_at: DateTime<Utc> },
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Base URL of the click-tracking redirector.
    pub tracking_base_url: String,
}

/// The external collaborators actions need.
#[derive(Clone)]
pub struct Collaborators {
    pub contacts: Arc<dyn ContactStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub orders: Arc<dyn OrderLedger>,
    pub email: Arc<dyn EmailSender>,
    pub assets: Arc<dyn AssetResolver>,
    pub audiences: Arc<dyn AudienceSync>,
}

/// Executes actions against external collaborators.
#[derive(Clone)]
pub struct ActionDispatcher {
    contacts: Arc<dyn ContactStore>,
    templates: Arc<dyn TemplateStore>,
    conditions: ConditionEvaluator,
    email: Arc<dyn EmailSender>,
    assets: Arc<dyn AssetResolver>,
    audiences: Arc<dyn AudienceSync>,
    config: DispatchConfig,
}

impl ActionDispatcher {
    #[must_use]
    pub fn new(collaborators: Collaborators, config: DispatchConfig) -> Self {
        Self {
            contacts: collaborators.contacts,
            templates: collaborators.templates,
            conditions: ConditionEvaluator::new(collaborators.orders),
            email: collaborators.email,
            assets: collaborators.assets,
            audiences: collaborators.audiences,
            config,
        }
    }

    /// Executes an action for a run.
    ///
    /// The caller must not dispatch disabled actions.
    ///
    /// # Errors
    ///
    /// Returns an error if the action is misconfigured, its condition cannot
    /// be evaluated, a record it needs is missing, or a provider fails.
    #[instrument(skip_all, fields(run_id = %run.id, node_id = %action.id, action_type = %action.action_type()))]
    pub async fn dispatch(
        &self,
        action: &Action,
        run: &FlowRun,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        match &action.kind {
            ActionKind::Empty => Ok(ActionOutcome::Completed { outcome: None }),
            ActionKind::Wait {
                wait_for,
                wait_for_units,
            } => {
                let resume_at = now
                    .checked_add_signed(wait_for_units.duration(*wait_for))
                    .ok_or_else(|| ActionError::Failed {
                        reason: format!("wait of {wait_for} {wait_for_units:?} is out of range"),
                    })?;
                if resume_at <= now {
                    Ok(ActionOutcome::Completed { outcome: None })
                } else {
                    Ok(ActionOutcome::Suspend { resume_at })
                }
            }
            ActionKind::SendEmail { email_template_id } => {
                self.send_email(*email_template_id, run, now).await
            }
            ActionKind::SendEmailFromTemplateGroup {
                email_template_group_id,
            } => {
                self.send_from_group(*email_template_group_id, run, now)
                    .await
            }
            ActionKind::Boolean { condition } => {
                let result = self
                    .conditions
                    .evaluate(action.id, condition, run.recipient.fan_id)
                    .await?;
                Ok(ActionOutcome::Completed {
                    outcome: Some(result),
                })
            }
            ActionKind::AddToMailchimpAudience {
                mailchimp_audience_id,
            } => self.add_to_audience(mailchimp_audience_id, run).await,
        }
    }

    async fn send_email(
        &self,
        template_id: EmailTemplateId,
        run: &FlowRun,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        let fan_id = recipient_fan(run)?;
        let template = self
            .templates
            .get_template(template_id)
            .await?
            .ok_or_else(|| ActionError::Failed {
                reason: format!("email template not found: {template_id}"),
            })?;
        let fan = self.load_fan(fan_id).await?;

        let marketing = template.kind == TemplateKind::Marketing;
        if marketing && !fan.email_marketing_opt_in {
            return Ok(ActionOutcome::Skipped {
                reason: NOT_OPTED_IN.to_string(),
            });
        }

        let sender = self
            .contacts
            .sender_profile(run.workspace_id)
            .await?
            .ok_or_else(|| ActionError::Failed {
                reason: format!("workspace {} has no sender profile", run.workspace_id),
            })?;
        let assets = self
            .assets
            .resolve(&template.body)
            .await
            .map_err(|e| ActionError::Delivery {
                provider: "asset resolver",
                message: e.to_string(),
            })?;

        let render_failed = |e: minijinja::Error| ActionError::Failed {
            reason: format!("email template {template_id} failed to render: {e}"),
        };
        let email = OutboundEmail {
            to: fan.email.clone(),
            from: sender.from_header(),
            subject: render_subject(&template.subject, &fan).map_err(render_failed)?,
            html_body: render_body(
                &template.body,
                &fan,
                &assets,
                &self.config.tracking_base_url,
            )
            .map_err(render_failed)?,
            list_unsubscribe_url: marketing.then(|| sender.unsubscribe_url(fan.id)),
        };
        let receipt = self
            .email
            .send(&email)
            .await
            .map_err(|e| ActionError::Delivery {
                provider: "email",
                message: e.to_string(),
            })?;

        self.templates
            .record_delivery(&EmailDelivery {
                id: EmailDeliveryId::new(),
                fan_id,
                template_id,
                run_id: Some(run.id),
                provider_message_id: receipt.message_id.clone(),
                sent_at: now,
            })
            .await?;

        info!(%fan_id, %template_id, message_id = %receipt.message_id, "sent email");
        Ok(ActionOutcome::Completed { outcome: None })
    }

    async fn send_from_group(
        &self,
        group_id: EmailTemplateGroupId,
        run: &FlowRun,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        let fan_id = recipient_fan(run)?;
        let template_ids = self.templates.group_template_ids(group_id).await?;
        let delivered = self
            .templates
            .delivered_template_ids(fan_id, &template_ids)
            .await?;

        match template_ids.iter().find(|id| !delivered.contains(id)) {
            Some(next) => self.send_email(*next, run, now).await,
            None => {
                debug!(%fan_id, %group_id, "template group exhausted");
                Ok(ActionOutcome::Completed { outcome: None })
            }
        }
    }

    async fn add_to_audience(
        &self,
        list_id: &str,
        run: &FlowRun,
    ) -> Result<ActionOutcome, ActionError> {
        let fan = self.load_fan(recipient_fan(run)?).await?;
        if !fan.email_marketing_opt_in {
            return Ok(ActionOutcome::Skipped {
                reason: NOT_OPTED_IN.to_string(),
            });
        }

        let account = self
            .contacts
            .audience_account(run.workspace_id)
            .await?
            .ok_or_else(|| ActionError::Failed {
                reason: format!(
                    "workspace {} has no connected Mailchimp account",
                    run.workspace_id
                ),
            })?;
        let contact = AudienceContact {
            email: fan.email.clone(),
            first_name: fan.first_name.clone(),
            last_name: fan.last_name.clone(),
        };
        self.audiences
            .add_contact(&account, list_id, &contact)
            .await
            .map_err(|e| ActionError::Delivery {
                provider: "mailchimp",
                message: e.to_string(),
            })?;

        info!(fan_id = %fan.id, list_id, "added fan to audience");
        Ok(ActionOutcome::Completed { outcome: None })
    }

    async fn load_fan(&self, fan_id: FanId) -> Result<Fan, ActionError> {
        self.contacts
            .get_fan(fan_id)
            .await?
            .ok_or_else(|| ActionError::Failed {
                reason: format!("fan not found: {fan_id}"),
            })
    }
}

fn recipient_fan(run: &FlowRun) -> Result<FanId, ActionError> {
    run.recipient.fan_id.ok_or_else(|| ActionError::Failed {
        reason: "run has no fan recipient".to_string(),
    })
}
