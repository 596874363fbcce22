//! In-memory collaborators for tests.

use crate::contact::{AudienceAccount, ContactStore, Fan, SenderProfile};
use crate::definition::Flow;
use crate::dispatch::{ActionDispatcher, Collaborators, DispatchConfig};
use crate::engine::{Engine, EngineConfig};
use crate::error::{LedgerError, ProviderError, StoreError, SuspendError};
use crate::ledger::RunLedger;
use crate::node::NodeId;
use crate::order::{Order, OrderFilter, OrderLedger};
use crate::provider::{
    Asset, AssetKind, AssetResolver, AudienceContact, AudienceSync, EmailSender, OutboundEmail,
    SendReceipt,
};
use crate::run::{ActionStatus, FlowRun, FlowRunAction};
use crate::store::GraphStore;
use crate::suspend::{Clock, Suspender};
use crate::template::{EmailDelivery, EmailTemplate, TemplateKind, TemplateStore};
use crate::trigger::{Recipient, RecipientKey, TriggerKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use encore_core::{
    CartFunnelId, EmailDeliveryId, EmailTemplateGroupId, EmailTemplateId, FanId, FlowId,
    FlowRunActionId, FlowRunId, OrderId, ProductId, WorkspaceId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub(crate) const TEMPLATE_BODY: &str = "Hi {{firstName}}, <a href=\"{{link:promo}}\">shop</a>";

#[derive(Default)]
pub(crate) struct InMemoryGraphStore {
    flows: Mutex<HashMap<FlowId, Flow>>,
}

impl InMemoryGraphStore {
    pub(crate) fn insert(&self, flow: Flow) {
        self.flows.lock().unwrap().insert(flow.id, flow);
    }

    pub(crate) fn set_enabled(&self, flow_id: FlowId, enabled: bool) {
        if let Some(flow) = self.flows.lock().unwrap().get_mut(&flow_id) {
            flow.enabled = enabled;
        }
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_flow(&self, flow_id: FlowId) -> Result<Option<Flow>, StoreError> {
        Ok(self.flows.lock().unwrap().get(&flow_id).cloned())
    }

    async fn find_flows(
        &self,
        workspace_id: WorkspaceId,
        kind: TriggerKind,
    ) -> Result<Vec<Flow>, StoreError> {
        let mut flows: Vec<Flow> = self
            .flows
            .lock()
            .unwrap()
            .values()
            .filter(|f| f.workspace_id == workspace_id && f.trigger.kind() == kind)
            .cloned()
            .collect();
        flows.sort_by_key(|f| f.created_at);
        Ok(flows)
    }
}

#[derive(Default)]
pub(crate) struct InMemoryRunLedger {
    runs: Mutex<HashMap<FlowRunId, FlowRun>>,
    actions: Mutex<Vec<FlowRunAction>>,
    /// Fail the next write that completes an attempt, as a crash would.
    fail_next_completion: Mutex<bool>,
    /// Run updates left to succeed before one fails.
    run_updates_before_failure: Mutex<Option<usize>>,
}

impl InMemoryRunLedger {
    pub(crate) fn run(&self, run_id: FlowRunId) -> FlowRun {
        self.runs.lock().unwrap()[&run_id].clone()
    }

    pub(crate) fn runs(&self) -> Vec<FlowRun> {
        self.runs.lock().unwrap().values().cloned().collect()
    }

    pub(crate) fn actions(&self, run_id: FlowRunId) -> Vec<FlowRunAction> {
        self.actions
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.run_id == run_id)
            .cloned()
            .collect()
    }

    pub(crate) fn fail_next_completion(&self) {
        *self.fail_next_completion.lock().unwrap() = true;
    }

    /// Lets `successes` run updates through, then fails the next one.
    pub(crate) fn fail_run_update_after(&self, successes: usize) {
        *self.run_updates_before_failure.lock().unwrap() = Some(successes);
    }
}

#[async_trait]
impl RunLedger for InMemoryRunLedger {
    async fn create_run(&self, run: &FlowRun) -> Result<(), LedgerError> {
        self.runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn get_run(&self, run_id: FlowRunId) -> Result<Option<FlowRun>, LedgerError> {
        Ok(self.runs.lock().unwrap().get(&run_id).cloned())
    }

    async fn update_run(&self, run: &mut FlowRun) -> Result<(), LedgerError> {
        {
            let mut countdown = self.run_updates_before_failure.lock().unwrap();
            match *countdown {
                Some(0) => {
                    *countdown = None;
                    return Err(LedgerError::Storage {
                        message: "connection lost".to_string(),
                    });
                }
                Some(left) => *countdown = Some(left - 1),
                None => {}
            }
        }
        let mut runs = self.runs.lock().unwrap();
        let stored = runs.get_mut(&run.id).ok_or_else(|| LedgerError::NotFound {
            entity: "flow run",
            id: run.id.to_string(),
        })?;
        if stored.version != run.version {
            return Err(LedgerError::Conflict {
                run_id: run.id,
                expected_version: run.version,
            });
        }
        run.version += 1;
        *stored = run.clone();
        Ok(())
    }

    async fn find_runs(
        &self,
        flow_id: FlowId,
        recipient: RecipientKey,
    ) -> Result<Vec<FlowRun>, LedgerError> {
        let mut runs: Vec<FlowRun> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.flow_id == flow_id && r.recipient.dedup_key() == Some(recipient))
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }

    async fn list_active(&self) -> Result<Vec<FlowRun>, LedgerError> {
        Ok(self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| !r.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn create_run_action(&self, action: &FlowRunAction) -> Result<(), LedgerError> {
        self.actions.lock().unwrap().push(action.clone());
        Ok(())
    }

    async fn update_run_action(&self, action: &FlowRunAction) -> Result<(), LedgerError> {
        if action.status == ActionStatus::Completed {
            let mut fail = self.fail_next_completion.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(LedgerError::Storage {
                    message: "connection lost".to_string(),
                });
            }
        }
        let mut actions = self.actions.lock().unwrap();
        let stored = actions
            .iter_mut()
            .find(|a| a.id == action.id)
            .ok_or_else(|| LedgerError::NotFound {
                entity: "flow run action",
                id: action.id.to_string(),
            })?;
        *stored = action.clone();
        Ok(())
    }

    async fn get_run_action(
        &self,
        action_id: FlowRunActionId,
    ) -> Result<Option<FlowRunAction>, LedgerError> {
        Ok(self
            .actions
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == action_id)
            .cloned())
    }

    async fn latest_run_action(
        &self,
        run_id: FlowRunId,
        node_id: NodeId,
    ) -> Result<Option<FlowRunAction>, LedgerError> {
        Ok(self
            .actions
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.run_id == run_id && a.node_id == node_id)
            .max_by_key(|a| a.attempt)
            .cloned())
    }

    async fn list_run_actions(
        &self,
        run_id: FlowRunId,
    ) -> Result<Vec<FlowRunAction>, LedgerError> {
        Ok(self.actions(run_id))
    }
}

#[derive(Default)]
pub(crate) struct InMemoryOrders {
    orders: Mutex<Vec<Order>>,
    failure: Mutex<Option<String>>,
}

impl InMemoryOrders {
    pub(crate) fn add(&self, order: Order) {
        self.orders.lock().unwrap().push(order);
    }

    pub(crate) fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }
}

#[async_trait]
impl OrderLedger for InMemoryOrders {
    async fn find_completed_orders(
        &self,
        fan_id: FanId,
        filter: OrderFilter,
    ) -> Result<Vec<Order>, StoreError> {
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(StoreError::Storage { message });
        }
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.fan_id == fan_id)
            .filter(|o| {
                filter
                    .cart_funnel_id
                    .is_none_or(|funnel| o.cart_funnel_id == funnel)
            })
            .cloned()
            .collect())
    }
}

pub(crate) fn order(fan_id: FanId, cart_funnel_id: CartFunnelId, order_amount: i64) -> Order {
    Order {
        id: OrderId::new(),
        fan_id,
        cart_funnel_id,
        main_product_id: ProductId::new(),
        bump: None,
        upsells: Vec::new(),
        order_amount,
    }
}

#[derive(Default)]
pub(crate) struct InMemoryContacts {
    fans: Mutex<HashMap<FanId, Fan>>,
    profiles: Mutex<HashMap<WorkspaceId, SenderProfile>>,
    accounts: Mutex<HashMap<WorkspaceId, AudienceAccount>>,
}

#[async_trait]
impl ContactStore for InMemoryContacts {
    async fn get_fan(&self, fan_id: FanId) -> Result<Option<Fan>, StoreError> {
        Ok(self.fans.lock().unwrap().get(&fan_id).cloned())
    }

    async fn sender_profile(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<SenderProfile>, StoreError> {
        Ok(self.profiles.lock().unwrap().get(&workspace_id).cloned())
    }

    async fn audience_account(
        &self,
        workspace_id: WorkspaceId,
    ) -> Result<Option<AudienceAccount>, StoreError> {
        Ok(self.accounts.lock().unwrap().get(&workspace_id).cloned())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryTemplates {
    templates: Mutex<HashMap<EmailTemplateId, EmailTemplate>>,
    groups: Mutex<HashMap<EmailTemplateGroupId, Vec<EmailTemplateId>>>,
    deliveries: Mutex<Vec<EmailDelivery>>,
}

impl InMemoryTemplates {
    pub(crate) fn put_template(&self, template: EmailTemplate) {
        self.templates
            .lock()
            .unwrap()
            .insert(template.id, template);
    }

    pub(crate) fn deliveries(&self) -> Vec<EmailDelivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub(crate) fn mark_delivered(&self, fan_id: FanId, template_id: EmailTemplateId) {
        self.deliveries.lock().unwrap().push(EmailDelivery {
            id: EmailDeliveryId::new(),
            fan_id,
            template_id,
            run_id: None,
            provider_message_id: "earlier".to_string(),
            sent_at: Utc::now(),
        });
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplates {
    async fn get_template(
        &self,
        template_id: EmailTemplateId,
    ) -> Result<Option<EmailTemplate>, StoreError> {
        Ok(self.templates.lock().unwrap().get(&template_id).cloned())
    }

    async fn group_template_ids(
        &self,
        group_id: EmailTemplateGroupId,
    ) -> Result<Vec<EmailTemplateId>, StoreError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delivered_template_ids(
        &self,
        fan_id: FanId,
        template_ids: &[EmailTemplateId],
    ) -> Result<Vec<EmailTemplateId>, StoreError> {
        Ok(self
            .deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.fan_id == fan_id && template_ids.contains(&d.template_id))
            .map(|d| d.template_id)
            .collect())
    }

    async fn record_delivery(&self, delivery: &EmailDelivery) -> Result<(), StoreError> {
        self.deliveries.lock().unwrap().push(delivery.clone());
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingEmailSender {
    sent: Mutex<Vec<OutboundEmail>>,
    failure: Mutex<Option<ProviderError>>,
}

impl RecordingEmailSender {
    pub(crate) fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn fail_with(&self, error: ProviderError) {
        *self.failure.lock().unwrap() = Some(error);
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, email: &OutboundEmail) -> Result<SendReceipt, ProviderError> {
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(email.clone());
        Ok(SendReceipt {
            message_id: format!("msg-{}", sent.len()),
        })
    }
}

#[derive(Default)]
pub(crate) struct StaticAssets {
    assets: Mutex<Vec<Asset>>,
}

impl StaticAssets {
    pub(crate) fn add_link(&self, id: &str, url: &str) {
        self.assets.lock().unwrap().push(Asset {
            kind: AssetKind::Link,
            id: id.to_string(),
            url: url.to_string(),
            placeholder: format!("{{{{link:{id}}}}}"),
        });
    }
}

#[async_trait]
impl AssetResolver for StaticAssets {
    async fn resolve(&self, markup: &str) -> Result<Vec<Asset>, ProviderError> {
        Ok(self
            .assets
            .lock()
            .unwrap()
            .iter()
            .filter(|a| markup.contains(&a.placeholder))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct RecordingAudienceSync {
    added: Mutex<Vec<(String, String)>>,
}

impl RecordingAudienceSync {
    pub(crate) fn added(&self) -> Vec<(String, String)> {
        self.added.lock().unwrap().clone()
    }
}

#[async_trait]
impl AudienceSync for RecordingAudienceSync {
    async fn add_contact(
        &self,
        _account: &AudienceAccount,
        list_id: &str,
        contact: &AudienceContact,
    ) -> Result<(), ProviderError> {
        self.added
            .lock()
            .unwrap()
            .push((list_id.to_string(), contact.email.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingSuspender {
    wakeups: Mutex<Vec<(FlowRunId, NodeId, DateTime<Utc>)>>,
}

impl RecordingSuspender {
    pub(crate) fn wakeups(&self) -> Vec<(FlowRunId, NodeId, DateTime<Utc>)> {
        self.wakeups.lock().unwrap().clone()
    }
}

#[async_trait]
impl Suspender for RecordingSuspender {
    async fn sleep_until(
        &self,
        run_id: FlowRunId,
        node_id: NodeId,
        at: DateTime<Utc>,
    ) -> Result<(), SuspendError> {
        self.wakeups.lock().unwrap().push((run_id, node_id, at));
        Ok(())
    }
}

pub(crate) struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub(crate) fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()),
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Every collaborator wired together for one workspace.
pub(crate) struct Harness {
    pub(crate) workspace_id: WorkspaceId,
    pub(crate) graphs: Arc<InMemoryGraphStore>,
    pub(crate) ledger: Arc<InMemoryRunLedger>,
    pub(crate) orders: Arc<InMemoryOrders>,
    pub(crate) contacts: Arc<InMemoryContacts>,
    pub(crate) templates: Arc<InMemoryTemplates>,
    pub(crate) email: Arc<RecordingEmailSender>,
    pub(crate) assets: Arc<StaticAssets>,
    pub(crate) audiences: Arc<RecordingAudienceSync>,
    pub(crate) suspender: Arc<RecordingSuspender>,
    pub(crate) clock: Arc<ManualClock>,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let workspace_id = WorkspaceId::new();
        let contacts = Arc::new(InMemoryContacts::default());
        contacts.profiles.lock().unwrap().insert(
            workspace_id,
            SenderProfile {
                from_address: "hello@band.example".to_string(),
                from_name: Some("The Band".to_string()),
                unsubscribe_base_url: "https://band.example/unsubscribe".to_string(),
            },
        );
        Self {
            workspace_id,
            graphs: Arc::default(),
            ledger: Arc::default(),
            orders: Arc::default(),
            contacts,
            templates: Arc::default(),
            email: Arc::default(),
            assets: Arc::default(),
            audiences: Arc::default(),
            suspender: Arc::default(),
            clock: Arc::default(),
        }
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn add_fan(&self, email_marketing_opt_in: bool) -> Fan {
        let id = FanId::new();
        let fan = Fan {
            id,
            workspace_id: self.workspace_id,
            email: format!("{id}@fans.example"),
            first_name: Some("Sam".to_string()),
            last_name: Some("Rivera".to_string()),
            email_marketing_opt_in,
        };
        self.contacts.fans.lock().unwrap().insert(id, fan.clone());
        fan
    }

    pub(crate) fn add_template(&self, kind: TemplateKind) -> EmailTemplate {
        let template = EmailTemplate {
            id: EmailTemplateId::new(),
            workspace_id: self.workspace_id,
            name: "Template".to_string(),
            subject: "News for {{firstName}}".to_string(),
            body: TEMPLATE_BODY.to_string(),
            kind,
        };
        self.templates.put_template(template.clone());
        template
    }

    pub(crate) fn add_group(&self, template_ids: Vec<EmailTemplateId>) -> EmailTemplateGroupId {
        let id = EmailTemplateGroupId::new();
        self.templates
            .groups
            .lock()
            .unwrap()
            .insert(id, template_ids);
        id
    }

    pub(crate) fn connect_mailchimp(&self) {
        self.contacts.accounts.lock().unwrap().insert(
            self.workspace_id,
            AudienceAccount {
                api_key: "key-us21".to_string(),
                server_prefix: "us21".to_string(),
            },
        );
    }

    /// A run that is not stored in the ledger, for dispatching actions directly.
    pub(crate) fn run_for(&self, fan_id: FanId) -> FlowRun {
        FlowRun::new(
            FlowId::new(),
            self.workspace_id,
            NodeId::new(),
            TriggerKind::CallFlow,
            Recipient::fan(fan_id),
            NodeId::new(),
            self.now(),
        )
    }

    pub(crate) fn dispatcher(&self) -> ActionDispatcher {
        ActionDispatcher::new(
            Collaborators {
                contacts: self.contacts.clone(),
                templates: self.templates.clone(),
                orders: self.orders.clone(),
                email: self.email.clone(),
                assets: self.assets.clone(),
                audiences: self.audiences.clone(),
            },
            DispatchConfig {
                tracking_base_url: "https://t.example".to_string(),
            },
        )
    }

    pub(crate) fn engine(&self) -> Engine {
        Engine::new(
            self.graphs.clone(),
            self.ledger.clone(),
            self.suspender.clone(),
            self.dispatcher(),
            self.clock.clone(),
            EngineConfig::default(),
        )
    }
}
