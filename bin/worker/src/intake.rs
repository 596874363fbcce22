//! Trigger intake: hands events from the bus to the engine.
//!
//! Every delivery is acknowledged only after the engine has recorded the
//! runs it started. Events that fail on a storage error are redelivered
//! after a delay; events that can never be handled are dropped.

use crate::config::IntakeConfig;
use async_trait::async_trait;
use encore_flow::envelope::EnvelopeError;
use encore_flow::nats::{TriggerDelivery, TriggerSubscription};
use encore_flow::{Engine, EngineError, FireOutcome, TriggerEvent};
use rootcause::Report;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, error, info, warn};

/// Starts runs for a trigger event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(
        &self,
        event: &TriggerEvent,
    ) -> Result<Vec<FireOutcome>, Report<EngineError>>;
}

#[async_trait]
impl EventHandler for Engine {
    async fn handle_event(
        &self,
        event: &TriggerEvent,
    ) -> Result<Vec<FireOutcome>, Report<EngineError>> {
        Engine::handle_event(self, event).await
    }
}

/// What to tell the bus about a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handled; do not deliver again.
    Ack,
    /// Deliver again after the retry delay.
    Retry,
    /// Can never be handled; do not deliver again.
    Drop,
}

/// Consumes trigger deliveries with bounded concurrency.
pub struct TriggerIntake {
    handler: Arc<dyn EventHandler>,
    config: IntakeConfig,
}

impl TriggerIntake {
    #[must_use]
    pub fn new(handler: Arc<dyn EventHandler>, config: IntakeConfig) -> Self {
        Self { handler, config }
    }

    /// Handles one decoded (or undecodable) event.
    pub async fn process(&self, event: Result<&TriggerEvent, &EnvelopeError>) -> Disposition {
        let event = match event {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "dropping undecodable trigger");
                return Disposition::Drop;
            }
        };

        match self.handler.handle_event(event).await {
            Ok(outcomes) => {
                for outcome in &outcomes {
                    log_outcome(outcome);
                }
                Disposition::Ack
            }
            Err(error) if matches!(error.current_context(), EngineError::FlowNotFound { .. }) => {
                warn!(kind = %event.kind(), %error, "dropping trigger for missing flow");
                Disposition::Drop
            }
            Err(error) => {
                warn!(kind = %event.kind(), %error, "trigger failed; will retry");
                Disposition::Retry
            }
        }
    }

    /// Consumes deliveries until `shutdown` becomes `true` or the stream
    /// closes. In-flight events finish before this returns.
    pub async fn run(
        self,
        mut subscription: TriggerSubscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let intake = Arc::new(self);
        let permits = Arc::new(Semaphore::new(intake.config.concurrency.max(1)));
        info!(
            concurrency = intake.config.concurrency,
            "trigger intake started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            let delivery = tokio::select! {
                next = subscription.next() => next,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };
            let delivery = match delivery {
                Some(Ok(delivery)) => delivery,
                Some(Err(error)) => {
                    warn!(%error, "failed to receive trigger");
                    continue;
                }
                None => {
                    warn!("trigger stream closed");
                    break;
                }
            };

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let intake = intake.clone();
            tokio::spawn(async move {
                intake.settle(delivery).await;
                drop(permit);
            });
        }

        // Wait for in-flight events by taking every permit.
        let total = u32::try_from(intake.config.concurrency.max(1)).unwrap_or(u32::MAX);
        if permits.acquire_many(total).await.is_err() {
            error!("intake permits closed while draining");
        }
        info!("trigger intake stopped");
    }

    async fn settle(&self, delivery: TriggerDelivery) {
        let disposition = self.process(delivery.event.as_ref()).await;
        let result = match disposition {
            Disposition::Ack => delivery.ack().await,
            Disposition::Retry => {
                delivery
                    .nak(Duration::from_secs(self.config.retry_delay_secs))
                    .await
            }
            Disposition::Drop => delivery.term().await,
        };
        if let Err(error) = result {
            warn!(?disposition, %error, "failed to settle trigger");
        }
    }
}

fn log_outcome(outcome: &FireOutcome) {
    match outcome {
        FireOutcome::Started {
            flow_id,
            run_id,
            progress,
        } => info!(%flow_id, %run_id, ?progress, "run started"),
        FireOutcome::Skipped { flow_id, reason } => debug!(%flow_id, %reason, "flow skipped"),
        FireOutcome::Rejected { flow_id, error } => {
            warn!(%flow_id, %error, "flow rejected trigger");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_core::{FanId, FlowId, FlowRunId, WorkspaceId};
    use encore_flow::{LedgerError, RunProgress};
    use std::sync::Mutex;

    enum Reply {
        Started,
        MissingFlow,
        Storage,
    }

    struct FakeHandler {
        reply: Reply,
        seen: Mutex<Vec<TriggerEvent>>,
    }

    impl FakeHandler {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EventHandler for FakeHandler {
        async fn handle_event(
            &self,
            event: &TriggerEvent,
        ) -> Result<Vec<FireOutcome>, Report<EngineError>> {
            self.seen.lock().unwrap().push(event.clone());
            match self.reply {
                Reply::Started => Ok(vec![FireOutcome::Started {
                    flow_id: FlowId::new(),
                    run_id: FlowRunId::new(),
                    progress: RunProgress::Completed,
                }]),
                Reply::MissingFlow => Err(EngineError::FlowNotFound {
                    flow_id: FlowId::new(),
                }
                .into()),
                Reply::Storage => Err(EngineError::Ledger(LedgerError::Storage {
                    message: "connection reset".to_string(),
                })
                .into()),
            }
        }
    }

    fn new_fan() -> TriggerEvent {
        TriggerEvent::NewFan {
            workspace_id: WorkspaceId::new(),
            fan_id: FanId::new(),
        }
    }

    #[tokio::test]
    async fn handled_event_is_acked() {
        let handler = FakeHandler::new(Reply::Started);
        let intake = TriggerIntake::new(handler.clone(), IntakeConfig::default());
        let event = new_fan();

        assert_eq!(intake.process(Ok(&event)).await, Disposition::Ack);
        assert_eq!(*handler.seen.lock().unwrap(), vec![event]);
    }

    #[tokio::test]
    async fn storage_failure_is_retried() {
        let intake = TriggerIntake::new(FakeHandler::new(Reply::Storage), IntakeConfig::default());
        assert_eq!(intake.process(Ok(&new_fan())).await, Disposition::Retry);
    }

    #[tokio::test]
    async fn missing_flow_is_dropped() {
        let intake =
            TriggerIntake::new(FakeHandler::new(Reply::MissingFlow), IntakeConfig::default());
        assert_eq!(intake.process(Ok(&new_fan())).await, Disposition::Drop);
    }

    #[tokio::test]
    async fn undecodable_event_is_dropped_without_handling() {
        let handler = FakeHandler::new(Reply::Started);
        let intake = TriggerIntake::new(handler.clone(), IntakeConfig::default());

        let disposition = intake
            .process(Err(&EnvelopeError::UnsupportedVersion { version: 2 }))
            .await;

        assert_eq!(disposition, Disposition::Drop);
        assert!(handler.seen.lock().unwrap().is_empty());
    }
}
