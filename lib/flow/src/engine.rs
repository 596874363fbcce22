//! The execution loop.
//!
//! The engine starts runs from trigger events and advances them one node at
//! a time until they complete, fail or suspend at a wait. It keeps no state
//! between calls: every advance re-reads the run from the ledger and the
//! flow from the graph store, so a process may exit while runs are
//! suspended and any process may resume them.
//!
//! Side effects are at-least-once. If the process dies after an effect but
//! before its attempt is recorded as completed, resuming the run executes
//! the node again.

use crate::definition::Flow;
use crate::dispatch::{ActionDispatcher, ActionOutcome};
use crate::error::{DefinitionError, EngineError};
use crate::graph::{FlowGraph, Next};
use crate::ledger::RunLedger;
use crate::node::NodeId;
use crate::run::{ActionStatus, FlowRun, FlowRunAction, RunStatus};
use crate::store::GraphStore;
use crate::suspend::{Clock, Suspender};
use crate::trigger::TriggerEvent;
use chrono::{DateTime, Utc};
use encore_core::{FlowId, FlowRunId};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Skip reason recorded for disabled actions.
pub const ACTION_DISABLED: &str = "action disabled";

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on nodes executed in one advance. Guards against cycles
    /// without a wait.
    #[serde(default = "default_max_steps")]
    pub max_steps_per_advance: usize,
}

fn default_max_steps() -> usize {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps_per_advance: default_max_steps(),
        }
    }
}

/// Why a matching flow did not start a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    FlowDisabled,
    TriggerDisabled,
    /// The flow's trigger does not listen for this event.
    TriggerMismatch,
    /// A run of this flow already completed for the recipient.
    AlreadyCompleted,
    /// The trigger has no out-edge.
    EmptyFlow,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::FlowDisabled => "flow disabled",
            Self::TriggerDisabled => "trigger disabled",
            Self::TriggerMismatch => "trigger does not match event",
            Self::AlreadyCompleted => "already completed for recipient",
            Self::EmptyFlow => "flow has no actions",
        })
    }
}

/// Where an advance left a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunProgress {
    Completed,
    Failed { error: String },
    /// Waiting for a wakeup at `resume_at`.
    Suspended { resume_at: DateTime<Utc> },
    /// The run was already terminal; nothing was done.
    AlreadyFinished(RunStatus),
}

/// The result of offering an event to one flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Started {
        flow_id: FlowId,
        run_id: FlowRunId,
        progress: RunProgress,
    },
    Skipped {
        flow_id: FlowId,
        reason: SkipReason,
    },
    /// The trigger's out-edges are malformed, so no run could be created.
    Rejected {
        flow_id: FlowId,
        error: DefinitionError,
    },
}

/// What the loop does next.
#[derive(Debug, Clone, Copy)]
enum Step {
    /// Make a new attempt at the node.
    Execute(NodeId),
    /// Leave the node, choosing the out-edge by `outcome`.
    WalkFrom {
        node_id: NodeId,
        outcome: Option<bool>,
    },
}

/// The flow execution engine.
#[derive(Clone)]
pub struct Engine {
    graphs: Arc<dyn GraphStore>,
    ledger: Arc<dyn RunLedger>,
    suspender: Arc<dyn Suspender>,
    dispatcher: ActionDispatcher,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    #[must_use]
    pub fn new(
        graphs: Arc<dyn GraphStore>,
        ledger: Arc<dyn RunLedger>,
        suspender: Arc<dyn Suspender>,
        dispatcher: ActionDispatcher,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graphs,
            ledger,
            suspender,
            dispatcher,
            clock,
            config,
        }
    }

    /// Starts runs for every flow the event addresses.
    ///
    /// `callFlow` addresses the named flow. `newFan` and `newCartOrder`
    /// address every flow of the workspace whose trigger matches the event.
    ///
    /// # Errors
    ///
    /// Returns an error if a flow cannot be loaded or a run cannot be
    /// recorded. Runs started for earlier flows are kept.
    #[instrument(skip_all, fields(kind = %event.kind()))]
    pub async fn handle_event(
        &self,
        event: &TriggerEvent,
    ) -> Result<Vec<FireOutcome>, Report<EngineError>> {
        match event {
            TriggerEvent::CallFlow { flow_id, .. } => Ok(vec![self.fire(*flow_id, event).await?]),
            TriggerEvent::NewFan { workspace_id, .. }
            | TriggerEvent::NewCartOrder { workspace_id, .. } => {
                let flows = self
                    .graphs
                    .find_flows(*workspace_id, event.kind())
                    .await
                    .map_err(EngineError::Store)?;

                let mut outcomes = Vec::new();
                for flow in flows {
                    if !flow.trigger.matches(event) {
                        continue;
                    }
                    outcomes.push(self.fire_flow(&flow, event).await?);
                }
                debug!(count = outcomes.len(), "event handled");
                Ok(outcomes)
            }
        }
    }

    /// Offers an event to a single flow.
    ///
    /// # Errors
    ///
    /// Returns an error if the flow does not exist or the run cannot be
    /// recorded.
    #[instrument(skip(self, event), fields(kind = %event.kind()))]
    pub async fn fire(
        &self,
        flow_id: FlowId,
        event: &TriggerEvent,
    ) -> Result<FireOutcome, Report<EngineError>> {
        let flow = self
            .graphs
            .get_flow(flow_id)
            .await
            .map_err(EngineError::Store)?
            .ok_or(EngineError::FlowNotFound { flow_id })?;
        self.fire_flow(&flow, event).await
    }

    async fn fire_flow(
        &self,
        flow: &Flow,
        event: &TriggerEvent,
    ) -> Result<FireOutcome, Report<EngineError>> {
        let skipped = |reason: SkipReason| {
            debug!(flow_id = %flow.id, %reason, "flow skipped");
            Ok(FireOutcome::Skipped {
                flow_id: flow.id,
                reason,
            })
        };

        if !flow.enabled {
            return skipped(SkipReason::FlowDisabled);
        }
        if !flow.trigger.enabled {
            return skipped(SkipReason::TriggerDisabled);
        }
        if !flow.trigger.matches(event) {
            return skipped(SkipReason::TriggerMismatch);
        }

        let recipient = event.recipient();
        if event.kind().deduplicates() {
            if let Some(key) = recipient.dedup_key() {
                let runs = self
                    .ledger
                    .find_runs(flow.id, key)
                    .await
                    .map_err(EngineError::Ledger)?;
                if runs.iter().any(|r| r.status == RunStatus::Completed) {
                    return skipped(SkipReason::AlreadyCompleted);
                }
            }
        }

        let graph = flow.graph();
        let first = match graph.first_node() {
            Ok(Next::Node(first)) => first,
            Ok(Next::Terminal) => return skipped(SkipReason::EmptyFlow),
            Err(error) => {
                warn!(flow_id = %flow.id, %error, "flow trigger is malformed");
                return Ok(FireOutcome::Rejected {
                    flow_id: flow.id,
                    error,
                });
            }
        };

        let mut run = FlowRun::new(
            flow.id,
            flow.workspace_id,
            flow.trigger.id,
            flow.trigger.kind(),
            recipient,
            first,
            self.clock.now(),
        );
        self.ledger
            .create_run(&run)
            .await
            .map_err(EngineError::Ledger)?;
        info!(run_id = %run.id, flow_id = %flow.id, "run created");

        let progress = self.drive(&mut run, &graph, Step::Execute(first)).await?;
        Ok(FireOutcome::Started {
            flow_id: flow.id,
            run_id: run.id,
            progress,
        })
    }

    /// Continues a run from the state recorded in the ledger.
    ///
    /// Safe to call at any time: a terminal run is left alone and a wait
    /// that is not yet due is re-registered with the suspender.
    ///
    /// # Errors
    ///
    /// Returns an error if the run does not exist or its state cannot be read
    /// or recorded.
    #[instrument(skip(self))]
    pub async fn resume(&self, run_id: FlowRunId) -> Result<RunProgress, Report<EngineError>> {
        let mut run = self
            .ledger
            .get_run(run_id)
            .await
            .map_err(EngineError::Ledger)?
            .ok_or(EngineError::RunNotFound { run_id })?;
        if run.status.is_terminal() {
            return Ok(RunProgress::AlreadyFinished(run.status));
        }

        // A disabled flow still advances runs already in flight.
        let Some(flow) = self
            .graphs
            .get_flow(run.flow_id)
            .await
            .map_err(EngineError::Store)?
        else {
            return self.fail_run(&mut run, "flow no longer exists").await;
        };
        let Some(node_id) = run.current_action_node_id else {
            return self.fail_run(&mut run, "run has no current node").await;
        };
        let graph = flow.graph();

        // Only the attempt of the current visit counts. In a cycle, earlier
        // visits to the node have their own finished attempts.
        let current = match run.current_attempt_id {
            Some(attempt_id) => self
                .ledger
                .get_run_action(attempt_id)
                .await
                .map_err(EngineError::Ledger)?
                .filter(|attempt| attempt.node_id == node_id),
            None => None,
        };
        let step = match current {
            None => Step::Execute(node_id),
            Some(attempt) if attempt.is_suspended_wait() => {
                let resume_at = attempt.resume_at.unwrap_or_else(|| self.clock.now());
                let now = self.clock.now();
                if resume_at > now {
                    self.suspender
                        .sleep_until(run.id, node_id, resume_at)
                        .await
                        .map_err(EngineError::Suspend)?;
                    debug!(%resume_at, "wait not yet due");
                    return Ok(RunProgress::Suspended { resume_at });
                }
                let mut attempt = attempt;
                attempt.complete(None, now);
                self.ledger
                    .update_run_action(&attempt)
                    .await
                    .map_err(EngineError::Ledger)?;
                Step::WalkFrom {
                    node_id,
                    outcome: None,
                }
            }
            Some(attempt) => match attempt.status {
                ActionStatus::Completed | ActionStatus::Skipped => Step::WalkFrom {
                    node_id,
                    outcome: attempt.outcome,
                },
                ActionStatus::Failed => {
                    let error = attempt
                        .error
                        .unwrap_or_else(|| "action failed".to_string());
                    return self.fail_run(&mut run, error).await;
                }
                ActionStatus::Pending | ActionStatus::Running => {
                    warn!(%node_id, attempt = attempt.attempt, "re-executing interrupted attempt");
                    Step::Execute(node_id)
                }
            },
        };

        self.drive(&mut run, &graph, step).await
    }

    /// Resumes every run that is not terminal, as after a restart.
    ///
    /// Failures are logged per run and do not stop recovery of the others.
    ///
    /// # Errors
    ///
    /// Returns an error if the active runs cannot be listed.
    pub async fn recover_active(&self) -> Result<usize, Report<EngineError>> {
        let runs = self
            .ledger
            .list_active()
            .await
            .map_err(EngineError::Ledger)?;
        let count = runs.len();
        for run in runs {
            if let Err(error) = self.resume(run.id).await {
                warn!(run_id = %run.id, %error, "failed to recover run");
            }
        }
        info!(count, "recovered active runs");
        Ok(count)
    }

    async fn drive(
        &self,
        run: &mut FlowRun,
        graph: &FlowGraph,
        mut step: Step,
    ) -> Result<RunProgress, Report<EngineError>> {
        let mut executed = 0;
        loop {
            let node_id = match step {
                Step::Execute(node_id) => node_id,
                Step::WalkFrom { node_id, outcome } => match graph.next_node(node_id, outcome) {
                    Ok(Next::Node(next)) => next,
                    Ok(Next::Terminal) => {
                        run.complete(self.clock.now());
                        self.ledger
                            .update_run(run)
                            .await
                            .map_err(EngineError::Ledger)?;
                        info!(run_id = %run.id, "run completed");
                        return Ok(RunProgress::Completed);
                    }
                    Err(error) => return self.fail_run(run, error.to_string()).await,
                },
            };

            executed += 1;
            if executed > self.config.max_steps_per_advance {
                let error = DefinitionError::StepLimitExceeded {
                    limit: self.config.max_steps_per_advance,
                };
                return self.fail_run(run, error.to_string()).await;
            }

            let Some(action) = graph.action(node_id) else {
                let error = DefinitionError::UnknownNode { node_id };
                return self.fail_run(run, error.to_string()).await;
            };

            // The attempt is recorded before the run points at it. A crash in
            // between leaves the run on the previous node, which is walked
            // again on resume; the unused attempt stays pending.
            let now = self.clock.now();
            let attempt_number = self
                .ledger
                .latest_run_action(run.id, node_id)
                .await
                .map_err(EngineError::Ledger)?
                .map_or(1, |a| a.attempt + 1);
            let mut attempt =
                FlowRunAction::new(run.id, node_id, action.action_type(), attempt_number, now);
            self.ledger
                .create_run_action(&attempt)
                .await
                .map_err(EngineError::Ledger)?;
            run.point_at(node_id, attempt.id, now);
            self.ledger
                .update_run(run)
                .await
                .map_err(EngineError::Ledger)?;

            if !action.enabled {
                attempt.skip(ACTION_DISABLED, now);
                self.record(&attempt).await?;
                step = Step::WalkFrom {
                    node_id,
                    outcome: None,
                };
                continue;
            }

            attempt.start(now);
            self.record(&attempt).await?;

            match self.dispatcher.dispatch(action, run, now).await {
                Ok(ActionOutcome::Completed { outcome }) => {
                    attempt.complete(outcome, self.clock.now());
                    self.record(&attempt).await?;
                    step = Step::WalkFrom { node_id, outcome };
                }
                Ok(ActionOutcome::Skipped { reason }) => {
                    debug!(%node_id, %reason, "action skipped");
                    attempt.skip(reason, self.clock.now());
                    self.record(&attempt).await?;
                    step = Step::WalkFrom {
                        node_id,
                        outcome: None,
                    };
                }
                Ok(ActionOutcome::Suspend { resume_at }) => {
                    attempt.suspend_until(resume_at);
                    self.record(&attempt).await?;
                    self.suspender
                        .sleep_until(run.id, node_id, resume_at)
                        .await
                        .map_err(EngineError::Suspend)?;
                    info!(run_id = %run.id, %node_id, %resume_at, "run suspended");
                    return Ok(RunProgress::Suspended { resume_at });
                }
                Err(error) => {
                    let message = error.to_string();
                    attempt.fail(message.clone(), self.clock.now());
                    self.record(&attempt).await?;
                    return self.fail_run(run, message).await;
                }
            }
        }
    }

    async fn record(&self, attempt: &FlowRunAction) -> Result<(), Report<EngineError>> {
        self.ledger
            .update_run_action(attempt)
            .await
            .map_err(EngineError::Ledger)?;
        Ok(())
    }

    async fn fail_run(
        &self,
        run: &mut FlowRun,
        error: impl Into<String>,
    ) -> Result<RunProgress, Report<EngineError>> {
        let error = error.into();
        run.fail(error.clone(), self.clock.now());
        self.ledger
            .update_run(run)
            .await
            .map_err(EngineError::Ledger)?;
        warn!(run_id = %run.id, %error, "run failed");
        Ok(RunProgress::Failed { error })
    }
}
