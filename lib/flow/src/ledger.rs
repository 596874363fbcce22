//! The run ledger: durable storage of runs and attempts.
//!
//! The ledger is the only state the engine keeps. Everything needed to
//! resume a run after a restart is read back from here.

use crate::error::LedgerError;
use crate::node::NodeId;
use crate::run::{FlowRun, FlowRunAction};
use crate::trigger::RecipientKey;
use async_trait::async_trait;
use encore_core::{FlowId, FlowRunActionId, FlowRunId};

/// Storage of runs and their attempts.
///
/// Runs are updated compare-and-set on [`FlowRun::version`]: an update only
/// applies if the stored version equals the caller's, and bumps it.
#[async_trait]
pub trait RunLedger: Send + Sync {
    /// Inserts a new run.
    async fn create_run(&self, run: &FlowRun) -> Result<(), LedgerError>;

    /// Loads a run.
    async fn get_run(&self, run_id: FlowRunId) -> Result<Option<FlowRun>, LedgerError>;

    /// Writes a run if its stored version matches `run.version`.
    ///
    /// On success `run.version` is incremented to the newly stored version.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Conflict`] if the run was modified since read.
    async fn update_run(&self, run: &mut FlowRun) -> Result<(), LedgerError>;

    /// Lists every run of a flow for a recipient, oldest first.
    async fn find_runs(
        &self,
        flow_id: FlowId,
        recipient: RecipientKey,
    ) -> Result<Vec<FlowRun>, LedgerError>;

    /// Lists runs that are not in a terminal state.
    async fn list_active(&self) -> Result<Vec<FlowRun>, LedgerError>;

    /// Inserts a new attempt.
    async fn create_run_action(&self, action: &FlowRunAction) -> Result<(), LedgerError>;

    /// Overwrites an attempt.
    async fn update_run_action(&self, action: &FlowRunAction) -> Result<(), LedgerError>;

    /// Loads an attempt.
    async fn get_run_action(
        &self,
        action_id: FlowRunActionId,
    ) -> Result<Option<FlowRunAction>, LedgerError>;

    /// Returns the attempt with the highest attempt number for a node of a run.
    async fn latest_run_action(
        &self,
        run_id: FlowRunId,
        node_id: NodeId,
    ) -> Result<Option<FlowRunAction>, LedgerError>;

    /// Lists every attempt of a run in creation order.
    async fn list_run_actions(&self, run_id: FlowRunId)
    -> Result<Vec<FlowRunAction>, LedgerError>;
}
