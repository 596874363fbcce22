//! Run and attempt records.
//!
//! A `FlowRun` is one execution of a flow for one recipient. A
//! `FlowRunAction` is one attempt at one node of that run. Status only
//! moves forward: `pending → running → {completed | failed}` for runs and
//! `pending → running → {completed | skipped | failed}` for attempts.

use crate::node::{ActionType, NodeId};
use crate::trigger::{Recipient, TriggerKind};
use chrono::{DateTime, Utc};
use encore_core::{FlowId, FlowRunActionId, FlowRunId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// The status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    /// Created, not yet advanced.
    Pending,
    /// Advancing or suspended at a wait.
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns the stored name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored name, returning `None` for unknown statuses.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionStatus {
    Pending,
    /// Executing, or suspended at a wait until `resume_at`.
    Running,
    Completed,
    Skipped,
    Failed,
}

impl ActionStatus {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }

    /// Returns the stored name of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Parses a stored name, returning `None` for unknown statuses.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record of a single flow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRun {
    pub id: FlowRunId,
    pub flow_id: FlowId,
    pub workspace_id: WorkspaceId,
    /// The trigger node that started the run.
    pub trigger_node_id: NodeId,
    pub trigger_kind: TriggerKind,
    pub recipient: Recipient,
    /// The node in flight. Cleared when the run completes.
    pub current_action_node_id: Option<NodeId>,
    /// The attempt made at the node in flight on this visit. `None` until
    /// the first attempt of a new run is recorded.
    pub current_attempt_id: Option<FlowRunActionId>,
    pub status: RunStatus,
    pub error: Option<String>,
    /// Optimistic concurrency token, bumped by every ledger update.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl FlowRun {
    /// Creates a new pending run pointing at its first node.
    #[must_use]
    pub fn new(
        flow_id: FlowId,
        workspace_id: WorkspaceId,
        trigger_node_id: NodeId,
        trigger_kind: TriggerKind,
        recipient: Recipient,
        first_node: NodeId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FlowRunId::new(),
            flow_id,
            workspace_id,
            trigger_node_id,
            trigger_kind,
            recipient,
            current_action_node_id: Some(first_node),
            current_attempt_id: None,
            status: RunStatus::Pending,
            error: None,
            version: 0,
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        }
    }

    /// Moves the run to a new attempt at a node, marking it running.
    pub fn point_at(&mut self, node_id: NodeId, attempt_id: FlowRunActionId, now: DateTime<Utc>) {
        self.current_action_node_id = Some(node_id);
        self.current_attempt_id = Some(attempt_id);
        self.start(now);
    }

    /// Marks the run as running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
        self.status = RunStatus::Running;
        self.updated_at = now;
    }

    /// Marks the run as completed and clears the node pointer.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.status = RunStatus::Completed;
        self.current_action_node_id = None;
        self.current_attempt_id = None;
        self.finished_at = Some(now);
        self.updated_at = now;
    }

    /// Marks the run as failed, keeping the pointer at the failing node.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(now);
        self.updated_at = now;
    }
}

/// A record of one attempt at one node of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRunAction {
    pub id: FlowRunActionId,
    pub run_id: FlowRunId,
    pub node_id: NodeId,
    pub action_type: ActionType,
    /// 1-based count of attempts at this node within the run.
    pub attempt: u32,
    pub status: ActionStatus,
    /// The boolean result of a completed `boolean` attempt.
    pub outcome: Option<bool>,
    /// When a suspended `wait` attempt becomes due.
    pub resume_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub skipped_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl FlowRunAction {
    /// Creates a new pending attempt.
    #[must_use]
    pub fn new(
        run_id: FlowRunId,
        node_id: NodeId,
        action_type: ActionType,
        attempt: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: FlowRunActionId::new(),
            run_id,
            node_id,
            action_type,
            attempt,
            status: ActionStatus::Pending,
            outcome: None,
            resume_at: None,
            error: None,
            skipped_reason: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    /// Marks the attempt as running.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = ActionStatus::Running;
        self.started_at = Some(now);
    }

    /// Leaves the attempt running until `resume_at`.
    pub fn suspend_until(&mut self, resume_at: DateTime<Utc>) {
        self.status = ActionStatus::Running;
        self.resume_at = Some(resume_at);
    }

    /// Marks the attempt as completed.
    pub fn complete(&mut self, outcome: Option<bool>, now: DateTime<Utc>) {
        self.status = ActionStatus::Completed;
        self.outcome = outcome;
        self.completed_at = Some(now);
    }

    /// Marks the attempt as skipped.
    pub fn skip(&mut self, reason: impl Into<String>, now: DateTime<Utc>) {
        self.status = ActionStatus::Skipped;
        self.skipped_reason = Some(reason.into());
        self.completed_at = Some(now);
    }

    /// Marks the attempt as failed.
    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) {
        self.status = ActionStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(now);
    }

    /// Whether this attempt is a wait suspended until a point in time.
    #[must_use]
    pub fn is_suspended_wait(&self) -> bool {
        self.action_type == ActionType::Wait
            && self.status == ActionStatus::Running
            && self.resume_at.is_some()
    }
}
