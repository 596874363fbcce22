//! Error types for the flow crate.
//!
//! Collaborator traits return the plain domain errors below; the engine's
//! public operations wrap them into `Report<EngineError>`.
//!
//! - `DefinitionError`: malformed topology or missing required field. Fatal
//!   for a run, never retried.
//! - `ConditionError` / `ActionError`: a node could not be executed. Recorded
//!   on the attempt and terminal for the run.
//! - `LedgerError` / `StoreError` / `SuspendError`: the engine could not read
//!   or record state and stops advancing the run.

use crate::node::NodeId;
use encore_core::{FanId, FlowId, FlowRunId};
use std::fmt;

/// Errors in a flow's definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// A node has a single out-edge and it is a boolean edge.
    LoneBooleanEdge { node_id: NodeId },
    /// A node's two boolean edges do not carry exactly `{true, false}`.
    NonComplementaryBranches { node_id: NodeId },
    /// A node's out-edges mix simple and boolean edges.
    MixedEdgeTypes { node_id: NodeId },
    /// A node has more out-edges than the edge model allows.
    TooManyEdges { node_id: NodeId, count: usize },
    /// A branching node produced no outcome to choose an edge with.
    MissingOutcome { node_id: NodeId },
    /// An edge targets a node that is not in the flow.
    DanglingTarget { node_id: NodeId, target: NodeId },
    /// An edge targets the trigger node.
    EdgeIntoTrigger { node_id: NodeId },
    /// The node is not part of the flow.
    UnknownNode { node_id: NodeId },
    /// Two nodes of the flow share an id.
    DuplicateNode { node_id: NodeId },
    /// A required configuration field is absent.
    MissingField {
        node_id: NodeId,
        field: &'static str,
    },
    /// Boolean out-edges on a node that cannot produce an outcome.
    BranchWithoutCondition { node_id: NodeId },
    /// The run visited more nodes in one advance than allowed.
    StepLimitExceeded { limit: usize },
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoneBooleanEdge { node_id } => {
                write!(f, "node {node_id} has a single boolean out-edge")
            }
            Self::NonComplementaryBranches { node_id } => {
                write!(
                    f,
                    "boolean edges of node {node_id} must carry exactly true and false"
                )
            }
            Self::MixedEdgeTypes { node_id } => {
                write!(f, "node {node_id} mixes simple and boolean out-edges")
            }
            Self::TooManyEdges { node_id, count } => {
                write!(f, "node {node_id} has {count} out-edges")
            }
            Self::MissingOutcome { node_id } => {
                write!(f, "node {node_id} branches but produced no outcome")
            }
            Self::DanglingTarget { node_id, target } => {
                write!(f, "edge from {node_id} targets unknown node {target}")
            }
            Self::EdgeIntoTrigger { node_id } => {
                write!(f, "edge from {node_id} targets the trigger")
            }
            Self::UnknownNode { node_id } => write!(f, "node not found: {node_id}"),
            Self::DuplicateNode { node_id } => write!(f, "duplicate node id: {node_id}"),
            Self::MissingField { node_id, field } => {
                write!(f, "node {node_id} is missing required field '{field}'")
            }
            Self::BranchWithoutCondition { node_id } => {
                write!(
                    f,
                    "node {node_id} has boolean out-edges but is not an enabled boolean action"
                )
            }
            Self::StepLimitExceeded { limit } => {
                write!(f, "run exceeded {limit} steps without suspending")
            }
        }
    }
}

impl std::error::Error for DefinitionError {}

/// Errors from storage-backed collaborators (graph, contact, template and order stores).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store failed.
    Storage { message: String },
    /// A stored record could not be decoded.
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { message } => write!(f, "store failure: {message}"),
            Self::Corrupt { entity, id, reason } => {
                write!(f, "corrupt {entity} record {id}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from the run ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The backing store failed.
    Storage { message: String },
    /// The run was updated by another writer since it was read.
    Conflict {
        run_id: FlowRunId,
        expected_version: i64,
    },
    /// The record to update does not exist.
    NotFound { entity: &'static str, id: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { message } => write!(f, "ledger failure: {message}"),
            Self::Conflict {
                run_id,
                expected_version,
            } => write!(
                f,
                "run {run_id} was modified concurrently (expected version {expected_version})"
            ),
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
        }
    }
}

impl std::error::Error for LedgerError {}

/// Errors registering a durable wakeup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspendError {
    Storage { message: String },
}

impl fmt::Display for SuspendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Storage { message } => write!(f, "failed to register wakeup: {message}"),
        }
    }
}

impl std::error::Error for SuspendError {}

/// Errors reported by external providers (email sender, audience sync, asset resolver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered with a rejection.
    Rejected { status: u16, message: String },
    /// The request did not complete.
    Transport { message: String },
    /// The provider's response could not be understood.
    InvalidResponse { message: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status, message } => {
                write!(f, "rejected with status {status}: {message}")
            }
            Self::Transport { message } => write!(f, "request failed: {message}"),
            Self::InvalidResponse { message } => write!(f, "invalid response: {message}"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Errors evaluating a boolean condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The run has no fan to evaluate the condition for.
    MissingRecipient,
    /// The order ledger could not be read.
    Ledger(StoreError),
    /// The condition is missing a required field.
    Definition(DefinitionError),
    /// The fan's completed orders sum past `i64::MAX`.
    AmountOverflow { fan_id: FanId },
}

impl fmt::Display for ConditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRecipient => write!(f, "condition requires a fan recipient"),
            Self::Ledger(e) => write!(f, "order lookup failed: {e}"),
            Self::Definition(e) => write!(f, "{e}"),
            Self::AmountOverflow { fan_id } => {
                write!(f, "order total for fan {fan_id} overflows")
            }
        }
    }
}

impl std::error::Error for ConditionError {}

/// Errors executing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    /// The action's configuration is invalid.
    Definition(DefinitionError),
    /// The action's condition could not be evaluated.
    Condition(ConditionError),
    /// An external provider failed to deliver the side effect.
    Delivery {
        provider: &'static str,
        message: String,
    },
    /// The action cannot run (missing template, fan or account).
    Failed { reason: String },
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Definition(e) => write!(f, "{e}"),
            Self::Condition(e) => write!(f, "{e}"),
            Self::Delivery { provider, message } => {
                write!(f, "{provider} delivery failed: {message}")
            }
            Self::Failed { reason } => f.write_str(reason),
        }
    }
}

impl std::error::Error for ActionError {}

impl From<DefinitionError> for ActionError {
    fn from(e: DefinitionError) -> Self {
        Self::Definition(e)
    }
}

impl From<ConditionError> for ActionError {
    fn from(e: ConditionError) -> Self {
        Self::Condition(e)
    }
}

impl From<StoreError> for ActionError {
    fn from(e: StoreError) -> Self {
        Self::Failed {
            reason: e.to_string(),
        }
    }
}

/// Errors surfaced by the engine's public operations.
///
/// Failures of a node (definition, condition and action errors) are written
/// to the ledger and reported as a failed run, not as an `EngineError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The flow does not exist.
    FlowNotFound { flow_id: FlowId },
    /// The run does not exist.
    RunNotFound { run_id: FlowRunId },
    /// The run ledger failed.
    Ledger(LedgerError),
    /// A graph, contact or template store failed.
    Store(StoreError),
    /// A wakeup could not be registered.
    Suspend(SuspendError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FlowNotFound { flow_id } => write!(f, "flow not found: {flow_id}"),
            Self::RunNotFound { run_id } => write!(f, "run not found: {run_id}"),
            Self::Ledger(e) => write!(f, "run ledger error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Suspend(e) => write!(f, "suspend error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        Self::Ledger(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<SuspendError> for EngineError {
    fn from(e: SuspendError) -> Self {
        Self::Suspend(e)
    }
}
