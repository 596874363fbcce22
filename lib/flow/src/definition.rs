//! Flow definition types.
//!
//! A flow is a named automation owned by a workspace: one trigger, a set of
//! actions and the edges between them. Flows are read-only to the engine.

use crate::edge::Edge;
use crate::graph::FlowGraph;
use crate::node::{Action, NodeId};
use crate::trigger::Trigger;
use chrono::{DateTime, Utc};
use encore_core::{FlowId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// A complete flow definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub id: FlowId,
    pub workspace_id: WorkspaceId,
    /// Human-readable name.
    pub name: String,
    /// A disabled flow starts no new runs. In-flight runs keep advancing.
    pub enabled: bool,
    pub trigger: Trigger,
    pub actions: Vec<Action>,
    pub edges: Vec<Edge>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flow {
    /// Creates a new enabled flow with no actions.
    #[must_use]
    pub fn new(workspace_id: WorkspaceId, name: impl Into<String>, trigger: Trigger) -> Self {
        let now = Utc::now();
        Self {
            id: FlowId::new(),
            workspace_id,
            name: name.into(),
            enabled: true,
            trigger,
            actions: Vec::new(),
            edges: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Adds an action, returning its node id.
    pub fn add_action(&mut self, action: Action) -> NodeId {
        let id = action.id;
        self.actions.push(action);
        id
    }

    /// Adds an edge.
    pub fn connect(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Returns the action with the given node id.
    #[must_use]
    pub fn action(&self, node_id: NodeId) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == node_id)
    }

    /// Builds the traversal graph for this flow.
    #[must_use]
    pub fn graph(&self) -> FlowGraph {
        FlowGraph::from_flow(self)
    }
}
