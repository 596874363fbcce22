//! Edge types for flow graphs.
//!
//! An edge connects a source node to a target node and is either `simple`
//! (unconditional) or `boolean` (followed only when the source's outcome
//! matches the edge's value).

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// The type of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EdgeKind {
    /// Always followed.
    Simple,
    /// Followed when the source node's outcome equals `value`.
    Boolean { value: bool },
}

impl EdgeKind {
    /// Returns the boolean value carried by this edge, if any.
    #[must_use]
    pub fn boolean_value(self) -> Option<bool> {
        match self {
            Self::Simple => None,
            Self::Boolean { value } => Some(value),
        }
    }
}

/// A directed edge between two nodes of a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// The node this edge leaves.
    pub source: NodeId,
    /// The node this edge enters.
    pub target: NodeId,
    /// Edge type.
    #[serde(flatten)]
    pub kind: EdgeKind,
}

impl Edge {
    /// Creates an unconditional edge.
    #[must_use]
    pub fn simple(source: NodeId, target: NodeId) -> Self {
        Self {
            source,
            target,
            kind: EdgeKind::Simple,
        }
    }

    /// Creates a boolean edge followed when the source's outcome is `value`.
    #[must_use]
    pub fn boolean(source: NodeId, target: NodeId, value: bool) -> Self {
        Self {
            source,
            target,
            kind: EdgeKind::Boolean { value },
        }
    }
}
