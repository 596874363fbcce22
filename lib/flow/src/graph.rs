//! Flow graph traversal using petgraph.
//!
//! A flow graph is a directed graph whose nodes are the trigger and the
//! actions and whose edges are `simple` or `boolean`. Every node has either
//! no out-edges (terminal), exactly one simple out-edge, or exactly two
//! boolean out-edges carrying `true` and `false`. Cycles are permitted.
//!
//! Traversal is lazy: [`FlowGraph::next_node`] only checks the edges of the
//! node being left. [`FlowGraph::validate`] applies the same rules to every
//! node up front.

use crate::definition::Flow;
use crate::edge::EdgeKind;
use crate::error::DefinitionError;
use crate::node::{Action, ActionKind, BooleanCondition, NodeId};
use crate::trigger::Trigger;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// A node in the traversal graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphNode {
    Trigger(Trigger),
    Action(Action),
    /// An id referenced by an edge but absent from the flow.
    Missing(NodeId),
}

impl GraphNode {
    /// Returns the node's id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        match self {
            Self::Trigger(t) => t.id,
            Self::Action(a) => a.id,
            Self::Missing(id) => *id,
        }
    }
}

/// Where the walk goes after a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    /// Continue with the given node.
    Node(NodeId),
    /// The node has no out-edges; the run is complete.
    Terminal,
}

/// The shape of a node's out-edges once checked against the edge model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutEdges {
    None,
    Simple(NodeId),
    Branch { on_true: NodeId, on_false: NodeId },
}

/// The traversal graph of a flow.
#[derive(Debug, Clone)]
pub struct FlowGraph {
    graph: DiGraph<GraphNode, EdgeKind>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
    trigger: NodeIndex,
    duplicates: Vec<NodeId>,
}

impl FlowGraph {
    /// Builds the graph of a flow.
    ///
    /// Building never fails: ids referenced by edges but absent from the flow
    /// become [`GraphNode::Missing`] placeholders, and duplicate node ids are
    /// remembered, so that errors surface during traversal or validation.
    #[must_use]
    pub fn from_flow(flow: &Flow) -> Self {
        let mut graph = DiGraph::new();
        let mut node_index_map = HashMap::new();
        let mut duplicates = Vec::new();

        let trigger = graph.add_node(GraphNode::Trigger(flow.trigger.clone()));
        node_index_map.insert(flow.trigger.id, trigger);

        for action in &flow.actions {
            if node_index_map.contains_key(&action.id) {
                duplicates.push(action.id);
                continue;
            }
            let index = graph.add_node(GraphNode::Action(action.clone()));
            node_index_map.insert(action.id, index);
        }

        for edge in &flow.edges {
            let source = *node_index_map
                .entry(edge.source)
                .or_insert_with(|| graph.add_node(GraphNode::Missing(edge.source)));
            let target = *node_index_map
                .entry(edge.target)
                .or_insert_with(|| graph.add_node(GraphNode::Missing(edge.target)));
            graph.add_edge(source, target, edge.kind);
        }

        Self {
            graph,
            node_index_map,
            trigger,
            duplicates,
        }
    }

    /// Returns the trigger's node id.
    #[must_use]
    pub fn trigger_id(&self) -> NodeId {
        self.graph[self.trigger].id()
    }

    /// Returns the action with the given id.
    #[must_use]
    pub fn action(&self, node_id: NodeId) -> Option<&Action> {
        let index = self.node_index_map.get(&node_id)?;
        match &self.graph[*index] {
            GraphNode::Action(action) => Some(action),
            GraphNode::Trigger(_) | GraphNode::Missing(_) => None,
        }
    }

    /// Returns the number of nodes, including missing placeholders.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the first node after the trigger.
    ///
    /// # Errors
    ///
    /// Returns an error if the trigger's out-edges violate the edge model.
    pub fn first_node(&self) -> Result<Next, DefinitionError> {
        self.next_node(self.trigger_id(), None)
    }

    /// Returns the node that follows `current`.
    ///
    /// `outcome` is the boolean result of `current`, if it produced one. It is
    /// required when `current` has boolean out-edges and ignored otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if `current` is not in the flow, its out-edges violate
    /// the edge model, or it branches and `outcome` is `None`.
    pub fn next_node(
        &self,
        current: NodeId,
        outcome: Option<bool>,
    ) -> Result<Next, DefinitionError> {
        let index = self.index_of(current)?;
        match self.out_edges(index)? {
            OutEdges::None => Ok(Next::Terminal),
            OutEdges::Simple(target) => Ok(Next::Node(target)),
            OutEdges::Branch { on_true, on_false } => match outcome {
                Some(true) => Ok(Next::Node(on_true)),
                Some(false) => Ok(Next::Node(on_false)),
                None => Err(DefinitionError::MissingOutcome { node_id: current }),
            },
        }
    }

    /// Checks every node of the flow against the edge model.
    ///
    /// On top of the traversal rules this rejects duplicate node ids, edges
    /// leaving unknown nodes, branches on nodes other than enabled boolean
    /// actions and boolean actions without their required fields.
    ///
    /// # Errors
    ///
    /// Returns the first definition error found.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if let Some(node_id) = self.duplicates.first() {
            return Err(DefinitionError::DuplicateNode { node_id: *node_id });
        }

        for index in self.graph.node_indices() {
            let node = &self.graph[index];
            if let GraphNode::Missing(node_id) = node {
                if self
                    .graph
                    .edges_directed(index, Direction::Outgoing)
                    .next()
                    .is_some()
                {
                    return Err(DefinitionError::UnknownNode { node_id: *node_id });
                }
                continue;
            }

            let branches = matches!(self.out_edges(index)?, OutEdges::Branch { .. });
            match node {
                GraphNode::Action(Action {
                    id,
                    enabled: true,
                    kind: ActionKind::Boolean { condition },
                    ..
                }) => {
                    if let BooleanCondition::HasOrderedAmount {
                        total_order_amount: None,
                    } = condition
                    {
                        return Err(DefinitionError::MissingField {
                            node_id: *id,
                            field: "totalOrderAmount",
                        });
                    }
                }
                GraphNode::Action(_) | GraphNode::Trigger(_) if branches => {
                    return Err(DefinitionError::BranchWithoutCondition { node_id: node.id() });
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn index_of(&self, node_id: NodeId) -> Result<NodeIndex, DefinitionError> {
        match self.node_index_map.get(&node_id) {
            Some(index) if !matches!(self.graph[*index], GraphNode::Missing(_)) => Ok(*index),
            _ => Err(DefinitionError::UnknownNode { node_id }),
        }
    }

    fn out_edges(&self, index: NodeIndex) -> Result<OutEdges, DefinitionError> {
        let node_id = self.graph[index].id();
        let mut edges = Vec::new();
        for edge in self.graph.edges_directed(index, Direction::Outgoing) {
            let target = &self.graph[edge.target()];
            match target {
                GraphNode::Missing(target) => {
                    return Err(DefinitionError::DanglingTarget {
                        node_id,
                        target: *target,
                    });
                }
                GraphNode::Trigger(_) => {
                    return Err(DefinitionError::EdgeIntoTrigger { node_id });
                }
                GraphNode::Action(action) => edges.push((*edge.weight(), action.id)),
            }
        }

        match edges.as_slice() {
            [] => Ok(OutEdges::None),
            [(EdgeKind::Simple, target)] => Ok(OutEdges::Simple(*target)),
            [(EdgeKind::Boolean { .. }, _)] => Err(DefinitionError::LoneBooleanEdge { node_id }),
            [
                (EdgeKind::Boolean { value: a }, first),
                (EdgeKind::Boolean { value: b }, second),
            ] => match (a, b) {
                (true, false) => Ok(OutEdges::Branch {
                    on_true: *first,
                    on_false: *second,
                }),
                (false, true) => Ok(OutEdges::Branch {
                    on_true: *second,
                    on_false: *first,
                }),
                _ => Err(DefinitionError::NonComplementaryBranches { node_id }),
            },
            [(EdgeKind::Simple, _), (EdgeKind::Simple, _)] => {
                Err(DefinitionError::TooManyEdges { node_id, count: 2 })
            }
            [_, _] => Err(DefinitionError::MixedEdgeTypes { node_id }),
            _ => Err(DefinitionError::TooManyEdges {
                node_id,
                count: edges.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Edge;
    use crate::node::WaitUnit;
    use crate::trigger::TriggerConfig;
    use encore_core::WorkspaceId;

    fn flow() -> Flow {
        Flow::new(
            WorkspaceId::new(),
            "Test",
            Trigger::new(TriggerConfig::NewFan),
        )
    }

    fn empty(flow: &mut Flow, name: &str) -> NodeId {
        flow.add_action(Action::new(name, ActionKind::Empty))
    }

    fn boolean(flow: &mut Flow) -> NodeId {
        flow.add_action(Action::new(
            "Ordered?",
            ActionKind::Boolean {
                condition: BooleanCondition::HasOrderedCart {
                    cart_funnel_id: None,
                },
            },
        ))
    }

    #[test]
    fn straight_line_traversal() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        let b = flow.add_action(Action::new(
            "b",
            ActionKind::Wait {
                wait_for: 1,
                wait_for_units: WaitUnit::Days,
            },
        ));
        flow.connect(Edge::simple(flow.trigger.id, a));
        flow.connect(Edge::simple(a, b));

        let graph = flow.graph();
        assert_eq!(graph.first_node().unwrap(), Next::Node(a));
        assert_eq!(graph.next_node(a, None).unwrap(), Next::Node(b));
        assert_eq!(graph.next_node(b, None).unwrap(), Next::Terminal);
        graph.validate().unwrap();
    }

    #[test]
    fn simple_edge_ignores_outcome() {
        let mut flow = flow();
        let a = boolean(&mut flow);
        let b = empty(&mut flow, "b");
        flow.connect(Edge::simple(a, b));

        assert_eq!(flow.graph().next_node(a, Some(false)).unwrap(), Next::Node(b));
    }

    #[test]
    fn branch_follows_outcome() {
        let mut flow = flow();
        let check = boolean(&mut flow);
        let yes = empty(&mut flow, "yes");
        let no = empty(&mut flow, "no");
        flow.connect(Edge::simple(flow.trigger.id, check));
        flow.connect(Edge::boolean(check, no, false));
        flow.connect(Edge::boolean(check, yes, true));

        let graph = flow.graph();
        assert_eq!(graph.next_node(check, Some(true)).unwrap(), Next::Node(yes));
        assert_eq!(graph.next_node(check, Some(false)).unwrap(), Next::Node(no));
        graph.validate().unwrap();
    }

    #[test]
    fn branch_without_outcome_is_error() {
        let mut flow = flow();
        let check = boolean(&mut flow);
        let yes = empty(&mut flow, "yes");
        let no = empty(&mut flow, "no");
        flow.connect(Edge::boolean(check, yes, true));
        flow.connect(Edge::boolean(check, no, false));

        assert_eq!(
            flow.graph().next_node(check, None),
            Err(DefinitionError::MissingOutcome { node_id: check })
        );
    }

    #[test]
    fn duplicate_boolean_values_are_rejected() {
        let mut flow = flow();
        let check = boolean(&mut flow);
        let yes = empty(&mut flow, "yes");
        let also_yes = empty(&mut flow, "also yes");
        flow.connect(Edge::boolean(check, yes, true));
        flow.connect(Edge::boolean(check, also_yes, true));

        assert_eq!(
            flow.graph().next_node(check, Some(true)),
            Err(DefinitionError::NonComplementaryBranches { node_id: check })
        );
    }

    #[test]
    fn three_edges_are_rejected() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        for name in ["x", "y", "z"] {
            let target = empty(&mut flow, name);
            flow.connect(Edge::simple(a, target));
        }

        assert_eq!(
            flow.graph().next_node(a, None),
            Err(DefinitionError::TooManyEdges {
                node_id: a,
                count: 3
            })
        );
    }

    #[test]
    fn lone_boolean_edge_is_rejected() {
        let mut flow = flow();
        let check = boolean(&mut flow);
        let yes = empty(&mut flow, "yes");
        flow.connect(Edge::boolean(check, yes, true));

        assert_eq!(
            flow.graph().next_node(check, Some(true)),
            Err(DefinitionError::LoneBooleanEdge { node_id: check })
        );
    }

    #[test]
    fn mixed_edges_are_rejected() {
        let mut flow = flow();
        let check = boolean(&mut flow);
        let a = empty(&mut flow, "a");
        let b = empty(&mut flow, "b");
        flow.connect(Edge::boolean(check, a, true));
        flow.connect(Edge::simple(check, b));

        assert_eq!(
            flow.graph().next_node(check, Some(true)),
            Err(DefinitionError::MixedEdgeTypes { node_id: check })
        );
    }

    #[test]
    fn dangling_target_is_rejected() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        let ghost = NodeId::new();
        flow.connect(Edge::simple(a, ghost));

        let graph = flow.graph();
        assert_eq!(
            graph.next_node(a, None),
            Err(DefinitionError::DanglingTarget {
                node_id: a,
                target: ghost
            })
        );
        assert_eq!(
            graph.next_node(ghost, None),
            Err(DefinitionError::UnknownNode { node_id: ghost })
        );
    }

    #[test]
    fn edge_into_trigger_is_rejected() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        flow.connect(Edge::simple(flow.trigger.id, a));
        flow.connect(Edge::simple(a, flow.trigger.id));

        assert_eq!(
            flow.graph().validate(),
            Err(DefinitionError::EdgeIntoTrigger { node_id: a })
        );
    }

    #[test]
    fn empty_flow_has_no_first_node() {
        assert_eq!(flow().graph().first_node().unwrap(), Next::Terminal);
    }

    #[test]
    fn cycles_are_allowed() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        let b = empty(&mut flow, "b");
        flow.connect(Edge::simple(flow.trigger.id, a));
        flow.connect(Edge::simple(a, b));
        flow.connect(Edge::simple(b, a));

        let graph = flow.graph();
        graph.validate().unwrap();
        assert_eq!(graph.next_node(b, None).unwrap(), Next::Node(a));
    }

    #[test]
    fn validate_rejects_branch_on_non_boolean() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        let yes = empty(&mut flow, "yes");
        let no = empty(&mut flow, "no");
        flow.connect(Edge::boolean(a, yes, true));
        flow.connect(Edge::boolean(a, no, false));

        assert_eq!(
            flow.graph().validate(),
            Err(DefinitionError::BranchWithoutCondition { node_id: a })
        );
    }

    #[test]
    fn validate_rejects_branch_on_disabled_boolean() {
        let mut flow = flow();
        let check = flow.add_action(
            Action::new(
                "Ordered?",
                ActionKind::Boolean {
                    condition: BooleanCondition::HasOrderedProduct { product_id: None },
                },
            )
            .disabled(),
        );
        let yes = empty(&mut flow, "yes");
        let no = empty(&mut flow, "no");
        flow.connect(Edge::boolean(check, yes, true));
        flow.connect(Edge::boolean(check, no, false));

        assert_eq!(
            flow.graph().validate(),
            Err(DefinitionError::BranchWithoutCondition { node_id: check })
        );
    }

    #[test]
    fn validate_requires_amount_threshold() {
        let mut flow = flow();
        let check = flow.add_action(Action::new(
            "Spent?",
            ActionKind::Boolean {
                condition: BooleanCondition::HasOrderedAmount {
                    total_order_amount: None,
                },
            },
        ));

        assert_eq!(
            flow.graph().validate(),
            Err(DefinitionError::MissingField {
                node_id: check,
                field: "totalOrderAmount"
            })
        );
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        flow.add_action(Action::with_id(a, "copy", ActionKind::Empty));

        assert_eq!(
            flow.graph().validate(),
            Err(DefinitionError::DuplicateNode { node_id: a })
        );
    }

    #[test]
    fn validate_rejects_edges_from_unknown_nodes() {
        let mut flow = flow();
        let a = empty(&mut flow, "a");
        let ghost = NodeId::new();
        flow.connect(Edge::simple(ghost, a));

        assert_eq!(
            flow.graph().validate(),
            Err(DefinitionError::UnknownNode { node_id: ghost })
        );
    }
}
