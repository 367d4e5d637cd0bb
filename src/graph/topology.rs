//! The deliberation graph as data.
//!
//! The node/edge set is built from the configured role list at startup and
//! executed by the engine; nothing about the roles is hard-coded. Topology:
//!
//! ```text
//! START → fanout → role_1..role_n (parallel) → controller → fanout | END
//! ```
//!
//! The back-edge `controller → fanout` and the edge `controller → END` are
//! both present; the routing function picks one after each controller pass.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

/// What a node does when scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Start,
    /// Broadcast point: snapshots history and fans out to every role.
    Fanout,
    /// One evaluator, bound to the named role.
    Role(String),
    /// Barrier + decision point.
    Controller,
    End,
}

/// The static deliberation topology.
#[derive(Debug)]
pub struct DeliberationTopology {
    graph: DiGraph<NodeKind, ()>,
    start: NodeIndex,
    fanout: NodeIndex,
    controller: NodeIndex,
    end: NodeIndex,
    node_by_role: HashMap<String, NodeIndex>,
}

impl DeliberationTopology {
    /// Builds the topology for the given role list.
    pub fn build(roles: &[String]) -> Self {
        let mut graph = DiGraph::new();
        let start = graph.add_node(NodeKind::Start);
        let fanout = graph.add_node(NodeKind::Fanout);
        let controller = graph.add_node(NodeKind::Controller);
        let end = graph.add_node(NodeKind::End);

        graph.add_edge(start, fanout, ());

        let mut node_by_role = HashMap::with_capacity(roles.len());
        for role in roles {
            let node = graph.add_node(NodeKind::Role(role.clone()));
            graph.add_edge(fanout, node, ());
            graph.add_edge(node, controller, ());
            node_by_role.insert(role.clone(), node);
        }

        // Conditional pair: loop back for another round, or terminate.
        graph.add_edge(controller, fanout, ());
        graph.add_edge(controller, end, ());

        Self {
            graph,
            start,
            fanout,
            controller,
            end,
            node_by_role,
        }
    }

    /// Role names in fan-out order, derived from the graph itself.
    pub fn roles(&self) -> Vec<&str> {
        // Neighbor iteration order in petgraph is reverse insertion order;
        // sort by node index to recover the configured order.
        let mut nodes: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(self.fanout, Direction::Outgoing)
            .collect();
        nodes.sort();
        nodes
            .into_iter()
            .filter_map(|n| match &self.graph[n] {
                NodeKind::Role(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of role nodes.
    pub fn role_count(&self) -> usize {
        self.node_by_role.len()
    }

    /// Whether `role` has a node in this topology.
    pub fn has_role(&self, role: &str) -> bool {
        self.node_by_role.contains_key(role)
    }

    /// Structural self-check: every role node sits between fanout and
    /// controller, and the controller's conditional pair is intact.
    pub fn is_well_formed(&self) -> bool {
        let role_ok = self.node_by_role.values().all(|&node| {
            self.graph.contains_edge(self.fanout, node)
                && self.graph.contains_edge(node, self.controller)
        });
        role_ok
            && self.graph.contains_edge(self.start, self.fanout)
            && self.graph.contains_edge(self.controller, self.fanout)
            && self.graph.contains_edge(self.controller, self.end)
    }
}
