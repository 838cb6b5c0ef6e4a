//! Routing graph implementation using petgraph.
//!
//! Stages are nodes; edges are labelled with the [`Route`] that selects
//! them. The interpreter never inspects stage results to decide where to
//! go: it asks the graph for the edge matching the route a stage reported.

use crate::edge::Route;
use crate::error::GraphError;
use crate::stage::StageId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// Edges of the support workflow.
pub const SUPPORT_ROUTES: [(StageId, StageId, Route); 3] = [
    (StageId::Triage, StageId::KnowledgeMatch, Route::Next),
    (StageId::KnowledgeMatch, StageId::Resolution, Route::Resolve),
    (StageId::KnowledgeMatch, StageId::Escalation, Route::Escalate),
];

/// The stage topology.
#[derive(Debug, Clone)]
pub struct RoutingGraph {
    graph: DiGraph<StageId, Route>,
    index: HashMap<StageId, NodeIndex>,
}

impl RoutingGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a graph from `(from, to, route)` edges. Stages are added the
    /// first time an edge mentions them.
    #[must_use]
    pub fn from_routes(routes: &[(StageId, StageId, Route)]) -> Self {
        let mut graph = Self::new();
        for &(from, to, route) in routes {
            let source = graph.add_stage(from);
            let target = graph.add_stage(to);
            graph.graph.add_edge(source, target, route);
        }
        graph
    }

    /// The support topology:
    /// Triage → KnowledgeMatch → Resolution | Escalation.
    #[must_use]
    pub fn support_topology() -> Self {
        Self::from_routes(&SUPPORT_ROUTES)
    }

    fn add_stage(&mut self, stage: StageId) -> NodeIndex {
        if let Some(&index) = self.index.get(&stage) {
            return index;
        }
        let index = self.graph.add_node(stage);
        self.index.insert(stage, index);
        index
    }

    fn node(&self, stage: StageId) -> Result<NodeIndex, GraphError> {
        self.index
            .get(&stage)
            .copied()
            .ok_or(GraphError::StageNotFound { stage })
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the stages in insertion order.
    pub fn stages(&self) -> impl Iterator<Item = StageId> + '_ {
        self.graph.node_weights().copied()
    }

    /// Returns stages with no incoming edges.
    #[must_use]
    pub fn entry_stages(&self) -> Vec<StageId> {
        self.stages_without(Direction::Incoming)
    }

    /// Returns stages with no outgoing edges.
    #[must_use]
    pub fn terminal_stages(&self) -> Vec<StageId> {
        self.stages_without(Direction::Outgoing)
    }

    fn stages_without(&self, direction: Direction) -> Vec<StageId> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.edges_directed(idx, direction).next().is_none())
            .filter_map(|idx| self.graph.node_weight(idx).copied())
            .collect()
    }

    /// Returns the single entry stage.
    ///
    /// # Errors
    ///
    /// Returns `EntryCount` unless exactly one stage has no incoming edges.
    pub fn entry(&self) -> Result<StageId, GraphError> {
        match self.entry_stages().as_slice() {
            [entry] => Ok(*entry),
            entries => Err(GraphError::EntryCount {
                count: entries.len(),
            }),
        }
    }

    /// Looks up where `route` leads from `stage`.
    ///
    /// # Errors
    ///
    /// Returns `StageNotFound` for an unknown stage and `NoRoute` if the
    /// stage has no edge with that label.
    pub fn next(&self, stage: StageId, route: Route) -> Result<StageId, GraphError> {
        let index = self.node(stage)?;
        self.graph
            .edges_directed(index, Direction::Outgoing)
            .find(|edge| *edge.weight() == route)
            .and_then(|edge| self.graph.node_weight(edge.target()).copied())
            .ok_or(GraphError::NoRoute { stage, route })
    }

    /// Validates the graph.
    ///
    /// Checks:
    /// - Exactly one entry stage
    /// - No cycles
    /// - No stage has two outgoing edges with the same route
    ///
    /// # Errors
    ///
    /// Returns an error describing the first validation failure.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.entry()?;

        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(GraphError::CycleDetected);
        }

        for index in self.graph.node_indices() {
            let mut seen = HashSet::new();
            for edge in self.graph.edges_directed(index, Direction::Outgoing) {
                if !seen.insert(*edge.weight()) {
                    return Err(GraphError::DuplicateRoute {
                        stage: self.graph[index],
                        route: *edge.weight(),
                    });
                }
            }
        }

        Ok(())
    }
}

impl Default for RoutingGraph {
    fn default() -> Self {
        Self::new()
    }
}
