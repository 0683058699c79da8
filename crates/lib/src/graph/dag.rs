//! Dependency DAG over the targets that take part in hashing.
//!
//! Edges point from a dependency to its dependent, so a topological order
//! visits dependencies first and the Kahn levels of the graph form the waves
//! that can be hashed concurrently.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};

use super::GraphError;
use super::types::{Graph, TargetId};

pub struct HashDag {
  graph: DiGraph<TargetId, ()>,
  nodes: HashMap<TargetId, NodeIndex>,
}

impl HashDag {
  /// Build the DAG of every target not in `excluded`.
  ///
  /// The whole graph is checked for cycles first, so a cycle is reported even
  /// when one of its participants is excluded. Edges into excluded targets are
  /// dropped.
  pub fn from_graph(graph: &Graph, excluded: &HashSet<TargetId>) -> Result<Self, GraphError> {
    Self::verify_acyclic(graph)?;

    let mut dag = DiGraph::new();
    let mut nodes = HashMap::new();

    for id in graph.target_ids().filter(|id| !excluded.contains(id)) {
      nodes.insert(id, dag.add_node(id));
    }

    for (&id, &dependent_idx) in &nodes {
      for dep in graph.target_dependencies(id) {
        if let Some(&dep_idx) = nodes.get(&dep) {
          dag.add_edge(dep_idx, dependent_idx, ());
        }
      }
    }

    Ok(Self { graph: dag, nodes })
  }

  /// Reject cycles between target references, naming the participants.
  fn verify_acyclic(graph: &Graph) -> Result<(), GraphError> {
    let mut full: DiGraph<TargetId, ()> = DiGraph::with_capacity(graph.target_count(), 0);
    let indices: Vec<NodeIndex> = graph.target_ids().map(|id| full.add_node(id)).collect();

    for id in graph.target_ids() {
      for dep in graph.target_dependencies(id) {
        full.add_edge(indices[dep.0], indices[id.0], ());
      }
    }

    if toposort(&full, None).is_ok() {
      return Ok(());
    }

    let mut targets: Vec<String> = tarjan_scc(&full)
      .into_iter()
      .filter(|component| component.len() > 1 || full.contains_edge(component[0], component[0]))
      .flatten()
      .map(|idx| graph.identity(full[idx]))
      .collect();
    targets.sort();

    Err(GraphError::Cycle { targets })
  }

  /// Targets grouped into waves. Every dependency of a target in wave `n`
  /// lives in a wave before `n`. Each wave is sorted by id.
  pub fn waves(&self) -> Vec<Vec<TargetId>> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut remaining: HashSet<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let ready: Vec<NodeIndex> = remaining.iter().filter(|idx| in_degree[idx] == 0).copied().collect();

      // Unreachable after verify_acyclic, but never spin.
      if ready.is_empty() {
        break;
      }

      for idx in &ready {
        remaining.remove(idx);
        for dependent in self.graph.neighbors_directed(*idx, Direction::Outgoing) {
          if let Some(deg) = in_degree.get_mut(&dependent) {
            *deg = deg.saturating_sub(1);
          }
        }
      }

      let mut wave: Vec<TargetId> = ready.into_iter().map(|idx| self.graph[idx]).collect();
      wave.sort();
      waves.push(wave);
    }

    waves
  }

  /// Direct, non-excluded target dependencies of a target.
  pub fn dependencies(&self, id: TargetId) -> Vec<TargetId> {
    let Some(&idx) = self.nodes.get(&id) else {
      return Vec::new();
    };

    let mut deps: Vec<TargetId> = self
      .graph
      .neighbors_directed(idx, Direction::Incoming)
      .map(|dep_idx| self.graph[dep_idx])
      .collect();
    deps.sort();
    deps.dedup();
    deps
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }
}
