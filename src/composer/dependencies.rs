//! Stack Dependency Tracking
//!
//! Tracks which stacks import from which. This enables:
//!
//! - Composition ordering (a topological order, ties broken by priority)
//! - Pulling in the stacks a selected stack depends on
//! - Cycle detection
//! - Dependency visualization

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Error, Result};
use crate::stacks::StackKind;

/// The dependency graph between stacks.
///
/// An edge `a -> b` means `b` imports from `a`, so `a` is composed first.
#[derive(Debug, Clone, Default)]
pub struct StackDependencyGraph {
    graph: DiGraph<StackKind, ()>,
    node_indices: HashMap<StackKind, NodeIndex>,
}

impl StackDependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of `kinds` with every dependency among them.
    ///
    /// Dependencies on stacks outside `kinds` are left out.
    pub fn from_kinds(kinds: &[StackKind]) -> Result<Self> {
        let mut graph = Self::new();
        for kind in kinds {
            graph.add_stack(*kind);
        }
        for kind in kinds {
            for dependency in kind.dependencies() {
                if kinds.contains(dependency) {
                    graph.add_dependency(*kind, *dependency)?;
                }
            }
        }
        Ok(graph)
    }

    /// Add a stack; adding it twice is a no-op.
    pub fn add_stack(&mut self, kind: StackKind) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(&kind) {
            return idx;
        }
        let idx = self.graph.add_node(kind);
        self.node_indices.insert(kind, idx);
        idx
    }

    /// Record that `dependent` imports from `dependency`.
    pub fn add_dependency(&mut self, dependent: StackKind, dependency: StackKind) -> Result<()> {
        let from_idx = self
            .node_indices
            .get(&dependency)
            .ok_or_else(|| Error::Config(format!("stack '{}' is not in the graph", dependency)))?;
        let to_idx = self
            .node_indices
            .get(&dependent)
            .ok_or_else(|| Error::Config(format!("stack '{}' is not in the graph", dependent)))?;

        self.graph.update_edge(*from_idx, *to_idx, ());
        Ok(())
    }

    /// Get all cycles in the graph
    pub fn get_cycles(&self) -> Vec<Vec<StackKind>> {
        let sccs = tarjan_scc(&self.graph);
        sccs.into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                scc.into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).copied())
                    .collect()
            })
            .collect()
    }

    /// Composition order: every stack after the stacks it imports from, and
    /// among stacks that are ready at the same time, the higher priority first.
    pub fn composition_order(&self) -> Result<Vec<StackKind>> {
        if toposort(&self.graph, None).is_err() {
            let cycles: Vec<String> = self
                .get_cycles()
                .iter()
                .map(|cycle| {
                    cycle
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(" -> ")
                })
                .collect();
            return Err(Error::DependencyCycle(cycles.join("; ")));
        }

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                (
                    idx,
                    self.graph.neighbors_directed(idx, Direction::Incoming).count(),
                )
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
        for (idx, degree) in &in_degree {
            if *degree == 0 {
                ready.push(Reverse((self.graph[*idx].priority(), idx.index())));
            }
        }

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, raw))) = ready.pop() {
            let idx = NodeIndex::new(raw);
            order.push(self.graph[idx]);
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let target = edge.target();
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse((self.graph[target].priority(), target.index())));
                    }
                }
            }
        }

        Ok(order)
    }

    /// Get all stacks a given stack imports from (direct and transitive)
    pub fn get_dependencies(&self, kind: StackKind) -> Vec<StackKind> {
        let mut dependencies = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(&start_idx) = self.node_indices.get(&kind) {
            queue.push_back(start_idx);

            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors_directed(current, Direction::Incoming) {
                    if dependencies.insert(self.graph[neighbor]) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        let mut dependencies: Vec<StackKind> = dependencies.into_iter().collect();
        dependencies.sort_by_key(StackKind::priority);
        dependencies
    }

    /// Generate a DOT format representation for visualization
    pub fn to_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph stacks {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box];\n\n");

        for idx in self.graph.node_indices() {
            let kind = self.graph[idx];
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\\n{}\"];\n",
                kind,
                kind,
                kind.category()
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            output.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                self.graph[edge.source()],
                self.graph[edge.target()]
            ));
        }

        output.push_str("}\n");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_order_puts_object_store_before_database() {
        let graph = StackDependencyGraph::from_kinds(&StackKind::ALL).unwrap();
        assert_eq!(
            graph.composition_order().unwrap(),
            vec![
                StackKind::Network,
                StackKind::Compute,
                StackKind::EncryptionKey,
                StackKind::ObjectStore,
                StackKind::Database,
            ]
        );
    }

    #[test]
    fn test_order_ignores_missing_dependencies() {
        let graph =
            StackDependencyGraph::from_kinds(&[StackKind::Database, StackKind::EncryptionKey])
                .unwrap();
        assert_eq!(
            graph.composition_order().unwrap(),
            vec![StackKind::EncryptionKey, StackKind::Database]
        );
    }

    #[test]
    fn test_transitive_dependencies() {
        let graph = StackDependencyGraph::from_kinds(&StackKind::ALL).unwrap();
        assert_eq!(
            graph.get_dependencies(StackKind::Compute),
            vec![StackKind::Network]
        );
        assert_eq!(graph.get_dependencies(StackKind::Database).len(), 4);
        assert!(graph.get_dependencies(StackKind::ObjectStore).is_empty());
    }

    #[test]
    fn test_cycle_detection() {
        let mut graph = StackDependencyGraph::new();
        graph.add_stack(StackKind::Network);
        graph.add_stack(StackKind::Compute);
        graph.add_dependency(StackKind::Compute, StackKind::Network).unwrap();
        graph.add_dependency(StackKind::Network, StackKind::Compute).unwrap();

        assert_eq!(graph.get_cycles().len(), 1);
        assert!(matches!(
            graph.composition_order(),
            Err(Error::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_unknown_stack_dependency() {
        let mut graph = StackDependencyGraph::new();
        graph.add_stack(StackKind::Compute);
        assert!(graph
            .add_dependency(StackKind::Compute, StackKind::Network)
            .is_err());
    }

    #[test]
    fn test_to_dot() {
        let graph = StackDependencyGraph::from_kinds(&[StackKind::Network, StackKind::Compute]).unwrap();
        let dot = graph.to_dot();
        assert!(dot.contains("digraph"));
        assert!(dot.contains("\"network\" -> \"compute\""));
        assert!(!dot.contains("database"));
    }
}
