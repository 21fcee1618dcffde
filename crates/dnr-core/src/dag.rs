//! Serving view dependency graph and topological ordering
//!
//! Aggregate views select from detail views, so creation and materialization
//! must follow dependency order. The graph is built from declared
//! dependencies and rejects cycles.

use crate::error::{CoreError, CoreResult};
use crate::names::ViewName;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A directed acyclic graph of serving view dependencies
#[derive(Debug)]
pub struct ViewDag {
    /// Edges point from dependency to dependent
    graph: DiGraph<ViewName, ()>,

    /// Map from view name to node index
    node_map: HashMap<ViewName, NodeIndex>,
}

impl ViewDag {
    /// Create a new empty DAG
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a view to the DAG
    pub fn add_view(&mut self, name: &str) -> CoreResult<NodeIndex> {
        if let Some(&idx) = self.node_map.get(name) {
            return Ok(idx);
        }
        let view = ViewName::try_new(name).ok_or_else(|| CoreError::EmptyName {
            context: "view name in DAG".into(),
        })?;
        let idx = self.graph.add_node(view.clone());
        self.node_map.insert(view, idx);
        Ok(idx)
    }

    /// Add a dependency edge (`view` selects from `dependency`)
    pub fn add_dependency(&mut self, view: &str, dependency: &str) -> CoreResult<()> {
        let view_idx = self.add_view(view)?;
        let dep_idx = self.add_view(dependency)?;
        self.graph.add_edge(dep_idx, view_idx, ());
        Ok(())
    }

    /// Build the DAG from a map of view name -> dependencies.
    ///
    /// Dependencies that are not themselves views (silver tables) are ignored.
    pub fn build(dependencies: &BTreeMap<String, Vec<String>>) -> CoreResult<Self> {
        let mut dag = Self::new();

        for view in dependencies.keys() {
            dag.add_view(view)?;
        }

        for (view, deps) in dependencies {
            for dep in deps {
                if dependencies.contains_key(dep) {
                    dag.add_dependency(view, dep)?;
                }
            }
        }

        dag.validate()?;
        Ok(dag)
    }

    /// Validate the DAG has no cycles
    pub fn validate(&self) -> CoreResult<()> {
        self.topological_order().map(|_| ())
    }

    /// Find a cycle path starting from a node for error reporting
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut path: Vec<String> = vec![self.graph[start].to_string()];
        let mut current = start;
        let mut visited = HashSet::new();
        visited.insert(current);

        while let Some(edge) = self.graph.edges(current).next() {
            let target = edge.target();
            path.push(self.graph[target].to_string());

            if target == start || visited.contains(&target) {
                break;
            }

            visited.insert(target);
            current = target;
        }

        path.join(" -> ")
    }

    /// Get views in topological order (dependencies first)
    pub fn topological_order(&self) -> CoreResult<Vec<ViewName>> {
        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(cycle) => Err(CoreError::CircularDependency {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    /// Get direct dependencies of a view
    pub fn dependencies(&self, view: &str) -> Vec<ViewName> {
        self.neighbors(view, petgraph::Direction::Incoming)
    }

    /// Get direct dependents of a view
    pub fn dependents(&self, view: &str) -> Vec<ViewName> {
        self.neighbors(view, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, view: &str, direction: petgraph::Direction) -> Vec<ViewName> {
        let Some(&idx) = self.node_map.get(view) else {
            return Vec::new();
        };
        let mut out: Vec<ViewName> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                petgraph::Direction::Incoming => self.graph[e.source()].clone(),
                petgraph::Direction::Outgoing => self.graph[e.target()].clone(),
            })
            .collect();
        out.sort();
        out
    }

    /// The view plus all of its transitive dependencies, in topological order
    pub fn with_ancestors(&self, view: &str) -> CoreResult<Vec<ViewName>> {
        let Some(&start) = self.node_map.get(view) else {
            return Err(CoreError::ViewNotFound {
                name: view.to_string(),
            });
        };
        let mut keep = HashSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            if keep.insert(idx) {
                stack.extend(
                    self.graph
                        .edges_directed(idx, petgraph::Direction::Incoming)
                        .map(|e| e.source()),
                );
            }
        }
        let selected: HashSet<&ViewName> = keep.iter().map(|idx| &self.graph[*idx]).collect();
        Ok(self
            .topological_order()?
            .into_iter()
            .filter(|v| selected.contains(v))
            .collect())
    }

    /// Check if a view exists in the DAG
    pub fn contains(&self, view: &str) -> bool {
        self.node_map.contains_key(view)
    }
}

impl Default for ViewDag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
