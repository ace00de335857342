//! Dependency graph for step execution ordering.
//!
//! Steps keep their registration order throughout: the order of steps
//! inside a level follows the order in which steps were added.

use std::collections::HashMap;

use crate::error::{Result, RolloutError};

/// Represents the dependency relationships between steps.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Step names in registration order.
    order: Vec<String>,
    /// Map of step name to its direct dependencies.
    dependencies: HashMap<String, Vec<String>>,
    /// Map of step name to steps that depend on it, in registration order.
    dependents: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create a new dependency graph builder.
    pub fn builder() -> DependencyGraphBuilder {
        DependencyGraphBuilder::new()
    }

    /// Find a cycle in the graph, returning the path if one exists.
    ///
    /// The path starts and ends with the same step, e.g. `[a, b, a]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            Visiting,
            Visited,
        }

        let mut state: HashMap<&str, State> = self
            .order
            .iter()
            .map(|s| (s.as_str(), State::Unvisited))
            .collect();

        let mut path: Vec<String> = Vec::new();

        fn dfs<'a>(
            node: &'a str,
            graph: &'a DependencyGraph,
            state: &mut HashMap<&'a str, State>,
            path: &mut Vec<String>,
        ) -> Option<Vec<String>> {
            state.insert(node, State::Visiting);
            path.push(node.to_string());

            if let Some(deps) = graph.dependencies.get(node) {
                for dep in deps {
                    match state.get(dep.as_str()) {
                        Some(State::Visiting) => {
                            let cycle_start = path.iter().position(|s| s == dep).unwrap_or(0);
                            let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Some(State::Unvisited) | None => {
                            if let Some(cycle) = dfs(dep, graph, state, path) {
                                return Some(cycle);
                            }
                        }
                        Some(State::Visited) => {}
                    }
                }
            }

            path.pop();
            state.insert(node, State::Visited);
            None
        }

        for step in &self.order {
            if state.get(step.as_str()) == Some(&State::Unvisited) {
                if let Some(cycle) = dfs(step, self, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }

        None
    }

    /// Returns groups of steps that can execute in parallel.
    ///
    /// Level 0 holds steps with no dependencies; each later level holds
    /// steps whose dependencies all sit in earlier levels. Every step
    /// appears in exactly one level.
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        if let Some(cycle) = self.find_cycle() {
            return Err(RolloutError::CircularDependency {
                cycle: cycle.join(" -> "),
            });
        }

        let position: HashMap<&str, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut in_degree: HashMap<&str, usize> = self
            .order
            .iter()
            .map(|s| (s.as_str(), self.dependencies[s].len()))
            .collect();

        let mut current: Vec<&str> = self
            .order
            .iter()
            .map(String::as_str)
            .filter(|s| in_degree[s] == 0)
            .collect();

        let mut levels: Vec<Vec<String>> = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            let mut next: Vec<&str> = Vec::new();
            for step in &current {
                for dependent in &self.dependents[*step] {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent);
                        }
                    }
                }
            }
            next.sort_by_key(|s| position[s]);

            placed += current.len();
            levels.push(current.iter().map(|s| s.to_string()).collect());
            current = next;
        }

        if placed != self.order.len() {
            let remaining: Vec<_> = self
                .order
                .iter()
                .filter(|s| in_degree[s.as_str()] > 0)
                .cloned()
                .collect();
            return Err(RolloutError::CircularDependency {
                cycle: remaining.join(" -> "),
            });
        }

        Ok(levels)
    }
}

/// Builder for constructing a DependencyGraph.
#[derive(Debug, Default)]
pub struct DependencyGraphBuilder {
    steps: Vec<(String, Vec<String>)>,
}

impl DependencyGraphBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step with its dependencies.
    pub fn add_step(mut self, name: impl Into<String>, depends_on: Vec<String>) -> Self {
        let mut deps: Vec<String> = Vec::with_capacity(depends_on.len());
        for dep in depends_on {
            if !deps.contains(&dep) {
                deps.push(dep);
            }
        }
        self.steps.push((name.into(), deps));
        self
    }

    /// Build the dependency graph.
    ///
    /// Returns an error if a step is added twice or any dependency
    /// references a step that was never added.
    pub fn build(self) -> Result<DependencyGraph> {
        let mut order = Vec::with_capacity(self.steps.len());
        let mut dependencies: HashMap<String, Vec<String>> = HashMap::new();

        for (name, deps) in self.steps {
            if dependencies.contains_key(&name) {
                return Err(RolloutError::DuplicateStep { name });
            }
            order.push(name.clone());
            dependencies.insert(name, deps);
        }

        let mut dependents: HashMap<String, Vec<String>> =
            order.iter().map(|s| (s.clone(), Vec::new())).collect();

        for step in &order {
            for dep in &dependencies[step] {
                match dependents.get_mut(dep) {
                    Some(list) => list.push(step.clone()),
                    None => {
                        return Err(RolloutError::UnknownDependency {
                            step: step.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        Ok(DependencyGraph {
            order,
            dependencies,
            dependents,
        })
    }
}
