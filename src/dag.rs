//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Small.
//! The Small project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::errors::{Result, SmError};

/// Bundle dependency graph. Edges point from a bundle to the bundles it
/// depends on, in declared order. A dependency may name a bundle that has not
/// been inserted yet.
#[derive(Clone, Debug, Default)]
pub struct SmDependencyGraph {
    nodes: BTreeMap<String, Vec<String>>,
}

impl SmDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insert `name` with its dependencies, rejecting duplicates and cycles.
    /// The graph is unchanged when an error is returned.
    pub fn insert(&mut self, name: &str, dependencies: &[String]) -> Result<()> {
        if self.nodes.contains_key(name) {
            return Err(SmError::validation(format!(
                "bundle '{}' is already registered",
                name
            )));
        }
        if let Some(cycle) = self.find_cycle_with(name, dependencies) {
            return Err(SmError::CyclicDependency {
                bundle: name.to_string(),
                cycle,
            });
        }

        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.contains(dep) {
                deps.push(dep.clone());
            }
        }
        self.nodes.insert(name.to_string(), deps);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.nodes.remove(name)
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.nodes.get(name).map(Vec::as_slice)
    }

    /// Registered bundles that list `name` as a direct dependency.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, deps)| deps.iter().any(|d| d == name))
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Path `name -> dep -> ... -> name` that inserting `name` with
    /// `dependencies` would close, if any.
    pub fn find_cycle_with(&self, name: &str, dependencies: &[String]) -> Option<Vec<String>> {
        for dep in dependencies {
            let mut path = vec![name.to_string()];
            let mut visited = HashSet::new();
            if self.reaches(dep, name, &mut path, &mut visited) {
                return Some(path);
            }
        }
        None
    }

    fn reaches(
        &self,
        current: &str,
        target: &str,
        path: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> bool {
        path.push(current.to_string());
        if current == target {
            return true;
        }
        if visited.insert(current.to_string()) {
            if let Some(deps) = self.nodes.get(current) {
                for dep in deps {
                    if self.reaches(dep, target, path, visited) {
                        return true;
                    }
                }
            }
        }
        path.pop();
        false
    }

    /// Transitive dependencies of `name` (excluding itself), dependencies
    /// before dependents, visiting direct dependencies in declared order.
    pub fn closure_order(&self, name: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(name.to_string());
        if let Some(deps) = self.nodes.get(name) {
            for dep in deps {
                self.post_order(dep, &mut seen, &mut order);
            }
        }
        order
    }

    fn post_order(&self, name: &str, seen: &mut HashSet<String>, order: &mut Vec<String>) {
        if !seen.insert(name.to_string()) {
            return;
        }
        if let Some(deps) = self.nodes.get(name) {
            for dep in deps {
                self.post_order(dep, seen, order);
            }
        }
        order.push(name.to_string());
    }

    /// Every registered bundle, dependencies first. Ties break by name.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|name| (name.as_str(), 0))
            .collect();
        for (name, deps) in &self.nodes {
            let known = deps.iter().filter(|d| self.nodes.contains_key(*d)).count();
            if let Some(count) = in_degree.get_mut(name.as_str()) {
                *count = known;
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut sorted = Vec::with_capacity(self.nodes.len());

        while let Some(name) = ready.iter().next().copied() {
            ready.remove(name);
            sorted.push(name.to_string());
            for (dependent, deps) in &self.nodes {
                if deps.iter().any(|d| d == name) {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(dependent.as_str());
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            let stuck: Vec<String> = self
                .nodes
                .keys()
                .filter(|name| !sorted.contains(name))
                .cloned()
                .collect();
            return Err(SmError::CyclicDependency {
                bundle: stuck.first().cloned().unwrap_or_default(),
                cycle: stuck,
            });
        }
        Ok(sorted)
    }

    /// Split a topological order into levels whose members only depend on
    /// earlier levels.
    pub fn levels(&self, sorted: &[String]) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::new();
        let mut levels: Vec<Vec<String>> = Vec::new();
        for name in sorted {
            let level = self
                .nodes
                .get(name)
                .map(|deps| {
                    deps.iter()
                        .filter_map(|d| depth.get(d.as_str()).map(|l| l + 1))
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            depth.insert(name.as_str(), level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(name.clone());
        }
        levels
    }
}
