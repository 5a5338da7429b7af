//! Dependency edges between formulas and the values they read.
//!
//! Edges are discovered by scanning formula text for shortcodes and are used
//! only to decide what becomes stale; they never own anything.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tracing::trace;

use crate::shortcode::{RefKind, Reference, references};

#[derive(Debug, Clone, Default)]
pub struct DependencyTracker {
    edges: BTreeMap<String, BTreeSet<Reference>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `formula_text` and record `formula_name -> reference` edges,
    /// replacing any edges recorded earlier for the same formula.
    pub fn discover(&mut self, formula_name: &str, formula_text: &str) -> BTreeSet<Reference> {
        let found: BTreeSet<Reference> = references(formula_text).into_iter().collect();
        self.record(formula_name, found.clone());
        found
    }

    pub fn record(&mut self, formula_name: &str, dependencies: BTreeSet<Reference>) {
        trace!(
            formula = formula_name,
            dependency_count = dependencies.len(),
            "recorded dependencies"
        );
        self.edges.insert(formula_name.to_string(), dependencies);
    }

    pub fn dependencies_of(&self, formula_name: &str) -> Option<&BTreeSet<Reference>> {
        self.edges.get(formula_name)
    }

    pub fn formulas(&self) -> impl Iterator<Item = &str> {
        self.edges.keys().map(String::as_str)
    }

    fn direct_dependents<'a>(
        &'a self,
        matches: impl Fn(&Reference) -> bool + 'a,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |(_, deps)| deps.iter().any(&matches))
            .map(|(name, _)| name.as_str())
    }

    /// Every formula that reads `field_name`, directly or through a chain of
    /// formulas.
    pub fn dependents_of_field(&self, field_name: &str) -> BTreeSet<String> {
        let seeds: Vec<String> = self
            .direct_dependents(|dep| dep.kind == RefKind::Field && dep.name == field_name)
            .map(str::to_string)
            .collect();
        self.close_over(seeds)
    }

    /// Every formula that reads the result `result_name`, directly or
    /// transitively. `result_name` itself is excluded unless it is part of a
    /// cycle.
    pub fn dependents_of_result(&self, result_name: &str) -> BTreeSet<String> {
        let seeds: Vec<String> = self
            .direct_dependents(|dep| dep.kind.is_result() && dep.name == result_name)
            .map(str::to_string)
            .collect();
        self.close_over(seeds)
    }

    /// Breadth-first closure over result edges; the visited set stops cycles.
    fn close_over(&self, seeds: Vec<String>) -> BTreeSet<String> {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<String> = seeds.into();
        while let Some(name) = queue.pop_front() {
            if !visited.insert(name.clone()) {
                continue;
            }
            for dependent in
                self.direct_dependents(|dep| dep.kind.is_result() && dep.name == name)
            {
                if !visited.contains(dependent) {
                    queue.push_back(dependent.to_string());
                }
            }
        }
        visited
    }

    /// True if `formula_name` can reach itself through recorded edges.
    pub fn depends_on_itself(&self, formula_name: &str) -> bool {
        self.dependents_of_result(formula_name).contains(formula_name)
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }
}
