//! Cycle detection utilities for the IR target graph.
//!
//! Detection is a path-stack depth-first search started from every
//! unvisited target in name order. Each distinct cycle membership is
//! reported once, as the stack slice from the first occurrence of the
//! repeated target.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use itertools::Itertools;

use super::Target;
use crate::diagnostics::{DiagCode, Diagnostics};

/// Tracks the visitation state of a node during cycle detection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum VisitState {
    Visiting,
    Visited,
}

/// Outcome of a cycle search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Each cycle as target names, first member repeated at the end.
    pub cycles: Vec<Vec<String>>,
    /// Every target that belongs to some cycle.
    pub affected: BTreeSet<String>,
}

impl CycleReport {
    /// Whether any cycle was found.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }
}

/// Find every distinct dependency cycle without reporting anything.
#[must_use]
pub fn find_cycles(targets: &[Target]) -> CycleReport {
    let graph = Graph::new(targets);
    let mut detector = CycleDetector::new(&graph);
    for node in graph.edges.keys() {
        if !detector.is_visited(node) {
            detector.visit(node);
        }
    }
    let affected = detector.cycles.iter().flatten().cloned().collect();
    CycleReport {
        cycles: detector.cycles,
        affected,
    }
}

/// Find cycles and record one `IR_DEPENDENCY_CYCLE` error per cycle.
pub fn detect(targets: &[Target], diagnostics: &mut Diagnostics) -> CycleReport {
    let report = find_cycles(targets);
    for cycle in &report.cycles {
        let path = cycle.iter().join(" -> ");
        tracing::debug!(cycle = %path, "dependency cycle");
        diagnostics.report_from(
            DiagCode::IrDependencyCycle,
            format!("dependency cycle detected: {path}"),
            None,
            cycle.first().cloned().unwrap_or_default(),
        );
    }
    report
}

/// Whether the dependency graph has no cycles.
#[must_use]
pub fn is_acyclic(targets: &[Target]) -> bool {
    !find_cycles(targets).has_cycles()
}

/// Remove, for each cycle, the edge from its last member back to its first.
///
/// This does not guarantee an acyclic result when cycles share members;
/// callers that need certainty should run [`find_cycles`] again.
pub fn break_cycles(targets: &mut [Target], cycles: &[Vec<String>]) {
    for cycle in cycles {
        let (Some(first), Some(last)) = (cycle.first(), cycle.iter().rev().nth(1)) else {
            continue;
        };
        let Some(dependency) = targets.iter().find(|t| &t.name == first) else {
            continue;
        };
        let refs: BTreeSet<String> = [dependency.name.clone(), dependency.alias_or_name().to_owned()]
            .into_iter()
            .collect();
        if let Some(dependent) = targets.iter_mut().find(|t| &t.name == last) {
            let before = dependent.deps.len();
            dependent.deps.retain(|dep| !refs.contains(dep));
            if dependent.deps.len() != before {
                tracing::debug!(from = %last, to = %first, "removed dependency to break cycle");
            }
        }
    }
}

/// Target names with edges to the names of their dependencies.
struct Graph {
    edges: BTreeMap<String, Vec<String>>,
}

impl Graph {
    fn new(targets: &[Target]) -> Self {
        let mut by_ref: HashMap<&str, &str> = HashMap::new();
        for target in targets {
            by_ref.insert(&target.name, &target.name);
            if let Some(alias) = &target.alias {
                by_ref.insert(alias, &target.name);
            }
        }
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for target in targets {
            let deps = edges.entry(target.name.clone()).or_default();
            for dep in &target.deps {
                match by_ref.get(dep.as_str()) {
                    Some(name) => deps.push((*name).to_owned()),
                    None => tracing::debug!(
                        missing = %dep,
                        dependent = %target.name,
                        "skipping dependency missing from targets during cycle detection",
                    ),
                }
            }
        }
        Self { edges }
    }
}

struct CycleDetector<'a> {
    graph: &'a Graph,
    stack: Vec<String>,
    states: HashMap<String, VisitState>,
    cycles: Vec<Vec<String>>,
    seen_members: BTreeSet<BTreeSet<String>>,
}

impl<'a> CycleDetector<'a> {
    fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            stack: Vec::new(),
            states: HashMap::new(),
            cycles: Vec::new(),
            seen_members: BTreeSet::new(),
        }
    }

    fn is_visited(&self, node: &str) -> bool {
        matches!(self.states.get(node), Some(VisitState::Visited))
    }

    fn visit(&mut self, node: &str) {
        match self.states.get(node) {
            Some(VisitState::Visited) => return,
            Some(VisitState::Visiting) => {
                self.close_cycle(node);
                return;
            }
            None => {
                self.states.insert(node.to_owned(), VisitState::Visiting);
            }
        }

        self.stack.push(node.to_owned());
        let graph = self.graph;
        if let Some(deps) = graph.edges.get(node) {
            for dep in deps {
                self.visit(dep);
            }
        }
        self.stack.pop();
        self.states.insert(node.to_owned(), VisitState::Visited);
    }

    fn close_cycle(&mut self, node: &str) {
        let Some(idx) = self.stack.iter().position(|n| n == node) else {
            return;
        };
        let mut cycle: Vec<String> = self.stack.iter().skip(idx).cloned().collect();
        let members: BTreeSet<String> = cycle.iter().cloned().collect();
        if self.seen_members.insert(members) {
            cycle.push(node.to_owned());
            self.cycles.push(cycle);
        }
    }
}
