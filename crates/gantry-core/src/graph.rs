//! Module dependency graph: declaration-ordered, validated acyclic.
//!
//! The graph is an immutable value handed to the orchestrator, never shared
//! mutable state. Iteration follows declaration order exactly; there is no
//! topological sort. A module whose prerequisites are declared later in the
//! table will be skipped during an install-all pass, which is the intended
//! single-pass policy.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// One declared module and the modules it requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEntry {
    pub name: String,
    #[serde(default)]
    pub requires: Vec<String>,
}

/// Immutable dependency table, iterated in declaration order.
///
/// Keys are compared case-insensitively everywhere.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    entries: Vec<GraphEntry>,
}

impl DependencyGraph {
    /// Build a graph from declared entries, rejecting duplicates, references
    /// to undeclared modules, and dependency cycles.
    pub fn from_entries(entries: Vec<GraphEntry>) -> Result<Self, GraphError> {
        validate(&entries)?;
        Ok(Self { entries })
    }

    /// The stock module table the deployment ships with, in install order.
    pub fn builtin() -> Self {
        let entries = vec![
            entry("Patient", &[]),
            entry("Triage", &["Patient"]),
            entry("Laboratory", &["Patient"]),
            entry("Biometric", &["Patient"]),
            entry("HIV", &["Patient", "Triage", "Laboratory", "Biometric"]),
            entry("HTS", &["Patient"]),
            entry("Prep", &["HIV"]),
            entry("PMTCT", &["HIV"]),
            entry("ADR", &[]),
            entry("Hepatitis", &["Patient"]),
            entry("Report", &["HIV"]),
            entry("NDR", &["Patient", "Triage", "Laboratory", "HIV"]),
            entry("Lims", &["Patient", "Laboratory"]),
            entry("Casemanager", &["Patient"]),
            entry("Immunization", &["Patient"]),
            entry("MHPSS", &["Patient"]),
            entry("KP_Prev", &[]),
            entry("Backup", &[]),
            entry("Client-sync", &[]),
        ];
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &GraphEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[GraphEntry] {
        &self.entries
    }

    /// Prerequisites of `key`, or `None` when the graph does not declare it.
    pub fn requirements(&self, key: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(key))
            .map(|e| e.requires.as_slice())
    }

    /// True iff every prerequisite of `key` is present in `installed`.
    ///
    /// A module with no prerequisites, or one the graph does not declare, is
    /// always eligible.
    pub fn eligible(&self, key: &str, installed: &HashSet<String>) -> bool {
        let Some(requires) = self.requirements(key) else {
            return true;
        };
        requires
            .iter()
            .all(|req| installed.iter().any(|have| have.eq_ignore_ascii_case(req)))
    }
}

fn entry(name: &str, requires: &[&str]) -> GraphEntry {
    GraphEntry {
        name: name.to_string(),
        requires: requires.iter().map(|r| r.to_string()).collect(),
    }
}

fn validate(entries: &[GraphEntry]) -> Result<(), GraphError> {
    let mut seen = HashSet::new();
    for e in entries {
        if !seen.insert(e.name.to_lowercase()) {
            return Err(GraphError::DuplicateModule {
                module: e.name.clone(),
            });
        }
    }

    for e in entries {
        for req in &e.requires {
            if !entries.iter().any(|o| o.name.eq_ignore_ascii_case(req)) {
                return Err(GraphError::UnknownDependency {
                    module: e.name.clone(),
                    requirement: req.clone(),
                });
            }
        }
    }

    detect_cycles(entries)
}

const NEW: u8 = 0;
const VISITING: u8 = 1;
const DONE: u8 = 2;

fn detect_cycles(entries: &[GraphEntry]) -> Result<(), GraphError> {
    let lookup: HashMap<String, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.name.to_lowercase(), i))
        .collect();
    let mut marks = vec![NEW; entries.len()];
    let mut path = Vec::new();

    for start in 0..entries.len() {
        if marks[start] == NEW {
            walk(start, entries, &lookup, &mut marks, &mut path)?;
        }
    }
    Ok(())
}

fn walk(
    current: usize,
    entries: &[GraphEntry],
    lookup: &HashMap<String, usize>,
    marks: &mut [u8],
    path: &mut Vec<String>,
) -> Result<(), GraphError> {
    marks[current] = VISITING;
    path.push(entries[current].name.clone());

    for req in &entries[current].requires {
        let Some(&next) = lookup.get(&req.to_lowercase()) else {
            continue;
        };
        match marks[next] {
            DONE => {}
            VISITING => {
                let looped = &entries[next].name;
                let from = path
                    .iter()
                    .position(|n| n.eq_ignore_ascii_case(looped))
                    .unwrap_or(0);
                let mut chain: Vec<&str> = path[from..].iter().map(String::as_str).collect();
                chain.push(looped);
                return Err(GraphError::CircularDependency {
                    chain: chain.join(" -> "),
                });
            }
            _ => walk(next, entries, lookup, marks, path)?,
        }
    }

    path.pop();
    marks[current] = DONE;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declaration_order_is_preserved() {
        let graph = DependencyGraph::from_entries(vec![
            entry("Zulu", &[]),
            entry("Alpha", &["Zulu"]),
            entry("Mike", &[]),
        ])
        .unwrap();

        let names: Vec<&str> = graph.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Zulu", "Alpha", "Mike"]);
    }

    #[test]
    fn test_empty_requirements_always_eligible() {
        let graph = DependencyGraph::from_entries(vec![entry("Patient", &[])]).unwrap();
        assert!(graph.eligible("Patient", &HashSet::new()));
    }

    #[test]
    fn test_undeclared_key_is_eligible() {
        let graph = DependencyGraph::from_entries(vec![entry("Patient", &[])]).unwrap();
        assert!(graph.eligible("Mystery", &HashSet::new()));
    }

    #[test]
    fn test_eligibility_requires_all_prerequisites() {
        let graph = DependencyGraph::from_entries(vec![
            entry("Patient", &[]),
            entry("Laboratory", &["Patient"]),
            entry("Lims", &["Patient", "Laboratory"]),
        ])
        .unwrap();

        let mut installed = HashSet::new();
        installed.insert("Patient".to_string());
        assert!(graph.eligible("Laboratory", &installed));
        assert!(!graph.eligible("Lims", &installed));

        installed.insert("Laboratory".to_string());
        assert!(graph.eligible("Lims", &installed));
    }

    #[test]
    fn test_eligibility_ignores_case() {
        let graph = DependencyGraph::from_entries(vec![
            entry("Patient", &[]),
            entry("Triage", &["Patient"]),
        ])
        .unwrap();

        let mut installed = HashSet::new();
        installed.insert("PATIENT".to_string());
        assert!(graph.eligible("triage", &installed));
    }

    #[test]
    fn test_duplicate_modules_rejected() {
        let err = DependencyGraph::from_entries(vec![entry("Patient", &[]), entry("patient", &[])])
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateModule {
                module: "patient".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_requirement_rejected() {
        let err =
            DependencyGraph::from_entries(vec![entry("Triage", &["Patient"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownDependency {
                module: "Triage".to_string(),
                requirement: "Patient".to_string()
            }
        );
    }

    #[test]
    fn test_direct_cycle_detected() {
        let err = DependencyGraph::from_entries(vec![
            entry("A", &["B"]),
            entry("B", &["A"]),
        ])
        .unwrap_err();
        assert!(matches!(err, GraphError::CircularDependency { .. }));
        assert_eq!(err.to_string(), "circular dependency: A -> B -> A");
    }

    #[test]
    fn test_self_cycle_detected() {
        let err = DependencyGraph::from_entries(vec![entry("A", &["A"])]).unwrap_err();
        assert_eq!(err.to_string(), "circular dependency: A -> A");
    }

    #[test]
    fn test_transitive_cycle_detected() {
        let err = DependencyGraph::from_entries(vec![
            entry("A", &["C"]),
            entry("B", &["A"]),
            entry("C", &["B"]),
        ])
        .unwrap_err();
        assert!(matches!(err, GraphError::CircularDependency { .. }));
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let graph = DependencyGraph::from_entries(vec![
            entry("Base", &[]),
            entry("Left", &["Base"]),
            entry("Right", &["Base"]),
            entry("Top", &["Left", "Right"]),
        ]);
        assert!(graph.is_ok());
    }

    #[test]
    fn test_builtin_table_is_valid_and_ordered() {
        let graph = DependencyGraph::builtin();
        assert_eq!(graph.len(), 19);
        assert_eq!(graph.entries()[0].name, "Patient");

        // The shipped table must clear its own validation.
        assert!(DependencyGraph::from_entries(graph.entries().to_vec()).is_ok());

        // HIV sits behind the four clinical prerequisites.
        let requires = graph.requirements("hiv").unwrap();
        assert_eq!(requires, &["Patient", "Triage", "Laboratory", "Biometric"]);
    }
}
