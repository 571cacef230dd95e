// src/dag/resolver.rs

//! Topological ordering of concepts by `PREREQUISITE` edges.
//!
//! The resolver never fails: prerequisite lookups that error are treated as
//! "no prerequisites", cycles are broken by visitation order, and recursion
//! deeper than the configured bound is abandoned with a warning.

use std::collections::{HashMap, HashSet};

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::graph::PrerequisiteLookup;
use crate::types::ConceptId;

/// Output of [`DependencyResolver::resolve`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedOrder {
    /// Input concepts, prerequisites first.
    pub order: Vec<ConceptId>,

    /// In-set prerequisites per concept, restricted to concepts that appear
    /// earlier in `order`. Back edges dropped while breaking cycles are not
    /// listed, so waiting on these never deadlocks.
    pub prerequisites: HashMap<ConceptId, Vec<ConceptId>>,

    /// Number of edges dropped because they closed a cycle.
    pub cycles_broken: usize,
}

impl ResolvedOrder {
    fn identity(order: Vec<ConceptId>) -> Self {
        let prerequisites = order.iter().map(|c| (c.clone(), Vec::new())).collect();
        Self {
            order,
            prerequisites,
            cycles_broken: 0,
        }
    }

    pub fn position(&self, concept: &ConceptId) -> Option<usize> {
        self.order.iter().position(|c| c == concept)
    }

    pub fn prerequisites_of(&self, concept: &ConceptId) -> &[ConceptId] {
        self.prerequisites
            .get(concept)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Depth-first topological resolver with deterministic cycle breaking.
#[derive(Debug, Clone, Copy)]
pub struct DependencyResolver {
    max_depth: usize,
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self { max_depth: 10 }
    }
}

impl DependencyResolver {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Order `concepts` so that every prerequisite inside the set precedes
    /// its dependents. Edges pointing outside the set are ignored; duplicate
    /// input ids are collapsed to their first occurrence.
    pub async fn resolve(
        &self,
        lookup: &dyn PrerequisiteLookup,
        concepts: &[ConceptId],
    ) -> ResolvedOrder {
        let mut seen = HashSet::new();
        let unique: Vec<ConceptId> = concepts
            .iter()
            .filter(|c| seen.insert((*c).clone()))
            .cloned()
            .collect();

        if unique.len() <= 1 {
            return ResolvedOrder::identity(unique);
        }

        let adjacency = load_adjacency(lookup, &unique).await;

        if has_cycle(&unique, &adjacency) {
            debug!(
                concepts = unique.len(),
                "prerequisite graph contains a cycle; breaking by visitation order"
            );
        }

        let mut walk = Walk {
            adjacency: &adjacency,
            marks: HashMap::new(),
            order: Vec::with_capacity(unique.len()),
            cycles_broken: 0,
            max_depth: self.max_depth,
        };
        for concept in &unique {
            walk.visit(concept, 0);
        }
        let Walk {
            order,
            cycles_broken,
            ..
        } = walk;

        let positions: HashMap<&ConceptId, usize> =
            order.iter().enumerate().map(|(i, c)| (c, i)).collect();

        let prerequisites = order
            .iter()
            .map(|concept| {
                let own = positions[concept];
                let earlier = adjacency
                    .get(concept)
                    .into_iter()
                    .flatten()
                    .filter(|p| positions.get(p).is_some_and(|&pos| pos < own))
                    .cloned()
                    .collect();
                (concept.clone(), earlier)
            })
            .collect();

        ResolvedOrder {
            order,
            prerequisites,
            cycles_broken,
        }
    }
}

/// Load in-set prerequisites for every concept, failing open per node.
async fn load_adjacency(
    lookup: &dyn PrerequisiteLookup,
    concepts: &[ConceptId],
) -> HashMap<ConceptId, Vec<ConceptId>> {
    let in_set: HashSet<&ConceptId> = concepts.iter().collect();
    let mut adjacency = HashMap::with_capacity(concepts.len());

    for concept in concepts {
        let prereqs = match lookup.prerequisites_of(concept).await {
            Ok(prereqs) => prereqs,
            Err(err) => {
                warn!(
                    concept = %concept,
                    error = %err,
                    "failed to load prerequisites; treating concept as unconstrained"
                );
                Vec::new()
            }
        };

        let mut seen = HashSet::new();
        let filtered: Vec<ConceptId> = prereqs
            .into_iter()
            .filter(|p| p != concept && in_set.contains(p) && seen.insert(p.clone()))
            .collect();
        adjacency.insert(concept.clone(), filtered);
    }

    adjacency
}

fn has_cycle(concepts: &[ConceptId], adjacency: &HashMap<ConceptId, Vec<ConceptId>>) -> bool {
    let index: HashMap<&ConceptId, usize> =
        concepts.iter().enumerate().map(|(i, c)| (c, i)).collect();

    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for i in 0..concepts.len() {
        graph.add_node(i);
    }
    for (concept, prereqs) in adjacency {
        for prereq in prereqs {
            if let (Some(&from), Some(&to)) = (index.get(prereq), index.get(concept)) {
                graph.add_edge(from, to, ());
            }
        }
    }

    is_cyclic_directed(&graph)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Walk<'a> {
    adjacency: &'a HashMap<ConceptId, Vec<ConceptId>>,
    marks: HashMap<&'a ConceptId, Mark>,
    order: Vec<ConceptId>,
    cycles_broken: usize,
    max_depth: usize,
}

impl<'a> Walk<'a> {
    fn visit(&mut self, node: &'a ConceptId, depth: usize) {
        match self.marks.get(node) {
            Some(Mark::Done) => return,
            Some(Mark::Visiting) => {
                self.cycles_broken += 1;
                debug!(concept = %node, "re-entered concept while visiting; dropping edge");
                return;
            }
            None => {}
        }

        if depth > self.max_depth {
            warn!(
                concept = %node,
                depth,
                max_depth = self.max_depth,
                "prerequisite chain too deep; abandoning descent"
            );
            return;
        }

        self.marks.insert(node, Mark::Visiting);

        let adjacency = self.adjacency;
        if let Some(prereqs) = adjacency.get(node) {
            for prereq in prereqs {
                self.visit(prereq, depth + 1);
            }
        }

        self.marks.insert(node, Mark::Done);
        self.order.push(node.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// `edges` are `(prerequisite, dependent)` pairs; `broken` concepts fail
    /// to load.
    struct FakeLookup {
        edges: Vec<(&'static str, &'static str)>,
        broken: Vec<&'static str>,
    }

    #[async_trait]
    impl PrerequisiteLookup for FakeLookup {
        async fn prerequisites_of(&self, concept: &ConceptId) -> anyhow::Result<Vec<ConceptId>> {
            if self.broken.contains(&concept.as_str()) {
                anyhow::bail!("lookup failed for {concept}");
            }
            Ok(self
                .edges
                .iter()
                .filter(|(_, dependent)| *dependent == concept.as_str())
                .map(|(prereq, _)| ConceptId::from(*prereq))
                .collect())
        }
    }

    fn ids(names: &[&str]) -> Vec<ConceptId> {
        names.iter().map(|n| ConceptId::from(*n)).collect()
    }

    fn names(order: &ResolvedOrder) -> Vec<&str> {
        order.order.iter().map(|c| c.as_str()).collect()
    }

    #[tokio::test]
    async fn prerequisites_precede_dependents() {
        let lookup = FakeLookup {
            edges: vec![("a", "b"), ("b", "c")],
            broken: vec![],
        };
        let resolved = DependencyResolver::default()
            .resolve(&lookup, &ids(&["c", "b", "a"]))
            .await;

        assert_eq!(names(&resolved), vec!["a", "b", "c"]);
        assert_eq!(resolved.prerequisites_of(&"c".into()), &ids(&["b"])[..]);
        assert_eq!(resolved.cycles_broken, 0);
    }

    #[tokio::test]
    async fn edges_outside_the_set_are_ignored() {
        let lookup = FakeLookup {
            edges: vec![("outside", "a"), ("a", "b")],
            broken: vec![],
        };
        let resolved = DependencyResolver::default()
            .resolve(&lookup, &ids(&["b", "a"]))
            .await;

        assert_eq!(names(&resolved), vec!["a", "b"]);
        assert!(resolved.prerequisites_of(&"a".into()).is_empty());
    }

    #[tokio::test]
    async fn cycles_are_broken_by_visitation_order() {
        let lookup = FakeLookup {
            edges: vec![("a", "b"), ("b", "a")],
            broken: vec![],
        };
        let resolved = DependencyResolver::default()
            .resolve(&lookup, &ids(&["a", "b"]))
            .await;

        // Visiting `a` descends into `b`, whose edge back to `a` is dropped.
        assert_eq!(names(&resolved), vec!["b", "a"]);
        assert_eq!(resolved.cycles_broken, 1);
        assert!(resolved.prerequisites_of(&"b".into()).is_empty());
        assert_eq!(resolved.prerequisites_of(&"a".into()), &ids(&["b"])[..]);
    }

    #[tokio::test]
    async fn lookup_failure_fails_open() {
        let lookup = FakeLookup {
            edges: vec![("a", "b")],
            broken: vec!["b"],
        };
        let resolved = DependencyResolver::default()
            .resolve(&lookup, &ids(&["b", "a"]))
            .await;

        assert_eq!(names(&resolved), vec!["b", "a"]);
        assert!(resolved.prerequisites_of(&"b".into()).is_empty());
    }

    #[tokio::test]
    async fn trivial_sets_short_circuit() {
        let lookup = FakeLookup {
            edges: vec![],
            broken: vec!["solo"],
        };
        let resolved = DependencyResolver::default()
            .resolve(&lookup, &ids(&["solo", "solo"]))
            .await;
        assert_eq!(names(&resolved), vec!["solo"]);

        let empty = DependencyResolver::default().resolve(&lookup, &[]).await;
        assert!(empty.order.is_empty());
    }

    #[tokio::test]
    async fn deep_chains_keep_every_concept() {
        let chain = ["c0", "c1", "c2", "c3", "c4", "c5"];
        let lookup = FakeLookup {
            edges: chain.windows(2).map(|w| (w[0], w[1])).collect(),
            broken: vec![],
        };
        let resolved = DependencyResolver::new(2)
            .resolve(&lookup, &ids(&["c5"]).into_iter().chain(ids(&chain)).collect::<Vec<_>>())
            .await;

        assert_eq!(resolved.order.len(), chain.len());
        let unique: HashSet<_> = resolved.order.iter().collect();
        assert_eq!(unique.len(), chain.len());
    }
}
