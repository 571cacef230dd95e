use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use yolo::dag::{DependencyResolver, GraphAccessor, ResolvedOrder};
use yolo::store::{InMemoryStore, Relationship};
use yolo::types::{ConceptId, RelationshipKind};

fn concept(i: usize) -> ConceptId {
    ConceptId::from(format!("c{i}"))
}

/// Resolve `input` against a store holding `edges` as prerequisite edges.
fn resolve(edges: &[(usize, usize)], input: &[usize]) -> ResolvedOrder {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        let store = InMemoryStore::new();
        for &(before, after) in edges {
            store
                .insert_relationship(Relationship {
                    source: concept(before),
                    target: concept(after),
                    kind: RelationshipKind::Prerequisite,
                })
                .await;
        }
        let graph = GraphAccessor::new(Arc::new(store));
        let ids: Vec<ConceptId> = input.iter().map(|&i| concept(i)).collect();
        DependencyResolver::default().resolve(&graph, &ids).await
    })
}

// Arbitrary graphs over up to 8 concepts, cycles and self-loops included.
fn graph_strategy() -> impl Strategy<Value = (Vec<(usize, usize)>, Vec<usize>)> {
    (1..=8usize).prop_flat_map(|n| {
        (
            proptest::collection::vec((0..n, 0..n), 0..16),
            proptest::collection::vec(0..n, 1..12),
        )
    })
}

// Acyclic graphs: edges only run from lower to higher index.
fn dag_strategy() -> impl Strategy<Value = (Vec<(usize, usize)>, Vec<usize>)> {
    (2..=8usize).prop_flat_map(|n| {
        (
            proptest::collection::vec((0..n, 0..n), 0..16).prop_map(|raw| {
                raw.into_iter()
                    .filter(|(a, b)| a != b)
                    .map(|(a, b)| (a.min(b), a.max(b)))
                    .collect::<Vec<_>>()
            }),
            proptest::collection::vec(0..n, 1..12),
        )
    })
}

proptest! {
    #[test]
    fn order_is_a_permutation_of_the_distinct_input((edges, input) in graph_strategy()) {
        let resolved = resolve(&edges, &input);

        let expected: HashSet<ConceptId> = input.iter().map(|&i| concept(i)).collect();
        let actual: HashSet<ConceptId> = resolved.order.iter().cloned().collect();
        prop_assert_eq!(resolved.order.len(), expected.len());
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prerequisites_always_come_earlier((edges, input) in graph_strategy()) {
        let resolved = resolve(&edges, &input);

        for (position, id) in resolved.order.iter().enumerate() {
            for prereq in resolved.prerequisites_of(id) {
                let before = resolved.position(prereq);
                prop_assert!(before.is_some_and(|p| p < position),
                    "{} listed as prerequisite of {} but not placed before it", prereq, id);
            }
        }
    }

    #[test]
    fn acyclic_graphs_keep_every_in_set_edge((edges, input) in dag_strategy()) {
        let resolved = resolve(&edges, &input);
        prop_assert_eq!(resolved.cycles_broken, 0);

        for &(before, after) in &edges {
            let (Some(b), Some(a)) = (resolved.position(&concept(before)), resolved.position(&concept(after))) else {
                continue;
            };
            prop_assert!(b < a, "c{} should precede c{}", before, after);
        }
    }
}
