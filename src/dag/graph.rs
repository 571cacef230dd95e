// src/dag/graph.rs

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::store::RecordStore;
use crate::types::{ConceptId, RelationshipKind};

/// Source of `PREREQUISITE` edges for the resolver.
///
/// Kept as a trait so the resolver can be exercised without a store.
#[async_trait]
pub trait PrerequisiteLookup: Send + Sync {
    /// Concepts that must be completed before `concept` may start.
    async fn prerequisites_of(&self, concept: &ConceptId) -> anyhow::Result<Vec<ConceptId>>;
}

/// A concept reachable from another through a discovery edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Neighbor {
    pub concept_id: ConceptId,
    pub kind: RelationshipKind,
}

/// Read-only view over concepts and their typed edges.
#[derive(Clone)]
pub struct GraphAccessor {
    store: Arc<dyn RecordStore>,
}

impl GraphAccessor {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Neighbours worth considering once `concept` is completed.
    ///
    /// All outgoing edges count. Incoming edges count too, except incoming
    /// `PREREQUISITE` edges: those point back at work that should already be
    /// done. Each neighbour appears once, outgoing edges first.
    pub async fn discovery_neighbors(&self, concept: &ConceptId) -> anyhow::Result<Vec<Neighbor>> {
        let outgoing = self.store.relationships_from(concept).await?;
        let incoming = self.store.relationships_to(concept).await?;

        let mut seen: HashSet<ConceptId> = HashSet::new();
        let mut neighbors = Vec::new();

        for rel in outgoing {
            if rel.target != *concept && seen.insert(rel.target.clone()) {
                neighbors.push(Neighbor {
                    concept_id: rel.target,
                    kind: rel.kind,
                });
            }
        }
        for rel in incoming {
            if rel.kind == RelationshipKind::Prerequisite {
                continue;
            }
            if rel.source != *concept && seen.insert(rel.source.clone()) {
                neighbors.push(Neighbor {
                    concept_id: rel.source,
                    kind: rel.kind,
                });
            }
        }

        Ok(neighbors)
    }

    /// Concepts that cannot start before `concept` is completed.
    pub async fn dependents_of(&self, concept: &ConceptId) -> anyhow::Result<Vec<ConceptId>> {
        let outgoing = self.store.relationships_from(concept).await?;
        Ok(outgoing
            .into_iter()
            .filter(|r| r.kind == RelationshipKind::Prerequisite)
            .map(|r| r.target)
            .collect())
    }
}

#[async_trait]
impl PrerequisiteLookup for GraphAccessor {
    async fn prerequisites_of(&self, concept: &ConceptId) -> anyhow::Result<Vec<ConceptId>> {
        let incoming = self.store.relationships_to(concept).await?;
        Ok(incoming
            .into_iter()
            .filter(|r| r.kind == RelationshipKind::Prerequisite)
            .map(|r| r.source)
            .collect())
    }
}
