// src/engine/discovery.rs

//! Runtime growth of a run from graph edges and semantic similarity.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::DiscoverySection;
use crate::dag::{GraphAccessor, PrerequisiteLookup};
use crate::engine::admission::score_or_neutral;
use crate::engine::callbacks::RunCallbacks;
use crate::engine::detached::spawn_detached;
use crate::engine::run_state::{RunState, RunTask};
use crate::exec::{RelevanceScorer, ScoringContext, SemanticSearch};
use crate::store::{Concept, RecordStore, Relationship, TaskRecord};
use crate::types::{ConceptId, RelationshipKind};

/// How a candidate was found.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Origin {
    Graph(RelationshipKind),
    Semantic(f64),
}

#[derive(Debug, Clone)]
pub struct Found {
    pub concept: Concept,
    pub origin: Origin,
}

/// Per-run discovery settings and collaborators.
pub struct Discovery {
    pub graph: GraphAccessor,
    pub store: Arc<dyn RecordStore>,
    pub semantic: Arc<dyn SemanticSearch>,
    pub scorer: Arc<dyn RelevanceScorer>,
    pub callbacks: Arc<dyn RunCallbacks>,
    pub settings: DiscoverySection,
    pub scoring: ScoringContext,
    pub execution_budget: usize,
    pub root_conversation_id: Option<String>,
}

impl Discovery {
    /// Look for new work after `completed` finished with `output`, and admit
    /// or defer each genuinely new candidate. Never fails: problems are
    /// logged and the affected candidate is left for a later discovery.
    pub async fn discover(&self, state: &mut RunState, completed: &Concept, output: &str) {
        let found = self.find(completed, output).await;
        debug!(concept = %completed.id, candidates = found.len(), "discovery candidates");

        for candidate in found {
            let id = candidate.concept.id.clone();
            if !state.mark_known(&id) {
                continue;
            }
            state.considered += 1;

            let score = score_or_neutral(self.scorer.as_ref(), &self.scoring, &candidate.concept).await;
            let threshold = self.scorer.threshold(self.scoring.role.as_deref());
            if score < threshold {
                state.log.info(format!(
                    "skipped {} (relevance {score:.2} below {threshold:.2})",
                    candidate.concept.name
                ));
                continue;
            }

            if let Err(err) = self.admit(state, completed, &candidate).await {
                state.forget(&id);
                state.log.warn(format!(
                    "could not admit discovered concept {}: {err:#}",
                    candidate.concept.name
                ));
            }
        }
    }

    async fn find(&self, completed: &Concept, output: &str) -> Vec<Found> {
        let mut found: Vec<Found> = Vec::new();

        match self.graph.discovery_neighbors(&completed.id).await {
            Ok(neighbors) => {
                let ids: Vec<ConceptId> = neighbors.iter().map(|n| n.concept_id.clone()).collect();
                match self.store.load_concepts(&ids).await {
                    Ok(concepts) => {
                        for neighbor in neighbors {
                            if let Some(concept) =
                                concepts.iter().find(|c| c.id == neighbor.concept_id)
                            {
                                found.push(Found {
                                    concept: concept.clone(),
                                    origin: Origin::Graph(neighbor.kind),
                                });
                            }
                        }
                    }
                    Err(err) => {
                        warn!(concept = %completed.id, error = %err, "failed to load neighbour concepts")
                    }
                }
            }
            Err(err) => {
                warn!(concept = %completed.id, error = %err, "graph discovery failed")
            }
        }

        if !output.trim().is_empty() {
            match self
                .semantic
                .similar_concepts(output, self.settings.semantic_threshold, self.settings.semantic_limit)
                .await
            {
                Ok(similar) => {
                    for hit in similar {
                        if hit.concept.id == completed.id
                            || found.iter().any(|f| f.concept.id == hit.concept.id)
                        {
                            continue;
                        }
                        found.push(Found {
                            concept: hit.concept,
                            origin: Origin::Semantic(hit.similarity),
                        });
                    }
                }
                Err(err) => {
                    warn!(concept = %completed.id, error = %err, "semantic discovery failed")
                }
            }
        }

        found
    }

    async fn admit(
        &self,
        state: &mut RunState,
        completed: &Concept,
        candidate: &Found,
    ) -> anyhow::Result<()> {
        let concept = &candidate.concept;
        // Nothing is persisted until the conversation exists.
        let conversation = self
            .callbacks
            .create_conversation_for_concept(concept)
            .await?;
        let record = self.store.create_task(TaskRecord::pending(concept)).await?;

        if let Origin::Semantic(similarity) = candidate.origin {
            debug!(source = %completed.id, target = %concept.id, similarity, "linking semantic discovery");
            let store = Arc::clone(&self.store);
            let link = Relationship {
                source: completed.id.clone(),
                target: concept.id.clone(),
                kind: RelationshipKind::Related,
            };
            spawn_detached("link-semantic-discovery", async move {
                store.create_relationship(link).await
            });
        }

        self.callbacks
            .on_concept_discovered(concept, conversation.as_deref());

        if state.admitted() < self.execution_budget {
            let mut task = RunTask::new(record.id.clone(), concept.clone(), record.name.clone());
            task.context = record.context();
            task.conversation_id = conversation.or_else(|| self.root_conversation_id.clone());
            task.prerequisites = self.open_prerequisites(state, &concept.id).await;
            state.admit(task);
            state.discovered += 1;
            state.log.info(format!("discovered {} via {}", concept.name, describe(candidate.origin)));
            self.hold_dependents(state, concept).await;
        } else {
            state.deferred += 1;
            state.log.info(format!(
                "discovered {} via {}; deferred (budget of {} reached)",
                concept.name,
                describe(candidate.origin),
                self.execution_budget
            ));
        }
        Ok(())
    }

    /// In-run prerequisites of `concept` that have not completed.
    async fn open_prerequisites(&self, state: &RunState, concept: &ConceptId) -> Vec<ConceptId> {
        let prerequisites = match self.graph.prerequisites_of(concept).await {
            Ok(prerequisites) => prerequisites,
            Err(err) => {
                warn!(concept = %concept, error = %err, "failed to load prerequisites of discovered concept");
                return Vec::new();
            }
        };
        let mut open: Vec<ConceptId> = Vec::new();
        for prerequisite in prerequisites {
            if state.has_open_task(&prerequisite) && !open.contains(&prerequisite) {
                open.push(prerequisite);
            }
        }
        open
    }

    /// Tasks already in the run that list `concept` as a prerequisite wait
    /// for it too, unless they have started.
    async fn hold_dependents(&self, state: &mut RunState, concept: &Concept) {
        let dependents = match self.graph.dependents_of(&concept.id).await {
            Ok(dependents) => dependents,
            Err(err) => {
                warn!(concept = %concept.id, error = %err, "failed to load dependents of discovered concept");
                return;
            }
        };
        for dependent in dependents {
            if state.add_prerequisite(&dependent, &concept.id) > 0 {
                state
                    .log
                    .info(format!("{dependent} now waits on {}", concept.name));
            }
        }
    }
}

fn describe(origin: Origin) -> String {
    match origin {
        Origin::Graph(RelationshipKind::Prerequisite) => "prerequisite edge".to_string(),
        Origin::Graph(RelationshipKind::Related) => "related edge".to_string(),
        Origin::Graph(RelationshipKind::Advanced) => "advanced edge".to_string(),
        Origin::Semantic(similarity) => format!("semantic match ({similarity:.2})"),
    }
}
