// src/engine/admission.rs

//! Budget ranking of candidate tasks.

use tracing::{debug, warn};

use crate::exec::{RelevanceScorer, ScoringContext};
use crate::store::{Concept, TaskRecord};

/// Score every candidate gets when scoring is unavailable.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// A pending task paired with its concept.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub task: TaskRecord,
    pub concept: Concept,
}

#[derive(Debug, Default)]
pub struct Admission {
    /// Highest-scoring candidates, at most `budget`.
    pub admitted: Vec<Candidate>,
    /// Left pending in the store for a future run.
    pub held_back: Vec<Candidate>,
}

/// Keep the `budget` most relevant candidates.
///
/// Scoring only happens when the pool exceeds the budget. If scoring any
/// candidate fails, every candidate gets [`NEUTRAL_SCORE`] and the original
/// order decides.
pub async fn rank_for_budget(
    scorer: &dyn RelevanceScorer,
    context: &ScoringContext,
    candidates: Vec<Candidate>,
    budget: usize,
) -> Admission {
    if candidates.len() <= budget {
        return Admission {
            admitted: candidates,
            held_back: Vec::new(),
        };
    }

    let mut scores = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        match scorer.score(&candidate.concept, context).await {
            Ok(score) => scores.push(score),
            Err(err) => {
                warn!(
                    concept = %candidate.concept.id,
                    error = %err,
                    "relevance scoring failed; using neutral scores for all candidates"
                );
                scores = vec![NEUTRAL_SCORE; candidates.len()];
                break;
            }
        }
    }

    let mut ranked: Vec<(f64, Candidate)> = scores.into_iter().zip(candidates).collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut admission = Admission::default();
    for (i, (score, candidate)) in ranked.into_iter().enumerate() {
        debug!(concept = %candidate.concept.id, score, admitted = i < budget, "ranked candidate");
        if i < budget {
            admission.admitted.push(candidate);
        } else {
            admission.held_back.push(candidate);
        }
    }
    admission
}

/// Score a single discovered candidate, falling back to [`NEUTRAL_SCORE`].
pub async fn score_or_neutral(
    scorer: &dyn RelevanceScorer,
    context: &ScoringContext,
    concept: &Concept,
) -> f64 {
    match scorer.score(concept, context).await {
        Ok(score) => score,
        Err(err) => {
            warn!(concept = %concept.id, error = %err, "relevance scoring failed; using neutral score");
            NEUTRAL_SCORE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct TableScorer {
        scores: HashMap<&'static str, f64>,
    }

    #[async_trait]
    impl RelevanceScorer for TableScorer {
        async fn score(&self, candidate: &Concept, _: &ScoringContext) -> anyhow::Result<f64> {
            self.scores
                .get(candidate.id.as_str())
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no score for {}", candidate.id))
        }

        fn threshold(&self, _role: Option<&str>) -> f64 {
            0.0
        }
    }

    fn candidates(ids: &[&str]) -> Vec<Candidate> {
        ids.iter()
            .map(|id| {
                let concept = Concept {
                    id: (*id).into(),
                    name: id.to_string(),
                    category: "general".into(),
                };
                Candidate {
                    task: TaskRecord::pending(&concept),
                    concept,
                }
            })
            .collect()
    }

    fn ids(list: &[Candidate]) -> Vec<&str> {
        list.iter().map(|c| c.concept.id.as_str()).collect()
    }

    #[tokio::test]
    async fn pools_within_budget_are_not_scored() {
        let scorer = TableScorer {
            scores: HashMap::new(),
        };
        let admission =
            rank_for_budget(&scorer, &ScoringContext::default(), candidates(&["a", "b"]), 2).await;
        assert_eq!(ids(&admission.admitted), vec!["a", "b"]);
        assert!(admission.held_back.is_empty());
    }

    #[tokio::test]
    async fn admits_highest_scores() {
        let scorer = TableScorer {
            scores: HashMap::from([("a", 0.1), ("b", 0.9), ("c", 0.5)]),
        };
        let admission =
            rank_for_budget(&scorer, &ScoringContext::default(), candidates(&["a", "b", "c"]), 2)
                .await;
        assert_eq!(ids(&admission.admitted), vec!["b", "c"]);
        assert_eq!(ids(&admission.held_back), vec!["a"]);
    }

    #[tokio::test]
    async fn scoring_failure_falls_back_to_original_order() {
        let scorer = TableScorer {
            scores: HashMap::from([("a", 0.1), ("c", 0.9)]),
        };
        let admission =
            rank_for_budget(&scorer, &ScoringContext::default(), candidates(&["a", "b", "c"]), 2)
                .await;
        assert_eq!(ids(&admission.admitted), vec!["a", "b"]);
        assert_eq!(ids(&admission.held_back), vec!["c"]);
    }
}
