#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use yolo::exec::{
    RelevanceScorer, ScoringContext, SemanticSearch, SimilarConcept, StepExecutor, StepRequest,
    StepResult, WorkflowGenerator, WorkflowStep,
};
use yolo::store::{Concept, TaskContext};
use yolo::types::ConceptId;

/// What the executor saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    Started { concept: ConceptId, step: usize },
    Finished { concept: ConceptId, step: usize },
}

#[derive(Debug, Default)]
struct ExecState {
    events: Vec<ExecEvent>,
    active: HashMap<ConceptId, usize>,
    max_active: HashMap<ConceptId, usize>,
    active_total: usize,
    max_active_total: usize,
    /// First-step executions per concept.
    attempts: HashMap<ConceptId, usize>,
    /// Remaining scripted failures per concept.
    failures_left: HashMap<ConceptId, usize>,
}

/// A step executor that:
/// - records which steps ran and how many ran concurrently
/// - fails concepts according to a script
/// - sleeps for a fixed delay per step.
pub struct ScriptedExecutor {
    delay: Duration,
    always_fail: HashSet<ConceptId>,
    state: Mutex<ExecState>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(5),
            always_fail: HashSet::new(),
            state: Mutex::new(ExecState::default()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every step of `concept` fails.
    pub fn always_fail(mut self, concept: &str) -> Self {
        self.always_fail.insert(concept.into());
        self
    }

    /// The first `times` steps attempted for `concept` fail.
    pub fn fail_times(self, concept: &str, times: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .failures_left
            .insert(concept.into(), times);
        self
    }

    pub fn events(&self) -> Vec<ExecEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// Highest number of steps observed running at once for `concept`.
    pub fn max_concurrent(&self, concept: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .max_active
            .get(&ConceptId::from(concept))
            .copied()
            .unwrap_or(0)
    }

    pub fn max_concurrent_total(&self) -> usize {
        self.state.lock().unwrap().max_active_total
    }

    /// Times the first step of `concept` was executed.
    pub fn attempts(&self, concept: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .attempts
            .get(&ConceptId::from(concept))
            .copied()
            .unwrap_or(0)
    }

    /// Index in `events()` of the first step start for `concept`.
    pub fn first_start(&self, concept: &str) -> Option<usize> {
        let concept = ConceptId::from(concept);
        self.events()
            .iter()
            .position(|e| matches!(e, ExecEvent::Started { concept: c, .. } if *c == concept))
    }

    /// Index in `events()` of the last step finish for `concept`.
    pub fn last_finish(&self, concept: &str) -> Option<usize> {
        let concept = ConceptId::from(concept);
        self.events()
            .iter()
            .rposition(|e| matches!(e, ExecEvent::Finished { concept: c, .. } if *c == concept))
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &StepRequest,
        on_chunk: &(dyn for<'c> Fn(&'c str) + Send + Sync),
    ) -> anyhow::Result<StepResult> {
        let concept = request.concept.id.clone();
        let scripted_failure = {
            let mut state = self.state.lock().unwrap();
            state.events.push(ExecEvent::Started {
                concept: concept.clone(),
                step: request.index,
            });
            if request.index == 0 {
                *state.attempts.entry(concept.clone()).or_default() += 1;
            }
            let active = state.active.entry(concept.clone()).or_default();
            *active += 1;
            let now = *active;
            let max = state.max_active.entry(concept.clone()).or_default();
            *max = (*max).max(now);
            state.active_total += 1;
            state.max_active_total = state.max_active_total.max(state.active_total);

            match state.failures_left.get_mut(&concept) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };

        tokio::time::sleep(self.delay).await;
        on_chunk("working");

        {
            let mut state = self.state.lock().unwrap();
            if let Some(active) = state.active.get_mut(&concept) {
                *active -= 1;
            }
            state.active_total -= 1;
            state.events.push(ExecEvent::Finished {
                concept: concept.clone(),
                step: request.index,
            });
        }

        if scripted_failure || self.always_fail.contains(&concept) {
            anyhow::bail!("scripted failure for {concept}");
        }
        Ok(StepResult {
            content: format!("{} step {} done", request.concept.name, request.index + 1),
            citations: Vec::new(),
        })
    }
}

/// Generates `steps` numbered steps for every concept.
pub struct FixedWorkflow {
    pub steps: u32,
}

impl FixedWorkflow {
    pub fn new(steps: u32) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl WorkflowGenerator for FixedWorkflow {
    async fn generate(
        &self,
        concept: &Concept,
        context: Option<&TaskContext>,
    ) -> anyhow::Result<Vec<WorkflowStep>> {
        let suffix = if context.is_some() { " (tailored)" } else { "" };
        Ok((1..=self.steps)
            .map(|n| WorkflowStep {
                step_number: n,
                title: format!("{} part {n}{suffix}", concept.name),
                description: String::new(),
                prompt_template: String::new(),
                expected_outcome: String::new(),
                estimated_minutes: 10,
            })
            .collect())
    }
}

/// Scores from a lookup table; unknown concepts get `default`.
pub struct TableScorer {
    pub scores: HashMap<String, f64>,
    pub default: f64,
    pub threshold: f64,
    pub failing: bool,
}

impl TableScorer {
    pub fn new(default: f64) -> Self {
        Self {
            scores: HashMap::new(),
            default,
            threshold: 0.0,
            failing: false,
        }
    }

    pub fn score(mut self, concept: &str, score: f64) -> Self {
        self.scores.insert(concept.to_string(), score);
        self
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }
}

#[async_trait]
impl RelevanceScorer for TableScorer {
    async fn score(&self, candidate: &Concept, _context: &ScoringContext) -> anyhow::Result<f64> {
        if self.failing {
            anyhow::bail!("scorer unavailable");
        }
        Ok(self
            .scores
            .get(candidate.id.as_str())
            .copied()
            .unwrap_or(self.default))
    }

    fn threshold(&self, _role: Option<&str>) -> f64 {
        self.threshold
    }
}

/// Returns `hits` whenever the searched text mentions `trigger`.
#[derive(Default)]
pub struct TableSemanticSearch {
    rules: Vec<(String, SimilarConcept)>,
}

impl TableSemanticSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, trigger: &str, concept: &str, similarity: f64) -> Self {
        self.rules.push((
            trigger.to_string(),
            SimilarConcept {
                concept: Concept {
                    id: concept.into(),
                    name: concept.to_string(),
                    category: "general".to_string(),
                },
                similarity,
            },
        ));
        self
    }
}

#[async_trait]
impl SemanticSearch for TableSemanticSearch {
    async fn similar_concepts(
        &self,
        text: &str,
        threshold: f64,
        limit: usize,
    ) -> anyhow::Result<Vec<SimilarConcept>> {
        Ok(self
            .rules
            .iter()
            .filter(|(trigger, hit)| text.contains(trigger.as_str()) && hit.similarity >= threshold)
            .map(|(_, hit)| hit.clone())
            .take(limit)
            .collect())
    }
}
