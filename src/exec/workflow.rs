// src/exec/workflow.rs

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::YoloError;
use crate::exec::backend::WorkflowGenerator;
use crate::store::{Concept, TaskContext};
use crate::types::ConceptId;

/// One generative unit of a concept's work breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// 1-based position within the workflow.
    pub step_number: u32,
    pub title: String,
    pub description: String,
    /// Opaque to the scheduler; interpreted by the step executor.
    pub prompt_template: String,
    pub expected_outcome: String,
    pub estimated_minutes: u32,
}

/// Per-concept workflow cache.
///
/// Generic workflows are generated once per concept and kept for the life of
/// the cache. Tasks with rich context get a task-specific workflow that is
/// never cached.
pub struct WorkflowCache {
    generator: Arc<dyn WorkflowGenerator>,
    generic: RwLock<HashMap<ConceptId, Arc<Vec<WorkflowStep>>>>,
    rich_context_chars: usize,
}

impl WorkflowCache {
    pub fn new(generator: Arc<dyn WorkflowGenerator>, rich_context_chars: usize) -> Self {
        Self {
            generator,
            generic: RwLock::new(HashMap::new()),
            rich_context_chars,
        }
    }

    /// Steps for `concept`, personalised for `context` when it is rich.
    ///
    /// An empty workflow is an error for the caller's task.
    pub async fn steps_for(
        &self,
        concept: &Concept,
        context: Option<&TaskContext>,
    ) -> anyhow::Result<Arc<Vec<WorkflowStep>>> {
        if let Some(ctx) = context.filter(|c| c.is_rich(self.rich_context_chars)) {
            debug!(concept = %concept.id, "generating task-specific workflow");
            let steps = self.generator.generate(concept, Some(ctx)).await?;
            return non_empty(concept, steps).map(Arc::new);
        }

        if let Some(steps) = self.generic.read().await.get(&concept.id) {
            return Ok(Arc::clone(steps));
        }

        debug!(concept = %concept.id, "generating generic workflow");
        let steps = Arc::new(non_empty(concept, self.generator.generate(concept, None).await?)?);

        // Another caller may have raced us; the first stored workflow wins.
        let mut generic = self.generic.write().await;
        let stored = generic
            .entry(concept.id.clone())
            .or_insert_with(|| Arc::clone(&steps));
        Ok(Arc::clone(stored))
    }

    pub async fn is_cached(&self, concept: &ConceptId) -> bool {
        self.generic.read().await.contains_key(concept)
    }
}

fn non_empty(concept: &Concept, steps: Vec<WorkflowStep>) -> anyhow::Result<Vec<WorkflowStep>> {
    if steps.is_empty() {
        return Err(YoloError::EmptyWorkflow(concept.id.to_string()).into());
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
        empty: bool,
    }

    #[async_trait]
    impl WorkflowGenerator for CountingGenerator {
        async fn generate(
            &self,
            concept: &Concept,
            context: Option<&TaskContext>,
        ) -> anyhow::Result<Vec<WorkflowStep>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.empty {
                return Ok(Vec::new());
            }
            let title = match context {
                Some(_) => format!("{} (tailored)", concept.name),
                None => concept.name.clone(),
            };
            Ok(vec![WorkflowStep {
                step_number: 1,
                title,
                description: String::new(),
                prompt_template: String::new(),
                expected_outcome: String::new(),
                estimated_minutes: 5,
            }])
        }
    }

    fn concept() -> Concept {
        Concept {
            id: "pricing".into(),
            name: "Pricing".into(),
            category: "sales".into(),
        }
    }

    #[tokio::test]
    async fn generic_workflows_are_generated_once() {
        let generator = Arc::new(CountingGenerator::default());
        let cache = WorkflowCache::new(generator.clone(), 200);

        let plain = TaskContext::default();
        cache.steps_for(&concept(), Some(&plain)).await.unwrap();
        cache.steps_for(&concept(), None).await.unwrap();

        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_cached(&"pricing".into()).await);
    }

    #[tokio::test]
    async fn rich_context_bypasses_the_cache() {
        let generator = Arc::new(CountingGenerator::default());
        let cache = WorkflowCache::new(generator.clone(), 10);

        let rich = TaskContext {
            content: Some("a long description of what the user wants".into()),
            ..TaskContext::default()
        };
        let first = cache.steps_for(&concept(), Some(&rich)).await.unwrap();
        cache.steps_for(&concept(), Some(&rich)).await.unwrap();

        assert_eq!(first[0].title, "Pricing (tailored)");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert!(!cache.is_cached(&"pricing".into()).await);
    }

    #[tokio::test]
    async fn empty_workflow_is_an_error_and_not_cached() {
        let generator = Arc::new(CountingGenerator {
            empty: true,
            ..CountingGenerator::default()
        });
        let cache = WorkflowCache::new(generator, 200);

        let err = cache.steps_for(&concept(), None).await.unwrap_err();
        assert!(err.to_string().contains("pricing"));
        assert!(!cache.is_cached(&"pricing".into()).await);
    }
}
