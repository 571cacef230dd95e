#![allow(dead_code)]

use std::sync::Arc;

use yolo::config::SchedulerConfig;
use yolo::store::{Concept, InMemoryStore, Relationship, TaskRecord};
use yolo::types::{RelationshipKind, TaskId};

/// Builder for a seeded `InMemoryStore` to simplify test setup.
pub struct SeedBuilder {
    concepts: Vec<Concept>,
    relationships: Vec<Relationship>,
    tasks: Vec<TaskRecord>,
}

impl SeedBuilder {
    pub fn new() -> Self {
        Self {
            concepts: Vec::new(),
            relationships: Vec::new(),
            tasks: Vec::new(),
        }
    }

    /// Add a concept in the "general" category.
    pub fn concept(self, id: &str) -> Self {
        self.concept_in(id, "general")
    }

    pub fn concept_in(mut self, id: &str, category: &str) -> Self {
        self.concepts.push(Concept {
            id: id.into(),
            name: id.to_string(),
            category: category.to_string(),
        });
        self
    }

    /// `before` must complete before `after` may start.
    pub fn prerequisite(self, before: &str, after: &str) -> Self {
        self.edge(before, after, RelationshipKind::Prerequisite)
    }

    pub fn related(self, source: &str, target: &str) -> Self {
        self.edge(source, target, RelationshipKind::Related)
    }

    pub fn edge(mut self, source: &str, target: &str, kind: RelationshipKind) -> Self {
        self.relationships.push(Relationship {
            source: source.into(),
            target: target.into(),
            kind,
        });
        self
    }

    /// Add a pending task with a fixed id for `concept`.
    pub fn task(mut self, id: &str, concept: &str) -> Self {
        let concept = self
            .concepts
            .iter()
            .find(|c| c.id.as_str() == concept)
            .cloned()
            .unwrap_or_else(|| panic!("task {id}: unknown concept {concept}"));
        let mut task = TaskRecord::pending(&concept);
        task.id = TaskId::from(id);
        self.tasks.push(task);
        self
    }

    /// Attach a title/content to the most recently added task.
    pub fn with_context(mut self, title: &str, content: &str) -> Self {
        let task = self.tasks.last_mut().expect("with_context needs a task");
        task.title = Some(title.to_string());
        task.content = Some(content.to_string());
        self
    }

    pub async fn build(self) -> Arc<InMemoryStore> {
        let store = InMemoryStore::new();
        for concept in self.concepts {
            store.insert_concept(concept).await;
        }
        for rel in self.relationships {
            store.insert_relationship(rel).await;
        }
        for task in self.tasks {
            store.insert_task(task).await;
        }
        Arc::new(store)
    }
}

impl Default for SeedBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler config with millisecond-scale delays.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        max_concurrency: 3,
        max_concepts_hard_stop: 50,
        retry_attempts: 2,
        retry_base_delay_ms: 1,
        circuit_breaker_cooldown_ms: 10,
        circuit_breaker_threshold: 3,
        execution_budget: 1000,
        backpressure_queue_length: 50,
        research_batch_size: None,
        research_turns: None,
    }
}
