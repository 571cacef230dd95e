#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use yolo::store::{Concept, InMemoryStore, RecordStore, Relationship, TaskFilter, TaskRecord};
use yolo::types::{ConceptId, TaskId, TaskStatus};

/// A `RecordStore` that delegates to an `InMemoryStore` but fails chosen
/// operations on purpose.
pub struct FlakyStore {
    inner: Arc<InMemoryStore>,
    create_failures: Mutex<HashMap<ConceptId, usize>>,
    fail_status_updates: bool,
    fail_incoming_edges: HashSet<ConceptId>,
}

impl FlakyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            create_failures: Mutex::new(HashMap::new()),
            fail_status_updates: false,
            fail_incoming_edges: HashSet::new(),
        }
    }

    /// The next `times` task creations for `concept` fail.
    pub fn fail_create_task(self, concept: &str, times: usize) -> Self {
        self.create_failures
            .lock()
            .unwrap()
            .insert(concept.into(), times);
        self
    }

    /// Every `update_task_status` call fails.
    pub fn fail_status_updates(mut self) -> Self {
        self.fail_status_updates = true;
        self
    }

    /// `relationships_to(concept)` fails.
    pub fn fail_incoming_edges(mut self, concept: &str) -> Self {
        self.fail_incoming_edges.insert(concept.into());
        self
    }

    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn load_tasks(&self, ids: &[TaskId]) -> anyhow::Result<Vec<TaskRecord>> {
        self.inner.load_tasks(ids).await
    }

    async fn list_pending_tasks(&self, filter: &TaskFilter) -> anyhow::Result<Vec<TaskRecord>> {
        self.inner.list_pending_tasks(filter).await
    }

    async fn create_task(&self, task: TaskRecord) -> anyhow::Result<TaskRecord> {
        let fail = {
            let mut failures = self.create_failures.lock().unwrap();
            match failures.get_mut(&task.concept_id) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            anyhow::bail!("injected create_task failure for {}", task.concept_id);
        }
        self.inner.create_task(task).await
    }

    async fn update_task_status(&self, id: &TaskId, status: TaskStatus) -> anyhow::Result<()> {
        if self.fail_status_updates {
            anyhow::bail!("injected update_task_status failure for {id}");
        }
        self.inner.update_task_status(id, status).await
    }

    async fn load_concept(&self, id: &ConceptId) -> anyhow::Result<Option<Concept>> {
        self.inner.load_concept(id).await
    }

    async fn load_concepts(&self, ids: &[ConceptId]) -> anyhow::Result<Vec<Concept>> {
        self.inner.load_concepts(ids).await
    }

    async fn relationships_from(&self, id: &ConceptId) -> anyhow::Result<Vec<Relationship>> {
        self.inner.relationships_from(id).await
    }

    async fn relationships_to(&self, id: &ConceptId) -> anyhow::Result<Vec<Relationship>> {
        if self.fail_incoming_edges.contains(id) {
            anyhow::bail!("injected relationships_to failure for {id}");
        }
        self.inner.relationships_to(id).await
    }

    async fn create_relationship(&self, relationship: Relationship) -> anyhow::Result<()> {
        self.inner.create_relationship(relationship).await
    }
}
