// src/store/memory.rs

//! In-process [`RecordStore`] backed by plain collections.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::RecordStore;
use super::model::{Concept, Relationship, TaskFilter, TaskRecord};
use crate::types::{ConceptId, TaskId, TaskStatus};

#[derive(Debug, Default)]
struct StoreData {
    concepts: HashMap<ConceptId, Concept>,
    relationships: Vec<Relationship>,
    /// Creation order is listing order.
    tasks: Vec<TaskRecord>,
}

/// Record store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_concept(&self, concept: Concept) {
        let mut data = self.data.write().await;
        data.concepts.insert(concept.id.clone(), concept);
    }

    pub async fn insert_relationship(&self, relationship: Relationship) {
        let mut data = self.data.write().await;
        if !data.relationships.contains(&relationship) {
            data.relationships.push(relationship);
        }
    }

    pub async fn insert_task(&self, task: TaskRecord) {
        let mut data = self.data.write().await;
        data.tasks.push(task);
    }

    /// Snapshot of every task record, in creation order.
    pub async fn all_tasks(&self) -> Vec<TaskRecord> {
        self.data.read().await.tasks.clone()
    }

    pub async fn task(&self, id: &TaskId) -> Option<TaskRecord> {
        let data = self.data.read().await;
        data.tasks.iter().find(|t| &t.id == id).cloned()
    }

    pub async fn all_relationships(&self) -> Vec<Relationship> {
        self.data.read().await.relationships.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn load_tasks(&self, ids: &[TaskId]) -> anyhow::Result<Vec<TaskRecord>> {
        let data = self.data.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.tasks.iter().find(|t| &t.id == id).cloned())
            .collect())
    }

    async fn list_pending_tasks(&self, filter: &TaskFilter) -> anyhow::Result<Vec<TaskRecord>> {
        let data = self.data.read().await;
        Ok(data
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| match &filter.category {
                Some(category) => data
                    .concepts
                    .get(&t.concept_id)
                    .is_some_and(|c| &c.category == category),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn create_task(&self, task: TaskRecord) -> anyhow::Result<TaskRecord> {
        let mut data = self.data.write().await;
        debug!(task = %task.id, concept = %task.concept_id, "store: creating task");
        data.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task_status(&self, id: &TaskId, status: TaskStatus) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        let task = data
            .tasks
            .iter_mut()
            .find(|t| &t.id == id)
            .ok_or_else(|| anyhow::anyhow!("task {id} not found"))?;
        task.status = status;
        Ok(())
    }

    async fn load_concept(&self, id: &ConceptId) -> anyhow::Result<Option<Concept>> {
        Ok(self.data.read().await.concepts.get(id).cloned())
    }

    async fn load_concepts(&self, ids: &[ConceptId]) -> anyhow::Result<Vec<Concept>> {
        let data = self.data.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| data.concepts.get(id).cloned())
            .collect())
    }

    async fn relationships_from(&self, id: &ConceptId) -> anyhow::Result<Vec<Relationship>> {
        let data = self.data.read().await;
        Ok(data
            .relationships
            .iter()
            .filter(|r| &r.source == id)
            .cloned()
            .collect())
    }

    async fn relationships_to(&self, id: &ConceptId) -> anyhow::Result<Vec<Relationship>> {
        let data = self.data.read().await;
        Ok(data
            .relationships
            .iter()
            .filter(|r| &r.target == id)
            .cloned()
            .collect())
    }

    async fn create_relationship(&self, relationship: Relationship) -> anyhow::Result<()> {
        self.insert_relationship(relationship).await;
        Ok(())
    }
}
