// src/store/model.rs

//! Durable records owned by the record store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConceptId, RelationshipKind, TaskId, TaskStatus};

/// A node in the knowledge graph. Immutable from the scheduler's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub name: String,
    pub category: String,
}

/// A directed, typed edge between two concepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub source: ConceptId,
    pub target: ConceptId,
    pub kind: RelationshipKind,
}

/// A unit of pending work tied to one concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub concept_id: ConceptId,
    /// Display name.
    pub name: String,
    pub status: TaskStatus,
    pub retries: u32,
    /// Title of the originating note or request, used to personalise steps.
    pub title: Option<String>,
    /// Free-text content of the originating note or request.
    pub content: Option<String>,
    /// Prior conversation this task came out of, if any.
    pub conversation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskRecord {
    /// A fresh pending task for `concept`.
    pub fn pending(concept: &Concept) -> Self {
        Self {
            id: TaskId::generate(),
            concept_id: concept.id.clone(),
            name: concept.name.clone(),
            status: TaskStatus::Pending,
            retries: 0,
            title: None,
            content: None,
            conversation_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn context(&self) -> TaskContext {
        TaskContext {
            title: self.title.clone(),
            content: self.content.clone(),
            conversation_id: self.conversation_id.clone(),
        }
    }
}

/// Contextual text carried from a task into its concept's steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskContext {
    pub title: Option<String>,
    pub content: Option<String>,
    pub conversation_id: Option<String>,
}

impl TaskContext {
    /// Whether this context warrants a task-specific workflow instead of the
    /// cached generic one.
    pub fn is_rich(&self, content_threshold: usize) -> bool {
        self.conversation_id.is_some()
            || self
                .content
                .as_deref()
                .is_some_and(|c| c.chars().count() > content_threshold)
    }
}

/// Filter for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    /// Only tasks whose concept belongs to this category.
    pub category: Option<String>,
}
