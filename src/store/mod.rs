// src/store/mod.rs

//! Record store abstraction.
//!
//! The scheduler never owns durable data; it reads and writes task, concept
//! and relationship records through [`RecordStore`]. The store is assumed to
//! be read-after-write consistent within a run.
//!
//! - [`model`] holds the record types.
//! - [`memory`] is an in-process implementation used by the CLI and tests.
//! - [`seed`] loads an in-memory store from a TOML seed file.

pub mod memory;
pub mod model;
pub mod seed;

use async_trait::async_trait;

use crate::types::{ConceptId, TaskId, TaskStatus};

pub use memory::InMemoryStore;
pub use model::{Concept, Relationship, TaskContext, TaskFilter, TaskRecord};
pub use seed::{SeedFile, load_seed};

/// Storage abstraction for tasks, concepts and relationships.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // === Task operations ===

    /// Load the given tasks. Unknown ids are skipped.
    async fn load_tasks(&self, ids: &[TaskId]) -> anyhow::Result<Vec<TaskRecord>>;

    /// List pending tasks in creation order.
    async fn list_pending_tasks(&self, filter: &TaskFilter) -> anyhow::Result<Vec<TaskRecord>>;

    /// Persist a new task.
    async fn create_task(&self, task: TaskRecord) -> anyhow::Result<TaskRecord>;

    /// Update a task's persisted status.
    async fn update_task_status(&self, id: &TaskId, status: TaskStatus) -> anyhow::Result<()>;

    // === Concept operations ===

    async fn load_concept(&self, id: &ConceptId) -> anyhow::Result<Option<Concept>>;

    /// Load the given concepts. Unknown ids are skipped.
    async fn load_concepts(&self, ids: &[ConceptId]) -> anyhow::Result<Vec<Concept>>;

    // === Relationship operations ===

    /// Edges whose source is `id`.
    async fn relationships_from(&self, id: &ConceptId) -> anyhow::Result<Vec<Relationship>>;

    /// Edges whose target is `id`.
    async fn relationships_to(&self, id: &ConceptId) -> anyhow::Result<Vec<Relationship>>;

    /// Persist a new edge. Duplicate edges are ignored.
    async fn create_relationship(&self, relationship: Relationship) -> anyhow::Result<()>;
}
