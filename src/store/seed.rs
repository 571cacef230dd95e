// src/store/seed.rs

//! TOML seed files for the in-memory store.
//!
//! ```toml
//! [[concept]]
//! id = "cash-flow"
//! name = "Cash flow basics"
//! category = "finance"
//!
//! [[relationship]]
//! source = "cash-flow"
//! target = "pricing"
//! kind = "prerequisite"
//!
//! [[task]]
//! id = "t-1"
//! concept = "pricing"
//! title = "Rework our price list"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use chrono::Utc;
use serde::Deserialize;

use super::InMemoryStore;
use super::model::{Concept, Relationship, TaskRecord};
use crate::errors::{Result, YoloError};
use crate::types::{RelationshipKind, TaskStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub concept: Vec<SeedConcept>,

    #[serde(default)]
    pub relationship: Vec<SeedRelationship>,

    #[serde(default)]
    pub task: Vec<SeedTask>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConcept {
    pub id: String,
    pub name: String,
    #[serde(default = "default_category")]
    pub category: String,
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedRelationship {
    pub source: String,
    pub target: String,
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedTask {
    pub id: String,
    pub concept: String,
    /// Defaults to the concept's name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

/// Read, validate and load a seed file into a fresh [`InMemoryStore`].
pub async fn load_seed(path: impl AsRef<Path>) -> Result<InMemoryStore> {
    let contents = fs::read_to_string(path.as_ref())?;
    let seed: SeedFile = toml::from_str(&contents)?;
    seed.into_store().await
}

impl SeedFile {
    /// Validate references and build an [`InMemoryStore`] from this seed.
    pub async fn into_store(self) -> Result<InMemoryStore> {
        let known: HashSet<&str> = self.concept.iter().map(|c| c.id.as_str()).collect();

        for rel in &self.relationship {
            for end in [&rel.source, &rel.target] {
                if !known.contains(end.as_str()) {
                    return Err(YoloError::ConfigError(format!(
                        "relationship {} -> {} references unknown concept '{}'",
                        rel.source, rel.target, end
                    )));
                }
            }
        }
        for task in &self.task {
            if !known.contains(task.concept.as_str()) {
                return Err(YoloError::ConfigError(format!(
                    "task '{}' references unknown concept '{}'",
                    task.id, task.concept
                )));
            }
        }

        let store = InMemoryStore::new();

        for c in &self.concept {
            store
                .insert_concept(Concept {
                    id: c.id.as_str().into(),
                    name: c.name.clone(),
                    category: c.category.clone(),
                })
                .await;
        }

        for rel in &self.relationship {
            let kind: RelationshipKind = rel.kind.parse().map_err(YoloError::ConfigError)?;
            store
                .insert_relationship(Relationship {
                    source: rel.source.as_str().into(),
                    target: rel.target.as_str().into(),
                    kind,
                })
                .await;
        }

        for t in self.task {
            let name = match t.name {
                Some(name) => name,
                None => self
                    .concept
                    .iter()
                    .find(|c| c.id == t.concept)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| t.concept.clone()),
            };
            store
                .insert_task(TaskRecord {
                    id: t.id.into(),
                    concept_id: t.concept.into(),
                    name,
                    status: TaskStatus::Pending,
                    retries: 0,
                    title: t.title,
                    content: t.content,
                    conversation_id: t.conversation_id,
                    created_at: Utc::now(),
                })
                .await;
        }

        Ok(store)
    }
}
