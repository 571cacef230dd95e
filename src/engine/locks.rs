// src/engine/locks.rs

//! Advisory per-concept mutex.
//!
//! This, not the worker pool, is what keeps two tasks off the same concept
//! at once. A lock older than the TTL is treated as abandoned and may be
//! taken over; a merely slow holder can therefore briefly overlap with the
//! new one.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::types::{ConceptId, TaskId};

#[derive(Debug, Clone)]
struct LockHolder {
    task_id: TaskId,
    acquired_at: Instant,
}

/// Result of [`ConceptLocks::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    /// The lock was free, or already held by the same task.
    Acquired,
    /// The previous holder's lock had expired and was taken over.
    Stolen { previous: TaskId },
    /// Held by another task.
    Held { holder: TaskId },
}

impl Acquire {
    pub fn is_acquired(&self) -> bool {
        !matches!(self, Acquire::Held { .. })
    }
}

#[derive(Debug)]
pub struct ConceptLocks {
    held: HashMap<ConceptId, LockHolder>,
    ttl: Duration,
}

impl ConceptLocks {
    pub fn new(ttl: Duration) -> Self {
        Self {
            held: HashMap::new(),
            ttl,
        }
    }

    pub fn acquire(&mut self, concept: &ConceptId, task: &TaskId) -> Acquire {
        self.acquire_at(concept, task, Instant::now())
    }

    pub fn acquire_at(&mut self, concept: &ConceptId, task: &TaskId, now: Instant) -> Acquire {
        if let Some(holder) = self.held.get(concept) {
            if holder.task_id == *task {
                return Acquire::Acquired;
            }
            if now.saturating_duration_since(holder.acquired_at) < self.ttl {
                return Acquire::Held {
                    holder: holder.task_id.clone(),
                };
            }

            let previous = holder.task_id.clone();
            warn!(
                concept = %concept,
                previous = %previous,
                task = %task,
                "concept lock expired; forcing release"
            );
            self.insert(concept, task, now);
            return Acquire::Stolen { previous };
        }

        self.insert(concept, task, now);
        Acquire::Acquired
    }

    /// Unconditionally clear the lock on `concept`.
    pub fn release(&mut self, concept: &ConceptId) {
        self.held.remove(concept);
    }

    pub fn holder(&self, concept: &ConceptId) -> Option<&TaskId> {
        self.held.get(concept).map(|h| &h.task_id)
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    fn insert(&mut self, concept: &ConceptId, task: &TaskId, now: Instant) {
        self.held.insert(
            concept.clone(),
            LockHolder {
                task_id: task.clone(),
                acquired_at: now,
            },
        );
    }
}
