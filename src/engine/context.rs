// src/engine/context.rs

use std::collections::VecDeque;

use crate::exec::ContextRef;
use crate::types::ConceptId;

/// Bounded summary of recently completed steps in a run.
///
/// Each entry is truncated to `summary_chars` characters and only the most
/// recent `max_entries` are kept, so prompt context stays bounded however
/// long the run.
#[derive(Debug, Clone)]
pub struct RollingContext {
    entries: VecDeque<ContextRef>,
    max_entries: usize,
    summary_chars: usize,
}

impl RollingContext {
    pub fn new(max_entries: usize, summary_chars: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_entries),
            max_entries,
            summary_chars,
        }
    }

    /// Record a completed step; returns the stored (truncated) entry.
    pub fn push(&mut self, concept_id: &ConceptId, step_title: &str, content: &str) -> ContextRef {
        let entry = ContextRef {
            concept_id: concept_id.clone(),
            step_title: step_title.to_string(),
            summary: truncate_chars(content, self.summary_chars),
        };
        self.push_ref(entry.clone());
        entry
    }

    pub fn push_ref(&mut self, entry: ContextRef) {
        if self.max_entries == 0 {
            return;
        }
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn refs(&self) -> Vec<ContextRef> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
