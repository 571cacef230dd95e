#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;
use yolo::engine::{
    MessageSink, OutboundMessage, PlanEvent, PlanObserver, ProgressSnapshot, RunCallbacks,
    RunSummary,
};
use yolo::store::Concept;
use yolo::types::{ConceptId, MessageId};

#[derive(Debug, Default)]
struct Recorded {
    snapshots: Vec<ProgressSnapshot>,
    summaries: Vec<RunSummary>,
    errors: Vec<String>,
    messages: Vec<OutboundMessage>,
    discovered: Vec<ConceptId>,
}

/// Run callbacks that record everything and let tests wait for the end.
#[derive(Default)]
pub struct RecordingCallbacks {
    recorded: Mutex<Recorded>,
    conversations: HashMap<ConceptId, String>,
    /// Remaining conversation-creation failures per concept.
    conversation_failures: Mutex<HashMap<ConceptId, usize>>,
    done: Notify,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `create_conversation_for_concept(concept)` with `conversation`.
    pub fn with_conversation(mut self, concept: &str, conversation: &str) -> Self {
        self.conversations
            .insert(concept.into(), conversation.to_string());
        self
    }

    /// The first `times` conversation requests for `concept` fail.
    pub fn fail_conversation(self, concept: &str, times: usize) -> Self {
        self.conversation_failures
            .lock()
            .unwrap()
            .insert(concept.into(), times);
        self
    }

    /// Wait until `on_complete` has been called and return the summary.
    pub async fn wait_for_summary(&self) -> RunSummary {
        loop {
            let notified = self.done.notified();
            if let Some(summary) = self.summary() {
                return summary;
            }
            notified.await;
        }
    }

    /// Wait until `on_error` has been called and return the message.
    pub async fn wait_for_error(&self) -> String {
        loop {
            let notified = self.done.notified();
            if let Some(error) = self.errors().first().cloned() {
                return error;
            }
            notified.await;
        }
    }

    /// Wait for a snapshot matching `pred`.
    pub async fn wait_for_snapshot(
        &self,
        pred: impl Fn(&ProgressSnapshot) -> bool,
    ) -> ProgressSnapshot {
        loop {
            let notified = self.done.notified();
            if let Some(snapshot) = self.snapshots().into_iter().find(|s| pred(s)) {
                return snapshot;
            }
            notified.await;
        }
    }

    pub fn summary(&self) -> Option<RunSummary> {
        self.recorded.lock().unwrap().summaries.first().cloned()
    }

    pub fn completion_count(&self) -> usize {
        self.recorded.lock().unwrap().summaries.len()
    }

    pub fn snapshots(&self) -> Vec<ProgressSnapshot> {
        self.recorded.lock().unwrap().snapshots.clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.recorded.lock().unwrap().errors.clone()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.recorded.lock().unwrap().messages.clone()
    }

    pub fn discovered(&self) -> Vec<ConceptId> {
        self.recorded.lock().unwrap().discovered.clone()
    }
}

#[async_trait]
impl MessageSink for RecordingCallbacks {
    async fn save_message(&self, message: OutboundMessage) -> anyhow::Result<MessageId> {
        self.recorded.lock().unwrap().messages.push(message);
        Ok(MessageId::generate())
    }
}

#[async_trait]
impl RunCallbacks for RecordingCallbacks {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.recorded.lock().unwrap().snapshots.push(snapshot.clone());
        self.done.notify_waiters();
    }

    fn on_complete(&self, summary: &RunSummary) {
        self.recorded.lock().unwrap().summaries.push(summary.clone());
        self.done.notify_waiters();
    }

    fn on_error(&self, message: &str) {
        self.recorded.lock().unwrap().errors.push(message.to_string());
        self.done.notify_waiters();
    }

    async fn create_conversation_for_concept(
        &self,
        concept: &Concept,
    ) -> anyhow::Result<Option<String>> {
        if let Some(left) = self
            .conversation_failures
            .lock()
            .unwrap()
            .get_mut(&concept.id)
            .filter(|left| **left > 0)
        {
            *left -= 1;
            anyhow::bail!("conversation service unavailable for {}", concept.id);
        }
        Ok(self.conversations.get(&concept.id).cloned())
    }

    fn on_concept_discovered(&self, concept: &Concept, _conversation_id: Option<&str>) {
        self.recorded
            .lock()
            .unwrap()
            .discovered
            .push(concept.id.clone());
    }
}

/// Plan observer + message sink for manual-mode tests.
#[derive(Default)]
pub struct RecordingPlanObserver {
    events: Mutex<Vec<PlanEvent>>,
    messages: Mutex<Vec<OutboundMessage>>,
    changed: Notify,
}

impl RecordingPlanObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<PlanEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages.lock().unwrap().clone()
    }

    /// Wait until at least `n` events matching `pred` have been seen.
    pub async fn wait_for(&self, n: usize, pred: impl Fn(&PlanEvent) -> bool) {
        loop {
            let notified = self.changed.notified();
            if self.events().iter().filter(|e| pred(e)).count() >= n {
                return;
            }
            notified.await;
        }
    }
}

impl PlanObserver for RecordingPlanObserver {
    fn on_plan_event(&self, event: PlanEvent) {
        self.events.lock().unwrap().push(event);
        self.changed.notify_waiters();
    }
}

#[async_trait]
impl MessageSink for RecordingPlanObserver {
    async fn save_message(&self, message: OutboundMessage) -> anyhow::Result<MessageId> {
        self.messages.lock().unwrap().push(message);
        Ok(MessageId::generate())
    }
}
