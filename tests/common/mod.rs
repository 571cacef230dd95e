#![allow(dead_code)]

use std::sync::Arc;

use yolo::config::ConfigFile;
use yolo::engine::{Collaborators, YoloService};
use yolo::exec::{NeutralScorer, NoSemanticSearch, RelevanceScorer, SemanticSearch};
use yolo::store::RecordStore;
use yolo_test_utils::{FixedWorkflow, ScriptedExecutor};

pub use yolo_test_utils::{init_tracing, with_timeout};

/// A service wired to scripted collaborators.
pub struct Harness {
    pub service: YoloService,
    pub executor: Arc<ScriptedExecutor>,
}

pub struct HarnessBuilder {
    store: Arc<dyn RecordStore>,
    executor: ScriptedExecutor,
    steps: u32,
    scorer: Arc<dyn RelevanceScorer>,
    semantic: Arc<dyn SemanticSearch>,
    config: ConfigFile,
}

impl HarnessBuilder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            executor: ScriptedExecutor::new(),
            steps: 2,
            scorer: Arc::new(NeutralScorer),
            semantic: Arc::new(NoSemanticSearch),
            config: ConfigFile::default(),
        }
    }

    pub fn executor(mut self, executor: ScriptedExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn scorer(mut self, scorer: impl RelevanceScorer + 'static) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    pub fn semantic(mut self, semantic: impl SemanticSearch + 'static) -> Self {
        self.semantic = Arc::new(semantic);
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut ConfigFile)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn build(self) -> Harness {
        let executor = Arc::new(self.executor);
        let service = YoloService::new(
            Collaborators {
                store: self.store,
                executor: executor.clone(),
                generator: Arc::new(FixedWorkflow::new(self.steps)),
                scorer: self.scorer,
                semantic: self.semantic,
            },
            self.config,
        );
        Harness { service, executor }
    }
}
