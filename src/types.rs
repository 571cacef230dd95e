// src/types.rs

//! Shared identifiers and small enums used across the crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generate a fresh, time-ordered identifier.
            pub fn generate() -> Self {
                Self(ulid::Ulid::new().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Identifier of a node in the knowledge graph.
    ConceptId
);
string_id!(
    /// Identifier of a persisted task record.
    TaskId
);
string_id!(
    /// Identifier of one autonomous run.
    RunId
);
string_id!(
    /// Identifier of an execution plan.
    PlanId
);
string_id!(
    /// Identifier of a single execution-plan step.
    StepId
);
string_id!(
    /// Identifier handed back by a [`MessageSink`](crate::engine::MessageSink).
    MessageId
);

/// Typed edge between two concepts.
///
/// A `Prerequisite` edge `source -> target` means the source concept must be
/// completed before the target concept may start. The other kinds are
/// discovery signals only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    Prerequisite,
    Related,
    Advanced,
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prerequisite" => Ok(RelationshipKind::Prerequisite),
            "related" => Ok(RelationshipKind::Related),
            "advanced" => Ok(RelationshipKind::Advanced),
            other => Err(format!(
                "invalid relationship kind: {other} (expected \"prerequisite\", \"related\" or \"advanced\")"
            )),
        }
    }
}

/// Lifecycle status of a task.
///
/// Persisted records only ever hold `Pending`, `Completed` or `Failed`; the
/// `Ready` and `Running` states exist inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Lifecycle status of an autonomous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Initializing,
    Dispatching,
    WaitingForWorker,
    Completed,
    Cancelled,
    HardStopped,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::HardStopped | RunStatus::Failed
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Initializing => "initializing",
            RunStatus::Dispatching => "dispatching",
            RunStatus::WaitingForWorker => "waiting-for-worker",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::HardStopped => "hard-stopped",
            RunStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Who authored a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}
