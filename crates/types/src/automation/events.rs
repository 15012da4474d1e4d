//! Lifecycle events streamed while a script execution runs.
//!
//! Hosts subscribe through an unbounded Tokio channel to render progress
//! without polling the execution registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExecutionStatus, StepOutput};

/// Event emitted by the script runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// The execution was registered and is about to run its first step.
    RunStarted {
        execution_id: String,
        script_id: String,
        at: DateTime<Utc>,
    },
    /// A step attempt is starting. `attempt` counts from 1 per step.
    StepStarted {
        execution_id: String,
        step_id: String,
        attempt: u32,
        command: String,
    },
    /// A step attempt finished; the record matches the log entry.
    StepFinished { execution_id: String, output: StepOutput },
    /// A failed step is being retried in place.
    StepRetrying {
        execution_id: String,
        step_id: String,
        retries_left: u32,
    },
    /// The execution reached a terminal state.
    RunCompleted {
        execution_id: String,
        status: ExecutionStatus,
        finished_at: DateTime<Utc>,
        error: Option<String>,
    },
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::RunStarted { execution_id, .. }
            | Self::StepStarted { execution_id, .. }
            | Self::StepFinished { execution_id, .. }
            | Self::StepRetrying { execution_id, .. }
            | Self::RunCompleted { execution_id, .. } => execution_id,
        }
    }
}
