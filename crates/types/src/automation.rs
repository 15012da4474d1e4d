//! Strongly typed automation records shared across the engine and its hosts.
//!
//! A [`Script`] is an ordered list of [`Step`]s with jump-style branching. Each
//! run of a script produces an [`Execution`] that owns its own variable overlay
//! and output log. [`Macro`]s are parameterized shorthands expanding to an
//! ordered list of command templates.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub mod events;

/// Default per-step timeout in milliseconds.
pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 30_000;

/// Literal `on_failure` target that aborts the run instead of jumping.
pub const STOP_TARGET: &str = "stop";

/// Declared flavour of a script.
///
/// Only the step list is interpreted at runtime; the kind is carried for
/// display and round-tripping.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    #[default]
    Sequence,
    Conditional,
    Loop,
    Macro,
}

impl ScriptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Conditional => "conditional",
            Self::Loop => "loop",
            Self::Macro => "macro",
        }
    }
}

/// A named, multi-step automation definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    /// Registry identifier.
    pub id: String,
    /// Human-readable name; required on import.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ScriptKind,
    /// Ordered steps. Declaration order is the fall-through order.
    pub steps: Vec<Step>,
    /// Condition blocks carried verbatim; never evaluated.
    #[serde(default)]
    pub conditions: Vec<JsonValue>,
    /// Loop blocks carried verbatim; never evaluated.
    #[serde(default)]
    pub loops: Vec<JsonValue>,
    /// Initial variable bindings copied into each execution.
    #[serde(default)]
    pub variables: IndexMap<String, JsonValue>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
    /// Outcome of the most recent run.
    #[serde(default)]
    pub success: bool,
    /// Fatal messages accumulated across runs.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Script {
    /// Position of the step with the given id in declaration order.
    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.id == step_id)
    }

    pub fn step(&self, step_id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == step_id)
    }
}

/// One unit of work: a command template plus control-flow metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    /// Unique identifier within the owning script.
    pub id: String,
    /// Command template with `{name}` placeholders.
    pub command: String,
    /// Extra arguments appended verbatim after substitution.
    #[serde(default)]
    pub parameters: Vec<String>,
    /// Substring the raw output must contain for the step to count as a success.
    #[serde(default)]
    pub expected_output: Option<String>,
    #[serde(default = "default_step_timeout")]
    pub timeout_ms: u64,
    /// Additional attempts allowed after a failure.
    #[serde(default)]
    pub retries: u32,
    /// Step to jump to on success.
    #[serde(default)]
    pub on_success: Option<String>,
    /// Step to jump to on failure, or [`STOP_TARGET`].
    #[serde(default)]
    pub on_failure: Option<String>,
    /// Variable name → expression evaluated against the step output.
    #[serde(default)]
    pub variable_captures: IndexMap<String, String>,
}

impl Step {
    /// Builds a step with default timeout and no control-flow metadata.
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            parameters: Vec::new(),
            expected_output: None,
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            retries: 0,
            on_success: None,
            on_failure: None,
            variable_captures: IndexMap::new(),
        }
    }

    /// Returns true when `on_failure` is the literal stop marker.
    pub fn stops_on_failure(&self) -> bool {
        self.on_failure.as_deref() == Some(STOP_TARGET)
    }
}

const fn default_step_timeout() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

/// Declared type of a macro parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Boolean,
    Ip,
    Port,
}

impl ParameterType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Ip => "ip",
            Self::Port => "port",
        }
    }
}

/// Typed parameter accepted by a macro.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacroParameter {
    pub name: String,
    #[serde(default, rename = "type")]
    pub r#type: ParameterType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl MacroParameter {
    pub fn required(name: impl Into<String>, r#type: ParameterType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type,
            required: true,
            default: None,
            description: description.into(),
        }
    }

    pub fn optional(
        name: impl Into<String>,
        r#type: ParameterType,
        default: Option<&str>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            r#type,
            required: false,
            default: default.map(str::to_string),
            description: description.into(),
        }
    }
}

/// Named shorthand expanding to an ordered list of command templates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Macro {
    pub id: String,
    /// Unique registry key used to invoke the macro.
    pub alias: String,
    #[serde(default)]
    pub description: String,
    /// Command templates expanded in declaration order.
    pub commands: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<MacroParameter>,
    pub created_at: DateTime<Utc>,
    /// Number of invocations that passed parameter validation.
    #[serde(default)]
    pub use_count: u64,
}

impl Macro {
    pub fn parameter(&self, name: &str) -> Option<&MacroParameter> {
        self.parameters.iter().find(|parameter| parameter.name == name)
    }
}

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Record of a single attempted step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepOutput {
    pub step_id: String,
    /// Command text after placeholder substitution.
    pub command: String,
    /// Raw output reported by the command executor.
    pub output: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub execution_time_ms: u64,
}

/// One run instance of a script.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Execution {
    pub id: String,
    pub script_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub current_step_id: Option<String>,
    /// One entry per attempted step, retries included.
    #[serde(default)]
    pub output_log: Vec<StepOutput>,
    /// Mutable overlay seeded from the script variables and caller overrides.
    #[serde(default)]
    pub variables: IndexMap<String, JsonValue>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl Execution {
    /// Starts a running execution with the provided variable overlay.
    pub fn start(id: impl Into<String>, script_id: impl Into<String>, variables: IndexMap<String, JsonValue>) -> Self {
        Self {
            id: id.into(),
            script_id: script_id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: ExecutionStatus::Running,
            current_step_id: None,
            output_log: Vec::new(),
            variables,
            errors: Vec::new(),
        }
    }

    /// Moves the execution into a terminal state and stamps the end time.
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }

    /// Number of log entries recorded for a given step.
    pub fn attempts_for(&self, step_id: &str) -> usize {
        self.output_log.iter().filter(|entry| entry.step_id == step_id).count()
    }
}
