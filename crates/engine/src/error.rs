//! Error types for the automation engine.

use thiserror::Error;

/// Errors surfaced by script import, macro invocation, and registry lookups.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AutomationError {
    #[error("Invalid script: {message}")]
    Validation { message: String },

    #[error("Invalid parameter '{parameter}': {message}")]
    Parameter { parameter: String, message: String },

    #[error("Step '{step_id}' timed out after {timeout_ms}ms")]
    StepTimeout { step_id: String, timeout_ms: u64 },

    #[error("Step '{step_id}' failed: {output}")]
    StepFailure { step_id: String, output: String },

    #[error("Expression error: {message}")]
    Evaluation { message: String },

    #[error("Script not found: {id}")]
    ScriptNotFound { id: String },

    #[error("Macro not found: {alias}")]
    MacroNotFound { alias: String },

    #[error("Execution not found: {id}")]
    ExecutionNotFound { id: String },
}

impl AutomationError {
    /// Create a script validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a macro parameter error.
    pub fn parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a fatal step failure.
    pub fn step_failure(step_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::StepFailure {
            step_id: step_id.into(),
            output: output.into(),
        }
    }

    pub fn script_not_found(id: impl Into<String>) -> Self {
        Self::ScriptNotFound { id: id.into() }
    }

    pub fn macro_not_found(alias: impl Into<String>) -> Self {
        Self::MacroNotFound { alias: alias.into() }
    }

    pub fn execution_not_found(id: impl Into<String>) -> Self {
        Self::ExecutionNotFound { id: id.into() }
    }

    /// Returns true for errors raised before any command was executed.
    pub fn is_boundary_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Parameter { .. })
    }
}
