//! # Breachkit Engine
//!
//! The breachkit engine runs player-authored automation scripts and macros
//! against a host-supplied command executor. Scripts are ordered steps with
//! jump-style branching, retries, per-step timeouts and variables captured
//! from command output.
//!
//! ## Key Features
//!
//! - **Script Documents**: JSON or YAML import/export with validation
//! - **Script Runner**: `onSuccess`/`onFailure` jumps, retries, transition guard and cancellation
//! - **Capture Expressions**: a small, sandboxed expression language over command output
//! - **Macros**: typed, named parameters expanded into command sequences
//! - **Validation**: unlocked-command and inventory checks against a game state
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use breachkit_engine::{AutomationEngine, EchoExecutor};
//! use breachkit_types::ExecutionStatus;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), breachkit_engine::AutomationError> {
//! let engine = AutomationEngine::default();
//! let script = engine
//!     .import_script(r#"{"name": "probe", "steps": [{"command": "ping {target}"}]}"#)
//!     .await?;
//!
//! let overrides = [("target".to_string(), "10.0.0.5".into())].into_iter().collect();
//! let execution = engine.run_script(&script.id, overrides, Arc::new(EchoExecutor)).await?;
//! assert_eq!(execution.status, ExecutionStatus::Completed);
//! assert_eq!(execution.output_log[0].command, "ping 10.0.0.5");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **`expression`**: tokenizer, parser and evaluator for capture expressions
//! - **`executor`**: command executor abstraction and single-step execution
//! - **`script`**: script documents and the runner state machine
//! - **`macros`**: parameter binding, expansion and free-text invocation
//! - **`validator`**: compatibility checks against game state
//! - **`registry`**: script, macro and execution registries
//! - **`engine`**: the [`AutomationEngine`] handle tying it together

use std::{fs, path::Path};

use anyhow::{Context, Result};

pub mod engine;
pub mod error;
pub mod executor;
pub mod expression;
pub mod macros;
pub mod registry;
pub mod script;
pub mod templates;
pub mod validator;

// Re-export commonly used types for convenience
pub use engine::{AutomationEngine, RunHandle};
pub use error::AutomationError;
pub use executor::{CommandExecutor, CommandOutcome, EchoExecutor, execute_step};
pub use expression::{EvaluationError, ExpressionEvaluator};
pub use macros::{MacroCommandResult, MacroOutcome};
pub use registry::{ExecutionRegistry, MacroRegistry, ScriptRegistry};
pub use script::{DocumentFormat, ScriptDocument, ScriptRunner};
pub use validator::{CommandAvailability, UnlockedCommands, Validator};

/// Loads a script document from the filesystem.
///
/// The text may be JSON or YAML regardless of the file extension. Validation
/// of names and step ids happens when the document is registered with an
/// engine.
///
/// # Errors
///
/// This function will return an error if:
/// - The file cannot be read from the filesystem
/// - The file content is not a valid script document
///
/// # Examples
///
/// ```rust
/// use breachkit_engine::parse_script_file;
///
/// let temp_dir = tempfile::tempdir()?;
/// let script_path = temp_dir.path().join("probe.yaml");
/// std::fs::write(&script_path, r#"
/// name: probe
/// steps:
///   - command: ping 10.0.0.5
/// "#)?;
///
/// let document = parse_script_file(&script_path)?;
/// assert_eq!(document.steps.len(), 1);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn parse_script_file(file_path: impl AsRef<Path>) -> Result<ScriptDocument> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read script file: {}", file_path.display()))?;
    let document = ScriptDocument::parse(&content).with_context(|| format!("Invalid script file: {}", file_path.display()))?;
    Ok(document)
}
