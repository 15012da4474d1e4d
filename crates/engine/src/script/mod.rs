//! Script documents and the script runner state machine.

pub mod document;
pub mod runner;

pub use document::{DocumentFormat, ScriptDocument, StepDocument, import_script};
pub use runner::{DEFAULT_MAX_TRANSITIONS, ScriptRunner};
