//! Shared record types for the breachkit automation engine.
//!
//! These types are serialized by hosts (terminal UI, CLI, save files) and
//! consumed by `breachkit-engine`. They carry no behaviour beyond small
//! accessors so they can be shared freely.

pub mod automation;
pub mod game;

pub use automation::{
    DEFAULT_STEP_TIMEOUT_MS, Execution, ExecutionStatus, Macro, MacroParameter, ParameterType, STOP_TARGET, Script, ScriptKind, Step,
    StepOutput, events::ExecutionEvent,
};
pub use game::GameState;
