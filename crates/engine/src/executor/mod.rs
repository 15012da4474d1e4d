//! Step execution: resolves a step's command, runs it through a host-supplied
//! [`CommandExecutor`] under the step's deadline, evaluates variable captures
//! and applies the expected-output check.
//!
//! - `runner::CommandExecutor` abstracts how a resolved command is executed
//! - `runner::EchoExecutor` is a side-effect free executor for dry runs
//! - `step_once::execute_step` performs exactly one attempt

pub mod runner;
pub mod step_once;

pub use runner::{CommandExecutor, CommandOutcome, EchoExecutor};
pub use step_once::{CANCELLED_OUTPUT, CommandAttempt, TIMEOUT_OUTPUT, execute_step, run_command};
