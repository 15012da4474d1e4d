use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result reported by a command executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub output: String,
    pub success: bool,
}

impl CommandOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: false,
        }
    }
}

/// Execute a single resolved command.
///
/// Hosts provide implementations that dispatch to game command handlers, a
/// shell, or a test double. The engine has no notion of command semantics;
/// an `Err` is recorded as a failed step whose output is the error text.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<CommandOutcome>;
}

/// An executor that succeeds with the command text as output. This allows
/// dry runs and previews without side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoExecutor;

#[async_trait]
impl CommandExecutor for EchoExecutor {
    async fn execute(&self, command: &str) -> Result<CommandOutcome> {
        Ok(CommandOutcome::success(command))
    }
}
