//! Command executors backed by the host shell.

use anyhow::{Context, Result};
use async_trait::async_trait;
use breachkit_engine::{CommandExecutor, CommandOutcome};
use tokio::process::Command;

/// Runs each command through `sh -c`.
///
/// The child is killed if the engine drops the call on timeout or
/// cancellation. Output is stdout followed by stderr, trimmed.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    shell: String,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self { shell: "sh".into() }
    }
}

impl ProcessExecutor {
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self { shell: shell.into() }
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn execute(&self, command: &str) -> Result<CommandOutcome> {
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.shell))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        let text = text.trim_end().to_string();

        Ok(CommandOutcome {
            output: text,
            success: output.status.success(),
        })
    }
}
