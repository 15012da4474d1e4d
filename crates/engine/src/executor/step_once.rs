//! Single-step execution: resolve, run under a deadline, capture, check.

use std::sync::Arc;
use std::time::{Duration, Instant};

use breachkit_types::{Execution, Step, StepOutput};
use breachkit_util::redact_sensitive;
use chrono::Utc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CommandExecutor, CommandOutcome};
use crate::{expression::ExpressionEvaluator, templates::resolve_step_command};

/// Output recorded when a command exceeds its step timeout.
pub const TIMEOUT_OUTPUT: &str = "Command timeout";
/// Output recorded when the owning execution is cancelled mid-command.
pub const CANCELLED_OUTPUT: &str = "Command cancelled";

/// How a single command attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAttempt {
    Finished(CommandOutcome),
    TimedOut,
    Cancelled,
}

/// Run `command` in its own task, racing it against `limit` and `cancel`.
///
/// The task is aborted when the deadline passes or the token fires, so a
/// stuck executor never keeps running after its step has been decided.
pub async fn run_command(
    executor: Arc<dyn CommandExecutor>,
    command: String,
    limit: Duration,
    cancel: &CancellationToken,
) -> CommandAttempt {
    let task = tokio::spawn(async move { executor.execute(&command).await });
    let abort_handle = task.abort_handle();

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            abort_handle.abort();
            CommandAttempt::Cancelled
        }
        joined = timeout(limit, task) => match joined {
            Ok(Ok(Ok(outcome))) => CommandAttempt::Finished(outcome),
            Ok(Ok(Err(error))) => CommandAttempt::Finished(CommandOutcome::failure(error.to_string())),
            Ok(Err(join_error)) => CommandAttempt::Finished(CommandOutcome::failure(format!("Command task failed: {join_error}"))),
            Err(_) => {
                abort_handle.abort();
                CommandAttempt::TimedOut
            }
        },
    }
}

/// Execute one step attempt against `execution`.
///
/// Always returns a [`StepOutput`]; the caller appends it to the output log.
/// Captured variables are written into `execution.variables` unless the
/// attempt was cancelled.
pub async fn execute_step(
    step: &Step,
    execution: &mut Execution,
    executor: Arc<dyn CommandExecutor>,
    evaluator: &ExpressionEvaluator,
    cancel: &CancellationToken,
) -> StepOutput {
    let command = resolve_step_command(&step.command, &step.parameters, &execution.variables);
    let timestamp = Utc::now();
    let started = Instant::now();

    debug!(
        execution_id = %execution.id,
        step_id = %step.id,
        command = %redact_sensitive(&command),
        timeout_ms = step.timeout_ms,
        "executing step"
    );

    let attempt = run_command(executor, command.clone(), Duration::from_millis(step.timeout_ms), cancel).await;
    let cancelled = attempt == CommandAttempt::Cancelled;
    let (output, mut success) = match attempt {
        CommandAttempt::Finished(outcome) => (outcome.output, outcome.success),
        CommandAttempt::TimedOut => {
            warn!(step_id = %step.id, timeout_ms = step.timeout_ms, "step command timed out");
            (TIMEOUT_OUTPUT.to_string(), false)
        }
        CommandAttempt::Cancelled => (CANCELLED_OUTPUT.to_string(), false),
    };

    if !cancelled {
        for (name, expression) in &step.variable_captures {
            let value = evaluator.evaluate(expression, &output, &execution.variables).await;
            debug!(step_id = %step.id, variable = %name, "captured variable");
            execution.variables.insert(name.clone(), value);
        }
    }

    if let Some(expected) = &step.expected_output
        && success
        && !output.contains(expected.as_str())
    {
        debug!(step_id = %step.id, expected = %expected, "expected output missing");
        success = false;
    }

    StepOutput {
        step_id: step.id.clone(),
        command,
        output,
        success,
        timestamp,
        execution_time_ms: started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::EchoExecutor;
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedExecutor(CommandOutcome);

    #[async_trait]
    impl CommandExecutor for FixedExecutor {
        async fn execute(&self, _command: &str) -> Result<CommandOutcome> {
            Ok(self.0.clone())
        }
    }

    struct FailingExecutor;

    #[async_trait]
    impl CommandExecutor for FailingExecutor {
        async fn execute(&self, _command: &str) -> Result<CommandOutcome> {
            Err(anyhow!("connection refused"))
        }
    }

    /// Never resolves; flips `finished` if it is ever allowed to complete.
    struct HangingExecutor {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CommandExecutor for HangingExecutor {
        async fn execute(&self, _command: &str) -> Result<CommandOutcome> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(CommandOutcome::success("late"))
        }
    }

    fn execution() -> Execution {
        let variables: IndexMap<_, _> = [("target".to_string(), json!("10.0.0.5"))].into_iter().collect();
        Execution::start("exec_1", "script_1", variables)
    }

    #[tokio::test]
    async fn resolves_command_and_captures_variables() {
        let mut step = Step::new("scan", "nmap {target}");
        step.parameters = vec!["-sV".into()];
        step.variable_captures.insert("host".into(), "extract_ip(output)".into());
        let mut execution = execution();

        let output = execute_step(&step, &mut execution, Arc::new(EchoExecutor), &ExpressionEvaluator::default(), &CancellationToken::new()).await;

        assert_eq!(output.command, "nmap 10.0.0.5 -sV");
        assert!(output.success);
        assert_eq!(execution.variables["host"], json!("10.0.0.5"));
    }

    #[tokio::test]
    async fn missing_expected_output_forces_failure() {
        let mut step = Step::new("scan", "scan");
        step.expected_output = Some("open".into());
        let mut execution = execution();
        let executor = Arc::new(FixedExecutor(CommandOutcome::success("all ports filtered")));

        let output = execute_step(&step, &mut execution, executor, &ExpressionEvaluator::default(), &CancellationToken::new()).await;
        assert!(!output.success);
        assert_eq!(output.output, "all ports filtered");
    }

    #[tokio::test]
    async fn executor_error_becomes_failed_output() {
        let step = Step::new("connect", "connect {target}");
        let mut execution = execution();

        let output = execute_step(&step, &mut execution, Arc::new(FailingExecutor), &ExpressionEvaluator::default(), &CancellationToken::new()).await;
        assert!(!output.success);
        assert_eq!(output.output, "connection refused");
    }

    #[tokio::test]
    async fn timeout_aborts_the_command_task() {
        let finished = Arc::new(AtomicBool::new(false));
        let mut step = Step::new("slow", "crack hash");
        step.timeout_ms = 50;
        let mut execution = execution();
        let executor = Arc::new(HangingExecutor { finished: finished.clone() });

        let started = Instant::now();
        let output = execute_step(&step, &mut execution, executor, &ExpressionEvaluator::default(), &CancellationToken::new()).await;

        assert!(!output.success);
        assert_eq!(output.output, TIMEOUT_OUTPUT);
        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancellation_interrupts_in_flight_command() {
        let finished = Arc::new(AtomicBool::new(false));
        let step = Step::new("slow", "crack hash");
        let mut execution = execution();
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let executor = Arc::new(HangingExecutor { finished: finished.clone() });
        let output = execute_step(&step, &mut execution, executor, &ExpressionEvaluator::default(), &token).await;

        assert!(!output.success);
        assert_eq!(output.output, CANCELLED_OUTPUT);
        assert!(!finished.load(Ordering::SeqCst));
    }
}
