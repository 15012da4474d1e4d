//! Script runner: walks a script's steps as a jump-based state machine and
//! streams lifecycle events to an optional subscriber.
//!
//! After each attempt the next step is chosen as follows:
//! - success: the `on_success` target when it exists, else the next step in
//!   declaration order
//! - failure: `on_failure == "stop"` aborts; an existing `on_failure` target is
//!   jumped to; otherwise a remaining retry re-runs the same step; otherwise the
//!   run aborts
//!
//! The run completes when the step list is exhausted.

use std::collections::HashMap;
use std::sync::Arc;

use breachkit_types::{Execution, ExecutionEvent, ExecutionStatus, Script, Step, StepOutput};
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::AutomationError,
    executor::{CommandExecutor, TIMEOUT_OUTPUT, execute_step},
    expression::ExpressionEvaluator,
};

/// Default cap on step attempts within one execution.
pub const DEFAULT_MAX_TRANSITIONS: u32 = 1_000;

/// Drives script executions against a command executor.
#[derive(Clone)]
pub struct ScriptRunner {
    executor: Arc<dyn CommandExecutor>,
    evaluator: ExpressionEvaluator,
    max_transitions: u32,
    events: Option<UnboundedSender<ExecutionEvent>>,
}

/// Where the state machine goes after an attempt.
enum Transition {
    Goto(usize),
    Retry { retries_left: u32 },
    Abort(AutomationError),
}

impl ScriptRunner {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            evaluator: ExpressionEvaluator::default(),
            max_transitions: DEFAULT_MAX_TRANSITIONS,
            events: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: ExpressionEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_max_transitions(mut self, max_transitions: u32) -> Self {
        self.max_transitions = max_transitions.max(1);
        self
    }

    /// Stream [`ExecutionEvent`]s to `events`. A dropped receiver is ignored.
    pub fn with_events(mut self, events: UnboundedSender<ExecutionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Run `script` to a terminal state, recording every attempt in `execution`.
    ///
    /// The execution always finishes as completed, failed or cancelled; fatal
    /// aborts are recorded in `execution.errors`.
    pub async fn run(&self, script: &Script, execution: &mut Execution, cancel: &CancellationToken) {
        info!(execution_id = %execution.id, script_id = %script.id, steps = script.steps.len(), "script run started");
        self.emit(ExecutionEvent::RunStarted {
            execution_id: execution.id.clone(),
            script_id: script.id.clone(),
            at: execution.start_time,
        });

        let mut retries_used: HashMap<&str, u32> = HashMap::new();
        let mut transitions = 0u32;
        let mut index = 0usize;

        let status = loop {
            if cancel.is_cancelled() {
                break ExecutionStatus::Cancelled;
            }
            let Some(step) = script.steps.get(index) else {
                break ExecutionStatus::Completed;
            };
            if transitions >= self.max_transitions {
                let message = format!("exceeded {} step attempts", self.max_transitions);
                self.abort(execution, AutomationError::step_failure(&step.id, message));
                break ExecutionStatus::Failed;
            }
            transitions += 1;

            execution.current_step_id = Some(step.id.clone());
            let attempt = u32::try_from(execution.attempts_for(&step.id)).unwrap_or(u32::MAX).saturating_add(1);

            self.emit(ExecutionEvent::StepStarted {
                execution_id: execution.id.clone(),
                step_id: step.id.clone(),
                attempt,
                command: step.command.clone(),
            });

            let output = execute_step(step, execution, self.executor.clone(), &self.evaluator, cancel).await;
            execution.output_log.push(output.clone());
            let success = output.success;
            self.emit(ExecutionEvent::StepFinished {
                execution_id: execution.id.clone(),
                output: output.clone(),
            });

            if cancel.is_cancelled() {
                break ExecutionStatus::Cancelled;
            }

            let used = retries_used.entry(step.id.as_str()).or_default();
            match next_transition(script, index, step, &output, used) {
                Transition::Goto(next) => {
                    debug!(step_id = %step.id, success, next = ?script.steps.get(next).map(|s| &s.id), "step transition");
                    index = next;
                }
                Transition::Retry { retries_left } => {
                    info!(step_id = %step.id, retries_left, "retrying failed step");
                    self.emit(ExecutionEvent::StepRetrying {
                        execution_id: execution.id.clone(),
                        step_id: step.id.clone(),
                        retries_left,
                    });
                }
                Transition::Abort(error) => {
                    self.abort(execution, error);
                    break ExecutionStatus::Failed;
                }
            }
        };

        execution.finish(status);
        info!(
            execution_id = %execution.id,
            status = status.as_str(),
            attempts = execution.output_log.len(),
            "script run finished"
        );
        self.emit(ExecutionEvent::RunCompleted {
            execution_id: execution.id.clone(),
            status,
            finished_at: execution.end_time.unwrap_or_else(Utc::now),
            error: execution.errors.last().cloned(),
        });
    }

    fn abort(&self, execution: &mut Execution, error: AutomationError) {
        warn!(execution_id = %execution.id, error = %error, "script run aborted");
        execution.errors.push(error.to_string());
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

fn next_transition(script: &Script, index: usize, step: &Step, output: &StepOutput, retries_used: &mut u32) -> Transition {
    if output.success {
        let target = step.on_success.as_deref().and_then(|target| {
            let found = script.step_index(target);
            if found.is_none() {
                warn!(step_id = %step.id, target, "on_success target not found; continuing in order");
            }
            found
        });
        return Transition::Goto(target.unwrap_or(index + 1));
    }

    if step.stops_on_failure() {
        return Transition::Abort(fatal_error(step, output));
    }

    if let Some(target) = step.on_failure.as_deref() {
        match script.step_index(target) {
            Some(found) => return Transition::Goto(found),
            None => warn!(step_id = %step.id, target, "on_failure target not found; applying retry rule"),
        }
    }

    if *retries_used < step.retries {
        *retries_used += 1;
        return Transition::Retry {
            retries_left: step.retries - *retries_used,
        };
    }

    Transition::Abort(fatal_error(step, output))
}

fn fatal_error(step: &Step, output: &StepOutput) -> AutomationError {
    if output.output == TIMEOUT_OUTPUT {
        AutomationError::StepTimeout {
            step_id: step.id.clone(),
            timeout_ms: step.timeout_ms,
        }
    } else {
        AutomationError::step_failure(&step.id, &output.output)
    }
}
