//! The [`AutomationEngine`] handle: owns the registries and wires imports,
//! runs, macro invocations and validation together.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use breachkit_types::{Execution, ExecutionEvent, GameState, Macro, MacroParameter, Script};
use breachkit_util::EngineSettings;
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::AutomationError,
    executor::CommandExecutor,
    expression::ExpressionEvaluator,
    macros::{MacroOutcome, default_macros, parse_invocation, run_expanded},
    registry::{ExecutionRegistry, MacroRegistry, ScriptRegistry},
    script::{DocumentFormat, ScriptDocument, ScriptRunner},
    templates::extract_placeholders,
    validator::{CommandAvailability, Validator},
};

/// A script execution running on its own task.
pub struct RunHandle {
    pub execution_id: String,
    pub task: JoinHandle<Execution>,
}

/// Host-owned automation context.
///
/// Cloning is cheap and clones share the same registries, so one engine can
/// serve many tasks while separate engines stay fully isolated.
#[derive(Clone)]
pub struct AutomationEngine {
    scripts: ScriptRegistry,
    macros: MacroRegistry,
    executions: ExecutionRegistry,
    settings: EngineSettings,
    sequence: Arc<AtomicU64>,
}

impl Default for AutomationEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl AutomationEngine {
    /// Creates an engine with empty registries.
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            scripts: ScriptRegistry::default(),
            macros: MacroRegistry::default(),
            executions: ExecutionRegistry::new(settings.execution_history_limit),
            settings,
            sequence: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates an engine with the bundled macros already defined.
    pub fn with_default_macros(settings: EngineSettings) -> Self {
        Self {
            macros: MacroRegistry::from_macros(default_macros()),
            ..Self::new(settings)
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn scripts(&self) -> &ScriptRegistry {
        &self.scripts
    }

    pub fn macros(&self) -> &MacroRegistry {
        &self.macros
    }

    pub fn executions(&self) -> &ExecutionRegistry {
        &self.executions
    }

    fn next_id(&self, prefix: &str) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}_{}_{sequence}", Utc::now().timestamp_millis())
    }

    /// Parses, validates and registers a script document given as JSON or YAML text.
    pub async fn import_script(&self, text: &str) -> Result<Script, AutomationError> {
        let document = ScriptDocument::parse(text)?;
        self.register_document(document).await
    }

    /// Validates and registers an already-parsed script document.
    pub async fn register_document(&self, document: ScriptDocument) -> Result<Script, AutomationError> {
        let script = document.into_script(self.next_id("script"), self.settings.default_step_timeout_ms)?;
        info!(script_id = %script.id, name = %script.name, steps = script.steps.len(), "script imported");
        self.scripts.insert(script.clone()).await;
        Ok(script)
    }

    /// Renders a registered script in the interchange format.
    pub async fn export_script(&self, script_id: &str, format: DocumentFormat) -> Result<String, AutomationError> {
        let script = self
            .scripts
            .get(script_id)
            .await
            .ok_or_else(|| AutomationError::script_not_found(script_id))?;
        ScriptDocument::from_script(&script).render(format)
    }

    /// Runs a script to completion.
    ///
    /// `overrides` are layered over the script's initial variables. Fails only
    /// when the script does not exist; step failures are reported through the
    /// returned execution's status and errors.
    pub async fn run_script(
        &self,
        script_id: &str,
        overrides: IndexMap<String, Value>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Execution, AutomationError> {
        let (script, execution) = self.begin_run(script_id, overrides).await?;
        let cancel = self.executions.register(execution.clone()).await;
        Ok(self.drive(script, execution, executor, cancel, None).await)
    }

    /// Runs a script on a new task, streaming lifecycle events to `events`.
    ///
    /// The execution is registered before this returns, so it can be
    /// cancelled immediately through [`Self::cancel`].
    pub async fn spawn_script(
        &self,
        script_id: &str,
        overrides: IndexMap<String, Value>,
        executor: Arc<dyn CommandExecutor>,
        events: Option<UnboundedSender<ExecutionEvent>>,
    ) -> Result<RunHandle, AutomationError> {
        let (script, execution) = self.begin_run(script_id, overrides).await?;
        let execution_id = execution.id.clone();
        let cancel = self.executions.register(execution.clone()).await;

        let engine = self.clone();
        let task = tokio::spawn(async move { engine.drive(script, execution, executor, cancel, events).await });
        Ok(RunHandle { execution_id, task })
    }

    /// Cancels a running execution by id.
    pub async fn cancel(&self, execution_id: &str) -> Result<Execution, AutomationError> {
        self.executions.cancel(execution_id).await
    }

    async fn begin_run(
        &self,
        script_id: &str,
        overrides: IndexMap<String, Value>,
    ) -> Result<(Script, Execution), AutomationError> {
        let script = self
            .scripts
            .get(script_id)
            .await
            .ok_or_else(|| AutomationError::script_not_found(script_id))?;
        let mut variables = script.variables.clone();
        variables.extend(overrides);
        let execution = Execution::start(self.next_id("exec"), &script.id, variables);
        Ok((script, execution))
    }

    async fn drive(
        &self,
        script: Script,
        mut execution: Execution,
        executor: Arc<dyn CommandExecutor>,
        cancel: CancellationToken,
        events: Option<UnboundedSender<ExecutionEvent>>,
    ) -> Execution {
        let mut runner = ScriptRunner::new(executor)
            .with_evaluator(ExpressionEvaluator::new(Duration::from_secs(self.settings.max_wait_seconds)))
            .with_max_transitions(self.settings.max_transitions);
        if let Some(events) = events {
            runner = runner.with_events(events);
        }

        runner.run(&script, &mut execution, &cancel).await;
        let execution = self.executions.complete(execution).await;
        if !self.scripts.record_run(&script.id, &execution).await {
            warn!(script_id = %script.id, "script removed during run; statistics not recorded");
        }
        execution
    }

    /// Defines (or redefines) a macro.
    pub async fn define_macro(
        &self,
        alias: &str,
        description: &str,
        commands: Vec<String>,
        parameters: Vec<MacroParameter>,
    ) -> Result<Macro, AutomationError> {
        let alias = alias.trim();
        if alias.is_empty() || alias.chars().any(char::is_whitespace) {
            return Err(AutomationError::validation(format!("invalid macro alias '{alias}'")));
        }
        if commands.iter().all(|command| command.trim().is_empty()) {
            return Err(AutomationError::validation(format!("macro '{alias}' has no commands")));
        }
        for command in &commands {
            for name in extract_placeholders(command) {
                if !parameters.iter().any(|parameter| parameter.name == name) {
                    warn!(alias = %alias, placeholder = %name, "macro template references an undeclared parameter");
                }
            }
        }

        let definition = Macro {
            id: self.next_id("macro"),
            alias: alias.to_string(),
            description: description.to_string(),
            commands,
            parameters,
            created_at: Utc::now(),
            use_count: 0,
        };
        if self.macros.define(definition.clone()).await.is_some() {
            info!(alias = %alias, "macro redefined");
        }
        Ok(definition)
    }

    /// Invokes a macro with named parameters.
    ///
    /// Parameter errors are returned before any command runs.
    pub async fn execute_macro(
        &self,
        alias: &str,
        supplied: &IndexMap<String, String>,
        executor: &dyn CommandExecutor,
    ) -> Result<MacroOutcome, AutomationError> {
        let commands = self.macros.prepare_invocation(alias, supplied).await?;
        info!(alias = %alias, commands = commands.len(), "executing macro");
        Ok(run_expanded(alias, commands, executor).await)
    }

    /// Invokes a macro from free text such as `intrude target=10.0.0.5`.
    pub async fn invoke_macro_text(&self, input: &str, executor: &dyn CommandExecutor) -> Result<MacroOutcome, AutomationError> {
        let invocation = parse_invocation(input)?;
        self.execute_macro(&invocation.alias, &invocation.parameters, executor).await
    }

    /// Lists compatibility problems for `script` against `game_state`.
    pub async fn validate(&self, script: &Script, game_state: &GameState, availability: &dyn CommandAvailability) -> Vec<String> {
        let macros = self.macros.snapshot().await;
        Validator::new(availability).validate(script, &macros, game_state)
    }

    /// Same as [`Self::validate`] for a registered script.
    pub async fn validate_script(
        &self,
        script_id: &str,
        game_state: &GameState,
        availability: &dyn CommandAvailability,
    ) -> Result<Vec<String>, AutomationError> {
        let script = self
            .scripts
            .get(script_id)
            .await
            .ok_or_else(|| AutomationError::script_not_found(script_id))?;
        Ok(self.validate(&script, game_state, availability).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::EchoExecutor;
    use breachkit_types::{ExecutionStatus, ParameterType};

    #[tokio::test]
    async fn engines_are_isolated() {
        let first = AutomationEngine::with_default_macros(EngineSettings::default());
        let second = AutomationEngine::default();

        first.import_script(r#"{"name": "a", "steps": [{"command": "ls"}]}"#).await.unwrap();
        assert_eq!(first.scripts().list().await.len(), 1);
        assert!(second.scripts().list().await.is_empty());
        assert_eq!(first.macros().list().await.len(), 5);
        assert!(second.macros().list().await.is_empty());
    }

    #[tokio::test]
    async fn overrides_layer_over_script_variables() {
        let engine = AutomationEngine::default();
        let script = engine
            .import_script("name: v\nvariables: {target: 1.1.1.1, user: root}\nsteps:\n  - command: ssh {user}@{target}\n")
            .await
            .unwrap();

        let overrides: IndexMap<String, Value> = [("target".to_string(), Value::from("10.0.0.5"))].into_iter().collect();
        let execution = engine.run_script(&script.id, overrides, Arc::new(EchoExecutor)).await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.output_log[0].command, "ssh root@10.0.0.5");
        let stored = engine.scripts().get(&script.id).await.unwrap();
        assert_eq!(stored.run_count, 1);
        assert!(stored.success);
        assert!(stored.last_run.is_some());
    }

    #[tokio::test]
    async fn unknown_ids_are_reported() {
        let engine = AutomationEngine::default();
        assert!(matches!(
            engine.run_script("nope", IndexMap::new(), Arc::new(EchoExecutor)).await,
            Err(AutomationError::ScriptNotFound { .. })
        ));
        assert!(matches!(
            engine.export_script("nope", DocumentFormat::Json).await,
            Err(AutomationError::ScriptNotFound { .. })
        ));
        assert!(matches!(engine.cancel("nope").await, Err(AutomationError::ExecutionNotFound { .. })));
    }

    #[tokio::test]
    async fn define_macro_validates_alias_and_replaces() {
        let engine = AutomationEngine::default();
        assert!(engine.define_macro("two words", "", vec!["ls".into()], Vec::new()).await.is_err());
        assert!(engine.define_macro("empty", "", Vec::new(), Vec::new()).await.is_err());

        let parameters = vec![MacroParameter::required("host", ParameterType::Ip, "")];
        engine.define_macro("probe", "", vec!["ping {host}".into()], parameters.clone()).await.unwrap();
        engine.define_macro("probe", "v2", vec!["nmap {host}".into()], parameters).await.unwrap();

        let outcome = engine.invoke_macro_text("probe host=10.0.0.2", &EchoExecutor).await.unwrap();
        assert_eq!(outcome.lines(), vec!["nmap 10.0.0.2"]);
        assert_eq!(engine.macros().list().await.len(), 1);
    }
}
