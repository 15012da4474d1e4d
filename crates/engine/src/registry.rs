//! In-memory script, macro and execution registries.
//!
//! Each registry is a cheap-to-clone handle over a `tokio::sync::Mutex`
//! guarded map, so an [`crate::AutomationEngine`] can be shared across tasks.
//! Read-modify-write operations (run statistics, macro use counts,
//! cancellation) happen under a single lock acquisition.

use std::sync::Arc;

use breachkit_types::{Execution, ExecutionStatus, Macro, Script};
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{error::AutomationError, macros::prepare_macro};

/// Scripts keyed by id, in insertion order.
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    scripts: Arc<Mutex<IndexMap<String, Script>>>,
}

impl ScriptRegistry {
    /// Stores `script`, replacing any script with the same id.
    pub async fn insert(&self, script: Script) -> Option<Script> {
        let mut scripts = self.scripts.lock().await;
        scripts.insert(script.id.clone(), script)
    }

    pub async fn get(&self, id: &str) -> Option<Script> {
        self.scripts.lock().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Script> {
        self.scripts.lock().await.values().cloned().collect()
    }

    pub async fn remove(&self, id: &str) -> Option<Script> {
        self.scripts.lock().await.shift_remove(id)
    }

    /// Applies a finished execution to the script's run statistics.
    ///
    /// Fatal messages from this run are appended to `errors`. Returns `false`
    /// when the script no longer exists.
    pub async fn record_run(&self, id: &str, execution: &Execution) -> bool {
        let mut scripts = self.scripts.lock().await;
        let Some(script) = scripts.get_mut(id) else {
            return false;
        };
        script.last_run = execution.end_time.or(Some(execution.start_time));
        script.run_count += 1;
        script.success = execution.status == ExecutionStatus::Completed;
        script.errors.extend(execution.errors.iter().cloned());
        true
    }
}

/// Macros keyed by alias, in definition order.
#[derive(Clone, Default)]
pub struct MacroRegistry {
    macros: Arc<Mutex<IndexMap<String, Macro>>>,
}

impl MacroRegistry {
    pub fn from_macros(definitions: impl IntoIterator<Item = Macro>) -> Self {
        let macros = definitions
            .into_iter()
            .map(|definition| (definition.alias.clone(), definition))
            .collect();
        Self {
            macros: Arc::new(Mutex::new(macros)),
        }
    }

    /// Stores `definition`, replacing any macro with the same alias.
    pub async fn define(&self, definition: Macro) -> Option<Macro> {
        let mut macros = self.macros.lock().await;
        macros.insert(definition.alias.clone(), definition)
    }

    pub async fn get(&self, alias: &str) -> Option<Macro> {
        self.macros.lock().await.get(alias).cloned()
    }

    pub async fn list(&self) -> Vec<Macro> {
        self.macros.lock().await.values().cloned().collect()
    }

    pub async fn remove(&self, alias: &str) -> Option<Macro> {
        self.macros.lock().await.shift_remove(alias)
    }

    /// Copy of the alias map, for validation.
    pub async fn snapshot(&self) -> IndexMap<String, Macro> {
        self.macros.lock().await.clone()
    }

    /// Binds parameters and expands the macro's commands.
    ///
    /// On success the macro's use count is incremented in the same critical
    /// section, so every invocation that passes validation is counted once.
    pub async fn prepare_invocation(
        &self,
        alias: &str,
        supplied: &IndexMap<String, String>,
    ) -> Result<Vec<String>, AutomationError> {
        let mut macros = self.macros.lock().await;
        let definition = macros.get_mut(alias).ok_or_else(|| AutomationError::macro_not_found(alias))?;
        let commands = prepare_macro(definition, supplied)?;
        definition.use_count += 1;
        Ok(commands)
    }
}

struct ExecutionEntry {
    execution: Execution,
    cancel: CancellationToken,
}

/// Executions keyed by id, oldest first.
#[derive(Clone, Default)]
pub struct ExecutionRegistry {
    entries: Arc<Mutex<IndexMap<String, ExecutionEntry>>>,
    history_limit: Option<usize>,
}

impl ExecutionRegistry {
    /// Keep at most `history_limit` finished executions; `None` keeps all.
    pub fn new(history_limit: Option<usize>) -> Self {
        Self {
            entries: Arc::default(),
            history_limit,
        }
    }

    /// Records a starting execution and returns its cancellation token.
    pub async fn register(&self, execution: Execution) -> CancellationToken {
        let cancel = CancellationToken::new();
        let mut entries = self.entries.lock().await;
        entries.insert(
            execution.id.clone(),
            ExecutionEntry {
                execution,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Stores the final state of an execution and returns the stored record.
    ///
    /// A record already cancelled through [`Self::cancel`] keeps its cancelled
    /// status and end time.
    pub async fn complete(&self, mut execution: Execution) -> Execution {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&execution.id) {
            if entry.execution.status == ExecutionStatus::Cancelled {
                execution.status = ExecutionStatus::Cancelled;
                execution.end_time = entry.execution.end_time.or(execution.end_time);
            }
            entry.execution = execution.clone();
        } else {
            entries.insert(
                execution.id.clone(),
                ExecutionEntry {
                    execution: execution.clone(),
                    cancel: CancellationToken::new(),
                },
            );
        }
        self.evict_finished(&mut entries);
        execution
    }

    pub async fn get(&self, id: &str) -> Option<Execution> {
        self.entries.lock().await.get(id).map(|entry| entry.execution.clone())
    }

    pub async fn list(&self) -> Vec<Execution> {
        self.entries.lock().await.values().map(|entry| entry.execution.clone()).collect()
    }

    /// Cancels a running execution: flips its status, stamps the end time and
    /// interrupts any in-flight command. Finished executions are returned
    /// unchanged.
    pub async fn cancel(&self, id: &str) -> Result<Execution, AutomationError> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(id).ok_or_else(|| AutomationError::execution_not_found(id))?;
        if !entry.execution.status.is_terminal() {
            entry.cancel.cancel();
            entry.execution.finish(ExecutionStatus::Cancelled);
            info!(execution_id = %id, "execution cancelled");
        }
        Ok(entry.execution.clone())
    }

    fn evict_finished(&self, entries: &mut IndexMap<String, ExecutionEntry>) {
        let Some(limit) = self.history_limit else {
            return;
        };
        let mut finished = entries.values().filter(|entry| entry.execution.status.is_terminal()).count();
        while finished > limit {
            let Some(oldest) = entries
                .iter()
                .find(|(_, entry)| entry.execution.status.is_terminal())
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!(execution_id = %oldest, "evicting finished execution");
            entries.shift_remove(&oldest);
            finished -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use breachkit_types::{MacroParameter, ParameterType};
    use chrono::Utc;

    fn execution(id: &str) -> Execution {
        Execution::start(id, "script_1", IndexMap::new())
    }

    #[tokio::test]
    async fn cancel_marks_running_execution_and_fires_token() {
        let registry = ExecutionRegistry::default();
        let token = registry.register(execution("exec_1")).await;

        let cancelled = registry.cancel("exec_1").await.unwrap();
        assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
        assert!(cancelled.end_time.is_some());
        assert!(token.is_cancelled());

        let mut finished = execution("exec_1");
        finished.finish(ExecutionStatus::Completed);
        let stored = registry.complete(finished).await;
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_unknown_execution_fails() {
        let registry = ExecutionRegistry::default();
        assert_eq!(
            registry.cancel("missing").await.unwrap_err(),
            AutomationError::execution_not_found("missing")
        );
    }

    #[tokio::test]
    async fn history_limit_evicts_oldest_finished() {
        let registry = ExecutionRegistry::new(Some(2));
        registry.register(execution("running")).await;
        for id in ["a", "b", "c"] {
            let mut done = execution(id);
            done.finish(ExecutionStatus::Completed);
            registry.register(done.clone()).await;
            registry.complete(done).await;
        }

        let ids: Vec<_> = registry.list().await.into_iter().map(|execution| execution.id).collect();
        assert_eq!(ids, vec!["running", "b", "c"]);
    }

    #[tokio::test]
    async fn record_run_updates_statistics() {
        let registry = ScriptRegistry::default();
        let script: Script = crate::script::import_script(r#"{"name": "s", "steps": []}"#, "script_1").unwrap();
        registry.insert(script).await;

        let mut failed = execution("exec_1");
        failed.errors.push("Step 'a' failed: nope".into());
        failed.finish(ExecutionStatus::Failed);
        assert!(registry.record_run("script_1", &failed).await);

        let stored = registry.get("script_1").await.unwrap();
        assert_eq!(stored.run_count, 1);
        assert!(!stored.success);
        assert_eq!(stored.errors, failed.errors);
        assert_eq!(stored.last_run, failed.end_time);
        assert!(!registry.record_run("missing", &failed).await);
    }

    #[tokio::test]
    async fn record_run_accumulates_errors_across_runs() {
        let registry = ScriptRegistry::default();
        let script: Script = crate::script::import_script(r#"{"name": "s", "steps": []}"#, "script_1").unwrap();
        registry.insert(script).await;

        for (id, message) in [("exec_1", "Step 'a' failed: nope one"), ("exec_2", "Step 'a' failed: nope two")] {
            let mut failed = execution(id);
            failed.errors.push(message.into());
            failed.finish(ExecutionStatus::Failed);
            registry.record_run("script_1", &failed).await;
        }
        let mut passed = execution("exec_3");
        passed.finish(ExecutionStatus::Completed);
        registry.record_run("script_1", &passed).await;

        let stored = registry.get("script_1").await.unwrap();
        assert_eq!(stored.run_count, 3);
        assert!(stored.success);
        assert_eq!(stored.errors, vec!["Step 'a' failed: nope one", "Step 'a' failed: nope two"]);
    }

    #[tokio::test]
    async fn use_count_only_counts_valid_invocations() {
        let registry = MacroRegistry::from_macros([Macro {
            id: "m".into(),
            alias: "ping_host".into(),
            description: String::new(),
            commands: vec!["ping {target}".into()],
            parameters: vec![MacroParameter::required("target", ParameterType::Ip, "")],
            created_at: Utc::now(),
            use_count: 0,
        }]);

        let bad: IndexMap<String, String> = [("target".to_string(), "999.1.1.1".to_string())].into_iter().collect();
        assert!(registry.prepare_invocation("ping_host", &bad).await.is_err());
        let good: IndexMap<String, String> = [("target".to_string(), "10.0.0.1".to_string())].into_iter().collect();
        assert_eq!(registry.prepare_invocation("ping_host", &good).await.unwrap(), vec!["ping 10.0.0.1"]);

        assert_eq!(registry.get("ping_host").await.unwrap().use_count, 1);
        assert!(matches!(
            registry.prepare_invocation("nope", &good).await,
            Err(AutomationError::MacroNotFound { .. })
        ));
    }
}
