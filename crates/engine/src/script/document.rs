//! Script import/export documents.
//!
//! The interchange format is the camelCase object players paste into the
//! game or keep on disk, in JSON or YAML:
//!
//! ```yaml
//! name: quick-intrusion
//! type: sequence
//! variables: { target: 10.0.0.5 }
//! steps:
//!   - id: scan
//!     command: nmap {target}
//!     expectedOutput: open
//!     onFailure: stop
//!     variables: { port: extract_port(output) }
//! ```
//!
//! Importing validates the document without touching any registry; the
//! caller decides whether to store the resulting [`Script`].

use std::collections::HashSet;
use std::path::Path;

use breachkit_types::{DEFAULT_STEP_TIMEOUT_MS, Script, ScriptKind, Step};
use chrono::Utc;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AutomationError;

/// Serialized shape of a script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDocument {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: ScriptKind,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, Value>,
    pub steps: Vec<StepDocument>,
    /// Stored verbatim; the runner never interprets these.
    #[serde(default)]
    pub conditions: Vec<Value>,
    /// Stored verbatim; the runner never interprets these.
    #[serde(default)]
    pub loops: Vec<Value>,
}

/// Serialized shape of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<String>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_success: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<String>,
    /// Capture map: variable name to expression.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, String>,
}

/// Text format of a script document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick a format from a file extension; anything but `.json` is YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|extension| extension.to_str()) {
            Some(extension) if extension.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

impl ScriptDocument {
    /// Parse document text as JSON or YAML.
    ///
    /// Text with a leading brace is tried as JSON first, then as a YAML flow
    /// mapping; the JSON error is reported when both fail.
    pub fn parse(text: &str) -> Result<Self, AutomationError> {
        let trimmed = text.trim_start();
        if !trimmed.starts_with('{') {
            return serde_yaml::from_str(text).map_err(|error| AutomationError::validation(error.to_string()));
        }
        match serde_json::from_str(trimmed) {
            Ok(document) => Ok(document),
            Err(json_error) => serde_yaml::from_str(trimmed).map_err(|_| AutomationError::validation(json_error.to_string())),
        }
    }

    /// Validate the document and build a script with the given identifier.
    ///
    /// Steps without an id become `step_<index>`; steps without a timeout get
    /// `default_timeout_ms`.
    pub fn into_script(self, id: impl Into<String>, default_timeout_ms: u64) -> Result<Script, AutomationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AutomationError::validation("script name must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut steps = Vec::with_capacity(self.steps.len());
        for (index, document) in self.steps.into_iter().enumerate() {
            let step_id = document
                .id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("step_{index}"));
            if !seen.insert(step_id.clone()) {
                return Err(AutomationError::validation(format!("duplicate step identifier detected: '{step_id}'")));
            }
            if document.command.trim().is_empty() {
                return Err(AutomationError::validation(format!("step '{step_id}' has an empty command")));
            }

            steps.push(Step {
                id: step_id,
                command: document.command,
                parameters: document.parameters,
                expected_output: document.expected_output,
                timeout_ms: document.timeout.unwrap_or(default_timeout_ms),
                retries: document.retries,
                on_success: document.on_success,
                on_failure: document.on_failure,
                variable_captures: document.variables,
            });
        }

        Ok(Script {
            id: id.into(),
            name: name.to_string(),
            description: self.description,
            kind: self.kind,
            steps,
            conditions: self.conditions,
            loops: self.loops,
            variables: self.variables,
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
            success: false,
            errors: Vec::new(),
        })
    }

    /// Capture every field the engine reads from `script`.
    pub fn from_script(script: &Script) -> Self {
        Self {
            name: script.name.clone(),
            description: script.description.clone(),
            kind: script.kind,
            variables: script.variables.clone(),
            steps: script
                .steps
                .iter()
                .map(|step| StepDocument {
                    id: Some(step.id.clone()),
                    command: step.command.clone(),
                    parameters: step.parameters.clone(),
                    expected_output: step.expected_output.clone(),
                    timeout: Some(step.timeout_ms),
                    retries: step.retries,
                    on_success: step.on_success.clone(),
                    on_failure: step.on_failure.clone(),
                    variables: step.variable_captures.clone(),
                })
                .collect(),
            conditions: script.conditions.clone(),
            loops: script.loops.clone(),
        }
    }

    /// Render the document in `format`.
    pub fn render(&self, format: DocumentFormat) -> Result<String, AutomationError> {
        let rendered = match format {
            DocumentFormat::Json => serde_json::to_string_pretty(self).map_err(|error| error.to_string()),
            DocumentFormat::Yaml => serde_yaml::to_string(self).map_err(|error| error.to_string()),
        };
        rendered.map_err(|message| AutomationError::validation(format!("failed to render script: {message}")))
    }
}

/// Parse and validate `text` into a script using the default step timeout.
pub fn import_script(text: &str, id: impl Into<String>) -> Result<Script, AutomationError> {
    ScriptDocument::parse(text)?.into_script(id, DEFAULT_STEP_TIMEOUT_MS)
}
