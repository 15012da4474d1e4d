//! Macro expansion: binds typed parameters, substitutes them into the macro's
//! command templates and runs the results sequentially.
//!
//! Parameter binding happens before any command runs, so a missing or
//! malformed parameter never leaves a macro half executed.

pub mod defaults;
pub mod invocation;

use std::net::Ipv4Addr;

use breachkit_types::{Macro, MacroParameter, ParameterType};
use breachkit_util::redact_sensitive;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use defaults::default_macros;
pub use invocation::{MacroInvocation, parse_invocation};

use crate::{error::AutomationError, executor::CommandExecutor, templates::substitute_placeholders};

/// One executed macro command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroCommandResult {
    pub command: String,
    pub output: String,
    pub success: bool,
}

/// Result of running an expanded macro.
///
/// `results` holds every command that ran, including the failing one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroOutcome {
    pub results: Vec<MacroCommandResult>,
    pub error: Option<String>,
}

impl MacroOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// Output lines in execution order.
    pub fn lines(&self) -> Vec<&str> {
        self.results.iter().map(|result| result.output.as_str()).collect()
    }
}

/// Bind supplied values to the macro's declared parameters.
///
/// Absent optional parameters take their default. Optional parameters with no
/// default stay unbound and their placeholders are left in place.
pub fn bind_parameters(
    definition: &Macro,
    supplied: &IndexMap<String, String>,
) -> Result<IndexMap<String, String>, AutomationError> {
    if let Some(unknown) = supplied.keys().find(|name| definition.parameter(name).is_none()) {
        return Err(AutomationError::parameter(
            unknown.as_str(),
            format!("macro '{}' has no such parameter", definition.alias),
        ));
    }

    let mut bound = IndexMap::new();
    for parameter in &definition.parameters {
        let raw = match supplied.get(&parameter.name).or(parameter.default.as_ref()) {
            Some(raw) => raw,
            None if parameter.required => {
                return Err(AutomationError::parameter(&parameter.name, "required parameter is missing"));
            }
            None => continue,
        };
        let value = coerce_parameter(parameter, raw)?;
        bound.insert(parameter.name.clone(), value);
    }
    Ok(bound)
}

/// Validate `raw` against the parameter's type and return the value to substitute.
pub fn coerce_parameter(parameter: &MacroParameter, raw: &str) -> Result<String, AutomationError> {
    let trimmed = raw.trim();
    let invalid = |expected: &str| AutomationError::parameter(&parameter.name, format!("'{raw}' is not a valid {expected}"));

    match parameter.r#type {
        ParameterType::String => Ok(raw.to_string()),
        ParameterType::Number => {
            let number = trimmed.parse::<f64>().map_err(|_| invalid("number"))?;
            if number.is_finite() { Ok(trimmed.to_string()) } else { Err(invalid("number")) }
        }
        ParameterType::Boolean => Ok(trimmed.eq_ignore_ascii_case("true").to_string()),
        ParameterType::Ip => trimmed
            .parse::<Ipv4Addr>()
            .map(|address| address.to_string())
            .map_err(|_| invalid("IPv4 address")),
        ParameterType::Port => match trimmed.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port.to_string()),
            _ => Err(invalid("port (1-65535)")),
        },
    }
}

/// Substitute bound parameters into each command template, in order.
pub fn expand_commands(definition: &Macro, bound: &IndexMap<String, String>) -> Vec<String> {
    definition
        .commands
        .iter()
        .map(|template| substitute_placeholders(template, |name| bound.get(name).cloned()))
        .collect()
}

/// Bind parameters and expand the macro without running anything.
pub fn prepare_macro(definition: &Macro, supplied: &IndexMap<String, String>) -> Result<Vec<String>, AutomationError> {
    let bound = bind_parameters(definition, supplied)?;
    Ok(expand_commands(definition, &bound))
}

/// Run expanded commands one after another, stopping at the first failure.
pub async fn run_expanded(alias: &str, commands: Vec<String>, executor: &dyn CommandExecutor) -> MacroOutcome {
    let mut outcome = MacroOutcome::default();

    for command in commands {
        debug!(alias = %alias, command = %redact_sensitive(&command), "running macro command");
        let (output, success) = match executor.execute(&command).await {
            Ok(result) => (result.output, result.success),
            Err(error) => (error.to_string(), false),
        };
        outcome.results.push(MacroCommandResult {
            command: command.clone(),
            output: output.clone(),
            success,
        });

        if !success {
            warn!(alias = %alias, command = %redact_sensitive(&command), "macro command failed");
            outcome.error = Some(format!("Macro '{alias}' failed at '{command}': {output}"));
            break;
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutcome;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl CommandExecutor for Recording {
        async fn execute(&self, command: &str) -> Result<CommandOutcome> {
            self.calls.lock().unwrap().push(command.to_string());
            if self.fail_on.is_some_and(|prefix| command.starts_with(prefix)) {
                Ok(CommandOutcome::failure("blocked by firewall"))
            } else {
                Ok(CommandOutcome::success(format!("ok: {command}")))
            }
        }
    }

    fn scan_macro() -> Macro {
        Macro {
            id: "macro_scan".into(),
            alias: "scan".into(),
            description: String::new(),
            commands: vec!["ping {target}".into(), "nmap -p {port} {target} {verbose}".into(), "sleep {delay}".into()],
            parameters: vec![
                MacroParameter::required("target", ParameterType::Ip, "host"),
                MacroParameter::optional("port", ParameterType::Port, Some("22"), "port"),
                MacroParameter::optional("verbose", ParameterType::Boolean, Some("false"), "verbose"),
                MacroParameter::optional("delay", ParameterType::Number, None, "delay"),
            ],
            created_at: Utc::now(),
            use_count: 0,
        }
    }

    fn supplied(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs.iter().map(|(name, value)| (name.to_string(), value.to_string())).collect()
    }

    #[test]
    fn defaults_match_explicit_values() {
        let definition = scan_macro();
        let implicit = prepare_macro(&definition, &supplied(&[("target", "10.0.0.5")])).unwrap();
        let explicit = prepare_macro(
            &definition,
            &supplied(&[("target", "10.0.0.5"), ("port", "22"), ("verbose", "false")]),
        )
        .unwrap();
        assert_eq!(implicit, explicit);
        assert_eq!(implicit[1], "nmap -p 22 10.0.0.5 false");
        assert_eq!(implicit[2], "sleep {delay}");
    }

    #[test]
    fn coercion_rejects_bad_values() {
        let definition = scan_macro();
        for (name, value) in [("target", "999.1.1.1"), ("port", "0"), ("port", "70000"), ("delay", "soon")] {
            let mut values = supplied(&[("target", "10.0.0.5")]);
            values.insert(name.to_string(), value.to_string());
            let error = prepare_macro(&definition, &values).expect_err(value);
            assert!(matches!(error, AutomationError::Parameter { ref parameter, .. } if parameter == name));
        }
    }

    #[test]
    fn boolean_is_case_insensitive_true() {
        let definition = scan_macro();
        let commands = prepare_macro(&definition, &supplied(&[("target", "10.0.0.5"), ("verbose", "TRUE")])).unwrap();
        assert!(commands[1].ends_with("true"));
    }

    #[test]
    fn missing_required_and_unknown_parameters_fail() {
        let definition = scan_macro();
        assert!(matches!(
            prepare_macro(&definition, &IndexMap::new()),
            Err(AutomationError::Parameter { ref parameter, .. }) if parameter == "target"
        ));
        assert!(matches!(
            prepare_macro(&definition, &supplied(&[("target", "10.0.0.5"), ("speed", "fast")])),
            Err(AutomationError::Parameter { ref parameter, .. }) if parameter == "speed"
        ));
    }

    #[tokio::test]
    async fn stops_at_first_failure() {
        let executor = Recording {
            calls: Mutex::new(Vec::new()),
            fail_on: Some("nmap"),
        };
        let commands = prepare_macro(&scan_macro(), &supplied(&[("target", "10.0.0.5")])).unwrap();

        let outcome = run_expanded("scan", commands, &executor).await;

        assert_eq!(executor.calls.lock().unwrap().len(), 2);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.lines()[0], "ok: ping 10.0.0.5");
        assert!(!outcome.succeeded());
        assert!(outcome.error.unwrap().contains("blocked by firewall"));
    }
}
