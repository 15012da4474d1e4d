//! Macros registered by [`crate::AutomationEngine::with_default_macros`].

use breachkit_types::{Macro, MacroParameter, ParameterType};
use chrono::Utc;

fn bundled(alias: &str, description: &str, commands: &[&str], parameters: Vec<MacroParameter>) -> Macro {
    Macro {
        id: format!("default_{alias}"),
        alias: alias.to_string(),
        description: description.to_string(),
        commands: commands.iter().map(|command| command.to_string()).collect(),
        parameters,
        created_at: Utc::now(),
        use_count: 0,
    }
}

fn target() -> MacroParameter {
    MacroParameter::required("target", ParameterType::Ip, "Target host address")
}

pub fn default_macros() -> Vec<Macro> {
    vec![
        bundled(
            "intrude",
            "Ping, scan and exploit a host",
            &["ping {target}", "nmap {target}", "exploit {target}"],
            vec![target()],
        ),
        bundled(
            "recon",
            "Gather service and ownership details for a host",
            &["ping {target}", "nmap -sV {target}", "whois {target}"],
            vec![target()],
        ),
        bundled(
            "stealth_scan",
            "Slow scan that pauses between probes",
            &["ping {target}", "wait {delay}", "scan {target}", "wait {delay}", "scan {target}"],
            vec![
                target(),
                MacroParameter::optional("delay", ParameterType::Number, Some("5"), "Seconds to pause between probes"),
            ],
        ),
        bundled(
            "cleanup",
            "Remove traces of the current session",
            &["clear_logs", "wipe_history", "disconnect"],
            Vec::new(),
        ),
        bundled(
            "data_exfil",
            "Package, encrypt and upload loot",
            &["compress {type}", "encrypt {key}", "upload {destination}"],
            vec![
                MacroParameter::optional("type", ParameterType::String, Some("all"), "Kind of data to collect"),
                MacroParameter::optional("key", ParameterType::String, Some("default"), "Encryption key name"),
                MacroParameter::required("destination", ParameterType::String, "Upload destination"),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::extract_placeholders;

    #[test]
    fn every_placeholder_is_declared() {
        for definition in default_macros() {
            for template in &definition.commands {
                for name in extract_placeholders(template) {
                    assert!(definition.parameter(&name).is_some(), "{}: undeclared '{name}'", definition.alias);
                }
            }
        }
    }

    #[test]
    fn aliases_are_unique() {
        let macros = default_macros();
        let mut aliases: Vec<_> = macros.iter().map(|definition| definition.alias.as_str()).collect();
        aliases.sort_unstable();
        aliases.dedup();
        assert_eq!(aliases.len(), macros.len());
    }
}
