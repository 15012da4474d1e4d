//! Script compatibility checks against a player's game state.
//!
//! Each step's leading command token (and, for steps that call a macro, the
//! leading token of every template the macro expands to) must be unlocked and
//! must have its hardware and software requirements present in the inventory.

use breachkit_types::{GameState, Macro, Script};
use indexmap::{IndexMap, IndexSet};

/// Decides whether a command token is usable in a given game state.
pub trait CommandAvailability: Send + Sync {
    fn is_available(&self, command: &str, game_state: &GameState) -> bool;
}

/// Availability backed by [`GameState::unlocked_commands`].
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlockedCommands;

impl CommandAvailability for UnlockedCommands {
    fn is_available(&self, command: &str, game_state: &GameState) -> bool {
        game_state.unlocked_commands.contains(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementKind {
    Hardware,
    Software,
}

impl RequirementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Software => "software",
        }
    }
}

/// An inventory item a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub kind: RequirementKind,
    pub item: &'static str,
}

const fn hardware(item: &'static str) -> Requirement {
    Requirement {
        kind: RequirementKind::Hardware,
        item,
    }
}

const fn software(item: &'static str) -> Requirement {
    Requirement {
        kind: RequirementKind::Software,
        item,
    }
}

static REQUIREMENTS: &[(&str, &[Requirement])] = &[
    ("iot_hack", &[hardware("esp32_dev")]),
    ("wifi_crack", &[hardware("wifi_adapter"), software("aircrack")]),
    ("rfid_clone", &[hardware("proxmark")]),
    ("bluetooth_scan", &[hardware("ubertooth")]),
    ("sdr_capture", &[hardware("hackrf")]),
    ("crack", &[software("hashcat")]),
    ("phish", &[software("phishing_kit")]),
];

/// Static requirements for a command token.
pub fn requirements_for(command: &str) -> &'static [Requirement] {
    REQUIREMENTS
        .iter()
        .find(|(name, _)| *name == command)
        .map(|(_, requirements)| *requirements)
        .unwrap_or(&[])
}

fn leading_token(command: &str) -> Option<&str> {
    command.split_whitespace().next()
}

/// Checks scripts against game state using an availability collaborator.
pub struct Validator<'a> {
    availability: &'a dyn CommandAvailability,
}

impl<'a> Validator<'a> {
    pub fn new(availability: &'a dyn CommandAvailability) -> Self {
        Self { availability }
    }

    /// List compatibility problems for `script`; empty means compatible.
    ///
    /// `macros` is keyed by alias. Problems are unique and keep the order in
    /// which they were first found.
    pub fn validate(&self, script: &Script, macros: &IndexMap<String, Macro>, game_state: &GameState) -> Vec<String> {
        let mut problems = IndexSet::new();

        for step in &script.steps {
            let Some(token) = leading_token(&step.command) else {
                continue;
            };
            match macros.get(token) {
                Some(definition) => {
                    for template in &definition.commands {
                        if let Some(expanded) = leading_token(template) {
                            self.check_command(expanded, game_state, &mut problems);
                        }
                    }
                }
                None => self.check_command(token, game_state, &mut problems),
            }
        }

        problems.into_iter().collect()
    }

    fn check_command(&self, command: &str, game_state: &GameState, problems: &mut IndexSet<String>) {
        if !self.availability.is_available(command, game_state) {
            problems.insert(format!("Command '{command}' is not available"));
        }
        for requirement in requirements_for(command) {
            if !game_state.has_item(requirement.item) {
                problems.insert(format!(
                    "Command '{command}' requires {} '{}'",
                    requirement.kind.as_str(),
                    requirement.item
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macros::default_macros;
    use breachkit_types::Step;
    use chrono::Utc;

    fn script(commands: &[&str]) -> Script {
        Script {
            id: "s".into(),
            name: "s".into(),
            description: String::new(),
            kind: Default::default(),
            steps: commands
                .iter()
                .enumerate()
                .map(|(index, command)| Step::new(format!("step_{index}"), *command))
                .collect(),
            conditions: Vec::new(),
            loops: Vec::new(),
            variables: IndexMap::new(),
            created_at: Utc::now(),
            last_run: None,
            run_count: 0,
            success: false,
            errors: Vec::new(),
        }
    }

    #[test]
    fn reports_missing_hardware() {
        let state = GameState::default().with_unlocked(["iot_hack"]);
        let problems = Validator::new(&UnlockedCommands).validate(&script(&["iot_hack 10.0.0.8"]), &IndexMap::new(), &state);
        assert_eq!(problems, vec!["Command 'iot_hack' requires hardware 'esp32_dev'".to_string()]);
    }

    #[test]
    fn deduplicates_problems_in_first_seen_order() {
        let state = GameState::default();
        let problems =
            Validator::new(&UnlockedCommands).validate(&script(&["crack a", "crack b", "ls"]), &IndexMap::new(), &state);
        assert_eq!(
            problems,
            vec![
                "Command 'crack' is not available".to_string(),
                "Command 'crack' requires software 'hashcat'".to_string(),
                "Command 'ls' is not available".to_string(),
            ]
        );
    }

    #[test]
    fn expands_macro_templates() {
        let macros: IndexMap<String, Macro> = default_macros()
            .into_iter()
            .map(|definition| (definition.alias.clone(), definition))
            .collect();
        let state = GameState::default().with_unlocked(["ping", "nmap"]);
        let problems = Validator::new(&UnlockedCommands).validate(&script(&["intrude target=10.0.0.5"]), &macros, &state);
        assert_eq!(problems, vec!["Command 'exploit' is not available".to_string()]);
    }

    #[test]
    fn compatible_script_has_no_problems() {
        let state = GameState::default()
            .with_unlocked(["iot_hack"])
            .with_inventory(["esp32_dev"]);
        let problems = Validator::new(&UnlockedCommands).validate(&script(&["iot_hack"]), &IndexMap::new(), &state);
        assert!(problems.is_empty());
    }
}
