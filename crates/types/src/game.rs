//! Snapshot of the player's game state consulted by script validation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Unlocked commands and owned items at the time a script is checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameState {
    /// Command tokens the player has unlocked.
    #[serde(default)]
    pub unlocked_commands: BTreeSet<String>,
    /// Hardware and software item names the player owns.
    #[serde(default)]
    pub inventory: BTreeSet<String>,
}

impl GameState {
    pub fn has_item(&self, item: &str) -> bool {
        self.inventory.contains(item)
    }

    pub fn with_unlocked<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unlocked_commands.extend(commands.into_iter().map(Into::into));
        self
    }

    pub fn with_inventory<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inventory.extend(items.into_iter().map(Into::into));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_with_missing_sections() {
        let state: GameState = serde_json::from_str(r#"{"inventory": ["esp32_dev"]}"#).expect("deserialize game state");
        assert!(state.unlocked_commands.is_empty());
        assert!(state.has_item("esp32_dev"));
        assert!(!state.has_item("hackrf_one"));
    }
}
