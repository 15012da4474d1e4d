//! Host-side helpers shared by breachkit crates: settings loading,
//! invocation lexing, and log redaction.

pub mod path_processing;
pub mod redaction;
pub mod settings;
pub mod shell_lexing;

pub use path_processing::expand_tilde;
pub use redaction::redact_sensitive;
pub use settings::{EngineSettings, SettingsError, default_settings_path};
