//! Redaction of secret-looking values before command text reaches the logs.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ASSIGNMENT_SECRET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([a-z0-9_]*(?:key|token|secret|password|passwd))=([^\s]+)").expect("assignment secret pattern")
});

static FLAG_SECRET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(--?(?:key|token|secret|password|pass))(\s+|=)([^\s]+)").expect("flag secret pattern"));

/// Replace values that look like credentials with `<redacted>`.
///
/// Handles `name=value` assignments whose name ends in key/token/secret/password
/// and `--key value` / `--password=value` style flags.
pub fn redact_sensitive(input: &str) -> String {
    let redacted = ASSIGNMENT_SECRET.replace_all(input, |captures: &Captures| format!("{}=<redacted>", &captures[1]));
    FLAG_SECRET
        .replace_all(&redacted, |captures: &Captures| format!("{}{}<redacted>", &captures[1], &captures[2]))
        .into_owned()
}
