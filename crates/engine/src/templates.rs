//! `{name}` placeholder parsing and substitution for command templates.

use indexmap::IndexMap;
use serde_json::Value;

use crate::expression::render_text;

/// Extracts placeholder names from a template, in order of appearance.
///
/// Returned names do not include the `{` `}` delimiters; duplicates are kept.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut remainder = template;

    while let Some(start) = remainder.find('{') {
        let after_start = &remainder[start + 1..];
        match placeholder_name(after_start) {
            Some(name) => {
                names.push(name.to_string());
                remainder = &after_start[name.len() + 1..];
            }
            None => remainder = after_start,
        }
    }

    names
}

/// Replaces every `{name}` for which `lookup` yields a value.
///
/// Placeholders without a value are left untouched, and a template with no
/// placeholders is returned unchanged.
pub fn substitute_placeholders<F>(template: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut resolved = String::with_capacity(template.len());
    let mut remainder = template;

    while let Some(start) = remainder.find('{') {
        resolved.push_str(&remainder[..start]);
        let after_start = &remainder[start + 1..];

        match placeholder_name(after_start).and_then(|name| lookup(name).map(|value| (name, value))) {
            Some((name, value)) => {
                resolved.push_str(&value);
                remainder = &after_start[name.len() + 1..];
            }
            None => {
                resolved.push('{');
                remainder = after_start;
            }
        }
    }

    resolved.push_str(remainder);
    resolved
}

/// Resolves a step command: substitutes execution variables then appends
/// `parameters` separated by single spaces.
pub fn resolve_step_command(template: &str, parameters: &[String], variables: &IndexMap<String, Value>) -> String {
    let mut command = substitute_placeholders(template, |name| variables.get(name).map(render_text));
    for parameter in parameters {
        command.push(' ');
        command.push_str(parameter);
    }
    command
}

/// Returns the name when `text` starts with `name}`.
fn placeholder_name(text: &str) -> Option<&str> {
    let end = text.find('}')?;
    let name = &text[..end];
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || character == '_' || character == '-');
    valid.then_some(name)
}
