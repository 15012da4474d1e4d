//! Free-text macro invocations: `alias name=value name2="quoted value"`.
//!
//! Parameters are bound by name only. Bare positional words are rejected so a
//! change in a macro's declared parameter order can never silently rebind an
//! existing invocation.

use breachkit_util::shell_lexing::{lex_shell_like_ranged, split_assignment};
use indexmap::IndexMap;

use crate::error::AutomationError;

/// A parsed free-text invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInvocation {
    pub alias: String,
    pub parameters: IndexMap<String, String>,
}

/// Parse `input` into an alias and named parameters.
///
/// ```rust
/// use breachkit_engine::macros::parse_invocation;
///
/// let invocation = parse_invocation("data_exfil destination='10.0.0.9:22' key=alpha").unwrap();
/// assert_eq!(invocation.alias, "data_exfil");
/// assert_eq!(invocation.parameters["destination"], "10.0.0.9:22");
/// ```
pub fn parse_invocation(input: &str) -> Result<MacroInvocation, AutomationError> {
    let mut tokens = lex_shell_like_ranged(input).into_iter();
    let alias = tokens
        .next()
        .map(|token| token.text)
        .filter(|alias| !alias.is_empty())
        .ok_or_else(|| AutomationError::validation("macro invocation is empty"))?;

    let mut parameters = IndexMap::new();
    for token in tokens {
        let Some((name, value)) = split_assignment(&token.text) else {
            return Err(AutomationError::parameter(
                token.text.as_str(),
                format!(
                    "positional argument at offset {} is not supported; use name=value",
                    token.start
                ),
            ));
        };
        if parameters.insert(name.to_string(), value.to_string()).is_some() {
            return Err(AutomationError::parameter(name, "supplied more than once"));
        }
    }

    Ok(MacroInvocation { alias, parameters })
}
