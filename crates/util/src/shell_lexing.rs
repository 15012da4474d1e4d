//! # Shell-like Lexing Utilities
//!
//! Tokenizes free-text invocations such as `data_exfil destination="10.0.0.9:22" key=alpha`.
//! Single and double quotes group whitespace, backslash escapes the next
//! character, and quotes are removed from the resulting words.

/// Word extracted from an invocation, with its byte range in the original input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexToken {
    /// Unquoted, unescaped text.
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Split input into unquoted words.
///
/// ```rust
/// use breachkit_util::shell_lexing::lex_shell_like;
///
/// let tokens = lex_shell_like("recon target='10.0.0.5' note=\"a b\"");
/// assert_eq!(tokens, vec!["recon", "target=10.0.0.5", "note=a b"]);
/// ```
pub fn lex_shell_like(input: &str) -> Vec<String> {
    lex_shell_like_ranged(input).into_iter().map(|token| token.text).collect()
}

/// Split input into words, keeping their byte ranges for error reporting.
pub fn lex_shell_like_ranged(input: &str) -> Vec<LexToken> {
    let mut tokens = Vec::new();
    let mut characters = input.char_indices().peekable();

    loop {
        while let Some((_, character)) = characters.peek() {
            if character.is_whitespace() {
                characters.next();
            } else {
                break;
            }
        }

        let Some(&(start, _)) = characters.peek() else {
            break;
        };

        let mut text = String::new();
        let mut end = start;
        let mut quote: Option<char> = None;

        while let Some(&(index, character)) = characters.peek() {
            if quote.is_none() && character.is_whitespace() {
                break;
            }
            characters.next();
            end = index + character.len_utf8();

            match (quote, character) {
                (_, '\\') => {
                    if let Some((escaped_index, escaped)) = characters.next() {
                        text.push(escaped);
                        end = escaped_index + escaped.len_utf8();
                    }
                }
                (None, '\'' | '"') => quote = Some(character),
                (Some(open), _) if open == character => quote = None,
                _ => text.push(character),
            }
        }

        tokens.push(LexToken { text, start, end });
    }

    tokens
}

/// Split a `name=value` word. Returns `None` for bare words or an empty name.
pub fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    let name = name.trim();
    if name.is_empty() { None } else { Some((name, value)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokenization() {
        assert_eq!(lex_shell_like("intrude target=10.0.0.5"), vec!["intrude", "target=10.0.0.5"]);
    }

    #[test]
    fn test_quotes_are_removed() {
        assert_eq!(lex_shell_like("cmd 'arg with spaces'"), vec!["cmd", "arg with spaces"]);
        assert_eq!(lex_shell_like("echo \"hello world\""), vec!["echo", "hello world"]);
        assert_eq!(lex_shell_like("say \"it's\""), vec!["say", "it's"]);
    }

    #[test]
    fn test_escaped_characters() {
        assert_eq!(lex_shell_like("path\\ with\\ spaces"), vec!["path with spaces"]);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert!(lex_shell_like("").is_empty());
        assert!(lex_shell_like("   \t  \n  ").is_empty());
    }

    #[test]
    fn test_ranged_tokenization() {
        let input = "macro key='a b'";
        let tokens = lex_shell_like_ranged(input);
        assert_eq!(tokens.len(), 2);
        assert_eq!((tokens[0].start, tokens[0].end), (0, 5));
        assert_eq!(tokens[1].text, "key=a b");
        assert_eq!((tokens[1].start, tokens[1].end), (6, input.len()));
    }

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("target=10.0.0.5"), Some(("target", "10.0.0.5")));
        assert_eq!(split_assignment("note="), Some(("note", "")));
        assert_eq!(split_assignment("10.0.0.5"), None);
        assert_eq!(split_assignment("=value"), None);
    }
}
