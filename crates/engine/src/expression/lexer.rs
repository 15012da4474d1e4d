//! Tokenizer for capture expressions.

use super::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// `$name` variable reference.
    Variable(String),
    Identifier(String),
    String(String),
    Number(f64),
    True,
    False,
    Null,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LeftParen,
    RightParen,
    Comma,
}

impl Token {
    pub fn display_name(&self) -> String {
        match self {
            Token::Variable(name) => format!("variable '${name}'"),
            Token::Identifier(name) => format!("identifier '{name}'"),
            Token::String(_) => "string literal".to_string(),
            Token::Number(value) => format!("number {value}"),
            Token::True => "'true'".to_string(),
            Token::False => "'false'".to_string(),
            Token::Null => "'null'".to_string(),
            Token::Not => "'!'".to_string(),
            Token::And => "'&&'".to_string(),
            Token::Or => "'||'".to_string(),
            Token::Eq => "'=='".to_string(),
            Token::Ne => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::LeftParen => "'('".to_string(),
            Token::RightParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

/// Token paired with its byte offset in the source expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub offset: usize,
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>, EvaluationError> {
        let mut tokens = Vec::new();

        while let Some(&(offset, character)) = self.chars.peek() {
            if character.is_whitespace() {
                self.chars.next();
                continue;
            }

            let token = match character {
                '(' => self.single(Token::LeftParen),
                ')' => self.single(Token::RightParen),
                ',' => self.single(Token::Comma),
                '!' => self.one_or_two('=', Token::Not, Token::Ne),
                '<' => self.one_or_two('=', Token::Lt, Token::Le),
                '>' => self.one_or_two('=', Token::Gt, Token::Ge),
                '=' => self.pair('=', Token::Eq, offset)?,
                '&' => self.pair('&', Token::And, offset)?,
                '|' => self.pair('|', Token::Or, offset)?,
                '"' | '\'' => self.string(character, offset)?,
                '$' => self.variable(offset)?,
                c if c.is_ascii_digit() || (c == '-' && self.next_is_digit()) => self.number(offset)?,
                c if c.is_ascii_alphabetic() || c == '_' => self.word(),
                other => return Err(EvaluationError::UnexpectedCharacter { character: other, offset }),
            };

            tokens.push(SpannedToken { token, offset });
        }

        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn one_or_two(&mut self, follower: char, single: Token, double: Token) -> Token {
        self.chars.next();
        if self.chars.next_if(|&(_, character)| character == follower).is_some() {
            double
        } else {
            single
        }
    }

    fn pair(&mut self, follower: char, token: Token, offset: usize) -> Result<Token, EvaluationError> {
        let (_, first) = self.chars.next().ok_or(EvaluationError::UnexpectedEnd)?;
        match self.chars.next_if(|&(_, character)| character == follower) {
            Some(_) => Ok(token),
            None => Err(EvaluationError::UnexpectedCharacter { character: first, offset }),
        }
    }

    fn next_is_digit(&self) -> bool {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.peek().is_some_and(|(_, character)| character.is_ascii_digit())
    }

    fn string(&mut self, quote: char, offset: usize) -> Result<Token, EvaluationError> {
        self.chars.next();
        let mut text = String::new();
        while let Some((_, character)) = self.chars.next() {
            match character {
                '\\' => {
                    let (_, escaped) = self.chars.next().ok_or(EvaluationError::UnterminatedString { offset })?;
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c if c == quote => return Ok(Token::String(text)),
                c => text.push(c),
            }
        }
        Err(EvaluationError::UnterminatedString { offset })
    }

    fn variable(&mut self, offset: usize) -> Result<Token, EvaluationError> {
        self.chars.next();
        let name = self.take_while(|character| character.is_ascii_alphanumeric() || character == '_');
        if name.is_empty() {
            return Err(EvaluationError::UnexpectedCharacter { character: '$', offset });
        }
        Ok(Token::Variable(name))
    }

    fn number(&mut self, offset: usize) -> Result<Token, EvaluationError> {
        let start = offset;
        self.chars.next();
        let mut end = start + 1;
        while let Some(&(index, character)) = self.chars.peek() {
            if character.is_ascii_digit() || character == '.' {
                end = index + 1;
                self.chars.next();
            } else {
                break;
            }
        }
        let literal = &self.source[start..end];
        literal
            .parse::<f64>()
            .map(Token::Number)
            .map_err(|_| EvaluationError::InvalidNumber { literal: literal.to_string() })
    }

    fn word(&mut self) -> Token {
        let word = self.take_while(|character| character.is_ascii_alphanumeric() || character == '_');
        match word.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            _ => Token::Identifier(word),
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some((_, character)) = self.chars.next_if(|&(_, character)| predicate(character)) {
            text.push(character);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        Lexer::new(source).tokenize().expect("tokenize").into_iter().map(|spanned| spanned.token).collect()
    }

    #[test]
    fn tokenizes_call_with_variable_and_string() {
        assert_eq!(
            tokens("contains($banner, 'ssh')"),
            vec![
                Token::Identifier("contains".into()),
                Token::LeftParen,
                Token::Variable("banner".into()),
                Token::Comma,
                Token::String("ssh".into()),
                Token::RightParen,
            ]
        );
    }

    #[test]
    fn tokenizes_operators() {
        assert_eq!(
            tokens("!a != b <= 3 && c >= -1.5 || d == null"),
            vec![
                Token::Not,
                Token::Identifier("a".into()),
                Token::Ne,
                Token::Identifier("b".into()),
                Token::Le,
                Token::Number(3.0),
                Token::And,
                Token::Identifier("c".into()),
                Token::Ge,
                Token::Number(-1.5),
                Token::Or,
                Token::Identifier("d".into()),
                Token::Eq,
                Token::Null,
            ]
        );
    }

    #[test]
    fn rejects_single_ampersand_and_assignment() {
        assert!(Lexer::new("a & b").tokenize().is_err());
        assert!(Lexer::new("a = b").tokenize().is_err());
    }

    #[test]
    fn rejects_unterminated_string() {
        let error = Lexer::new("contains(output, \"open").tokenize().expect_err("unterminated");
        assert!(matches!(error, EvaluationError::UnterminatedString { offset: 17 }));
    }

    #[test]
    fn rejects_foreign_syntax() {
        assert!(Lexer::new("process.exit(1); output").tokenize().is_err());
        assert!(Lexer::new("`ls`").tokenize().is_err());
    }
}
