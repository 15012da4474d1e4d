//! Recursive-descent parser producing the expression AST.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or         := and ( "||" and )*
//! and        := comparison ( "&&" comparison )*
//! comparison := unary ( ( "==" | "!=" | "<" | "<=" | ">" | ">=" ) unary )?
//! unary      := "!" unary | primary
//! primary    := literal | $variable | "output" | name "(" args? ")" | "(" or ")"
//! ```

use serde_json::Value;

use super::{
    EvaluationError,
    builtins::Builtin,
    lexer::{SpannedToken, Token},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    Variable(String),
    /// The command output the expression is evaluated against.
    Output,
    Call { function: Builtin, arguments: Vec<Expression> },
    Not(Box<Expression>),
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

pub struct Parser {
    tokens: Vec<SpannedToken>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<SpannedToken>) -> Self {
        Self { tokens, position: 0 }
    }

    /// Parse the full token stream; trailing tokens are an error.
    pub fn parse(mut self) -> Result<Expression, EvaluationError> {
        if self.tokens.is_empty() {
            return Err(EvaluationError::Empty);
        }
        let expression = self.parse_logical_or()?;
        match self.tokens.get(self.position) {
            None => Ok(expression),
            Some(spanned) => Err(EvaluationError::UnexpectedToken {
                found: spanned.token.display_name(),
                offset: spanned.offset,
            }),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|spanned| &spanned.token)
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let spanned = self.tokens.get(self.position).cloned();
        if spanned.is_some() {
            self.position += 1;
        }
        spanned
    }

    fn expect(&mut self, expected: Token) -> Result<(), EvaluationError> {
        match self.advance() {
            Some(spanned) if spanned.token == expected => Ok(()),
            Some(spanned) => Err(EvaluationError::UnexpectedToken {
                found: spanned.token.display_name(),
                offset: spanned.offset,
            }),
            None => Err(EvaluationError::UnexpectedEnd),
        }
    }

    fn parse_logical_or(&mut self) -> Result<Expression, EvaluationError> {
        let mut left = self.parse_logical_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expression::Binary {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expression, EvaluationError> {
        let mut left = self.parse_comparison()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expression::Binary {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expression, EvaluationError> {
        let left = self.parse_unary()?;

        let op = match self.peek() {
            Some(Token::Eq) => BinaryOp::Eq,
            Some(Token::Ne) => BinaryOp::Ne,
            Some(Token::Lt) => BinaryOp::Lt,
            Some(Token::Le) => BinaryOp::Le,
            Some(Token::Gt) => BinaryOp::Gt,
            Some(Token::Ge) => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_unary()?;
        Ok(Expression::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_unary(&mut self) -> Result<Expression, EvaluationError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expression::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expression, EvaluationError> {
        let spanned = self.advance().ok_or(EvaluationError::UnexpectedEnd)?;

        match spanned.token {
            Token::String(text) => Ok(Expression::Literal(Value::String(text))),
            Token::Number(number) => Ok(Expression::Literal(number_literal(number))),
            Token::True => Ok(Expression::Literal(Value::Bool(true))),
            Token::False => Ok(Expression::Literal(Value::Bool(false))),
            Token::Null => Ok(Expression::Literal(Value::Null)),
            Token::Variable(name) => Ok(Expression::Variable(name)),
            Token::LeftParen => {
                let inner = self.parse_logical_or()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Token::Identifier(name) => {
                if matches!(self.peek(), Some(Token::LeftParen)) {
                    self.parse_call(&name, spanned.offset)
                } else if name == "output" {
                    Ok(Expression::Output)
                } else {
                    Err(EvaluationError::UnknownIdentifier { name })
                }
            }
            other => Err(EvaluationError::UnexpectedToken {
                found: other.display_name(),
                offset: spanned.offset,
            }),
        }
    }

    fn parse_call(&mut self, name: &str, offset: usize) -> Result<Expression, EvaluationError> {
        let function = Builtin::from_name(name).ok_or_else(|| EvaluationError::UnknownFunction {
            name: name.to_string(),
            offset,
        })?;
        self.expect(Token::LeftParen)?;

        let mut arguments = Vec::new();
        if !matches!(self.peek(), Some(Token::RightParen)) {
            loop {
                arguments.push(self.parse_logical_or()?);
                if matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RightParen)?;

        if arguments.len() != function.arity() {
            return Err(EvaluationError::Arity {
                function: function.name(),
                expected: function.arity(),
                found: arguments.len(),
            });
        }

        Ok(Expression::Call { function, arguments })
    }
}

fn number_literal(number: f64) -> Value {
    if number.fract() == 0.0 && number.abs() < i64::MAX as f64 {
        Value::from(number as i64)
    } else {
        serde_json::Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
    }
}
