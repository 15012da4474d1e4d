//! # Capture expression evaluator
//!
//! Capture expressions extract values from a step's raw output, for example
//! `extract_ip(output)` or `contains(output, 'open') && $attempts < 3`.
//!
//! Source text is tokenized, parsed into an [`parser::Expression`] tree and
//! walked against the command output and the execution variables. Nothing in
//! the expression can reach host state beyond those two inputs.
//!
//! [`ExpressionEvaluator::evaluate`] is fail-open: any lexing, parsing or
//! evaluation fault produces `false` and a `warn` log entry.
//! [`ExpressionEvaluator::try_evaluate`] surfaces the fault instead.

mod builtins;
mod lexer;
mod parser;

use std::cmp::Ordering;
use std::time::Duration;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

pub use builtins::{extract_ip, extract_port};
use lexer::Lexer;
use parser::{BinaryOp, Expression, Parser};

use crate::error::AutomationError;

/// Default ceiling for `wait(seconds)`.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("expression is empty")]
    Empty,

    #[error("unexpected character '{character}' at offset {offset}")]
    UnexpectedCharacter { character: char, offset: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unterminated string starting at offset {offset}")]
    UnterminatedString { offset: usize },

    #[error("invalid number literal '{literal}'")]
    InvalidNumber { literal: String },

    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("unknown function '{name}' at offset {offset}")]
    UnknownFunction { name: String, offset: usize },

    #[error("unknown identifier '{name}'; variables are referenced as ${name}")]
    UnknownIdentifier { name: String },

    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{function}(): {message}")]
    InvalidArgument { function: &'static str, message: String },

    #[error("cannot compare {left} {op} {right}")]
    InvalidOperands {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
}

impl From<EvaluationError> for AutomationError {
    fn from(error: EvaluationError) -> Self {
        AutomationError::Evaluation { message: error.to_string() }
    }
}

/// Evaluates capture expressions against command output and variables.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionEvaluator {
    max_wait: Duration,
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WAIT)
    }
}

impl ExpressionEvaluator {
    pub fn new(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    /// Evaluate `expression`, yielding `false` when it cannot be evaluated.
    pub async fn evaluate(&self, expression: &str, output: &str, variables: &IndexMap<String, Value>) -> Value {
        match self.try_evaluate(expression, output, variables).await {
            Ok(value) => value,
            Err(error) => {
                warn!(expression = %expression, error = %error, "capture expression failed; using false");
                Value::Bool(false)
            }
        }
    }

    /// Evaluate `expression`, returning the fault on failure.
    pub async fn try_evaluate(
        &self,
        expression: &str,
        output: &str,
        variables: &IndexMap<String, Value>,
    ) -> Result<Value, EvaluationError> {
        let tokens = Lexer::new(expression).tokenize()?;
        let tree = Parser::new(tokens).parse()?;

        let mut scope = Scope {
            output,
            variables,
            max_wait: self.max_wait,
            pending_wait: Duration::ZERO,
        };
        let value = scope.eval(&tree)?;

        if !scope.pending_wait.is_zero() {
            debug!(delay_ms = scope.pending_wait.as_millis() as u64, "capture expression waiting");
            sleep(scope.pending_wait).await;
        }
        Ok(value)
    }
}

struct Scope<'a> {
    output: &'a str,
    variables: &'a IndexMap<String, Value>,
    max_wait: Duration,
    pending_wait: Duration,
}

impl Scope<'_> {
    fn eval(&mut self, expression: &Expression) -> Result<Value, EvaluationError> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Variable(name) => Ok(self.variables.get(name).cloned().unwrap_or(Value::Null)),
            Expression::Output => Ok(Value::String(self.output.to_string())),
            Expression::Not(operand) => Ok(Value::Bool(!truthy(&self.eval(operand)?))),
            Expression::Call { function, arguments } => {
                let values = arguments
                    .iter()
                    .map(|argument| self.eval(argument))
                    .collect::<Result<Vec<_>, _>>()?;
                function.apply(&values, &mut self.pending_wait, self.max_wait)
            }
            Expression::Binary { left, op, right } => self.eval_binary(left, *op, right),
        }
    }

    fn eval_binary(&mut self, left: &Expression, op: BinaryOp, right: &Expression) -> Result<Value, EvaluationError> {
        match op {
            BinaryOp::And => {
                let result = truthy(&self.eval(left)?) && truthy(&self.eval(right)?);
                Ok(Value::Bool(result))
            }
            BinaryOp::Or => {
                let result = truthy(&self.eval(left)?) || truthy(&self.eval(right)?);
                Ok(Value::Bool(result))
            }
            BinaryOp::Eq => Ok(Value::Bool(loosely_equal(&self.eval(left)?, &self.eval(right)?))),
            BinaryOp::Ne => Ok(Value::Bool(!loosely_equal(&self.eval(left)?, &self.eval(right)?))),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                let ordering = compare(&left, &right, op)?;
                let result = match op {
                    BinaryOp::Lt => ordering == Ordering::Less,
                    BinaryOp::Le => ordering != Ordering::Greater,
                    BinaryOp::Gt => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                };
                Ok(Value::Bool(result))
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value, op: BinaryOp) -> Result<Ordering, EvaluationError> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().zip(b.as_f64()).and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.ok_or(EvaluationError::InvalidOperands {
        op: operator_symbol(op),
        left: type_name(left),
        right: type_name(right),
    })
}

fn operator_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::And => "&&",
        BinaryOp::Or => "||",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a value as plain text: strings unquoted, null as empty.
pub fn render_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
