// Error handling for the Flowlisp runtime

use crate::ast::Expression;
use crate::runtime::task_bridge::BridgeError;
use crate::runtime::values::Value;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Coarse classification of evaluation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong operand count for a primitive, closure or atomic task
    Arity,
    /// Operand of the wrong kind, or a value that is not callable
    Type,
    /// Lookup or `set!` on a name with no binding anywhere in the chain
    UnboundSymbol,
    /// Operand of the right kind but an unacceptable value
    InvalidArgument,
    /// Malformed special form (bad clause shape, missing clause)
    InvalidForm,
    /// Connection/timeout/protocol failure from the task bridge
    ExternalCall,
    /// External response could not be read into the expected shape
    StructuredOutput,
    /// The caller's cancellation token fired
    Cancelled,
    /// Nesting exceeded the configured recursion ceiling
    RecursionLimit,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Arity => "arity",
            ErrorKind::Type => "type",
            ErrorKind::UnboundSymbol => "unbound-symbol",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::InvalidForm => "invalid-form",
            ErrorKind::ExternalCall => "external-call",
            ErrorKind::StructuredOutput => "structured-output",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RecursionLimit => "recursion-limit",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An evaluation failure, anchored to the smallest sub-expression that failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} error: {message} (in `{expression}`)")]
pub struct EvalError {
    pub kind: ErrorKind,
    pub message: String,
    /// Source text of the failing sub-expression
    pub expression: String,
    /// Nested detail, e.g. the original message of an external-call failure
    pub details: Option<String>,
}

impl EvalError {
    pub fn new(kind: ErrorKind, message: impl Into<String>, expr: &Expression) -> Self {
        EvalError {
            kind,
            message: message.into(),
            expression: expr.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn arity(function: &str, expected: impl fmt::Display, actual: usize, expr: &Expression) -> Self {
        Self::new(
            ErrorKind::Arity,
            format!("{} expects {} operand(s), got {}", function, expected, actual),
            expr,
        )
    }

    /// Type error for operand `position` (1-based) of `operation`.
    pub fn type_error(
        operation: &str,
        position: usize,
        expected: &str,
        actual: &str,
        expr: &Expression,
    ) -> Self {
        Self::new(
            ErrorKind::Type,
            format!(
                "{} operand {} must be {}, got {}",
                operation, position, expected, actual
            ),
            expr,
        )
    }

    pub fn unbound(name: &str, expr: &Expression) -> Self {
        Self::new(ErrorKind::UnboundSymbol, format!("unbound symbol: {}", name), expr)
    }

    pub fn invalid_argument(message: impl Into<String>, expr: &Expression) -> Self {
        Self::new(ErrorKind::InvalidArgument, message, expr)
    }

    pub fn invalid_form(message: impl Into<String>, expr: &Expression) -> Self {
        Self::new(ErrorKind::InvalidForm, message, expr)
    }

    pub fn structured_output(message: impl Into<String>, expr: &Expression) -> Self {
        Self::new(ErrorKind::StructuredOutput, message, expr)
    }

    pub fn cancelled(expr: &Expression) -> Self {
        Self::new(ErrorKind::Cancelled, "evaluation cancelled", expr)
    }

    /// Wraps a task-bridge failure, keeping the original message as nested detail.
    pub fn from_bridge(err: BridgeError, operation: &str, expr: &Expression) -> Self {
        match err {
            BridgeError::Cancelled => Self::cancelled(expr),
            other => Self::new(
                ErrorKind::ExternalCall,
                format!("{} failed", operation),
                expr,
            )
            .with_details(other.to_string()),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    /// Convert into a record value so scripts can inspect it with `get-field`.
    pub fn to_value(&self) -> Value {
        Value::Error(Rc::new(self.clone()))
    }
}
