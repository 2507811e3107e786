//! Expression model produced by the reader and consumed by the evaluator.
//!
//! Expressions are immutable trees: the evaluator only ever borrows them.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, PartialEq, Clone, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: &str) -> Self {
        Symbol(s.to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Atom {
    Symbol(Symbol),
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Nil,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expression {
    Atom(Atom),
    List(Vec<Expression>),
}

impl Expression {
    pub fn symbol(name: &str) -> Self {
        Expression::Atom(Atom::Symbol(Symbol::new(name)))
    }

    pub fn integer(n: i64) -> Self {
        Expression::Atom(Atom::Integer(n))
    }

    pub fn string(s: &str) -> Self {
        Expression::Atom(Atom::String(s.to_string()))
    }

    pub fn list(items: Vec<Expression>) -> Self {
        Expression::List(items)
    }

    /// The symbol name if this expression is a bare symbol atom.
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expression::Atom(Atom::Symbol(s)) => Some(s.name()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expression]> {
        match self {
            Expression::List(items) => Some(items),
            _ => None,
        }
    }

    /// Head symbol of a non-empty list, e.g. `if` for `(if c a b)`.
    pub fn head_symbol(&self) -> Option<&str> {
        self.as_list()
            .and_then(|items| items.first())
            .and_then(Expression::as_symbol)
    }
}

/// Renders floats the way scripts expect to read them back: integral values
/// keep a trailing `.0`.
pub fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

pub(crate) fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Symbol(s) => write!(f, "{}", s),
            Atom::Integer(i) => write!(f, "{}", i),
            Atom::Float(fl) => write!(f, "{}", format_float(*fl)),
            Atom::String(s) => write!(f, "{}", escape_string(s)),
            Atom::Boolean(b) => write!(f, "{}", b),
            Atom::Nil => write!(f, "nil"),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Atom(atom) => write!(f, "{}", atom),
            Expression::List(items) => {
                // (quote x) prints back in its reader shorthand
                if let [head, quoted] = items.as_slice() {
                    if head.as_symbol() == Some("quote") {
                        return write!(f, "'{}", quoted);
                    }
                }
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(" "))
            }
        }
    }
}
