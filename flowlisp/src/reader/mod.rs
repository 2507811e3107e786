//! Reader: turns Flowlisp source text into expression trees.

use crate::ast::{Atom, Expression, Symbol};
use pest::iterators::Pair;
use pest::Parser;
use thiserror::Error;

#[derive(pest_derive::Parser)]
#[grammar = "reader/flowlisp.pest"] // Path relative to src/
pub struct FlowlispParser;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("invalid number literal `{text}`: {message}")]
    InvalidNumber { text: String, message: String },

    #[error("invalid escape sequence `\\{0}` in string literal")]
    InvalidEscape(char),

    #[error("unexpected grammar rule {0}")]
    UnexpectedRule(String),
}

impl From<pest::error::Error<Rule>> for ReadError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ReadError::Syntax(err.to_string())
    }
}

/// Parse a whole program: zero or more top-level expressions.
pub fn read(source: &str) -> Result<Vec<Expression>, ReadError> {
    let mut pairs = FlowlispParser::parse(Rule::program, source)?;
    let program = match pairs.next() {
        Some(p) => p,
        None => return Ok(Vec::new()),
    };
    program
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_expression)
        .collect()
}

/// Parse exactly one expression.
pub fn read_one(source: &str) -> Result<Expression, ReadError> {
    let mut pairs = FlowlispParser::parse(Rule::single, source)?;
    let single = pairs
        .next()
        .ok_or_else(|| ReadError::Syntax("no expression found".to_string()))?;
    let expr_pair = single
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or_else(|| ReadError::Syntax("no expression found".to_string()))?;
    build_expression(expr_pair)
}

fn build_expression(pair: Pair<Rule>) -> Result<Expression, ReadError> {
    match pair.as_rule() {
        Rule::list => Ok(Expression::List(
            pair.into_inner()
                .map(build_expression)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        Rule::quoted => {
            let inner = pair
                .into_inner()
                .next()
                .ok_or_else(|| ReadError::Syntax("quote without expression".to_string()))?;
            Ok(Expression::List(vec![
                Expression::symbol("quote"),
                build_expression(inner)?,
            ]))
        }
        Rule::integer => {
            let text = pair.as_str();
            text.parse::<i64>()
                .map(|n| Expression::Atom(Atom::Integer(n)))
                .map_err(|e| ReadError::InvalidNumber {
                    text: text.to_string(),
                    message: e.to_string(),
                })
        }
        Rule::float => {
            let text = pair.as_str();
            text.parse::<f64>()
                .map(|f| Expression::Atom(Atom::Float(f)))
                .map_err(|e| ReadError::InvalidNumber {
                    text: text.to_string(),
                    message: e.to_string(),
                })
        }
        Rule::boolean => Ok(Expression::Atom(Atom::Boolean(pair.as_str() == "true"))),
        Rule::nil => Ok(Expression::Atom(Atom::Nil)),
        Rule::symbol => Ok(Expression::Atom(Atom::Symbol(Symbol::new(pair.as_str())))),
        Rule::string => {
            let raw = pair
                .into_inner()
                .next()
                .map(|p| p.as_str())
                .unwrap_or("");
            Ok(Expression::Atom(Atom::String(unescape(raw)?)))
        }
        other => Err(ReadError::UnexpectedRule(format!("{:?}", other))),
    }
}

fn unescape(raw: &str) -> Result<String, ReadError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(ReadError::InvalidEscape(other)),
            // The grammar never ends a string on a lone backslash.
            None => out.push('\\'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_read_atoms() {
        assert_eq!(read_one("42").unwrap(), Expression::integer(42));
        assert_eq!(read_one("-5").unwrap(), Expression::integer(-5));
        assert_eq!(read_one("1.5").unwrap(), Expression::Atom(Atom::Float(1.5)));
        assert_eq!(read_one("true").unwrap(), Expression::Atom(Atom::Boolean(true)));
        assert_eq!(read_one("nil").unwrap(), Expression::Atom(Atom::Nil));
        assert_eq!(read_one("nil?").unwrap(), Expression::symbol("nil?"));
        assert_eq!(read_one("-").unwrap(), Expression::symbol("-"));
        assert_eq!(read_one("string=?").unwrap(), Expression::symbol("string=?"));
    }

    #[test]
    fn test_read_string_escapes() {
        assert_eq!(
            read_one(r#""line\n\"quoted\"""#).unwrap(),
            Expression::string("line\n\"quoted\"")
        );
        assert!(matches!(
            read_one(r#""bad\q""#),
            Err(ReadError::InvalidEscape('q'))
        ));
    }

    #[test]
    fn test_read_quote_and_lists() {
        let expr = read_one("(eq? 'a '())").unwrap();
        assert_eq!(
            expr,
            Expression::list(vec![
                Expression::symbol("eq?"),
                Expression::list(vec![Expression::symbol("quote"), Expression::symbol("a")]),
                Expression::list(vec![Expression::symbol("quote"), Expression::list(vec![])]),
            ])
        );
    }

    #[test]
    fn test_read_program_with_comments() {
        let program = read("; setup\n(bind x 1) ; trailing\n(+ x 2)\n").unwrap();
        assert_eq!(program.len(), 2);
        assert_eq!(program[1].to_string(), "(+ x 2)");
    }

    #[test]
    fn test_read_errors() {
        assert!(matches!(read_one("(+ 1 2"), Err(ReadError::Syntax(_))));
        assert!(read_one("1 2").is_err());
        assert!(matches!(
            read_one("99999999999999999999"),
            Err(ReadError::InvalidNumber { .. })
        ));
    }
}
