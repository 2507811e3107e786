// Runtime value system for Flowlisp
// Represents values during execution (different from AST which represents parsed code)

use crate::ast::{escape_string, format_float, Atom, Expression, Symbol};
use crate::runtime::environment::Environment;
use crate::runtime::error::EvalError;
use crate::runtime::task_bridge::TaskResult;
use crate::runtime::task_registry::AtomicTaskDefinition;
use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Symbol(Symbol),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
    Closure(Rc<Closure>),
    AtomicTask(Rc<AtomicTaskDefinition>),
    TaskResult(Rc<TaskResult>),
    Error(Rc<EvalError>),
}

/// A lambda together with the frame it was created in.
pub struct Closure {
    pub params: Vec<Symbol>,
    pub body: Vec<Expression>,
    pub env: Environment,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The captured frame can reach this closure again; print only its shape.
        f.debug_struct("Closure")
            .field("params", &self.params)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl Value {
    pub fn from_atom(atom: &Atom) -> Value {
        match atom {
            Atom::Symbol(s) => Value::Symbol(s.clone()),
            Atom::Integer(i) => Value::Integer(*i),
            Atom::Float(f) => Value::Float(*f),
            Atom::String(s) => Value::String(s.clone()),
            Atom::Boolean(b) => Value::Boolean(*b),
            Atom::Nil => Value::Nil,
        }
    }

    /// Data reading of an expression, as produced by `quote`.
    pub fn from_quoted(expr: &Expression) -> Value {
        match expr {
            Expression::Atom(atom) => Value::from_atom(atom),
            Expression::List(items) => Value::List(items.iter().map(Value::from_quoted).collect()),
        }
    }

    /// Only nil, the empty sequence and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Boolean(b) => *b,
            Value::List(items) => !items.is_empty(),
            _ => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Closure(_) => "closure",
            Value::AtomicTask(_) => "atomic-task",
            Value::TaskResult(_) => "task-result",
            Value::Error(_) => "error",
        }
    }

    /// Text used by `string-append`: strings verbatim, numbers in textual
    /// form, symbols by name and nil as `None`. Other values have none.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            Value::Symbol(s) => Some(s.0.clone()),
            Value::Nil => Some("None".to_string()),
            _ => None,
        }
    }

    /// Text used by `log-message`: like [`Value::as_text`] but total.
    pub fn to_log_text(&self) -> String {
        self.as_text().unwrap_or_else(|| self.to_string())
    }

    /// Value equality as used by `eq?`. Symbols compare by name text, numbers
    /// compare numerically across integer and float, closures by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Symbol(a), Value::Symbol(b)) => a.0 == b.0,
            (Value::Symbol(a), Value::String(b)) | (Value::String(b), Value::Symbol(a)) => {
                a.0 == *b
            }
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Integer(_), Value::Float(_)) | (Value::Float(_), Value::Integer(_)) => {
                self.as_f64() == other.as_f64()
            }
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.equals(w)).unwrap_or(false))
            }
            _ => self == other,
        }
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// JSON rendering for hosts. Callables render as their printed form.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::Nil => serde_json::Value::Null,
            Value::Boolean(b) => json!(b),
            Value::Integer(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::String(s) => json!(s),
            Value::Symbol(s) => json!(s.0),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::TaskResult(result) => json!({
                "status": result.status.as_str(),
                "content": result.content,
                "parsed_content": result.parsed_content.as_ref().map(Value::to_json),
                "notes": Value::Map(result.notes.clone()).to_json(),
            }),
            Value::Error(err) => json!({
                "kind": err.kind.as_str(),
                "message": err.message,
                "expression": err.expression,
                "details": err.details,
            }),
            Value::Closure(_) | Value::AtomicTask(_) => json!(self.to_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::AtomicTask(a), Value::AtomicTask(b)) => a == b,
            (Value::TaskResult(a), Value::TaskResult(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", format_float(*fl)),
            Value::String(s) => write!(f, "{}", escape_string(s)),
            Value::Symbol(s) => write!(f, "{}", s.0),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "({})", parts.join(" "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Closure(c) => {
                let params: Vec<&str> = c.params.iter().map(|p| p.name()).collect();
                write!(f, "#<closure ({})>", params.join(" "))
            }
            Value::AtomicTask(task) => write!(f, "#<atomic-task {}>", task.name),
            Value::TaskResult(result) => {
                write!(f, "#<task-result {} {}>", result.status.as_str(), escape_string(&result.content))
            }
            Value::Error(err) => write!(f, "#<error {}: {}>", err.kind, err.message),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness_is_explicit() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::Float(0.0).is_truthy());
        assert!(Value::String(String::new()).is_truthy());
        assert!(Value::Map(IndexMap::new()).is_truthy());
    }

    #[test]
    fn test_equals_compares_symbols_by_name() {
        assert!(Value::Symbol(Symbol::new("a")).equals(&Value::Symbol(Symbol::new("a"))));
        assert!(Value::Symbol(Symbol::new("a")).equals(&Value::from("a")));
        assert!(!Value::Symbol(Symbol::new("a")).equals(&Value::Symbol(Symbol::new("b"))));
        assert!(Value::Integer(1).equals(&Value::Float(1.0)));
        assert!(!Value::Integer(1).equals(&Value::from("1")));
    }

    #[test]
    fn test_text_forms() {
        assert_eq!(Value::Nil.as_text().as_deref(), Some("None"));
        assert_eq!(Value::Float(2.0).as_text().as_deref(), Some("2.0"));
        assert_eq!(Value::Boolean(true).as_text(), None);
        assert_eq!(Value::Boolean(true).to_log_text(), "true");
        assert_eq!(Value::List(vec![Value::Integer(1), Value::from("x")]).to_log_text(), r#"(1 "x")"#);
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"files": ["a.rs", "b.rs"], "count": 2, "ratio": 0.5, "ok": null});
        let value = Value::from_json(json.clone());
        match &value {
            Value::Map(map) => {
                assert_eq!(map.get("count"), Some(&Value::Integer(2)));
                assert_eq!(map.get("ok"), Some(&Value::Nil));
            }
            other => panic!("expected map, got {:?}", other),
        }
        assert_eq!(value.to_json(), json);
    }
}
