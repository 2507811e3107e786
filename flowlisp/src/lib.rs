// Flowlisp: an expression language for scripting LLM-driven coding workflows
pub mod ast;
pub mod reader;
pub mod runtime;

pub use ast::{Atom, Expression, Symbol};
pub use reader::{read, read_one, ReadError};
pub use runtime::{
    CancellationToken, Environment, ErrorKind, EvalError, EvalResult, Evaluator, EvaluatorConfig,
    TaskBridge, Value,
};
