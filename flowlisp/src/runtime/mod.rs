//! Flowlisp runtime
//!
//! The evaluator and everything it touches: scope chain, value model,
//! primitives, the task bridge boundary and cancellation.

pub mod cancel;
pub mod context;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod fields;
pub mod iterative_loop;
pub mod log_sink;
pub mod pure_bridge;
pub mod special_forms;
pub mod stdlib;
pub mod task_bridge;
pub mod task_registry;
pub mod values;

pub use cancel::CancellationToken;
pub use environment::{Environment, UnboundSymbol};
pub use error::{ErrorKind, EvalError, EvalResult};
pub use evaluator::{Evaluator, EvaluatorConfig};
pub use fields::FieldAccess;
pub use iterative_loop::{IterativeLoop, LoopDecision, LoopOutcome, LoopPhases, LoopState};
pub use log_sink::{LogSink, MemorySink, TracingSink};
pub use pure_bridge::{create_pure_bridge, PureBridge};
pub use task_bridge::{
    BridgeError, ContextMatch, ContextRequest, ContextResponse, MatchingStrategy, TaskBridge,
    TaskRequest, TaskResult, TaskStatus,
};
pub use task_registry::{AtomicTaskDefinition, AtomicTaskRegistry, OutputFormat};
pub use values::{Closure, Value};
