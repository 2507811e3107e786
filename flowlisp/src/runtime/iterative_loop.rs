//! Bounded executor -> validator -> controller cycle.
//!
//! ```text
//! (iterative-loop
//!   (max-iterations 3)
//!   (initial-input plan)
//!   (test-command "cargo test")
//!   (executor   (lambda (input iteration) ...))
//!   (validator  (lambda (validator-input iteration) ...))
//!   (controller (lambda (outcome validation input iteration) ...)))
//! ```
//!
//! A `stop` decision ends the loop with its payload. Reaching the iteration
//! ceiling ends it with the last decision's payload, even a `continue` one.

use crate::ast::Expression;
use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::evaluator::{Call, EvalContext, Evaluator};
use crate::runtime::values::Value;
use async_trait::async_trait;
use std::num::NonZeroUsize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum LoopDecision {
    Continue(Value),
    Stop(Value),
}

impl LoopDecision {
    /// Reads `(continue next-input)` or `(stop payload)`; the head may be a
    /// symbol or a string.
    pub fn from_value(value: &Value, site: &Expression) -> EvalResult<LoopDecision> {
        let malformed = || {
            EvalError::structured_output(
                format!(
                    "controller must return (continue next-input) or (stop payload), got {}",
                    value
                ),
                site,
            )
        };
        let Value::List(items) = value else {
            return Err(malformed());
        };
        let [head, payload] = items.as_slice() else {
            return Err(malformed());
        };
        let tag = match head {
            Value::Symbol(s) => s.name(),
            Value::String(s) => s.as_str(),
            _ => return Err(malformed()),
        };
        match tag {
            "continue" => Ok(LoopDecision::Continue(payload.clone())),
            "stop" => Ok(LoopDecision::Stop(payload.clone())),
            _ => Err(malformed()),
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            LoopDecision::Continue(v) | LoopDecision::Stop(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped,
}

/// Loop-local bookkeeping, dropped when the loop returns.
#[derive(Debug, Clone)]
pub struct IterationState {
    pub state: LoopState,
    pub input: Value,
    pub iteration: usize,
    pub max_iterations: usize,
    pub last_outcome: Option<Value>,
    pub last_validation: Option<Value>,
    pub last_decision: Option<LoopDecision>,
}

impl IterationState {
    fn new(initial: Value, max_iterations: usize) -> Self {
        IterationState {
            state: LoopState::Running,
            input: initial,
            iteration: 0,
            max_iterations,
            last_outcome: None,
            last_validation: None,
            last_decision: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub payload: Value,
    pub iterations: usize,
    pub stopped_explicitly: bool,
    /// Executor and validator results of the final iteration.
    pub last_outcome: Value,
    pub last_validation: Value,
}

/// The three steps of one iteration. Iteration indices start at 1.
#[async_trait(?Send)]
pub trait LoopPhases {
    async fn execute(&self, input: &Value, iteration: usize) -> EvalResult<Value>;

    async fn validate(&self, outcome: &Value, iteration: usize) -> EvalResult<Value>;

    async fn control(
        &self,
        outcome: &Value,
        validation: &Value,
        input: &Value,
        iteration: usize,
    ) -> EvalResult<LoopDecision>;
}

#[derive(Debug, Clone, Copy)]
pub struct IterativeLoop {
    max_iterations: NonZeroUsize,
}

impl IterativeLoop {
    pub fn new(max_iterations: NonZeroUsize) -> Self {
        IterativeLoop { max_iterations }
    }

    pub async fn run(&self, phases: &dyn LoopPhases, initial: Value) -> EvalResult<LoopOutcome> {
        let mut state = IterationState::new(initial, self.max_iterations.get());

        while state.state == LoopState::Running {
            state.iteration += 1;
            let iteration = state.iteration;
            debug!(iteration, max = state.max_iterations, "iterative-loop: executing");

            let outcome = phases.execute(&state.input, iteration).await?;
            let validation = phases.validate(&outcome, iteration).await?;
            let decision = phases
                .control(&outcome, &validation, &state.input, iteration)
                .await?;
            state.last_outcome = Some(outcome);
            state.last_validation = Some(validation);

            match &decision {
                LoopDecision::Stop(_) => {
                    debug!(iteration, "iterative-loop: controller stopped");
                    state.state = LoopState::Stopped;
                }
                LoopDecision::Continue(next) if iteration < state.max_iterations => {
                    state.input = next.clone();
                }
                LoopDecision::Continue(_) => {
                    debug!(iteration, "iterative-loop: iteration ceiling reached");
                    state.state = LoopState::Stopped;
                }
            }
            state.last_decision = Some(decision);
        }

        let stopped_explicitly = matches!(state.last_decision, Some(LoopDecision::Stop(_)));
        let payload = state
            .last_decision
            .map(LoopDecision::into_payload)
            .unwrap_or(Value::Nil);
        Ok(LoopOutcome {
            payload,
            iterations: state.iteration,
            stopped_explicitly,
            last_outcome: state.last_outcome.unwrap_or(Value::Nil),
            last_validation: state.last_validation.unwrap_or(Value::Nil),
        })
    }
}

/// Phases backed by script callables (closures or atomic tasks).
struct ClosurePhases<'a> {
    evaluator: &'a Evaluator,
    ctx: &'a EvalContext,
    site: &'a Expression,
    executor: Value,
    validator: Value,
    controller: Value,
    /// Replaces the executor outcome as validator input when present.
    test_input: Option<Value>,
}

fn iteration_value(iteration: usize) -> Value {
    Value::Integer(i64::try_from(iteration).unwrap_or(i64::MAX))
}

#[async_trait(?Send)]
impl LoopPhases for ClosurePhases<'_> {
    async fn execute(&self, input: &Value, iteration: usize) -> EvalResult<Value> {
        let args = vec![input.clone(), iteration_value(iteration)];
        self.evaluator
            .apply_value(&self.executor, args, self.site, self.ctx)
            .await
    }

    async fn validate(&self, outcome: &Value, iteration: usize) -> EvalResult<Value> {
        let input = self.test_input.as_ref().unwrap_or(outcome).clone();
        let args = vec![input, iteration_value(iteration)];
        self.evaluator
            .apply_value(&self.validator, args, self.site, self.ctx)
            .await
    }

    async fn control(
        &self,
        outcome: &Value,
        validation: &Value,
        input: &Value,
        iteration: usize,
    ) -> EvalResult<LoopDecision> {
        let args = vec![
            outcome.clone(),
            validation.clone(),
            input.clone(),
            iteration_value(iteration),
        ];
        let decision = self
            .evaluator
            .apply_value(&self.controller, args, self.site, self.ctx)
            .await?;
        LoopDecision::from_value(&decision, self.site)
    }
}

const LOOP_CLAUSES: [&str; 6] = [
    "max-iterations",
    "initial-input",
    "test-command",
    "executor",
    "validator",
    "controller",
];

impl Evaluator {
    /// Clauses are evaluated once, in source order, before the first iteration.
    pub(crate) async fn eval_iterative_loop(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let mut slots: [Option<(Value, &Expression)>; 6] = Default::default();

        for clause in call.operands {
            let (key, value_expr) = match clause.as_list() {
                Some([head, value]) => match head.as_symbol() {
                    Some(key) => (key, value),
                    None => return Err(malformed_clause(clause)),
                },
                _ => return Err(malformed_clause(clause)),
            };
            let Some(slot) = LOOP_CLAUSES.iter().position(|k| *k == key) else {
                return Err(EvalError::invalid_form(
                    format!("unknown iterative-loop clause '{}'", key),
                    clause,
                ));
            };
            if slots[slot].is_some() {
                return Err(EvalError::invalid_form(
                    format!("duplicate iterative-loop clause '{}'", key),
                    clause,
                ));
            }
            let value = self.eval_expr(value_expr, env, ctx).await?;
            slots[slot] = Some((value, value_expr));
        }

        let [max_iterations, initial_input, test_command, executor, validator, controller] = slots;
        let (max_value, max_expr) = require(max_iterations, "max-iterations", call.expr)?;
        let max_iterations = self.loop_ceiling(&max_value, max_expr)?;
        let (initial, _) = require(initial_input, "initial-input", call.expr)?;
        let executor = callable(require(executor, "executor", call.expr)?, "executor")?;
        let validator = callable(require(validator, "validator", call.expr)?, "validator")?;
        let controller = callable(require(controller, "controller", call.expr)?, "controller")?;

        let phases = ClosurePhases {
            evaluator: self,
            ctx,
            site: call.expr,
            executor,
            validator,
            controller,
            test_input: test_command.map(|(value, _)| value),
        };
        let outcome = IterativeLoop::new(max_iterations)
            .run(&phases, initial)
            .await?;
        debug!(
            iterations = outcome.iterations,
            stopped_explicitly = outcome.stopped_explicitly,
            last_validation = %outcome.last_validation,
            "iterative-loop finished"
        );
        Ok(outcome.payload)
    }

    fn loop_ceiling(&self, value: &Value, expr: &Expression) -> EvalResult<NonZeroUsize> {
        let ceiling = self.config.max_loop_iterations;
        let Value::Integer(n) = value else {
            return Err(EvalError::type_error(
                "max-iterations",
                1,
                "an integer",
                value.type_name(),
                expr,
            ));
        };
        usize::try_from(*n)
            .ok()
            .filter(|n| *n <= ceiling)
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| {
                EvalError::invalid_argument(
                    format!("max-iterations must be between 1 and {}, got {}", ceiling, n),
                    expr,
                )
            })
    }
}

fn malformed_clause(clause: &Expression) -> EvalError {
    EvalError::invalid_form(
        format!(
            "iterative-loop clauses must be (key expr) with key one of {}",
            LOOP_CLAUSES.join(", ")
        ),
        clause,
    )
}

fn require<'e>(
    slot: Option<(Value, &'e Expression)>,
    key: &str,
    site: &Expression,
) -> EvalResult<(Value, &'e Expression)> {
    slot.ok_or_else(|| {
        EvalError::invalid_form(format!("iterative-loop requires a ({} ...) clause", key), site)
    })
}

fn callable((value, expr): (Value, &Expression), key: &str) -> EvalResult<Value> {
    match value {
        Value::Closure(_) | Value::AtomicTask(_) => Ok(value),
        other => Err(EvalError::type_error(
            key,
            1,
            "a closure or atomic task",
            other.type_name(),
            expr,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Records every phase call; the controller answers from a script.
    struct ScriptedPhases {
        decide: fn(usize, &Value) -> LoopDecision,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedPhases {
        fn new(decide: fn(usize, &Value) -> LoopDecision) -> Self {
            ScriptedPhases {
                decide,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    #[async_trait(?Send)]
    impl LoopPhases for ScriptedPhases {
        async fn execute(&self, input: &Value, iteration: usize) -> EvalResult<Value> {
            self.calls.borrow_mut().push(format!("execute {} {}", iteration, input));
            Ok(Value::String(format!("outcome-{}", iteration)))
        }

        async fn validate(&self, outcome: &Value, iteration: usize) -> EvalResult<Value> {
            self.calls.borrow_mut().push(format!("validate {} {}", iteration, outcome));
            Ok(Value::Boolean(true))
        }

        async fn control(
            &self,
            _outcome: &Value,
            _validation: &Value,
            input: &Value,
            iteration: usize,
        ) -> EvalResult<LoopDecision> {
            self.calls.borrow_mut().push(format!("control {}", iteration));
            Ok((self.decide)(iteration, input))
        }
    }

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[tokio::test]
    async fn test_stop_on_first_iteration_returns_payload() {
        let phases = ScriptedPhases::new(|_, _| LoopDecision::Stop(Value::from("payload-A")));
        let outcome = IterativeLoop::new(limit(3))
            .run(&phases, Value::from("start"))
            .await
            .unwrap();

        assert_eq!(outcome.payload, Value::from("payload-A"));
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.stopped_explicitly);
        assert_eq!(outcome.last_outcome, Value::from("outcome-1"));
        assert_eq!(outcome.last_validation, Value::Boolean(true));
        assert_eq!(
            *phases.calls.borrow(),
            vec![
                "execute 1 \"start\"".to_string(),
                "validate 1 \"outcome-1\"".to_string(),
                "control 1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_ceiling_returns_last_continue_payload() {
        let phases = ScriptedPhases::new(|iteration, _| {
            LoopDecision::Continue(Value::String(format!("next-{}", iteration)))
        });
        let outcome = IterativeLoop::new(limit(2))
            .run(&phases, Value::from("start"))
            .await
            .unwrap();

        assert_eq!(outcome.payload, Value::from("next-2"));
        assert_eq!(outcome.iterations, 2);
        assert!(!outcome.stopped_explicitly);
        assert_eq!(outcome.last_outcome, Value::from("outcome-2"));
        let calls = phases.calls.borrow();
        assert_eq!(calls.len(), 6);
        assert_eq!(calls[3], "execute 2 \"next-1\"");
    }

    #[test]
    fn test_decision_shapes() {
        let site = Expression::symbol("controller");
        let stop = Value::List(vec![Value::from("stop"), Value::Integer(7)]);
        assert_eq!(
            LoopDecision::from_value(&stop, &site).unwrap(),
            LoopDecision::Stop(Value::Integer(7))
        );

        let bad = Value::List(vec![Value::from("retry"), Value::Nil]);
        let err = LoopDecision::from_value(&bad, &site).unwrap_err();
        assert_eq!(err.kind, crate::runtime::error::ErrorKind::StructuredOutput);
        assert!(LoopDecision::from_value(&Value::Nil, &site).is_err());
    }
}
