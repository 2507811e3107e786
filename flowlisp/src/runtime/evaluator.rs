// Flowlisp Evaluator - walks expression trees, suspending on external calls

use crate::ast::{Atom, Expression};
use crate::runtime::cancel::CancellationToken;
use crate::runtime::environment::Environment;
use crate::runtime::error::{ErrorKind, EvalError, EvalResult};
use crate::runtime::log_sink::{LogSink, TracingSink};
use crate::runtime::task_bridge::{BridgeError, TaskBridge, TaskRequest, TaskStatus};
use crate::runtime::task_registry::{AtomicTaskDefinition, AtomicTaskRegistry, OutputFormat};
use crate::runtime::values::{Closure, Value};
use async_recursion::async_recursion;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use tracing::{debug, warn};

/// Stack left before a nested poll moves onto a fresh segment.
const RED_ZONE: usize = 256 * 1024;
/// Size of each segment allocated when the red zone is reached.
const STACK_PER_SEGMENT: usize = 2 * 1024 * 1024;

type EvalFuture<'a> = Pin<Box<dyn Future<Output = EvalResult<Value>> + 'a>>;

/// Polls a nested evaluation on a grown stack when the current one runs low.
pub(crate) struct GrowStack<F>(F);

impl<F: Future + Unpin> Future for GrowStack<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        let inner = &mut self.0;
        stacker::maybe_grow(RED_ZONE, STACK_PER_SEGMENT, || Pin::new(inner).poll(cx))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Maximum nesting of expression evaluation before failing
    pub max_recursion_depth: usize,
    /// Upper bound accepted for an `iterative-loop`'s `max-iterations`
    pub max_loop_iterations: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        EvaluatorConfig {
            max_recursion_depth: 256,
            max_loop_iterations: 100,
        }
    }
}

/// Head symbols the evaluator handles itself instead of applying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Form {
    Quote,
    If,
    Let,
    Bind,
    Lambda,
    Progn,
    And,
    Or,
    Loop,
    Try,
    Defatom,
    Set,
    IterativeLoop,
    List,
    GetContext,
    GetField,
    Add,
    Subtract,
    Multiply,
    LessThan,
    GreaterThan,
    NumEqual,
    Eq,
    Null,
    Not,
    StringAppend,
    StringEq,
    LogMessage,
}

impl Form {
    pub(crate) fn from_name(name: &str) -> Option<Form> {
        let form = match name {
            "quote" => Form::Quote,
            "if" => Form::If,
            "let" => Form::Let,
            "bind" => Form::Bind,
            "lambda" => Form::Lambda,
            "progn" => Form::Progn,
            "and" => Form::And,
            "or" => Form::Or,
            "loop" => Form::Loop,
            "try" => Form::Try,
            "defatom" => Form::Defatom,
            "set!" => Form::Set,
            "iterative-loop" => Form::IterativeLoop,
            "list" => Form::List,
            "get-context" => Form::GetContext,
            "get-field" => Form::GetField,
            "+" => Form::Add,
            "-" => Form::Subtract,
            "*" => Form::Multiply,
            "<" => Form::LessThan,
            ">" => Form::GreaterThan,
            "=" => Form::NumEqual,
            "eq?" => Form::Eq,
            "null?" => Form::Null,
            "not" => Form::Not,
            "string-append" => Form::StringAppend,
            "string=?" => Form::StringEq,
            "log-message" => Form::LogMessage,
            _ => return None,
        };
        Some(form)
    }
}

/// A special-form or primitive call site: the whole list plus its operands.
pub(crate) struct Call<'a> {
    pub expr: &'a Expression,
    pub name: &'a str,
    pub operands: &'a [Expression],
}

impl<'a> Call<'a> {
    pub fn expect_arity(&self, expected: usize) -> EvalResult<()> {
        if self.operands.len() != expected {
            return Err(EvalError::arity(self.name, expected, self.operands.len(), self.expr));
        }
        Ok(())
    }

    pub fn expect_min_arity(&self, min: usize) -> EvalResult<()> {
        if self.operands.len() < min {
            return Err(EvalError::arity(
                self.name,
                format!("at least {}", min),
                self.operands.len(),
                self.expr,
            ));
        }
        Ok(())
    }

    /// Type error for the operand at `index` (0-based), anchored to that operand.
    pub fn type_error(&self, index: usize, expected: &str, actual: &Value) -> EvalError {
        EvalError::type_error(
            self.name,
            index + 1,
            expected,
            actual.type_name(),
            &self.operands[index],
        )
    }
}

/// Per-evaluation state threaded through every nested call.
pub(crate) struct EvalContext {
    cancel: Option<CancellationToken>,
    depth: Cell<usize>,
    max_depth: usize,
}

pub(crate) struct DepthGuard<'a>(&'a Cell<usize>);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get().saturating_sub(1));
    }
}

impl EvalContext {
    pub(crate) fn new(cancel: Option<CancellationToken>, max_depth: usize) -> Self {
        EvalContext {
            cancel,
            depth: Cell::new(0),
            max_depth,
        }
    }

    fn check_cancelled(&self, expr: &Expression) -> EvalResult<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(EvalError::cancelled(expr)),
            _ => Ok(()),
        }
    }

    fn enter(&self, expr: &Expression) -> EvalResult<DepthGuard<'_>> {
        let depth = self.depth.get() + 1;
        if depth > self.max_depth {
            return Err(EvalError::new(
                ErrorKind::RecursionLimit,
                format!("maximum evaluation depth {} exceeded", self.max_depth),
                expr,
            ));
        }
        self.depth.set(depth);
        Ok(DepthGuard(&self.depth))
    }

    /// The single suspension point for external calls: races the call
    /// against cancellation and wraps transport failures.
    pub(crate) async fn await_external<T, F>(
        &self,
        operation: &str,
        expr: &Expression,
        call: F,
    ) -> EvalResult<T>
    where
        F: Future<Output = Result<T, BridgeError>>,
    {
        let outcome = match &self.cancel {
            Some(token) => {
                tokio::select! {
                    result = call => result,
                    _ = token.cancelled() => {
                        debug!(operation, "external call abandoned on cancellation");
                        return Err(EvalError::cancelled(expr));
                    }
                }
            }
            None => call.await,
        };
        outcome.map_err(|e| EvalError::from_bridge(e, operation, expr))
    }
}

#[derive(Debug, Clone)]
pub struct Evaluator {
    pub(crate) registry: Rc<AtomicTaskRegistry>,
    pub(crate) bridge: Rc<dyn TaskBridge>,
    pub(crate) log_sink: Rc<dyn LogSink>,
    pub(crate) config: EvaluatorConfig,
}

impl Evaluator {
    /// Create an evaluator with a fresh task registry and the tracing log sink.
    pub fn new(bridge: Rc<dyn TaskBridge>) -> Self {
        Evaluator {
            registry: Rc::new(AtomicTaskRegistry::new()),
            bridge,
            log_sink: Rc::new(TracingSink),
            config: EvaluatorConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: Rc<AtomicTaskRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_log_sink(mut self, log_sink: Rc<dyn LogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }

    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &Rc<AtomicTaskRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Evaluate one expression tree. A fired `cancel` token aborts any
    /// in-flight external call and surfaces as a `cancelled` error.
    pub async fn evaluate(
        &self,
        expr: &Expression,
        env: &Environment,
        cancel: Option<&CancellationToken>,
    ) -> EvalResult<Value> {
        let ctx = EvalContext::new(cancel.cloned(), self.config.max_recursion_depth);
        self.eval_expr(expr, env, &ctx).await
    }

    /// Evaluate top-level expressions in order, returning the last value.
    pub async fn evaluate_program(
        &self,
        program: &[Expression],
        env: &Environment,
        cancel: Option<&CancellationToken>,
    ) -> EvalResult<Value> {
        let ctx = EvalContext::new(cancel.cloned(), self.config.max_recursion_depth);
        self.eval_body(program, env, &ctx).await
    }

    pub(crate) fn eval_expr<'a>(
        &'a self,
        expr: &'a Expression,
        env: &'a Environment,
        ctx: &'a EvalContext,
    ) -> GrowStack<EvalFuture<'a>> {
        GrowStack(self.eval_node(expr, env, ctx))
    }

    #[async_recursion(?Send)]
    async fn eval_node(
        &self,
        expr: &Expression,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        ctx.check_cancelled(expr)?;
        let _guard = ctx.enter(expr)?;
        match expr {
            Expression::Atom(Atom::Symbol(sym)) => env
                .lookup(sym.name())
                .map_err(|e| EvalError::unbound(&e.0, expr)),
            Expression::Atom(atom) => Ok(Value::from_atom(atom)),
            Expression::List(items) => self.eval_list(expr, items, env, ctx).await,
        }
    }

    async fn eval_list(
        &self,
        expr: &Expression,
        items: &[Expression],
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let Some((head, operands)) = items.split_first() else {
            return Ok(Value::List(Vec::new()));
        };

        if let Some(name) = head.as_symbol() {
            if let Some(form) = Form::from_name(name) {
                let call = Call {
                    expr,
                    name,
                    operands,
                };
                return self.eval_form(form, &call, env, ctx).await;
            }
        }

        let callee = self.resolve_callee(head, env, ctx).await?;
        self.eval_application(expr, head, &callee, operands, env, ctx)
            .await
    }

    async fn eval_form(
        &self,
        form: Form,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        match form {
            Form::Quote => self.eval_quote(call),
            Form::If => self.eval_if(call, env, ctx).await,
            Form::Let => self.eval_let(call, env, ctx).await,
            Form::Bind => self.eval_bind(call, env, ctx).await,
            Form::Lambda => self.eval_lambda(call, env),
            Form::Progn => self.eval_body(call.operands, env, ctx).await,
            Form::And => self.eval_and(call, env, ctx).await,
            Form::Or => self.eval_or(call, env, ctx).await,
            Form::Loop => self.eval_loop(call, env, ctx).await,
            Form::Try => self.eval_try(call, env, ctx).await,
            Form::Defatom => self.eval_defatom(call, env, ctx).await,
            Form::Set => self.eval_set(call, env, ctx).await,
            Form::IterativeLoop => self.eval_iterative_loop(call, env, ctx).await,
            Form::GetContext => self.eval_get_context(call, env, ctx).await,
            Form::GetField => self.eval_get_field(call, env, ctx).await,
            Form::List => self.prim_list(call, env, ctx).await,
            Form::Add => self.prim_add(call, env, ctx).await,
            Form::Subtract => self.prim_subtract(call, env, ctx).await,
            Form::Multiply => self.prim_multiply(call, env, ctx).await,
            Form::LessThan => self.prim_compare(call, env, ctx).await,
            Form::GreaterThan => self.prim_compare(call, env, ctx).await,
            Form::NumEqual => self.prim_compare(call, env, ctx).await,
            Form::Eq => self.prim_eq(call, env, ctx).await,
            Form::Null => self.prim_null(call, env, ctx).await,
            Form::Not => self.prim_not(call, env, ctx).await,
            Form::StringAppend => self.prim_string_append(call, env, ctx).await,
            Form::StringEq => self.prim_string_eq(call, env, ctx).await,
            Form::LogMessage => self.prim_log_message(call, env, ctx).await,
        }
    }

    /// Operands strictly left-to-right, each fully resolved before the next.
    pub(crate) async fn eval_operands(
        &self,
        operands: &[Expression],
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(operands.len());
        for operand in operands {
            values.push(self.eval_expr(operand, env, ctx).await?);
        }
        Ok(values)
    }

    /// Sequential evaluation returning the last value, nil when empty.
    pub(crate) async fn eval_body(
        &self,
        body: &[Expression],
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let mut last = Value::Nil;
        for expr in body {
            last = self.eval_expr(expr, env, ctx).await?;
        }
        Ok(last)
    }

    /// A head symbol bound in the environment wins over a registered task
    /// of the same name; other head expressions are evaluated.
    async fn resolve_callee(
        &self,
        head: &Expression,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        if let Some(name) = head.as_symbol() {
            if let Ok(value) = env.lookup(name) {
                return Ok(value);
            }
            return match self.registry.resolve(name) {
                Some(task) => Ok(Value::AtomicTask(task)),
                None => Err(EvalError::unbound(name, head)),
            };
        }
        self.eval_expr(head, env, ctx).await
    }

    async fn eval_application(
        &self,
        expr: &Expression,
        head: &Expression,
        callee: &Value,
        operands: &[Expression],
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let expected = match callee {
            Value::Closure(closure) => closure.params.len(),
            Value::AtomicTask(task) => task.params.len(),
            other => {
                return Err(EvalError::new(
                    ErrorKind::Type,
                    format!("{} is not callable", other.type_name()),
                    head,
                ))
            }
        };
        if operands.len() != expected {
            return Err(EvalError::arity(
                &head.to_string(),
                expected,
                operands.len(),
                expr,
            ));
        }
        let args = self.eval_operands(operands, env, ctx).await?;
        self.apply_value(callee, args, expr, ctx).await
    }

    pub(crate) async fn apply_value(
        &self,
        callee: &Value,
        args: Vec<Value>,
        site: &Expression,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        match callee {
            Value::Closure(closure) => self.apply_closure(closure, args, site, ctx).await,
            Value::AtomicTask(task) => self.invoke_atomic_task(task, args, site, ctx).await,
            other => Err(EvalError::new(
                ErrorKind::Type,
                format!("{} is not callable", other.type_name()),
                site,
            )),
        }
    }

    pub(crate) async fn apply_closure(
        &self,
        closure: &Closure,
        args: Vec<Value>,
        site: &Expression,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        if args.len() != closure.params.len() {
            return Err(EvalError::arity(
                "closure",
                closure.params.len(),
                args.len(),
                site,
            ));
        }
        let bindings = closure
            .params
            .iter()
            .map(|p| p.0.clone())
            .zip(args);
        let frame = closure.env.extend(bindings);
        self.eval_body(&closure.body, &frame, ctx).await
    }

    pub(crate) async fn invoke_atomic_task(
        &self,
        task: &AtomicTaskDefinition,
        args: Vec<Value>,
        site: &Expression,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        if args.len() != task.params.len() {
            return Err(EvalError::arity(&task.name, task.params.len(), args.len(), site));
        }
        let request = TaskRequest {
            name: task.name.clone(),
            inputs: task.params.iter().cloned().zip(args).collect(),
        };
        debug!(task = %task.name, "invoking atomic task");

        let operation = format!("atomic task '{}'", task.name);
        let mut result = ctx
            .await_external(&operation, site, self.bridge.invoke_task(request))
            .await?;

        if task.output_format == OutputFormat::Json
            && result.status == TaskStatus::Complete
            && result.parsed_content.is_none()
        {
            let parsed: serde_json::Value =
                serde_json::from_str(&result.content).map_err(|e| {
                    EvalError::structured_output(
                        format!("{} returned content that is not valid JSON", operation),
                        site,
                    )
                    .with_details(e.to_string())
                })?;
            result.parsed_content = Some(Value::from_json(parsed));
        }

        if result.status == TaskStatus::Failed {
            warn!(task = %task.name, "atomic task reported failure");
        }
        Ok(Value::TaskResult(Rc::new(result)))
    }
}
