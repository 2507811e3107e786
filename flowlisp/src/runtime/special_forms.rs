//! Binding, conditional and definition forms.
//!
//! Each form decides for itself which operand positions are evaluated.

use crate::ast::{Expression, Symbol};
use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::evaluator::{Call, EvalContext, Evaluator};
use crate::runtime::task_registry::{AtomicTaskDefinition, OutputFormat};
use crate::runtime::values::{Closure, Value};
use std::rc::Rc;
use tracing::debug;

impl Evaluator {
    pub(crate) fn eval_quote(&self, call: &Call<'_>) -> EvalResult<Value> {
        call.expect_arity(1)?;
        Ok(Value::from_quoted(&call.operands[0]))
    }

    pub(crate) async fn eval_if(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        if !(2..=3).contains(&call.operands.len()) {
            return Err(EvalError::arity("if", "2 or 3", call.operands.len(), call.expr));
        }
        let condition = self.eval_expr(&call.operands[0], env, ctx).await?;
        if condition.is_truthy() {
            self.eval_expr(&call.operands[1], env, ctx).await
        } else if let Some(otherwise) = call.operands.get(2) {
            self.eval_expr(otherwise, env, ctx).await
        } else {
            Ok(Value::Nil)
        }
    }

    /// `(let ((name expr) ...) body...)`: bindings see the outer scope only.
    pub(crate) async fn eval_let(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_min_arity(1)?;
        let binding_list = call.operands[0].as_list().ok_or_else(|| {
            EvalError::invalid_form("let bindings must be a list of (name expr) pairs", &call.operands[0])
        })?;

        let mut bindings = Vec::with_capacity(binding_list.len());
        for binding in binding_list {
            let (name, value_expr) = binding_pair(binding, "let binding")?;
            let value = self.eval_expr(value_expr, env, ctx).await?;
            bindings.push((name.to_string(), value));
        }

        let scope = env.extend(bindings);
        self.eval_body(&call.operands[1..], &scope, ctx).await
    }

    /// `(bind name expr)` defines in the current frame and returns the value.
    pub(crate) async fn eval_bind(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let name = call.operands[0].as_symbol().ok_or_else(|| {
            EvalError::type_error("bind", 1, "a symbol", "expression", &call.operands[0])
        })?;
        let value = self.eval_expr(&call.operands[1], env, ctx).await?;
        env.define(name, value.clone());
        Ok(value)
    }

    pub(crate) fn eval_lambda(&self, call: &Call<'_>, env: &Environment) -> EvalResult<Value> {
        call.expect_min_arity(1)?;
        let param_list = call.operands[0].as_list().ok_or_else(|| {
            EvalError::invalid_form("lambda parameters must be a list of symbols", &call.operands[0])
        })?;
        let params = param_list
            .iter()
            .map(|p| {
                p.as_symbol()
                    .map(Symbol::new)
                    .ok_or_else(|| EvalError::invalid_form("lambda parameter must be a symbol", p))
            })
            .collect::<EvalResult<Vec<_>>>()?;

        Ok(Value::Closure(Rc::new(Closure {
            params,
            body: call.operands[1..].to_vec(),
            env: env.clone(),
        })))
    }

    pub(crate) async fn eval_and(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let mut last = Value::Boolean(true);
        for operand in call.operands {
            last = self.eval_expr(operand, env, ctx).await?;
            if !last.is_truthy() {
                return Ok(last);
            }
        }
        Ok(last)
    }

    pub(crate) async fn eval_or(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let mut last = Value::Boolean(false);
        for operand in call.operands {
            last = self.eval_expr(operand, env, ctx).await?;
            if last.is_truthy() {
                return Ok(last);
            }
        }
        Ok(last)
    }

    /// `(loop count body)`: body is re-evaluated on every pass.
    pub(crate) async fn eval_loop(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let count = match self.eval_expr(&call.operands[0], env, ctx).await? {
            Value::Integer(n) if n >= 0 => n,
            Value::Integer(n) => {
                return Err(EvalError::invalid_argument(
                    format!("loop count must be non-negative, got {}", n),
                    &call.operands[0],
                ))
            }
            other => return Err(call.type_error(0, "an integer", &other)),
        };

        let mut last = Value::Nil;
        for _ in 0..count {
            last = self.eval_expr(&call.operands[1], env, ctx).await?;
        }
        Ok(last)
    }

    /// `(try body (catch name handler...))`. Cancellation is never caught.
    pub(crate) async fn eval_try(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let clause = call.operands[1].as_list().unwrap_or(&[]);
        let (error_name, handler) = match clause {
            [head, name, handler @ ..] if head.as_symbol() == Some("catch") => {
                let name = name.as_symbol().ok_or_else(|| {
                    EvalError::invalid_form("catch must name the error binding", name)
                })?;
                (name, handler)
            }
            _ => {
                return Err(EvalError::invalid_form(
                    "try expects a (catch name handler...) clause",
                    &call.operands[1],
                ))
            }
        };

        match self.eval_expr(&call.operands[0], env, ctx).await {
            Ok(value) => Ok(value),
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                debug!(error = %err, "try caught evaluation error");
                let scope = env.extend(vec![(error_name.to_string(), err.to_value())]);
                self.eval_body(handler, &scope, ctx).await
            }
        }
    }

    /// `(set! name expr)`: mutates an existing binding, never creates one.
    pub(crate) async fn eval_set(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let target = &call.operands[0];
        let name = target.as_symbol().ok_or_else(|| {
            EvalError::type_error("set!", 1, "a symbol", "expression", target)
        })?;
        // Fail before evaluating the value when there is nothing to assign to.
        if !env.is_bound(name) {
            return Err(EvalError::unbound(name, target));
        }
        let value = self.eval_expr(&call.operands[1], env, ctx).await?;
        env.assign(name, value.clone())
            .map_err(|e| EvalError::unbound(&e.0, target))?;
        Ok(value)
    }

    /// `(defatom name (params p...) (instructions "...") (model "...")
    /// (output-format "json") (description "..."))`
    pub(crate) async fn eval_defatom(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_min_arity(2)?;
        let name = call.operands[0].as_symbol().ok_or_else(|| {
            EvalError::type_error("defatom", 1, "a symbol", "expression", &call.operands[0])
        })?;

        let mut params: Vec<String> = Vec::new();
        let mut instructions: Option<String> = None;
        let mut model = None;
        let mut output_format = OutputFormat::Text;
        let mut description = None;

        for clause in &call.operands[1..] {
            let items = clause.as_list().unwrap_or(&[]);
            let Some(key) = items.first().and_then(Expression::as_symbol) else {
                return Err(EvalError::invalid_form(
                    "defatom clauses must look like (key value...)",
                    clause,
                ));
            };
            match key {
                "params" => {
                    params = items[1..]
                        .iter()
                        .map(param_name)
                        .collect::<EvalResult<Vec<_>>>()?;
                }
                "instructions" => {
                    instructions = Some(self.clause_text(clause, items, env, ctx).await?);
                }
                "model" => model = Some(self.clause_text(clause, items, env, ctx).await?),
                "description" => {
                    description = Some(self.clause_text(clause, items, env, ctx).await?);
                }
                "output-format" => {
                    let text = self.clause_text(clause, items, env, ctx).await?;
                    output_format = OutputFormat::parse(&text).ok_or_else(|| {
                        EvalError::invalid_argument(
                            format!("unknown output format '{}', expected text or json", text),
                            clause,
                        )
                    })?;
                }
                other => {
                    return Err(EvalError::invalid_form(
                        format!("unknown defatom clause '{}'", other),
                        clause,
                    ))
                }
            }
        }

        let instructions = instructions.ok_or_else(|| {
            EvalError::invalid_form("defatom requires an (instructions ...) clause", call.expr)
        })?;

        let handle = self.registry.register(AtomicTaskDefinition {
            name: name.to_string(),
            params,
            instructions,
            model,
            output_format,
            description,
        });
        env.define(name, Value::AtomicTask(handle));
        Ok(Value::Symbol(Symbol::new(name)))
    }

    async fn clause_text(
        &self,
        clause: &Expression,
        items: &[Expression],
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<String> {
        if items.len() != 2 {
            return Err(EvalError::arity(
                &items[0].to_string(),
                1,
                items.len() - 1,
                clause,
            ));
        }
        match self.eval_expr(&items[1], env, ctx).await? {
            Value::String(s) => Ok(s),
            other => Err(EvalError::type_error(
                &items[0].to_string(),
                1,
                "a string",
                other.type_name(),
                &items[1],
            )),
        }
    }
}

/// Splits a `(name expr)` pair.
pub(crate) fn binding_pair<'a>(
    binding: &'a Expression,
    what: &str,
) -> EvalResult<(&'a str, &'a Expression)> {
    match binding.as_list() {
        Some([name, value]) => name
            .as_symbol()
            .map(|n| (n, value))
            .ok_or_else(|| EvalError::invalid_form(format!("{} name must be a symbol", what), name)),
        _ => Err(EvalError::invalid_form(
            format!("{} must be a (name expr) pair", what),
            binding,
        )),
    }
}

/// A defatom parameter: `name` or `(name type)`.
fn param_name(param: &Expression) -> EvalResult<String> {
    if let Some(name) = param.as_symbol() {
        return Ok(name.to_string());
    }
    match param.as_list() {
        Some([name, ..]) if name.as_symbol().is_some() => Ok(name.to_string()),
        _ => Err(EvalError::invalid_form(
            "defatom parameter must be a symbol or (name type)",
            param,
        )),
    }
}
