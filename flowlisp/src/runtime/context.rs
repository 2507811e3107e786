//! `get-context`: context retrieval through the task bridge.
//!
//! Accepted shapes:
//! - `(get-context "query text")`
//! - `(get-context (query "...") (context-strategy metadata-only)
//!                 (matching_strategy "content") (inputs (name expr) ...))`

use crate::ast::Expression;
use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::evaluator::{Call, EvalContext, Evaluator};
use crate::runtime::special_forms::binding_pair;
use crate::runtime::task_bridge::{ContextMatch, ContextRequest, ContextResponse, MatchingStrategy};
use crate::runtime::values::Value;
use indexmap::IndexMap;
use tracing::debug;

const CONTEXT_KEYS: [&str; 4] = ["query", "context-strategy", "matching_strategy", "inputs"];

fn clause_key(expr: &Expression) -> Option<&str> {
    expr.head_symbol().filter(|key| CONTEXT_KEYS.contains(key))
}

/// Maps the script-level `context-strategy` names onto matching modes.
fn context_strategy(name: &str) -> Option<MatchingStrategy> {
    match name {
        "content-only" => Some(MatchingStrategy::Content),
        "metadata-only" => Some(MatchingStrategy::Metadata),
        _ => None,
    }
}

impl Evaluator {
    pub(crate) async fn eval_get_context(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_min_arity(1)?;

        let request = if call.operands.len() == 1 && clause_key(&call.operands[0]).is_none() {
            let query = match self.eval_expr(&call.operands[0], env, ctx).await? {
                Value::String(q) => q,
                other => return Err(call.type_error(0, "a query string", &other)),
            };
            ContextRequest {
                query,
                strategy: MatchingStrategy::Content,
                inputs: IndexMap::new(),
            }
        } else {
            self.context_request_from_clauses(call, env, ctx).await?
        };

        debug!(query = %request.query, strategy = %request.strategy, "retrieving context");
        let response = ctx
            .await_external(
                "context retrieval",
                call.expr,
                self.bridge.retrieve_context(request),
            )
            .await?;
        context_response_value(response, call.expr)
    }

    async fn context_request_from_clauses(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<ContextRequest> {
        let mut query: Option<String> = None;
        let mut context_mode: Option<MatchingStrategy> = None;
        let mut matching_mode: Option<MatchingStrategy> = None;
        let mut inputs: Option<IndexMap<String, Value>> = None;

        for clause in call.operands {
            let key = clause_key(clause).ok_or_else(|| {
                EvalError::invalid_form(
                    format!(
                        "get-context clauses must be (key value) with key one of {}",
                        CONTEXT_KEYS.join(", ")
                    ),
                    clause,
                )
            })?;
            let items = clause.as_list().unwrap_or(&[]);
            let already_set = match key {
                "query" => query.is_some(),
                "context-strategy" => context_mode.is_some(),
                "matching_strategy" => matching_mode.is_some(),
                _ => inputs.is_some(),
            };
            if already_set {
                return Err(EvalError::invalid_form(
                    format!("duplicate get-context clause '{}'", key),
                    clause,
                ));
            }

            if key == "inputs" {
                inputs = Some(self.context_inputs(&items[1..], env, ctx).await?);
                continue;
            }
            if items.len() != 2 {
                return Err(EvalError::arity(key, 1, items.len() - 1, clause));
            }
            let value_expr = &items[1];

            match key {
                "query" => match self.eval_expr(value_expr, env, ctx).await? {
                    Value::String(q) => query = Some(q),
                    other => {
                        return Err(EvalError::type_error(
                            "query",
                            1,
                            "a string",
                            other.type_name(),
                            value_expr,
                        ))
                    }
                },
                "context-strategy" => {
                    // A bare symbol names the strategy; it is not looked up.
                    let name = match value_expr.as_symbol() {
                        Some(name) => name.to_string(),
                        None => match self.eval_expr(value_expr, env, ctx).await? {
                            Value::Symbol(s) => s.0,
                            Value::String(s) => s,
                            other => {
                                return Err(EvalError::type_error(
                                    "context-strategy",
                                    1,
                                    "a symbol",
                                    other.type_name(),
                                    value_expr,
                                ))
                            }
                        },
                    };
                    context_mode = Some(context_strategy(&name).ok_or_else(|| {
                        EvalError::invalid_argument(
                            format!(
                                "unknown context-strategy '{}', expected content-only or metadata-only",
                                name
                            ),
                            value_expr,
                        )
                    })?);
                }
                _ => {
                    let text = match self.eval_expr(value_expr, env, ctx).await? {
                        Value::String(s) => s,
                        other => {
                            return Err(EvalError::type_error(
                                "matching_strategy",
                                1,
                                "a string",
                                other.type_name(),
                                value_expr,
                            ))
                        }
                    };
                    matching_mode = Some(MatchingStrategy::parse(&text).ok_or_else(|| {
                        EvalError::invalid_argument(
                            format!(
                                "unknown matching_strategy '{}', expected content or metadata",
                                text
                            ),
                            value_expr,
                        )
                    })?);
                }
            }
        }

        let query = query.ok_or_else(|| {
            EvalError::invalid_form("get-context requires a (query ...) clause", call.expr)
        })?;
        Ok(ContextRequest {
            query,
            strategy: matching_mode.or(context_mode).unwrap_or_default(),
            inputs: inputs.unwrap_or_default(),
        })
    }

    /// `(inputs (name expr) ...)`, or `(inputs expr)` evaluating to a map.
    async fn context_inputs(
        &self,
        entries: &[Expression],
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<IndexMap<String, Value>> {
        if let [single] = entries {
            if binding_pair(single, "input").is_err() {
                return match self.eval_expr(single, env, ctx).await? {
                    Value::Map(map) => Ok(map),
                    other => Err(EvalError::type_error(
                        "inputs",
                        1,
                        "a map or (name expr) pairs",
                        other.type_name(),
                        single,
                    )),
                };
            }
        }

        let mut inputs = IndexMap::new();
        for entry in entries {
            let (name, value_expr) = binding_pair(entry, "input")?;
            let value = self.eval_expr(value_expr, env, ctx).await?;
            inputs.insert(name.to_string(), value);
        }
        Ok(inputs)
    }
}

fn match_value(m: ContextMatch, expr: &Expression) -> EvalResult<Value> {
    if !(0.0..=1.0).contains(&m.relevance_score) {
        return Err(EvalError::structured_output(
            format!(
                "match '{}' has relevance_score {} outside [0, 1]",
                m.id, m.relevance_score
            ),
            expr,
        ));
    }
    let mut record = IndexMap::new();
    record.insert("id".to_string(), Value::String(m.id));
    record.insert("content".to_string(), Value::String(m.content));
    record.insert("relevance_score".to_string(), Value::Float(m.relevance_score));
    record.insert("content_type".to_string(), Value::String(m.content_type));
    Ok(Value::Map(record))
}

/// `{summary, matches, error?}`; a service-reported error stays data.
fn context_response_value(response: ContextResponse, expr: &Expression) -> EvalResult<Value> {
    let matches = response
        .matches
        .into_iter()
        .map(|m| match_value(m, expr))
        .collect::<EvalResult<Vec<_>>>()?;

    let mut result = IndexMap::new();
    result.insert("summary".to_string(), Value::String(response.summary));
    result.insert("matches".to_string(), Value::List(matches));
    if let Some(error) = response.error {
        debug!(error = %error, "context service reported an error");
        result.insert("error".to_string(), Value::String(error));
    }
    Ok(Value::Map(result))
}
