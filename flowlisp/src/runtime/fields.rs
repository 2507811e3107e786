//! `get-field` over heterogeneous record shapes.
//!
//! A missing field is always nil, whatever the record kind.

use crate::ast::Expression;
use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::evaluator::{Call, EvalContext, Evaluator};
use crate::runtime::task_bridge::TaskResult;
use crate::runtime::values::Value;
use indexmap::IndexMap;
use tracing::debug;

/// Named-field access shared by every record-like value.
pub trait FieldAccess {
    fn get_field(&self, name: &str) -> Option<Value>;
}

impl FieldAccess for IndexMap<String, Value> {
    fn get_field(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl FieldAccess for TaskResult {
    /// Direct fields first, then the parsed content when it is a map.
    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "status" => Some(Value::String(self.status.as_str().to_string())),
            "content" => Some(Value::String(self.content.clone())),
            "parsed_content" => Some(self.parsed_content.clone().unwrap_or(Value::Nil)),
            "notes" => Some(Value::Map(self.notes.clone())),
            _ => match &self.parsed_content {
                Some(Value::Map(parsed)) => parsed.get_field(name),
                _ => None,
            },
        }
    }
}

impl FieldAccess for EvalError {
    fn get_field(&self, name: &str) -> Option<Value> {
        match name {
            "kind" => Some(Value::String(self.kind.as_str().to_string())),
            "message" => Some(Value::String(self.message.clone())),
            "expression" => Some(Value::String(self.expression.clone())),
            "details" => Some(self.details.clone().map(Value::String).unwrap_or(Value::Nil)),
            _ => None,
        }
    }
}

impl Value {
    pub fn as_record(&self) -> Option<&dyn FieldAccess> {
        match self {
            Value::Map(map) => Some(map),
            Value::TaskResult(result) => Some(&**result),
            Value::Error(err) => Some(&**err),
            _ => None,
        }
    }
}

impl Evaluator {
    /// `(get-field target field)`. A bare symbol in field position names the
    /// field directly; any other field expression must evaluate to text.
    pub(crate) async fn eval_get_field(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let target = self.eval_expr(&call.operands[0], env, ctx).await?;
        let field = self.field_name(call, &call.operands[1], env, ctx).await?;

        let found = target.as_record().and_then(|record| record.get_field(&field));
        Ok(found.unwrap_or_else(|| {
            debug!(field = %field, target = target.type_name(), "get-field: no such field, returning nil");
            Value::Nil
        }))
    }

    async fn field_name(
        &self,
        call: &Call<'_>,
        field_expr: &Expression,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<String> {
        if let Some(name) = field_expr.as_symbol() {
            return Ok(name.to_string());
        }
        match self.eval_expr(field_expr, env, ctx).await? {
            Value::String(s) => Ok(s),
            Value::Symbol(s) => Ok(s.0),
            other => Err(call.type_error(1, "a field name (symbol or string)", &other)),
        }
    }
}
