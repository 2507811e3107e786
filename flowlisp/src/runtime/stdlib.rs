//! Flowlisp primitive catalog
//!
//! Pure built-ins dispatched by head symbol:
//! - Sequence construction (`list`)
//! - Arithmetic (`+`, `-`, `*`)
//! - Comparison (`<`, `>`, `=`, `eq?`)
//! - Predicates and logic (`null?`, `not`)
//! - Strings (`string-append`, `string=?`)
//! - Script logging (`log-message`)
//!
//! Every primitive checks its operand count before evaluating anything, then
//! evaluates operands left-to-right and type-checks them by position.

use crate::runtime::environment::Environment;
use crate::runtime::error::{EvalError, EvalResult};
use crate::runtime::evaluator::{Call, EvalContext, Evaluator};
use crate::runtime::values::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(call: &Call<'_>, index: usize, value: &Value) -> EvalResult<Number> {
        match value {
            Value::Integer(i) => Ok(Number::Int(*i)),
            Value::Float(f) => Ok(Number::Float(*f)),
            other => Err(call.type_error(index, "a number", other)),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Integer arithmetic unless either side is a float.
    fn combine(
        self,
        other: Number,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => int_op(a, b).map(Number::Int),
            (a, b) => Some(Number::Float(float_op(a.as_f64(), b.as_f64()))),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Integer(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

fn overflow(call: &Call<'_>) -> EvalError {
    EvalError::invalid_argument(format!("integer overflow in {}", call.name), call.expr)
}

impl Evaluator {
    /// `(list a b ...)`: an operand failure propagates as that operand's error.
    pub(crate) async fn prim_list(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        Ok(Value::List(self.eval_operands(call.operands, env, ctx).await?))
    }

    pub(crate) async fn prim_add(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let args = self.eval_operands(call.operands, env, ctx).await?;
        let mut acc = Number::Int(0);
        for (i, arg) in args.iter().enumerate() {
            let n = Number::of(call, i, arg)?;
            acc = acc
                .combine(n, i64::checked_add, |a, b| a + b)
                .ok_or_else(|| overflow(call))?;
        }
        Ok(acc.into_value())
    }

    pub(crate) async fn prim_multiply(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let args = self.eval_operands(call.operands, env, ctx).await?;
        let mut acc = Number::Int(1);
        for (i, arg) in args.iter().enumerate() {
            let n = Number::of(call, i, arg)?;
            acc = acc
                .combine(n, i64::checked_mul, |a, b| a * b)
                .ok_or_else(|| overflow(call))?;
        }
        Ok(acc.into_value())
    }

    /// `(- x)` negates, `(- x y)` subtracts; other arities fail.
    pub(crate) async fn prim_subtract(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        if !(1..=2).contains(&call.operands.len()) {
            return Err(EvalError::arity("-", "1 or 2", call.operands.len(), call.expr));
        }
        let args = self.eval_operands(call.operands, env, ctx).await?;
        let first = Number::of(call, 0, &args[0])?;
        let result = match args.get(1) {
            None => match first {
                Number::Int(i) => i.checked_neg().map(Number::Int),
                Number::Float(f) => Some(Number::Float(-f)),
            },
            Some(second) => {
                let second = Number::of(call, 1, second)?;
                first.combine(second, i64::checked_sub, |a, b| a - b)
            }
        };
        result.map(Number::into_value).ok_or_else(|| overflow(call))
    }

    /// `<`, `>` and `=` over exactly two numbers.
    pub(crate) async fn prim_compare(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let args = self.eval_operands(call.operands, env, ctx).await?;
        let left = Number::of(call, 0, &args[0])?;
        let right = Number::of(call, 1, &args[1])?;
        let result = match (left, right) {
            (Number::Int(a), Number::Int(b)) => match call.name {
                "<" => a < b,
                ">" => a > b,
                _ => a == b,
            },
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                match call.name {
                    "<" => a < b,
                    ">" => a > b,
                    _ => a == b,
                }
            }
        };
        Ok(Value::Boolean(result))
    }

    pub(crate) async fn prim_eq(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let args = self.eval_operands(call.operands, env, ctx).await?;
        Ok(Value::Boolean(args[0].equals(&args[1])))
    }

    pub(crate) async fn prim_null(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(1)?;
        let value = self.eval_expr(&call.operands[0], env, ctx).await?;
        let is_null = match &value {
            Value::Nil => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        };
        Ok(Value::Boolean(is_null))
    }

    pub(crate) async fn prim_not(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(1)?;
        let value = self.eval_expr(&call.operands[0], env, ctx).await?;
        Ok(Value::Boolean(!value.is_truthy()))
    }

    pub(crate) async fn prim_string_append(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let args = self.eval_operands(call.operands, env, ctx).await?;
        let mut out = String::new();
        for (i, arg) in args.iter().enumerate() {
            let text = arg
                .as_text()
                .ok_or_else(|| call.type_error(i, "a string, number, symbol or nil", arg))?;
            out.push_str(&text);
        }
        Ok(Value::String(out))
    }

    pub(crate) async fn prim_string_eq(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        call.expect_arity(2)?;
        let args = self.eval_operands(call.operands, env, ctx).await?;
        match (&args[0], &args[1]) {
            (Value::String(a), Value::String(b)) => Ok(Value::Boolean(a == b)),
            (Value::String(_), other) => Err(call.type_error(1, "a string", other)),
            (other, _) => Err(call.type_error(0, "a string", other)),
        }
    }

    pub(crate) async fn prim_log_message(
        &self,
        call: &Call<'_>,
        env: &Environment,
        ctx: &EvalContext,
    ) -> EvalResult<Value> {
        let args = self.eval_operands(call.operands, env, ctx).await?;
        let text = args
            .iter()
            .map(Value::to_log_text)
            .collect::<Vec<_>>()
            .join(" ");
        self.log_sink.emit(&text);
        Ok(Value::String(text))
    }
}
