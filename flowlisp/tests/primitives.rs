// Primitive catalog behavior through the evaluator
mod common;

use common::Harness;
use flowlisp::runtime::{ErrorKind, Value};
use pretty_assertions::assert_eq;

async fn eval(source: &str) -> Value {
    Harness::new().run(source).await.expect("evaluation should succeed")
}

async fn eval_err(source: &str) -> flowlisp::EvalError {
    Harness::new().run(source).await.expect_err("evaluation should fail")
}

#[tokio::test]
async fn test_addition_with_promotion() {
    assert_eq!(eval("(+ 1 2 3)").await, Value::Integer(6));
    assert_eq!(eval("(+)").await, Value::Integer(0));
    assert_eq!(eval("(+ 1 2.5)").await, Value::Float(3.5));
    assert_eq!(eval("(* 2 3 4)").await, Value::Integer(24));
    assert_eq!(eval("(*)").await, Value::Integer(1));
}

#[tokio::test]
async fn test_addition_rejects_non_numbers_by_position() {
    let err = eval_err(r#"(+ 1 "two")"#).await;
    assert_eq!(err.kind, ErrorKind::Type);
    assert_eq!(err.expression, r#""two""#);
    assert!(err.message.contains("operand 2"), "{}", err.message);
}

#[tokio::test]
async fn test_integer_overflow_is_an_error() {
    let err = eval_err("(+ 9223372036854775807 1)").await;
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
}

#[tokio::test]
async fn test_subtraction_arity() {
    assert_eq!(eval("(- 10 4)").await, Value::Integer(6));
    assert_eq!(eval("(- 5)").await, Value::Integer(-5));
    assert_eq!(eval("(- 1.5 0.5)").await, Value::Float(1.0));

    let err = eval_err("(- 1 2 3)").await;
    assert_eq!(err.kind, ErrorKind::Arity);
    let err = eval_err("(-)").await;
    assert_eq!(err.kind, ErrorKind::Arity);
}

#[tokio::test]
async fn test_subtraction_arity_checked_before_operands() {
    // The unbound operand would fail first if operands were evaluated.
    let err = eval_err("(- missing 2 3)").await;
    assert_eq!(err.kind, ErrorKind::Arity);
}

#[tokio::test]
async fn test_comparisons() {
    assert_eq!(eval("(< 1 2)").await, Value::Boolean(true));
    assert_eq!(eval("(< 2 1.5)").await, Value::Boolean(false));
    assert_eq!(eval("(> 3 1)").await, Value::Boolean(true));
    assert_eq!(eval("(= 2 2.0)").await, Value::Boolean(true));

    let err = eval_err(r#"(< 1 "a")"#).await;
    assert_eq!(err.kind, ErrorKind::Type);
    let err = eval_err("(< 1)").await;
    assert_eq!(err.kind, ErrorKind::Arity);
}

#[tokio::test]
async fn test_eq_compares_symbols_and_text() {
    assert_eq!(eval("(eq? 'a 'a)").await, Value::Boolean(true));
    assert_eq!(eval("(eq? 'a 'b)").await, Value::Boolean(false));
    assert_eq!(eval(r#"(eq? 'done "done")"#).await, Value::Boolean(true));
    assert_eq!(eval("(eq? 1 1.0)").await, Value::Boolean(true));
    assert_eq!(eval("(eq? (list 1 2) (list 1 2))").await, Value::Boolean(true));
    assert_eq!(eval("(eq? nil false)").await, Value::Boolean(false));
}

#[tokio::test]
async fn test_null_and_not_follow_truthiness() {
    assert_eq!(eval("(null? nil)").await, Value::Boolean(true));
    assert_eq!(eval("(null? (list))").await, Value::Boolean(true));
    assert_eq!(eval("(null? 0)").await, Value::Boolean(false));
    assert_eq!(eval(r#"(null? "")"#).await, Value::Boolean(false));

    assert_eq!(eval("(not false)").await, Value::Boolean(true));
    assert_eq!(eval("(not nil)").await, Value::Boolean(true));
    assert_eq!(eval("(not (list))").await, Value::Boolean(true));
    assert_eq!(eval("(not 0)").await, Value::Boolean(false));
    assert_eq!(eval(r#"(not "")"#).await, Value::Boolean(false));
}

#[tokio::test]
async fn test_string_append_renders_atoms() {
    assert_eq!(
        eval(r#"(string-append "a" 1 nil)"#).await,
        Value::from("a1None")
    );
    assert_eq!(
        eval(r#"(string-append "x=" 2.0 " " 'sym)"#).await,
        Value::from("x=2.0 sym")
    );
    assert_eq!(eval("(string-append)").await, Value::from(""));

    let err = eval_err(r#"(string-append "a" (list 1))"#).await;
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("operand 2"));
}

#[tokio::test]
async fn test_string_equality_requires_strings() {
    assert_eq!(eval(r#"(string=? "a" "a")"#).await, Value::Boolean(true));
    assert_eq!(eval(r#"(string=? "a" "b")"#).await, Value::Boolean(false));
    let err = eval_err(r#"(string=? "a" 'a)"#).await;
    assert_eq!(err.kind, ErrorKind::Type);
}

#[tokio::test]
async fn test_list_propagates_operand_failure() {
    assert_eq!(
        eval("(list 1 (+ 1 1))").await,
        Value::List(vec![Value::Integer(1), Value::Integer(2)])
    );
    let err = eval_err("(list 1 nowhere)").await;
    assert_eq!(err.kind, ErrorKind::UnboundSymbol);
    assert_eq!(err.expression, "nowhere");
}

#[tokio::test]
async fn test_log_message_writes_to_sink() {
    let harness = Harness::new();
    let result = harness
        .run(r#"(log-message "step" 3 "done:" true)"#)
        .await
        .unwrap();
    assert_eq!(result, Value::from("step 3 done: true"));
    assert_eq!(harness.sink.messages(), vec!["step 3 done: true".to_string()]);
}

#[tokio::test]
async fn test_get_field_on_maps_and_missing_fields() {
    let harness = Harness::new();
    let mut record = indexmap::IndexMap::new();
    record.insert("status".to_string(), Value::from("ok"));
    harness.env.define("record", Value::Map(record));

    assert_eq!(harness.run("(get-field record status)").await.unwrap(), Value::from("ok"));
    assert_eq!(harness.run(r#"(get-field record "status")"#).await.unwrap(), Value::from("ok"));
    assert_eq!(harness.run("(get-field record missing)").await.unwrap(), Value::Nil);
    assert_eq!(harness.run("(get-field 42 status)").await.unwrap(), Value::Nil);
}
