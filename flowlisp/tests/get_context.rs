// get-context request construction and response mapping
mod common;

use common::Harness;
use flowlisp::runtime::{BridgeError, ContextMatch, ContextResponse, ErrorKind, MatchingStrategy, Value};
use pretty_assertions::assert_eq;

fn sample_response() -> ContextResponse {
    ContextResponse {
        summary: "two relevant files".to_string(),
        matches: vec![
            ContextMatch {
                id: "src/lib.rs".to_string(),
                content: "pub mod parser;".to_string(),
                relevance_score: 0.9,
                content_type: "file".to_string(),
            },
            ContextMatch {
                id: "src/parser.rs".to_string(),
                content: "fn parse() {}".to_string(),
                relevance_score: 0.4,
                content_type: "file".to_string(),
            },
        ],
        error: None,
    }
}

#[tokio::test]
async fn test_plain_query_defaults_to_content_matching() {
    let harness = Harness::new();
    harness.bridge.push_context(Ok(sample_response()));

    let result = harness.run(r#"(get-context "where is the parser?")"#).await.unwrap();

    let requests = harness.bridge.context_requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].query, "where is the parser?");
    assert_eq!(requests[0].strategy, MatchingStrategy::Content);
    assert!(requests[0].inputs.is_empty());

    let record = result.as_record().expect("context result is a record");
    assert_eq!(record.get_field("summary"), Some(Value::from("two relevant files")));
    match record.get_field("matches") {
        Some(Value::List(matches)) => {
            assert_eq!(matches.len(), 2);
            let first = matches[0].as_record().unwrap();
            assert_eq!(first.get_field("id"), Some(Value::from("src/lib.rs")));
            assert_eq!(first.get_field("relevance_score"), Some(Value::Float(0.9)));
        }
        other => panic!("expected a match list, got {:?}", other),
    }
    assert_eq!(record.get_field("error"), None);
}

#[tokio::test]
async fn test_metadata_only_strategy_is_forwarded() {
    let harness = Harness::new();
    harness.bridge.push_context(Ok(sample_response()));

    harness
        .run(r#"(get-context (query "parser") (context-strategy metadata-only))"#)
        .await
        .unwrap();

    assert_eq!(
        harness.bridge.context_requests.borrow()[0].strategy,
        MatchingStrategy::Metadata
    );
}

#[tokio::test]
async fn test_matching_strategy_overrides_context_strategy() {
    let harness = Harness::new();
    harness
        .run(
            r#"(get-context (query "q")
                            (context-strategy metadata-only)
                            (matching_strategy "content"))"#,
        )
        .await
        .unwrap();
    assert_eq!(
        harness.bridge.context_requests.borrow()[0].strategy,
        MatchingStrategy::Content
    );
}

#[tokio::test]
async fn test_unknown_strategy_fails_before_calling_out() {
    let harness = Harness::new();
    let err = harness
        .run(r#"(get-context (query "q") (context-strategy fuzzy))"#)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert_eq!(err.expression, "fuzzy");
    assert!(harness.bridge.context_requests.borrow().is_empty());
}

#[tokio::test]
async fn test_inputs_are_evaluated_and_forwarded() {
    let harness = Harness::new();
    harness
        .run(
            r#"(bind file "main.rs")
               (get-context (query (string-append "callers of " file))
                            (inputs (path file) (depth (+ 1 1))))"#,
        )
        .await
        .unwrap();

    let requests = harness.bridge.context_requests.borrow();
    assert_eq!(requests[0].query, "callers of main.rs");
    assert_eq!(requests[0].inputs.get("path"), Some(&Value::from("main.rs")));
    assert_eq!(requests[0].inputs.get("depth"), Some(&Value::Integer(2)));
}

#[tokio::test]
async fn test_missing_query_clause() {
    let harness = Harness::new();
    let err = harness
        .run("(get-context (context-strategy content-only))")
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidForm);
}

#[tokio::test]
async fn test_non_text_query_is_a_type_error() {
    let err = Harness::new().run("(get-context 42)").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
}

#[tokio::test]
async fn test_service_error_is_returned_as_data() {
    let harness = Harness::new();
    harness.bridge.push_context(Ok(ContextResponse {
        error: Some("index not built".to_string()),
        ..ContextResponse::default()
    }));
    let result = harness
        .run(r#"(get-field (get-context "q") error)"#)
        .await
        .unwrap();
    assert_eq!(result, Value::from("index not built"));
}

#[tokio::test]
async fn test_transport_failure_wraps_original_message() {
    let harness = Harness::new();
    harness
        .bridge
        .push_context(Err(BridgeError::Timeout("memory system unresponsive".to_string())));
    let err = harness.run(r#"(get-context "q")"#).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ExternalCall);
    assert!(err.details.unwrap().contains("memory system unresponsive"));
}

#[tokio::test]
async fn test_out_of_range_relevance_is_structured_output_error() {
    let harness = Harness::new();
    let mut response = sample_response();
    response.matches[0].relevance_score = 1.5;
    harness.bridge.push_context(Ok(response));
    let err = harness.run(r#"(get-context "q")"#).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::StructuredOutput);
}
