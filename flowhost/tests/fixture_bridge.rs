use flowhost::{FixtureBridge, FixtureError};
use flowlisp::runtime::{
    BridgeError, ContextRequest, MatchingStrategy, TaskBridge, TaskRequest, TaskStatus, Value,
};
use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use std::io::Write;

const FIXTURES: &str = r#"{
  "contexts": {
    "where is the parser?": [
      { "summary": "one file",
        "matches": [ { "id": "src/parser.rs", "content": "fn parse()", "relevance_score": 0.8 } ] }
    ]
  },
  "tasks": {
    "plan-change": [
      { "content": "first" },
      { "status": "FAILED", "content": "second", "notes": { "reason": "timeout" } }
    ],
    "flaky": [ { "error": "task system unavailable" } ]
  }
}"#;

fn context_request(query: &str) -> ContextRequest {
    ContextRequest {
        query: query.to_string(),
        strategy: MatchingStrategy::Content,
        inputs: IndexMap::new(),
    }
}

fn task_request(name: &str) -> TaskRequest {
    TaskRequest {
        name: name.to_string(),
        inputs: IndexMap::new(),
    }
}

#[tokio::test]
async fn test_context_fixture_by_query() {
    let bridge = FixtureBridge::from_json_str(FIXTURES).unwrap();
    let response = bridge
        .retrieve_context(context_request("where is the parser?"))
        .await
        .unwrap();
    assert_eq!(response.summary, "one file");
    assert_eq!(response.matches[0].content_type, "file");

    let unknown = bridge.retrieve_context(context_request("nothing")).await.unwrap();
    assert!(unknown.matches.is_empty());
}

#[tokio::test]
async fn test_task_responses_in_order_last_repeats() {
    let bridge = FixtureBridge::from_json_str(FIXTURES).unwrap();
    let first = bridge.invoke_task(task_request("plan-change")).await.unwrap();
    assert_eq!(first.status, TaskStatus::Complete);
    assert_eq!(first.content, "first");

    for _ in 0..2 {
        let next = bridge.invoke_task(task_request("plan-change")).await.unwrap();
        assert_eq!(next.status, TaskStatus::Failed);
        assert_eq!(next.notes.get("reason"), Some(&Value::from("timeout")));
    }
}

#[tokio::test]
async fn test_task_errors_and_unknown_tasks() {
    let bridge = FixtureBridge::from_json_str(FIXTURES).unwrap();
    assert!(matches!(
        bridge.invoke_task(task_request("flaky")).await,
        Err(BridgeError::Connection(_))
    ));
    assert_eq!(
        bridge.invoke_task(task_request("nope")).await.unwrap_err(),
        BridgeError::UnknownTask("nope".to_string())
    );
}

#[test]
fn test_from_file_and_empty_keys() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FIXTURES.as_bytes()).unwrap();
    assert!(FixtureBridge::from_file(file.path()).is_ok());

    let err = FixtureBridge::from_json_str(r#"{"tasks": {"empty": []}}"#).unwrap_err();
    assert!(matches!(err, FixtureError::Empty(key) if key == "empty"));

    let err = FixtureBridge::from_file("/definitely/not/here.json").unwrap_err();
    assert!(matches!(err, FixtureError::Io { .. }));
}
