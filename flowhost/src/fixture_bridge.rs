//! Task bridge backed by canned JSON responses.
//!
//! ```json
//! {
//!   "latency_ms": 0,
//!   "contexts": {
//!     "where is the parser?": [
//!       { "summary": "one file", "matches": [
//!           { "id": "src/parser.rs", "content": "...", "relevance_score": 0.8 } ] }
//!     ]
//!   },
//!   "tasks": {
//!     "plan-change": [
//!       { "status": "COMPLETE", "content": "{\"steps\": 2}", "parsed_content": { "steps": 2 } },
//!       { "error": "task system unavailable" }
//!     ]
//!   }
//! }
//! ```
//!
//! Responses for a key are served in order; the last one repeats.

use async_trait::async_trait;
use flowlisp::runtime::{
    BridgeError, ContextRequest, ContextResponse, TaskBridge, TaskRequest, TaskResult, TaskStatus,
    Value,
};
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixtures '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fixtures: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("fixture key '{0}' has no responses")]
    Empty(String),
}

#[derive(Debug, Clone, Deserialize)]
struct TaskFixture {
    #[serde(default = "complete_status")]
    status: TaskStatus,
    #[serde(default)]
    content: String,
    #[serde(default)]
    parsed_content: Option<serde_json::Value>,
    #[serde(default)]
    notes: BTreeMap<String, serde_json::Value>,
    /// Served as a transport failure instead of a result
    #[serde(default)]
    error: Option<String>,
}

fn complete_status() -> TaskStatus {
    TaskStatus::Complete
}

impl TaskFixture {
    fn to_result(&self) -> Result<TaskResult, BridgeError> {
        if let Some(error) = &self.error {
            return Err(BridgeError::Connection(error.clone()));
        }
        Ok(TaskResult {
            status: self.status,
            content: self.content.clone(),
            parsed_content: self.parsed_content.clone().map(Value::from_json),
            notes: self
                .notes
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v.clone())))
                .collect(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FixtureFile {
    latency_ms: u64,
    contexts: HashMap<String, Vec<ContextResponse>>,
    tasks: HashMap<String, Vec<TaskFixture>>,
}

#[derive(Debug, Default)]
pub struct FixtureBridge {
    fixtures: FixtureFile,
    cursors: RefCell<HashMap<String, usize>>,
}

impl FixtureBridge {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| FixtureError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, FixtureError> {
        let fixtures: FixtureFile = serde_json::from_str(content)?;
        let empty_key = fixtures
            .contexts
            .iter()
            .filter(|(_, responses)| responses.is_empty())
            .map(|(k, _)| k)
            .chain(
                fixtures
                    .tasks
                    .iter()
                    .filter(|(_, responses)| responses.is_empty())
                    .map(|(k, _)| k),
            )
            .next();
        if let Some(key) = empty_key {
            return Err(FixtureError::Empty(key.clone()));
        }
        debug!(
            contexts = fixtures.contexts.len(),
            tasks = fixtures.tasks.len(),
            "loaded bridge fixtures"
        );
        Ok(FixtureBridge {
            fixtures,
            cursors: RefCell::new(HashMap::new()),
        })
    }

    /// Index of the next response for `key`, clamped to the last one.
    fn next_index(&self, key: String, len: usize) -> usize {
        let mut cursors = self.cursors.borrow_mut();
        let cursor = cursors.entry(key).or_insert(0);
        let index = (*cursor).min(len.saturating_sub(1));
        *cursor += 1;
        index
    }

    async fn simulate_latency(&self) {
        if self.fixtures.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.fixtures.latency_ms)).await;
        }
    }
}

#[async_trait(?Send)]
impl TaskBridge for FixtureBridge {
    async fn retrieve_context(&self, request: ContextRequest) -> Result<ContextResponse, BridgeError> {
        self.simulate_latency().await;
        let Some(responses) = self.fixtures.contexts.get(&request.query) else {
            debug!(query = %request.query, "no context fixture, returning no matches");
            return Ok(ContextResponse::default());
        };
        let index = self.next_index(format!("context:{}", request.query), responses.len());
        Ok(responses[index].clone())
    }

    async fn invoke_task(&self, request: TaskRequest) -> Result<TaskResult, BridgeError> {
        self.simulate_latency().await;
        let responses = self
            .fixtures
            .tasks
            .get(&request.name)
            .ok_or_else(|| BridgeError::UnknownTask(request.name.clone()))?;
        let index = self.next_index(format!("task:{}", request.name), responses.len());
        debug!(task = %request.name, response = index, "serving task fixture");
        responses[index].to_result()
    }
}
