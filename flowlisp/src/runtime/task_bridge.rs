//! Task Invocation Bridge
//!
//! Defines the contract between the evaluator (which is pure apart from
//! these calls) and the external memory and task services. `get-context`
//! goes through [`TaskBridge::retrieve_context`]; applying an atomic task
//! goes through [`TaskBridge::invoke_task`]. Both are awaited at exactly one
//! point per primitive, raced against the caller's cancellation token.

use crate::runtime::values::Value;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How the memory system should match the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    #[default]
    Content,
    Metadata,
}

impl MatchingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingStrategy::Content => "content",
            MatchingStrategy::Metadata => "metadata",
        }
    }

    /// Parses the wire names `content` / `metadata`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "content" => Some(MatchingStrategy::Content),
            "metadata" => Some(MatchingStrategy::Metadata),
            _ => None,
        }
    }
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextRequest {
    pub query: String,
    pub strategy: MatchingStrategy,
    pub inputs: IndexMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMatch {
    pub id: String,
    pub content: String,
    pub relevance_score: f64,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

fn default_content_type() -> String {
    "file".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContextResponse {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub matches: Vec<ContextMatch>,
    /// Service-reported failure; surfaced to scripts as data, not raised.
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub name: String,
    pub inputs: IndexMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Complete,
    Failed,
    Continuation,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Complete => "COMPLETE",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Continuation => "CONTINUATION",
        }
    }
}

/// Outcome of one atomic-task invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub status: TaskStatus,
    pub content: String,
    pub parsed_content: Option<Value>,
    pub notes: IndexMap<String, Value>,
}

impl TaskResult {
    pub fn complete(content: impl Into<String>) -> Self {
        TaskResult {
            status: TaskStatus::Complete,
            content: content.into(),
            parsed_content: None,
            notes: IndexMap::new(),
        }
    }

    pub fn failed(content: impl Into<String>) -> Self {
        TaskResult {
            status: TaskStatus::Failed,
            ..Self::complete(content)
        }
    }

    pub fn with_parsed_content(mut self, parsed: Value) -> Self {
        self.parsed_content = Some(parsed);
        self
    }
}

/// Transport-level failures of the external services.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("call cancelled")]
    Cancelled,
}

/// The evaluator's only route to the memory and task systems.
#[async_trait(?Send)]
pub trait TaskBridge: fmt::Debug {
    async fn retrieve_context(&self, request: ContextRequest) -> Result<ContextResponse, BridgeError>;

    async fn invoke_task(&self, request: TaskRequest) -> Result<TaskResult, BridgeError>;
}
