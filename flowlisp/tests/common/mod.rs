// Shared fixtures for the flowlisp integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use flowlisp::runtime::{
    BridgeError, ContextRequest, ContextResponse, Environment, EvalResult, Evaluator, LogSink,
    MemorySink, TaskBridge, TaskRequest, TaskResult, Value,
};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

/// Bridge that records every request and answers from queued responses.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    pub context_requests: RefCell<Vec<ContextRequest>>,
    pub task_requests: RefCell<Vec<TaskRequest>>,
    context_responses: RefCell<VecDeque<Result<ContextResponse, BridgeError>>>,
    task_responses: RefCell<HashMap<String, VecDeque<Result<TaskResult, BridgeError>>>>,
    delay: Option<Duration>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long before answering.
    pub fn slow(delay: Duration) -> Self {
        RecordingBridge {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn push_context(&self, response: Result<ContextResponse, BridgeError>) {
        self.context_responses.borrow_mut().push_back(response);
    }

    pub fn push_task(&self, name: &str, response: Result<TaskResult, BridgeError>) {
        self.task_responses
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push_back(response);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait(?Send)]
impl TaskBridge for RecordingBridge {
    async fn retrieve_context(&self, request: ContextRequest) -> Result<ContextResponse, BridgeError> {
        self.context_requests.borrow_mut().push(request);
        self.pause().await;
        self.context_responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(ContextResponse::default()))
    }

    async fn invoke_task(&self, request: TaskRequest) -> Result<TaskResult, BridgeError> {
        let name = request.name.clone();
        self.task_requests.borrow_mut().push(request);
        self.pause().await;
        self.task_responses
            .borrow_mut()
            .get_mut(&name)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(BridgeError::UnknownTask(name)))
    }
}

pub struct Harness {
    pub bridge: Rc<RecordingBridge>,
    pub sink: Rc<MemorySink>,
    pub evaluator: Evaluator,
    pub env: Environment,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_bridge(RecordingBridge::new())
    }

    pub fn with_bridge(bridge: RecordingBridge) -> Self {
        let bridge = Rc::new(bridge);
        let sink = Rc::new(MemorySink::new());
        let evaluator = Evaluator::new(bridge.clone())
            .with_log_sink(sink.clone() as Rc<dyn LogSink>);
        Harness {
            bridge,
            sink,
            evaluator,
            env: Environment::new(),
        }
    }

    pub async fn run(&self, source: &str) -> EvalResult<Value> {
        let program = flowlisp::read(source).expect("test source should parse");
        self.evaluator
            .evaluate_program(&program, &self.env, None)
            .await
    }
}
