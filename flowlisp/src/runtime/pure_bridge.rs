//! Pure bridge for evaluator-only usage
//!
//! Refuses every external call, making it clear that context retrieval and
//! atomic tasks need a real host bridge.

use crate::runtime::task_bridge::{
    BridgeError, ContextRequest, ContextResponse, TaskBridge, TaskRequest, TaskResult,
};
use async_trait::async_trait;
use std::rc::Rc;

#[derive(Debug, Default)]
pub struct PureBridge;

impl PureBridge {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait(?Send)]
impl TaskBridge for PureBridge {
    async fn retrieve_context(&self, request: ContextRequest) -> Result<ContextResponse, BridgeError> {
        Err(BridgeError::Connection(format!(
            "context retrieval for '{}' not available without a host bridge",
            request.query
        )))
    }

    async fn invoke_task(&self, request: TaskRequest) -> Result<TaskResult, BridgeError> {
        Err(BridgeError::Connection(format!(
            "atomic task '{}' not available without a host bridge",
            request.name
        )))
    }
}

/// Convenience function to create a PureBridge wrapped in Rc
pub fn create_pure_bridge() -> Rc<dyn TaskBridge> {
    Rc::new(PureBridge::new())
}
