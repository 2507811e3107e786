// Script runner: reads a program and evaluates it under the configured budget

use crate::config::FlowConfig;
use flowlisp::runtime::{CancellationToken, Environment, EvalError, LogSink, TaskBridge, Value};
use flowlisp::{Evaluator, ReadError};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to read script '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub struct ScriptRunner {
    evaluator: Evaluator,
    timeout: Option<Duration>,
}

impl ScriptRunner {
    pub fn new(config: &FlowConfig, bridge: Rc<dyn TaskBridge>) -> Self {
        ScriptRunner {
            evaluator: Evaluator::new(bridge).with_config(config.evaluator.clone()),
            timeout: config.run.timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn with_log_sink(mut self, sink: Rc<dyn LogSink>) -> Self {
        self.evaluator = self.evaluator.with_log_sink(sink);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    pub async fn run_file(&self, path: impl AsRef<Path>, env: &Environment) -> Result<Value, RunError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!(script = %path.display(), "running script");
        self.run_source(&source, env).await
    }

    /// The timeout becomes the token's deadline, checked before every
    /// sub-expression and raced against external calls.
    pub async fn run_source(&self, source: &str, env: &Environment) -> Result<Value, RunError> {
        let program = flowlisp::read(source)?;
        let token = match self.timeout {
            Some(timeout) => CancellationToken::with_deadline(Instant::now() + timeout),
            None => CancellationToken::new(),
        };

        let result = self
            .evaluator
            .evaluate_program(&program, env, Some(&token))
            .await;
        if let Some(timeout) = self.timeout.filter(|_| token.deadline_passed()) {
            warn!(timeout_ms = timeout.as_millis() as u64, "script budget exhausted");
        }
        Ok(result?)
    }
}
