//! Output sink for the `log-message` primitive.

use std::cell::RefCell;
use std::fmt;
use tracing::info;

pub trait LogSink: fmt::Debug {
    fn emit(&self, message: &str);
}

/// Default sink: forwards script messages to `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, message: &str) {
        info!(target: "flowlisp::script", "{}", message);
    }
}

/// Keeps messages in memory; used by tests and by hosts that echo them.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: RefCell<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }
}

impl LogSink for MemorySink {
    fn emit(&self, message: &str) {
        self.messages.borrow_mut().push(message.to_string());
    }
}
