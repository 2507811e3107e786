//! Registry of atomic-task definitions populated by `defatom`.
//!
//! Each evaluator is handed its own registry at construction, so tests can
//! run isolated evaluators side by side.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicTaskDefinition {
    pub name: String,
    pub params: Vec<String>,
    pub instructions: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub description: Option<String>,
}

impl AtomicTaskDefinition {
    pub fn new(name: &str, params: &[&str], instructions: &str) -> Self {
        AtomicTaskDefinition {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            instructions: instructions.to_string(),
            model: None,
            output_format: OutputFormat::Text,
            description: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct AtomicTaskRegistry {
    tasks: RefCell<HashMap<String, Rc<AtomicTaskDefinition>>>,
}

impl AtomicTaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a definition and returns the shared handle.
    pub fn register(&self, definition: AtomicTaskDefinition) -> Rc<AtomicTaskDefinition> {
        let handle = Rc::new(definition);
        let previous = self
            .tasks
            .borrow_mut()
            .insert(handle.name.clone(), handle.clone());
        if previous.is_some() {
            debug!(task = %handle.name, "replaced atomic task definition");
        } else {
            debug!(task = %handle.name, "registered atomic task");
        }
        handle
    }

    pub fn resolve(&self, name: &str) -> Option<Rc<AtomicTaskDefinition>> {
        self.tasks.borrow().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_resolve() {
        let registry = AtomicTaskRegistry::new();
        assert!(registry.resolve("summarize").is_none());
        registry.register(AtomicTaskDefinition::new("summarize", &["text"], "Summarize {{text}}"));
        let def = registry.resolve("summarize").unwrap();
        assert_eq!(def.params, vec!["text".to_string()]);
        assert_eq!(registry.names(), vec!["summarize".to_string()]);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = AtomicTaskRegistry::new();
        let b = AtomicTaskRegistry::new();
        a.register(AtomicTaskDefinition::new("plan", &[], "Plan"));
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }
}
