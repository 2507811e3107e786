// Environment for variable bindings and scope management

use crate::runtime::values::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Returned when a name has no binding anywhere in the frame chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unbound symbol: {0}")]
pub struct UnboundSymbol(pub String);

#[derive(Default)]
struct Frame {
    bindings: HashMap<String, Value>,
    parent: Option<Environment>,
}

/// A handle to one scope frame. Cloning the handle shares the frame: every
/// closure created while the frame was innermost sees mutations made
/// through `assign`.
#[derive(Clone, Default)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

impl Environment {
    /// Creates a new, empty root environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a child frame whose parent is this frame.
    pub fn extend<I>(&self, bindings: I) -> Environment
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                bindings: bindings.into_iter().collect(),
                parent: Some(self.clone()),
            })),
        }
    }

    pub fn child(&self) -> Environment {
        self.extend(std::iter::empty())
    }

    /// Looks up a name by searching this frame and then its parents.
    pub fn lookup(&self, name: &str) -> Result<Value, UnboundSymbol> {
        let mut env = self.clone();
        loop {
            let parent = {
                let frame = env.frame.borrow();
                if let Some(value) = frame.bindings.get(name) {
                    return Ok(value.clone());
                }
                frame.parent.clone()
            };
            match parent {
                Some(p) => env = p,
                None => return Err(UnboundSymbol(name.to_string())),
            }
        }
    }

    /// Creates or overwrites a binding in this (innermost) frame.
    pub fn define(&self, name: impl Into<String>, value: Value) {
        self.frame.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Mutates the nearest existing binding of `name`. Never creates one.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), UnboundSymbol> {
        let mut env = self.clone();
        loop {
            let parent = {
                let mut frame = env.frame.borrow_mut();
                if let Some(slot) = frame.bindings.get_mut(name) {
                    *slot = value;
                    return Ok(());
                }
                frame.parent.clone()
            };
            match parent {
                Some(p) => env = p,
                None => return Err(UnboundSymbol(name.to_string())),
            }
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.lookup(name).is_ok()
    }

    pub fn is_bound_locally(&self, name: &str) -> bool {
        self.frame.borrow().bindings.contains_key(name)
    }

    pub fn parent(&self) -> Option<Environment> {
        self.frame.borrow().parent.clone()
    }

    /// Number of frames from this one to the root, inclusive.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.parent();
        while let Some(env) = current {
            depth += 1;
            current = env.parent();
        }
        depth
    }

    /// Whether both handles refer to the same frame.
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }

    /// Names bound in this frame only, sorted
    pub fn local_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.frame.borrow().bindings.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bindings may hold closures over this frame, so only names are shown.
        f.debug_struct("Environment")
            .field("bindings", &self.local_names())
            .field("depth", &self.depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parents() {
        let root = Environment::new();
        root.define("x", Value::Integer(1));
        let child = root.extend(vec![("y".to_string(), Value::Integer(2))]);
        assert_eq!(child.lookup("x"), Ok(Value::Integer(1)));
        assert_eq!(child.lookup("y"), Ok(Value::Integer(2)));
        assert_eq!(root.lookup("y"), Err(UnboundSymbol("y".to_string())));
        assert_eq!(child.depth(), 2);
    }

    #[test]
    fn test_define_shadows_in_current_frame() {
        let root = Environment::new();
        root.define("x", Value::Integer(1));
        let child = root.child();
        child.define("x", Value::Integer(2));
        assert_eq!(child.lookup("x"), Ok(Value::Integer(2)));
        assert_eq!(root.lookup("x"), Ok(Value::Integer(1)));
    }

    #[test]
    fn test_assign_mutates_nearest_binding() {
        let root = Environment::new();
        root.define("counter", Value::Integer(0));
        let child = root.child();
        child.assign("counter", Value::Integer(5)).unwrap();
        assert!(!child.is_bound_locally("counter"));
        assert_eq!(root.lookup("counter"), Ok(Value::Integer(5)));
    }

    #[test]
    fn test_assign_never_creates_binding() {
        let root = Environment::new();
        let child = root.child();
        assert_eq!(
            child.assign("missing", Value::Integer(5)),
            Err(UnboundSymbol("missing".to_string()))
        );
        assert!(!child.is_bound("missing"));
        assert!(root.local_names().is_empty());
        assert!(child.local_names().is_empty());
    }

    #[test]
    fn test_clones_share_the_frame() {
        let env = Environment::new();
        env.define("x", Value::Integer(1));
        let alias = env.clone();
        alias.assign("x", Value::Integer(9)).unwrap();
        assert!(env.ptr_eq(&alias));
        assert_eq!(env.lookup("x"), Ok(Value::Integer(9)));
    }
}
