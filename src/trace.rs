use std::cell::RefCell;
use std::rc::Rc;

/// Ordered record of delegated calls, shared between test doubles
///
/// Cloning yields a handle onto the same record, so a recording runner,
/// repository and reporter can interleave their entries and a test can
/// assert on the exact call order of a pipeline run.
#[derive(Debug, Clone, Default)]
pub struct CallTrace {
    calls: Rc<RefCell<Vec<String>>>,
}

impl CallTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }

    /// All calls recorded so far, oldest first
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Index of the first call starting with `prefix`
    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.starts_with(prefix))
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.position(prefix).is_some()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }
}
