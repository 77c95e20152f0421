//! Named, bracketed execution of pipeline steps

use crate::error::Result;
use crate::ui::Reporter;
use std::time::Instant;
use tracing::{debug, warn};

/// Closes the reporter group when dropped, including while unwinding
struct GroupGuard<'a> {
    reporter: &'a dyn Reporter,
}

impl<'a> GroupGuard<'a> {
    fn open(reporter: &'a dyn Reporter, name: &str) -> Self {
        reporter.start_group(name);
        GroupGuard { reporter }
    }
}

impl Drop for GroupGuard<'_> {
    fn drop(&mut self) {
        self.reporter.end_group();
    }
}

/// Runs each unit of work inside a start/end marker pair
///
/// The action's result is returned as is: no retry, no wrapping.
pub struct StepExecutor<'a> {
    reporter: &'a dyn Reporter,
}

impl<'a> StepExecutor<'a> {
    pub fn new(reporter: &'a dyn Reporter) -> Self {
        StepExecutor { reporter }
    }

    pub fn run<T>(&self, name: &str, action: impl FnOnce() -> Result<T>) -> Result<T> {
        let _group = GroupGuard::open(self.reporter, name);
        let started = Instant::now();

        let result = action();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => debug!(step = name, elapsed_ms, "step finished"),
            Err(e) => warn!(step = name, elapsed_ms, error = %e, "step failed"),
        }
        result
    }
}
