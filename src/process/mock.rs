use crate::error::{ReleaseError, Result};
use crate::process::{CommandRunner, CommandSpec};
use crate::trace::CallTrace;

type Hook = Box<dyn Fn() -> Result<String>>;

/// Command runner that records command lines instead of spawning them
///
/// Commands without a scripted behaviour succeed with empty output.
/// Behaviours are matched by command-line prefix, first match wins.
pub struct MockRunner {
    trace: CallTrace,
    behaviours: Vec<(String, Hook)>,
}

impl MockRunner {
    pub fn new(trace: CallTrace) -> Self {
        MockRunner {
            trace,
            behaviours: Vec::new(),
        }
    }

    /// Answer commands starting with `prefix` with fixed stdout.
    pub fn respond(mut self, prefix: impl Into<String>, stdout: impl Into<String>) -> Self {
        let stdout = stdout.into();
        self.behaviours
            .push((prefix.into(), Box::new(move || Ok(stdout.clone()))));
        self
    }

    /// Fail commands starting with `prefix` with a non-zero exit status.
    pub fn fail(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let command = prefix.clone();
        self.behaviours.push((
            prefix,
            Box::new(move || {
                Err(ReleaseError::CommandFailed {
                    command: command.clone(),
                    status: "exit status: 1".to_string(),
                    stderr: String::new(),
                })
            }),
        ));
        self
    }

    /// Run arbitrary code when a command starting with `prefix` is invoked.
    pub fn on(
        mut self,
        prefix: impl Into<String>,
        hook: impl Fn() -> Result<String> + 'static,
    ) -> Self {
        self.behaviours.push((prefix.into(), Box::new(hook)));
        self
    }

    fn invoke(&self, command: &CommandSpec) -> Result<String> {
        let line = command.to_string();
        self.trace.record(line.clone());
        match self
            .behaviours
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
        {
            Some((_, hook)) => hook(),
            None => Ok(String::new()),
        }
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, command: &CommandSpec) -> Result<()> {
        self.invoke(command).map(|_| ())
    }

    fn capture(&self, command: &CommandSpec) -> Result<String> {
        self.invoke(command)
    }
}
