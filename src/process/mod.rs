//! Delegated external commands
//!
//! Install, build and `npm version` are opaque commands whose only contract
//! is their exit status. [CommandRunner] is the seam the pipeline calls
//! through; [SystemRunner] spawns real processes and [MockRunner] records
//! command lines for tests.

pub mod mock;

pub use mock::MockRunner;

use crate::error::{ReleaseError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a command from an argv list; an empty list means "no command".
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(CommandSpec::new(program.clone(), args.iter().cloned()))
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {:?}", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runs delegated commands to completion
pub trait CommandRunner {
    /// Run a command with inherited stdio so its output streams into the CI log.
    ///
    /// # Returns
    /// * `Ok(())` - The command exited with status 0
    /// * `Err(ReleaseError::CommandFailed)` - Any other exit status
    fn run(&self, command: &CommandSpec) -> Result<()>;

    /// Run a command and return its stdout.
    ///
    /// Stderr is kept and attached to the error when the command fails.
    fn capture(&self, command: &CommandSpec) -> Result<String>;
}

/// Spawns real processes in a fixed working directory
pub struct SystemRunner {
    workdir: PathBuf,
}

impl SystemRunner {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        SystemRunner {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).current_dir(&self.workdir);
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<()> {
        debug!(command = %spec, "running");
        let status = self
            .command(spec)
            .stdin(Stdio::null())
            .status()
            .map_err(|source| ReleaseError::Spawn {
                command: spec.to_string(),
                source,
            })?;

        if !status.success() {
            return Err(ReleaseError::CommandFailed {
                command: spec.to_string(),
                status: status.to_string(),
                stderr: String::new(),
            });
        }
        Ok(())
    }

    fn capture(&self, spec: &CommandSpec) -> Result<String> {
        debug!(command = %spec, "capturing");
        let output = self
            .command(spec)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ReleaseError::Spawn {
                command: spec.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ReleaseError::CommandFailed {
                command: spec.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}
