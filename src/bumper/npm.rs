use crate::bump::ReleaseRequest;
use crate::bumper::{BumpOutcome, VersionBumper};
use crate::error::{ReleaseError, Result};
use crate::process::{CommandRunner, CommandSpec};
use semver::Version;
use std::io::{self, Write};
use tracing::info;

/// Bumps through `npm version`, which commits and tags by itself
pub struct NpmVersion<'a> {
    runner: &'a dyn CommandRunner,
    allow_dirty: bool,
    tag_prefix: String,
}

impl<'a> NpmVersion<'a> {
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        NpmVersion {
            runner,
            allow_dirty: true,
            tag_prefix: "v".to_string(),
        }
    }

    /// Pass `--force` so npm commits staged build output with the version
    pub fn allow_dirty(mut self, allow: bool) -> Self {
        self.allow_dirty = allow;
        self
    }

    /// Prefix npm is configured to put in front of versions in tag names
    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    /// Build the `npm version` invocation for a request
    pub fn command(&self, request: &ReleaseRequest, message: Option<&str>) -> CommandSpec {
        let mut args = vec!["version".to_string(), request.bump_kind().to_string()];
        if let Some(pre_id) = request.pre_id() {
            args.push(format!("--preid={}", pre_id));
        }
        if self.allow_dirty {
            args.push("--force".to_string());
        }
        if let Some(template) = message {
            args.push("-m".to_string());
            args.push(template.replace("{version}", "%s"));
        }
        CommandSpec::new("npm", args)
    }

    /// Read the new tag from npm's output; it is the last non-empty line.
    fn parse_output(&self, stdout: &str) -> Result<BumpOutcome> {
        let tag = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| ReleaseError::version("npm version printed no version"))?;

        let raw = tag.strip_prefix(self.tag_prefix.as_str()).unwrap_or(tag);
        let version = Version::parse(raw).map_err(|e| {
            ReleaseError::version(format!("Cannot parse npm version output '{}': {}", tag, e))
        })?;

        Ok(BumpOutcome {
            version,
            tag: tag.to_string(),
        })
    }
}

impl VersionBumper for NpmVersion<'_> {
    fn bump(&self, request: &ReleaseRequest, message: Option<&str>) -> Result<BumpOutcome> {
        let stdout = self.runner.capture(&self.command(request, message))?;
        forward_output(&stdout, &mut io::stdout().lock())?;
        let outcome = self.parse_output(&stdout)?;
        info!(version = %outcome.version, tag = %outcome.tag, "npm created version commit");
        Ok(outcome)
    }
}

/// Copy npm's captured output, lifecycle scripts included, into the CI log.
fn forward_output<W: Write>(stdout: &str, sink: &mut W) -> io::Result<()> {
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        writeln!(sink, "{}", line)?;
    }
    sink.flush()
}
