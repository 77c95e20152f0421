//! Output for the CI log
//!
//! Inside GitHub Actions each pipeline step is folded into a log group with
//! the `::group::`/`::endgroup::` workflow commands and failures are raised
//! with `::error::`. Elsewhere the same markers render as styled headers.

use crate::pipeline::ReleaseOutcome;
use crate::trace::CallTrace;
use console::style;

/// Sink for the start/end markers bracketing each pipeline step
pub trait Reporter {
    fn start_group(&self, name: &str);
    fn end_group(&self);
}

/// Emits GitHub Actions workflow commands on stdout
pub struct GithubActionsReporter;

impl Reporter for GithubActionsReporter {
    fn start_group(&self, name: &str) {
        println!("::group::{}", escape_data(name));
    }

    fn end_group(&self) {
        println!("::endgroup::");
    }
}

/// Styled headers for local terminals
pub struct TerminalReporter;

impl Reporter for TerminalReporter {
    fn start_group(&self, name: &str) {
        println!("\n{} {}", style("▶").cyan(), style(name).bold());
    }

    fn end_group(&self) {}
}

/// Records markers into a [CallTrace] as `group: <name>` / `endgroup`
pub struct RecordingReporter {
    trace: CallTrace,
}

impl RecordingReporter {
    pub fn new(trace: CallTrace) -> Self {
        RecordingReporter { trace }
    }
}

impl Reporter for RecordingReporter {
    fn start_group(&self, name: &str) {
        self.trace.record(format!("group: {}", name));
    }

    fn end_group(&self) {
        self.trace.record("endgroup");
    }
}

/// Pick the reporter matching the environment the process runs in.
pub fn reporter_for(github_actions: bool) -> Box<dyn Reporter> {
    if github_actions {
        Box::new(GithubActionsReporter)
    } else {
        Box::new(TerminalReporter)
    }
}

/// Escape a value for use in a workflow command.
pub fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

pub fn display_error(message: &str, github_actions: bool) {
    if github_actions {
        println!("::error::{}", escape_data(message));
    } else {
        eprintln!("{} {}", style("ERROR:").red().bold(), message);
    }
}

pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Summarize a published release.
pub fn display_outcome(outcome: &ReleaseOutcome) {
    display_success(&format!(
        "Published {} to branch '{}'",
        style(&outcome.tag).green().bold(),
        outcome.branch
    ));
    display_status(&format!("Version commit: {}", outcome.commit));
    if let Some(latest) = &outcome.latest_tag {
        display_status(&format!("Tag '{}' now points at {}", latest, outcome.tag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_data() {
        assert_eq!(escape_data("100% done\nnext"), "100%25 done%0Anext");
        assert_eq!(escape_data("plain"), "plain");
    }

    #[test]
    fn test_recording_reporter() {
        let trace = CallTrace::new();
        let reporter = RecordingReporter::new(trace.clone());
        reporter.start_group("Starting build");
        reporter.end_group();
        assert_eq!(trace.calls(), vec!["group: Starting build", "endgroup"]);
    }

    #[test]
    fn test_display_functions() {
        // Visual verification - output goes to stdout/stderr
        display_error("test error", false);
        display_error("test error", true);
        display_success("test success");
        display_status("test status");
    }
}
