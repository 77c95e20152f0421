//! Read-only CI run metadata
//!
//! Collected once at startup and handed to the pipeline, so nothing below
//! `main` reads the process environment.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid")
    })
}

/// Metadata describing the CI run that is publishing the release
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CiContext {
    /// `owner/name` of the repository being built
    pub repository: Option<String>,
    pub run_id: Option<String>,
    pub run_number: Option<String>,
    /// Commit the run was triggered for
    pub sha: Option<String>,
    pub workflow: Option<String>,
    pub actor: Option<String>,
    /// Whether the process runs inside GitHub Actions
    pub github_actions: bool,
}

impl CiContext {
    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build a context from arbitrary key/value pairs.
    ///
    /// Empty values are treated as unset.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let get = |key: &str| vars.get(key).cloned();

        CiContext {
            repository: get("GITHUB_REPOSITORY"),
            run_id: get("GITHUB_RUN_ID"),
            run_number: get("GITHUB_RUN_NUMBER"),
            sha: get("GITHUB_SHA"),
            workflow: get("GITHUB_WORKFLOW"),
            actor: get("GITHUB_ACTOR"),
            github_actions: vars.get("GITHUB_ACTIONS").map(String::as_str) == Some("true"),
        }
    }

    fn lookup(&self, key: &str) -> Option<Option<&str>> {
        let value = match key {
            "repository" => &self.repository,
            "run_id" => &self.run_id,
            "run_number" => &self.run_number,
            "sha" => &self.sha,
            "workflow" => &self.workflow,
            "actor" => &self.actor,
            _ => return None,
        };
        Some(value.as_deref())
    }

    /// Expand `{repository}`, `{run_id}`, `{run_number}`, `{sha}`,
    /// `{workflow}` and `{actor}` in a message template.
    ///
    /// Unknown placeholders such as `{version}` are left for the bumper;
    /// known placeholders without a value render as `unknown`.
    pub fn render(&self, template: &str) -> String {
        placeholder()
            .replace_all(template, |caps: &Captures| match self.lookup(&caps[1]) {
                Some(Some(value)) => value.to_string(),
                Some(None) => "unknown".to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
