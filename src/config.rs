use crate::error::{ReleaseError, Result};
use crate::git::Identity;
use crate::process::CommandSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// File name looked up in the working directory and the user config directory
pub const CONFIG_FILE_NAME: &str = "ci-release.toml";

/// Represents the complete configuration for ci-release.
///
/// Contains the pipeline toggles, the version bump strategy and the optional
/// committer identity.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub bump: BumpConfig,

    #[serde(default)]
    pub git: GitConfig,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_install() -> Vec<String> {
    vec!["npm".to_string(), "ci".to_string()]
}

fn default_build() -> Vec<String> {
    vec![
        "npm".to_string(),
        "run".to_string(),
        "--if-present".to_string(),
        "build".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_latest_tag() -> String {
    "latest".to_string()
}

fn default_commit_message() -> String {
    "Release {version}\n\nBuilt by {repository} run {run_id}".to_string()
}

/// Toggles for the release pipeline steps.
///
/// Turning off `fetch_before_checkout` and `carry_artifacts` and emptying
/// `commit_message` gives the plain `git add --all` + `npm version` flow.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PipelineConfig {
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Dependency install command; empty skips the step's work
    #[serde(default = "default_install")]
    pub install: Vec<String>,

    /// Build command; empty makes the build a no-op
    #[serde(default = "default_build")]
    pub build: Vec<String>,

    #[serde(default = "default_true")]
    pub fetch_before_checkout: bool,

    /// Stash build output before the checkout and pop it afterwards
    #[serde(default = "default_true")]
    pub carry_artifacts: bool,

    /// Tag force-moved to every new version commit; empty disables it
    #[serde(default = "default_latest_tag")]
    pub latest_tag: String,

    /// Version commit message template; empty keeps the bump tool's default
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            remote: default_remote(),
            install: default_install(),
            build: default_build(),
            fetch_before_checkout: true,
            carry_artifacts: true,
            latest_tag: default_latest_tag(),
            commit_message: default_commit_message(),
        }
    }
}

impl PipelineConfig {
    pub fn install_command(&self) -> Option<CommandSpec> {
        CommandSpec::from_argv(&self.install)
    }

    pub fn build_command(&self) -> Option<CommandSpec> {
        CommandSpec::from_argv(&self.build)
    }

    pub fn latest_tag(&self) -> Option<&str> {
        Some(self.latest_tag.as_str()).filter(|t| !t.is_empty())
    }

    pub fn commit_message(&self) -> Option<&str> {
        Some(self.commit_message.as_str()).filter(|m| !m.is_empty())
    }
}

/// How the version commit and tag are produced
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BumpStrategy {
    /// Delegate to `npm version`
    #[default]
    Npm,
    /// Edit the manifest and commit/tag with git directly
    Manifest,
}

fn default_manifest() -> String {
    "package.json".to_string()
}

fn default_tag_prefix() -> String {
    "v".to_string()
}

/// Configuration for the version bump.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BumpConfig {
    #[serde(default)]
    pub strategy: BumpStrategy,

    /// Let `npm version` commit the staged build output (`--force`)
    #[serde(default = "default_true")]
    pub allow_dirty: bool,

    #[serde(default = "default_manifest")]
    pub manifest: String,

    #[serde(default = "default_tag_prefix")]
    pub tag_prefix: String,
}

impl Default for BumpConfig {
    fn default() -> Self {
        BumpConfig {
            strategy: BumpStrategy::default(),
            allow_dirty: true,
            manifest: default_manifest(),
            tag_prefix: default_tag_prefix(),
        }
    }
}

/// Committer identity used for stash, commit and tag.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct GitConfig {
    #[serde(default)]
    pub user_name: Option<String>,

    #[serde(default)]
    pub user_email: Option<String>,
}

impl GitConfig {
    /// Identity to inject, when both name and email are set
    pub fn identity(&self) -> Option<Identity> {
        match (&self.user_name, &self.user_email) {
            (Some(name), Some(email)) if !name.is_empty() && !email.is_empty() => Some(Identity {
                name: name.clone(),
                email: email.clone(),
            }),
            _ => None,
        }
    }
}

/// Loads configuration from file or returns defaults.
///
/// Attempts to load configuration in the following order:
/// 1. Custom path provided as parameter
/// 2. `ci-release.toml` in `workdir`
/// 3. `ci-release.toml` in the user config directory
/// 4. Default configuration if no file found
///
/// # Arguments
/// * `config_path` - Optional path to custom configuration file
/// * `workdir` - Directory of the working copy being released
///
/// # Returns
/// * `Ok(Config)` - Loaded or default configuration
/// * `Err` - If a file exists but cannot be read or parsed
pub fn load_config(config_path: Option<&str>, workdir: &Path) -> Result<Config> {
    let local = workdir.join(CONFIG_FILE_NAME);

    let config_str = if let Some(path) = config_path {
        read(Path::new(path))?
    } else if local.exists() {
        read(&local)?
    } else if let Some(config_dir) = dirs::config_dir() {
        let user_path = config_dir.join(CONFIG_FILE_NAME);
        if user_path.exists() {
            read(&user_path)?
        } else {
            return Ok(Config::default());
        }
    } else {
        return Ok(Config::default());
    };

    parse_config(&config_str)
}

/// Parse a configuration document.
pub fn parse_config(contents: &str) -> Result<Config> {
    toml::from_str(contents).map_err(|e| ReleaseError::config(e.to_string()))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| ReleaseError::config(format!("Cannot read {}: {}", path.display(), e)))
}
