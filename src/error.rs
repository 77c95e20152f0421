use thiserror::Error;

/// Rejections produced while checking a release request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Version \"{value}\" must be one of {allowed}")]
    InvalidBumpKind { value: String, allowed: String },

    #[error("Provided pre-id \"{pre_id}\" with non-prerelease version \"{bump_kind}\"")]
    PreIdWithoutPrerelease { bump_kind: String, pre_id: String },
}

/// Unified error type for ci-release operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Invalid release request: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Command `{command}` failed with {status}{}", stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),

    #[error("Release branch '{branch}' does not exist locally or on remote '{remote}'")]
    BranchNotFound { branch: String, remote: String },

    #[error("Artifact snapshot error: {0}")]
    Snapshot(String),

    #[error("Version error: {0}")]
    Version(String),

    #[error("Tag error: {0}")]
    Tag(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}

/// Convenience type alias for Results in ci-release
pub type Result<T> = std::result::Result<T, ReleaseError>;

impl ReleaseError {
    /// Create a configuration error with context
    pub fn config(msg: impl Into<String>) -> Self {
        ReleaseError::Config(msg.into())
    }

    /// Create a snapshot consistency error with context
    pub fn snapshot(msg: impl Into<String>) -> Self {
        ReleaseError::Snapshot(msg.into())
    }

    /// Create a version error with context
    pub fn version(msg: impl Into<String>) -> Self {
        ReleaseError::Version(msg.into())
    }

    /// Create a tag error with context
    pub fn tag(msg: impl Into<String>) -> Self {
        ReleaseError::Tag(msg.into())
    }

    /// Create a manifest error with context
    pub fn manifest(msg: impl Into<String>) -> Self {
        ReleaseError::Manifest(msg.into())
    }
}
