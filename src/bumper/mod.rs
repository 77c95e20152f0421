//! Producing the version commit and tag
//!
//! - [NpmVersion]: delegates to `npm version`, as a JavaScript project would
//! - [ManifestBump]: edits `package.json` itself and commits/tags through [crate::git::Vcs]

pub mod manifest;
pub mod npm;

pub use manifest::ManifestBump;
pub use npm::NpmVersion;

use crate::bump::ReleaseRequest;
use crate::error::Result;
use semver::Version;

/// Result of a successful version bump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BumpOutcome {
    pub version: Version,
    /// The version tag created on the new commit (e.g., "v1.3.0")
    pub tag: String,
}

/// Creates a version commit and a version tag for a release request
pub trait VersionBumper {
    /// Apply the bump on the current branch.
    ///
    /// # Arguments
    /// * `request` - Validated release request
    /// * `message` - Commit message template; `{version}` is replaced by the
    ///   new version. `None` keeps the bumper's default message.
    fn bump(&self, request: &ReleaseRequest, message: Option<&str>) -> Result<BumpOutcome>;
}
