//! Version bump kinds and release request validation
//!
//! A release is requested as one of seven bump kinds, optionally with a
//! pre-release identifier that is only meaningful for `prerelease`.
//! Increment rules follow npm's `version` command so that the native
//! manifest bumper and `npm version` agree on the next version.

use crate::error::{ReleaseError, Result, ValidationError};
use semver::{BuildMetadata, Prerelease, Version};
use std::fmt;
use std::str::FromStr;

/// Every bump kind accepted by the pipeline, in the order shown to users.
pub const RELEASES: [&str; 7] = [
    "major",
    "minor",
    "patch",
    "premajor",
    "preminor",
    "prepatch",
    "prerelease",
];

/// The category of version increment requested for a release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BumpKind {
    Major,
    Minor,
    Patch,
    PreMajor,
    PreMinor,
    PrePatch,
    PreRelease,
}

impl BumpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BumpKind::Major => "major",
            BumpKind::Minor => "minor",
            BumpKind::Patch => "patch",
            BumpKind::PreMajor => "premajor",
            BumpKind::PreMinor => "preminor",
            BumpKind::PrePatch => "prepatch",
            BumpKind::PreRelease => "prerelease",
        }
    }

    /// Compute the version that follows `current` for this bump kind.
    ///
    /// Mirrors npm: `major`/`minor`/`patch` on a pre-release whose lower
    /// components are already zero only drop the pre-release tag, the
    /// `pre*` kinds start a fresh `<id>.0` series, and `prerelease`
    /// increments the trailing numeric identifier.
    pub fn apply(&self, current: &Version, pre_id: Option<&str>) -> Result<Version> {
        let mut next = Version {
            major: current.major,
            minor: current.minor,
            patch: current.patch,
            pre: Prerelease::EMPTY,
            build: BuildMetadata::EMPTY,
        };
        let has_pre = !current.pre.is_empty();

        match self {
            BumpKind::Major => {
                if current.minor != 0 || current.patch != 0 || !has_pre {
                    next.major += 1;
                }
                next.minor = 0;
                next.patch = 0;
                Ok(next)
            }
            BumpKind::Minor => {
                if current.patch != 0 || !has_pre {
                    next.minor += 1;
                }
                next.patch = 0;
                Ok(next)
            }
            BumpKind::Patch => {
                if !has_pre {
                    next.patch += 1;
                }
                Ok(next)
            }
            BumpKind::PreMajor => {
                next.major += 1;
                next.minor = 0;
                next.patch = 0;
                next.pre = next_prerelease(&[], pre_id)?;
                Ok(next)
            }
            BumpKind::PreMinor => {
                next.minor += 1;
                next.patch = 0;
                next.pre = next_prerelease(&[], pre_id)?;
                Ok(next)
            }
            BumpKind::PrePatch => {
                next.patch += 1;
                next.pre = next_prerelease(&[], pre_id)?;
                Ok(next)
            }
            BumpKind::PreRelease => {
                if has_pre {
                    let parts: Vec<&str> = current.pre.as_str().split('.').collect();
                    next.pre = next_prerelease(&parts, pre_id)?;
                } else {
                    next.patch += 1;
                    next.pre = next_prerelease(&[], pre_id)?;
                }
                Ok(next)
            }
        }
    }
}

impl FromStr for BumpKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "major" => Ok(BumpKind::Major),
            "minor" => Ok(BumpKind::Minor),
            "patch" => Ok(BumpKind::Patch),
            "premajor" => Ok(BumpKind::PreMajor),
            "preminor" => Ok(BumpKind::PreMinor),
            "prepatch" => Ok(BumpKind::PrePatch),
            "prerelease" => Ok(BumpKind::PreRelease),
            other => Err(ValidationError::InvalidBumpKind {
                value: other.to_string(),
                allowed: allowed_list(),
            }),
        }
    }
}

impl fmt::Display for BumpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn allowed_list() -> String {
    let quoted: Vec<String> = RELEASES.iter().map(|r| format!("\"{}\"", r)).collect();
    format!("[{}]", quoted.join(","))
}

/// Increment a dot-separated pre-release the way npm's `pre` step does.
fn next_prerelease(current: &[&str], pre_id: Option<&str>) -> Result<Prerelease> {
    let mut parts: Vec<String> = if current.is_empty() {
        vec!["0".to_string()]
    } else {
        let mut parts: Vec<String> = current.iter().map(|p| p.to_string()).collect();
        match parts.iter().rposition(|p| p.parse::<u64>().is_ok()) {
            Some(idx) => {
                let n: u64 = parts[idx].parse().unwrap_or(0);
                parts[idx] = n.saturating_add(1).to_string();
            }
            None => parts.push("0".to_string()),
        }
        parts
    };

    if let Some(id) = pre_id.filter(|id| !id.is_empty()) {
        let restart = parts[0] != id
            || parts
                .get(1)
                .map_or(true, |second| second.parse::<u64>().is_err());
        if restart {
            parts = vec![id.to_string(), "0".to_string()];
        }
    }

    let joined = parts.join(".");
    Prerelease::new(&joined).map_err(|e| {
        ReleaseError::version(format!("Invalid pre-release identifier '{}': {}", joined, e))
    })
}

/// Decide whether a requested bump is well-formed.
///
/// An empty `pre_id` counts as absent, so `prerelease` accepts any
/// identifier while the other kinds accept only none.
pub fn validate(bump_kind: &str, pre_id: Option<&str>) -> std::result::Result<BumpKind, ValidationError> {
    let kind: BumpKind = bump_kind.parse()?;

    match pre_id {
        Some(id) if !id.is_empty() && kind != BumpKind::PreRelease => {
            Err(ValidationError::PreIdWithoutPrerelease {
                bump_kind: bump_kind.to_string(),
                pre_id: id.to_string(),
            })
        }
        _ => Ok(kind),
    }
}

/// A validated request to publish one release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    bump_kind: BumpKind,
    pre_id: Option<String>,
    branch: String,
}

impl ReleaseRequest {
    /// Validate raw inputs and build the request.
    pub fn new(
        bump_kind: &str,
        pre_id: Option<&str>,
        branch: impl Into<String>,
    ) -> std::result::Result<Self, ValidationError> {
        let kind = validate(bump_kind, pre_id)?;
        Ok(ReleaseRequest {
            bump_kind: kind,
            pre_id: pre_id.filter(|id| !id.is_empty()).map(str::to_string),
            branch: branch.into(),
        })
    }

    pub fn bump_kind(&self) -> BumpKind {
        self.bump_kind
    }

    pub fn pre_id(&self) -> Option<&str> {
        self.pre_id.as_deref()
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }
}
