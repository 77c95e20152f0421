//! Carries uncommitted build output across the switch to the release branch
//!
//! The build runs on whatever ref the CI job checked out, but the release
//! commit lands on the release branch. The build output is staged and moved
//! onto the stash before the checkout, then written back afterwards. The
//! restore overwrites rather than merges, so the release commit holds exactly
//! what the build produced even when the release branch has older output.

use crate::error::{ReleaseError, Result};
use crate::git::Vcs;
use tracing::{debug, info};

const STASH_MESSAGE: &str = "ci-release build artifacts";

/// Build output held on the stash between the build and commit steps
///
/// Restoring consumes the snapshot, so it cannot be applied twice.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a captured snapshot must be restored or the build output is lost"]
pub struct ArtifactSnapshot {
    stash_id: Option<String>,
}

impl ArtifactSnapshot {
    /// A snapshot holding no changes
    pub fn empty() -> Self {
        ArtifactSnapshot { stash_id: None }
    }

    pub fn is_empty(&self) -> bool {
        self.stash_id.is_none()
    }

    /// Id of the stash entry holding the artifacts
    pub fn stash_id(&self) -> Option<&str> {
        self.stash_id.as_deref()
    }
}

pub struct ArtifactCarrier<'a> {
    vcs: &'a dyn Vcs,
}

impl<'a> ArtifactCarrier<'a> {
    pub fn new(vcs: &'a dyn Vcs) -> Self {
        ArtifactCarrier { vcs }
    }

    /// Stage all working-tree changes and move them onto the stash.
    ///
    /// A clean working tree yields an empty snapshot.
    pub fn capture(&self) -> Result<ArtifactSnapshot> {
        self.vcs.stage_all()?;
        let before = self.vcs.stash_top()?;
        self.vcs.stash_push(STASH_MESSAGE)?;
        let after = self.vcs.stash_top()?;

        if after.is_none() || after == before {
            debug!("build produced no changes to carry");
            return Ok(ArtifactSnapshot::empty());
        }

        info!(stash = ?after, "captured build artifacts");
        Ok(ArtifactSnapshot { stash_id: after })
    }

    /// Reapply a snapshot onto the current branch and stage the result.
    ///
    /// Staging happens for empty snapshots too. Fails when the snapshot is no
    /// longer the newest stash entry or cannot be written back.
    pub fn restore(&self, snapshot: ArtifactSnapshot) -> Result<()> {
        if let Some(expected) = snapshot.stash_id {
            let top = self.vcs.stash_top()?;
            if top.as_deref() != Some(expected.as_str()) {
                return Err(ReleaseError::snapshot(format!(
                    "stash entry {} is no longer the newest entry (found {})",
                    expected,
                    top.as_deref().unwrap_or("no entries")
                )));
            }

            self.vcs.stash_restore(&expected).map_err(|e| {
                ReleaseError::snapshot(format!(
                    "could not reapply build artifacts from {}: {}",
                    expected, e
                ))
            })?;
            info!(stash = %expected, "restored build artifacts");
        }

        self.vcs.stage_all()
    }
}
