//! Version-control operations abstraction layer
//!
//! The pipeline never talks to git directly. It calls the primitive
//! operations of the [Vcs] trait, each of which either succeeds or fails
//! with the delegated command's own error.
//!
//! # Overview
//!
//! - [repository::GitRepository]: mutations through the `git` CLI (so the CI
//!   job's credential helpers and hooks apply), reads through `git2`
//! - [mock::MockVcs]: an in-memory repository for pipeline tests
//!
//! # Usage
//!
//! ```rust
//! # use ci_release::git::Vcs;
//! # fn example(vcs: &dyn Vcs) -> ci_release::Result<()> {
//! vcs.fetch("origin", "release")?;
//! if vcs.branch_exists("origin", "release")? {
//!     vcs.checkout("release")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::MockVcs;
pub use repository::{GitRepository, Identity};

use crate::error::Result;

/// Primitive git operations consumed by the release pipeline
///
/// ## Ownership
///
/// The pipeline owns the working tree and index for its whole run, and calls
/// these operations strictly one after another. Implementors therefore need
/// not be `Send` or `Sync`.
///
/// ## Error Handling
///
/// Failures of delegated `git` invocations surface as
/// [crate::error::ReleaseError::CommandFailed] carrying the command line,
/// exit status and stderr. Failed reads surface as
/// [crate::error::ReleaseError::Git].
pub trait Vcs {
    /// Fetch a single branch from a remote
    ///
    /// Updates the remote-tracking ref `refs/remotes/<remote>/<branch>`.
    ///
    /// # Arguments
    /// * `remote` - Name of the remote (e.g., "origin")
    /// * `branch` - Name of the branch to fetch (e.g., "release")
    fn fetch(&self, remote: &str, branch: &str) -> Result<()>;

    /// Whether `branch` exists locally or as a remote-tracking ref of `remote`
    fn branch_exists(&self, remote: &str, branch: &str) -> Result<bool>;

    /// Switch the working tree to `branch`
    ///
    /// Uncommitted changes that do not conflict are carried along; a
    /// conflicting switch fails without touching the working tree.
    fn checkout(&self, branch: &str) -> Result<()>;

    /// Stage every change in the working tree, including new and deleted files
    fn stage_all(&self) -> Result<()>;

    /// Object id of the newest stash entry, if any
    fn stash_top(&self) -> Result<Option<String>>;

    /// Move all uncommitted changes onto the stash
    ///
    /// A clean working tree is not an error; no entry is created.
    fn stash_push(&self, message: &str) -> Result<()>;

    /// Write a stash entry's changes over the working tree and index, then drop it
    ///
    /// Every path the entry changed ends up byte-identical to the entry,
    /// and every path it deleted is removed, whatever the current branch
    /// holds there. Nothing is merged.
    ///
    /// # Arguments
    /// * `stash_id` - Object id of the entry; it must be the newest one
    ///
    /// # Returns
    /// * `Ok(())` - Changes written and entry dropped
    /// * `Err` - The entry is missing or not the newest (the stash is left as is)
    fn stash_restore(&self, stash_id: &str) -> Result<()>;

    /// Commit the staged changes on the current branch
    fn commit(&self, message: &str) -> Result<()>;

    /// Point tag `name` at HEAD
    ///
    /// # Arguments
    /// * `name` - Tag name (e.g., "v1.3.0", "latest")
    /// * `annotation` - Message for an annotated tag; `None` creates a lightweight tag
    /// * `force` - Move the tag when it already exists instead of failing
    fn tag(&self, name: &str, annotation: Option<&str>, force: bool) -> Result<()>;

    /// Full object id of the commit at HEAD
    fn head_commit(&self) -> Result<String>;

    /// Commit a tag points at, peeling annotated tags
    ///
    /// # Returns
    /// * `Ok(Some(id))` - The tag exists
    /// * `Ok(None)` - No such tag
    fn tag_target(&self, name: &str) -> Result<Option<String>>;

    /// Push refspecs to a remote as one atomic transaction
    ///
    /// Either every ref is updated on the remote or none is. Refspecs
    /// prefixed with `+` are force-updated.
    fn push(&self, remote: &str, refspecs: &[String]) -> Result<()>;
}
