use crate::error::{ReleaseError, Result};
use crate::git::Vcs;
use git2::{BranchType, Delta, ErrorCode, Oid, Repository as Git2Repo};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

/// Paths passed to a single `git checkout`/`git rm` invocation
const PATH_BATCH: usize = 256;

/// Paths a stash entry changed relative to the commit it was taken on
#[derive(Debug, Default, PartialEq, Eq)]
struct StashChanges {
    written: Vec<String>,
    removed: Vec<String>,
}

/// Committer identity injected into git invocations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// A working copy driven through the `git` CLI and inspected through `git2`
pub struct GitRepository {
    repo: Git2Repo,
    workdir: PathBuf,
    identity: Option<Identity>,
}

impl GitRepository {
    /// Open or discover the repository containing `path`
    ///
    /// # Returns
    /// * `Ok(GitRepository)` - Repository with a working tree
    /// * `Err` - Not inside a repository, or the repository is bare
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Git2Repo::discover(path)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| ReleaseError::config("Repository has no working tree"))?
            .to_path_buf();

        Ok(GitRepository {
            repo,
            workdir,
            identity: None,
        })
    }

    /// Commit, tag and stash as `identity` instead of the configured user
    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Create a git command bound to the working tree
    ///
    /// - Runs with `-C <workdir>`
    /// - Silences detached-HEAD advice and path quoting
    /// - Adds the committer identity when one is configured
    fn git_cmd(&self) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.workdir);
        cmd.arg("-c").arg("advice.detachedHead=false");
        cmd.arg("-c").arg("core.quotePath=false");
        if let Some(identity) = &self.identity {
            cmd.arg("-c").arg(format!("user.name={}", identity.name));
            cmd.arg("-c").arg(format!("user.email={}", identity.email));
        }
        cmd
    }

    fn git(&self, args: &[&str]) -> Result<String> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, "running");

        let output = self
            .git_cmd()
            .args(args)
            .output()
            .map_err(|source| ReleaseError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
            // stash and merge report conflicts on stdout
            if stderr.trim().is_empty() {
                stderr = stdout;
            }
            return Err(ReleaseError::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr,
            });
        }

        if !stdout.trim().is_empty() {
            debug!(%command, output = %stdout.trim(), "git output");
        }
        Ok(stdout)
    }

    fn is_checked_out(&self, branch: &str) -> bool {
        match self.repo.head() {
            Ok(head) => head.is_branch() && head.shorthand() == Some(branch),
            Err(_) => false,
        }
    }

    /// Fast-forward a local branch to its freshly fetched remote counterpart.
    ///
    /// Leaves the branch alone when it is checked out, missing, already up
    /// to date or diverged from the remote.
    fn fast_forward(&self, remote: &str, branch: &str) -> Result<()> {
        let remote_ref = format!("refs/remotes/{}/{}", remote, branch);
        let remote_oid = match self.repo.refname_to_id(&remote_ref) {
            Ok(oid) => oid,
            Err(_) => return Ok(()),
        };

        let local = match self.repo.find_branch(branch, BranchType::Local) {
            Ok(b) => b,
            Err(_) => return Ok(()),
        };
        let local_oid = match local.get().target() {
            Some(oid) => oid,
            None => return Ok(()),
        };

        if local_oid == remote_oid {
            return Ok(());
        }

        if self.is_checked_out(branch) {
            warn!(branch, "release branch is checked out; not fast-forwarding it");
            return Ok(());
        }

        if !self.repo.graph_descendant_of(remote_oid, local_oid)? {
            warn!(branch, "local release branch has diverged from {}", remote_ref);
            return Ok(());
        }

        let mut reference = local.into_reference();
        reference.set_target(remote_oid, &format!("fast-forward from {}", remote_ref))?;
        debug!(branch, to = %remote_oid, "fast-forwarded local branch");
        Ok(())
    }

    /// Diff a stash entry's tree against its base commit.
    ///
    /// Every change is staged before stashing, so the entry's own tree
    /// holds new files as well; no untracked-files parent is involved.
    fn stash_changes(&self, stash_id: &str) -> Result<StashChanges> {
        let stash = self.repo.find_commit(Oid::from_str(stash_id)?)?;
        let base = stash.parent(0)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&base), Some(&stash.tree()?), None)?;

        let mut changes = StashChanges::default();
        for delta in diff.deltas() {
            let (file, paths) = match delta.status() {
                Delta::Deleted => (delta.old_file(), &mut changes.removed),
                _ => (delta.new_file(), &mut changes.written),
            };
            let path = file.path().and_then(Path::to_str).ok_or_else(|| {
                ReleaseError::snapshot(format!("stash entry {} holds a non UTF-8 path", stash_id))
            })?;
            paths.push(path.to_string());
        }
        Ok(changes)
    }

    fn oid_of(&self, refname: &str) -> Result<Option<Oid>> {
        match self.repo.refname_to_id(refname) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Vcs for GitRepository {
    fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        self.git(&["fetch", remote, branch])?;
        self.fast_forward(remote, branch)
    }

    fn branch_exists(&self, remote: &str, branch: &str) -> Result<bool> {
        if self.repo.find_branch(branch, BranchType::Local).is_ok() {
            return Ok(true);
        }
        let tracking = format!("refs/remotes/{}/{}", remote, branch);
        Ok(self.oid_of(&tracking)?.is_some())
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.git(&["checkout", branch]).map(|_| ())
    }

    fn stage_all(&self) -> Result<()> {
        self.git(&["add", "--all"]).map(|_| ())
    }

    fn stash_top(&self) -> Result<Option<String>> {
        Ok(self.oid_of("refs/stash")?.map(|oid| oid.to_string()))
    }

    fn stash_push(&self, message: &str) -> Result<()> {
        self.git(&["stash", "push", "--message", message]).map(|_| ())
    }

    fn stash_restore(&self, stash_id: &str) -> Result<()> {
        if self.stash_top()?.as_deref() != Some(stash_id) {
            return Err(ReleaseError::snapshot(format!(
                "stash entry {} is not the newest entry",
                stash_id
            )));
        }

        let changes = self.stash_changes(stash_id)?;
        for batch in changes.written.chunks(PATH_BATCH) {
            let mut args = vec!["--literal-pathspecs", "checkout", stash_id, "--"];
            args.extend(batch.iter().map(String::as_str));
            self.git(&args)?;
        }
        for batch in changes.removed.chunks(PATH_BATCH) {
            let mut args = vec![
                "--literal-pathspecs",
                "rm",
                "--quiet",
                "--force",
                "--ignore-unmatch",
                "--",
            ];
            args.extend(batch.iter().map(String::as_str));
            self.git(&args)?;
        }
        debug!(
            stash = stash_id,
            written = changes.written.len(),
            removed = changes.removed.len(),
            "wrote stash entry over working tree"
        );

        self.git(&["stash", "drop", "--quiet", "stash@{0}"]).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.git(&["commit", "--message", message]).map(|_| ())
    }

    fn tag(&self, name: &str, annotation: Option<&str>, force: bool) -> Result<()> {
        let mut args = vec!["tag"];
        if force {
            args.push("--force");
        }
        if let Some(message) = annotation {
            args.extend(["--annotate", "--message", message]);
        }
        args.push(name);
        self.git(&args).map(|_| ())
    }

    fn head_commit(&self) -> Result<String> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    fn tag_target(&self, name: &str) -> Result<Option<String>> {
        let refname = format!("refs/tags/{}", name);
        match self.repo.find_reference(&refname) {
            Ok(reference) => {
                let commit = reference.peel_to_commit().map_err(|e| {
                    ReleaseError::tag(format!("Cannot peel tag '{}': {}", name, e))
                })?;
                Ok(Some(commit.id().to_string()))
            }
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(ReleaseError::tag(format!(
                "Cannot find tag '{}': {}",
                name, e
            ))),
        }
    }

    fn push(&self, remote: &str, refspecs: &[String]) -> Result<()> {
        let mut args = vec!["push", "--atomic", remote];
        args.extend(refspecs.iter().map(String::as_str));
        self.git(&args).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_outside_repository_fails() {
        let dir = TempDir::new().unwrap();
        assert!(GitRepository::open(dir.path()).is_err());
    }

    #[test]
    fn test_open_bare_repository_fails() {
        let dir = TempDir::new().unwrap();
        Git2Repo::init_bare(dir.path()).unwrap();
        let err = GitRepository::open(dir.path()).err().unwrap();
        assert!(err.to_string().contains("no working tree"));
    }

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn repo_with_file(path: &str, contents: &str) -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        Git2Repo::init(dir.path()).unwrap();
        let repo = GitRepository::open(dir.path()).unwrap().with_identity(Some(Identity {
            name: "Test".to_string(),
            email: "test@example.com".to_string(),
        }));
        repo.git(&["symbolic-ref", "HEAD", "refs/heads/main"]).unwrap();
        write(dir.path(), path, contents);
        repo.stage_all().unwrap();
        repo.commit("base").unwrap();
        (dir, repo)
    }

    fn write(root: &Path, path: &str, contents: &str) {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, contents).unwrap();
    }

    fn read(root: &Path, path: &str) -> String {
        std::fs::read_to_string(root.join(path)).unwrap()
    }

    #[test]
    fn test_stash_restore_overwrites_instead_of_merging() {
        if !git_available() {
            return;
        }
        let (dir, repo) = repo_with_file("dist/app.js", "l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\n");

        // the release branch holds an older build that changed line 1
        repo.git(&["checkout", "-b", "release"]).unwrap();
        write(dir.path(), "dist/app.js", "B1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\n");
        repo.stage_all().unwrap();
        repo.commit("older build").unwrap();
        repo.checkout("main").unwrap();

        // a new build on main changes line 8 only
        write(dir.path(), "dist/app.js", "l1\nl2\nl3\nl4\nl5\nl6\nl7\nB2\n");
        repo.stage_all().unwrap();
        repo.stash_push("artifacts").unwrap();
        let id = repo.stash_top().unwrap().unwrap();

        repo.checkout("release").unwrap();
        repo.stash_restore(&id).unwrap();

        assert_eq!(
            read(dir.path(), "dist/app.js"),
            "l1\nl2\nl3\nl4\nl5\nl6\nl7\nB2\n"
        );
        assert_eq!(repo.stash_top().unwrap(), None);
    }

    #[test]
    fn test_stash_restore_over_untracked_on_base() {
        if !git_available() {
            return;
        }
        let (dir, repo) = repo_with_file("package.json", "{}\n");
        write(dir.path(), "old.txt", "stale\n");
        repo.stage_all().unwrap();
        repo.commit("with old file").unwrap();

        repo.git(&["checkout", "-b", "release"]).unwrap();
        write(dir.path(), "dist/app.js", "built\n");
        repo.stage_all().unwrap();
        repo.commit("first release").unwrap();
        repo.checkout("main").unwrap();

        // dist/ is new relative to main, old.txt is removed by the build
        write(dir.path(), "dist/app.js", "rebuilt\n");
        std::fs::remove_file(dir.path().join("old.txt")).unwrap();
        repo.stage_all().unwrap();
        repo.stash_push("artifacts").unwrap();
        let id = repo.stash_top().unwrap().unwrap();

        repo.checkout("release").unwrap();
        repo.stash_restore(&id).unwrap();

        assert_eq!(read(dir.path(), "dist/app.js"), "rebuilt\n");
        assert!(!dir.path().join("old.txt").exists());
    }

    #[test]
    fn test_stash_restore_rejects_entry_below_top() {
        if !git_available() {
            return;
        }
        let (dir, repo) = repo_with_file("a.txt", "a\n");
        write(dir.path(), "a.txt", "ours\n");
        repo.stash_push("artifacts").unwrap();
        let ours = repo.stash_top().unwrap().unwrap();
        write(dir.path(), "a.txt", "theirs\n");
        repo.stash_push("someone else").unwrap();

        let err = repo.stash_restore(&ours).unwrap_err();
        assert!(matches!(err, ReleaseError::Snapshot(_)));
        assert_ne!(repo.stash_top().unwrap().as_deref(), Some(ours.as_str()));
        assert_eq!(read(dir.path(), "a.txt"), "a\n");
    }

    #[test]
    fn test_reads_on_empty_repository() {
        let dir = TempDir::new().unwrap();
        Git2Repo::init(dir.path()).unwrap();
        let repo = GitRepository::open(dir.path()).unwrap();

        assert_eq!(repo.stash_top().unwrap(), None);
        assert_eq!(repo.tag_target("latest").unwrap(), None);
        assert!(!repo.branch_exists("origin", "release").unwrap());
        assert!(repo.head_commit().is_err());
    }
}
