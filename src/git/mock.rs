use crate::error::{ReleaseError, Result};
use crate::git::Vcs;
use crate::trace::CallTrace;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// File contents keyed by path
pub type Files = BTreeMap<String, Vec<u8>>;

/// A commit held by [MockVcs]
#[derive(Debug, Clone, PartialEq)]
pub struct MockCommit {
    pub id: String,
    pub branch: String,
    pub message: String,
    /// Changes introduced by this commit
    pub files: Files,
}

#[derive(Debug, Default)]
struct State {
    current: String,
    local_branches: BTreeSet<String>,
    remote_branches: BTreeSet<String>,
    tracking: BTreeSet<String>,
    heads: BTreeMap<String, String>,
    worktree: Files,
    stash: Vec<(String, Files)>,
    commits: Vec<MockCommit>,
    tags: BTreeMap<String, String>,
    pushes: Vec<Vec<String>>,
    next_id: usize,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

/// Mock repository for testing the pipeline without a real working copy
///
/// Mutating operations are recorded in a [CallTrace] using the git command
/// line they stand for (`git checkout release`, `git stash drop`, ...).
/// Reads are not recorded.
pub struct MockVcs {
    trace: CallTrace,
    state: RefCell<State>,
    failures: Vec<String>,
}

impl MockVcs {
    /// Create a repository checked out on `main` with one root commit
    pub fn new(trace: CallTrace) -> Self {
        let mut state = State {
            current: "main".to_string(),
            ..State::default()
        };
        state.local_branches.insert("main".to_string());
        state.heads.insert("main".to_string(), "root-main".to_string());

        MockVcs {
            trace,
            state: RefCell::new(state),
            failures: Vec::new(),
        }
    }

    /// Add a branch that exists only on the remote until fetched
    pub fn with_remote_branch(self, branch: &str) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.remote_branches.insert(branch.to_string());
            state
                .heads
                .insert(branch.to_string(), format!("root-{}", branch));
        }
        self
    }

    /// Fail every recorded operation whose command line starts with `prefix`
    pub fn fail_on(mut self, prefix: impl Into<String>) -> Self {
        self.failures.push(prefix.into());
        self
    }

    /// Write an uncommitted file, as a build would
    pub fn write_file(&self, path: &str, contents: &[u8]) {
        self.state
            .borrow_mut()
            .worktree
            .insert(path.to_string(), contents.to_vec());
    }

    /// Uncommitted changes in the working tree
    pub fn worktree(&self) -> Files {
        self.state.borrow().worktree.clone()
    }

    pub fn current_branch(&self) -> String {
        self.state.borrow().current.clone()
    }

    pub fn commits(&self) -> Vec<MockCommit> {
        self.state.borrow().commits.clone()
    }

    pub fn tags(&self) -> BTreeMap<String, String> {
        self.state.borrow().tags.clone()
    }

    pub fn stash_len(&self) -> usize {
        self.state.borrow().stash.len()
    }

    /// Refspec lists of every successful push
    pub fn pushes(&self) -> Vec<Vec<String>> {
        self.state.borrow().pushes.clone()
    }

    fn record(&self, line: String) -> Result<()> {
        self.trace.record(line.clone());
        if self.failures.iter().any(|f| line.starts_with(f.as_str())) {
            return Err(ReleaseError::CommandFailed {
                command: line,
                status: "exit status: 1".to_string(),
                stderr: String::new(),
            });
        }
        Ok(())
    }
}

impl Vcs for MockVcs {
    fn fetch(&self, remote: &str, branch: &str) -> Result<()> {
        self.record(format!("git fetch {} {}", remote, branch))?;
        let mut state = self.state.borrow_mut();
        if !state.remote_branches.contains(branch) && !state.local_branches.contains(branch) {
            return Err(ReleaseError::CommandFailed {
                command: format!("git fetch {} {}", remote, branch),
                status: "exit status: 128".to_string(),
                stderr: format!("fatal: couldn't find remote ref {}", branch),
            });
        }
        if state.remote_branches.contains(branch) {
            state.tracking.insert(branch.to_string());
        }
        Ok(())
    }

    fn branch_exists(&self, _remote: &str, branch: &str) -> Result<bool> {
        let state = self.state.borrow();
        Ok(state.local_branches.contains(branch) || state.tracking.contains(branch))
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        self.record(format!("git checkout {}", branch))?;
        let mut state = self.state.borrow_mut();
        if !state.local_branches.contains(branch) && !state.tracking.contains(branch) {
            return Err(ReleaseError::CommandFailed {
                command: format!("git checkout {}", branch),
                status: "exit status: 1".to_string(),
                stderr: format!("error: pathspec '{}' did not match", branch),
            });
        }
        state.local_branches.insert(branch.to_string());
        state.current = branch.to_string();
        Ok(())
    }

    fn stage_all(&self) -> Result<()> {
        self.record("git add --all".to_string())
    }

    fn stash_top(&self) -> Result<Option<String>> {
        Ok(self.state.borrow().stash.last().map(|(id, _)| id.clone()))
    }

    fn stash_push(&self, message: &str) -> Result<()> {
        self.record(format!("git stash push --message {}", message))?;
        let mut state = self.state.borrow_mut();
        if state.worktree.is_empty() {
            return Ok(());
        }
        let id = state.next_id("stash");
        let files = std::mem::take(&mut state.worktree);
        state.stash.push((id, files));
        Ok(())
    }

    fn stash_restore(&self, stash_id: &str) -> Result<()> {
        let paths: Vec<String> = {
            let state = self.state.borrow();
            match state.stash.last() {
                Some((id, files)) if id == stash_id => files.keys().cloned().collect(),
                _ => {
                    return Err(ReleaseError::snapshot(format!(
                        "stash entry {} is not the newest entry",
                        stash_id
                    )))
                }
            }
        };
        self.record(format!("git checkout {} -- {}", stash_id, paths.join(" ")))?;
        self.record("git stash drop --quiet stash@{0}".to_string())?;

        let mut state = self.state.borrow_mut();
        if let Some((_, files)) = state.stash.pop() {
            state.worktree.extend(files);
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.record(format!("git commit --message {}", message))?;
        let mut state = self.state.borrow_mut();
        let id = state.next_id("commit");
        let branch = state.current.clone();
        let files = std::mem::take(&mut state.worktree);
        state.commits.push(MockCommit {
            id: id.clone(),
            branch: branch.clone(),
            message: message.to_string(),
            files,
        });
        state.heads.insert(branch, id);
        Ok(())
    }

    fn tag(&self, name: &str, annotation: Option<&str>, force: bool) -> Result<()> {
        let mut line = String::from("git tag");
        if force {
            line.push_str(" --force");
        }
        if annotation.is_some() {
            line.push_str(" --annotate");
        }
        line.push(' ');
        line.push_str(name);
        self.record(line)?;

        let mut state = self.state.borrow_mut();
        if state.tags.contains_key(name) && !force {
            return Err(ReleaseError::tag(format!("tag '{}' already exists", name)));
        }
        let head = state
            .heads
            .get(&state.current)
            .cloned()
            .ok_or_else(|| ReleaseError::tag("HEAD has no commit"))?;
        state.tags.insert(name.to_string(), head);
        Ok(())
    }

    fn head_commit(&self) -> Result<String> {
        let state = self.state.borrow();
        state
            .heads
            .get(&state.current)
            .cloned()
            .ok_or_else(|| ReleaseError::tag("HEAD has no commit"))
    }

    fn tag_target(&self, name: &str) -> Result<Option<String>> {
        Ok(self.state.borrow().tags.get(name).cloned())
    }

    fn push(&self, remote: &str, refspecs: &[String]) -> Result<()> {
        self.record(format!("git push --atomic {} {}", remote, refspecs.join(" ")))?;
        self.state.borrow_mut().pushes.push(refspecs.to_vec());
        Ok(())
    }
}
