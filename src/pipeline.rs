//! Release pipeline orchestration
//!
//! Runs the fixed sequence install → build → checkout → commit → push.
//! Every step runs inside a reporter group, must succeed before the next
//! one starts, and the first failure ends the run. Nothing is rolled back:
//! re-running from a clean checkout is the recovery path.

use crate::bump::{validate, ReleaseRequest};
use crate::bumper::{BumpOutcome, VersionBumper};
use crate::carrier::{ArtifactCarrier, ArtifactSnapshot};
use crate::ci::CiContext;
use crate::config::PipelineConfig;
use crate::error::{ReleaseError, Result};
use crate::git::Vcs;
use crate::process::{CommandRunner, CommandSpec};
use crate::step::StepExecutor;
use crate::ui::Reporter;
use semver::Version;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

/// The five steps of a release run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Install,
    Build,
    Checkout,
    Commit,
    Push,
}

impl Step {
    /// Group title shown in the CI log
    pub fn title(&self) -> &'static str {
        match self {
            Step::Install => "Installing dependencies",
            Step::Build => "Starting build",
            Step::Checkout => "Checking out release branch",
            Step::Commit => "Committing changes",
            Step::Push => "Pushing changes",
        }
    }

    /// State reached once this step succeeds
    fn completes(&self) -> PipelineState {
        match self {
            Step::Install => PipelineState::Installed,
            Step::Build => PipelineState::Built,
            Step::Checkout => PipelineState::CheckedOut,
            Step::Commit => PipelineState::Committed,
            Step::Push => PipelineState::Pushed,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Install => "install",
            Step::Build => "build",
            Step::Checkout => "checkout",
            Step::Commit => "commit",
            Step::Push => "push",
        };
        f.write_str(name)
    }
}

/// Progress of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Installed,
    Built,
    CheckedOut,
    Committed,
    Pushed,
    Done,
    /// Terminal; records the step that failed
    Failed(Step),
}

/// A failed run: the step that failed and why
#[derive(Error, Debug)]
#[error("{step} step failed: {source}")]
pub struct PipelineFailure {
    pub step: Step,
    pub source: ReleaseError,
}

/// Toggles and delegated commands for one pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub remote: String,
    /// `None` makes the install step a no-op
    pub install: Option<CommandSpec>,
    /// `None` makes the build a successful no-op
    pub build: Option<CommandSpec>,
    pub fetch_before_checkout: bool,
    pub carry_artifacts: bool,
    pub latest_tag: Option<String>,
    /// Commit message template; `{version}` is filled by the bumper, CI
    /// placeholders by [CiContext::render]
    pub commit_message: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineOptions {
    fn from(config: &PipelineConfig) -> Self {
        PipelineOptions {
            remote: config.remote.clone(),
            install: config.install_command(),
            build: config.build_command(),
            fetch_before_checkout: config.fetch_before_checkout,
            carry_artifacts: config.carry_artifacts,
            latest_tag: config.latest_tag().map(str::to_string),
            commit_message: config.commit_message().map(str::to_string),
        }
    }
}

/// What a successful run published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub branch: String,
    pub version: Version,
    pub tag: String,
    /// Id of the version commit
    pub commit: String,
    pub latest_tag: Option<String>,
}

struct Committed {
    bumped: BumpOutcome,
    commit: String,
}

pub struct ReleasePipeline<'a> {
    vcs: &'a dyn Vcs,
    runner: &'a dyn CommandRunner,
    bumper: &'a dyn VersionBumper,
    reporter: &'a dyn Reporter,
    options: PipelineOptions,
    state: PipelineState,
}

impl<'a> ReleasePipeline<'a> {
    pub fn new(
        vcs: &'a dyn Vcs,
        runner: &'a dyn CommandRunner,
        bumper: &'a dyn VersionBumper,
        reporter: &'a dyn Reporter,
        options: PipelineOptions,
    ) -> Self {
        ReleasePipeline {
            vcs,
            runner,
            bumper,
            reporter,
            options,
            state: PipelineState::Start,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// # Returns
    /// * `Ok(ReleaseOutcome)` - The release branch and tags were pushed
    /// * `Err(PipelineFailure)` - The failing step and its cause; the state is
    ///   left at [PipelineState::Failed]
    pub fn run(
        &mut self,
        request: &ReleaseRequest,
        ci: &CiContext,
    ) -> std::result::Result<ReleaseOutcome, PipelineFailure> {
        info!(
            branch = request.branch(),
            bump = %request.bump_kind(),
            pre_id = request.pre_id().unwrap_or(""),
            "starting release"
        );

        self.transition(Step::Install, |p| p.install())?;
        let snapshot = self.transition(Step::Build, |p| p.build())?;
        self.transition(Step::Checkout, |p| p.checkout(request.branch()))?;
        let committed = self.transition(Step::Commit, |p| p.commit(request, ci, snapshot))?;
        self.transition(Step::Push, |p| p.push(request.branch(), &committed.bumped))?;

        self.state = PipelineState::Done;
        let outcome = ReleaseOutcome {
            branch: request.branch().to_string(),
            version: committed.bumped.version,
            tag: committed.bumped.tag,
            commit: committed.commit,
            latest_tag: self.options.latest_tag.clone(),
        };
        info!(tag = %outcome.tag, commit = %outcome.commit, "release published");
        Ok(outcome)
    }

    fn transition<T>(
        &mut self,
        step: Step,
        action: impl FnOnce(&Self) -> Result<T>,
    ) -> std::result::Result<T, PipelineFailure> {
        let this: &Self = self;
        let result = StepExecutor::new(this.reporter).run(step.title(), || action(this));

        match result {
            Ok(value) => {
                self.state = step.completes();
                debug!(state = ?self.state, "transitioned");
                Ok(value)
            }
            Err(source) => {
                self.state = PipelineState::Failed(step);
                Err(PipelineFailure { step, source })
            }
        }
    }

    fn install(&self) -> Result<()> {
        match &self.options.install {
            Some(command) => self.runner.run(command),
            None => {
                debug!("no install command configured");
                Ok(())
            }
        }
    }

    fn build(&self) -> Result<ArtifactSnapshot> {
        match &self.options.build {
            Some(command) => self.runner.run(command)?,
            None => debug!("no build command configured"),
        }

        if self.options.carry_artifacts {
            ArtifactCarrier::new(self.vcs).capture()
        } else {
            Ok(ArtifactSnapshot::empty())
        }
    }

    fn checkout(&self, branch: &str) -> Result<()> {
        let remote = self.options.remote.as_str();
        if self.options.fetch_before_checkout {
            self.vcs.fetch(remote, branch)?;
        }
        if !self.vcs.branch_exists(remote, branch)? {
            return Err(ReleaseError::BranchNotFound {
                branch: branch.to_string(),
                remote: remote.to_string(),
            });
        }
        self.vcs.checkout(branch)
    }

    fn commit(
        &self,
        request: &ReleaseRequest,
        ci: &CiContext,
        snapshot: ArtifactSnapshot,
    ) -> Result<Committed> {
        ArtifactCarrier::new(self.vcs).restore(snapshot)?;

        // Requests are validated when built; checked again so staging never
        // starts for a request from another caller.
        validate(request.bump_kind().as_str(), request.pre_id())?;

        self.vcs.stage_all()?;
        let message = self
            .options
            .commit_message
            .as_deref()
            .map(|template| ci.render(template));
        let bumped = self.bumper.bump(request, message.as_deref())?;
        let commit = self.vcs.head_commit()?;

        if let Some(latest) = &self.options.latest_tag {
            self.vcs.tag(latest, None, true)?;
            let target = self.vcs.tag_target(latest)?;
            if target.as_deref() != Some(commit.as_str()) {
                return Err(ReleaseError::tag(format!(
                    "'{}' points at {} instead of version commit {}",
                    latest,
                    target.as_deref().unwrap_or("nothing"),
                    commit
                )));
            }
        }

        Ok(Committed { bumped, commit })
    }

    /// Refspecs for the branch, the version tag and the force-moved latest tag
    fn push_refspecs(&self, branch: &str, bumped: &BumpOutcome) -> Vec<String> {
        let mut refspecs = vec![
            format!("refs/heads/{0}:refs/heads/{0}", branch),
            format!("refs/tags/{0}:refs/tags/{0}", bumped.tag),
        ];
        if let Some(latest) = &self.options.latest_tag {
            refspecs.push(format!("+refs/tags/{0}:refs/tags/{0}", latest));
        }
        refspecs
    }

    fn push(&self, branch: &str, bumped: &BumpOutcome) -> Result<()> {
        let refspecs = self.push_refspecs(branch, bumped);
        self.vcs.push(&self.options.remote, &refspecs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bumper::NpmVersion;
    use crate::git::MockVcs;
    use crate::process::MockRunner;
    use crate::trace::CallTrace;
    use crate::ui::RecordingReporter;
    use std::rc::Rc;

    /// A runner whose `npm version` commits and tags on the mock repository,
    /// the way npm does on a real one.
    fn npm_runner(trace: &CallTrace, vcs: &Rc<MockVcs>, tag: &'static str) -> MockRunner {
        let vcs = Rc::clone(vcs);
        MockRunner::new(trace.clone()).on("npm version", move || {
            vcs.commit(tag.trim_start_matches('v'))?;
            vcs.tag(tag, Some(tag), false)?;
            Ok(format!("{}\n", tag))
        })
    }

    fn run(
        vcs: &MockVcs,
        runner: &MockRunner,
        trace: &CallTrace,
        options: PipelineOptions,
        request: &ReleaseRequest,
    ) -> (std::result::Result<ReleaseOutcome, PipelineFailure>, PipelineState) {
        let reporter = RecordingReporter::new(trace.clone());
        let npm = NpmVersion::new(runner);
        let mut pipeline = ReleasePipeline::new(vcs, runner, &npm, &reporter, options);
        let result = pipeline.run(request, &CiContext::default());
        (result, pipeline.state())
    }

    #[test]
    fn test_minor_release_visits_every_step() {
        let trace = CallTrace::new();
        let vcs = Rc::new(MockVcs::new(trace.clone()).with_remote_branch("release"));
        let runner = npm_runner(&trace, &vcs, "v1.3.0");
        vcs.write_file("dist/app.js", b"bundle");

        let request = ReleaseRequest::new("minor", None, "release").unwrap();
        let (result, state) = run(&vcs, &runner, &trace, PipelineOptions::default(), &request);
        let outcome = result.unwrap();

        assert_eq!(state, PipelineState::Done);
        assert_eq!(outcome.tag, "v1.3.0");
        assert_eq!(outcome.version, Version::new(1, 3, 0));
        assert_eq!(outcome.branch, "release");

        let commits = vcs.commits();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].branch, "release");
        assert_eq!(commits[0].files.get("dist/app.js").unwrap(), b"bundle");
        assert_eq!(outcome.commit, commits[0].id);
        assert_eq!(vcs.tag_target("latest").unwrap(), Some(commits[0].id.clone()));
        assert_eq!(vcs.tag_target("v1.3.0").unwrap(), Some(commits[0].id.clone()));

        assert_eq!(
            vcs.pushes(),
            vec![vec![
                "refs/heads/release:refs/heads/release".to_string(),
                "refs/tags/v1.3.0:refs/tags/v1.3.0".to_string(),
                "+refs/tags/latest:refs/tags/latest".to_string(),
            ]]
        );

        let order: Vec<usize> = [
            "group: Installing dependencies",
            "npm ci",
            "group: Starting build",
            "npm run --if-present build",
            "git stash push",
            "group: Checking out release branch",
            "git fetch origin release",
            "git checkout release",
            "group: Committing changes",
            "git checkout stash-",
            "npm version minor --force -m",
            "git tag --force latest",
            "group: Pushing changes",
            "git push --atomic origin",
        ]
        .iter()
        .map(|prefix| trace.position(prefix).unwrap_or_else(|| panic!("missing {}", prefix)))
        .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{:?}", trace.calls());
    }

    #[test]
    fn test_prerelease_passes_pre_id_to_npm() {
        let trace = CallTrace::new();
        let vcs = Rc::new(MockVcs::new(trace.clone()).with_remote_branch("release"));
        let runner = npm_runner(&trace, &vcs, "v1.3.0-beta.0");

        let request = ReleaseRequest::new("prerelease", Some("beta"), "release").unwrap();
        let (result, _) = run(&vcs, &runner, &trace, PipelineOptions::default(), &request);

        assert_eq!(result.unwrap().tag, "v1.3.0-beta.0");
        assert!(trace.contains("npm version prerelease --preid=beta"));
    }

    #[test]
    fn test_pre_id_with_patch_never_reaches_pipeline() {
        let err = ReleaseRequest::new("patch", Some("beta"), "release").unwrap_err();
        assert!(matches!(
            err,
            crate::error::ValidationError::PreIdWithoutPrerelease { .. }
        ));
    }

    #[test]
    fn test_build_failure_stops_before_checkout() {
        let trace = CallTrace::new();
        let vcs = MockVcs::new(trace.clone()).with_remote_branch("release");
        let runner = MockRunner::new(trace.clone()).fail("npm run");

        let request = ReleaseRequest::new("patch", None, "release").unwrap();
        let (result, state) = run(&vcs, &runner, &trace, PipelineOptions::default(), &request);

        let failure = result.unwrap_err();
        assert_eq!(failure.step, Step::Build);
        assert_eq!(state, PipelineState::Failed(Step::Build));
        assert!(failure.to_string().starts_with("build step failed: "));

        for never in ["git stash", "git fetch", "git checkout", "npm version", "git tag", "git push"] {
            assert!(!trace.contains(never), "{} ran after failed build", never);
        }
        assert_eq!(trace.calls().last().unwrap(), "endgroup");
    }

    #[test]
    fn test_missing_build_command_is_noop() {
        let trace = CallTrace::new();
        let vcs = Rc::new(MockVcs::new(trace.clone()).with_remote_branch("release"));
        let runner = npm_runner(&trace, &vcs, "v1.2.4");
        let options = PipelineOptions {
            build: None,
            ..PipelineOptions::default()
        };

        let request = ReleaseRequest::new("patch", None, "release").unwrap();
        let (result, state) = run(&vcs, &runner, &trace, options, &request);

        assert!(result.is_ok());
        assert_eq!(state, PipelineState::Done);
        assert!(!trace.contains("npm run"));
        assert!(trace.contains("git checkout release"));
        assert!(vcs.commits()[0].files.is_empty());
    }

    #[test]
    fn test_missing_release_branch() {
        let trace = CallTrace::new();
        let vcs = MockVcs::new(trace.clone());
        let runner = MockRunner::new(trace.clone());
        let options = PipelineOptions {
            fetch_before_checkout: false,
            ..PipelineOptions::default()
        };

        let request = ReleaseRequest::new("patch", None, "release").unwrap();
        let (result, state) = run(&vcs, &runner, &trace, options, &request);

        let failure = result.unwrap_err();
        assert_eq!(state, PipelineState::Failed(Step::Checkout));
        assert!(matches!(failure.source, ReleaseError::BranchNotFound { .. }));
        assert!(!trace.contains("git checkout"));
    }

    #[test]
    fn test_rerun_moves_latest_instead_of_duplicating() {
        let trace = CallTrace::new();
        let vcs = Rc::new(MockVcs::new(trace.clone()).with_remote_branch("release"));
        let request = ReleaseRequest::new("patch", None, "release").unwrap();

        let first = npm_runner(&trace, &vcs, "v1.2.4");
        run(&vcs, &first, &trace, PipelineOptions::default(), &request).0.unwrap();
        let second = npm_runner(&trace, &vcs, "v1.2.5");
        let outcome = run(&vcs, &second, &trace, PipelineOptions::default(), &request).0.unwrap();

        let tags = vcs.tags();
        assert_eq!(tags.keys().filter(|t| t.as_str() == "latest").count(), 1);
        assert_eq!(tags.len(), 3);
        assert_eq!(tags.get("latest"), Some(&outcome.commit));
        assert_eq!(tags.get("v1.2.5"), Some(&outcome.commit));
        assert_ne!(tags.get("v1.2.4"), Some(&outcome.commit));
    }

    #[test]
    fn test_plain_mode_skips_fetch_and_stash() {
        let trace = CallTrace::new();
        let vcs = Rc::new(MockVcs::new(trace.clone()));
        let runner = npm_runner(&trace, &vcs, "v2.0.0");
        let options = PipelineOptions {
            install: None,
            fetch_before_checkout: false,
            carry_artifacts: false,
            latest_tag: None,
            commit_message: None,
            ..PipelineOptions::default()
        };

        let request = ReleaseRequest::new("major", None, "main").unwrap();
        let (result, _) = run(&vcs, &runner, &trace, options, &request);
        let outcome = result.unwrap();

        assert_eq!(outcome.latest_tag, None);
        assert!(!trace.contains("git fetch"));
        assert!(!trace.contains("git stash"));
        assert!(trace.contains("npm version major --force"));
        assert!(!trace.contains("npm version major --force -m"));
        assert_eq!(vcs.pushes()[0].len(), 2);
    }

    #[test]
    fn test_commit_message_renders_ci_context() {
        let trace = CallTrace::new();
        let vcs = Rc::new(MockVcs::new(trace.clone()).with_remote_branch("release"));
        let runner = npm_runner(&trace, &vcs, "v1.0.0");
        let reporter = RecordingReporter::new(trace.clone());
        let npm = NpmVersion::new(&runner);
        let ci = CiContext::from_vars(vec![
            ("GITHUB_REPOSITORY", "acme/widgets"),
            ("GITHUB_RUN_ID", "99"),
        ]);

        let request = ReleaseRequest::new("major", None, "release").unwrap();
        let mut pipeline =
            ReleasePipeline::new(&*vcs, &runner, &npm, &reporter, PipelineOptions::default());
        pipeline.run(&request, &ci).unwrap();

        assert!(trace.contains(
            r#"npm version major --force -m "Release %s\n\nBuilt by acme/widgets run 99""#
        ));
    }

    #[test]
    fn test_push_failure_leaves_local_commit() {
        let trace = CallTrace::new();
        let vcs = Rc::new(
            MockVcs::new(trace.clone())
                .with_remote_branch("release")
                .fail_on("git push"),
        );
        let runner = npm_runner(&trace, &vcs, "v1.2.4");

        let request = ReleaseRequest::new("patch", None, "release").unwrap();
        let (result, state) = run(&vcs, &runner, &trace, PipelineOptions::default(), &request);

        assert_eq!(result.unwrap_err().step, Step::Push);
        assert_eq!(state, PipelineState::Failed(Step::Push));
        assert_eq!(vcs.commits().len(), 1);
        assert!(vcs.pushes().is_empty());
    }
}
