use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

use ci_release::bump::ReleaseRequest;
use ci_release::bumper::{ManifestBump, NpmVersion, VersionBumper};
use ci_release::ci::CiContext;
use ci_release::config::{load_config, BumpStrategy};
use ci_release::git::GitRepository;
use ci_release::pipeline::{PipelineOptions, ReleaseOutcome, ReleasePipeline};
use ci_release::process::SystemRunner;
use ci_release::telemetry::init_tracing;
use ci_release::ui;

const DEFAULT_BRANCH: &str = "release";

#[derive(clap::Parser)]
#[command(
    name = "ci-release",
    about = "Build, version and push a release branch from CI"
)]
struct Args {
    #[arg(long, env = "INPUT_BRANCH", help = "Release branch [default: release]")]
    branch: Option<String>,

    #[arg(
        long = "version",
        env = "INPUT_VERSION",
        help = "Bump kind: major, minor, patch, premajor, preminor, prepatch or prerelease"
    )]
    bump: String,

    #[arg(long, env = "INPUT_PRE-ID", help = "Prerelease identifier, e.g. beta")]
    pre_id: Option<String>,

    #[arg(short, long, env = "INPUT_CONFIG", help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(long, default_value = ".", help = "Working copy to release")]
    workdir: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(Level::INFO);
    let ci = CiContext::from_env();

    match release(&args, &ci) {
        Ok(outcome) => {
            ui::display_outcome(&outcome);
            ExitCode::SUCCESS
        }
        Err(e) => {
            ui::display_error(&e.to_string(), ci.github_actions);
            ExitCode::FAILURE
        }
    }
}

fn release(args: &Args, ci: &CiContext) -> Result<ReleaseOutcome> {
    // Validate before touching the repository
    let branch = non_empty(args.branch.as_deref()).unwrap_or(DEFAULT_BRANCH);
    let request = ReleaseRequest::new(&args.bump, args.pre_id.as_deref(), branch)?;

    let config = load_config(non_empty(args.config.as_deref()), &args.workdir)?;

    let vcs = GitRepository::open(&args.workdir)?.with_identity(config.git.identity());
    let runner = SystemRunner::new(vcs.workdir());

    let bumper: Box<dyn VersionBumper + '_> = match config.bump.strategy {
        BumpStrategy::Npm => Box::new(
            NpmVersion::new(&runner)
                .allow_dirty(config.bump.allow_dirty)
                .tag_prefix(config.bump.tag_prefix.as_str()),
        ),
        BumpStrategy::Manifest => Box::new(
            ManifestBump::new(&vcs, vcs.workdir().join(&config.bump.manifest))
                .tag_prefix(config.bump.tag_prefix.as_str()),
        ),
    };
    let reporter = ui::reporter_for(ci.github_actions);

    let mut pipeline = ReleasePipeline::new(
        &vcs,
        &runner,
        bumper.as_ref(),
        reporter.as_ref(),
        PipelineOptions::from(&config.pipeline),
    );
    Ok(pipeline.run(&request, ci)?)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
