use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Packship CLI – derive package exports, patch dist manifests, and automate publishing
#[derive(Debug, Parser)]
#[command(name = "packship", version, about, long_about = None)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Derive the build dir's package.json from the source tree
    Build(BuildArgs),

    /// Prepare an already-compiled dist directory for publishing
    FillDist(FillDistArgs),

    /// Publish the package (commit, registry publish, tag, release)
    Publish(PublishArgs),
}

#[derive(Debug, Args, Default)]
pub struct BuildArgs {
    /// Project root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Build output directory name (defaults to the configured one)
    #[arg(long)]
    pub build_dir: Option<String>,

    /// Source directory name (defaults to the configured one)
    #[arg(long)]
    pub src_dir: Option<String>,
}

#[derive(Debug, Args, Default)]
pub struct FillDistArgs {
    /// Project root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Build output directory name (defaults to the configured one)
    #[arg(long)]
    pub build_dir: Option<String>,

    /// Value for the dist manifest's bin field
    #[arg(long)]
    pub bin: Option<String>,

    /// Module names excluded from the generated exports
    #[arg(long, num_args = 1.., value_name = "MODULE")]
    pub ignore: Vec<String>,
}

#[derive(Debug, Args, Default)]
#[command(after_long_help = "\
Examples:\n  packship publish --branch main\n  packship publish --open-dist-dir -- --access public\n\nBehavior:\n  - Skips the whole run when the current version already exists on the registry (exit 0).\n  - Commits and pushes working-tree changes, publishes, then tags; a tag failure never rolls back the publish.\n\nAll arguments after `--` are forwarded to the underlying publish command (separator required).")]
pub struct PublishArgs {
    /// Project root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Publish from the build dir instead of the project root
    #[arg(long)]
    pub open_dist_dir: bool,

    /// Name of the cleanup script (runs `<pm> run <name>` after publishing)
    #[arg(long)]
    pub cleanup_command: Option<String>,

    /// Branch publishing is allowed from
    #[arg(long)]
    pub branch: Option<String>,

    /// Bump the manifest version before publishing (patch, minor, or major)
    #[arg(long, value_name = "KIND")]
    pub bump: Option<String>,

    /// Dry-run: log external commands instead of executing them
    #[arg(long)]
    pub dry_run: bool,

    /// Extra flags passed through to the underlying publish command (must follow `--`)
    #[arg(last = true, value_name = "PUBLISH_ARG")]
    pub publish_args: Vec<String>,
}
