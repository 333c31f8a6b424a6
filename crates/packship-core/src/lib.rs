pub mod changelog;
pub mod config;
pub mod dist;
pub mod errors;
pub mod exports;
pub mod git;
pub mod github;
pub mod manifest;
pub mod process;
pub mod publish;
pub mod registry;
pub mod types;
pub mod version;

/// User agent for registry and GitHub API requests.
pub const USER_AGENT: &str = concat!("packship/", env!("CARGO_PKG_VERSION"));

// Re-export commonly used items
pub use changelog::{ChangelogInfo, changelog_release_info};
pub use config::Config;
pub use dist::{
    FillDistOptions, PostBuildOptions, VersionChangeEvent, run_fill_dist, run_post_build,
};
pub use errors::PackshipError;
pub use exports::{
    ConditionalExport, ExportTarget, ExportsMap, ExportsOptions, build_exports_map,
    default_export_filter,
};
pub use github::{GhRelease, publish_gh_release};
pub use manifest::{GithubRepo, PackageManifest};
pub use process::{CommandRunner, CommandSpec, RunOptions, StdioMode, SystemRunner, run_command};
pub use publish::{PublishHooks, PublishOptions, run_publish};
pub use registry::{NpmRegistry, RegistryQuery};
pub use types::{Bump, PackageManager, PublishOutcome, VersionDiff};
pub use version::{bump_version, detect_version_change};

#[cfg(test)]
mod publish_tests;
