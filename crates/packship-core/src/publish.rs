use crate::errors::{PackshipError, Result};
use crate::git;
use crate::manifest::PackageManifest;
use crate::process::{CommandRunner, CommandSpec, RunOptions, run_command};
use crate::registry::RegistryQuery;
use crate::types::{PackageManager, PublishOutcome};
use rustc_hash::FxHashSet;
use std::path::PathBuf;

/// Token in a tag format template replaced by the version string.
pub const TAG_FORMAT_TOKEN: &str = "<version>";

/// Options for a single publish attempt.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Version being published; falls back to the manifest's version.
    pub next_version: Option<String>,
    /// Previously published version, used for tag annotation ranges.
    pub prev_version: Option<String>,
    pub package_manager: PackageManager,
    /// Distribution tag (`--tag`) for the publish command.
    pub dist_tag: Option<String>,
    pub force: bool,
    /// Extra flags forwarded verbatim to the publish command.
    pub extra_publish_args: Vec<String>,
    /// Stage, commit and push all working-tree changes before publishing.
    pub commit_all_current_changes: bool,
    /// Create and push an annotated tag after a successful publish.
    pub create_tag: bool,
    /// Template for the tag label; `<version>` is substituted.
    pub git_tag_format: String,
    /// Skip the whole run when the version is already on the registry.
    pub safe: bool,
    /// Best-effort command executed at the end of the run.
    pub cleanup_command: Option<String>,
    /// Alternate names the package is republished under.
    pub other_names: Vec<String>,
    /// Publish from the working directory instead of the build dir.
    pub stay_in_current_dir: bool,
    pub root_dir: PathBuf,
    pub build_dir: String,
    /// Branches publishing is allowed from; empty allows any branch.
    pub release_branches: Vec<String>,
    /// Commit-subject prefixes kept in the tag annotation message.
    pub commit_prefixes: Vec<String>,
    /// Repository link for tag annotation ranges; falls back to the
    /// manifest's repository field.
    pub github_repo_link: Option<String>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            next_version: None,
            prev_version: None,
            package_manager: PackageManager::Pnpm,
            dist_tag: None,
            force: false,
            extra_publish_args: Vec::new(),
            commit_all_current_changes: false,
            create_tag: false,
            git_tag_format: format!("v{TAG_FORMAT_TOKEN}"),
            safe: false,
            cleanup_command: None,
            other_names: Vec::new(),
            stay_in_current_dir: false,
            root_dir: PathBuf::from("."),
            build_dir: "dist".to_string(),
            release_branches: Vec::new(),
            commit_prefixes: Vec::new(),
            github_repo_link: None,
        }
    }
}

/// Caller-supplied notification hooks for a publish run.
#[derive(Default)]
pub struct PublishHooks<'a> {
    /// Fired exactly once when the safe-publish guard finds the target
    /// version already on the registry.
    pub on_already_published: Option<&'a mut dyn FnMut(&str)>,
}

/// Run one guarded publish attempt.
///
/// Step order: configuration checks, branch guard, safe-publish guard,
/// then commit/push, publish, tag, alternate-name republish, cleanup.
/// Commit and publish failures abort the run; tag and cleanup failures are
/// logged and swallowed since the package is already out. The
/// already-published case is not an error: the hook fires and the run
/// returns `Ok(None)` with nothing committed, published or tagged.
///
/// Runs are strictly sequential and must not be issued concurrently
/// against the same manifest file.
pub fn run_publish(
    runner: &dyn CommandRunner,
    registry: &dyn RegistryQuery,
    opts: &PublishOptions,
    mut manifest: Option<&mut PackageManifest>,
    hooks: PublishHooks<'_>,
) -> Result<Option<PublishOutcome>> {
    if !opts.other_names.is_empty() && manifest.is_none() {
        return Err(PackshipError::Config(
            "alternate publish names require a manifest accessor to rewrite the package name"
                .into(),
        ));
    }
    if opts.safe && manifest.is_none() {
        return Err(PackshipError::Config(
            "safe publish requires a manifest accessor to resolve the package name".into(),
        ));
    }

    if !opts.release_branches.is_empty() {
        let branch = git::current_branch(runner)?;
        if !opts.release_branches.iter().any(|b| b == &branch) {
            return Err(PackshipError::Release(format!(
                "Branch '{}' is not configured for publishing (allowed: {:?})",
                branch, opts.release_branches
            )));
        }
    }

    let target_version = opts
        .next_version
        .clone()
        .or_else(|| manifest.as_deref().and_then(|m| m.version().map(String::from)));

    // Registries reject non-semver versions; catch that before any side effect.
    if let Some(version) = &target_version {
        semver::Version::parse(version).map_err(|err| {
            PackshipError::InvalidData(format!("version '{version}' is not valid semver: {err}"))
        })?;
    }

    if opts.safe
        && let Some(accessor) = manifest.as_deref()
    {
        let name = accessor.name().ok_or_else(|| {
            PackshipError::Manifest("manifest is missing a 'name' field".into())
        })?;
        let version = target_version.as_deref().ok_or_else(|| {
            PackshipError::Publish("safe publish requires a known target version".into())
        })?;

        match registry.published_versions(name)? {
            Some(versions) => {
                let published: FxHashSet<&str> = versions.iter().map(String::as_str).collect();
                if published.contains(version) {
                    println!("Skipping publish: {name}@{version} already on the registry");
                    if let Some(hook) = hooks.on_already_published {
                        hook(version);
                    }
                    return Ok(None);
                }
            }
            None => println!("{name} not yet published, proceeding"),
        }
    }

    if opts.commit_all_current_changes {
        git::stage_all(runner)?;
        let message = match &target_version {
            Some(version) => format!("bump: v{version}"),
            None => "bump: publish last version".to_string(),
        };
        git::commit(runner, &message)?;
        git::push(runner)?;
    }

    let publish_spec = build_publish_spec(opts);
    run_command(runner, &publish_spec, RunOptions::inherit().fatal())?;

    let mut published_git_tag = None;
    if opts.create_tag
        && let Some(next) = &target_version
    {
        let label = opts.git_tag_format.replace(TAG_FORMAT_TOKEN, next);
        let message = tag_message(runner, opts, manifest.as_deref(), &label);
        match create_and_push_tag(runner, &label, &message) {
            Ok(()) => published_git_tag = Some(label),
            Err(e) => eprintln!("Warning: failed to create or push tag {label}: {e}"),
        }
    }

    if !opts.other_names.is_empty()
        && let Some(accessor) = manifest.as_deref_mut()
    {
        let original_name = accessor
            .name()
            .ok_or_else(|| PackshipError::Manifest("manifest is missing a 'name' field".into()))?
            .to_string();

        for name in &opts.other_names {
            accessor.set_name(name)?;
            println!("Publishing as {name}");
            run_command(runner, &publish_spec, RunOptions::inherit())?;
        }

        accessor.set_name(&original_name)?;
    }

    if let Some(cleanup) = &opts.cleanup_command {
        let mut parts = cleanup.split_whitespace();
        if let Some(program) = parts.next() {
            let spec = CommandSpec::new(program)
                .args(parts)
                .current_dir(&opts.root_dir);
            run_command(runner, &spec, RunOptions::inherit())?;
        }
    }

    Ok(Some(PublishOutcome {
        version: target_version,
        published_git_tag,
    }))
}

fn build_publish_spec(opts: &PublishOptions) -> CommandSpec {
    let mut spec = CommandSpec::new(opts.package_manager.as_str()).arg("publish");
    if let Some(tag) = &opts.dist_tag {
        spec = spec.args(["--tag", tag]);
    }
    if opts.force {
        spec = spec.arg("--force");
    }
    if !opts.extra_publish_args.is_empty() {
        spec = spec.args(opts.extra_publish_args.iter().cloned());
    }
    let cwd = if opts.stay_in_current_dir {
        opts.root_dir.clone()
    } else {
        opts.root_dir.join(&opts.build_dir)
    };
    spec.current_dir(cwd)
}

/// Annotation message for the published tag: the filtered commit subjects
/// since the previous version's tag, plus a changelog range link.
fn tag_message(
    runner: &dyn CommandRunner,
    opts: &PublishOptions,
    manifest: Option<&PackageManifest>,
    label: &str,
) -> String {
    let prev_label = opts
        .prev_version
        .as_deref()
        .map(|prev| opts.git_tag_format.replace(TAG_FORMAT_TOKEN, prev));

    let commits: Vec<String> = git::commits_from_tag_to_head(runner, prev_label.as_deref())
        .into_iter()
        .filter(|subject| {
            opts.commit_prefixes.is_empty()
                || opts
                    .commit_prefixes
                    .iter()
                    .any(|prefix| subject.starts_with(prefix))
        })
        .collect();

    let repo_link = opts.github_repo_link.clone().or_else(|| {
        manifest.and_then(|m| {
            let repo = m.github_repo();
            (!repo.owner.is_empty()).then(|| m.repository_link())
        })
    });

    let mut lines = vec!["## What's Changed".to_string()];
    lines.extend(commits.iter().map(|subject| format!("* {subject}")));
    if let Some(link) = repo_link {
        match &prev_label {
            Some(prev) => lines.push(format!("**Full Changelog**: {link}/compare/{prev}...{label}")),
            None => lines.push(format!("**Full Changelog**: {link}/commits/{label}")),
        }
    }

    lines.join("\n")
}

fn create_and_push_tag(runner: &dyn CommandRunner, label: &str, message: &str) -> Result<()> {
    git::create_annotated_tag(runner, label, message)?;
    git::push_tag(runner, label)
}
