use crate::cli::PublishArgs;
use packship_core::Config;
use packship_core::changelog::changelog_release_info;
use packship_core::errors::{PackshipError, Result};
use packship_core::github::{GhRelease, publish_gh_release};
use packship_core::manifest::PackageManifest;
use packship_core::process::SystemRunner;
use packship_core::publish::{PublishHooks, PublishOptions, run_publish};
use packship_core::registry::NpmRegistry;
use packship_core::types::Bump;
use packship_core::version::{bump_version, detect_version_change};

pub fn run(args: &PublishArgs) -> Result<()> {
    let config = Config::load(&args.root)?;
    let manifest_path = args.root.join("package.json");
    let mut manifest = PackageManifest::load(&manifest_path)?;

    let runner = SystemRunner::new(args.dry_run);
    let registry = NpmRegistry::default();

    let mut bumped_version = None;
    if let Some(kind) = &args.bump {
        let kind = Bump::parse(kind).ok_or_else(|| {
            PackshipError::InvalidData(format!("unknown bump kind '{kind}'"))
        })?;
        let next = bump_version(manifest.version(), kind)?;
        if args.dry_run {
            println!("dry-run: would bump version to {next}");
        } else {
            let mut fields = serde_json::Map::new();
            fields.insert("version".to_string(), serde_json::Value::String(next.clone()));
            manifest.update(fields)?;
            println!("Bumped version to {next}");
        }
        bumped_version = Some(next);
    }

    let next_version = std::env::var("PACKSHIP_VERSION")
        .ok()
        .filter(|v| !v.is_empty())
        .or(bumped_version)
        .or_else(|| manifest.version().map(String::from));
    let prev_version =
        detect_version_change(&runner, &manifest_path).and_then(|diff| diff.previous);

    let release_branches = match &args.branch {
        Some(branch) => vec![branch.clone()],
        None if !config.release_branches.is_empty() => config.release_branches.clone(),
        None => vec!["master".to_string()],
    };

    let cleanup = args.cleanup_command.as_deref().unwrap_or("clean");
    let opts = PublishOptions {
        next_version,
        prev_version,
        package_manager: config.package_manager,
        dist_tag: config.dist_tag.clone(),
        force: false,
        extra_publish_args: args.publish_args.clone(),
        commit_all_current_changes: true,
        create_tag: true,
        git_tag_format: config.git_tag_format.clone(),
        safe: true,
        cleanup_command: Some(format!("{} run {cleanup}", config.package_manager)),
        other_names: config.other_names.clone(),
        stay_in_current_dir: !args.open_dist_dir,
        root_dir: args.root.clone(),
        build_dir: config.build_dir.clone(),
        release_branches,
        commit_prefixes: config.commit_prefixes.clone(),
        github_repo_link: None,
    };

    let mut on_already_published =
        |version: &str| eprintln!("Warning: {version} already published");
    let outcome = run_publish(
        &runner,
        &registry,
        &opts,
        Some(&mut manifest),
        PublishHooks {
            on_already_published: Some(&mut on_already_published),
        },
    )?;

    // Already published: a recognized terminal state, not a failure.
    let Some(outcome) = outcome else {
        return Ok(());
    };

    let in_ci = std::env::var("CI").is_ok_and(|v| !v.is_empty());
    if in_ci && let Some(tag) = &outcome.published_git_tag {
        let version = outcome.version.as_deref().unwrap_or(tag);
        let changelog_path = manifest.location_dir().join("CHANGELOG.md");
        let info = changelog_release_info(version, &changelog_path, &manifest.repository_link())?;

        let repo = manifest.github_repo();
        let token = std::env::var("GITHUB_TOKEN").map_err(|_| {
            PackshipError::Config("GITHUB_TOKEN is required to publish a GitHub release".into())
        })?;

        let release_url = publish_gh_release(&GhRelease {
            owner: &repo.owner,
            repo: &repo.name,
            tag,
            body: &info.notes,
            draft: false,
            prerelease: false,
            auth_token: &token,
        })?;
        println!("Published GitHub release {release_url}");
    }

    Ok(())
}
