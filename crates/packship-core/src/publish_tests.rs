use crate::errors::{PackshipError, Result};
use crate::manifest::PackageManifest;
use crate::process::{CommandRunner, CommandSpec, StdioMode};
use crate::publish::{PublishHooks, PublishOptions, run_publish};
use crate::registry::RegistryQuery;
use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};

/// Runner that records every invocation and fails on request.
struct ScriptedRunner {
    calls: RefCell<Vec<(String, Option<PathBuf>)>>,
    fail_on: Vec<String>,
    piped_output: String,
}

impl ScriptedRunner {
    fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            fail_on: Vec::new(),
            piped_output: String::new(),
        }
    }

    fn failing_on(fragments: &[&str]) -> Self {
        let mut runner = Self::new();
        runner.fail_on = fragments.iter().map(|f| f.to_string()).collect();
        runner
    }

    fn displays(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|(display, _)| display.clone())
            .collect()
    }

    fn cwd_of(&self, fragment: &str) -> Option<PathBuf> {
        self.calls
            .borrow()
            .iter()
            .find(|(display, _)| display.contains(fragment))
            .and_then(|(_, cwd)| cwd.clone())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, spec: &CommandSpec, mode: StdioMode) -> std::result::Result<Option<String>, String> {
        let display = spec.display();
        self.calls
            .borrow_mut()
            .push((display.clone(), spec.cwd.clone()));

        if self.fail_on.iter().any(|f| display.contains(f)) {
            return Err("scripted failure".to_string());
        }

        match mode {
            StdioMode::Piped => Ok(Some(self.piped_output.clone())),
            StdioMode::Inherit => Ok(None),
        }
    }
}

/// Registry double: `Err` state, 404 state, or a fixed version list.
enum FakeRegistry {
    Failing,
    NotFound,
    Versions(Vec<String>),
}

impl RegistryQuery for FakeRegistry {
    fn published_versions(&self, _package_name: &str) -> Result<Option<Vec<String>>> {
        match self {
            Self::Failing => Err(PackshipError::Registry("scripted registry outage".into())),
            Self::NotFound => Ok(None),
            Self::Versions(versions) => Ok(Some(versions.clone())),
        }
    }
}

static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> &'static Mutex<()> {
    ENV_MUTEX.get_or_init(|| Mutex::new(()))
}

/// Temporarily override process environment variables, restoring them on
/// drop. Serialized through a mutex since the environment is process-wide.
struct ScopedEnv {
    original: Vec<(&'static str, Option<OsString>)>,
    _lock: MutexGuard<'static, ()>,
}

impl ScopedEnv {
    fn set(overrides: &[(&'static str, OsString)]) -> Self {
        let lock = env_lock().lock().unwrap();
        let mut original = Vec::with_capacity(overrides.len());
        for (key, _) in overrides {
            original.push((*key, std::env::var_os(key)));
        }

        for (key, value) in overrides {
            unsafe {
                std::env::set_var(key, value);
            }
        }

        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, value) in &self.original {
            unsafe {
                if let Some(v) = value {
                    std::env::set_var(key, v);
                } else {
                    std::env::remove_var(key);
                }
            }
        }
    }
}

fn manifest_fixture(json: &str) -> (tempfile::TempDir, PackageManifest) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("package.json");
    fs::write(&path, json).unwrap();
    let manifest = PackageManifest::load(&path).unwrap();
    (temp, manifest)
}

fn base_options() -> PublishOptions {
    PublishOptions {
        next_version: Some("1.1.0".to_string()),
        prev_version: Some("1.0.0".to_string()),
        ..PublishOptions::default()
    }
}

#[test]
fn safe_publish_short_circuits_before_any_side_effect() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::Versions(vec!["1.0.0".to_string(), "1.1.0".to_string()]);
    let (_t, mut manifest) = manifest_fixture(r#"{"name":"demo","version":"1.1.0"}"#);

    let mut callback_count = 0;
    let mut on_already_published = |version: &str| {
        assert_eq!(version, "1.1.0");
        callback_count += 1;
    };

    let opts = PublishOptions {
        safe: true,
        commit_all_current_changes: true,
        create_tag: true,
        ..base_options()
    };
    let outcome = run_publish(
        &runner,
        &registry,
        &opts,
        Some(&mut manifest),
        PublishHooks {
            on_already_published: Some(&mut on_already_published),
        },
    )
    .unwrap();

    assert!(outcome.is_none());
    assert_eq!(callback_count, 1);
    assert!(runner.displays().is_empty(), "no command may run");
}

#[test]
fn registry_not_found_means_not_yet_published() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;
    let (_t, mut manifest) = manifest_fixture(r#"{"name":"demo","version":"1.1.0"}"#);

    let opts = PublishOptions {
        safe: true,
        ..base_options()
    };
    let outcome = run_publish(
        &runner,
        &registry,
        &opts,
        Some(&mut manifest),
        PublishHooks::default(),
    )
    .unwrap();

    assert!(outcome.is_some());
    assert!(
        runner
            .displays()
            .iter()
            .any(|call| call.starts_with("pnpm publish"))
    );
}

#[test]
fn registry_outage_propagates_before_publishing() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::Failing;
    let (_t, mut manifest) = manifest_fixture(r#"{"name":"demo","version":"1.1.0"}"#);

    let opts = PublishOptions {
        safe: true,
        ..base_options()
    };
    let err = run_publish(
        &runner,
        &registry,
        &opts,
        Some(&mut manifest),
        PublishHooks::default(),
    )
    .unwrap_err();

    assert!(matches!(err, PackshipError::Registry(_)));
    assert!(runner.displays().is_empty());
}

#[test]
fn safe_publish_requires_a_manifest_accessor() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        safe: true,
        ..base_options()
    };
    let err = run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap_err();

    assert!(matches!(err, PackshipError::Config(_)));
    assert!(runner.displays().is_empty());
}

#[test]
fn commit_failure_aborts_before_publish() {
    let runner = ScriptedRunner::failing_on(&["git commit"]);
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        commit_all_current_changes: true,
        ..base_options()
    };
    let err = run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap_err();

    assert!(matches!(err, PackshipError::Command(_)));
    let calls = runner.displays();
    assert!(calls.iter().any(|c| c == "git add ."));
    assert!(!calls.iter().any(|c| c.starts_with("pnpm publish")));
}

#[test]
fn commit_message_embeds_next_version() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        commit_all_current_changes: true,
        ..base_options()
    };
    run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();

    let calls = runner.displays();
    assert!(calls.iter().any(|c| c == "git commit -m bump: v1.1.0"));
    assert!(calls.iter().any(|c| c == "git push"));
}

#[test]
fn commit_message_without_version_is_generic() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        next_version: None,
        prev_version: None,
        commit_all_current_changes: true,
        ..PublishOptions::default()
    };
    run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();

    assert!(
        runner
            .displays()
            .iter()
            .any(|c| c == "git commit -m bump: publish last version")
    );
}

#[test]
fn non_semver_target_version_fails_before_any_side_effect() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        next_version: Some("not-a-version".to_string()),
        commit_all_current_changes: true,
        ..PublishOptions::default()
    };
    let err = run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap_err();

    assert!(matches!(err, PackshipError::InvalidData(_)));
    assert!(runner.displays().is_empty());
}

#[test]
fn publish_failure_is_fatal() {
    let runner = ScriptedRunner::failing_on(&["pnpm publish"]);
    let registry = FakeRegistry::NotFound;

    let err =
        run_publish(&runner, &registry, &base_options(), None, PublishHooks::default())
            .unwrap_err();
    assert!(matches!(err, PackshipError::Command(_)));
}

#[test]
fn publish_runs_in_build_dir_by_default() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        root_dir: PathBuf::from("/repo"),
        ..base_options()
    };
    run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();

    assert_eq!(runner.cwd_of("pnpm publish"), Some(PathBuf::from("/repo/dist")));
}

#[test]
fn stay_in_current_dir_publishes_from_the_root() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        root_dir: PathBuf::from("/repo"),
        stay_in_current_dir: true,
        ..base_options()
    };
    run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();

    assert_eq!(runner.cwd_of("pnpm publish"), Some(PathBuf::from("/repo")));
}

#[test]
fn dist_tag_and_force_extend_the_publish_command() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        dist_tag: Some("beta".to_string()),
        force: true,
        extra_publish_args: vec!["--access".to_string(), "public".to_string()],
        ..base_options()
    };
    run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();

    assert!(
        runner
            .displays()
            .iter()
            .any(|c| c == "pnpm publish --tag beta --force --access public")
    );
}

#[test]
fn tag_failure_is_logged_but_not_fatal() {
    let runner = ScriptedRunner::failing_on(&["git push origin"]);
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        create_tag: true,
        ..base_options()
    };
    let outcome = run_publish(&runner, &registry, &opts, None, PublishHooks::default())
        .unwrap()
        .expect("publish itself succeeded");

    assert_eq!(outcome.published_git_tag, None);
    assert!(
        runner
            .displays()
            .iter()
            .any(|c| c.starts_with("pnpm publish"))
    );
}

#[test]
fn successful_tag_is_reported_in_the_outcome() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        create_tag: true,
        ..base_options()
    };
    let outcome = run_publish(&runner, &registry, &opts, None, PublishHooks::default())
        .unwrap()
        .unwrap();

    assert_eq!(outcome.published_git_tag.as_deref(), Some("v1.1.0"));
    assert_eq!(outcome.version.as_deref(), Some("1.1.0"));

    let calls = runner.displays();
    assert!(calls.iter().any(|c| c.starts_with("git tag -a v1.1.0")));
    assert!(calls.iter().any(|c| c == "git push origin v1.1.0"));
}

#[test]
fn tag_label_follows_the_configured_format() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        create_tag: true,
        git_tag_format: "release-<version>".to_string(),
        ..base_options()
    };
    let outcome = run_publish(&runner, &registry, &opts, None, PublishHooks::default())
        .unwrap()
        .unwrap();

    assert_eq!(outcome.published_git_tag.as_deref(), Some("release-1.1.0"));
    assert!(
        runner
            .displays()
            .iter()
            .any(|c| c.starts_with("git tag -a release-1.1.0"))
    );
}

#[test]
fn tag_message_filters_commits_and_links_the_range() {
    let mut runner = ScriptedRunner::new();
    runner.piped_output = "feat: add widget\nchore: tidy\nfix: crash\n".to_string();
    let registry = FakeRegistry::NotFound;
    let (_t, mut manifest) = manifest_fixture(
        r#"{"name":"demo","version":"1.1.0","repository":"https://github.com/acme/demo"}"#,
    );

    let opts = PublishOptions {
        create_tag: true,
        commit_prefixes: vec!["feat".to_string(), "fix".to_string()],
        ..base_options()
    };
    run_publish(
        &runner,
        &registry,
        &opts,
        Some(&mut manifest),
        PublishHooks::default(),
    )
    .unwrap();

    let calls = runner.displays();
    let tag_call = calls
        .iter()
        .find(|c| c.starts_with("git tag -a v1.1.0"))
        .expect("tag must be created");
    assert!(tag_call.contains("## What's Changed"));
    assert!(tag_call.contains("* feat: add widget"));
    assert!(tag_call.contains("* fix: crash"));
    assert!(!tag_call.contains("chore: tidy"));
    assert!(
        tag_call.contains("**Full Changelog**: https://github.com/acme/demo/compare/v1.0.0...v1.1.0")
    );
    assert!(calls.iter().any(|c| c.contains("git log") && c.contains("v1.0.0..")));
}

#[test]
fn first_release_tag_links_the_commit_list() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        prev_version: None,
        create_tag: true,
        github_repo_link: Some("https://github.com/acme/demo".to_string()),
        ..base_options()
    };
    run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();

    let calls = runner.displays();
    let tag_call = calls
        .iter()
        .find(|c| c.starts_with("git tag -a v1.1.0"))
        .unwrap();
    assert!(tag_call.contains("**Full Changelog**: https://github.com/acme/demo/commits/v1.1.0"));
}

#[test]
fn other_names_without_manifest_is_a_configuration_error() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        other_names: vec!["alias".to_string()],
        ..base_options()
    };
    let err = run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap_err();

    assert!(matches!(err, PackshipError::Config(_)));
    assert!(runner.displays().is_empty(), "must fail before any action");
}

#[test]
fn other_names_republish_and_restore_the_original_name() {
    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;
    let (_t, mut manifest) = manifest_fixture(r#"{"name":"demo","version":"1.1.0"}"#);

    let opts = PublishOptions {
        other_names: vec!["alias-one".to_string(), "alias-two".to_string()],
        ..base_options()
    };
    run_publish(
        &runner,
        &registry,
        &opts,
        Some(&mut manifest),
        PublishHooks::default(),
    )
    .unwrap();

    let publish_count = runner
        .displays()
        .iter()
        .filter(|c| c.starts_with("pnpm publish"))
        .count();
    assert_eq!(publish_count, 3, "primary publish plus one per alias");

    assert_eq!(manifest.name(), Some("demo"));
    let reloaded = PackageManifest::load(manifest.path()).unwrap();
    assert_eq!(reloaded.name(), Some("demo"));
}

#[test]
fn cleanup_command_runs_and_its_failure_is_swallowed() {
    let runner = ScriptedRunner::failing_on(&["pnpm clean"]);
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        cleanup_command: Some("pnpm clean".to_string()),
        ..base_options()
    };
    let outcome = run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();

    assert!(outcome.is_some());
    assert!(runner.displays().iter().any(|c| c == "pnpm clean"));
}

#[test]
fn rejects_publishing_from_an_unconfigured_branch() {
    let _env = ScopedEnv::set(&[("PACKSHIP_RELEASE_BRANCH", OsString::from("feature"))]);

    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        release_branches: vec!["master".to_string()],
        ..base_options()
    };
    let err = run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap_err();

    match err {
        PackshipError::Release(message) => {
            assert!(message.contains("not configured for publishing"));
            assert!(message.contains("feature"));
        }
        other => panic!("expected Release error, got {other:?}"),
    }
    assert!(runner.displays().is_empty());
}

#[test]
fn allows_publishing_from_a_configured_branch() {
    let _env = ScopedEnv::set(&[("PACKSHIP_RELEASE_BRANCH", OsString::from("master"))]);

    let runner = ScriptedRunner::new();
    let registry = FakeRegistry::NotFound;

    let opts = PublishOptions {
        release_branches: vec!["master".to_string()],
        ..base_options()
    };
    let outcome = run_publish(&runner, &registry, &opts, None, PublishHooks::default()).unwrap();
    assert!(outcome.is_some());
}
