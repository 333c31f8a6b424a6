use crate::errors::{PackshipError, Result};
use crate::process::{CommandRunner, CommandSpec, RunOptions, run_command};
use std::path::Path;

fn read_env_branch(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Detect the current git branch, preferring explicit overrides when provided.
///
/// Order of precedence:
/// 1. `PACKSHIP_RELEASE_BRANCH`
/// 2. `GITHUB_REF_NAME`
/// 3. `git rev-parse --abbrev-ref HEAD`
pub fn current_branch(runner: &dyn CommandRunner) -> Result<String> {
    if let Some(branch) = read_env_branch("PACKSHIP_RELEASE_BRANCH") {
        return Ok(branch);
    }

    if let Some(branch) = read_env_branch("GITHUB_REF_NAME") {
        return Ok(branch);
    }

    let spec = CommandSpec::new("git").args(["rev-parse", "--abbrev-ref", "HEAD"]);
    let output = run_command(runner, &spec, RunOptions::piped().fatal())
        .map_err(|_| PackshipError::Git("Unable to determine current git branch".into()))?;

    let branch = output
        .unwrap_or_default()
        .trim()
        .trim_start_matches("refs/heads/")
        .to_string();

    if branch.is_empty() || branch == "HEAD" {
        return Err(PackshipError::Git(
            "Unable to determine current git branch (detached HEAD)".into(),
        ));
    }

    Ok(branch)
}

/// Stage every change in the working tree.
pub fn stage_all(runner: &dyn CommandRunner) -> Result<()> {
    let spec = CommandSpec::new("git").args(["add", "."]);
    run_command(runner, &spec, RunOptions::inherit().fatal())?;
    Ok(())
}

/// Create a commit with the given message.
pub fn commit(runner: &dyn CommandRunner, message: &str) -> Result<()> {
    let spec = CommandSpec::new("git").args(["commit", "-m", message]);
    run_command(runner, &spec, RunOptions::inherit().fatal())?;
    Ok(())
}

/// Push the current branch to its remote tracking branch.
pub fn push(runner: &dyn CommandRunner) -> Result<()> {
    let spec = CommandSpec::new("git").arg("push");
    run_command(runner, &spec, RunOptions::inherit().fatal())?;
    Ok(())
}

/// Create an annotated tag with the given message.
pub fn create_annotated_tag(runner: &dyn CommandRunner, tag: &str, message: &str) -> Result<()> {
    let spec = CommandSpec::new("git").args(["tag", "-a", tag, "-m", message]);
    run_command(runner, &spec, RunOptions::inherit().fatal())?;
    Ok(())
}

/// Push a tag to the `origin` remote.
pub fn push_tag(runner: &dyn CommandRunner, tag: &str) -> Result<()> {
    let spec = CommandSpec::new("git").args(["push", "origin", tag]);
    run_command(runner, &spec, RunOptions::inherit().fatal())?;
    Ok(())
}

/// List commit subjects from `tag` (exclusive) to HEAD, newest first.
///
/// With no tag, lists every commit subject reachable from HEAD. Merge
/// commits are skipped. Failures are swallowed and yield an empty list so
/// tag-annotation callers degrade to a bare message.
pub fn commits_from_tag_to_head(runner: &dyn CommandRunner, tag: Option<&str>) -> Vec<String> {
    let mut spec = CommandSpec::new("git").args(["log", "--no-merges", "--pretty=format:%s"]);
    if let Some(tag) = tag {
        spec = spec.arg(format!("{tag}.."));
    }

    let output = run_command(runner, &spec, RunOptions::piped()).ok().flatten();

    output
        .map(|text| {
            text.lines()
                .map(|line| line.to_string())
                .filter(|line| !line.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Capture the diff of one file, staged (`--cached`) or unstaged.
///
/// Returns `None` when the diff command fails; an empty diff is returned as
/// an empty string.
pub fn diff_file(runner: &dyn CommandRunner, path: &Path, staged: bool) -> Option<String> {
    let mut spec = CommandSpec::new("git").arg("diff");
    if staged {
        spec = spec.arg("--cached");
    }
    spec = spec.arg("--").arg(path.display().to_string());

    run_command(runner, &spec, RunOptions::piped()).ok().flatten()
}
