use crate::errors::{PackshipError, Result};
use crate::git;
use crate::process::CommandRunner;
use crate::types::{Bump, VersionDiff};
use std::path::Path;

/// Compute the next version string for a bump.
///
/// No current version is treated as install-from-scratch and yields
/// `"0.0.1"` regardless of the bump kind. Otherwise the version must be
/// three dot-separated integers; anything else is invalid data.
pub fn bump_version(current: Option<&str>, kind: Bump) -> Result<String> {
    let Some(current) = current else {
        return Ok("0.0.1".to_string());
    };

    let parts: Vec<&str> = current.split('.').collect();
    if parts.len() != 3 {
        return Err(PackshipError::InvalidData(format!(
            "version '{current}' is not of the form MAJOR.MINOR.PATCH"
        )));
    }

    let parse = |part: &str| -> Result<u64> {
        part.parse().map_err(|_| {
            PackshipError::InvalidData(format!(
                "version '{current}' has a non-numeric component '{part}'"
            ))
        })
    };
    let (major, minor, patch) = (parse(parts[0])?, parse(parts[1])?, parse(parts[2])?);

    let next = match kind {
        Bump::Major => format!("{}.0.0", major + 1),
        Bump::Minor => format!("{}.{}.0", major, minor + 1),
        Bump::Patch => format!("{}.{}.{}", major, minor, patch + 1),
    };
    Ok(next)
}

/// Detect a pending change of the manifest's version field.
///
/// Shells out to `git diff` and scans the line-oriented output for
/// removed/added `"version":` lines; deliberately textual, matching the
/// behavior this replaces, not a structural JSON diff. The staged diff is
/// checked first; when it contains a version change the unstaged diff is
/// not consulted, so a bump that is already in the index wins.
///
/// Returns `None` when neither diff touches the version field (including
/// when the diff commands themselves fail, e.g. outside a repository).
pub fn detect_version_change(
    runner: &dyn CommandRunner,
    manifest_path: &Path,
) -> Option<VersionDiff> {
    let staged = git::diff_file(runner, manifest_path, true);
    if let Some(diff) = staged.as_deref().and_then(scan_version_markers) {
        return Some(diff);
    }

    let unstaged = git::diff_file(runner, manifest_path, false);
    unstaged.as_deref().and_then(scan_version_markers)
}

/// Scan diff text for `-`/`+` lines touching a `"version":` field.
///
/// Returns as soon as an added version line is seen; a preceding removed
/// line supplies `previous`.
fn scan_version_markers(diff: &str) -> Option<VersionDiff> {
    let mut previous: Option<String> = None;

    for line in diff.lines() {
        if line.starts_with('-') && line.contains("\"version\":") {
            previous = extract_version_value(line);
        }
        if line.starts_with('+') && line.contains("\"version\":") {
            let next = extract_version_value(line)?;
            return Some(VersionDiff { previous, next });
        }
    }

    None
}

/// Pull the quoted value out of a diff line like `+  "version": "1.2.3",`.
fn extract_version_value(line: &str) -> Option<String> {
    let (_, rest) = line.split_once("\"version\":")?;
    rest.split('"').nth(1).map(|v| v.to_string())
}
