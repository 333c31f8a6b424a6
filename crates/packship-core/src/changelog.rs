use crate::errors::{PackshipError, Result, io_error_with_path};
use std::fs;
use std::path::Path;

/// Release notes extracted from a changelog for one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogInfo {
    /// Label of the section preceding this version, when one exists.
    pub previous_version: Option<String>,
    /// The version's `###` subsections followed by a compare link.
    pub notes: String,
}

/// Extract the release-notes section for `version` from a changelog.
///
/// The changelog is split on `## ` version headers. The matching section's
/// `###` subsections become the notes body, and a
/// `Changes: {repo_url}/compare/{prev}...{version}` line is appended,
/// open-ended when this is the oldest section. A leading `v` on `version`
/// is ignored when matching headers.
pub fn changelog_release_info(
    version: &str,
    changelog_path: &Path,
    repo_url: &str,
) -> Result<ChangelogInfo> {
    let content =
        fs::read_to_string(changelog_path).map_err(|e| io_error_with_path(e, changelog_path))?;
    let plain_version = version.strip_prefix('v').unwrap_or(version);

    let sections: Vec<&str> = content.split("\n## ").collect();
    let index = sections
        .iter()
        .position(|section| section.starts_with(plain_version))
        .ok_or_else(|| {
            PackshipError::NotFound(format!(
                "no section for version {plain_version} in {}",
                changelog_path.display()
            ))
        })?;

    let previous_version = sections
        .get(index + 1)
        .map(|section| {
            section
                .split("\n\n")
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
        .filter(|label| !label.is_empty());

    let mut lines: Vec<String> = sections[index]
        .split("###")
        .skip(1)
        .map(|chunk| format!("###{chunk}"))
        .collect();

    match &previous_version {
        Some(prev) => lines.push(format!("Changes: {repo_url}/compare/{prev}...{version}")),
        None => lines.push(format!("Changes: {repo_url}/compare/...{version}")),
    }

    Ok(ChangelogInfo {
        previous_version,
        notes: lines.join("\n"),
    })
}
