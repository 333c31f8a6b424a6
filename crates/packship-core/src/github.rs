use crate::errors::{PackshipError, Result};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

/// A release record to create on GitHub.
#[derive(Debug, Clone)]
pub struct GhRelease<'a> {
    pub owner: &'a str,
    pub repo: &'a str,
    /// Tag the release points at; also used as the release name.
    pub tag: &'a str,
    pub body: &'a str,
    pub draft: bool,
    pub prerelease: bool,
    pub auth_token: &'a str,
}

#[derive(Serialize)]
struct ReleasePayload<'a> {
    tag_name: &'a str,
    name: &'a str,
    body: &'a str,
    draft: bool,
    prerelease: bool,
}

/// Create a GitHub release, returning its html URL.
///
/// Propagates API errors; there is no retry or update-if-exists handling,
/// so a duplicate release surfaces as the API's validation error.
pub fn publish_gh_release(release: &GhRelease<'_>) -> Result<String> {
    let url = format!(
        "https://api.github.com/repos/{}/{}/releases",
        release.owner, release.repo
    );

    let payload = ReleasePayload {
        tag_name: release.tag,
        name: release.tag,
        body: release.body,
        draft: release.draft,
        prerelease: release.prerelease,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent(crate::USER_AGENT)
        .build()
        .map_err(|err| PackshipError::GitHub(format!("failed to build HTTP client: {}", err)))?;

    let response = client
        .post(&url)
        .bearer_auth(release.auth_token)
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .json(&payload)
        .send()
        .map_err(|err| PackshipError::GitHub(format!("request to {} failed: {}", url, err)))?;

    let status = response.status();
    let body = response.text().unwrap_or_default();

    if !status.is_success() {
        let snippet: String = body.trim().chars().take(400).collect();
        return Err(PackshipError::GitHub(format!(
            "GitHub API returned {} for {}: {}",
            status, url, snippet
        )));
    }

    let value: JsonValue = serde_json::from_str(&body)
        .map_err(|err| PackshipError::GitHub(format!("invalid JSON from {}: {}", url, err)))?;

    Ok(value
        .get("html_url")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string())
}
