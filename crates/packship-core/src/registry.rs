use crate::errors::{PackshipError, Result};
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use std::sync::{Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_NPM_REGISTRY: &str = "https://registry.npmjs.org/";
const REGISTRY_RATE_LIMIT: Duration = Duration::from_millis(300);

static REGISTRY_LAST_CALL: OnceLock<Mutex<Option<Instant>>> = OnceLock::new();

/// Looks up which versions of a package a registry already knows about.
///
/// `Ok(None)` means the package does not exist at all ("not yet
/// published"); that is distinct from a query failure, which is an error.
pub trait RegistryQuery {
    fn published_versions(&self, package_name: &str) -> Result<Option<Vec<String>>>;

    /// Whether an exact version is already published.
    fn version_exists(&self, package_name: &str, version: &str) -> Result<bool> {
        Ok(self
            .published_versions(package_name)?
            .is_some_and(|versions| versions.iter().any(|v| v == version)))
    }
}

/// npm registry metadata client.
#[derive(Debug, Clone, Default)]
pub struct NpmRegistry {
    /// Registry base URL; the public npm registry when unset.
    pub registry_url: Option<String>,
}

impl NpmRegistry {
    pub fn new(registry_url: Option<String>) -> Self {
        Self { registry_url }
    }
}

impl RegistryQuery for NpmRegistry {
    fn published_versions(&self, package_name: &str) -> Result<Option<Vec<String>>> {
        enforce_registry_rate_limit();

        let base_url = self
            .registry_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_NPM_REGISTRY);

        let url = build_registry_url(base_url, package_name)?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(crate::USER_AGENT)
            .build()
            .map_err(|err| {
                PackshipError::Registry(format!("failed to build HTTP client: {}", err))
            })?;

        let response = client.get(url.clone()).send().map_err(|err| {
            PackshipError::Registry(format!("HTTP request to {} failed: {}", url, err))
        })?;

        let status = response.status();

        if status == StatusCode::OK {
            let body = response.text().map_err(|err| {
                PackshipError::Registry(format!("failed to read registry response: {}", err))
            })?;
            let value: JsonValue = serde_json::from_str(&body).map_err(|err| {
                PackshipError::Registry(format!("invalid JSON from {}: {}", url, err))
            })?;
            let versions = value
                .get("versions")
                .and_then(JsonValue::as_object)
                .ok_or_else(|| {
                    PackshipError::Registry(format!(
                        "registry response for {} is missing a 'versions' object",
                        package_name
                    ))
                })?;
            Ok(Some(versions.keys().cloned().collect()))
        } else if status == StatusCode::NOT_FOUND {
            Ok(None)
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|s| format!(" Retry-After: {s}"));
            Err(PackshipError::Registry(format!(
                "Registry {} returned 429 Too Many Requests{}",
                url,
                retry_after.unwrap_or_default()
            )))
        } else {
            let body = response.text().unwrap_or_default();
            let snippet: String = body.trim().chars().take(400).collect();
            Err(PackshipError::Registry(format!(
                "Registry {} returned {}: {}",
                url, status, snippet
            )))
        }
    }
}

fn enforce_registry_rate_limit() {
    let lock = REGISTRY_LAST_CALL.get_or_init(|| Mutex::new(None));
    let mut guard = lock.lock().unwrap();
    let now = Instant::now();
    if let Some(last) = *guard {
        let elapsed = now.saturating_duration_since(last);
        if elapsed < REGISTRY_RATE_LIMIT {
            thread::sleep(REGISTRY_RATE_LIMIT - elapsed);
        }
    }
    *guard = Some(Instant::now());
}

fn build_registry_url(base: &str, package_name: &str) -> Result<reqwest::Url> {
    let trimmed = if base.trim().is_empty() {
        DEFAULT_NPM_REGISTRY
    } else {
        base.trim()
    };
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    let base_url = reqwest::Url::parse(&normalized).map_err(|err| {
        PackshipError::Registry(format!("invalid registry URL '{}': {}", base, err))
    })?;
    let encoded = encode_package_name(package_name);
    base_url.join(&encoded).map_err(|err| {
        PackshipError::Registry(format!(
            "failed to construct registry URL for '{}': {}",
            package_name, err
        ))
    })
}

fn encode_package_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for b in name.bytes() {
        match b {
            b'0'..=b'9' | b'a'..=b'z' | b'-' | b'_' | b'.' | b'~' => encoded.push(b as char),
            b'@' => encoded.push_str("%40"),
            b'/' => encoded.push_str("%2F"),
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}
