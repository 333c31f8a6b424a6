use crate::errors::PackshipError;
use crate::types::PackageManager;
use std::path::Path;

/// Default module-name suffixes excluded from the public surface.
pub const DEFAULT_EXCLUDE_SUFFIXES: [&str; 4] = [".store", ".store.types", ".types", ".impl"];

/// Default commit-subject prefixes kept in tag annotation messages.
pub const DEFAULT_COMMIT_PREFIXES: [&str; 5] = [
    "feat",
    "fix",
    "BREAKING CHANGE",
    "BREAKING_CHANGE",
    "Initial commit",
];

/// Configuration for Packship, loaded from `.packship/config.toml`.
#[derive(Debug, Clone)]
pub struct Config {
    pub package_manager: PackageManager,
    /// Alternate names the package is republished under.
    pub other_names: Vec<String>,
    /// Distribution tag passed to the publish command (`--tag`).
    pub dist_tag: Option<String>,
    pub source_dir: String,
    pub build_dir: String,
    /// Extra files copied into the build dir alongside the manifest.
    pub files_to_copy: Vec<String>,
    /// Exports excluded by module-name suffix.
    pub exclude_suffixes: Vec<String>,
    /// Exports excluded by glob pattern over the extension-stripped path.
    pub exclude_patterns: Vec<glob::Pattern>,
    /// Emit dual ESM/CJS `require` conditions.
    pub dual_require: bool,
    /// Branches publishing is allowed from; empty allows any branch.
    pub release_branches: Vec<String>,
    /// Template for published tag labels; `<version>` is substituted.
    pub git_tag_format: String,
    pub commit_prefixes: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            package_manager: PackageManager::Pnpm,
            other_names: Vec::new(),
            dist_tag: None,
            source_dir: "src".to_string(),
            build_dir: "dist".to_string(),
            files_to_copy: vec!["LICENSE".to_string(), "README.md".to_string()],
            exclude_suffixes: DEFAULT_EXCLUDE_SUFFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_patterns: Vec::new(),
            dual_require: false,
            release_branches: Vec::new(),
            git_tag_format: "v<version>".to_string(),
            commit_prefixes: DEFAULT_COMMIT_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load configuration from .packship/config.toml
    pub fn load(root: &Path) -> Result<Self, PackshipError> {
        let base = root.join(".packship");
        let path = base.join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path)?;
        let value: toml::Value = text
            .parse()
            .map_err(|e| PackshipError::Config(format!("invalid config.toml: {e}")))?;

        let mut config = Self::default();

        if let Some(package) = value.get("package").and_then(|v| v.as_table()) {
            if let Some(manager) = package.get("manager").and_then(|v| v.as_str()) {
                config.package_manager = PackageManager::parse(manager).ok_or_else(|| {
                    PackshipError::Config(format!("unsupported package manager '{manager}'"))
                })?;
            }
            if let Some(names) = package.get("other_names") {
                config.other_names = string_array(names, "package.other_names")?;
            }
            if let Some(tag) = package.get("dist_tag").and_then(|v| v.as_str()) {
                config.dist_tag = Some(tag.to_string());
            }
        }

        if let Some(build) = value.get("build").and_then(|v| v.as_table()) {
            if let Some(dir) = build.get("source_dir").and_then(|v| v.as_str()) {
                config.source_dir = dir.to_string();
            }
            if let Some(dir) = build.get("build_dir").and_then(|v| v.as_str()) {
                config.build_dir = dir.to_string();
            }
            if let Some(files) = build.get("files_to_copy") {
                config.files_to_copy = string_array(files, "build.files_to_copy")?;
            }
        }

        if let Some(exports) = value.get("exports").and_then(|v| v.as_table()) {
            if let Some(suffixes) = exports.get("exclude_suffixes") {
                config.exclude_suffixes = string_array(suffixes, "exports.exclude_suffixes")?;
            }
            if let Some(patterns) = exports.get("exclude_patterns") {
                config.exclude_patterns = string_array(patterns, "exports.exclude_patterns")?
                    .iter()
                    .map(|raw| {
                        glob::Pattern::new(raw).map_err(|e| {
                            PackshipError::Config(format!("invalid exclude pattern '{raw}': {e}"))
                        })
                    })
                    .collect::<Result<_, _>>()?;
            }
            if let Some(dual) = exports.get("dual_require").and_then(|v| v.as_bool()) {
                config.dual_require = dual;
            }
        }

        if let Some(git) = value.get("git").and_then(|v| v.as_table()) {
            if let Some(branches) = git.get("release_branches") {
                config.release_branches = string_array(branches, "git.release_branches")?;
            }
            if let Some(format) = git.get("tag_format").and_then(|v| v.as_str()) {
                config.git_tag_format = format.to_string();
            }
            if let Some(prefixes) = git.get("commit_prefixes") {
                config.commit_prefixes = string_array(prefixes, "git.commit_prefixes")?;
            }
        }

        Ok(config)
    }

    /// Whether publishing is allowed from `branch`.
    pub fn is_release_branch(&self, branch: &str) -> bool {
        self.release_branches.is_empty() || self.release_branches.iter().any(|b| b == branch)
    }

    /// Exports filter combining the configured suffixes and glob patterns.
    pub fn export_filter(&self) -> impl FnMut(&str, &Path, &str) -> bool + '_ {
        move |fixed_path: &str, _full_path: &Path, _extension: &str| {
            self.exclude_suffixes
                .iter()
                .any(|suffix| fixed_path.ends_with(suffix))
                || self
                    .exclude_patterns
                    .iter()
                    .any(|pattern| pattern.matches(fixed_path))
        }
    }
}

fn string_array(value: &toml::Value, key: &str) -> Result<Vec<String>, PackshipError> {
    value
        .as_array()
        .ok_or_else(|| PackshipError::Config(format!("{key} must be an array of strings")))?
        .iter()
        .map(|item| {
            item.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| PackshipError::Config(format!("{key} entries must be strings")))
        })
        .collect()
}
