use crate::errors::{PackshipError, Result, io_error_with_path};
use crate::exports::{ExportTarget, ExportsMap};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// GitHub coordinates derived from a manifest's repository field.
///
/// Both fields are empty strings when the field is absent or unparseable;
/// the derived views never fail.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GithubRepo {
    pub owner: String,
    pub name: String,
}

/// Owns a loaded `package.json` document and its persistence.
///
/// All mutations go through accessor methods so the in-memory document and
/// the file never drift apart. Unknown fields round-trip untouched. Two
/// accessors over the same file must not be live at once; callers
/// serialize publish attempts per package.
#[derive(Debug, Clone)]
pub struct PackageManifest {
    path: PathBuf,
    data: Map<String, Value>,
}

impl PackageManifest {
    /// Parse the manifest at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = fs::read_to_string(&path).map_err(|e| io_error_with_path(e, &path))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| PackshipError::Manifest(format!("{}: {}", path.display(), e)))?;
        let data = match value {
            Value::Object(map) => map,
            _ => {
                return Err(PackshipError::Manifest(format!(
                    "{}: expected a JSON object",
                    path.display()
                )));
            }
        };
        Ok(Self { path, data })
    }

    /// Wrap an already-parsed document (used by dist patching).
    pub fn from_parts(path: impl Into<PathBuf>, data: Map<String, Value>) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory containing the manifest file.
    pub fn location_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn name(&self) -> Option<&str> {
        self.data.get("name").and_then(Value::as_str)
    }

    pub fn version(&self) -> Option<&str> {
        self.data.get("version").and_then(Value::as_str)
    }

    /// The repository URL, whether given as a plain string or as the
    /// `{type, url}` object form.
    pub fn repository_url(&self) -> Option<&str> {
        match self.data.get("repository") {
            Some(Value::String(url)) => Some(url),
            Some(Value::Object(map)) => map.get("url").and_then(Value::as_str),
            _ => None,
        }
    }

    /// GitHub owner/name parsed out of the repository URL. Fails soft.
    pub fn github_repo(&self) -> GithubRepo {
        let Some(url) = self.repository_url() else {
            return GithubRepo::default();
        };
        let Some(rest) = url.split("github.com/").nth(1) else {
            return GithubRepo::default();
        };
        let mut parts = rest.split('/');
        let owner = parts.next().unwrap_or_default().to_string();
        let name = parts
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string();
        if owner.is_empty() {
            return GithubRepo::default();
        }
        GithubRepo { owner, name }
    }

    /// Canonical `https://github.com/{owner}/{name}` link.
    pub fn repository_link(&self) -> String {
        let repo = self.github_repo();
        format!("https://github.com/{}/{}", repo.owner, repo.name)
    }

    /// Shallow-merge fields into the document and persist immediately.
    pub fn update(&mut self, fields: Map<String, Value>) -> Result<()> {
        for (key, value) in fields {
            self.data.insert(key, value);
        }
        self.persist()
    }

    /// Rewrite the package name and persist.
    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.data
            .insert("name".to_string(), Value::String(name.to_string()));
        self.persist()
    }

    /// Remove a top-level field, if present. Does not persist on its own.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    /// Set a top-level field. Does not persist on its own.
    pub fn set(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Overwrite `exports`/`files`/`main`/`types` from a built exports map,
    /// appending the `"./package.json"` self-reference. Does not persist.
    pub fn apply_exports(&mut self, exports: &ExportsMap) {
        let root_export = exports.get(".").cloned();

        let mut value = serde_json::to_value(exports).unwrap_or(Value::Object(Map::new()));
        if let Value::Object(map) = &mut value {
            map.insert(
                "./package.json".to_string(),
                Value::String("./package.json".to_string()),
            );
        }
        self.data.insert("exports".to_string(), value);
        self.data
            .insert("files".to_string(), serde_json::json!(["*"]));

        match root_export {
            Some(ExportTarget::Simple(path)) => {
                self.data.insert("main".to_string(), Value::String(path));
            }
            Some(ExportTarget::Conditional(entry)) => {
                if let Some(import) = entry.import {
                    self.data.insert("main".to_string(), Value::String(import));
                }
                if let Some(types) = entry.types {
                    self.data.insert("types".to_string(), Value::String(types));
                }
            }
            None => {}
        }
    }

    /// Serialize the current state back to disk, pretty-printed.
    ///
    /// Writes to a temp file in the manifest's directory and renames it
    /// over the target, so readers never observe a partial document.
    pub fn persist(&self) -> Result<()> {
        self.write_to(&self.path)
    }

    /// Persist the current state to an arbitrary location.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let mut text = serde_json::to_string_pretty(&Value::Object(self.data.clone()))
            .map_err(|e| PackshipError::Manifest(format!("{}: {}", path.display(), e)))?;
        text.push('\n');

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &text).map_err(|e| io_error_with_path(e, &tmp))?;
        fs::rename(&tmp, path).map_err(|e| io_error_with_path(e, path))?;
        Ok(())
    }
}
