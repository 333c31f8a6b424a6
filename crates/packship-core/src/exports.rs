use crate::errors::{Result, io_error_with_path};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

/// Public API surface of a package: export key to resolved target(s).
///
/// Keys are `"."` or `"./<subpath>"`. The map is kept in canonical key
/// order; consumers treat ordering as a serialization detail.
pub type ExportsMap = BTreeMap<String, ExportTarget>;

/// Resolved file(s) backing one export key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ExportTarget {
    /// Passthrough asset: a single output path.
    Simple(String),
    /// Per-condition resolution for module sources.
    Conditional(ConditionalExport),
}

/// Recognized resolution conditions, serialized types-first so runtimes
/// and bundlers pick up declarations before module code; `default` must
/// stay last to act as the fallback condition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ConditionalExport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Options for [`build_exports_map`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportsOptions {
    /// Emit a `require` condition pointing at the `.cjs` counterpart of
    /// every module entry (dual ESM/CJS output).
    pub add_require: bool,
}

/// Excludes a file from the exports map when it returns `true`.
///
/// Receives the extension-stripped path relative to the source dir, the
/// full on-disk path, and the extension (with leading dot).
pub type ExportFilter<'a> = dyn FnMut(&str, &Path, &str) -> bool + 'a;

/// The built-in exclusion filter: internal module name suffixes that never
/// form part of the public surface.
pub fn default_export_filter(fixed_path: &str, _full_path: &Path, _extension: &str) -> bool {
    [".store", ".store.types", ".types", ".impl"]
        .iter()
        .any(|suffix| fixed_path.ends_with(suffix))
}

/// File-name endings that are compiled artifacts, never passthrough assets.
const ARTIFACT_ENDINGS: [&str; 8] = [
    ".d.ts",
    ".ts",
    ".map",
    ".ctx",
    ".cts",
    ".d.cts",
    ".d.ts.map",
    ".d.cts.map",
];

/// Walk `root/<source_dir_name>` and derive the package's exports map.
///
/// - `.ts`/`.tsx` sources produce conditional targets pointing at their
///   compiled `.js`/`.d.ts` outputs, with `index` files flattened onto the
///   containing directory's key (`src/index.ts` owns `"."`).
/// - Already-compiled `.js`/`.cjs` files produce conditional targets
///   mirroring their own module format.
/// - Declaration files and other compiled artifacts produce nothing.
/// - Any other file becomes a simple passthrough entry.
///
/// Directory entries are sorted by name before recursing so the result is
/// stable across platforms; when two files normalize to the same key, the
/// last visited in that order wins. The `"./package.json"` self-reference
/// is appended by callers, not here.
///
/// Pure over filesystem reads; the filter is not guarded, so a panicking
/// filter aborts the whole build.
pub fn build_exports_map(
    root: &Path,
    source_dir_name: &str,
    filter: &mut ExportFilter<'_>,
    opts: ExportsOptions,
) -> Result<ExportsMap> {
    let source_dir = root.join(source_dir_name);
    let mut map = ExportsMap::new();
    visit_dir(&source_dir, &source_dir, filter, opts, &mut map)?;
    Ok(map)
}

fn visit_dir(
    dir: &Path,
    base: &Path,
    filter: &mut ExportFilter<'_>,
    opts: ExportsOptions,
    map: &mut ExportsMap,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .map_err(|e| io_error_with_path(e, dir))?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| io_error_with_path(e, dir))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| io_error_with_path(e, &path))?;
        if file_type.is_dir() {
            visit_dir(&path, base, filter, opts, map)?;
        } else {
            visit_file(&path, base, filter, opts, map);
        }
    }

    Ok(())
}

fn visit_file(
    path: &Path,
    base: &Path,
    filter: &mut ExportFilter<'_>,
    opts: ExportsOptions,
    map: &mut ExportsMap,
) {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    let relative = path.strip_prefix(base).unwrap_or(path);
    let fixed_path = slash_path(&relative.with_extension(""));

    if filter(&fixed_path, path, &extension) {
        return;
    }

    // Declaration files never produce entries, filtered or not.
    if file_name.ends_with(".d.ts") || file_name.ends_with(".d.cts") {
        return;
    }

    if extension == ".ts" || extension == ".tsx" {
        let key = if fixed_path == "index" {
            ".".to_string()
        } else if let Some(parent) = fixed_path.strip_suffix("/index") {
            // Index files act as the directory's entry point; the suffix is
            // stripped from the key but kept in the emitted file reference.
            format!("./{parent}")
        } else {
            format!("./{fixed_path}")
        };
        map.insert(key, conditional_target(&fixed_path, ".js", ".d.ts", opts));
    } else if file_name.ends_with(".cjs") || file_name.ends_with(".js") {
        let (js_ext, dts_ext) = if file_name.ends_with(".cjs") {
            (".cjs", ".d.cts")
        } else {
            (".js", ".d.ts")
        };
        map.insert(
            format!("./{fixed_path}"),
            conditional_target(&fixed_path, js_ext, dts_ext, opts),
        );
    } else if !ARTIFACT_ENDINGS
        .iter()
        .any(|ending| file_name.ends_with(ending))
    {
        map.insert(
            format!("./{fixed_path}"),
            ExportTarget::Simple(format!("./{fixed_path}{extension}")),
        );
    }
}

fn conditional_target(
    fixed_path: &str,
    js_ext: &str,
    dts_ext: &str,
    opts: ExportsOptions,
) -> ExportTarget {
    ExportTarget::Conditional(ConditionalExport {
        types: Some(format!("./{fixed_path}{dts_ext}")),
        import: Some(format!("./{fixed_path}{js_ext}")),
        require: opts.add_require.then(|| format!("./{fixed_path}.cjs")),
        default: Some(format!("./{fixed_path}{js_ext}")),
    })
}

/// Render a relative path with forward slashes, as used in export keys.
fn slash_path(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}
