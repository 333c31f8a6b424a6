use crate::errors::{Result, io_error_with_path};
use crate::exports::{
    ConditionalExport, ExportFilter, ExportTarget, ExportsMap, ExportsOptions, build_exports_map,
};
use crate::manifest::PackageManifest;
use crate::process::CommandRunner;
use crate::types::VersionDiff;
use crate::version::detect_version_change;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Options for [`run_post_build`].
#[derive(Debug, Clone)]
pub struct PostBuildOptions {
    pub root_dir: PathBuf,
    pub build_dir: String,
    pub source_dir: String,
    pub files_to_copy: Vec<String>,
    pub dual_require: bool,
}

/// Fired once by [`run_post_build`] when the manifest's version field has a
/// pending change.
pub struct VersionChangeEvent<'a> {
    pub diff: &'a VersionDiff,
    pub manifest: &'a mut PackageManifest,
}

/// Post-build hook type; see [`run_post_build`].
pub type VersionChangedHook<'a> = dyn FnMut(VersionChangeEvent<'_>) -> Result<()> + 'a;

/// Derive the build dir's manifest from the source tree.
///
/// Copies the configured files into the build dir, synthesizes the exports
/// map from the source tree, patches the manifest (exports, `files`,
/// `main`/`types`) and writes it to `{build_dir}/package.json`. Afterwards
/// the version-diff detector runs and, when a change is pending, the hook
/// fires with the diff and the root manifest accessor.
pub fn run_post_build(
    runner: &dyn CommandRunner,
    opts: &PostBuildOptions,
    filter: &mut ExportFilter<'_>,
    mut on_version_changed: Option<&mut VersionChangedHook<'_>>,
) -> Result<()> {
    let manifest_path = opts.root_dir.join("package.json");
    let mut manifest = PackageManifest::load(&manifest_path)?;

    let build_path = opts.root_dir.join(&opts.build_dir);
    copy_files_into(&opts.root_dir, &build_path, &opts.files_to_copy)?;

    let exports = build_exports_map(
        &opts.root_dir,
        &opts.source_dir,
        filter,
        ExportsOptions {
            add_require: opts.dual_require,
        },
    )?;

    let mut dist_manifest =
        PackageManifest::from_parts(build_path.join("package.json"), manifest.data().clone());
    dist_manifest.apply_exports(&exports);
    dist_manifest.persist()?;

    match detect_version_change(runner, &manifest_path) {
        Some(diff) => {
            if let Some(hook) = on_version_changed.as_deref_mut() {
                hook(VersionChangeEvent {
                    diff: &diff,
                    manifest: &mut manifest,
                })?;
            }
        }
        None => println!("Package version unchanged"),
    }

    Ok(())
}

/// Options for [`run_fill_dist`].
#[derive(Debug, Clone)]
pub struct FillDistOptions {
    pub root_dir: PathBuf,
    pub build_dir: String,
    /// Copied in addition to LICENSE, README.md and package.json.
    pub extra_files_to_copy: Vec<String>,
    /// Value for the manifest's `bin` field, when the package ships one.
    pub bin_path: Option<String>,
    /// Module names left out of the generated exports.
    pub ignored_modules: Vec<String>,
}

/// Prepare an already-compiled build dir for publishing.
///
/// Copies the standard files in, then scans the build dir for compiled
/// `.js`/`.cjs`/`.d.ts` outputs and generates a types-first exports map
/// from what is actually present. Incomplete triples are kept but warned
/// about. `scripts` and `devDependencies` are dropped from the dist
/// manifest, and entry fields still pointing into the build dir are
/// rewritten to be dist-relative.
pub fn run_fill_dist(opts: &FillDistOptions) -> Result<()> {
    println!("Preparing {} folder...", opts.build_dir);

    let build_path = opts.root_dir.join(&opts.build_dir);
    let mut files_to_copy = vec![
        "LICENSE".to_string(),
        "README.md".to_string(),
        "package.json".to_string(),
    ];
    files_to_copy.extend(opts.extra_files_to_copy.iter().cloned());
    copy_files_into(&opts.root_dir, &build_path, &files_to_copy)?;

    let mut manifest = PackageManifest::load(build_path.join("package.json"))?;

    if let Some(bin) = &opts.bin_path {
        manifest.set("bin", Value::String(bin.clone()));
    }

    let module_names = collect_module_names(&build_path, &files_to_copy, &opts.ignored_modules)?;

    let mut exports = ExportsMap::new();
    let mut main_field: Option<String> = None;

    for name in &module_names {
        let has_js = build_path.join(format!("{name}.js")).exists();
        let has_cjs = build_path.join(format!("{name}.cjs")).exists();
        let has_dts = build_path.join(format!("{name}.d.ts")).exists();
        let is_index = name == "index";

        let entry = ConditionalExport {
            types: has_dts.then(|| format!("./{name}.d.ts")),
            import: has_js.then(|| format!("./{name}.js")),
            require: has_cjs.then(|| format!("./{name}.cjs")),
            default: None,
        };
        let default = entry.import.clone().or_else(|| entry.require.clone());

        let export_path = if is_index {
            ".".to_string()
        } else {
            format!("./{name}")
        };

        let mut field_count = [&entry.types, &entry.import, &entry.require]
            .iter()
            .filter(|f| f.is_some())
            .count();

        let entry = if let Some(default) = default {
            if is_index && manifest.data().get("main").is_none() {
                main_field = Some(default.trim_start_matches("./").to_string());
            }
            field_count += 1;
            ConditionalExport {
                default: Some(default),
                ..entry
            }
        } else {
            entry
        };

        if field_count < 3 {
            eprintln!(
                "Warning: incomplete export entry for {export_path} (probably bad import in source code)"
            );
        }

        exports.insert(export_path, ExportTarget::Conditional(entry));
    }

    if let Some(main) = main_field {
        manifest.set("main", Value::String(main));
    }

    manifest.set(
        "exports",
        serde_json::to_value(&exports).unwrap_or(Value::Null),
    );
    manifest.set("files", serde_json::json!(["*"]));
    manifest.remove("scripts");
    manifest.remove("devDependencies");
    rewrite_build_dir_paths(&mut manifest, &opts.build_dir);
    manifest.persist()?;

    println!("Generated exports for {} modules", module_names.len());
    println!("Updated {}/package.json", opts.build_dir);
    Ok(())
}

/// Top-level module names in the build dir, derived from compiled file
/// names (`.d.ts` stripped before `.cjs` before `.js`). Source maps, the
/// copied files, and anything not compiler output are skipped.
fn collect_module_names(
    build_path: &Path,
    copied_files: &[String],
    ignored: &[String],
) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();

    for entry in fs::read_dir(build_path).map_err(|e| io_error_with_path(e, build_path))? {
        let entry = entry.map_err(|e| io_error_with_path(e, build_path))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();

        if file_name.ends_with(".map") || copied_files.iter().any(|f| f == &file_name) {
            continue;
        }

        let module_name = if let Some(stem) = file_name.strip_suffix(".d.ts") {
            stem
        } else if let Some(stem) = file_name.strip_suffix(".cjs") {
            stem
        } else if let Some(stem) = file_name.strip_suffix(".js") {
            stem
        } else {
            continue;
        };

        if ignored.iter().any(|i| i == module_name) {
            continue;
        }

        names.insert(module_name.to_string());
    }

    Ok(names)
}

/// Rewrite `./{build_dir}/…` references in entry-point fields so they are
/// relative to the dist manifest's own directory.
fn rewrite_build_dir_paths(manifest: &mut PackageManifest, build_dir: &str) {
    let prefix = format!("./{build_dir}/");
    for field in ["main", "types", "bin"] {
        let Some(Value::String(current)) = manifest.data().get(field) else {
            continue;
        };
        if let Some(rest) = current.strip_prefix(&prefix) {
            let rewritten = format!("./{rest}");
            manifest.set(field, Value::String(rewritten));
        }
    }
}

fn copy_files_into(root: &Path, build_path: &Path, files: &[String]) -> Result<()> {
    fs::create_dir_all(build_path).map_err(|e| io_error_with_path(e, build_path))?;

    for file in files {
        let source = root.join(file);
        if !source.exists() {
            eprintln!("Warning: {file} not found, skipping");
            continue;
        }
        let file_name = source.file_name().unwrap_or(source.as_os_str());
        copy_recursively(&source, &build_path.join(file_name))?;
        println!("Copied {file}");
    }

    Ok(())
}

fn copy_recursively(source: &Path, target: &Path) -> Result<()> {
    if source.is_dir() {
        fs::create_dir_all(target).map_err(|e| io_error_with_path(e, target))?;
        for entry in fs::read_dir(source).map_err(|e| io_error_with_path(e, source))? {
            let entry = entry.map_err(|e| io_error_with_path(e, source))?;
            copy_recursively(&entry.path(), &target.join(entry.file_name()))?;
        }
    } else {
        fs::copy(source, target).map_err(|e| io_error_with_path(e, target))?;
    }
    Ok(())
}
