use crate::cli::FillDistArgs;
use packship_core::Config;
use packship_core::dist::{FillDistOptions, run_fill_dist};
use packship_core::errors::Result;

/// Files `run_fill_dist` copies on its own.
const STANDARD_FILES: [&str; 3] = ["LICENSE", "README.md", "package.json"];

pub fn run(args: &FillDistArgs) -> Result<()> {
    let config = Config::load(&args.root)?;

    let extra_files_to_copy = config
        .files_to_copy
        .iter()
        .filter(|file| !STANDARD_FILES.contains(&file.as_str()))
        .cloned()
        .collect();

    run_fill_dist(&FillDistOptions {
        root_dir: args.root.clone(),
        build_dir: args
            .build_dir
            .clone()
            .unwrap_or_else(|| config.build_dir.clone()),
        extra_files_to_copy,
        bin_path: args.bin.clone(),
        ignored_modules: args.ignore.clone(),
    })
}
