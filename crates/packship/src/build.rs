use crate::cli::BuildArgs;
use packship_core::Config;
use packship_core::dist::{PostBuildOptions, VersionChangeEvent, run_post_build};
use packship_core::errors::Result;
use packship_core::process::SystemRunner;
use packship_core::publish::{PublishHooks, PublishOptions, run_publish};
use packship_core::registry::NpmRegistry;

pub fn run(args: &BuildArgs) -> Result<()> {
    let config = Config::load(&args.root)?;
    let runner = SystemRunner::default();

    let opts = PostBuildOptions {
        root_dir: args.root.clone(),
        build_dir: args
            .build_dir
            .clone()
            .unwrap_or_else(|| config.build_dir.clone()),
        source_dir: args
            .src_dir
            .clone()
            .unwrap_or_else(|| config.source_dir.clone()),
        files_to_copy: config.files_to_copy.clone(),
        dual_require: config.dual_require,
    };

    // The PUBLISH gate turns a version change into an immediate publish.
    let publish_gate = std::env::var("PUBLISH").is_ok_and(|v| !v.is_empty());

    let mut hook = |event: VersionChangeEvent<'_>| {
        let previous = event.diff.previous.as_deref().unwrap_or("(none)");
        println!("Package version changed: {previous} -> {}", event.diff.next);

        if !publish_gate {
            return Ok(());
        }

        let publish_opts = PublishOptions {
            next_version: Some(event.diff.next.clone()),
            prev_version: event.diff.previous.clone(),
            package_manager: config.package_manager,
            dist_tag: config.dist_tag.clone(),
            commit_all_current_changes: true,
            git_tag_format: config.git_tag_format.clone(),
            commit_prefixes: config.commit_prefixes.clone(),
            root_dir: args.root.clone(),
            build_dir: opts.build_dir.clone(),
            ..PublishOptions::default()
        };

        run_publish(
            &runner,
            &NpmRegistry::default(),
            &publish_opts,
            Some(event.manifest),
            PublishHooks::default(),
        )?;
        Ok(())
    };

    let mut filter = config.export_filter();
    run_post_build(&runner, &opts, &mut filter, Some(&mut hook))
}
