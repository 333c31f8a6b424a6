mod build;
mod cli;
mod fill_dist;
mod publish;

use clap::Parser;
use cli::{Cli, Commands};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => {
            if let Err(e) = build::run(&args) {
                eprintln!("Failed to build dist manifest: {e}");
                return ExitCode::from(1);
            }
        }
        Commands::FillDist(args) => {
            if let Err(e) = fill_dist::run(&args) {
                eprintln!("Failed to fill dist directory: {e}");
                return ExitCode::from(1);
            }
        }
        Commands::Publish(args) => {
            if let Err(e) = publish::run(&args) {
                eprintln!("Failed to publish package: {e}");
                return ExitCode::from(1);
            }
        }
    }
    ExitCode::SUCCESS
}
