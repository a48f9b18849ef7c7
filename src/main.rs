// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process;

use clap::Parser;

use pose_inference::cli::args::{Cli, Commands};
use pose_inference::cli::postprocess::run_postprocess;
use pose_inference::error;

fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Postprocess(args) => run_postprocess(args),
    };

    if let Err(e) = result {
        error!("{e}");
        process::exit(1);
    }
}
