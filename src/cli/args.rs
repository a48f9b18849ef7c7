// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::task::Task;

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Postprocess Options:
    --input, -i <INPUT>    JSON file with the raw model outputs of every frame
    --config, -c <CONFIG>  JSON project configuration (scorer, bodyparts, individuals, task)
    --task <TASK>          Override the task (BU, TD, DT)
    --output, -o <DIR>     Output directory [default: next to the input]
    --overwrite            Overwrite existing results
    --verbose              Show per-frame output
    --quiet                Only show warnings and errors

Examples:
    pose-inference postprocess --input video_raw.json --config project.json
    pose-inference postprocess -i video_raw.json -c project.json --task td -o results/
    pose-inference postprocess -i video_raw.json -c project.json --overwrite --verbose"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Postprocess raw model outputs and export the predictions
    Postprocess(PostprocessArgs),
}

/// Arguments for the postprocess command.
#[derive(Args, Debug)]
pub struct PostprocessArgs {
    /// JSON file with the raw model outputs of every frame
    #[arg(short, long)]
    pub input: PathBuf,

    /// JSON project configuration
    #[arg(short, long)]
    pub config: PathBuf,

    /// Override the task from the configuration (BU, TD, DT)
    #[arg(long)]
    pub task: Option<Task>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Overwrite existing results
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Show per-frame output
    #[arg(long, default_value_t = false, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only show warnings and errors
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}
