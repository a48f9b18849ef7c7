// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::fs;
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::analyze::{VideoMetadata, VideoPredictions, save_predictions};
use crate::cli::args::PostprocessArgs;
use crate::error::{PoseError, Result};
use crate::export::ExportPaths;
use crate::logging::{Verbosity, set_verbosity};
use crate::postprocessing::build_postprocessor;
use crate::runner::{RawFrame, postprocess_frames};
use crate::{AnalysisConfig, VERSION};
use crate::{info, section, success, verbose, warn};

/// Postprocess the raw model outputs stored in `args.input` and export the predictions.
///
/// The input is a JSON array with one `{"candidates": [...], "context": {...}}` object
/// per frame.
///
/// # Errors
///
/// Returns an error if the input or configuration cannot be read, a frame fails to
/// postprocess, or the results cannot be written.
#[allow(clippy::cast_precision_loss)]
pub fn run_postprocess(args: &PostprocessArgs) -> Result<()> {
    set_verbosity(if args.quiet {
        Verbosity::Quiet
    } else if args.verbose {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    });

    let mut config = AnalysisConfig::from_json_file(&args.config)?;
    if let Some(task) = args.task {
        config = config.with_task(task);
    }
    if args.overwrite {
        config = config.with_overwrite(true);
    }

    let stem = args
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PoseError::ConfigError(format!("invalid input path {}", args.input.display())))?;
    let dir = args
        .output
        .as_deref()
        .or_else(|| args.input.parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let paths = ExportPaths::new(dir, stem, &config.scorer);
    if paths.exists() && !config.overwrite {
        warn!(
            "{} already postprocessed, found {}. Use --overwrite to run it again.",
            args.input.display(),
            paths.table.display()
        );
        return Ok(());
    }

    section!("pose-inference {VERSION} | task {} | scorer {}", config.task, config.scorer);
    let frames: Vec<RawFrame> = serde_json::from_str(&fs::read_to_string(&args.input)?)?;
    info!("Loaded {} frames from {}", frames.len(), args.input.display());
    verbose!(
        "{} bodyparts, {} unique bodyparts, {} individuals",
        config.bodyparts.len(),
        config.unique_bodyparts.len(),
        config.max_individuals()
    );

    let start = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64());
    let timer = Instant::now();
    let postprocessor = build_postprocessor(config.task, &config.postprocess_config())?;
    let predictions = postprocess_frames(&postprocessor, frames)?;
    let run_duration = timer.elapsed().as_secs_f64();
    info!(
        "Postprocessed {} frames in {:.1}ms",
        predictions.len(),
        run_duration * 1000.0
    );

    let result = VideoPredictions {
        metadata: VideoMetadata {
            nframes: predictions.len(),
            frame_dimensions: None,
            start,
            stop: start + run_duration,
            run_duration,
            task: config.task,
        },
        predictions,
    };

    fs::create_dir_all(dir)?;
    save_predictions(&result, &config, &paths)?;
    success!("Results saved to {}", dir.display());
    Ok(())
}
