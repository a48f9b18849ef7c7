// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! CLI module.
//!
//! This module contains the command-line interface logic, including argument parsing
//! and the `postprocess` command implementation.

// Modules
/// CLI arguments.
pub mod args;

/// Postprocessing of dumped model outputs.
pub mod postprocess;
