// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Console logging macros with a process-wide verbosity level.
//!
//! `info!`, `success!` and `section!` print in [`Verbosity::Normal`] and above,
//! `verbose!` only in [`Verbosity::Verbose`]. `warn!` and `error!` always go to stderr.

use std::sync::atomic::{AtomicU8, Ordering};

/// How much is printed to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Only warnings and errors.
    Quiet = 0,
    /// Progress and summaries.
    Normal = 1,
    /// Everything, including per-frame details.
    Verbose = 2,
}

static VERBOSITY: AtomicU8 = AtomicU8::new(Verbosity::Normal as u8);

/// Set the global verbosity level.
pub fn set_verbosity(verbosity: Verbosity) {
    VERBOSITY.store(verbosity as u8, Ordering::Relaxed);
}

/// Current global verbosity level.
pub fn verbosity() -> Verbosity {
    Verbosity::from_level(VERBOSITY.load(Ordering::Relaxed))
}

impl Verbosity {
    const fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Quiet,
            1 => Self::Normal,
            _ => Self::Verbose,
        }
    }
}

/// Returns whether messages at `level` should be printed.
pub fn enabled(level: Verbosity) -> bool {
    verbosity() >= level
}

/// Macro for standard info messages.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if $crate::logging::enabled($crate::logging::Verbosity::Normal) {
            println!("{}", format!($($arg)*));
        }
    }
}

/// Macro for warning messages.
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "WARNING ⚠️".yellow().bold(), format!($($arg)*));
    }}
}

/// Macro for error messages.
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "Error:".red().bold(), format!($($arg)*));
    }}
}

/// Macro for success messages.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        if $crate::logging::enabled($crate::logging::Verbosity::Normal) {
            println!("{} {}", "✅".green(), format!($($arg)*));
        }
    }}
}

/// Macro for verbose messages.
#[macro_export]
macro_rules! verbose {
    ($($arg:tt)*) => {
        if $crate::logging::enabled($crate::logging::Verbosity::Verbose) {
            println!("{}", format!($($arg)*));
        }
    }
}

/// Macro for section headers.
#[macro_export]
macro_rules! section {
    ($($arg:tt)*) => {{
        use colored::Colorize;
        if $crate::logging::enabled($crate::logging::Verbosity::Normal) {
            println!();
            println!("{}", format!($($arg)*).cyan().bold());
        }
    }}
}
