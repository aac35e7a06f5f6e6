//! Log verbosity flags and global subscriber installation.
//!
//! The sink itself is chosen by the container (`LOG_BACKEND`/`APP_ENV`);
//! the CLI only adjusts its level and makes it the process default so that
//! library `tracing` events land in it.
//!
//! # Verbosity mapping
//!
//! | Flag(s)  | Filter level |
//! |----------|--------------|
//! | (none)   | `LOG_LEVEL`  |
//! | `-v`     | INFO         |
//! | `-vv`    | DEBUG        |
//! | `-vvv`   | TRACE        |
//! | `--quiet`| ERROR        |

use anyhow::Context as _;
use keel_adapters::{Logger, Settings};

use crate::cli::GlobalArgs;

/// Apply `-v`/`-q` on top of the loaded settings.
pub fn apply_verbosity(settings: &mut Settings, args: &GlobalArgs) {
    if let Some(level) = derive_level(args) {
        settings.logging.level = level.to_string();
    }
}

/// Make `logger`'s sink the global subscriber.
///
/// Must be called at most once per process.
pub fn init_logging(logger: &Logger) -> anyhow::Result<()> {
    logger
        .install_global()
        .with_context(|| format!("installing the {} log sink", logger.backend()))
}

/// Translate the verbosity counter + quiet flag to a level string.
fn derive_level(args: &GlobalArgs) -> Option<&'static str> {
    if args.quiet {
        return Some("error");
    }
    match args.verbose {
        0 => None,
        1 => Some("info"),
        2 => Some("debug"),
        _ => Some("trace"),
    }
}
