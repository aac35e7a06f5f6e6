//! # Keel CLI
//!
//! Resolves the runtime environment into a persistence engine and a log
//! backend, then runs one command against them.
//!
//! ## Startup sequence
//!
//! 1. Parse CLI arguments (`--help` / `--version` exit early).
//! 2. Load settings from the environment (and `.env` if present).
//! 3. Build the container; this selects the log sink.
//! 4. Install the root logger as the process-wide subscriber.
//! 5. Dispatch to the command handler.
//! 6. Translate any [`CliError`] into a user-facing message and exit code.
//!
//! ## Exit codes
//!
//! | Code | Meaning                 |
//! |------|-------------------------|
//! |  0   | Success                 |
//! |  1   | Internal / system error |
//! |  2   | User / input error      |
//! |  3   | Resource not found      |
//! |  4   | Configuration error     |

use std::{
    io::{self, IsTerminal},
    process::ExitCode,
};

use clap::Parser;
use keel_adapters::{Container, Settings};
use tracing::{debug, instrument};

use crate::{
    cli::{Cli, Commands},
    error::{CliError, CliResult},
    logging::{apply_verbosity, init_logging},
    output::OutputManager,
};

mod cli;
mod commands;
mod error;
mod logging;
mod output;

fn main() -> ExitCode {
    // Missing .env is fine; deployments set real variables.
    let _ = dotenvy::dotenv();

    // ── 1. Parse arguments ────────────────────────────────────────────────
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let verbose = cli.global.verbose > 0;

    // Completions need neither settings nor backends.
    if let Commands::Completions(args) = cli.command {
        return match commands::completions::execute(args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => handle_error(e, verbose),
        };
    }

    // ── 2. Load settings ──────────────────────────────────────────────────
    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => return handle_error(e.into(), verbose),
    };
    apply_verbosity(&mut settings, &cli.global);

    // ── 3. Build the container ────────────────────────────────────────────
    let mut builder = Container::builder(settings);
    if cli.global.no_color {
        builder = builder.ansi(false);
    }
    let container = match builder.build() {
        Ok(container) => container,
        Err(e) => return handle_error(e.into(), verbose),
    };

    // ── 4. Install logging ────────────────────────────────────────────────
    if let Err(e) = init_logging(container.root_logger()) {
        container.root_logger().warn(format!("{e:#}"));
    }

    debug!(
        selection = %container.selection(),
        verbose = cli.global.verbose,
        quiet = cli.global.quiet,
        "CLI started"
    );

    // ── 5. Dispatch + 6. Error handling ──────────────────────────────────
    let output = OutputManager::new(&cli.global);
    let code = match run(cli.command, &container, &output) {
        Ok(()) => {
            debug!("Keel completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => handle_error(e, verbose),
    };

    container.root_logger().flush();
    code
}

/// Dispatch to the correct command handler.
#[instrument(skip_all)]
fn run(command: Commands, container: &Container, output: &OutputManager) -> CliResult<()> {
    match command {
        Commands::Env(args) => commands::env::execute(args, container, output),
        Commands::Check => commands::check::execute(container, output),
        Commands::Doc(cmd) => commands::doc::execute(cmd, container, output),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}

/// Translate a `CliError` into a user message and an exit code.
fn handle_error(err: CliError, verbose: bool) -> ExitCode {
    err.log();

    let msg = if io::stderr().is_terminal() {
        err.format_colored(verbose)
    } else {
        err.format_plain(verbose)
    };
    eprint!("{msg}");

    ExitCode::from(err.exit_code())
}

// ── tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_version_matches_cargo() {
        let cmd = Cli::command();
        assert_eq!(cmd.get_version(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn not_found_maps_to_exit_three() {
        let err: CliError = keel_core::application::ApplicationError::NotFound {
            collection: "users".into(),
            id: "1".into(),
        }
        .into();
        assert_eq!(err.exit_code(), 3);
    }
}
