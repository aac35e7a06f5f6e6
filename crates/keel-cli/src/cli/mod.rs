//! CLI argument definitions using the clap derive API.
//!
//! This module is the *only* place that knows about argument names, aliases,
//! help text, and value enums.  No business logic lives here.

use clap::{Args, Parser, Subcommand, ValueEnum};

pub mod global;
pub use global::GlobalArgs;

// ── Top-level CLI ─────────────────────────────────────────────────────────────

/// Main CLI entry-point.
#[derive(Debug, Parser)]
#[command(
    name    = "keel",
    bin_name = "keel",
    version  = env!("CARGO_PKG_VERSION"),
    author   = env!("CARGO_PKG_AUTHORS"),
    about    = "Environment-aware persistence and logging bootstrap",
    long_about = "Keel resolves APP_ENV into a persistence engine and a log \
                  backend, and runs one-shot units of work against the \
                  selected engine.",
    after_help = "EXAMPLES:\n\
        \x20 APP_ENV=test keel env\n\
        \x20 keel check\n\
        \x20 keel doc put users 42 '{\"name\": \"ada\"}'\n\
        \x20 keel doc get users 42\n\
        \x20 keel completions bash > /usr/share/bash-completion/completions/keel",
    arg_required_else_help = true,
    subcommand_required    = true,
)]
pub struct Cli {
    /// Flags available on every subcommand.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

// ── Subcommands ───────────────────────────────────────────────────────────────

/// All available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the resolved environment and backends.
    #[command(about = "Show environment, engine and log backend")]
    Env(EnvArgs),

    /// Build the container, reach the engine, open and roll back a unit of work.
    #[command(about = "Verify the selected engine is usable")]
    Check,

    /// Read or write a single document.
    #[command(
        subcommand,
        about = "Read or write a single document",
        after_help = "EXAMPLES:\n\
            \x20 keel doc put   users 42 '{\"name\": \"ada\"}'\n\
            \x20 keel doc get   users 42\n\
            \x20 keel doc delete users 42"
    )]
    Doc(DocCommand),

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions(CompletionsArgs),
}

// ── env ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EnvArgs {
    /// Print as JSON.
    #[arg(long)]
    pub json: bool,
}

// ── doc ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum DocCommand {
    /// Print a committed document.
    Get(DocKey),

    /// Insert or replace a document.
    Put {
        #[command(flatten)]
        key: DocKey,

        /// Document body as JSON.
        #[arg(value_name = "JSON")]
        body: String,
    },

    /// Remove a document.
    #[command(visible_alias = "rm")]
    Delete(DocKey),
}

#[derive(Debug, Args)]
pub struct DocKey {
    /// Collection name.
    #[arg(value_name = "COLLECTION")]
    pub collection: String,

    /// Document id.
    #[arg(value_name = "ID")]
    pub id: String,
}

// ── completions ───────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum)]
    pub shell: Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
    Elvish,
}
